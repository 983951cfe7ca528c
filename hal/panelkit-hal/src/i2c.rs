//! I2C bus abstractions
//!
//! Two revisions of the two-wire master peripheral exist and are kept
//! apart because their sequencing differs:
//!
//! - [`I2cLink`] executes one link element (start, address, write, read,
//!   stop) per step, each completing with its own interrupt.
//! - [`I2cMaster`] runs a whole frame as one job against a device address
//!   and interrupts once at the end.

use crate::RxBytes;

/// Faults reported by the two-wire peripheral
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum I2cFault {
    /// Device did not acknowledge its address
    AddressNack,
    /// Device did not acknowledge a data byte
    DataNack,
    /// Another master won arbitration
    ArbitrationLost,
    /// Clock stretched past the timeout
    Timeout,
    /// Misplaced start/stop or other bus error
    Bus,
}

impl I2cFault {
    /// Faults that are resolved by issuing the start sequence again
    pub fn is_start_race(&self) -> bool {
        matches!(self, I2cFault::AddressNack | I2cFault::ArbitrationLost)
    }
}

/// Status latched by the completion interrupt
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct I2cStatus {
    /// Bytes read during the step or job
    pub rx: RxBytes,
    /// Fault raised, if any
    pub fault: Option<I2cFault>,
}

/// One element of a command link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkCommand<'a> {
    /// (Repeated) start condition
    Start,
    /// 7-bit address with the R/W bit
    Address { address: u8, read: bool },
    /// Data bytes, master transmitting
    Write(&'a [u8]),
    /// Data bytes, master receiving (last byte NACKed)
    Read(usize),
    /// Stop condition
    Stop,
}

/// Command-link two-wire master (first revision)
pub trait I2cLink {
    /// Execute one link element. Completion is signalled by interrupt.
    fn issue(&mut self, command: LinkCommand<'_>) -> Result<(), I2cFault>;

    /// Check if a link element is still executing
    fn is_busy(&self) -> bool;

    /// Enable or disable the completion interrupt
    fn enable_interrupt(&mut self, enable: bool);

    /// Clear the completion interrupt and return the latched status
    fn acknowledge_interrupt(&mut self) -> I2cStatus;
}

/// Device-oriented two-wire master (second revision)
///
/// The job gathers up to a few write segments into one frame:
/// `START addr+W seg0 seg1 .. [RESTART addr+R read] STOP`.
pub trait I2cMaster {
    /// Transmit the concatenation of `parts` to `address`
    fn transmit(&mut self, address: u8, parts: &[&[u8]]) -> Result<(), I2cFault>;

    /// Transmit `parts`, then read `read_len` bytes with a repeated start
    fn transmit_receive(
        &mut self,
        address: u8,
        parts: &[&[u8]],
        read_len: usize,
    ) -> Result<(), I2cFault>;

    /// Check if a job is still running
    fn is_busy(&self) -> bool;

    /// Enable or disable the completion interrupt
    fn enable_interrupt(&mut self, enable: bool);

    /// Clear the completion interrupt and return the latched status
    fn acknowledge_interrupt(&mut self) -> I2cStatus;
}

/// I2C configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct I2cConfig {
    /// Clock frequency in Hz
    pub frequency: u32,
}

impl Default for I2cConfig {
    fn default() -> Self {
        Self {
            frequency: 400_000, // Panels nearly always support fast mode
        }
    }
}

impl I2cConfig {
    /// Standard mode (100 kHz)
    pub const STANDARD: Self = Self { frequency: 100_000 };

    /// Fast mode (400 kHz)
    pub const FAST: Self = Self { frequency: 400_000 };

    /// Fast mode plus (1 MHz)
    pub const FAST_PLUS: Self = Self {
        frequency: 1_000_000,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_race_faults() {
        assert!(I2cFault::AddressNack.is_start_race());
        assert!(I2cFault::ArbitrationLost.is_start_race());
        assert!(!I2cFault::DataNack.is_start_race());
        assert!(!I2cFault::Timeout.is_start_race());
    }

    #[test]
    fn test_presets() {
        assert_eq!(I2cConfig::default(), I2cConfig::FAST);
        assert_eq!(I2cConfig::STANDARD.frequency, 100_000);
    }
}
