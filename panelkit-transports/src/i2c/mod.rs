//! Two-wire transports
//!
//! Two peripheral revisions are supported and kept apart because their
//! low-level sequencing differs:
//!
//! - [`v1`] drives a command-link peripheral where every bus element
//!   (start, address, write, read, stop) is its own hardware step
//! - [`v2`] drives a master-transmit peripheral that runs a whole frame
//!   as one job
//!
//! Both frame a transaction the same way: device address, an optional
//! control byte telling the controller whether command or data bytes
//! follow, the command bytes, then the parameters or pixels. Reads use a
//! repeated start.
//!
//! Both retry the start of a frame a bounded number of times when another
//! master wins arbitration or the device does not acknowledge its address,
//! then fail with [`BusFault::AddressNack`] or
//! [`BusFault::ArbitrationLost`]. A data NACK fails at once.

pub mod v1;
pub mod v2;

pub use v1::{I2cLinkOp, I2cLinkTransport};
pub use v2::{I2cMasterOp, I2cMasterTransport};

use panelkit_core::config::{CommandBytes, ConfigError, PhaseWidths};
use panelkit_core::io::{PayloadKind, Transaction};
use panelkit_core::{BusFault, Error};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Two-wire bus configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct I2cBusConfig {
    /// 7-bit device address
    pub address: u8,
    pub phases: PhaseWidths,
    /// Control bytes before the command (0 or 1)
    pub control_phase_bytes: u8,
    /// Bit of the control byte that selects data over command
    pub dc_bit_offset: u8,
    /// Extra attempts at the start of a frame
    pub start_retries: u8,
}

impl Default for I2cBusConfig {
    fn default() -> Self {
        Self {
            address: 0x3C,
            phases: PhaseWidths::BYTE,
            control_phase_bytes: 1,
            dc_bit_offset: 6,
            start_retries: 3,
        }
    }
}

impl I2cBusConfig {
    /// Device at `address` with the usual single control byte (D/C in bit 6)
    pub fn new(address: u8) -> Self {
        Self {
            address,
            ..Self::default()
        }
    }

    pub fn with_phases(mut self, phases: PhaseWidths) -> Self {
        self.phases = phases;
        self
    }

    /// No control byte, for controllers that take raw commands
    pub fn without_control_phase(mut self) -> Self {
        self.control_phase_bytes = 0;
        self
    }

    pub fn with_dc_bit_offset(mut self, offset: u8) -> Self {
        self.dc_bit_offset = offset;
        self
    }

    pub fn with_start_retries(mut self, retries: u8) -> Self {
        self.start_retries = retries;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.phases.validate()?;
        if self.address > 0x7F {
            return Err(ConfigError::DeviceAddress);
        }
        if self.control_phase_bytes > 1 {
            return Err(ConfigError::ControlPhaseBytes);
        }
        if self.dc_bit_offset > 7 {
            return Err(ConfigError::DcBitOffset);
        }
        Ok(())
    }

    /// Control byte for a transaction of `kind`, if the bus uses one
    fn control_byte(&self, kind: PayloadKind) -> Option<u8> {
        if self.control_phase_bytes == 0 {
            return None;
        }
        Some(match kind {
            PayloadKind::Param => 0x00,
            PayloadKind::Color => 1 << self.dc_bit_offset,
        })
    }
}

/// Per-transaction framing shared by both revisions
#[derive(Debug, Default)]
struct Framing {
    control: Option<u8>,
    command: CommandBytes,
    retries_left: u8,
}

impl Framing {
    fn prepare(&mut self, config: &I2cBusConfig, txn: &Transaction<'_>) -> Result<(), Error> {
        self.control = config.control_byte(txn.kind);
        self.command = match txn.command {
            Some(cmd) => config.phases.encode_command(cmd)?,
            None => CommandBytes::new(),
        };
        self.retries_left = config.start_retries;
        Ok(())
    }

    fn control_bytes(&self) -> &[u8] {
        match &self.control {
            Some(byte) => core::slice::from_ref(byte),
            None => &[],
        }
    }

    /// Take one retry if any are left
    fn retry(&mut self) -> bool {
        if self.retries_left == 0 {
            return false;
        }
        self.retries_left -= 1;
        true
    }
}

fn validate(config: &I2cBusConfig, txn: &Transaction<'_>) -> Result<(), Error> {
    if let Some(cmd) = txn.command {
        config.phases.encode_command(cmd)?;
    }
    if txn.kind == PayloadKind::Param {
        config.phases.check_params(txn.payload.len())?;
    }
    Ok(())
}

fn bus_error(fault: panelkit_hal::I2cFault) -> Error {
    Error::Bus(BusFault::from(fault))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        assert!(I2cBusConfig::default().validate().is_ok());
        assert_eq!(
            I2cBusConfig::new(0x80).validate(),
            Err(ConfigError::DeviceAddress)
        );
        assert_eq!(
            I2cBusConfig::new(0x3C).with_dc_bit_offset(8).validate(),
            Err(ConfigError::DcBitOffset)
        );
        let mut config = I2cBusConfig::new(0x3C);
        config.control_phase_bytes = 2;
        assert_eq!(config.validate(), Err(ConfigError::ControlPhaseBytes));
    }

    #[test]
    fn test_control_byte() {
        let config = I2cBusConfig::new(0x3C);
        assert_eq!(config.control_byte(PayloadKind::Param), Some(0x00));
        assert_eq!(config.control_byte(PayloadKind::Color), Some(0x40));
        assert_eq!(
            config.with_dc_bit_offset(7).control_byte(PayloadKind::Color),
            Some(0x80)
        );
        assert_eq!(
            config.without_control_phase().control_byte(PayloadKind::Color),
            None
        );
    }
}
