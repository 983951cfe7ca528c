//! SPI bus abstractions
//!
//! Capability set of an SPI master peripheral driven one exchange at a
//! time, with completion signalled by interrupt.

use crate::RxBytes;

/// One clocked exchange on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpiTransfer<'a> {
    /// Clock bytes out, ignore MISO
    Write(&'a [u8]),
    /// Clock `len` bytes in (half duplex, MOSI idle)
    Read(usize),
    /// Clock bytes out while sampling the same number of bytes in
    Exchange(&'a [u8]),
}

impl SpiTransfer<'_> {
    /// Number of bytes clocked by this exchange
    pub fn len(&self) -> usize {
        match self {
            SpiTransfer::Write(data) | SpiTransfer::Exchange(data) => data.len(),
            SpiTransfer::Read(len) => *len,
        }
    }

    /// Check if the exchange clocks nothing
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Faults reported by the SPI peripheral
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SpiFault {
    /// Receive FIFO overrun
    Overrun,
    /// Mode fault (another master drove CS)
    ModeFault,
    /// Transfer did not finish in time
    Timeout,
}

/// Status latched by the completion interrupt
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpiStatus {
    /// Bytes sampled during a read or exchange
    pub rx: RxBytes,
    /// Fault raised during the exchange, if any
    pub fault: Option<SpiFault>,
}

/// SPI master peripheral
///
/// The implementation must have consumed (or latched into its FIFO/DMA)
/// the outgoing bytes before the completion interrupt fires; the caller
/// keeps them alive until then.
pub trait SpiEngine {
    /// Start one exchange. Returns immediately; completion is signalled by
    /// interrupt.
    fn initiate(&mut self, transfer: SpiTransfer<'_>) -> Result<(), SpiFault>;

    /// Check if an exchange is still running
    fn is_busy(&self) -> bool;

    /// Enable or disable the completion interrupt
    fn enable_interrupt(&mut self, enable: bool);

    /// Clear the completion interrupt and return the latched status
    fn acknowledge_interrupt(&mut self) -> SpiStatus;
}

/// SPI configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SpiConfig {
    /// Clock frequency in Hz
    pub frequency: u32,
    /// Clock polarity
    pub polarity: Polarity,
    /// Clock phase
    pub phase: Phase,
}

impl Default for SpiConfig {
    fn default() -> Self {
        Self {
            frequency: 10_000_000, // 10 MHz, safe for most panel controllers
            polarity: Polarity::IdleLow,
            phase: Phase::CaptureOnFirstTransition,
        }
    }
}

impl SpiConfig {
    /// Configuration for a given SPI mode and clock
    pub fn new(frequency: u32, mode: Mode) -> Self {
        let (polarity, phase) = mode.into();
        Self {
            frequency,
            polarity,
            phase,
        }
    }
}

/// SPI clock polarity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Polarity {
    /// Clock idles low (CPOL=0)
    IdleLow,
    /// Clock idles high (CPOL=1)
    IdleHigh,
}

/// SPI clock phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Phase {
    /// Data captured on first clock transition (CPHA=0)
    CaptureOnFirstTransition,
    /// Data captured on second clock transition (CPHA=1)
    CaptureOnSecondTransition,
}

/// SPI mode (combined polarity and phase)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    /// Mode 0: CPOL=0, CPHA=0
    Mode0,
    /// Mode 1: CPOL=0, CPHA=1
    Mode1,
    /// Mode 2: CPOL=1, CPHA=0
    Mode2,
    /// Mode 3: CPOL=1, CPHA=1
    Mode3,
}

impl From<Mode> for (Polarity, Phase) {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Mode0 => (Polarity::IdleLow, Phase::CaptureOnFirstTransition),
            Mode::Mode1 => (Polarity::IdleLow, Phase::CaptureOnSecondTransition),
            Mode::Mode2 => (Polarity::IdleHigh, Phase::CaptureOnFirstTransition),
            Mode::Mode3 => (Polarity::IdleHigh, Phase::CaptureOnSecondTransition),
        }
    }
}
