//! Error types shared by the panel I/O pipeline

use panelkit_hal::{DmaFault, I2cFault, OutOfMemory, ParallelFault, SpiFault};

use crate::config::ConfigError;

/// Errors returned by panel I/O, the DMA engine and panel drivers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Invalid configuration; fatal to the `open`/`new` call only
    Config(ConfigError),
    /// Queue or peripheral occupied; retry later
    Busy,
    /// Request malformed for this bus or panel
    InvalidArgument,
    /// Transport protocol failure after bounded retries
    Bus(BusFault),
    /// No free DMA channel or descriptor
    ResourceExhausted,
    /// Driver or bus lacks the capability
    Unsupported,
    /// DMA-reachable memory exhausted
    OutOfMemory,
    /// Descriptor ownership violated (completion on a software-owned descriptor)
    Descriptor,
}

/// Transport-level protocol failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusFault {
    /// Device did not acknowledge its address
    AddressNack,
    /// Device did not acknowledge a data byte
    DataNack,
    /// Lost arbitration to another master
    ArbitrationLost,
    /// Peripheral did not finish in time
    Timeout,
    /// Receive overrun
    Overrun,
    /// Transmit FIFO underflow
    Underflow,
    /// Any other peripheral or DMA controller fault
    Hardware,
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl From<OutOfMemory> for Error {
    fn from(_: OutOfMemory) -> Self {
        Error::OutOfMemory
    }
}

impl From<BusFault> for Error {
    fn from(fault: BusFault) -> Self {
        Error::Bus(fault)
    }
}

impl From<SpiFault> for BusFault {
    fn from(fault: SpiFault) -> Self {
        match fault {
            SpiFault::Overrun => BusFault::Overrun,
            SpiFault::Timeout => BusFault::Timeout,
            SpiFault::ModeFault => BusFault::Hardware,
        }
    }
}

impl From<I2cFault> for BusFault {
    fn from(fault: I2cFault) -> Self {
        match fault {
            I2cFault::AddressNack => BusFault::AddressNack,
            I2cFault::DataNack => BusFault::DataNack,
            I2cFault::ArbitrationLost => BusFault::ArbitrationLost,
            I2cFault::Timeout => BusFault::Timeout,
            I2cFault::Bus => BusFault::Hardware,
        }
    }
}

impl From<ParallelFault> for BusFault {
    fn from(fault: ParallelFault) -> Self {
        match fault {
            ParallelFault::Underflow => BusFault::Underflow,
            ParallelFault::Timeout => BusFault::Timeout,
        }
    }
}

impl From<DmaFault> for Error {
    fn from(fault: DmaFault) -> Self {
        match fault {
            DmaFault::DescriptorOwnership => Error::Descriptor,
            DmaFault::BusError => Error::Bus(BusFault::Hardware),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_mapping() {
        assert_eq!(BusFault::from(I2cFault::AddressNack), BusFault::AddressNack);
        assert_eq!(BusFault::from(SpiFault::ModeFault), BusFault::Hardware);
        assert_eq!(Error::from(DmaFault::DescriptorOwnership), Error::Descriptor);
        assert_eq!(
            Error::from(ConfigError::CommandBits),
            Error::Config(ConfigError::CommandBits)
        );
    }
}
