//! Parallel bus abstractions
//!
//! Capability set shared by the i80 (8080-style) LCD peripheral and the
//! I2S peripheral running in parallel LCD mode. Short phases are written
//! straight into the peripheral's data register/FIFO; long ones are fed by
//! a DMA channel the core has bound beforehand.

use crate::dma::DmaChannelRef;

/// Faults reported by the parallel peripheral
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParallelFault {
    /// Transmit FIFO ran empty while the write strobe was active
    Underflow,
    /// Transfer did not finish in time
    Timeout,
}

/// Status latched by the completion interrupt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParallelStatus {
    /// Fault raised, if any
    pub fault: Option<ParallelFault>,
}

/// Parallel LCD peripheral
pub trait ParallelBus {
    /// Data bus width in bits (8 or 16)
    fn bus_width(&self) -> u8;

    /// Swap the two bytes of every 16-bit word on the way out
    fn set_byte_swap(&mut self, swap: bool);

    /// Clock words out through the data register. Completes synchronously;
    /// only used for short phases.
    fn write_direct(&mut self, data: &[u8]) -> Result<(), ParallelFault>;

    /// Start clocking `len` bytes supplied by the bound DMA channel.
    /// Completion is signalled by interrupt.
    fn start_dma(&mut self, channel: DmaChannelRef, len: usize) -> Result<(), ParallelFault>;

    /// Check if a DMA-fed transfer is still running
    fn is_busy(&self) -> bool;

    /// Enable or disable the completion interrupt
    fn enable_interrupt(&mut self, enable: bool);

    /// Clear the completion interrupt and return the latched status
    fn acknowledge_interrupt(&mut self) -> ParallelStatus;
}
