//! DMA channel hardware abstraction
//!
//! The DMA controller walks a table of descriptors owned by the core's DMA
//! engine. Descriptors are addressed by their index in that table; a chip
//! HAL translates indices into the addresses of the table it was handed.
//!
//! Each channel has a transmit (memory to peripheral) and a receive
//! (peripheral to memory) half that can be bound independently.

/// Direction of a channel half
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DmaDirection {
    /// Memory to peripheral
    Tx,
    /// Peripheral to memory
    Rx,
}

/// One half of a DMA channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DmaChannelRef {
    /// Channel number
    pub index: u8,
    /// Which half of the channel
    pub direction: DmaDirection,
}

impl DmaChannelRef {
    pub const fn new(index: u8, direction: DmaDirection) -> Self {
        Self { index, direction }
    }
}

/// Faults reported by the DMA controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DmaFault {
    /// Controller fetched a descriptor it does not own
    DescriptorOwnership,
    /// Descriptor or buffer address outside DMA-reachable memory
    BusError,
}

/// Status latched by a channel completion interrupt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DmaStatus {
    /// Index of the last descriptor the controller finished, if any.
    /// All descriptors between the previous report and this one (in link
    /// order) are finished too.
    pub completed: Option<u16>,
    /// Fault raised, if any
    pub fault: Option<DmaFault>,
}

/// DMA controller channel hardware
pub trait DmaHardware {
    /// Load the descriptor at `head` into the channel and start fetching
    fn initiate(&mut self, channel: DmaChannelRef, head: u16) -> Result<(), DmaFault>;

    /// Stop fetching descriptors on the channel
    fn halt(&mut self, channel: DmaChannelRef);

    /// Check if the channel is still fetching
    fn is_busy(&self, channel: DmaChannelRef) -> bool;

    /// Enable or disable the per-descriptor completion interrupt
    fn enable_interrupt(&mut self, channel: DmaChannelRef, enable: bool);

    /// Clear the channel interrupt and return the latched status
    fn acknowledge_interrupt(&mut self, channel: DmaChannelRef) -> DmaStatus;
}
