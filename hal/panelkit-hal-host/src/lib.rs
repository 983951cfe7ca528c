//! Host simulation of the panelkit HAL
//!
//! Every peripheral completes its step immediately and latches an
//! interrupt; tests pump the panel I/O interrupt handler while
//! [`Probe::irq_pending`] style queries report work. All simulated
//! peripherals can share one [`Trace`], which records bus activity in the
//! order it reached the wires.
//!
//! Each simulated peripheral is split into the device (moved into the code
//! under test) and a probe sharing its state (kept by the test for fault
//! injection and inspection).

pub mod dma;
pub mod gpio;
pub mod i2c;
pub mod parallel;
pub mod rgb;
pub mod spi;

use std::sync::{Arc, Mutex, MutexGuard};

pub use dma::{DmaProbe, SimDma};
pub use gpio::{SimDelay, SimPin};
pub use i2c::{I2cProbe, SimI2cLink, SimI2cMaster};
pub use parallel::{ParallelProbe, SimParallel};
pub use rgb::{RgbProbe, SimRgb};
pub use spi::{SimSpi, SpiProbe};

use panelkit_hal::{DmaChannelRef, Level};

/// One observable action of a simulated peripheral
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Control line driven
    Line { pin: &'static str, level: Level },
    /// SPI clock ran: bytes shifted out and number of bytes sampled
    SpiClock { tx: Vec<u8>, rx_len: usize },
    /// Two-wire command-link element executed
    Link(LinkEvent),
    /// Two-wire master job executed
    I2cJob {
        address: u8,
        tx: Vec<u8>,
        rx_len: usize,
    },
    /// Words written through the parallel data register
    ParallelDirect(Vec<u8>),
    /// Parallel bus started clocking from DMA
    ParallelDma { channel: DmaChannelRef, len: usize },
    /// DMA channel loaded a chain head
    DmaStart { channel: DmaChannelRef, head: u16 },
    /// DMA channel halted
    DmaHalt { channel: DmaChannelRef },
    /// RGB timing generator started
    RgbStart { channel: DmaChannelRef },
    /// RGB timing generator stopped
    RgbStop,
}

/// Recorded command-link element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Start,
    Address { address: u8, read: bool },
    Write(Vec<u8>),
    Read(usize),
    Stop,
}

/// Shared, ordered record of peripheral activity
#[derive(Debug, Clone, Default)]
pub struct Trace {
    events: Arc<Mutex<Vec<Event>>>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: Event) {
        lock(&self.events).push(event);
    }

    /// Snapshot of everything recorded so far
    pub fn events(&self) -> Vec<Event> {
        lock(&self.events).clone()
    }

    pub fn clear(&self) {
        lock(&self.events).clear();
    }

    /// Index of the first event matching `pred`
    pub fn position(&self, pred: impl Fn(&Event) -> bool) -> Option<usize> {
        lock(&self.events).iter().position(pred)
    }
}

/// Lock shared simulation state, ignoring poisoning from a failed test
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
