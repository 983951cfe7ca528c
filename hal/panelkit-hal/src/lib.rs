//! Panelkit Hardware Abstraction Layer
//!
//! This crate defines the capability sets the panel I/O core consumes from
//! peripheral drivers. A chip-specific HAL implements them on top of its own
//! register blocks; the core never sees a register layout.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  panelkit-panels (panel drivers)        │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  panelkit-core / panelkit-transports    │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  panelkit-hal (this crate - traits)     │
//! └─────────────────────────────────────────┘
//!                     │
//!         ┌───────────┴───────────┐
//!         ▼                       ▼
//! ┌───────────────┐       ┌───────────────┐
//! │  chip HAL     │       │ panelkit-hal- │
//! │  (target)     │       │    host       │
//! └───────────────┘       └───────────────┘
//! ```
//!
//! Every bus capability has the same four parts: initiate a transfer, query
//! busy, enable the completion interrupt and acknowledge it (which also
//! returns the hardware status of the finished step).
//!
//! # Traits
//!
//! - [`gpio::OutputPin`] - Data/command select, chip select, enable lines
//! - [`spi::SpiEngine`] - Serial peripheral bus
//! - [`i2c::I2cLink`], [`i2c::I2cMaster`] - Two-wire bus, both revisions
//! - [`parallel::ParallelBus`] - i80 and I2S parallel buses
//! - [`rgb::RgbTimingEngine`] - RGB (DPI) timing generator
//! - [`dma::DmaHardware`] - DMA channel hardware
//! - [`memory::DmaMemory`] - DMA-reachable buffer allocation

#![no_std]
#![deny(unsafe_code)]

pub mod dma;
pub mod gpio;
pub mod i2c;
pub mod memory;
pub mod parallel;
pub mod rgb;
pub mod spi;

// Re-export key traits at crate root for convenience
pub use dma::{DmaChannelRef, DmaDirection, DmaFault, DmaHardware, DmaStatus};
pub use gpio::{Level, NoPin, OutputPin};
pub use i2c::{I2cFault, I2cLink, I2cMaster, I2cStatus};
pub use memory::{DmaBuffer, DmaMemory, DmaRegion, DmaSlice, OutOfMemory};
pub use parallel::{ParallelBus, ParallelFault, ParallelStatus};
pub use rgb::{RgbStatus, RgbTimingEngine};
pub use spi::{SpiEngine, SpiFault, SpiStatus, SpiTransfer};

/// Maximum number of bytes a peripheral returns in a single read status
pub const MAX_RX_BYTES: usize = 64;

/// Bytes received by a read step
pub type RxBytes = heapless::Vec<u8, MAX_RX_BYTES>;
