//! Bus-agnostic core of the panel I/O pipeline
//!
//! This crate contains everything between a panel driver and a bus
//! peripheral that does not depend on a specific bus:
//!
//! - Transactions and the bounded, in-order panel I/O queue
//! - The transport contract every bus backend implements
//! - DMA descriptor arena, chains and channel pool
//! - Frame buffer rotation for the streaming bus
//! - Panel driver capability set and dispatcher
//! - Configuration and error types

#![no_std]
#![deny(unsafe_code)]

#[cfg(test)]
extern crate std;

// MUST go first, so the macros are visible to the other modules
mod fmt;

pub mod config;
pub mod dma;
pub mod error;
pub mod framebuffer;
pub mod io;
pub mod panel;
pub mod stream;

pub use config::{CallbackContext, ConfigError, PanelIoConfig, PhaseWidths};
pub use error::{BusFault, Error};
