//! Panel I/O transport backends
//!
//! Each bus kind sits behind a cargo feature:
//!
//! | Feature        | Module            | Bus                                   |
//! |----------------|-------------------|---------------------------------------|
//! | `spi`          | [`spi`]           | SPI with a data/command line          |
//! | `i2c`          | [`i2c`]           | Two-wire, command-link and master-tx  |
//! | `i80`          | [`parallel::i80`] | 8080-style parallel, 8/16 bit         |
//! | `i2s-parallel` | [`parallel::i2s`] | I2S peripheral in parallel LCD mode   |
//! | `rgb`          | [`rgb`]           | RGB (DPI) frame streaming             |
//!
//! The command-oriented buses implement [`panelkit_core::io::Transport`]
//! and are driven through a [`panelkit_core::io::PanelIo`] queue. The RGB
//! bus has no command phase; it streams frame buffers and implements
//! [`panelkit_core::stream::FrameSink`] instead.

#![no_std]
#![deny(unsafe_code)]

#[cfg(test)]
extern crate std;

// MUST go first, so the macros are visible to the other modules
mod fmt;

#[cfg(feature = "i2c")]
pub mod i2c;
#[cfg(any(feature = "i80", feature = "i2s-parallel"))]
pub mod parallel;
#[cfg(feature = "rgb")]
pub mod rgb;
#[cfg(feature = "spi")]
pub mod spi;

#[cfg(feature = "i2c")]
pub use i2c::{I2cBusConfig, I2cLinkTransport, I2cMasterTransport};
#[cfg(feature = "i2s-parallel")]
pub use parallel::i2s::{I2sParallelConfig, I2sParallelTransport};
#[cfg(feature = "i80")]
pub use parallel::i80::{I80Config, I80Transport};
#[cfg(any(feature = "i80", feature = "i2s-parallel"))]
pub use parallel::DcLevels;
#[cfg(feature = "rgb")]
pub use rgb::{RgbBusConfig, RgbPanelBus, RgbStats};
#[cfg(feature = "spi")]
pub use spi::{SpiBusConfig, SpiTransport};
