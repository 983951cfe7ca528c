//! Panel drivers for the panelkit I/O pipeline
//!
//! - [`dcs::DcsPanel`] - Controllers speaking the MIPI-DCS command set
//!   over any command bus (SPI, two-wire, i80, I2S parallel)
//! - [`rgb::RgbPanel`] - Bufferless panels fed by an RGB streaming bus
//!
//! Both implement [`panelkit_core::panel::PanelDriver`] and are normally
//! used through a [`panelkit_core::panel::PanelDispatcher`], which checks
//! draw windows before they reach the driver.
//!
//! ```ignore
//! let panel = DcsPanel::new(&io, delay, DcsConfig::new(geometry))
//!     .with_reset_pin(rst)
//!     .with_init_sequence(VENDOR_INIT);
//! let mut panel = PanelDispatcher::new(panel)?;
//! panel.reset()?;
//! panel.init()?;
//! panel.disp_on_off(true)?;
//! ```

#![no_std]
#![deny(unsafe_code)]

#[cfg(test)]
extern crate std;

// MUST go first, so the macros are visible to the other modules
mod fmt;

pub mod dcs;
pub mod rgb;

pub use dcs::{DcsConfig, DcsPanel, InitCommand, NoReset};
pub use rgb::RgbPanel;
