//! Panel driver contract
//!
//! Defines the capability set every panel driver exposes and the
//! [`PanelDispatcher`] that validates arguments before forwarding to it.

mod dispatcher;

pub use dispatcher::PanelDispatcher;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::io::Payload;
use crate::Error;

/// Pixel layout on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PixelFormat {
    /// 16 bits per pixel
    Rgb565,
    /// 18 bits per pixel, one byte per channel
    Rgb666,
    /// 24 bits per pixel
    Rgb888,
}

impl PixelFormat {
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb565 => 2,
            PixelFormat::Rgb666 | PixelFormat::Rgb888 => 3,
        }
    }
}

/// Resolution and pixel format of a panel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PanelGeometry {
    pub width: u16,
    pub height: u16,
    pub format: PixelFormat,
}

impl PanelGeometry {
    pub const fn new(width: u16, height: u16, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            format,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::Resolution);
        }
        Ok(())
    }

    /// Bytes of one full frame
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }
}

/// Drawing window, end coordinates exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Window {
    pub x_start: u16,
    pub y_start: u16,
    pub x_end: u16,
    pub y_end: u16,
}

impl Window {
    pub const fn new(x_start: u16, y_start: u16, x_end: u16, y_end: u16) -> Self {
        Self {
            x_start,
            y_start,
            x_end,
            y_end,
        }
    }

    /// Window covering `width` x `height` pixels from the origin
    pub const fn full(width: u16, height: u16) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn width(&self) -> u16 {
        self.x_end.saturating_sub(self.x_start)
    }

    pub fn height(&self) -> u16 {
        self.y_end.saturating_sub(self.y_start)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn pixels(&self) -> usize {
        self.width() as usize * self.height() as usize
    }
}

/// Panel driver capability set
///
/// A driver implements the operations its controller supports; the rest
/// keep the default `Unsupported`. Drivers never see windows or payloads
/// the dispatcher has not validated.
pub trait PanelDriver<'a> {
    /// Configured resolution and pixel format (before any axis swap)
    fn geometry(&self) -> PanelGeometry;

    /// Hardware reset if a reset line exists, software reset otherwise
    fn reset(&mut self) -> Result<(), Error> {
        Err(Error::Unsupported)
    }

    /// Run the controller's initialization sequence
    fn init(&mut self) -> Result<(), Error> {
        Err(Error::Unsupported)
    }

    /// Push pixels into `window`
    fn draw_bitmap(&mut self, _window: Window, _pixels: Payload<'a>) -> Result<(), Error> {
        Err(Error::Unsupported)
    }

    fn invert_color(&mut self, _invert: bool) -> Result<(), Error> {
        Err(Error::Unsupported)
    }

    fn mirror(&mut self, _mirror_x: bool, _mirror_y: bool) -> Result<(), Error> {
        Err(Error::Unsupported)
    }

    fn swap_xy(&mut self, _swap: bool) -> Result<(), Error> {
        Err(Error::Unsupported)
    }

    /// Current axis swap, for drivers that track the controller's
    /// orientation themselves
    fn axes_swapped(&self) -> Option<bool> {
        None
    }

    /// Offset of the visible area inside controller memory
    fn set_gap(&mut self, _x_gap: u16, _y_gap: u16) -> Result<(), Error> {
        Err(Error::Unsupported)
    }

    fn disp_on_off(&mut self, _on: bool) -> Result<(), Error> {
        Err(Error::Unsupported)
    }

    fn disp_sleep(&mut self, _sleep: bool) -> Result<(), Error> {
        Err(Error::Unsupported)
    }
}
