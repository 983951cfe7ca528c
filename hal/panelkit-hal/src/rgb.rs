//! RGB (DPI) timing generator abstraction
//!
//! The timing generator clocks pixels from a DMA channel continuously and
//! produces HSYNC/VSYNC/DE itself. The core only starts, stops and
//! acknowledges it.

use crate::dma::DmaChannelRef;

/// Frame timing, in pixel clocks and lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RgbTiming {
    /// Pixel clock in Hz
    pub pclk_hz: u32,
    /// Visible pixels per line
    pub h_res: u16,
    /// Visible lines per frame
    pub v_res: u16,
    pub hsync_pulse_width: u16,
    pub hsync_back_porch: u16,
    pub hsync_front_porch: u16,
    pub vsync_pulse_width: u16,
    pub vsync_back_porch: u16,
    pub vsync_front_porch: u16,
}

impl RgbTiming {
    /// Total pixel clocks per line including blanking
    pub fn h_total(&self) -> u32 {
        self.h_res as u32
            + self.hsync_pulse_width as u32
            + self.hsync_back_porch as u32
            + self.hsync_front_porch as u32
    }

    /// Total lines per frame including blanking
    pub fn v_total(&self) -> u32 {
        self.v_res as u32
            + self.vsync_pulse_width as u32
            + self.vsync_back_porch as u32
            + self.vsync_front_porch as u32
    }
}

/// Status latched by the timing generator interrupt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RgbStatus {
    /// Vertical blanking started
    pub vsync: bool,
}

/// RGB timing generator peripheral
pub trait RgbTimingEngine {
    /// Program the frame timing. Only called while stopped.
    fn configure(&mut self, timing: &RgbTiming);

    /// Start scanning pixels out of `channel`
    fn start(&mut self, channel: DmaChannelRef);

    /// Stop the pixel clock after the current frame
    fn stop(&mut self);

    /// Check if the timing generator is running
    fn is_busy(&self) -> bool;

    /// Enable or disable the VSYNC interrupt
    fn enable_interrupt(&mut self, enable: bool);

    /// Clear the interrupt and return the latched status
    fn acknowledge_interrupt(&mut self) -> RgbStatus;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_totals() {
        let timing = RgbTiming {
            pclk_hz: 16_000_000,
            h_res: 800,
            v_res: 480,
            hsync_pulse_width: 4,
            hsync_back_porch: 8,
            hsync_front_porch: 8,
            vsync_pulse_width: 4,
            vsync_back_porch: 8,
            vsync_front_porch: 8,
        };
        assert_eq!(timing.h_total(), 820);
        assert_eq!(timing.v_total(), 500);
    }
}
