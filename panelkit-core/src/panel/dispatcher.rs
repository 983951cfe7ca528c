//! Panel operations dispatcher

use super::{PanelDriver, PanelGeometry, Window};
use crate::io::Payload;
use crate::Error;

/// Front for one panel driver
///
/// Performs no hardware access of its own: it checks draw windows against
/// the resolution the application actually sees, checks payload sizes,
/// and forwards. The orientation reported by the driver wins over the
/// swap tracked here.
pub struct PanelDispatcher<D> {
    driver: D,
    swapped: bool,
}

impl<'a, D: PanelDriver<'a>> PanelDispatcher<D> {
    pub fn new(driver: D) -> Result<Self, Error> {
        driver.geometry().validate()?;
        Ok(Self {
            driver,
            swapped: false,
        })
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    pub fn into_driver(self) -> D {
        self.driver
    }

    /// Resolution as currently oriented
    pub fn resolution(&self) -> (u16, u16) {
        let PanelGeometry { width, height, .. } = self.driver.geometry();
        if self.driver.axes_swapped().unwrap_or(self.swapped) {
            (height, width)
        } else {
            (width, height)
        }
    }

    /// Reset the controller; its axes are back to unswapped
    pub fn reset(&mut self) -> Result<(), Error> {
        self.driver.reset()?;
        self.swapped = false;
        Ok(())
    }

    pub fn init(&mut self) -> Result<(), Error> {
        self.driver.init()
    }

    /// Draw `pixels` into `window`. The window must be non-empty and lie
    /// inside the panel; the payload must hold exactly its pixels.
    pub fn draw_bitmap(
        &mut self,
        window: Window,
        pixels: impl Into<Payload<'a>>,
    ) -> Result<(), Error> {
        let pixels = pixels.into();
        let (width, height) = self.resolution();
        if window.is_empty() || window.x_end > width || window.y_end > height {
            debug!(
                "draw window {}..{} x {}..{} outside panel",
                window.x_start,
                window.x_end,
                window.y_start,
                window.y_end
            );
            return Err(Error::InvalidArgument);
        }
        let expected = window.pixels() * self.driver.geometry().format.bytes_per_pixel();
        if pixels.len() != expected {
            return Err(Error::InvalidArgument);
        }
        self.driver.draw_bitmap(window, pixels)
    }

    pub fn invert_color(&mut self, invert: bool) -> Result<(), Error> {
        self.driver.invert_color(invert)
    }

    pub fn mirror(&mut self, mirror_x: bool, mirror_y: bool) -> Result<(), Error> {
        self.driver.mirror(mirror_x, mirror_y)
    }

    pub fn swap_xy(&mut self, swap: bool) -> Result<(), Error> {
        self.driver.swap_xy(swap)?;
        self.swapped = swap;
        Ok(())
    }

    pub fn set_gap(&mut self, x_gap: u16, y_gap: u16) -> Result<(), Error> {
        self.driver.set_gap(x_gap, y_gap)
    }

    pub fn disp_on_off(&mut self, on: bool) -> Result<(), Error> {
        self.driver.disp_on_off(on)
    }

    pub fn disp_sleep(&mut self, sleep: bool) -> Result<(), Error> {
        self.driver.disp_sleep(sleep)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;
    use crate::panel::PixelFormat;
    use std::vec::Vec;

    /// Driver that supports drawing, swapping and reset only
    struct Recorder {
        geometry: PanelGeometry,
        drawn: Vec<(Window, usize)>,
        /// Orientation the driver reports, if any
        reported: Option<bool>,
    }

    impl Recorder {
        fn new(width: u16, height: u16) -> Self {
            Self {
                geometry: PanelGeometry::new(width, height, PixelFormat::Rgb565),
                drawn: Vec::new(),
                reported: None,
            }
        }
    }

    impl<'a> PanelDriver<'a> for Recorder {
        fn geometry(&self) -> PanelGeometry {
            self.geometry
        }

        fn draw_bitmap(&mut self, window: Window, pixels: Payload<'a>) -> Result<(), Error> {
            self.drawn.push((window, pixels.len()));
            Ok(())
        }

        fn swap_xy(&mut self, _swap: bool) -> Result<(), Error> {
            Ok(())
        }

        fn reset(&mut self) -> Result<(), Error> {
            Ok(())
        }

        fn axes_swapped(&self) -> Option<bool> {
            self.reported
        }
    }

    #[test]
    fn test_rejects_zero_resolution() {
        assert_eq!(
            PanelDispatcher::new(Recorder::new(0, 10)).err(),
            Some(Error::Config(ConfigError::Resolution))
        );
    }

    #[test]
    fn test_draw_window_bounds() {
        let mut panel = PanelDispatcher::new(Recorder::new(8, 4)).unwrap();
        let pixels = [0u8; 64];

        assert!(panel.draw_bitmap(Window::full(8, 4), &pixels).is_ok());
        assert_eq!(
            panel.draw_bitmap(Window::new(0, 0, 9, 4), &pixels[..]),
            Err(Error::InvalidArgument)
        );
        assert_eq!(
            panel.draw_bitmap(Window::new(2, 2, 2, 4), &pixels[..0]),
            Err(Error::InvalidArgument)
        );
        // Payload one pixel short
        assert_eq!(
            panel.draw_bitmap(Window::full(8, 4), &pixels[..62]),
            Err(Error::InvalidArgument)
        );
        assert_eq!(panel.driver().drawn.len(), 1);
    }

    #[test]
    fn test_swap_changes_bounds() {
        let mut panel = PanelDispatcher::new(Recorder::new(8, 4)).unwrap();
        let pixels = [0u8; 64];

        assert_eq!(
            panel.draw_bitmap(Window::full(4, 8), &pixels),
            Err(Error::InvalidArgument)
        );
        panel.swap_xy(true).unwrap();
        assert_eq!(panel.resolution(), (4, 8));
        assert!(panel.draw_bitmap(Window::full(4, 8), &pixels).is_ok());
    }

    #[test]
    fn test_reset_restores_orientation() {
        let mut panel = PanelDispatcher::new(Recorder::new(8, 4)).unwrap();
        panel.swap_xy(true).unwrap();
        assert_eq!(panel.resolution(), (4, 8));

        panel.reset().unwrap();
        assert_eq!(panel.resolution(), (8, 4));
        assert_eq!(
            panel.draw_bitmap(Window::full(4, 8), &[0u8; 64]),
            Err(Error::InvalidArgument)
        );
    }

    #[test]
    fn test_driver_orientation_wins() {
        let mut panel = PanelDispatcher::new(Recorder::new(8, 4)).unwrap();
        // Swapped behind the dispatcher's back, e.g. by an init sequence
        panel.driver_mut().reported = Some(true);
        assert_eq!(panel.resolution(), (4, 8));
        assert!(panel.draw_bitmap(Window::full(4, 8), &[0u8; 64]).is_ok());

        panel.swap_xy(true).unwrap();
        panel.driver_mut().reported = Some(false);
        assert_eq!(panel.resolution(), (8, 4));
    }

    #[test]
    fn test_unsupported_passes_through() {
        let mut panel = PanelDispatcher::new(Recorder::new(8, 4)).unwrap();
        assert_eq!(panel.invert_color(true), Err(Error::Unsupported));
        assert_eq!(panel.disp_sleep(true), Err(Error::Unsupported));
        assert_eq!(panel.mirror(true, false), Err(Error::Unsupported));
    }
}
