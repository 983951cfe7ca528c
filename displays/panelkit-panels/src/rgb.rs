//! Bufferless RGB panel
//!
//! The panel has no frame memory of its own; it shows whatever the
//! streaming bus scans out. Drawing therefore happens in a frame buffer:
//! the driver acquires a copy of the newest frame, patches the window in
//! and presents it for the next pass.

use panelkit_core::io::Payload;
use panelkit_core::panel::{PanelDriver, PanelGeometry, Window};
use panelkit_core::stream::FrameSink;
use panelkit_core::Error;

/// RGB panel on streaming bus `S`
pub struct RgbPanel<'s, S> {
    sink: &'s S,
}

impl<'s, S> RgbPanel<'s, S> {
    pub fn new(sink: &'s S) -> Self {
        Self { sink }
    }

    pub fn sink(&self) -> &'s S {
        self.sink
    }
}

/// Copy `pixels`, packed row by row, into `window` of a frame `width`
/// pixels wide
fn blit(
    frame: &mut [u8],
    width: usize,
    bpp: usize,
    window: Window,
    pixels: &[u8],
) -> Result<(), Error> {
    let row_len = window.width() as usize * bpp;
    if row_len == 0 || pixels.len() != row_len * window.height() as usize {
        return Err(Error::InvalidArgument);
    }
    for (y, row) in (window.y_start as usize..).zip(pixels.chunks_exact(row_len)) {
        let start = (y * width + window.x_start as usize) * bpp;
        let dst = frame
            .get_mut(start..start + row_len)
            .ok_or(Error::InvalidArgument)?;
        dst.copy_from_slice(row);
    }
    Ok(())
}

impl<'a, 's, 'd, S> PanelDriver<'a> for RgbPanel<'s, S>
where
    S: FrameSink<'d>,
{
    fn geometry(&self) -> PanelGeometry {
        self.sink.geometry()
    }

    fn init(&mut self) -> Result<(), Error> {
        self.sink.start()
    }

    fn draw_bitmap(&mut self, window: Window, pixels: Payload<'a>) -> Result<(), Error> {
        let geometry = self.sink.geometry();
        // Checked before acquiring; an acquired frame must be presented
        let fits = window.x_end <= geometry.width && window.y_end <= geometry.height;
        let expected = window.pixels() * geometry.format.bytes_per_pixel();
        if window.is_empty() || !fits || pixels.len() != expected {
            return Err(Error::InvalidArgument);
        }

        let mut frame = self.sink.acquire_synced()?;
        blit(
            &mut frame,
            geometry.width as usize,
            geometry.format.bytes_per_pixel(),
            window,
            pixels.as_bytes(),
        )?;
        trace!(
            "rgb panel window {}x{} at {},{}",
            window.width(),
            window.height(),
            window.x_start,
            window.y_start
        );
        self.sink.present(frame).map_err(|(_, e)| e)
    }

    fn disp_on_off(&mut self, on: bool) -> Result<(), Error> {
        self.sink.set_enabled(on)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blit_window() {
        // 4x3 frame, one byte per pixel
        let mut frame = [0u8; 12];
        blit(&mut frame, 4, 1, Window::new(1, 1, 3, 3), &[1, 2, 3, 4]).unwrap();
        assert_eq!(frame, [0, 0, 0, 0, 0, 1, 2, 0, 0, 3, 4, 0]);
    }

    #[test]
    fn test_blit_wide_pixels() {
        let mut frame = [0u8; 8];
        blit(&mut frame, 2, 2, Window::new(1, 1, 2, 2), &[0xAB, 0xCD]).unwrap();
        assert_eq!(frame, [0, 0, 0, 0, 0, 0, 0xAB, 0xCD]);
    }

    #[test]
    fn test_blit_rejects_mismatch() {
        let mut frame = [0u8; 12];
        assert_eq!(
            blit(&mut frame, 4, 1, Window::new(0, 0, 2, 2), &[1, 2, 3]),
            Err(Error::InvalidArgument)
        );
        // Window past the frame
        assert_eq!(
            blit(&mut frame, 4, 1, Window::new(3, 2, 5, 3), &[1, 2]),
            Err(Error::InvalidArgument)
        );
    }
}
