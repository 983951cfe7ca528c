//! Draw windows either reach the bus whole or not at all

use panelkit_core::io::PanelIo;
use panelkit_core::panel::{PanelDispatcher, PanelGeometry, PixelFormat, Window};
use panelkit_core::{Error, PanelIoConfig};
use panelkit_hal_host::{SimDelay, SimPin, SimSpi, Trace};
use panelkit_panels::{DcsConfig, DcsPanel};
use panelkit_transports::{SpiBusConfig, SpiTransport};
use proptest::prelude::*;

const WIDTH: u16 = 8;
const HEIGHT: u16 = 4;

proptest! {
    #[test]
    fn prop_window_checked_against_oriented_panel(
        x0 in 0u16..12,
        x1 in 0u16..12,
        y0 in 0u16..12,
        y1 in 0u16..12,
        swap in any::<bool>(),
    ) {
        let window = Window::new(x0, y0, x1, y1);
        let pixels = vec![0x5Au8; window.pixels() * 2];
        let trace = Trace::new();
        let (spi, _probe) = SimSpi::new(&trace);
        let transport =
            SpiTransport::new(spi, SimPin::new("dc", &trace), SpiBusConfig::default()).unwrap();
        let io: PanelIo<'_, _, 4> = PanelIo::open(transport, PanelIoConfig::DEFERRED).unwrap();

        let geometry = PanelGeometry::new(WIDTH, HEIGHT, PixelFormat::Rgb565);
        let driver = DcsPanel::new(&io, SimDelay::new(), DcsConfig::new(geometry));
        let mut panel = PanelDispatcher::new(driver).unwrap();
        if swap {
            panel.swap_xy(true).unwrap();
        }
        let (width, height) = panel.resolution();
        let before = io.stats().submitted;

        let result = panel.draw_bitmap(window, &pixels[..]);
        let fits = x0 < x1 && y0 < y1 && x1 <= width && y1 <= height;
        if fits {
            prop_assert!(result.is_ok());
            // Column window, row window, pixel data
            prop_assert_eq!(io.stats().submitted - before, 3);
        } else {
            prop_assert_eq!(result, Err(Error::InvalidArgument));
            prop_assert_eq!(io.stats().submitted, before);
        }
    }
}
