//! DCS panel through the dispatcher and a real SPI panel I/O queue

use panelkit_core::io::PanelIo;
use panelkit_core::panel::{PanelDispatcher, PanelGeometry, PixelFormat, Window};
use panelkit_core::{ConfigError, Error, PanelIoConfig};
use panelkit_hal::Level;
use panelkit_hal_host::{Event, SimDelay, SimPin, SimSpi, Trace};
use panelkit_panels::{DcsConfig, DcsPanel, InitCommand};
use panelkit_transports::{SpiBusConfig, SpiTransport};

static VENDOR: [InitCommand; 1] = [InitCommand::new(0xB7, &[0x35])];

fn spi_commands(trace: &Trace) -> Vec<Vec<u8>> {
    trace
        .events()
        .iter()
        .filter_map(|e| match e {
            Event::SpiClock { tx, .. } => Some(tx.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn test_bring_up_and_draw_through_small_queue() {
    let pixels = [0x12u8; 2 * 2 * 2];
    let trace = Trace::new();
    let (spi, probe) = SimSpi::new(&trace);
    let transport = SpiTransport::new(spi, SimPin::new("dc", &trace), SpiBusConfig::default())
        .unwrap();
    // Room for one window at a time: the driver has to wait for completions
    let io: PanelIo<'_, _, 3> = PanelIo::open(transport, PanelIoConfig::DEFERRED).unwrap();

    let drain = || {
        while probe.irq_pending() {
            io.on_interrupt();
        }
        while let Some(completion) = io.take_completion() {
            assert!(completion.is_ok());
        }
    };
    let rst = SimPin::new("rst", &trace);
    let delay = SimDelay::new();
    let geometry = PanelGeometry::new(4, 4, PixelFormat::Rgb565);
    let driver = DcsPanel::new(&io, delay.clone(), DcsConfig::new(geometry))
        .with_reset_pin(rst.clone())
        .with_init_sequence(&VENDOR)
        .with_wait_hook(&drain);
    let mut panel = PanelDispatcher::new(driver).unwrap();

    panel.reset().unwrap();
    panel.init().unwrap();
    panel.set_gap(0, 16).unwrap();
    panel
        .draw_bitmap(Window::new(1, 1, 3, 3), &pixels)
        .unwrap();
    panel.disp_on_off(true).unwrap();
    drain();

    assert_eq!(rst.level(), Level::High);
    assert_eq!(delay.elapsed_ms(), 120);
    assert!(io.is_idle());
    assert_eq!(io.stats().submitted, 8);
    assert_eq!(io.stats().failed, 0);

    assert_eq!(
        spi_commands(&trace),
        vec![
            vec![0x11],
            vec![0x36],
            vec![0x00],
            vec![0x3A],
            vec![0x55],
            vec![0xB7],
            vec![0x35],
            vec![0x2A],
            vec![0x00, 0x01, 0x00, 0x02],
            vec![0x2B],
            vec![0x00, 0x11, 0x00, 0x12],
            vec![0x2C],
            pixels.to_vec(),
            vec![0x29],
        ]
    );
}

#[test]
fn test_dispatcher_checks_window_before_bus() {
    let pixels = [0u8; 32];
    let trace = Trace::new();
    let (spi, _probe) = SimSpi::new(&trace);
    let transport = SpiTransport::new(spi, SimPin::new("dc", &trace), SpiBusConfig::default())
        .unwrap();
    let io: PanelIo<'_, _, 4> = PanelIo::open(transport, PanelIoConfig::DEFERRED).unwrap();

    let geometry = PanelGeometry::new(8, 2, PixelFormat::Rgb565);
    let driver = DcsPanel::new(&io, SimDelay::new(), DcsConfig::new(geometry));
    let mut panel = PanelDispatcher::new(driver).unwrap();

    assert_eq!(
        panel.draw_bitmap(Window::full(2, 8), &pixels),
        Err(Error::InvalidArgument)
    );
    assert!(trace.events().is_empty());

    panel.swap_xy(true).unwrap();
    assert_eq!(panel.resolution(), (2, 8));
    assert!(panel.draw_bitmap(Window::full(2, 8), &pixels).is_ok());
}

#[test]
fn test_draw_needs_queue_for_whole_window() {
    let pixels = [0u8; 2];
    let trace = Trace::new();
    let (spi, _probe) = SimSpi::new(&trace);
    let transport = SpiTransport::new(spi, SimPin::new("dc", &trace), SpiBusConfig::default())
        .unwrap();
    let io: PanelIo<'_, _, 2> = PanelIo::open(transport, PanelIoConfig::DEFERRED).unwrap();

    let geometry = PanelGeometry::new(4, 4, PixelFormat::Rgb565);
    let driver = DcsPanel::new(&io, SimDelay::new(), DcsConfig::new(geometry));
    let mut panel = PanelDispatcher::new(driver).unwrap();

    assert_eq!(
        panel.draw_bitmap(Window::new(0, 0, 1, 1), &pixels),
        Err(Error::Config(ConfigError::QueueDepth))
    );
    assert!(trace.events().is_empty());
}

#[test]
fn test_vendor_orientation_sets_resolution() {
    static SWAPPED: [InitCommand; 1] = [InitCommand::new(0x36, &[0x20])];
    let pixels = [0u8; 32];
    let trace = Trace::new();
    let (spi, _probe) = SimSpi::new(&trace);
    let transport = SpiTransport::new(spi, SimPin::new("dc", &trace), SpiBusConfig::default())
        .unwrap();
    let io: PanelIo<'_, _, 8> = PanelIo::open(transport, PanelIoConfig::DEFERRED).unwrap();

    let geometry = PanelGeometry::new(8, 2, PixelFormat::Rgb565);
    let driver =
        DcsPanel::new(&io, SimDelay::new(), DcsConfig::new(geometry)).with_init_sequence(&SWAPPED);
    let mut panel = PanelDispatcher::new(driver).unwrap();
    assert_eq!(panel.resolution(), (8, 2));

    panel.init().unwrap();
    assert_eq!(panel.resolution(), (2, 8));
    assert!(panel.draw_bitmap(Window::full(2, 8), &pixels).is_ok());
    assert_eq!(
        panel.draw_bitmap(Window::full(8, 2), &pixels),
        Err(Error::InvalidArgument)
    );
}
