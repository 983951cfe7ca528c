//! Bufferless RGB panel over the streaming bus

use panelkit_core::dma::{DmaEngine, DmaEngineConfig, Link};
use panelkit_core::panel::{PanelDispatcher, PixelFormat, Window};
use panelkit_core::Error;
use panelkit_hal::rgb::RgbTiming;
use panelkit_hal::{DmaChannelRef, DmaDirection, DmaMemory, DmaRegion, Level};
use panelkit_hal_host::{SimDma, SimPin, SimRgb, Trace};
use panelkit_panels::RgbPanel;
use panelkit_transports::{RgbBusConfig, RgbPanelBus};

#[test]
fn test_drawn_window_shows_after_next_pass() {
    let mut pool = [0u8; 64];
    let mut region = DmaRegion::new(&mut pool);
    let trace = Trace::new();
    let (hw, dma) = SimDma::new(&trace);
    let engine: DmaEngine<SimDma, 1, 8> =
        DmaEngine::new(hw, DmaEngineConfig { max_chunk: 8 }).unwrap();

    let timing = RgbTiming {
        pclk_hz: 1_000_000,
        h_res: 4,
        v_res: 2,
        ..Default::default()
    };
    let (generator, _probe) = SimRgb::new(&trace);
    let enable = SimPin::new("en", &trace);
    let bus = RgbPanelBus::new(
        generator,
        enable.clone(),
        &engine,
        RgbBusConfig::new(timing, PixelFormat::Rgb565),
    )
    .unwrap();
    for _ in 0..2 {
        bus.attach_framebuffer(region.allocate_dma_buffer(16).unwrap())
            .unwrap();
    }

    let mut panel = PanelDispatcher::new(RgbPanel::new(&bus)).unwrap();
    assert_eq!(panel.resolution(), (4, 2));
    panel.init().unwrap();
    panel.disp_on_off(true).unwrap();
    assert_eq!(enable.level(), Level::High);
    assert!(bus.is_streaming());

    panel
        .draw_bitmap(Window::new(1, 1, 3, 2), &[1u8, 2, 3, 4])
        .unwrap();

    let channel = DmaChannelRef::new(0, DmaDirection::Tx);
    let head = dma.head(channel).unwrap();
    let Link::Next(tail) = engine.descriptor(head).unwrap().link else {
        panic!("single descriptor chain");
    };
    dma.complete(channel, head);
    bus.on_dma_interrupt().unwrap();
    dma.complete(channel, tail);
    bus.on_dma_interrupt().unwrap();

    let active = bus.with_active(|f| f.map(|f| f.to_vec())).unwrap();
    assert_eq!(&active[..10], &[0u8; 10]);
    assert_eq!(&active[10..14], &[1, 2, 3, 4]);
    assert_eq!(&active[14..], &[0, 0]);
    assert_eq!(bus.stats().swaps, 1);
}

#[test]
fn test_unsupported_operations() {
    let mut pool = [0u8; 32];
    let mut region = DmaRegion::new(&mut pool);
    let trace = Trace::new();
    let (hw, _dma) = SimDma::new(&trace);
    let engine: DmaEngine<SimDma, 1, 4> = DmaEngine::new(hw, DmaEngineConfig::default()).unwrap();

    let timing = RgbTiming {
        pclk_hz: 1_000_000,
        h_res: 2,
        v_res: 2,
        ..Default::default()
    };
    let (generator, _probe) = SimRgb::new(&trace);
    let bus = RgbPanelBus::new(
        generator,
        panelkit_hal::NoPin,
        &engine,
        RgbBusConfig::new(timing, PixelFormat::Rgb565),
    )
    .unwrap();
    bus.attach_framebuffer(region.allocate_dma_buffer(8).unwrap())
        .unwrap();

    let mut panel = PanelDispatcher::new(RgbPanel::new(&bus)).unwrap();
    assert_eq!(panel.mirror(true, false), Err(Error::Unsupported));
    assert_eq!(panel.swap_xy(true), Err(Error::Unsupported));
    assert_eq!(panel.invert_color(true), Err(Error::Unsupported));
    assert_eq!(panel.reset(), Err(Error::Unsupported));
    assert_eq!(panel.resolution(), (2, 2));

    // Only one buffer, and it is being shown
    panel.init().unwrap();
    assert_eq!(
        panel.draw_bitmap(Window::full(2, 2), &[0u8; 8]),
        Err(Error::Busy)
    );
}
