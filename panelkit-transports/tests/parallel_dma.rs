//! Parallel buses: direct phases, one-shot DMA passes and bounce staging

use panelkit_core::dma::{ChainMode, DmaEngine, DmaEngineConfig};
use panelkit_core::io::PanelIo;
use panelkit_core::{Error, PanelIoConfig};
use panelkit_hal::{DmaDirection, DmaMemory, DmaRegion, Level};
use panelkit_hal_host::{Event, SimDma, SimParallel, SimPin, Trace};
use panelkit_transports::{I2sParallelConfig, I2sParallelTransport, I80Config, I80Transport};

type Engine = DmaEngine<SimDma, 1, 8>;

fn engine(trace: &Trace) -> Engine {
    let (hw, _probe) = SimDma::new(trace);
    DmaEngine::new(hw, DmaEngineConfig::default()).unwrap()
}

fn dma_lengths(trace: &Trace) -> Vec<usize> {
    trace
        .events()
        .iter()
        .filter_map(|e| match e {
            Event::ParallelDma { len, .. } => Some(*len),
            _ => None,
        })
        .collect()
}

#[test]
fn test_i80_large_payload_uses_dma_and_returns_resources() {
    let mut pool = [0u8; 160];
    let mut region = DmaRegion::new(&mut pool);
    let mut frame = region.allocate_dma_buffer(128).unwrap();
    frame.fill(0x5A);
    let frame = frame.into_dma_slice();

    let trace = Trace::new();
    let engine = engine(&trace);
    let (bus, probe) = SimParallel::new(16, &trace);
    let config = I80Config::default().with_swap_color_bytes(true);
    let transport = I80Transport::new(bus, SimPin::new("dc", &trace), &engine, config).unwrap();
    let io: PanelIo<'_, _, 4> = PanelIo::open(transport, PanelIoConfig::DEFERRED).unwrap();

    io.tx_color(Some(0x2C), frame).unwrap();
    assert!(engine.is_running(panelkit_hal::DmaChannelRef::new(0, DmaDirection::Tx)));
    while probe.irq_pending() {
        io.on_interrupt();
    }

    let completion = io.take_completion().unwrap();
    assert!(completion.is_ok());
    assert_eq!(completion.transferred, 128);

    // 16-bit bus widens the command to one word
    assert_eq!(trace.events()[2], Event::ParallelDirect(vec![0x00, 0x2C]));
    assert_eq!(dma_lengths(&trace), vec![128]);
    assert!(probe.byte_swap());
    assert_eq!(
        trace.events().last(),
        Some(&Event::Line {
            pin: "dc",
            level: Level::High
        })
    );

    assert_eq!(engine.free_descriptors(), 8);
    assert_eq!(engine.free_channels(DmaDirection::Tx), 1);
}

#[test]
fn test_i80_short_payload_is_written_directly() {
    let trace = Trace::new();
    let engine = engine(&trace);
    let (bus, probe) = SimParallel::new(8, &trace);
    let transport =
        I80Transport::new(bus, SimPin::new("dc", &trace), &engine, I80Config::default()).unwrap();
    let io: PanelIo<'_, _, 4> = PanelIo::open(transport, PanelIoConfig::DEFERRED).unwrap();

    io.tx_param(Some(0x36), &[0x48]).unwrap();

    // Nothing waits for an interrupt
    assert!(!probe.irq_pending());
    assert!(io.take_completion().unwrap().is_ok());
    assert_eq!(
        trace.events(),
        vec![
            Event::Line {
                pin: "dc",
                level: Level::High
            },
            Event::Line {
                pin: "dc",
                level: Level::Low
            },
            Event::ParallelDirect(vec![0x36]),
            Event::Line {
                pin: "dc",
                level: Level::High
            },
            Event::ParallelDirect(vec![0x48]),
            Event::Line {
                pin: "dc",
                level: Level::High
            },
        ]
    );
    assert_eq!(probe.direct_bytes(), 2);
}

#[test]
fn test_i80_without_free_channel_fails_cleanly() {
    let mut pool = [0u8; 160];
    let mut region = DmaRegion::new(&mut pool);
    let other = region.allocate_dma_buffer(16).unwrap().into_dma_slice();
    let frame = region.allocate_dma_buffer(64).unwrap().into_dma_slice();

    let trace = Trace::new();
    let engine = engine(&trace);
    // Someone else holds the only transmit channel
    let held = engine.allocate_chain(&[other], ChainMode::OneShot).unwrap();
    engine.bind(held, DmaDirection::Tx).unwrap();
    let free_before = engine.free_descriptors();

    let (bus, probe) = SimParallel::new(8, &trace);
    let transport =
        I80Transport::new(bus, SimPin::new("dc", &trace), &engine, I80Config::default()).unwrap();
    let io: PanelIo<'_, _, 4> = PanelIo::open(transport, PanelIoConfig::DEFERRED).unwrap();

    io.tx_color(None, frame).unwrap();
    assert!(!probe.irq_pending());
    assert_eq!(
        io.take_completion().unwrap().status,
        Err(Error::ResourceExhausted)
    );
    assert_eq!(engine.free_descriptors(), free_before);
    assert_eq!(probe.dma_passes(), 0);
}

#[test]
fn test_i80_rejects_long_payload_outside_dma_memory() {
    let pixels = [0u8; 64];
    let trace = Trace::new();
    let engine = engine(&trace);
    let (bus, _probe) = SimParallel::new(8, &trace);
    let transport =
        I80Transport::new(bus, SimPin::new("dc", &trace), &engine, I80Config::default()).unwrap();
    let io: PanelIo<'_, _, 4> = PanelIo::open(transport, PanelIoConfig::DEFERRED).unwrap();

    assert_eq!(io.tx_color(Some(0x2C), &pixels), Err(Error::InvalidArgument));
}

#[test]
fn test_i2s_stages_payload_in_bounce_chunks() {
    let pixels: Vec<u8> = (1..=10).collect();
    let mut pool = [0u8; 16];
    let mut region = DmaRegion::new(&mut pool);

    let trace = Trace::new();
    let engine = engine(&trace);
    let (bus, probe) = SimParallel::new(16, &trace);
    let config = I2sParallelConfig::default()
        .with_inline_threshold(4)
        .with_bounce_bytes(8);
    let transport = I2sParallelTransport::new(
        bus,
        SimPin::new("dc", &trace),
        &engine,
        &mut region,
        config,
    )
    .unwrap();
    let io: PanelIo<'_, _, 4> = PanelIo::open(transport, PanelIoConfig::DEFERRED).unwrap();

    io.tx_color(Some(0x2C), pixels.as_slice()).unwrap();
    while probe.irq_pending() {
        io.on_interrupt();
    }

    let completion = io.take_completion().unwrap();
    assert!(completion.is_ok());
    assert_eq!(completion.transferred, 10);

    // 8 bytes, then the last 2 padded to a word
    assert_eq!(dma_lengths(&trace), vec![8, 4]);
    assert_eq!(probe.dma_passes(), 2);
    assert_eq!(engine.free_descriptors(), 8);

    let Ok(transport) = io.close() else {
        panic!("queue not drained");
    };
    let (_bus, _dc, bounce) = transport.release();
    assert_eq!(&bounce[..], &[0, 0, 9, 10, 7, 8, 5, 6]);
}

#[test]
fn test_i2s_bounce_allocation_failure() {
    let mut pool = [0u8; 4];
    let mut region = DmaRegion::new(&mut pool);
    let trace = Trace::new();
    let engine = engine(&trace);
    let (bus, _probe) = SimParallel::new(8, &trace);

    let result = I2sParallelTransport::new(
        bus,
        SimPin::new("dc", &trace),
        &engine,
        &mut region,
        I2sParallelConfig::default().with_bounce_bytes(8),
    );
    assert_eq!(result.err(), Some(Error::OutOfMemory));
}
