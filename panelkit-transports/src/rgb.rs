//! RGB (DPI) streaming bus
//!
//! The timing generator scans the active frame buffer out of a DMA ring
//! continuously. Frames rotate through [`FrameBuffers`]: the application
//! acquires a free buffer, draws into it and presents it; the swap is
//! requested from the DMA engine and takes effect at the next pass
//! boundary, so the panel never shows a half-switched frame.
//!
//! In refresh-on-demand mode there is no ring. Every [`RgbPanelBus::refresh`]
//! scans the newest frame out exactly once through a one-shot chain.
//!
//! Both interrupt entry points ([`RgbPanelBus::on_dma_interrupt`] and
//! [`RgbPanelBus::on_vsync_interrupt`]) are safe to call from interrupt
//! context; stream events reach the handler after the bus lock is released.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use heapless::Vec;
use panelkit_core::config::ConfigError;
use panelkit_core::dma::{ChainHandle, ChainMode, DmaEngine, StopState};
use panelkit_core::framebuffer::{FrameBuffers, FrameState};
use panelkit_core::panel::{PanelGeometry, PixelFormat};
use panelkit_core::stream::{FrameSink, StreamEvent, StreamEventHandler};
use panelkit_core::Error;
use panelkit_hal::rgb::RgbTiming;
use panelkit_hal::{DmaBuffer, DmaChannelRef, DmaDirection, DmaHardware, Level, OutputPin};
use panelkit_hal::RgbTimingEngine;
use portable_atomic::{AtomicU32, Ordering};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// RGB bus configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RgbBusConfig {
    pub timing: RgbTiming,
    pub format: PixelFormat,
    /// Scan a frame only when [`RgbPanelBus::refresh`] is called
    pub refresh_on_demand: bool,
}

impl RgbBusConfig {
    pub fn new(timing: RgbTiming, format: PixelFormat) -> Self {
        Self {
            timing,
            format,
            refresh_on_demand: false,
        }
    }

    pub fn with_refresh_on_demand(mut self, on_demand: bool) -> Self {
        self.refresh_on_demand = on_demand;
        self
    }

    pub fn geometry(&self) -> PanelGeometry {
        PanelGeometry::new(self.timing.h_res, self.timing.v_res, self.format)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timing.pclk_hz == 0 || self.timing.h_res == 0 || self.timing.v_res == 0 {
            return Err(ConfigError::Timing);
        }
        Ok(())
    }
}

/// Counters of one RGB bus
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RgbStats {
    /// Passes scanned out completely
    pub frames: u32,
    /// Presented frames that became active
    pub swaps: u32,
    /// Passes that repeated the old frame while a new one was being drawn
    pub underruns: u32,
    /// Vertical blanking interrupts
    pub vsyncs: u32,
}

struct StreamState<'e, 'd, T, EN> {
    timing: T,
    enable: EN,
    frames: FrameBuffers<'d>,
    /// Allocated from start until the stream is stopped
    chain: Option<ChainHandle>,
    /// Bound while a pass is being scanned
    channel: Option<DmaChannelRef>,
    stopping: bool,
    handler: Option<&'e dyn StreamEventHandler>,
}

/// Events raised by one call, delivered after unlock
type Events = Vec<StreamEvent, 4>;

type Handler<'e> = Option<&'e dyn StreamEventHandler>;

/// RGB streaming bus over timing generator `T` with display-enable line `EN`
pub struct RgbPanelBus<'e, 'd, T, EN, H, const CH: usize, const D: usize> {
    state: Mutex<CriticalSectionRawMutex, RefCell<StreamState<'e, 'd, T, EN>>>,
    engine: &'e DmaEngine<H, CH, D>,
    config: RgbBusConfig,
    frames_done: AtomicU32,
    swaps: AtomicU32,
    underruns: AtomicU32,
    vsyncs: AtomicU32,
}

impl<'e, 'd, T, EN, H, const CH: usize, const D: usize> RgbPanelBus<'e, 'd, T, EN, H, CH, D>
where
    T: RgbTimingEngine,
    EN: OutputPin,
    H: DmaHardware,
{
    /// Program the timing generator. Frame buffers are attached separately
    /// before the stream starts.
    pub fn new(
        mut timing: T,
        mut enable: EN,
        engine: &'e DmaEngine<H, CH, D>,
        config: RgbBusConfig,
    ) -> Result<Self, Error> {
        config.validate()?;
        let geometry = config.geometry();
        timing.configure(&config.timing);
        timing.enable_interrupt(true);
        enable.set_low();
        debug!(
            "rgb bus {}x{}, {} byte frames",
            geometry.width,
            geometry.height,
            geometry.frame_len()
        );

        Ok(Self {
            state: Mutex::new(RefCell::new(StreamState {
                timing,
                enable,
                frames: FrameBuffers::new(geometry.frame_len()),
                chain: None,
                channel: None,
                stopping: false,
                handler: None,
            })),
            engine,
            config,
            frames_done: AtomicU32::new(0),
            swaps: AtomicU32::new(0),
            underruns: AtomicU32::new(0),
            vsyncs: AtomicU32::new(0),
        })
    }

    fn with<R>(&self, f: impl FnOnce(&mut StreamState<'e, 'd, T, EN>) -> R) -> R {
        self.state.lock(|cell| f(&mut cell.borrow_mut()))
    }

    fn deliver(&self, handler: Handler<'e>, events: Events) {
        if let Some(handler) = handler {
            for event in events {
                handler.on_event(event);
            }
        }
    }

    pub fn config(&self) -> &RgbBusConfig {
        &self.config
    }

    /// Add a frame buffer (up to three). The first one attached is shown
    /// when the stream starts.
    pub fn attach_framebuffer(&self, buffer: DmaBuffer<'d>) -> Result<(), Error> {
        self.with(|s| {
            if s.chain.is_some() {
                return Err(Error::Busy);
            }
            s.frames.attach(buffer)
        })
    }

    pub fn set_event_handler(&self, handler: &'e dyn StreamEventHandler) {
        self.with(|s| s.handler = Some(handler));
    }

    /// Start streaming the active frame. In refresh-on-demand mode this
    /// only prepares the one-shot chain.
    pub fn start(&self) -> Result<(), Error> {
        self.with(|s| {
            if s.chain.is_some() {
                return Err(Error::Busy);
            }
            let active = s
                .frames
                .active()
                .ok_or(Error::Config(ConfigError::FrameBufferCount))?;

            if self.config.refresh_on_demand {
                s.chain = Some(self.engine.allocate_chain(&[active], ChainMode::OneShot)?);
                debug!("rgb bus ready for refresh");
                return Ok(());
            }

            let chain = self.engine.allocate_chain(&[active], ChainMode::Ring)?;
            let channel = match self.launch(chain) {
                Ok(channel) => channel,
                Err(e) => {
                    let _ = self.engine.free_chain(chain);
                    return Err(e);
                }
            };
            s.timing.start(channel);
            s.chain = Some(chain);
            s.channel = Some(channel);
            s.stopping = false;
            info!("rgb stream started on channel {}", channel.index);
            Ok(())
        })
    }

    /// Bind and start `chain` on a free transmit channel
    fn launch(&self, chain: ChainHandle) -> Result<DmaChannelRef, Error> {
        let channel = self.engine.bind(chain, DmaDirection::Tx)?;
        if let Err(e) = self.engine.start(channel) {
            let _ = self.engine.release(channel);
            return Err(e);
        }
        Ok(channel)
    }

    /// Stop streaming. A running pass finishes first; [`StreamEvent::Stopped`]
    /// is raised once the channel is released.
    pub fn stop(&self) -> Result<(), Error> {
        let mut events = Events::new();
        let handler = self.with(|s| -> Result<Handler<'e>, Error> {
            let Some(chain) = s.chain else {
                return Ok(s.handler);
            };
            if let Some(channel) = s.channel {
                if self.engine.stop(channel)? == StopState::Pending {
                    s.stopping = true;
                    return Ok(s.handler);
                }
            }
            self.finish_stop(s, chain);
            let _ = events.push(StreamEvent::Stopped);
            Ok(s.handler)
        })?;
        self.deliver(handler, events);
        Ok(())
    }

    fn finish_stop(&self, s: &mut StreamState<'e, 'd, T, EN>, chain: ChainHandle) {
        s.timing.stop();
        if let Err(e) = self.engine.free_chain(chain) {
            error!("rgb chain release failed: {:?}", e);
        }
        s.chain = None;
        s.channel = None;
        s.stopping = false;
        info!("rgb stream stopped");
    }

    /// Writable frame buffer; `Busy` if all are in use
    pub fn acquire(&self) -> Result<DmaBuffer<'d>, Error> {
        self.with(|s| s.frames.acquire())
    }

    /// Writable frame buffer holding a copy of the newest frame
    pub fn acquire_synced(&self) -> Result<DmaBuffer<'d>, Error> {
        self.with(|s| s.frames.acquire_synced())
    }

    /// Hand an acquired frame back for display. A newer present replaces
    /// a frame still waiting; the replaced one becomes free again. A frame
    /// the ring cannot switch to is handed back with the error.
    pub fn present(&self, frame: DmaBuffer<'d>) -> Result<(), (DmaBuffer<'d>, Error)> {
        self.with(|s| {
            if s.frames.state_of(frame.addr()) != Some(FrameState::Acquired) {
                return Err((frame, Error::InvalidArgument));
            }
            let streaming = s.channel.filter(|_| !self.config.refresh_on_demand);
            if let Some(channel) = streaming {
                if let Err(e) = self.engine.request_swap(channel, frame.as_dma_slice()) {
                    warn!("rgb swap request refused: {:?}", e);
                    return Err((frame, e));
                }
            }

            if let Some(addr) = s.frames.present(frame)? {
                trace!("rgb frame {:x} replaced before latch", addr);
            }
            // Without a ring the frame is shown by the next start, or picked
            // up by the next refresh
            if s.channel.is_none() && !self.config.refresh_on_demand {
                s.frames.promote_queued();
            }
            Ok(())
        })
    }

    /// Scan the newest frame out once (refresh-on-demand mode only)
    pub fn refresh(&self) -> Result<(), Error> {
        if !self.config.refresh_on_demand {
            return Err(Error::InvalidArgument);
        }
        self.with(|s| {
            let chain = s.chain.ok_or(Error::InvalidArgument)?;
            if s.channel.is_some() || s.stopping {
                return Err(Error::Busy);
            }
            s.frames.promote_queued();
            let active = s
                .frames
                .active()
                .ok_or(Error::Config(ConfigError::FrameBufferCount))?;
            self.engine.retarget_chain(chain, active)?;

            let channel = self.launch(chain)?;
            s.timing.start(channel);
            s.channel = Some(channel);
            trace!("rgb refresh on channel {}", channel.index);
            Ok(())
        })
    }

    /// DMA channel interrupt entry point
    ///
    /// A channel fault ends the stream: [`StreamEvent::Stopped`] is raised,
    /// the fault is returned and [`RgbPanelBus::start`] may be called again.
    pub fn on_dma_interrupt(&self) -> Result<(), Error> {
        let mut events = Events::new();
        let (handler, fault) = self.with(|s| -> Result<(Handler<'e>, Option<Error>), Error> {
            let Some(channel) = s.channel else {
                trace!("rgb dma interrupt while idle");
                return Ok((None, None));
            };
            let event = match self.engine.on_channel_interrupt(channel) {
                Ok(event) => event,
                // The engine already released the channel
                Err(e) if !self.engine.is_running(channel) => {
                    error!("rgb stream halted by dma fault: {:?}", e);
                    s.channel = None;
                    if let Some(chain) = s.chain {
                        self.finish_stop(s, chain);
                    }
                    let _ = events.push(StreamEvent::Stopped);
                    return Ok((s.handler, Some(e)));
                }
                Err(e) => return Err(e),
            };
            let rotation = s
                .frames
                .reconcile(event.active_base, event.next_base, event.wrapped);

            if event.wrapped || event.done {
                self.frames_done.fetch_add(1, Ordering::Relaxed);
                let _ = events.push(StreamEvent::FrameDone);
            }
            if rotation.swapped {
                self.swaps.fetch_add(1, Ordering::Relaxed);
                let _ = events.push(StreamEvent::Swapped);
            }
            if rotation.underrun {
                self.underruns.fetch_add(1, Ordering::Relaxed);
                warn!("rgb underrun, frame repeated");
                let _ = events.push(StreamEvent::Underrun);
            }

            if event.stopped || event.done {
                s.channel = None;
                let chain = s.chain.filter(|_| event.stopped || s.stopping);
                match chain {
                    Some(chain) => {
                        self.finish_stop(s, chain);
                        let _ = events.push(StreamEvent::Stopped);
                    }
                    // One refresh pass done, the chain stays for the next
                    None => s.timing.stop(),
                }
            }
            Ok((s.handler, None))
        })?;
        self.deliver(handler, events);
        match fault {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Timing generator (VSYNC) interrupt entry point
    pub fn on_vsync_interrupt(&self) {
        let status = self.with(|s| s.timing.acknowledge_interrupt());
        if status.vsync {
            self.vsyncs.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Drive the display-enable line
    pub fn set_enabled(&self, on: bool) {
        self.with(|s| s.enable.set_level(Level::from_high(on)));
    }

    /// Check if a pass is being scanned out
    pub fn is_streaming(&self) -> bool {
        self.with(|s| s.channel.is_some())
    }

    /// Run `f` with the contents of the frame being scanned out
    pub fn with_active<R>(&self, f: impl FnOnce(Option<&[u8]>) -> R) -> R {
        self.with(|s| f(s.frames.read_active()))
    }

    pub fn stats(&self) -> RgbStats {
        RgbStats {
            frames: self.frames_done.load(Ordering::Relaxed),
            swaps: self.swaps.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
            vsyncs: self.vsyncs.load(Ordering::Relaxed),
        }
    }
}

impl<'e, 'd, T, EN, H, const CH: usize, const D: usize> FrameSink<'d>
    for RgbPanelBus<'e, 'd, T, EN, H, CH, D>
where
    T: RgbTimingEngine,
    EN: OutputPin,
    H: DmaHardware,
{
    fn geometry(&self) -> PanelGeometry {
        self.config.geometry()
    }

    fn start(&self) -> Result<(), Error> {
        RgbPanelBus::start(self)
    }

    fn stop(&self) -> Result<(), Error> {
        RgbPanelBus::stop(self)
    }

    fn acquire_synced(&self) -> Result<DmaBuffer<'d>, Error> {
        RgbPanelBus::acquire_synced(self)
    }

    fn present(&self, frame: DmaBuffer<'d>) -> Result<(), (DmaBuffer<'d>, Error)> {
        RgbPanelBus::present(self, frame)?;
        if self.config.refresh_on_demand {
            // Nothing scans a presented frame on its own in this mode
            if let Err(e) = self.refresh() {
                debug!("rgb refresh deferred: {:?}", e);
            }
        }
        Ok(())
    }

    fn set_enabled(&self, on: bool) -> Result<(), Error> {
        RgbPanelBus::set_enabled(self, on);
        Ok(())
    }
}
