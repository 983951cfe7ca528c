//! Simulated RGB timing generator

use std::sync::{Arc, Mutex};

use panelkit_hal::rgb::RgbTiming;
use panelkit_hal::{DmaChannelRef, RgbStatus, RgbTimingEngine};

use crate::{lock, Event, Trace};

#[derive(Debug, Default)]
struct State {
    timing: Option<RgbTiming>,
    running: bool,
    irq_enabled: bool,
    pending: Option<RgbStatus>,
}

/// Timing generator whose VSYNC is raised by the test
#[derive(Debug)]
pub struct SimRgb {
    state: Arc<Mutex<State>>,
    trace: Trace,
}

/// Test-side view of a [`SimRgb`]
#[derive(Debug, Clone)]
pub struct RgbProbe {
    state: Arc<Mutex<State>>,
}

impl SimRgb {
    pub fn new(trace: &Trace) -> (Self, RgbProbe) {
        let state = Arc::new(Mutex::new(State::default()));
        (
            Self {
                state: state.clone(),
                trace: trace.clone(),
            },
            RgbProbe { state },
        )
    }
}

impl RgbTimingEngine for SimRgb {
    fn configure(&mut self, timing: &RgbTiming) {
        lock(&self.state).timing = Some(*timing);
    }

    fn start(&mut self, channel: DmaChannelRef) {
        self.trace.record(Event::RgbStart { channel });
        lock(&self.state).running = true;
    }

    fn stop(&mut self) {
        self.trace.record(Event::RgbStop);
        lock(&self.state).running = false;
    }

    fn is_busy(&self) -> bool {
        lock(&self.state).running
    }

    fn enable_interrupt(&mut self, enable: bool) {
        lock(&self.state).irq_enabled = enable;
    }

    fn acknowledge_interrupt(&mut self) -> RgbStatus {
        lock(&self.state).pending.take().unwrap_or_default()
    }
}

impl RgbProbe {
    /// Latch a vertical blanking interrupt
    pub fn vsync(&self) {
        lock(&self.state).pending = Some(RgbStatus { vsync: true });
    }

    pub fn is_running(&self) -> bool {
        lock(&self.state).running
    }

    pub fn timing(&self) -> Option<RgbTiming> {
        lock(&self.state).timing
    }
}
