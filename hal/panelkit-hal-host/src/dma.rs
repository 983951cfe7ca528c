//! Simulated DMA controller
//!
//! The simulation does not walk descriptors itself; the test plays the
//! controller by reporting which descriptor finished with
//! [`DmaProbe::complete`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use panelkit_hal::{DmaChannelRef, DmaFault, DmaHardware, DmaStatus};

use crate::{lock, Event, Trace};

#[derive(Debug, Default)]
struct Channel {
    running: bool,
    irq_enabled: bool,
    head: Option<u16>,
    pending: Option<DmaStatus>,
}

#[derive(Debug, Default)]
struct State {
    channels: HashMap<DmaChannelRef, Channel>,
    refuse_next: Option<DmaFault>,
}

/// DMA controller driven by the test
#[derive(Debug)]
pub struct SimDma {
    state: Arc<Mutex<State>>,
    trace: Trace,
}

/// Test-side view of a [`SimDma`]
#[derive(Debug, Clone)]
pub struct DmaProbe {
    state: Arc<Mutex<State>>,
}

impl SimDma {
    pub fn new(trace: &Trace) -> (Self, DmaProbe) {
        let state = Arc::new(Mutex::new(State::default()));
        (
            Self {
                state: state.clone(),
                trace: trace.clone(),
            },
            DmaProbe { state },
        )
    }
}

impl DmaHardware for SimDma {
    fn initiate(&mut self, channel: DmaChannelRef, head: u16) -> Result<(), DmaFault> {
        let mut state = lock(&self.state);
        if let Some(fault) = state.refuse_next.take() {
            return Err(fault);
        }
        self.trace.record(Event::DmaStart { channel, head });
        let ch = state.channels.entry(channel).or_default();
        ch.running = true;
        ch.head = Some(head);
        Ok(())
    }

    fn halt(&mut self, channel: DmaChannelRef) {
        self.trace.record(Event::DmaHalt { channel });
        let mut state = lock(&self.state);
        let ch = state.channels.entry(channel).or_default();
        ch.running = false;
    }

    fn is_busy(&self, channel: DmaChannelRef) -> bool {
        lock(&self.state)
            .channels
            .get(&channel)
            .map(|ch| ch.running)
            .unwrap_or(false)
    }

    fn enable_interrupt(&mut self, channel: DmaChannelRef, enable: bool) {
        lock(&self.state)
            .channels
            .entry(channel)
            .or_default()
            .irq_enabled = enable;
    }

    fn acknowledge_interrupt(&mut self, channel: DmaChannelRef) -> DmaStatus {
        lock(&self.state)
            .channels
            .get_mut(&channel)
            .and_then(|ch| ch.pending.take())
            .unwrap_or_default()
    }
}

impl DmaProbe {
    /// Report that the controller finished descriptor `index` on `channel`
    pub fn complete(&self, channel: DmaChannelRef, index: u16) {
        let mut state = lock(&self.state);
        let ch = state.channels.entry(channel).or_default();
        ch.pending = Some(DmaStatus {
            completed: Some(index),
            fault: None,
        });
    }

    /// Raise a fault on `channel`
    pub fn fault(&self, channel: DmaChannelRef, fault: DmaFault) {
        let mut state = lock(&self.state);
        let ch = state.channels.entry(channel).or_default();
        ch.pending = Some(DmaStatus {
            completed: None,
            fault: Some(fault),
        });
        ch.running = false;
    }

    /// Refuse to start the next chain
    pub fn refuse_next(&self, fault: DmaFault) {
        lock(&self.state).refuse_next = Some(fault);
    }

    pub fn irq_pending(&self, channel: DmaChannelRef) -> bool {
        lock(&self.state)
            .channels
            .get(&channel)
            .map(|ch| ch.irq_enabled && ch.pending.is_some())
            .unwrap_or(false)
    }

    pub fn is_running(&self, channel: DmaChannelRef) -> bool {
        lock(&self.state)
            .channels
            .get(&channel)
            .map(|ch| ch.running)
            .unwrap_or(false)
    }

    /// Chain head most recently loaded into `channel`
    pub fn head(&self, channel: DmaChannelRef) -> Option<u16> {
        lock(&self.state).channels.get(&channel).and_then(|ch| ch.head)
    }
}
