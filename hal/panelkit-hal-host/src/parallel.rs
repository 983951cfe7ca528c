//! Simulated parallel LCD peripheral (i80 or I2S parallel mode)

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use panelkit_hal::{DmaChannelRef, ParallelBus, ParallelFault, ParallelStatus};

use crate::{lock, Event, Trace};

#[derive(Debug, Default)]
struct State {
    irq_enabled: bool,
    byte_swap: bool,
    pending: Option<ParallelStatus>,
    faults: VecDeque<ParallelFault>,
    direct_bytes: usize,
    dma_bytes: usize,
    dma_passes: usize,
}

/// Parallel bus whose DMA passes finish instantly
#[derive(Debug)]
pub struct SimParallel {
    width: u8,
    state: Arc<Mutex<State>>,
    trace: Trace,
}

/// Test-side view of a [`SimParallel`]
#[derive(Debug, Clone)]
pub struct ParallelProbe {
    state: Arc<Mutex<State>>,
}

impl SimParallel {
    /// Bus of `width` data lines (8 or 16)
    pub fn new(width: u8, trace: &Trace) -> (Self, ParallelProbe) {
        let state = Arc::new(Mutex::new(State::default()));
        (
            Self {
                width,
                state: state.clone(),
                trace: trace.clone(),
            },
            ParallelProbe { state },
        )
    }
}

impl ParallelBus for SimParallel {
    fn bus_width(&self) -> u8 {
        self.width
    }

    fn set_byte_swap(&mut self, swap: bool) {
        lock(&self.state).byte_swap = swap;
    }

    fn write_direct(&mut self, data: &[u8]) -> Result<(), ParallelFault> {
        self.trace.record(Event::ParallelDirect(data.to_vec()));
        lock(&self.state).direct_bytes += data.len();
        Ok(())
    }

    fn start_dma(&mut self, channel: DmaChannelRef, len: usize) -> Result<(), ParallelFault> {
        self.trace.record(Event::ParallelDma { channel, len });
        let mut state = lock(&self.state);
        state.dma_bytes += len;
        state.dma_passes += 1;
        let fault = state.faults.pop_front();
        state.pending = Some(ParallelStatus { fault });
        Ok(())
    }

    fn is_busy(&self) -> bool {
        lock(&self.state).pending.is_some()
    }

    fn enable_interrupt(&mut self, enable: bool) {
        lock(&self.state).irq_enabled = enable;
    }

    fn acknowledge_interrupt(&mut self) -> ParallelStatus {
        lock(&self.state).pending.take().unwrap_or_default()
    }
}

impl ParallelProbe {
    pub fn irq_pending(&self) -> bool {
        let state = lock(&self.state);
        state.irq_enabled && state.pending.is_some()
    }

    /// Report `fault` at the end of the next DMA pass
    pub fn inject_fault(&self, fault: ParallelFault) {
        lock(&self.state).faults.push_back(fault);
    }

    pub fn byte_swap(&self) -> bool {
        lock(&self.state).byte_swap
    }

    pub fn direct_bytes(&self) -> usize {
        lock(&self.state).direct_bytes
    }

    pub fn dma_bytes(&self) -> usize {
        lock(&self.state).dma_bytes
    }

    pub fn dma_passes(&self) -> usize {
        lock(&self.state).dma_passes
    }
}
