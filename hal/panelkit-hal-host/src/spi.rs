//! Simulated SPI master

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use panelkit_hal::{RxBytes, SpiEngine, SpiFault, SpiStatus, SpiTransfer, MAX_RX_BYTES};

use crate::{lock, Event, Trace};

#[derive(Debug, Default)]
struct State {
    irq_enabled: bool,
    pending: Option<SpiStatus>,
    responses: VecDeque<Vec<u8>>,
    faults: VecDeque<SpiFault>,
    refuse_next: Option<SpiFault>,
    transfers: usize,
    bytes_clocked: usize,
}

/// SPI master that clocks every exchange instantly
#[derive(Debug)]
pub struct SimSpi {
    state: Arc<Mutex<State>>,
    trace: Trace,
}

/// Test-side view of a [`SimSpi`]
#[derive(Debug, Clone)]
pub struct SpiProbe {
    state: Arc<Mutex<State>>,
}

impl SimSpi {
    pub fn new(trace: &Trace) -> (Self, SpiProbe) {
        let state = Arc::new(Mutex::new(State::default()));
        (
            Self {
                state: state.clone(),
                trace: trace.clone(),
            },
            SpiProbe { state },
        )
    }
}

impl SpiEngine for SimSpi {
    fn initiate(&mut self, transfer: SpiTransfer<'_>) -> Result<(), SpiFault> {
        let mut state = lock(&self.state);
        if let Some(fault) = state.refuse_next.take() {
            return Err(fault);
        }

        let (tx, rx_len) = match transfer {
            SpiTransfer::Write(data) => (data.to_vec(), 0),
            SpiTransfer::Read(len) => (Vec::new(), len),
            SpiTransfer::Exchange(data) => (data.to_vec(), data.len()),
        };
        self.trace.record(Event::SpiClock {
            tx: tx.clone(),
            rx_len,
        });

        let mut rx = RxBytes::new();
        if rx_len > 0 {
            let response = state.responses.pop_front().unwrap_or_default();
            for i in 0..rx_len.min(MAX_RX_BYTES) {
                let _ = rx.push(response.get(i).copied().unwrap_or(0));
            }
        }

        state.transfers += 1;
        state.bytes_clocked += transfer.len();
        let fault = state.faults.pop_front();
        state.pending = Some(SpiStatus { rx, fault });
        Ok(())
    }

    fn is_busy(&self) -> bool {
        lock(&self.state).pending.is_some()
    }

    fn enable_interrupt(&mut self, enable: bool) {
        lock(&self.state).irq_enabled = enable;
    }

    fn acknowledge_interrupt(&mut self) -> SpiStatus {
        lock(&self.state).pending.take().unwrap_or_default()
    }
}

impl SpiProbe {
    /// Completion interrupt latched and enabled
    pub fn irq_pending(&self) -> bool {
        let state = lock(&self.state);
        state.irq_enabled && state.pending.is_some()
    }

    /// Bytes returned by the next read or exchange
    pub fn push_response(&self, bytes: &[u8]) {
        lock(&self.state).responses.push_back(bytes.to_vec());
    }

    /// Report `fault` in the status of the next exchange
    pub fn inject_fault(&self, fault: SpiFault) {
        lock(&self.state).faults.push_back(fault);
    }

    /// Refuse to start the next exchange
    pub fn refuse_next(&self, fault: SpiFault) {
        lock(&self.state).refuse_next = Some(fault);
    }

    pub fn transfers(&self) -> usize {
        lock(&self.state).transfers
    }

    pub fn bytes_clocked(&self) -> usize {
        lock(&self.state).bytes_clocked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exchange_latches_status() {
        let trace = Trace::new();
        let (mut spi, probe) = SimSpi::new(&trace);
        spi.enable_interrupt(true);
        probe.push_response(&[0xAB, 0xCD]);

        spi.initiate(SpiTransfer::Read(2)).unwrap();
        assert!(probe.irq_pending());
        let status = spi.acknowledge_interrupt();
        assert_eq!(status.rx.as_slice(), &[0xAB, 0xCD]);
        assert!(status.fault.is_none());
        assert!(!spi.is_busy());
        assert_eq!(
            trace.events(),
            vec![Event::SpiClock {
                tx: vec![],
                rx_len: 2
            }]
        );
    }

    #[test]
    fn test_injected_fault() {
        let trace = Trace::new();
        let (mut spi, probe) = SimSpi::new(&trace);
        probe.inject_fault(SpiFault::Overrun);
        spi.initiate(SpiTransfer::Write(&[1])).unwrap();
        assert!(!probe.irq_pending()); // interrupt disabled
        assert_eq!(spi.acknowledge_interrupt().fault, Some(SpiFault::Overrun));
    }
}
