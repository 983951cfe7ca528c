//! Simulated two-wire masters, both revisions

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use panelkit_hal::i2c::LinkCommand;
use panelkit_hal::{I2cFault, I2cLink, I2cMaster, I2cStatus, RxBytes, MAX_RX_BYTES};

use crate::{lock, Event, LinkEvent, Trace};

#[derive(Debug, Default)]
struct State {
    irq_enabled: bool,
    pending: Option<I2cStatus>,
    /// Faults returned for the next address phases, in order
    address_faults: VecDeque<I2cFault>,
    /// Fault returned by the next data write
    data_fault: Option<I2cFault>,
    responses: VecDeque<Vec<u8>>,
    address_attempts: usize,
    written: Vec<u8>,
}

impl State {
    fn latch(&mut self, rx: RxBytes, fault: Option<I2cFault>) {
        self.pending = Some(I2cStatus { rx, fault });
    }

    fn read(&mut self, len: usize) -> RxBytes {
        let response = self.responses.pop_front().unwrap_or_default();
        let mut rx = RxBytes::new();
        for i in 0..len.min(MAX_RX_BYTES) {
            let _ = rx.push(response.get(i).copied().unwrap_or(0));
        }
        rx
    }
}

/// Test-side view of a simulated two-wire master
#[derive(Debug, Clone)]
pub struct I2cProbe {
    state: Arc<Mutex<State>>,
}

impl I2cProbe {
    pub fn irq_pending(&self) -> bool {
        let state = lock(&self.state);
        state.irq_enabled && state.pending.is_some()
    }

    /// NACK the next `count` address phases
    pub fn nack_addresses(&self, count: usize) {
        let mut state = lock(&self.state);
        for _ in 0..count {
            state.address_faults.push_back(I2cFault::AddressNack);
        }
    }

    /// Lose arbitration on the next address phase
    pub fn lose_arbitration(&self) {
        lock(&self.state)
            .address_faults
            .push_back(I2cFault::ArbitrationLost);
    }

    /// NACK the next data write
    pub fn nack_data(&self) {
        lock(&self.state).data_fault = Some(I2cFault::DataNack);
    }

    pub fn push_response(&self, bytes: &[u8]) {
        lock(&self.state).responses.push_back(bytes.to_vec());
    }

    /// Number of address phases attempted, including failed ones
    pub fn address_attempts(&self) -> usize {
        lock(&self.state).address_attempts
    }

    /// Every data byte the device acknowledged
    pub fn written(&self) -> Vec<u8> {
        lock(&self.state).written.clone()
    }
}

fn shared(trace: &Trace) -> (Arc<Mutex<State>>, Trace) {
    (Arc::new(Mutex::new(State::default())), trace.clone())
}

/// Command-link master; every element completes on its own
#[derive(Debug)]
pub struct SimI2cLink {
    state: Arc<Mutex<State>>,
    trace: Trace,
}

impl SimI2cLink {
    pub fn new(trace: &Trace) -> (Self, I2cProbe) {
        let (state, trace) = shared(trace);
        (
            Self {
                state: state.clone(),
                trace,
            },
            I2cProbe { state },
        )
    }
}

impl I2cLink for SimI2cLink {
    fn issue(&mut self, command: LinkCommand<'_>) -> Result<(), I2cFault> {
        let mut state = lock(&self.state);
        match command {
            LinkCommand::Start => {
                self.trace.record(Event::Link(LinkEvent::Start));
                state.latch(RxBytes::new(), None);
            }
            LinkCommand::Address { address, read } => {
                self.trace
                    .record(Event::Link(LinkEvent::Address { address, read }));
                state.address_attempts += 1;
                let fault = state.address_faults.pop_front();
                state.latch(RxBytes::new(), fault);
            }
            LinkCommand::Write(data) => {
                self.trace.record(Event::Link(LinkEvent::Write(data.to_vec())));
                let fault = state.data_fault.take();
                if fault.is_none() {
                    state.written.extend_from_slice(data);
                }
                state.latch(RxBytes::new(), fault);
            }
            LinkCommand::Read(len) => {
                self.trace.record(Event::Link(LinkEvent::Read(len)));
                let rx = state.read(len);
                state.latch(rx, None);
            }
            LinkCommand::Stop => {
                self.trace.record(Event::Link(LinkEvent::Stop));
                state.latch(RxBytes::new(), None);
            }
        }
        Ok(())
    }

    fn is_busy(&self) -> bool {
        lock(&self.state).pending.is_some()
    }

    fn enable_interrupt(&mut self, enable: bool) {
        lock(&self.state).irq_enabled = enable;
    }

    fn acknowledge_interrupt(&mut self) -> I2cStatus {
        lock(&self.state).pending.take().unwrap_or_default()
    }
}

/// Device-oriented master; every frame is one job
#[derive(Debug)]
pub struct SimI2cMaster {
    state: Arc<Mutex<State>>,
    trace: Trace,
}

impl SimI2cMaster {
    pub fn new(trace: &Trace) -> (Self, I2cProbe) {
        let (state, trace) = shared(trace);
        (
            Self {
                state: state.clone(),
                trace,
            },
            I2cProbe { state },
        )
    }

    fn job(&mut self, address: u8, parts: &[&[u8]], read_len: usize) {
        let tx: Vec<u8> = parts.iter().flat_map(|p| p.iter().copied()).collect();
        self.trace.record(Event::I2cJob {
            address,
            tx: tx.clone(),
            rx_len: read_len,
        });

        let mut state = lock(&self.state);
        state.address_attempts += 1;
        if let Some(fault) = state.address_faults.pop_front() {
            state.latch(RxBytes::new(), Some(fault));
            return;
        }
        if let Some(fault) = state.data_fault.take() {
            state.latch(RxBytes::new(), Some(fault));
            return;
        }
        state.written.extend_from_slice(&tx);
        let rx = if read_len > 0 {
            state.read(read_len)
        } else {
            RxBytes::new()
        };
        state.latch(rx, None);
    }
}

impl I2cMaster for SimI2cMaster {
    fn transmit(&mut self, address: u8, parts: &[&[u8]]) -> Result<(), I2cFault> {
        self.job(address, parts, 0);
        Ok(())
    }

    fn transmit_receive(
        &mut self,
        address: u8,
        parts: &[&[u8]],
        read_len: usize,
    ) -> Result<(), I2cFault> {
        self.job(address, parts, read_len);
        Ok(())
    }

    fn is_busy(&self) -> bool {
        lock(&self.state).pending.is_some()
    }

    fn enable_interrupt(&mut self, enable: bool) {
        lock(&self.state).irq_enabled = enable;
    }

    fn acknowledge_interrupt(&mut self) -> I2cStatus {
        lock(&self.state).pending.take().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_address_nack_script() {
        let trace = Trace::new();
        let (mut link, probe) = SimI2cLink::new(&trace);
        probe.nack_addresses(1);

        link.issue(LinkCommand::Address {
            address: 0x3C,
            read: false,
        })
        .unwrap();
        assert_eq!(
            link.acknowledge_interrupt().fault,
            Some(I2cFault::AddressNack)
        );

        link.issue(LinkCommand::Address {
            address: 0x3C,
            read: false,
        })
        .unwrap();
        assert_eq!(link.acknowledge_interrupt().fault, None);
        assert_eq!(probe.address_attempts(), 2);
    }

    #[test]
    fn test_master_gathers_parts() {
        let trace = Trace::new();
        let (mut master, probe) = SimI2cMaster::new(&trace);
        master.transmit(0x3C, &[&[0x00], &[0xAE, 0xD5]]).unwrap();
        assert!(master.acknowledge_interrupt().fault.is_none());
        assert_eq!(probe.written(), vec![0x00, 0xAE, 0xD5]);
    }
}
