//! Two-wire transport for master-transmit peripherals
//!
//! The device address is bound when the transport is created and every
//! transaction is a single hardware job: a gathered write of control,
//! command and payload bytes, or that write followed by a read. A lost
//! start re-issues the whole job.

use heapless::Vec;
use panelkit_core::io::{Direction, OpSequence, Outcome, Step, Transaction, Transport};
use panelkit_core::Error;
use panelkit_hal::{I2cMaster, I2cStatus};

use super::{bus_error, validate, Framing, I2cBusConfig};

/// Master-transmit job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum I2cMasterOp {
    Job,
}

/// Two-wire transport over a master-transmit peripheral
pub struct I2cMasterTransport<M> {
    master: M,
    config: I2cBusConfig,
    framing: Framing,
}

impl<M: I2cMaster> I2cMasterTransport<M> {
    pub fn new(master: M, config: I2cBusConfig) -> Result<Self, Error> {
        config.validate()?;
        debug!("i2c master transport, device {}", config.address);
        Ok(Self {
            master,
            config,
            framing: Framing::default(),
        })
    }

    pub fn release(self) -> M {
        self.master
    }
}

impl<'a, M: I2cMaster> Transport<'a> for I2cMasterTransport<M> {
    type Op = I2cMasterOp;
    type Status = I2cStatus;

    fn validate(&self, txn: &Transaction<'a>) -> Result<(), Error> {
        validate(&self.config, txn)
    }

    fn encode(
        &mut self,
        txn: &Transaction<'a>,
        ops: &mut OpSequence<I2cMasterOp>,
    ) -> Result<(), Error> {
        self.framing.prepare(&self.config, txn)?;
        ops.push(I2cMasterOp::Job)
            .map_err(|_| Error::InvalidArgument)
    }

    fn start(&mut self, _: I2cMasterOp, txn: &Transaction<'a>) -> Result<Step, Error> {
        let mut parts: Vec<&[u8], 3> = Vec::new();
        for part in [
            self.framing.control_bytes(),
            self.framing.command.as_slice(),
            txn.payload.as_bytes(),
        ] {
            if !part.is_empty() {
                let _ = parts.push(part);
            }
        }

        let address = self.config.address;
        let issued = match txn.direction {
            Direction::Write => self.master.transmit(address, &parts),
            Direction::Read { len } => self.master.transmit_receive(address, &parts, len),
        };
        issued.map_err(bus_error)?;
        Ok(Step::Pending)
    }

    fn acknowledge(&mut self) -> I2cStatus {
        self.master.acknowledge_interrupt()
    }

    fn on_complete(&mut self, _: I2cMasterOp, status: I2cStatus) -> Outcome<I2cMasterOp> {
        match status.fault {
            None if status.rx.is_empty() => Outcome::Next,
            None => Outcome::Received(status.rx),
            Some(fault) if fault.is_start_race() && self.framing.retry() => {
                trace!("i2c start lost ({:?}), retrying", fault);
                Outcome::Rewind(0)
            }
            Some(fault) => {
                warn!("i2c device {} failed: {:?}", self.config.address, fault);
                Outcome::Failed(bus_error(fault))
            }
        }
    }

    fn set_interrupt_enabled(&mut self, enable: bool) {
        self.master.enable_interrupt(enable);
    }
}
