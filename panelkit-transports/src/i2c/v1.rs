//! Two-wire transport for command-link peripherals
//!
//! Every link element is a separate hardware step with its own completion
//! interrupt. A lost start (arbitration or address NACK) is retried by
//! issuing a stop and running the frame again from its start; any failure
//! that ends the transaction also releases the bus with a stop first.

use panelkit_core::io::{Direction, OpSequence, Outcome, Step, Transaction, Transport};
use panelkit_core::Error;
use panelkit_hal::i2c::LinkCommand;
use panelkit_hal::{I2cLink, I2cStatus};

use super::{bus_error, validate, Framing, I2cBusConfig};

/// Command-link element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum I2cLinkOp {
    Start,
    Address { read: bool },
    Control,
    Command,
    Payload,
    Read(usize),
    Stop,
}

/// Two-wire transport over a command-link peripheral
pub struct I2cLinkTransport<L> {
    link: L,
    config: I2cBusConfig,
    framing: Framing,
    /// Failure to report once the closing stop completes
    pending_failure: Option<Error>,
}

impl<L: I2cLink> I2cLinkTransport<L> {
    pub fn new(link: L, config: I2cBusConfig) -> Result<Self, Error> {
        config.validate()?;
        debug!("i2c link transport, device {}", config.address);
        Ok(Self {
            link,
            config,
            framing: Framing::default(),
            pending_failure: None,
        })
    }

    pub fn release(self) -> L {
        self.link
    }

    /// Close the frame with a stop, then fail
    fn abort(&mut self, error: Error) -> Outcome<I2cLinkOp> {
        self.pending_failure = Some(error);
        Outcome::Detour {
            op: I2cLinkOp::Stop,
            resume: 0,
        }
    }
}

impl<'a, L: I2cLink> Transport<'a> for I2cLinkTransport<L> {
    type Op = I2cLinkOp;
    type Status = I2cStatus;

    fn validate(&self, txn: &Transaction<'a>) -> Result<(), Error> {
        validate(&self.config, txn)
    }

    fn encode(
        &mut self,
        txn: &Transaction<'a>,
        ops: &mut OpSequence<I2cLinkOp>,
    ) -> Result<(), Error> {
        self.framing.prepare(&self.config, txn)?;
        self.pending_failure = None;

        let mut push = |op| ops.push(op).map_err(|_| Error::InvalidArgument);
        push(I2cLinkOp::Start)?;
        push(I2cLinkOp::Address { read: false })?;
        if self.framing.control.is_some() {
            push(I2cLinkOp::Control)?;
        }
        if !self.framing.command.is_empty() {
            push(I2cLinkOp::Command)?;
        }
        match txn.direction {
            Direction::Write if !txn.payload.is_empty() => push(I2cLinkOp::Payload)?,
            Direction::Write => {}
            Direction::Read { len } => {
                push(I2cLinkOp::Start)?;
                push(I2cLinkOp::Address { read: true })?;
                push(I2cLinkOp::Read(len))?;
            }
        }
        push(I2cLinkOp::Stop)
    }

    fn start(&mut self, op: I2cLinkOp, txn: &Transaction<'a>) -> Result<Step, Error> {
        let command = match op {
            I2cLinkOp::Start => LinkCommand::Start,
            I2cLinkOp::Address { read } => LinkCommand::Address {
                address: self.config.address,
                read,
            },
            I2cLinkOp::Control => LinkCommand::Write(self.framing.control_bytes()),
            I2cLinkOp::Command => LinkCommand::Write(&self.framing.command),
            I2cLinkOp::Payload => LinkCommand::Write(txn.payload.as_bytes()),
            I2cLinkOp::Read(len) => LinkCommand::Read(len),
            I2cLinkOp::Stop => LinkCommand::Stop,
        };
        self.link.issue(command).map_err(bus_error)?;
        Ok(Step::Pending)
    }

    fn acknowledge(&mut self) -> I2cStatus {
        self.link.acknowledge_interrupt()
    }

    fn on_complete(&mut self, op: I2cLinkOp, status: I2cStatus) -> Outcome<I2cLinkOp> {
        if op == I2cLinkOp::Stop {
            if let Some(error) = self.pending_failure.take() {
                return Outcome::Failed(error);
            }
        }

        let Some(fault) = status.fault else {
            return match op {
                I2cLinkOp::Read(_) => Outcome::Received(status.rx),
                _ => Outcome::Next,
            };
        };

        match op {
            I2cLinkOp::Stop => Outcome::Failed(bus_error(fault)),
            I2cLinkOp::Start | I2cLinkOp::Address { .. } if fault.is_start_race() => {
                if self.framing.retry() {
                    trace!("i2c start lost ({:?}), retrying", fault);
                    Outcome::Detour {
                        op: I2cLinkOp::Stop,
                        resume: 0,
                    }
                } else {
                    warn!("i2c device {} unreachable: {:?}", self.config.address, fault);
                    self.abort(bus_error(fault))
                }
            }
            _ => {
                warn!("i2c fault: {:?}", fault);
                self.abort(bus_error(fault))
            }
        }
    }

    fn set_interrupt_enabled(&mut self, enable: bool) {
        self.link.enable_interrupt(enable);
    }
}
