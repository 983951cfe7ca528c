//! Transport backend contract
//!
//! A transport owns one configured bus instance. The panel I/O queue hands
//! it one transaction at a time: the transport encodes it into a short
//! sequence of bus operations, then the queue starts them one by one and
//! feeds every completion interrupt back through [`Transport::on_complete`].
//!
//! Operations refer to parts of the in-flight transaction rather than
//! copying them, so they stay small `Copy` values.

use core::fmt::Debug;

use heapless::Vec;
use panelkit_hal::RxBytes;

use super::transaction::Transaction;
use crate::Error;

/// Longest operation sequence a transaction may encode to
pub const MAX_OPS: usize = 8;

/// Encoded operations of one transaction
pub type OpSequence<Op> = Vec<Op, MAX_OPS>;

/// Result of starting one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Step {
    /// Finished synchronously (control line, direct register write)
    Done,
    /// Running; completion is signalled by interrupt
    Pending,
}

/// Interpretation of a completion interrupt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<Op> {
    /// Operation finished, continue with the next
    Next,
    /// Operation finished and received bytes
    Received(RxBytes),
    /// Operation must run again (next chunk of a staged payload)
    Repeat,
    /// Run `op` out of sequence, then continue at index `resume`
    Detour { op: Op, resume: usize },
    /// Continue at index `index`, discarding received bytes
    Rewind(usize),
    /// The transaction failed
    Failed(Error),
}

/// Transport backend for one bus kind
pub trait Transport<'a> {
    /// Bus operation
    type Op: Copy + Debug;
    /// Hardware status latched by the completion interrupt
    type Status;

    /// Check a transaction against bus limits before it is queued
    fn validate(&self, txn: &Transaction<'a>) -> Result<(), Error>;

    /// Translate a transaction into bus operations. Called when the
    /// transaction becomes the one in flight.
    fn encode(&mut self, txn: &Transaction<'a>, ops: &mut OpSequence<Self::Op>)
        -> Result<(), Error>;

    /// Start one operation
    fn start(&mut self, op: Self::Op, txn: &Transaction<'a>) -> Result<Step, Error>;

    /// Acknowledge the completion interrupt and latch the hardware status
    fn acknowledge(&mut self) -> Self::Status;

    /// Interpret the status of the operation that was running
    fn on_complete(&mut self, op: Self::Op, status: Self::Status) -> Outcome<Self::Op>;

    /// Enable or disable the completion interrupt
    fn set_interrupt_enabled(&mut self, enable: bool);
}
