//! Panel I/O interface
//!
//! - [`transaction`] - Transactions, payloads and completions
//! - [`transport`] - Contract every transport backend implements
//! - [`panel_io`] - The queue that drives a transport

pub mod panel_io;
pub mod transaction;
pub mod transport;

pub use panel_io::{IoStats, PanelIo, PanelIoOps};
pub use transaction::{
    Completion, CompletionHandler, Direction, Payload, PayloadKind, Transaction, TransactionId,
};
pub use transport::{OpSequence, Outcome, Step, Transport};
