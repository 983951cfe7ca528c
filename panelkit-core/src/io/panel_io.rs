//! Panel I/O interface and its bounded transaction queue
//!
//! One [`PanelIo`] owns one transport. Transactions are queued FIFO and
//! run strictly one at a time, so completions are delivered in submission
//! order. The queue lives behind an interrupt-safe blocking mutex shared by
//! the foreground (`submit`, `close`, `poll_completions`) and the bus
//! interrupt handler (`on_interrupt`); completion handlers always run after
//! that lock is released.
//!
//! ```ignore
//! static IO: StaticCell<PanelIo<'static, SpiTransport<Spi, Dc>, 8>> = StaticCell::new();
//! let io = IO.init(PanelIo::open(transport, PanelIoConfig::default())?);
//!
//! io.tx_param(Some(0x3A), &[0x55])?;
//! io.tx_color(Some(0x2C), frame.as_dma_slice())?;
//!
//! #[interrupt]
//! fn SPI0() {
//!     IO.on_interrupt();
//! }
//! ```

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;
use heapless::{Deque, Vec};
use panelkit_hal::{RxBytes, MAX_RX_BYTES};
use portable_atomic::{AtomicU32, Ordering};

use super::transaction::{
    Completion, CompletionHandler, Direction, Payload, Transaction, TransactionId,
};
use super::transport::{OpSequence, Outcome, Step, Transport};
use crate::config::{CallbackContext, PanelIoConfig};
use crate::{BusFault, Error};

/// Counters of one panel I/O instance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IoStats {
    /// Transactions accepted by `submit`
    pub submitted: u32,
    /// Transactions finished successfully
    pub completed: u32,
    /// Transactions finished with an error
    pub failed: u32,
    /// Submissions refused with `Busy`
    pub rejected: u32,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU32,
    completed: AtomicU32,
    failed: AtomicU32,
    rejected: AtomicU32,
}

struct Queued<'a> {
    id: TransactionId,
    txn: Transaction<'a>,
}

/// The transaction currently owning the bus
struct InFlight<'a, Op> {
    id: TransactionId,
    txn: Transaction<'a>,
    ops: OpSequence<Op>,
    cursor: usize,
    detour: Option<(Op, usize)>,
    rx: RxBytes,
}

impl<Op: Copy> InFlight<'_, Op> {
    fn current(&self) -> Option<Op> {
        match self.detour {
            Some((op, _)) => Some(op),
            None => self.ops.get(self.cursor).copied(),
        }
    }

    /// Append received bytes. False when they go past the requested
    /// length; nothing is appended then.
    fn accept(&mut self, rx: &[u8]) -> bool {
        let expected = match self.txn.direction {
            Direction::Read { len } => len,
            Direction::Write => 0,
        };
        self.rx.len() + rx.len() <= expected && self.rx.extend_from_slice(rx).is_ok()
    }

    fn step_done(&mut self) {
        match self.detour.take() {
            Some((_, resume)) => self.cursor = resume,
            None => self.cursor += 1,
        }
    }
}

struct Finished<'a> {
    completion: Completion,
    handler: Option<&'a dyn CompletionHandler>,
}

/// Work to do once the queue lock is released
struct Delivery<'a, const DEPTH: usize> {
    ready: Vec<Finished<'a>, DEPTH>,
    notify: bool,
}

impl<const DEPTH: usize> Delivery<'_, DEPTH> {
    fn new() -> Self {
        Self {
            ready: Vec::new(),
            notify: false,
        }
    }
}

struct Inner<'a, T: Transport<'a>, const DEPTH: usize> {
    transport: T,
    context: CallbackContext,
    pending: Deque<Queued<'a>, DEPTH>,
    in_flight: Option<InFlight<'a, T::Op>>,
    /// Completions waiting for the foreground (deferred context only)
    undelivered: Deque<Finished<'a>, DEPTH>,
    next_id: u32,
    default_handler: Option<&'a dyn CompletionHandler>,
}

impl<'a, T: Transport<'a>, const DEPTH: usize> Inner<'a, T, DEPTH> {
    /// Slots taken: queued, in flight and undelivered
    fn occupancy(&self) -> usize {
        self.pending.len() + usize::from(self.in_flight.is_some()) + self.undelivered.len()
    }

    fn is_idle(&self) -> bool {
        self.occupancy() == 0
    }

    /// Start operations until one is running on the hardware or nothing
    /// is left to do
    fn pump(&mut self, counters: &Counters, out: &mut Delivery<'a, DEPTH>) {
        loop {
            let Some(flight) = self.in_flight.as_mut() else {
                match self.pending.pop_front() {
                    Some(next) => self.activate(next, counters, out),
                    None => return,
                }
                continue;
            };

            let Some(op) = flight.current() else {
                if let Some(flight) = self.in_flight.take() {
                    self.finish(flight.id, flight.txn, flight.rx, Ok(()), counters, out);
                }
                continue;
            };

            match self.transport.start(op, &flight.txn) {
                Ok(Step::Pending) => return,
                Ok(Step::Done) => flight.step_done(),
                Err(e) => {
                    warn!("transaction {} failed to start: {:?}", flight.id.0, e);
                    if let Some(flight) = self.in_flight.take() {
                        self.finish(flight.id, flight.txn, flight.rx, Err(e), counters, out);
                    }
                }
            }
        }
    }

    fn activate(&mut self, next: Queued<'a>, counters: &Counters, out: &mut Delivery<'a, DEPTH>) {
        let mut ops = OpSequence::new();
        match self.transport.encode(&next.txn, &mut ops) {
            Ok(()) => {
                trace!("transaction {} active, {} ops", next.id.0, ops.len());
                self.in_flight = Some(InFlight {
                    id: next.id,
                    txn: next.txn,
                    ops,
                    cursor: 0,
                    detour: None,
                    rx: RxBytes::new(),
                });
            }
            Err(e) => {
                warn!("transaction {} failed to encode: {:?}", next.id.0, e);
                self.finish(next.id, next.txn, RxBytes::new(), Err(e), counters, out);
            }
        }
    }

    /// Interpret the completion interrupt of the running operation
    fn service(&mut self, counters: &Counters, out: &mut Delivery<'a, DEPTH>) {
        let status = self.transport.acknowledge();
        let Some(flight) = self.in_flight.as_mut() else {
            trace!("spurious panel I/O interrupt");
            return;
        };
        let Some(op) = flight.current() else {
            return;
        };

        let outcome = match self.transport.on_complete(op, status) {
            Outcome::Received(rx) if !flight.accept(&rx) => {
                Outcome::Failed(Error::Bus(BusFault::Overrun))
            }
            outcome => outcome,
        };
        match outcome {
            Outcome::Next | Outcome::Received(_) => flight.step_done(),
            Outcome::Repeat => {}
            Outcome::Detour { op, resume } => flight.detour = Some((op, resume)),
            Outcome::Rewind(index) => {
                flight.detour = None;
                flight.cursor = index;
                flight.rx.clear();
            }
            Outcome::Failed(e) => {
                warn!("transaction {} failed: {:?}", flight.id.0, e);
                if let Some(flight) = self.in_flight.take() {
                    self.finish(flight.id, flight.txn, flight.rx, Err(e), counters, out);
                }
            }
        }

        self.pump(counters, out);
    }

    fn finish(
        &mut self,
        id: TransactionId,
        txn: Transaction<'a>,
        rx: RxBytes,
        status: Result<(), Error>,
        counters: &Counters,
        out: &mut Delivery<'a, DEPTH>,
    ) {
        let transferred = match (&status, txn.direction) {
            (Ok(()), Direction::Write) => txn.payload.len(),
            (Ok(()), Direction::Read { .. }) => rx.len(),
            (Err(_), _) => 0,
        };
        if status.is_ok() {
            counters.completed.fetch_add(1, Ordering::Relaxed);
        } else {
            counters.failed.fetch_add(1, Ordering::Relaxed);
        }

        let finished = Finished {
            completion: Completion {
                id,
                context: txn.context,
                status,
                transferred,
                rx,
            },
            handler: txn.handler.or(self.default_handler),
        };

        // Occupancy accounting reserves a slot for every completion
        let overflow = match self.context {
            CallbackContext::Interrupt => out.ready.push(finished).is_err(),
            CallbackContext::Deferred => {
                out.notify = true;
                self.undelivered.push_back(finished).is_err()
            }
        };
        if overflow {
            error!("completion of transaction {} dropped", id.0);
        }
    }
}

/// Panel I/O instance over transport `T` with a queue of `DEPTH` slots
///
/// Queued, in-flight and undelivered transactions share the `DEPTH`
/// slots; `submit` returns [`Error::Busy`] once they are all taken.
pub struct PanelIo<'a, T: Transport<'a>, const DEPTH: usize> {
    state: Mutex<CriticalSectionRawMutex, RefCell<Inner<'a, T, DEPTH>>>,
    completion_signal: Signal<CriticalSectionRawMutex, ()>,
    counters: Counters,
}

impl<'a, T: Transport<'a>, const DEPTH: usize> PanelIo<'a, T, DEPTH> {
    /// Take ownership of a configured transport and enable its interrupt
    pub fn open(mut transport: T, config: PanelIoConfig) -> Result<Self, Error> {
        config.validate()?;

        transport.set_interrupt_enabled(true);
        debug!("panel I/O open, depth {}", DEPTH);

        Ok(Self {
            state: Mutex::new(RefCell::new(Inner {
                transport,
                context: config.callback_context,
                pending: Deque::new(),
                in_flight: None,
                undelivered: Deque::new(),
                next_id: 0,
                default_handler: None,
            })),
            completion_signal: Signal::new(),
            counters: Counters::default(),
        })
    }

    /// Queue a transaction
    ///
    /// Never waits: returns [`Error::Busy`] when every slot is taken and
    /// [`Error::InvalidArgument`] when the bus cannot carry the
    /// transaction. If the bus is idle the transaction starts before this
    /// returns.
    pub fn submit(&self, txn: Transaction<'a>) -> Result<TransactionId, Error> {
        let result = self.state.lock(|cell| {
            let mut inner = cell.borrow_mut();

            if let Direction::Read { len } = txn.direction {
                if len == 0 || len > MAX_RX_BYTES || !txn.payload.is_empty() {
                    return Err(Error::InvalidArgument);
                }
            }
            inner.transport.validate(&txn)?;

            if inner.occupancy() >= DEPTH {
                return Err(Error::Busy);
            }

            let id = TransactionId(inner.next_id);
            inner.next_id = inner.next_id.wrapping_add(1);
            inner
                .pending
                .push_back(Queued { id, txn })
                .map_err(|_| Error::Busy)?;
            self.counters.submitted.fetch_add(1, Ordering::Relaxed);

            let mut out = Delivery::new();
            inner.pump(&self.counters, &mut out);
            Ok((id, out))
        });

        match result {
            Ok((id, out)) => {
                self.deliver(out);
                Ok(id)
            }
            Err(e) => {
                if e == Error::Busy {
                    self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                }
                Err(e)
            }
        }
    }

    /// Command followed by up to 64 parameter bytes, copied before return
    pub fn tx_param(&self, command: Option<u32>, params: &[u8]) -> Result<TransactionId, Error> {
        self.submit(Transaction::write(command, Payload::inline(params)?))
    }

    /// Command followed by pixel data borrowed until completion
    pub fn tx_color(
        &self,
        command: Option<u32>,
        pixels: impl Into<Payload<'a>>,
    ) -> Result<TransactionId, Error> {
        self.submit(Transaction::color(command, pixels.into()))
    }

    /// Command followed by a read of `len` bytes; the bytes arrive in the
    /// completion
    pub fn rx_param(&self, command: Option<u32>, len: usize) -> Result<TransactionId, Error> {
        self.submit(Transaction::read(command, len))
    }

    /// Handler for transactions submitted without one
    pub fn register_handler(&self, handler: &'a dyn CompletionHandler) {
        self.state
            .lock(|cell| cell.borrow_mut().default_handler = Some(handler));
    }

    /// Bus completion interrupt entry point
    pub fn on_interrupt(&self) {
        let out = self.state.lock(|cell| {
            let mut out = Delivery::new();
            cell.borrow_mut().service(&self.counters, &mut out);
            out
        });
        self.deliver(out);
    }

    fn deliver(&self, out: Delivery<'a, DEPTH>) {
        for finished in out.ready {
            if let Some(handler) = finished.handler {
                handler.on_complete(&finished.completion);
            }
        }
        if out.notify {
            self.completion_signal.signal(());
        }
    }

    /// Deliver queued completions to their handlers (deferred context).
    /// Returns how many were delivered.
    pub fn poll_completions(&self) -> usize {
        let mut delivered = 0;
        while let Some(finished) = self.pop_undelivered() {
            if let Some(handler) = finished.handler {
                handler.on_complete(&finished.completion);
            }
            delivered += 1;
        }
        delivered
    }

    /// Take the oldest queued completion without running its handler
    /// (deferred context)
    pub fn take_completion(&self) -> Option<Completion> {
        self.pop_undelivered().map(|finished| finished.completion)
    }

    /// Wait until a completion is queued and take it (deferred context)
    pub async fn wait_completion(&self) -> Completion {
        loop {
            if let Some(completion) = self.take_completion() {
                return completion;
            }
            self.completion_signal.wait().await;
        }
    }

    fn pop_undelivered(&self) -> Option<Finished<'a>> {
        self.state
            .lock(|cell| cell.borrow_mut().undelivered.pop_front())
    }

    /// No transaction queued, in flight or undelivered
    pub fn is_idle(&self) -> bool {
        self.state.lock(|cell| cell.borrow().is_idle())
    }

    /// Free queue slots
    pub fn available(&self) -> usize {
        self.state
            .lock(|cell| DEPTH.saturating_sub(cell.borrow().occupancy()))
    }

    pub fn stats(&self) -> IoStats {
        IoStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
        }
    }

    /// Run `f` with the transport, under the queue lock
    pub fn with_transport<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        self.state.lock(|cell| f(&mut cell.borrow_mut().transport))
    }

    /// Release the transport
    ///
    /// Fails with [`Error::Busy`], handing the instance back, while
    /// transactions are queued, in flight or undelivered.
    pub fn close(self) -> Result<T, (Self, Error)> {
        if !self.is_idle() {
            return Err((self, Error::Busy));
        }

        let mut inner = self.state.into_inner().into_inner();
        inner.transport.set_interrupt_enabled(false);
        debug!("panel I/O closed");
        Ok(inner.transport)
    }
}

/// Panel I/O operations used by panel drivers, independent of the
/// transport and queue depth
pub trait PanelIoOps<'a> {
    fn submit(&self, txn: Transaction<'a>) -> Result<TransactionId, Error>;

    fn tx_param(&self, command: Option<u32>, params: &[u8]) -> Result<TransactionId, Error> {
        self.submit(Transaction::write(command, Payload::inline(params)?))
    }

    fn tx_color(&self, command: Option<u32>, pixels: Payload<'a>) -> Result<TransactionId, Error> {
        self.submit(Transaction::color(command, pixels))
    }

    fn rx_param(&self, command: Option<u32>, len: usize) -> Result<TransactionId, Error> {
        self.submit(Transaction::read(command, len))
    }

    fn is_idle(&self) -> bool;

    /// Free queue slots
    fn available(&self) -> usize;

    /// Queue depth
    fn capacity(&self) -> usize;
}

impl<'a, T: Transport<'a>, const DEPTH: usize> PanelIoOps<'a> for PanelIo<'a, T, DEPTH> {
    fn submit(&self, txn: Transaction<'a>) -> Result<TransactionId, Error> {
        PanelIo::submit(self, txn)
    }

    fn is_idle(&self) -> bool {
        PanelIo::is_idle(self)
    }

    fn available(&self) -> usize {
        PanelIo::available(self)
    }

    fn capacity(&self) -> usize {
        DEPTH
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::transport::OpSequence;
    use core::sync::atomic::{AtomicUsize, Ordering as StdOrdering};
    use std::sync::Mutex as StdMutex;

    /// Transport that needs one interrupt per transaction and can be told
    /// to fail or reject
    struct Loopback {
        irq_enabled: bool,
        fail_next: Option<Error>,
        reject_len_over: usize,
        /// Bytes handed back by the next completed read
        reply: Option<RxBytes>,
    }

    impl Loopback {
        fn new() -> Self {
            Self {
                irq_enabled: false,
                fail_next: None,
                reject_len_over: 128,
                reply: None,
            }
        }
    }

    impl<'a> Transport<'a> for Loopback {
        type Op = ();
        type Status = Option<Error>;

        fn validate(&self, txn: &Transaction<'a>) -> Result<(), Error> {
            if txn.data_len() > self.reject_len_over {
                return Err(Error::InvalidArgument);
            }
            Ok(())
        }

        fn encode(&mut self, _: &Transaction<'a>, ops: &mut OpSequence<()>) -> Result<(), Error> {
            ops.push(()).map_err(|_| Error::InvalidArgument)
        }

        fn start(&mut self, _: (), _: &Transaction<'a>) -> Result<Step, Error> {
            Ok(Step::Pending)
        }

        fn acknowledge(&mut self) -> Option<Error> {
            self.fail_next.take()
        }

        fn on_complete(&mut self, _: (), status: Option<Error>) -> Outcome<()> {
            match (status, self.reply.take()) {
                (Some(e), _) => Outcome::Failed(e),
                (None, Some(rx)) => Outcome::Received(rx),
                (None, None) => Outcome::Next,
            }
        }

        fn set_interrupt_enabled(&mut self, enable: bool) {
            self.irq_enabled = enable;
        }
    }

    #[test]
    fn test_read_past_requested_length_fails() {
        let io: PanelIo<'_, Loopback, 2> =
            PanelIo::open(Loopback::new(), PanelIoConfig::DEFERRED).unwrap();

        io.with_transport(|t| t.reply = RxBytes::from_slice(&[1, 2, 3]).ok());
        io.rx_param(Some(0x04), 2).unwrap();
        io.on_interrupt();
        let completion = io.take_completion().unwrap();
        assert_eq!(completion.status, Err(Error::Bus(BusFault::Overrun)));
        assert!(completion.rx.is_empty());
        assert_eq!(io.stats().failed, 1);

        io.with_transport(|t| t.reply = RxBytes::from_slice(&[1, 2]).ok());
        io.rx_param(Some(0x04), 2).unwrap();
        io.on_interrupt();
        let completion = io.take_completion().unwrap();
        assert_eq!(completion.status, Ok(()));
        assert_eq!(&completion.rx[..], &[1, 2]);
    }

    #[test]
    fn test_busy_when_full() {
        let io: PanelIo<'_, Loopback, 2> =
            PanelIo::open(Loopback::new(), PanelIoConfig::default()).unwrap();
        assert!(io.tx_param(Some(1), &[]).is_ok());
        assert!(io.tx_param(Some(2), &[]).is_ok());
        assert_eq!(io.tx_param(Some(3), &[]), Err(Error::Busy));
        assert_eq!(io.stats().rejected, 1);

        io.on_interrupt();
        assert_eq!(io.available(), 1);
        assert!(io.tx_param(Some(3), &[]).is_ok());
    }

    #[test]
    fn test_invalid_argument_is_not_queued() {
        let big = [0u8; 200];
        let io: PanelIo<'_, Loopback, 2> =
            PanelIo::open(Loopback::new(), PanelIoConfig::default()).unwrap();
        assert_eq!(io.tx_color(None, &big), Err(Error::InvalidArgument));
        assert_eq!(io.rx_param(None, 0), Err(Error::InvalidArgument));
        assert_eq!(io.rx_param(None, MAX_RX_BYTES + 1), Err(Error::InvalidArgument));
        assert!(io.is_idle());
    }

    #[test]
    fn test_completion_reports_failure() {
        let seen = StdMutex::new(Vec::<Completion, 4>::new());
        let handler = |c: &Completion| {
            let _ = seen.lock().unwrap().push(c.clone());
        };
        let io: PanelIo<'_, Loopback, 4> =
            PanelIo::open(Loopback::new(), PanelIoConfig::default()).unwrap();
        io.register_handler(&handler);

        io.tx_param(Some(1), &[1, 2]).unwrap();
        io.with_transport(|t| t.fail_next = Some(Error::Bus(crate::BusFault::Timeout)));
        io.on_interrupt();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].status, Err(Error::Bus(crate::BusFault::Timeout)));
        assert_eq!(seen[0].transferred, 0);
        assert_eq!(io.stats().failed, 1);
    }

    #[test]
    fn test_close_requires_drain() {
        let io: PanelIo<'_, Loopback, 2> =
            PanelIo::open(Loopback::new(), PanelIoConfig::default()).unwrap();
        io.tx_param(Some(1), &[]).unwrap();

        let (io, err) = io.close().err().unwrap();
        assert_eq!(err, Error::Busy);

        io.on_interrupt();
        let transport = io.close().ok().unwrap();
        assert!(!transport.irq_enabled);
    }

    #[test]
    fn test_deferred_completions_hold_slots() {
        let calls = AtomicUsize::new(0);
        let handler = |_: &Completion| {
            calls.fetch_add(1, StdOrdering::SeqCst);
        };
        let io: PanelIo<'_, Loopback, 2> =
            PanelIo::open(Loopback::new(), PanelIoConfig::DEFERRED).unwrap();

        let first = io
            .submit(Transaction::write(Some(1), Payload::Empty).with_handler(&handler))
            .unwrap();
        io.on_interrupt();
        assert_eq!(calls.load(StdOrdering::SeqCst), 0);

        io.tx_param(Some(2), &[]).unwrap();
        assert_eq!(io.tx_param(Some(3), &[]), Err(Error::Busy));

        let taken = io.take_completion().unwrap();
        assert_eq!(taken.id, first);
        assert_eq!(calls.load(StdOrdering::SeqCst), 0);

        io.on_interrupt();
        assert_eq!(io.poll_completions(), 1);
        assert!(io.is_idle());
    }

    #[test]
    fn test_wait_completion() {
        let io: PanelIo<'_, Loopback, 2> =
            PanelIo::open(Loopback::new(), PanelIoConfig::DEFERRED).unwrap();
        let id = io.tx_param(Some(1), &[0xAA, 0xBB]).unwrap();
        io.on_interrupt();

        let completion = embassy_futures::block_on(io.wait_completion());
        assert_eq!(completion.id, id);
        assert_eq!(completion.transferred, 2);
    }
}
