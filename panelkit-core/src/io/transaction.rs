//! Transaction model
//!
//! A [`Transaction`] is one logical read or write on the panel bus: an
//! optional command phase followed by a parameter, pixel or read phase.
//! Once submitted it belongs to the panel I/O instance until its
//! [`Completion`] is delivered; the payload it borrows must stay alive
//! for the lifetime of that instance.

use heapless::Vec;
use panelkit_hal::{DmaSlice, RxBytes};

use crate::Error;

/// Largest parameter block copied into a transaction
pub const MAX_INLINE_PARAMS: usize = 64;

/// Parameter bytes owned by a transaction
pub type ParamBytes = Vec<u8, MAX_INLINE_PARAMS>;

/// Identifier assigned at submission, increasing per instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransactionId(pub u32);

/// Transfer direction of the phase after the command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    Write,
    /// Read `len` bytes (at most [`panelkit_hal::MAX_RX_BYTES`])
    Read { len: usize },
}

/// What the payload carries
///
/// Some buses frame parameters differently from pixel data (two-wire
/// control bytes, colour byte swapping on parallel buses).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PayloadKind {
    Param,
    Color,
}

/// Payload of a write transaction
#[derive(Debug, Clone)]
pub enum Payload<'a> {
    Empty,
    /// Copied at submission
    Inline(ParamBytes),
    /// Borrowed general-purpose memory; not accepted by DMA-only paths
    Borrowed(&'a [u8]),
    /// Borrowed DMA-reachable memory
    Dma(DmaSlice<'a>),
}

impl<'a> Payload<'a> {
    /// Copy `bytes` into an inline payload
    pub fn inline(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.is_empty() {
            return Ok(Payload::Empty);
        }
        Vec::from_slice(bytes)
            .map(Payload::Inline)
            .map_err(|_| Error::InvalidArgument)
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Empty => &[],
            Payload::Inline(bytes) => bytes.as_slice(),
            Payload::Borrowed(bytes) => *bytes,
            Payload::Dma(slice) => slice.as_bytes(),
        }
    }

    /// DMA view of the payload, if it lives in DMA-reachable memory
    pub fn dma(&self) -> Option<DmaSlice<'a>> {
        match self {
            Payload::Dma(slice) => Some(*slice),
            _ => None,
        }
    }
}

impl<'a> From<&'a [u8]> for Payload<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        Payload::Borrowed(bytes)
    }
}

impl<'a, const N: usize> From<&'a [u8; N]> for Payload<'a> {
    fn from(bytes: &'a [u8; N]) -> Self {
        Payload::Borrowed(bytes.as_slice())
    }
}

impl<'a> From<DmaSlice<'a>> for Payload<'a> {
    fn from(slice: DmaSlice<'a>) -> Self {
        Payload::Dma(slice)
    }
}

/// Outcome of a transaction, handed to its completion handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub id: TransactionId,
    /// User context given at submission
    pub context: u32,
    pub status: Result<(), Error>,
    /// Payload bytes written, or bytes read
    pub transferred: usize,
    /// Bytes received by a read transaction
    pub rx: RxBytes,
}

impl Completion {
    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }
}

/// Receiver of completions
///
/// Runs in interrupt context or from the foreground depending on the
/// instance's [`crate::config::CallbackContext`]; must not block.
pub trait CompletionHandler: Sync {
    fn on_complete(&self, completion: &Completion);
}

impl<F> CompletionHandler for F
where
    F: Fn(&Completion) + Sync,
{
    fn on_complete(&self, completion: &Completion) {
        self(completion)
    }
}

/// One logical bus transaction
#[derive(Clone)]
pub struct Transaction<'a> {
    pub direction: Direction,
    /// Command code; `None` skips the command phase
    pub command: Option<u32>,
    pub kind: PayloadKind,
    pub payload: Payload<'a>,
    /// Handler for this transaction; falls back to the registered default
    pub handler: Option<&'a dyn CompletionHandler>,
    /// Opaque user context echoed in the completion
    pub context: u32,
}

impl<'a> Transaction<'a> {
    /// Write with a parameter payload
    pub fn write(command: Option<u32>, payload: Payload<'a>) -> Self {
        Self {
            direction: Direction::Write,
            command,
            kind: PayloadKind::Param,
            payload,
            handler: None,
            context: 0,
        }
    }

    /// Write with a pixel payload
    pub fn color(command: Option<u32>, payload: Payload<'a>) -> Self {
        Self {
            kind: PayloadKind::Color,
            ..Self::write(command, payload)
        }
    }

    /// Command phase followed by a read of `len` bytes
    pub fn read(command: Option<u32>, len: usize) -> Self {
        Self {
            direction: Direction::Read { len },
            ..Self::write(command, Payload::Empty)
        }
    }

    pub fn with_handler(mut self, handler: &'a dyn CompletionHandler) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn with_context(mut self, context: u32) -> Self {
        self.context = context;
        self
    }

    /// Bytes moved by the phase after the command
    pub fn data_len(&self) -> usize {
        match self.direction {
            Direction::Write => self.payload.len(),
            Direction::Read { len } => len,
        }
    }

    pub fn is_read(&self) -> bool {
        matches!(self.direction, Direction::Read { .. })
    }
}

impl core::fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Transaction")
            .field("direction", &self.direction)
            .field("command", &self.command)
            .field("kind", &self.kind)
            .field("len", &self.payload.len())
            .field("context", &self.context)
            .finish()
    }
}
