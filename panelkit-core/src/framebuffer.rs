//! Frame buffer rotation for the streaming bus
//!
//! Up to three buffers rotate between the application and the scan-out
//! ring:
//!
//! ```text
//! Free --acquire--> Acquired --present--> Queued --latch--> Latched --wrap--> Active
//!  ^                                         |                                   |
//!  +------------ replaced by newer present --+                                   |
//!  +---------------------------- superseded at wrap -----------------------------+
//! ```
//!
//! Only `Free` buffers are ever handed out, so the buffer being scanned
//! (and the one the ring is being re-armed against) is never writable.
//! Latch and wrap are driven by the DMA engine's completion events and
//! reconciled by buffer address.

use heapless::Vec;
use panelkit_hal::{DmaBuffer, DmaSlice};

use crate::config::ConfigError;
use crate::Error;

/// Most buffers a rotation holds (triple buffering)
pub const MAX_FRAME_BUFFERS: usize = 3;

/// Where a buffer is in the rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameState {
    Free,
    /// Held by the application
    Acquired,
    /// Presented, waiting for the next safe point
    Queued,
    /// Ring is being re-armed against it; scanned from the next pass
    Latched,
    /// Being scanned out
    Active,
}

/// Result of reconciling the rotation with a completion event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Rotation {
    /// A new frame became active
    pub swapped: bool,
    /// The ring wrapped onto the old frame while one was still being drawn
    pub underrun: bool,
}

#[derive(Debug)]
struct Slot<'d> {
    buffer: Option<DmaBuffer<'d>>,
    addr: usize,
    state: FrameState,
}

/// Set of equally sized frame buffers
#[derive(Debug)]
pub struct FrameBuffers<'d> {
    slots: Vec<Slot<'d>, MAX_FRAME_BUFFERS>,
    frame_len: usize,
}

impl<'d> FrameBuffers<'d> {
    /// Empty rotation of frames of `frame_len` bytes
    pub fn new(frame_len: usize) -> Self {
        Self {
            slots: Vec::new(),
            frame_len,
        }
    }

    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Add a buffer. The first buffer attached becomes the active one.
    pub fn attach(&mut self, buffer: DmaBuffer<'d>) -> Result<(), Error> {
        if buffer.len() != self.frame_len {
            return Err(ConfigError::FrameBufferSize.into());
        }
        let state = if self.slots.is_empty() {
            FrameState::Active
        } else {
            FrameState::Free
        };
        let addr = buffer.addr();
        self.slots
            .push(Slot {
                buffer: Some(buffer),
                addr,
                state,
            })
            .map_err(|_| Error::Config(ConfigError::FrameBufferCount))
    }

    pub fn state_of(&self, addr: usize) -> Option<FrameState> {
        self.slots.iter().find(|s| s.addr == addr).map(|s| s.state)
    }

    fn find(&self, state: FrameState) -> Option<usize> {
        self.slots.iter().position(|s| s.state == state)
    }

    /// Hand out a writable buffer; `Busy` if every buffer is in use
    pub fn acquire(&mut self) -> Result<DmaBuffer<'d>, Error> {
        let index = self.find(FrameState::Free).ok_or(Error::Busy)?;
        let slot = &mut self.slots[index];
        let buffer = slot.buffer.take().ok_or(Error::Busy)?;
        slot.state = FrameState::Acquired;
        Ok(buffer)
    }

    /// Like [`acquire`](Self::acquire), with the newest frame copied in so
    /// the application can draw a partial update on top of it
    pub fn acquire_synced(&mut self) -> Result<DmaBuffer<'d>, Error> {
        let mut buffer = self.acquire()?;
        let newest = [FrameState::Queued, FrameState::Latched, FrameState::Active]
            .into_iter()
            .find_map(|state| self.find(state));
        if let Some(source) = newest.and_then(|i| self.slots[i].buffer.as_ref()) {
            buffer.copy_from_slice(source);
        }
        Ok(buffer)
    }

    /// Take back an acquired buffer for display. Returns the address of a
    /// queued frame this one replaced, if any. A buffer that is not an
    /// acquired member of this rotation is handed back with the error.
    pub fn present(
        &mut self,
        buffer: DmaBuffer<'d>,
    ) -> Result<Option<usize>, (DmaBuffer<'d>, Error)> {
        let addr = buffer.addr();
        let Some(index) = self
            .slots
            .iter()
            .position(|s| s.addr == addr && s.state == FrameState::Acquired)
        else {
            return Err((buffer, Error::InvalidArgument));
        };

        let mut replaced = None;
        for slot in self.slots.iter_mut() {
            if slot.state == FrameState::Queued {
                slot.state = FrameState::Free;
                replaced = Some(slot.addr);
            }
        }
        let slot = &mut self.slots[index];
        slot.buffer = Some(buffer);
        slot.state = FrameState::Queued;
        Ok(replaced)
    }

    /// Frame waiting to be latched
    pub fn queued(&self) -> Option<DmaSlice<'_>> {
        self.slice_in(FrameState::Queued)
    }

    /// Frame being scanned out
    pub fn active(&self) -> Option<DmaSlice<'_>> {
        self.slice_in(FrameState::Active)
    }

    fn slice_in(&self, state: FrameState) -> Option<DmaSlice<'_>> {
        let slot = &self.slots[self.find(state)?];
        slot.buffer.as_ref().map(|b| b.as_dma_slice())
    }

    /// Follow the ring after a completion event: `active` is the buffer
    /// the running pass scans, `next` the one descriptors are re-armed
    /// against. `wrapped` reports whether a pass boundary was crossed.
    pub fn reconcile(&mut self, active: usize, next: usize, wrapped: bool) -> Rotation {
        let mut rotation = Rotation::default();

        let current = self.find(FrameState::Active).map(|i| self.slots[i].addr);
        if current != Some(active) {
            if let Some(index) = self.slots.iter().position(|s| s.addr == active) {
                for slot in self.slots.iter_mut() {
                    if slot.state == FrameState::Active {
                        slot.state = FrameState::Free;
                    }
                }
                self.slots[index].state = FrameState::Active;
                rotation.swapped = true;
            }
        }

        if next != active {
            if let Some(slot) = self
                .slots
                .iter_mut()
                .find(|s| s.addr == next && s.state == FrameState::Queued)
            {
                slot.state = FrameState::Latched;
            }
        }

        if wrapped && !rotation.swapped && self.find(FrameState::Acquired).is_some() {
            rotation.underrun = true;
        }
        rotation
    }

    /// Make the queued frame active directly. Used when no ring is
    /// running, so there is no pass to wait for.
    pub fn promote_queued(&mut self) -> bool {
        let Some(index) = self.find(FrameState::Queued) else {
            return false;
        };
        for slot in self.slots.iter_mut() {
            if slot.state == FrameState::Active {
                slot.state = FrameState::Free;
            }
        }
        self.slots[index].state = FrameState::Active;
        true
    }

    /// Contents of the frame being scanned out
    pub fn read_active(&self) -> Option<&[u8]> {
        let slot = &self.slots[self.find(FrameState::Active)?];
        slot.buffer.as_deref()
    }
}
