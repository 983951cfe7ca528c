//! DMA engine: descriptor chains bound to channels
//!
//! The engine is the resource pool shared by every DMA-fed transport: one
//! descriptor arena and `CH` channels, each with a transmit and a receive
//! half. It is passed explicitly to the transports that use it and guards
//! its state with an interrupt-safe blocking mutex, so binding from the
//! foreground and completion handling from an interrupt never overlap.
//!
//! # Streaming rings
//!
//! While a ring runs, every descriptor the controller finishes is handed
//! to software (owner bit cleared) and immediately re-armed for the next
//! pass. A frame swap requested with [`DmaEngine::request_swap`] is latched
//! only when the head descriptor completes, so every descriptor of the
//! following pass is re-armed against the new buffer and the pass after
//! the wrap scans it from top to bottom. No descriptor the controller still
//! owns is ever rewritten.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use panelkit_hal::{DmaChannelRef, DmaDirection, DmaHardware, DmaSlice};
use portable_atomic::{AtomicU32, Ordering};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::descriptor::{
    ChainHandle, ChainMode, Descriptor, DescriptorArena, Owner, MAX_DESCRIPTOR_LEN,
};
use crate::config::ConfigError;
use crate::Error;

/// DMA engine configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DmaEngineConfig {
    /// Largest buffer per descriptor; a multiple of 4 up to 4092
    pub max_chunk: usize,
}

impl Default for DmaEngineConfig {
    fn default() -> Self {
        Self {
            max_chunk: MAX_DESCRIPTOR_LEN,
        }
    }
}

impl DmaEngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_chunk == 0 || self.max_chunk > MAX_DESCRIPTOR_LEN || self.max_chunk % 4 != 0 {
            return Err(ConfigError::ChunkSize);
        }
        Ok(())
    }
}

/// What a channel interrupt amounted to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CompletionEvent {
    pub channel: DmaChannelRef,
    /// Descriptors handed back to software by this interrupt
    pub descriptors: u16,
    /// Bytes those descriptors covered
    pub bytes: usize,
    /// A requested swap was latched for the next pass
    pub latched: bool,
    /// A ring pass finished
    pub wrapped: bool,
    /// The pass starting now scans a different buffer
    pub swapped: bool,
    /// A one-shot chain finished; the channel is free again
    pub done: bool,
    /// A deferred stop took effect; the channel is free again
    pub stopped: bool,
    /// Buffer the pass now running scans
    pub active_base: usize,
    /// Buffer descriptors are being re-armed against
    pub next_base: usize,
}

impl CompletionEvent {
    fn new(channel: DmaChannelRef) -> Self {
        Self {
            channel,
            descriptors: 0,
            bytes: 0,
            latched: false,
            wrapped: false,
            swapped: false,
            done: false,
            stopped: false,
            active_base: 0,
            next_base: 0,
        }
    }
}

/// Result of [`DmaEngine::stop`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StopState {
    /// Channel released
    Stopped,
    /// Channel stops at the end of the current pass or transfer
    Pending,
}

/// Engine counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DmaStats {
    pub descriptors_completed: u32,
    pub passes: u32,
    pub swaps: u32,
}

#[derive(Debug, Clone, Copy)]
struct Binding {
    chain: ChainHandle,
    running: bool,
    stopping: bool,
    /// Next descriptor the controller will report
    cursor: u16,
    /// Buffer the current pass scans
    active_base: usize,
    /// Buffer finished descriptors are re-armed against
    next_base: usize,
    /// Swap waiting for the head descriptor
    pending_base: Option<usize>,
}

#[derive(Debug, Clone, Copy)]
struct ChannelSlot {
    tx: Option<Binding>,
    rx: Option<Binding>,
}

impl ChannelSlot {
    const FREE: Self = Self { tx: None, rx: None };

    fn half(&mut self, direction: DmaDirection) -> &mut Option<Binding> {
        match direction {
            DmaDirection::Tx => &mut self.tx,
            DmaDirection::Rx => &mut self.rx,
        }
    }
}

struct EngineState<H, const CH: usize, const D: usize> {
    hw: H,
    arena: DescriptorArena<D>,
    channels: [ChannelSlot; CH],
    config: DmaEngineConfig,
}

impl<H: DmaHardware, const CH: usize, const D: usize> EngineState<H, CH, D> {
    fn binding(&mut self, channel: DmaChannelRef) -> Option<&mut Option<Binding>> {
        self.channels
            .get_mut(channel.index as usize)
            .map(|slot| slot.half(channel.direction))
    }

    fn bound(&mut self, channel: DmaChannelRef) -> Result<Binding, Error> {
        self.binding(channel)
            .and_then(|b| *b)
            .ok_or(Error::InvalidArgument)
    }

    fn store(&mut self, channel: DmaChannelRef, binding: Option<Binding>) {
        if let Some(slot) = self.binding(channel) {
            *slot = binding;
        }
    }

    /// Halt the channel, hand every descriptor back and free the channel
    fn release(&mut self, channel: DmaChannelRef, binding: &Binding) {
        self.hw.halt(channel);
        self.hw.enable_interrupt(channel, false);
        self.arena.set_owner_all(binding.chain, Owner::Cpu);
        if let Some(record) = self.arena.chain_mut(binding.chain) {
            record.bound = false;
        }
        self.store(channel, None);
    }

    /// Number of descriptors from `from` to `to` inclusive, following
    /// links, with every one hardware-owned
    fn completed_span(&self, from: u16, to: u16, limit: u16) -> Result<u16, Error> {
        let mut index = from;
        for count in 1..=limit {
            let desc = self.arena.descriptor(index).ok_or(Error::Descriptor)?;
            if desc.owner != Owner::Dma {
                return Err(Error::Descriptor);
            }
            if index == to {
                return Ok(count);
            }
            index = self.arena.next(index).ok_or(Error::Descriptor)?;
        }
        Err(Error::Descriptor)
    }
}

/// Descriptor arena of `D` descriptors and `CH` channels over hardware `H`
pub struct DmaEngine<H, const CH: usize, const D: usize> {
    state: Mutex<CriticalSectionRawMutex, RefCell<EngineState<H, CH, D>>>,
    descriptors_completed: AtomicU32,
    passes: AtomicU32,
    swaps: AtomicU32,
}

impl<H: DmaHardware, const CH: usize, const D: usize> DmaEngine<H, CH, D> {
    pub fn new(hw: H, config: DmaEngineConfig) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            state: Mutex::new(RefCell::new(EngineState {
                hw,
                arena: DescriptorArena::new(),
                channels: [ChannelSlot::FREE; CH],
                config,
            })),
            descriptors_completed: AtomicU32::new(0),
            passes: AtomicU32::new(0),
            swaps: AtomicU32::new(0),
        })
    }

    fn with<R>(&self, f: impl FnOnce(&mut EngineState<H, CH, D>) -> R) -> R {
        self.state.lock(|cell| f(&mut cell.borrow_mut()))
    }

    /// Build a chain over `buffers`; `ResourceExhausted` when the arena
    /// cannot hold it
    pub fn allocate_chain(
        &self,
        buffers: &[DmaSlice<'_>],
        mode: ChainMode,
    ) -> Result<ChainHandle, Error> {
        self.with(|s| {
            let max_chunk = s.config.max_chunk;
            s.arena.allocate(buffers, mode, max_chunk)
        })
    }

    /// Return an unbound chain's descriptors to the arena
    pub fn free_chain(&self, chain: ChainHandle) -> Result<(), Error> {
        self.with(|s| s.arena.free(chain))
    }

    /// Point an unbound single-buffer chain at another buffer of equal size
    pub fn retarget_chain(&self, chain: ChainHandle, buffer: DmaSlice<'_>) -> Result<(), Error> {
        self.with(|s| {
            let record = s.arena.chain(chain).ok_or(Error::InvalidArgument)?;
            if record.bound {
                return Err(Error::Busy);
            }
            s.arena.retarget(chain, &buffer)
        })
    }

    /// Bind `chain` to any free channel half of `direction`
    pub fn bind(&self, chain: ChainHandle, direction: DmaDirection) -> Result<DmaChannelRef, Error> {
        (0..CH as u8)
            .map(|index| DmaChannelRef::new(index, direction))
            .find(|&channel| self.is_free(channel))
            .ok_or(Error::ResourceExhausted)
            .and_then(|channel| self.bind_channel(channel, chain).map(|()| channel))
    }

    /// Bind `chain` to a specific channel half
    pub fn bind_channel(&self, channel: DmaChannelRef, chain: ChainHandle) -> Result<(), Error> {
        self.with(|s| {
            let record = s.arena.chain(chain).ok_or(Error::InvalidArgument)?;
            if record.bound {
                return Err(Error::Busy);
            }
            let base = s
                .arena
                .descriptor(record.head)
                .map(|d| d.addr)
                .ok_or(Error::InvalidArgument)?;
            let slot = s.binding(channel).ok_or(Error::InvalidArgument)?;
            if slot.is_some() {
                return Err(Error::ResourceExhausted);
            }
            *slot = Some(Binding {
                chain,
                running: false,
                stopping: false,
                cursor: record.head,
                active_base: base,
                next_base: base,
                pending_base: None,
            });
            if let Some(record) = s.arena.chain_mut(chain) {
                record.bound = true;
            }
            s.hw.enable_interrupt(channel, true);
            trace!("dma chain {} bound to channel {}", chain.0, channel.index);
            Ok(())
        })
    }

    /// Hand the bound chain to the controller and start fetching
    pub fn start(&self, channel: DmaChannelRef) -> Result<(), Error> {
        self.with(|s| {
            let mut binding = s.bound(channel)?;
            if binding.running {
                return Err(Error::Busy);
            }
            let record = s.arena.chain(binding.chain).ok_or(Error::InvalidArgument)?;

            s.arena.set_owner_all(binding.chain, Owner::Dma);
            if let Err(fault) = s.hw.initiate(channel, record.head) {
                s.arena.set_owner_all(binding.chain, Owner::Cpu);
                warn!("dma channel {} refused to start: {:?}", channel.index, fault);
                return Err(fault.into());
            }

            binding.running = true;
            binding.cursor = record.head;
            s.store(channel, Some(binding));
            debug!("dma channel {} started, {} bytes", channel.index, record.len);
            Ok(())
        })
    }

    /// Stop a channel. A running ring finishes its current pass and a
    /// running one-shot transfer finishes first; the release is then
    /// reported by [`CompletionEvent::stopped`].
    pub fn stop(&self, channel: DmaChannelRef) -> Result<StopState, Error> {
        self.with(|s| {
            let mut binding = s.bound(channel)?;
            if !binding.running {
                s.release(channel, &binding);
                return Ok(StopState::Stopped);
            }
            binding.stopping = true;
            s.store(channel, Some(binding));
            debug!("dma channel {} stopping", channel.index);
            Ok(StopState::Pending)
        })
    }

    /// Release a one-shot binding whose peripheral reported the transfer
    /// finished, returning the chain for reuse or freeing
    pub fn release(&self, channel: DmaChannelRef) -> Result<ChainHandle, Error> {
        self.with(|s| {
            let binding = s.bound(channel)?;
            let record = s.arena.chain(binding.chain).ok_or(Error::InvalidArgument)?;
            if record.mode == ChainMode::Ring && binding.running {
                return Err(Error::Busy);
            }
            s.release(channel, &binding);
            Ok(binding.chain)
        })
    }

    /// Scan `buffer` instead of the current one from the next safe point on.
    /// A newer request replaces one not latched yet.
    pub fn request_swap(&self, channel: DmaChannelRef, buffer: DmaSlice<'_>) -> Result<(), Error> {
        self.with(|s| {
            let mut binding = s.bound(channel)?;
            let record = s.arena.chain(binding.chain).ok_or(Error::InvalidArgument)?;
            if record.mode != ChainMode::Ring || !record.contiguous || buffer.len() != record.len {
                return Err(Error::InvalidArgument);
            }
            binding.pending_base = Some(buffer.addr());
            s.store(channel, Some(binding));
            Ok(())
        })
    }

    /// Channel interrupt entry point
    ///
    /// A reported fault releases the channel and hands every descriptor
    /// of its chain back to software before the error is returned; the
    /// chain can be freed or bound again.
    pub fn on_channel_interrupt(&self, channel: DmaChannelRef) -> Result<CompletionEvent, Error> {
        let event = self.with(|s| {
            let status = s.hw.acknowledge_interrupt(channel);
            let mut event = CompletionEvent::new(channel);
            let mut binding = s.bound(channel)?;
            event.active_base = binding.active_base;
            event.next_base = binding.next_base;

            if let Some(fault) = status.fault {
                // The controller has halted; the chain stays allocated
                warn!("dma channel {} fault: {:?}", channel.index, fault);
                s.release(channel, &binding);
                return Err(Error::from(fault));
            }
            let Some(last) = status.completed else {
                return Ok(event);
            };
            if !binding.running {
                trace!("dma channel {} idle completion", channel.index);
                return Ok(event);
            }

            let record = s.arena.chain(binding.chain).ok_or(Error::Descriptor)?;
            let span = s.completed_span(binding.cursor, last, record.count)?;

            let mut index = binding.cursor;
            for _ in 0..span {
                let offset = s.arena.offset(index);
                let next = s.arena.next(index);
                let Some(desc) = s.arena.descriptor_mut(index) else {
                    return Err(Error::Descriptor);
                };
                desc.owner = Owner::Cpu;
                event.descriptors += 1;
                event.bytes += desc.len as usize;

                if record.mode == ChainMode::Ring {
                    if index == record.head && !binding.stopping {
                        if let Some(base) = binding.pending_base.take() {
                            binding.next_base = base;
                            event.latched = true;
                        }
                    }
                    if !binding.stopping {
                        desc.addr = binding.next_base + offset;
                        desc.owner = Owner::Dma;
                    }
                }

                if index == record.tail {
                    match record.mode {
                        ChainMode::Ring => {
                            event.wrapped = true;
                            if binding.next_base != binding.active_base {
                                binding.active_base = binding.next_base;
                                event.swapped = true;
                            }
                            event.active_base = binding.active_base;
                            if binding.stopping {
                                s.release(channel, &binding);
                                event.stopped = true;
                                debug!("dma channel {} stopped at wrap", channel.index);
                                return Ok(event);
                            }
                        }
                        ChainMode::OneShot => {
                            event.done = true;
                            event.stopped = binding.stopping;
                            s.release(channel, &binding);
                            return Ok(event);
                        }
                    }
                }

                if let Some(next) = next {
                    index = next;
                }
            }

            binding.cursor = index;
            event.active_base = binding.active_base;
            event.next_base = binding.next_base;
            s.store(channel, Some(binding));
            Ok(event)
        })?;

        self.descriptors_completed
            .fetch_add(u32::from(event.descriptors), Ordering::Relaxed);
        if event.wrapped {
            self.passes.fetch_add(1, Ordering::Relaxed);
        }
        if event.swapped {
            self.swaps.fetch_add(1, Ordering::Relaxed);
        }
        trace!(
            "dma channel {}: {} descriptors, {} bytes",
            channel.index,
            event.descriptors,
            event.bytes
        );
        Ok(event)
    }

    fn is_free(&self, channel: DmaChannelRef) -> bool {
        self.with(|s| s.binding(channel).map(|b| b.is_none()).unwrap_or(false))
    }

    /// Free channel halves of `direction`
    pub fn free_channels(&self, direction: DmaDirection) -> usize {
        (0..CH as u8)
            .filter(|&index| self.is_free(DmaChannelRef::new(index, direction)))
            .count()
    }

    pub fn free_descriptors(&self) -> usize {
        self.with(|s| s.arena.free_count())
    }

    /// Snapshot of an allocated descriptor
    pub fn descriptor(&self, index: u16) -> Option<Descriptor> {
        self.with(|s| s.arena.descriptor(index))
    }

    /// Descriptor indices of a chain in link order
    pub fn chain_descriptors(&self, chain: ChainHandle) -> heapless::Vec<u16, D> {
        self.with(|s| s.arena.indices(chain))
    }

    /// Buffer address the current pass of a ring scans
    pub fn active_base(&self, channel: DmaChannelRef) -> Option<usize> {
        self.with(|s| s.binding(channel).and_then(|b| b.map(|b| b.active_base)))
    }

    pub fn is_running(&self, channel: DmaChannelRef) -> bool {
        self.with(|s| {
            s.binding(channel)
                .and_then(|b| b.map(|b| b.running))
                .unwrap_or(false)
        })
    }

    pub fn stats(&self) -> DmaStats {
        DmaStats {
            descriptors_completed: self.descriptors_completed.load(Ordering::Relaxed),
            passes: self.passes.load(Ordering::Relaxed),
            swaps: self.swaps.load(Ordering::Relaxed),
        }
    }
}
