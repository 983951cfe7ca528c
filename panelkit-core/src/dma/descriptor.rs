//! DMA descriptors and the descriptor arena
//!
//! Descriptors live in a fixed arena and link to each other by index, so a
//! ring is just a chain whose tail links back to its head. Every descriptor
//! carries an owner bit: the controller only processes descriptors it owns,
//! and software only rewrites descriptors it owns.

use panelkit_hal::DmaSlice;

use crate::Error;

/// Largest buffer a single descriptor can describe
pub const MAX_DESCRIPTOR_LEN: usize = 4092;

/// Side currently allowed to touch a descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Owner {
    Cpu,
    Dma,
}

/// Link to the next descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Link {
    Next(u16),
    End,
}

/// One hardware descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Descriptor {
    /// Bus address of the buffer
    pub addr: usize,
    /// Buffer length in bytes
    pub len: u16,
    pub link: Link,
    pub owner: Owner,
    /// Completion of this descriptor ends a frame (pass or transfer)
    pub eof: bool,
}

impl Descriptor {
    const EMPTY: Self = Self {
        addr: 0,
        len: 0,
        link: Link::End,
        owner: Owner::Cpu,
        eof: false,
    };
}

/// How a chain ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChainMode {
    /// Tail links back to head; runs until stopped
    Ring,
    /// Tail ends the transfer with a single completion
    OneShot,
}

/// Handle to an allocated chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChainHandle(pub(crate) u16);

#[derive(Debug, Clone, Copy)]
struct Slot {
    desc: Descriptor,
    in_use: bool,
    /// Offset of this descriptor's bytes from the start of the chain
    offset: usize,
}

impl Slot {
    const FREE: Self = Self {
        desc: Descriptor::EMPTY,
        in_use: false,
        offset: 0,
    };
}

/// Bookkeeping of one allocated chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ChainRecord {
    pub head: u16,
    pub tail: u16,
    pub count: u16,
    pub len: usize,
    pub mode: ChainMode,
    /// Chain covers a single contiguous buffer and can be retargeted
    pub contiguous: bool,
    pub bound: bool,
}

/// Fixed pool of `D` descriptors
pub(crate) struct DescriptorArena<const D: usize> {
    slots: [Slot; D],
    chains: [Option<ChainRecord>; D],
}

impl<const D: usize> DescriptorArena<D> {
    pub const fn new() -> Self {
        Self {
            slots: [Slot::FREE; D],
            chains: [None; D],
        }
    }

    pub fn free_count(&self) -> usize {
        self.slots.iter().filter(|s| !s.in_use).count()
    }

    /// Build a chain over `segments`, splitting each into descriptors of
    /// at most `max_chunk` bytes. All-or-nothing.
    pub fn allocate(
        &mut self,
        segments: &[DmaSlice<'_>],
        mode: ChainMode,
        max_chunk: usize,
    ) -> Result<ChainHandle, Error> {
        if segments.is_empty() || segments.iter().any(|s| s.is_empty()) {
            return Err(Error::InvalidArgument);
        }
        let needed: usize = segments.iter().map(|s| s.len().div_ceil(max_chunk)).sum();
        if needed > self.free_count() || needed > u16::MAX as usize {
            return Err(Error::ResourceExhausted);
        }
        let chain_index = self
            .chains
            .iter()
            .position(|c| c.is_none())
            .ok_or(Error::ResourceExhausted)?;

        let mut head = None;
        let mut prev: Option<u16> = None;
        let mut offset = 0;
        for segment in segments {
            let mut seg_offset = 0;
            while seg_offset < segment.len() {
                let len = (segment.len() - seg_offset).min(max_chunk);
                let index = self.take_free_slot().ok_or(Error::ResourceExhausted)?;
                self.slots[index as usize] = Slot {
                    desc: Descriptor {
                        addr: segment.addr() + seg_offset,
                        len: len as u16,
                        link: Link::End,
                        owner: Owner::Cpu,
                        eof: false,
                    },
                    in_use: true,
                    offset,
                };
                match prev {
                    Some(p) => self.slots[p as usize].desc.link = Link::Next(index),
                    None => head = Some(index),
                }
                prev = Some(index);
                seg_offset += len;
                offset += len;
            }
        }

        let (Some(head), Some(tail)) = (head, prev) else {
            return Err(Error::InvalidArgument);
        };
        self.slots[tail as usize].desc.eof = true;
        if mode == ChainMode::Ring {
            self.slots[tail as usize].desc.link = Link::Next(head);
        }

        self.chains[chain_index] = Some(ChainRecord {
            head,
            tail,
            count: needed as u16,
            len: offset,
            mode,
            contiguous: segments.len() == 1,
            bound: false,
        });
        Ok(ChainHandle(chain_index as u16))
    }

    fn take_free_slot(&self) -> Option<u16> {
        self.slots
            .iter()
            .position(|s| !s.in_use)
            .map(|i| i as u16)
    }

    pub fn chain(&self, handle: ChainHandle) -> Option<ChainRecord> {
        self.chains.get(handle.0 as usize).copied().flatten()
    }

    pub fn chain_mut(&mut self, handle: ChainHandle) -> Option<&mut ChainRecord> {
        self.chains.get_mut(handle.0 as usize).and_then(|c| c.as_mut())
    }

    /// Return a chain's descriptors to the pool
    pub fn free(&mut self, handle: ChainHandle) -> Result<(), Error> {
        let record = self.chain(handle).ok_or(Error::InvalidArgument)?;
        if record.bound {
            return Err(Error::Busy);
        }
        let mut index = record.head;
        for _ in 0..record.count {
            let slot = &mut self.slots[index as usize];
            let next = slot.desc.link;
            *slot = Slot::FREE;
            match next {
                Link::Next(n) => index = n,
                Link::End => break,
            }
        }
        self.chains[handle.0 as usize] = None;
        Ok(())
    }

    pub fn descriptor(&self, index: u16) -> Option<Descriptor> {
        self.slots
            .get(index as usize)
            .filter(|s| s.in_use)
            .map(|s| s.desc)
    }

    pub fn descriptor_mut(&mut self, index: u16) -> Option<&mut Descriptor> {
        self.slots
            .get_mut(index as usize)
            .filter(|s| s.in_use)
            .map(|s| &mut s.desc)
    }

    pub fn offset(&self, index: u16) -> usize {
        self.slots.get(index as usize).map(|s| s.offset).unwrap_or(0)
    }

    pub fn next(&self, index: u16) -> Option<u16> {
        match self.descriptor(index)?.link {
            Link::Next(n) => Some(n),
            Link::End => None,
        }
    }

    /// Indices of a chain in link order
    pub fn indices(&self, handle: ChainHandle) -> heapless::Vec<u16, D> {
        let mut out = heapless::Vec::new();
        if let Some(record) = self.chain(handle) {
            let mut index = record.head;
            for _ in 0..record.count {
                let _ = out.push(index);
                match self.next(index) {
                    Some(n) => index = n,
                    None => break,
                }
            }
        }
        out
    }

    pub fn set_owner_all(&mut self, handle: ChainHandle, owner: Owner) {
        for index in self.indices(handle) {
            if let Some(desc) = self.descriptor_mut(index) {
                desc.owner = owner;
            }
        }
    }

    /// Point a contiguous chain at another buffer of the same length.
    /// Only allowed while every descriptor is software-owned.
    pub fn retarget(&mut self, handle: ChainHandle, buffer: &DmaSlice<'_>) -> Result<(), Error> {
        let record = self.chain(handle).ok_or(Error::InvalidArgument)?;
        if !record.contiguous || buffer.len() != record.len {
            return Err(Error::InvalidArgument);
        }
        let indices = self.indices(handle);
        if indices
            .iter()
            .any(|&i| self.descriptor(i).map(|d| d.owner) != Some(Owner::Cpu))
        {
            return Err(Error::Busy);
        }
        for index in indices {
            let offset = self.offset(index);
            if let Some(desc) = self.descriptor_mut(index) {
                desc.addr = buffer.addr() + offset;
            }
        }
        Ok(())
    }
}
