//! DMA-reachable memory
//!
//! Not every RAM region is visible to the DMA controller (tightly coupled
//! memories, cached external RAM). Buffers handed to a descriptor must come
//! from a region the memory map declares DMA-reachable, so the only way to
//! obtain a [`DmaSlice`] is through a [`DmaBuffer`], and the only way to
//! obtain a [`DmaBuffer`] is through a [`DmaMemory`] allocator.
//!
//! ```ignore
//! #[link_section = ".dma_ram"]
//! static mut POOL: [u8; 64 * 1024] = [0; 64 * 1024];
//!
//! let mut region = DmaRegion::new(pool);
//! let fb = region.allocate_dma_buffer(480 * 272 * 2)?;
//! ```

use core::ops::{Deref, DerefMut};

/// Alignment of every buffer handed out by [`DmaRegion`]
pub const DMA_ALIGN: usize = 4;

/// The allocator could not satisfy the request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OutOfMemory;

/// Allocator of DMA-reachable buffers
pub trait DmaMemory<'d> {
    /// Allocate a zeroed buffer of `size` bytes
    fn allocate_dma_buffer(&mut self, size: usize) -> Result<DmaBuffer<'d>, OutOfMemory>;
}

/// Writable buffer in DMA-reachable memory
#[derive(Debug)]
pub struct DmaBuffer<'d> {
    bytes: &'d mut [u8],
}

impl<'d> DmaBuffer<'d> {
    /// Wrap memory the caller knows to be DMA-reachable.
    ///
    /// Chip HALs implementing [`DmaMemory`] use this; applications should
    /// go through an allocator.
    pub fn from_dma_reachable(bytes: &'d mut [u8]) -> Self {
        Self { bytes }
    }

    /// Bus address of the first byte
    pub fn addr(&self) -> usize {
        self.bytes.as_ptr() as usize
    }

    /// Read-only view that can be attached to a descriptor
    pub fn as_dma_slice(&self) -> DmaSlice<'_> {
        DmaSlice { bytes: self.bytes }
    }

    /// Give up write access for the rest of the buffer's lifetime
    pub fn into_dma_slice(self) -> DmaSlice<'d> {
        DmaSlice { bytes: self.bytes }
    }
}

impl Deref for DmaBuffer<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.bytes
    }
}

impl DerefMut for DmaBuffer<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.bytes
    }
}

/// Read-only view of DMA-reachable memory
#[derive(Debug, Clone, Copy)]
pub struct DmaSlice<'a> {
    bytes: &'a [u8],
}

impl<'a> DmaSlice<'a> {
    /// Bus address of the first byte
    pub fn addr(&self) -> usize {
        self.bytes.as_ptr() as usize
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Sub-range of the view; `None` if out of bounds
    pub fn get(&self, start: usize, len: usize) -> Option<DmaSlice<'a>> {
        let end = start.checked_add(len)?;
        self.bytes.get(start..end).map(|bytes| DmaSlice { bytes })
    }
}

/// Bump allocator over one DMA-reachable region
///
/// Buffers are never returned to the region; panel I/O allocates its
/// frame and bounce buffers once at configuration time.
#[derive(Debug)]
pub struct DmaRegion<'d> {
    remaining: &'d mut [u8],
}

impl<'d> DmaRegion<'d> {
    /// Manage `region`, which must be DMA-reachable
    pub fn new(region: &'d mut [u8]) -> Self {
        Self { remaining: region }
    }

    /// Bytes still available (before alignment padding)
    pub fn available(&self) -> usize {
        self.remaining.len()
    }
}

impl<'d> DmaMemory<'d> for DmaRegion<'d> {
    fn allocate_dma_buffer(&mut self, size: usize) -> Result<DmaBuffer<'d>, OutOfMemory> {
        if size == 0 {
            return Err(OutOfMemory);
        }

        let misalign = self.remaining.as_ptr() as usize % DMA_ALIGN;
        let padding = if misalign == 0 { 0 } else { DMA_ALIGN - misalign };
        let needed = padding.checked_add(size).ok_or(OutOfMemory)?;
        if needed > self.remaining.len() {
            return Err(OutOfMemory);
        }

        let region = core::mem::take(&mut self.remaining);
        let (_, aligned) = region.split_at_mut(padding);
        let (bytes, rest) = aligned.split_at_mut(size);
        self.remaining = rest;

        bytes.fill(0);
        Ok(DmaBuffer::from_dma_reachable(bytes))
    }
}
