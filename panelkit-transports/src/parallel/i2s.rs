//! I2S peripheral in parallel LCD mode
//!
//! Same bus contract as [`super::i80`], with one difference on the DMA
//! path: the peripheral fetches 32-bit words and, in 16-bit mode, clocks
//! the high halfword of each word first. Long payloads are therefore
//! staged into a DMA-reachable bounce buffer with their halfwords
//! interleaved, padded to whole words, and sent in bounce-sized chunks,
//! each its own one-shot DMA pass. Because of the staging the caller's
//! payload does not have to be DMA-reachable.

use panelkit_core::config::{CommandBytes, ConfigError, PhaseWidths};
use panelkit_core::dma::DmaEngine;
use panelkit_core::io::{OpSequence, Outcome, Step, Transaction, Transport};
use panelkit_core::Error;
use panelkit_hal::{DmaBuffer, DmaHardware, DmaMemory, OutputPin, ParallelBus, ParallelStatus};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::{
    bus_error, bus_phases, encode_command, validate_parallel, DcLevels, DcPhase, DmaPass,
    MAX_INLINE_THRESHOLD,
};

/// I2S parallel bus configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct I2sParallelConfig {
    pub phases: PhaseWidths,
    pub dc_levels: DcLevels,
    /// Payloads up to this many bytes are written directly
    pub inline_threshold: usize,
    pub max_transfer_bytes: usize,
    /// Bounce buffer size; a multiple of 4
    pub bounce_bytes: usize,
}

impl Default for I2sParallelConfig {
    fn default() -> Self {
        Self {
            phases: PhaseWidths::BYTE,
            dc_levels: DcLevels::default(),
            inline_threshold: 32,
            max_transfer_bytes: 64 * 1024,
            bounce_bytes: 4000,
        }
    }
}

impl I2sParallelConfig {
    pub fn with_phases(mut self, phases: PhaseWidths) -> Self {
        self.phases = phases;
        self
    }

    pub fn with_dc_levels(mut self, levels: DcLevels) -> Self {
        self.dc_levels = levels;
        self
    }

    pub fn with_inline_threshold(mut self, threshold: usize) -> Self {
        self.inline_threshold = threshold;
        self
    }

    pub fn with_bounce_bytes(mut self, bytes: usize) -> Self {
        self.bounce_bytes = bytes;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.phases.validate()?;
        if self.inline_threshold > MAX_INLINE_THRESHOLD {
            return Err(ConfigError::InlineThreshold);
        }
        if self.max_transfer_bytes == 0 {
            return Err(ConfigError::MaxTransferBytes);
        }
        if self.bounce_bytes == 0 || self.bounce_bytes % 4 != 0 {
            return Err(ConfigError::BounceBuffer);
        }
        Ok(())
    }
}

/// Copy `src` into `dst` in the order the peripheral fetches it and pad
/// to a whole number of 32-bit words. Returns the staged length, or 0 if
/// `dst` is too short.
///
/// In 16-bit mode the two halfwords of every word trade places so the
/// first pixel lands in the half clocked first. 8-bit data is copied as is.
pub fn stage(src: &[u8], dst: &mut [u8], width16: bool) -> usize {
    let staged = (src.len() + 3) & !3;
    let Some(dst) = dst.get_mut(..staged) else {
        return 0;
    };
    dst.fill(0);

    if !width16 {
        dst[..src.len()].copy_from_slice(src);
        return staged;
    }

    for (word, out) in src.chunks(4).zip(dst.chunks_exact_mut(4)) {
        let (low, high) = word.split_at(word.len().min(2));
        out[2..2 + low.len()].copy_from_slice(low);
        out[..high.len()].copy_from_slice(high);
    }
    staged
}

/// I2S parallel bus operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum I2sOp {
    Dc(DcPhase),
    Command,
    /// Payload through the data register
    Direct,
    /// Next bounce-sized chunk of the payload
    Chunk,
}

/// I2S parallel transport with its own bounce buffer
pub struct I2sParallelTransport<'e, 'b, B, DC, H, const CH: usize, const D: usize> {
    bus: B,
    dc: DC,
    engine: &'e DmaEngine<H, CH, D>,
    config: I2sParallelConfig,
    phases: PhaseWidths,
    width: u8,
    command: CommandBytes,
    bounce: DmaBuffer<'b>,
    /// Payload bytes in the transaction
    total: usize,
    /// Payload bytes already sent
    offset: usize,
    /// Payload bytes in the chunk on the bus
    chunk: usize,
    pass: Option<DmaPass>,
}

impl<'e, 'b, B, DC, H, const CH: usize, const D: usize> I2sParallelTransport<'e, 'b, B, DC, H, CH, D>
where
    B: ParallelBus,
    DC: OutputPin,
    H: DmaHardware,
{
    /// Configure the bus and allocate the bounce buffer from `memory`
    pub fn new(
        bus: B,
        mut dc: DC,
        engine: &'e DmaEngine<H, CH, D>,
        memory: &mut impl DmaMemory<'b>,
        config: I2sParallelConfig,
    ) -> Result<Self, Error> {
        config.validate()?;
        let width = bus.bus_width();
        let phases = bus_phases(config.phases, width)?;
        let bounce = memory.allocate_dma_buffer(config.bounce_bytes)?;
        dc.set_level(config.dc_levels.idle);
        debug!(
            "i2s parallel transport, {} bit bus, {} byte bounce",
            width, config.bounce_bytes
        );
        Ok(Self {
            bus,
            dc,
            engine,
            config,
            phases,
            width,
            command: CommandBytes::new(),
            bounce,
            total: 0,
            offset: 0,
            chunk: 0,
            pass: None,
        })
    }

    pub fn release(self) -> (B, DC, DmaBuffer<'b>) {
        (self.bus, self.dc, self.bounce)
    }

    fn send_chunk(&mut self, payload: &[u8]) -> Result<Step, Error> {
        let remaining = payload.get(self.offset..).unwrap_or(&[]);
        let take = remaining.len().min(self.bounce.len());
        let staged = stage(&remaining[..take], &mut self.bounce, self.width == 16);

        let data = self
            .bounce
            .as_dma_slice()
            .get(0, staged)
            .ok_or(Error::InvalidArgument)?;
        self.pass = Some(DmaPass::launch(self.engine, &mut self.bus, data)?);
        self.chunk = take;
        trace!("i2s chunk at {}, {} bytes staged", self.offset, staged);
        Ok(Step::Pending)
    }
}

impl<'a, 'e, 'b, B, DC, H, const CH: usize, const D: usize> Transport<'a>
    for I2sParallelTransport<'e, 'b, B, DC, H, CH, D>
where
    B: ParallelBus,
    DC: OutputPin,
    H: DmaHardware,
{
    type Op = I2sOp;
    type Status = ParallelStatus;

    fn validate(&self, txn: &Transaction<'a>) -> Result<(), Error> {
        validate_parallel(&self.phases, self.width, self.config.max_transfer_bytes, txn)
    }

    fn encode(&mut self, txn: &Transaction<'a>, ops: &mut OpSequence<I2sOp>) -> Result<(), Error> {
        self.command = encode_command(&self.phases, txn)?;
        self.total = txn.payload.len();
        self.offset = 0;
        self.chunk = 0;
        let mut push = |op| ops.push(op).map_err(|_| Error::InvalidArgument);

        if !self.command.is_empty() {
            push(I2sOp::Dc(DcPhase::Command))?;
            push(I2sOp::Command)?;
        }
        let len = txn.payload.len();
        if len > 0 {
            push(I2sOp::Dc(DcPhase::Data))?;
            if len > self.config.inline_threshold {
                push(I2sOp::Chunk)?;
            } else {
                push(I2sOp::Direct)?;
            }
        }
        push(I2sOp::Dc(DcPhase::Idle))
    }

    fn start(&mut self, op: I2sOp, txn: &Transaction<'a>) -> Result<Step, Error> {
        match op {
            I2sOp::Dc(phase) => {
                self.dc.set_level(self.config.dc_levels.level(phase));
                Ok(Step::Done)
            }
            I2sOp::Command => {
                self.bus.write_direct(&self.command).map_err(bus_error)?;
                Ok(Step::Done)
            }
            I2sOp::Direct => {
                self.bus
                    .write_direct(txn.payload.as_bytes())
                    .map_err(bus_error)?;
                Ok(Step::Done)
            }
            I2sOp::Chunk => self.send_chunk(txn.payload.as_bytes()),
        }
    }

    fn acknowledge(&mut self) -> ParallelStatus {
        self.bus.acknowledge_interrupt()
    }

    fn on_complete(&mut self, _: I2sOp, status: ParallelStatus) -> Outcome<I2sOp> {
        if let Some(pass) = self.pass.take() {
            pass.finish(self.engine);
        }
        if let Some(fault) = status.fault {
            warn!("i2s parallel fault at byte {}: {:?}", self.offset, fault);
            return Outcome::Failed(bus_error(fault));
        }
        self.offset += self.chunk;
        self.chunk = 0;
        if self.offset < self.total {
            Outcome::Repeat
        } else {
            Outcome::Next
        }
    }

    fn set_interrupt_enabled(&mut self, enable: bool) {
        self.bus.enable_interrupt(enable);
    }
}
