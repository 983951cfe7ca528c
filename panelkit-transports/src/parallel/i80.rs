//! i80 (8080-style) parallel transport
//!
//! Commands and payloads up to the inline threshold are written through
//! the data register and finish synchronously. Longer payloads must live
//! in DMA-reachable memory and are clocked out by a one-shot DMA chain
//! bound for the duration of the transfer; the bus completion interrupt
//! then returns the channel and descriptors to the engine.

use panelkit_core::config::{CommandBytes, ConfigError, PhaseWidths};
use panelkit_core::dma::DmaEngine;
use panelkit_core::io::{OpSequence, Outcome, PayloadKind, Step, Transaction, Transport};
use panelkit_core::Error;
use panelkit_hal::{DmaHardware, OutputPin, ParallelBus, ParallelStatus};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::{
    bus_error, bus_phases, encode_command, validate_parallel, DcLevels, DcPhase, DmaPass,
    MAX_INLINE_THRESHOLD,
};

/// i80 bus configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct I80Config {
    pub phases: PhaseWidths,
    pub dc_levels: DcLevels,
    /// Swap the bytes of each 16-bit pixel on the way out
    pub swap_color_bytes: bool,
    /// Payloads up to this many bytes are written directly
    pub inline_threshold: usize,
    pub max_transfer_bytes: usize,
}

impl Default for I80Config {
    fn default() -> Self {
        Self {
            phases: PhaseWidths::BYTE,
            dc_levels: DcLevels::default(),
            swap_color_bytes: false,
            inline_threshold: 32,
            max_transfer_bytes: 64 * 1024,
        }
    }
}

impl I80Config {
    pub fn with_phases(mut self, phases: PhaseWidths) -> Self {
        self.phases = phases;
        self
    }

    pub fn with_dc_levels(mut self, levels: DcLevels) -> Self {
        self.dc_levels = levels;
        self
    }

    pub fn with_swap_color_bytes(mut self, swap: bool) -> Self {
        self.swap_color_bytes = swap;
        self
    }

    pub fn with_inline_threshold(mut self, threshold: usize) -> Self {
        self.inline_threshold = threshold;
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
        Ok(())
    }
}

/// i80 bus operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum I80Op {
    Dc(DcPhase),
    Command,
    /// Payload through the data register
    Direct,
    /// Payload through a DMA chain
    Dma,
}

/// i80 transport over bus `B` and D/C line `DC`, borrowing the DMA engine
pub struct I80Transport<'e, B, DC, H, const CH: usize, const D: usize> {
    bus: B,
    dc: DC,
    engine: &'e DmaEngine<H, CH, D>,
    config: I80Config,
    /// Command widths as clocked on this bus
    phases: PhaseWidths,
    width: u8,
    command: CommandBytes,
    pass: Option<DmaPass>,
}

impl<'e, B, DC, H, const CH: usize, const D: usize> I80Transport<'e, B, DC, H, CH, D>
where
    B: ParallelBus,
    DC: OutputPin,
    H: DmaHardware,
{
    pub fn new(
        bus: B,
        mut dc: DC,
        engine: &'e DmaEngine<H, CH, D>,
        config: I80Config,
    ) -> Result<Self, Error> {
        config.validate()?;
        let width = bus.bus_width();
        let phases = bus_phases(config.phases, width)?;
        dc.set_level(config.dc_levels.idle);
        debug!("i80 transport, {} bit bus", width);
        Ok(Self {
            bus,
            dc,
            engine,
            config,
            phases,
            width,
            command: CommandBytes::new(),
            pass: None,
        })
    }

    pub fn release(self) -> (B, DC) {
        (self.bus, self.dc)
    }
}

impl<'a, 'e, B, DC, H, const CH: usize, const D: usize> Transport<'a>
    for I80Transport<'e, B, DC, H, CH, D>
where
    B: ParallelBus,
    DC: OutputPin,
    H: DmaHardware,
{
    type Op = I80Op;
    type Status = ParallelStatus;

    fn validate(&self, txn: &Transaction<'a>) -> Result<(), Error> {
        validate_parallel(&self.phases, self.width, self.config.max_transfer_bytes, txn)?;
        if txn.payload.len() > self.config.inline_threshold && txn.payload.dma().is_none() {
            return Err(Error::InvalidArgument);
        }
        Ok(())
    }

    fn encode(&mut self, txn: &Transaction<'a>, ops: &mut OpSequence<I80Op>) -> Result<(), Error> {
        self.command = encode_command(&self.phases, txn)?;
        let mut push = |op| ops.push(op).map_err(|_| Error::InvalidArgument);

        if !self.command.is_empty() {
            push(I80Op::Dc(DcPhase::Command))?;
            push(I80Op::Command)?;
        }
        let len = txn.payload.len();
        if len > 0 {
            push(I80Op::Dc(DcPhase::Data))?;
            if len > self.config.inline_threshold {
                push(I80Op::Dma)?;
            } else {
                push(I80Op::Direct)?;
            }
        }
        push(I80Op::Dc(DcPhase::Idle))
    }

    fn start(&mut self, op: I80Op, txn: &Transaction<'a>) -> Result<Step, Error> {
        match op {
            I80Op::Dc(phase) => {
                self.dc.set_level(self.config.dc_levels.level(phase));
                Ok(Step::Done)
            }
            I80Op::Command => {
                self.bus.set_byte_swap(false);
                self.bus.write_direct(&self.command).map_err(bus_error)?;
                Ok(Step::Done)
            }
            I80Op::Direct => {
                self.bus.set_byte_swap(self.swap(txn));
                self.bus
                    .write_direct(txn.payload.as_bytes())
                    .map_err(bus_error)?;
                Ok(Step::Done)
            }
            I80Op::Dma => {
                let data = txn.payload.dma().ok_or(Error::InvalidArgument)?;
                self.bus.set_byte_swap(self.swap(txn));
                self.pass = Some(DmaPass::launch(self.engine, &mut self.bus, data)?);
                trace!("i80 dma pass, {} bytes", data.len());
                Ok(Step::Pending)
            }
        }
    }

    fn acknowledge(&mut self) -> ParallelStatus {
        self.bus.acknowledge_interrupt()
    }

    fn on_complete(&mut self, _: I80Op, status: ParallelStatus) -> Outcome<I80Op> {
        if let Some(pass) = self.pass.take() {
            pass.finish(self.engine);
        }
        match status.fault {
            Some(fault) => {
                warn!("i80 fault: {:?}", fault);
                Outcome::Failed(bus_error(fault))
            }
            None => Outcome::Next,
        }
    }

    fn set_interrupt_enabled(&mut self, enable: bool) {
        self.bus.enable_interrupt(enable);
    }
}

impl<B, DC, H, const CH: usize, const D: usize> I80Transport<'_, B, DC, H, CH, D> {
    fn swap(&self, txn: &Transaction<'_>) -> bool {
        self.config.swap_color_bytes && self.width == 16 && txn.kind == PayloadKind::Color
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use panelkit_core::dma::DmaEngineConfig;
    use panelkit_core::io::Payload;
    use panelkit_hal::Level;
    use panelkit_hal_host::{SimDma, SimParallel, SimPin, Trace};

    type Engine = DmaEngine<SimDma, 1, 8>;

    fn engine() -> Engine {
        let (hw, _probe) = SimDma::new(&Trace::new());
        DmaEngine::new(hw, DmaEngineConfig::default()).unwrap()
    }

    #[test]
    fn test_rejects_bad_width_and_threshold() {
        let engine = engine();
        let trace = Trace::new();

        let (bus, _probe) = SimParallel::new(12, &trace);
        assert_eq!(
            I80Transport::new(bus, SimPin::new("dc", &trace), &engine, I80Config::default()).err(),
            Some(Error::Config(ConfigError::BusWidth))
        );

        let (bus, _probe) = SimParallel::new(8, &trace);
        let config = I80Config::default().with_inline_threshold(65);
        assert_eq!(
            I80Transport::new(bus, SimPin::new("dc", &trace), &engine, config).err(),
            Some(Error::Config(ConfigError::InlineThreshold))
        );
    }

    #[test]
    fn test_validate() {
        let engine = engine();
        let trace = Trace::new();
        let (bus, _probe) = SimParallel::new(16, &trace);
        let dc = SimPin::new("dc", &trace);
        let t = I80Transport::new(bus, dc.clone(), &engine, I80Config::default()).unwrap();
        assert_eq!(dc.level(), Level::High);

        let long = [0u8; 40];
        let odd = [0u8; 3];
        for (txn, expected) in [
            (Transaction::read(Some(0x04), 3), Error::Unsupported),
            (Transaction::color(None, Payload::from(&long)), Error::InvalidArgument),
            (Transaction::color(None, Payload::from(&odd)), Error::InvalidArgument),
        ] {
            assert_eq!(t.validate(&txn), Err(expected));
        }
    }

    #[test]
    fn test_encode_phases() {
        let engine = engine();
        let trace = Trace::new();
        let (bus, _probe) = SimParallel::new(8, &trace);
        let mut t =
            I80Transport::new(bus, SimPin::new("dc", &trace), &engine, I80Config::default())
                .unwrap();

        let mut ops = OpSequence::new();
        let txn = Transaction::write(Some(0x3A), Payload::inline(&[0x55]).unwrap());
        t.encode(&txn, &mut ops).unwrap();
        assert_eq!(
            ops.as_slice(),
            &[
                I80Op::Dc(DcPhase::Command),
                I80Op::Command,
                I80Op::Dc(DcPhase::Data),
                I80Op::Direct,
                I80Op::Dc(DcPhase::Idle),
            ]
        );
    }
}
