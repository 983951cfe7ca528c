//! SPI transport
//!
//! A transaction becomes at most two clocked exchanges: the command
//! bytes with D/C at the command level, then the parameter or pixel bytes
//! (or a read) with D/C at the data level. The D/C line is switched by a
//! synchronous step right before each exchange is initiated, so it is
//! stable before the first clock edge.

use panelkit_core::config::{CommandBytes, ConfigError, PhaseWidths};
use panelkit_core::io::{
    Direction, OpSequence, Outcome, PayloadKind, Step, Transaction, Transport,
};
use panelkit_core::{BusFault, Error};
use panelkit_hal::{Level, OutputPin, SpiEngine, SpiStatus, SpiTransfer, MAX_RX_BYTES};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// SPI bus configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SpiBusConfig {
    pub phases: PhaseWidths,
    /// D/C is low during data phases and high during the command phase
    pub dc_low_on_data: bool,
    /// Reads clock zeros out while sampling instead of a half-duplex read
    pub full_duplex: bool,
    /// Largest single exchange the peripheral accepts
    pub max_transfer_bytes: usize,
}

impl Default for SpiBusConfig {
    fn default() -> Self {
        Self {
            phases: PhaseWidths::BYTE,
            dc_low_on_data: false,
            full_duplex: false,
            max_transfer_bytes: 32 * 1024,
        }
    }
}

impl SpiBusConfig {
    pub fn with_phases(mut self, phases: PhaseWidths) -> Self {
        self.phases = phases;
        self
    }

    pub fn with_dc_low_on_data(mut self, low: bool) -> Self {
        self.dc_low_on_data = low;
        self
    }

    pub fn with_full_duplex(mut self, full_duplex: bool) -> Self {
        self.full_duplex = full_duplex;
        self
    }

    pub fn with_max_transfer_bytes(mut self, max: usize) -> Self {
        self.max_transfer_bytes = max;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.phases.validate()?;
        if self.max_transfer_bytes == 0 {
            return Err(ConfigError::MaxTransferBytes);
        }
        Ok(())
    }

    fn dc_level(&self, data: bool) -> Level {
        // Command phase is low unless the polarity is inverted
        Level::from_high(data != self.dc_low_on_data)
    }
}

/// SPI bus operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SpiOp {
    /// Drive D/C for the command (`false`) or data (`true`) phase
    Dc { data: bool },
    Command,
    Payload,
    Read(usize),
}

/// Zeros clocked out by full-duplex reads
const READ_FILL: [u8; MAX_RX_BYTES] = [0; MAX_RX_BYTES];

/// SPI transport over peripheral `S` with D/C line `DC`
pub struct SpiTransport<S, DC> {
    spi: S,
    dc: DC,
    config: SpiBusConfig,
    /// Command bytes of the transaction in flight
    command: CommandBytes,
}

impl<S: SpiEngine, DC: OutputPin> SpiTransport<S, DC> {
    pub fn new(spi: S, dc: DC, config: SpiBusConfig) -> Result<Self, Error> {
        config.validate()?;
        debug!(
            "spi transport: {} bit commands, {} bit params",
            config.phases.cmd_bits,
            config.phases.param_bits
        );
        Ok(Self {
            spi,
            dc,
            config,
            command: CommandBytes::new(),
        })
    }

    pub fn config(&self) -> &SpiBusConfig {
        &self.config
    }

    /// Release the peripheral and the D/C line
    pub fn release(self) -> (S, DC) {
        (self.spi, self.dc)
    }
}

impl<'a, S: SpiEngine, DC: OutputPin> Transport<'a> for SpiTransport<S, DC> {
    type Op = SpiOp;
    type Status = SpiStatus;

    fn validate(&self, txn: &Transaction<'a>) -> Result<(), Error> {
        if let Some(cmd) = txn.command {
            self.config.phases.encode_command(cmd)?;
        }
        if txn.kind == PayloadKind::Param {
            self.config.phases.check_params(txn.payload.len())?;
        }
        if txn.data_len() > self.config.max_transfer_bytes {
            return Err(Error::InvalidArgument);
        }
        Ok(())
    }

    fn encode(&mut self, txn: &Transaction<'a>, ops: &mut OpSequence<SpiOp>) -> Result<(), Error> {
        let mut push = |op| ops.push(op).map_err(|_| Error::InvalidArgument);

        self.command.clear();
        if let Some(cmd) = txn.command {
            self.command = self.config.phases.encode_command(cmd)?;
            push(SpiOp::Dc { data: false })?;
            push(SpiOp::Command)?;
        }
        match txn.direction {
            Direction::Write if !txn.payload.is_empty() => {
                push(SpiOp::Dc { data: true })?;
                push(SpiOp::Payload)?;
            }
            Direction::Write => {}
            Direction::Read { len } => {
                push(SpiOp::Dc { data: true })?;
                push(SpiOp::Read(len))?;
            }
        }
        Ok(())
    }

    fn start(&mut self, op: SpiOp, txn: &Transaction<'a>) -> Result<Step, Error> {
        let transfer = match op {
            SpiOp::Dc { data } => {
                self.dc.set_level(self.config.dc_level(data));
                return Ok(Step::Done);
            }
            SpiOp::Command => SpiTransfer::Write(&self.command),
            SpiOp::Payload => SpiTransfer::Write(txn.payload.as_bytes()),
            SpiOp::Read(len) if self.config.full_duplex => {
                SpiTransfer::Exchange(READ_FILL.get(..len).ok_or(Error::InvalidArgument)?)
            }
            SpiOp::Read(len) => SpiTransfer::Read(len),
        };
        self.spi
            .initiate(transfer)
            .map_err(|fault| Error::Bus(BusFault::from(fault)))?;
        Ok(Step::Pending)
    }

    fn acknowledge(&mut self) -> SpiStatus {
        self.spi.acknowledge_interrupt()
    }

    fn on_complete(&mut self, op: SpiOp, status: SpiStatus) -> Outcome<SpiOp> {
        if let Some(fault) = status.fault {
            warn!("spi fault: {:?}", fault);
            return Outcome::Failed(Error::Bus(fault.into()));
        }
        match op {
            SpiOp::Read(_) => Outcome::Received(status.rx),
            _ => Outcome::Next,
        }
    }

    fn set_interrupt_enabled(&mut self, enable: bool) {
        self.spi.enable_interrupt(enable);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use panelkit_core::io::Payload;
    use panelkit_hal_host::{SimPin, SimSpi, Trace};

    fn transport(config: SpiBusConfig) -> SpiTransport<SimSpi, SimPin> {
        let trace = Trace::new();
        let (spi, _probe) = SimSpi::new(&trace);
        SpiTransport::new(spi, SimPin::new("dc", &trace), config).unwrap()
    }

    #[test]
    fn test_encode_write() {
        let mut t = transport(SpiBusConfig::default());
        let mut ops = OpSequence::new();
        let txn = Transaction::write(Some(0x2A), Payload::inline(&[0, 0, 0, 239]).unwrap());
        t.encode(&txn, &mut ops).unwrap();
        assert_eq!(
            ops.as_slice(),
            &[
                SpiOp::Dc { data: false },
                SpiOp::Command,
                SpiOp::Dc { data: true },
                SpiOp::Payload
            ]
        );
        assert_eq!(t.command.as_slice(), &[0x2A]);
    }

    #[test]
    fn test_encode_command_only_and_data_only() {
        let mut t = transport(SpiBusConfig::default());
        let mut ops = OpSequence::new();
        t.encode(&Transaction::write(Some(0x29), Payload::Empty), &mut ops)
            .unwrap();
        assert_eq!(ops.as_slice(), &[SpiOp::Dc { data: false }, SpiOp::Command]);

        ops.clear();
        t.encode(&Transaction::color(None, Payload::from(&[1u8, 2])), &mut ops)
            .unwrap();
        assert_eq!(ops.as_slice(), &[SpiOp::Dc { data: true }, SpiOp::Payload]);
    }

    #[test]
    fn test_dc_polarity() {
        let config = SpiBusConfig::default();
        assert_eq!(config.dc_level(false), Level::Low);
        assert_eq!(config.dc_level(true), Level::High);

        let inverted = config.with_dc_low_on_data(true);
        assert_eq!(inverted.dc_level(false), Level::High);
        assert_eq!(inverted.dc_level(true), Level::Low);
    }

    #[test]
    fn test_validate_limits() {
        let t = transport(
            SpiBusConfig::default()
                .with_phases(PhaseWidths::HALFWORD)
                .with_max_transfer_bytes(8),
        );
        let odd = Transaction::write(Some(0x2A), Payload::inline(&[1, 2, 3]).unwrap());
        assert_eq!(t.validate(&odd), Err(Error::InvalidArgument));

        let big = [0u8; 9];
        let long = Transaction::color(Some(0x2C), Payload::from(&big));
        assert_eq!(t.validate(&long), Err(Error::InvalidArgument));

        let wide_cmd = Transaction::write(Some(0x1_0000), Payload::Empty);
        assert_eq!(t.validate(&wide_cmd), Err(Error::InvalidArgument));
    }

    #[test]
    fn test_zero_max_transfer_rejected() {
        let trace = Trace::new();
        let (spi, _probe) = SimSpi::new(&trace);
        let config = SpiBusConfig::default().with_max_transfer_bytes(0);
        assert_eq!(
            SpiTransport::new(spi, SimPin::new("dc", &trace), config).err(),
            Some(Error::Config(ConfigError::MaxTransferBytes))
        );
    }
}
