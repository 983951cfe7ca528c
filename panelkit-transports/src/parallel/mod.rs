//! Parallel transports
//!
//! - [`i80`] - 8080-style LCD peripheral, 8 or 16 data lines
//! - [`i2s`] - I2S peripheral in parallel LCD mode
//!
//! Both write short phases straight into the peripheral and hand long
//! ones to a one-shot DMA chain; reads are not supported by either.

#[cfg(feature = "i2s-parallel")]
pub mod i2s;
#[cfg(feature = "i80")]
pub mod i80;

use panelkit_core::config::{CommandBytes, ConfigError, PhaseWidths};
use panelkit_core::dma::{ChainHandle, ChainMode, DmaEngine};
use panelkit_core::io::{PayloadKind, Transaction};
use panelkit_core::{BusFault, Error};
use panelkit_hal::{
    DmaChannelRef, DmaDirection, DmaHardware, DmaSlice, Level, ParallelBus, ParallelFault,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Largest phase written directly through the data register
pub const MAX_INLINE_THRESHOLD: usize = 64;

/// D/C line level for each bus phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DcLevels {
    pub command: Level,
    pub data: Level,
    /// Level between transactions
    pub idle: Level,
}

impl Default for DcLevels {
    fn default() -> Self {
        Self {
            command: Level::Low,
            data: Level::High,
            idle: Level::High,
        }
    }
}

/// Bus phase a D/C step selects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DcPhase {
    Command,
    Data,
    Idle,
}

impl DcLevels {
    pub fn level(&self, phase: DcPhase) -> Level {
        match phase {
            DcPhase::Command => self.command,
            DcPhase::Data => self.data,
            DcPhase::Idle => self.idle,
        }
    }
}

/// Check the bus width and return the command widths the bus clocks
///
/// A 16-bit bus moves at least one full word per command.
fn bus_phases(phases: PhaseWidths, width: u8) -> Result<PhaseWidths, ConfigError> {
    phases.validate()?;
    match width {
        8 => Ok(phases),
        16 => Ok(PhaseWidths {
            cmd_bits: phases.cmd_bits.max(16),
            param_bits: phases.param_bits,
        }),
        _ => Err(ConfigError::BusWidth),
    }
}

/// Checks common to both parallel buses
fn validate_parallel(
    phases: &PhaseWidths,
    width: u8,
    max_transfer_bytes: usize,
    txn: &Transaction<'_>,
) -> Result<(), Error> {
    if txn.is_read() {
        return Err(Error::Unsupported);
    }
    if let Some(cmd) = txn.command {
        phases.encode_command(cmd)?;
    }
    if txn.kind == PayloadKind::Param {
        phases.check_params(txn.payload.len())?;
    }
    let len = txn.payload.len();
    if len > max_transfer_bytes || (width == 16 && len % 2 != 0) {
        return Err(Error::InvalidArgument);
    }
    Ok(())
}

fn encode_command(phases: &PhaseWidths, txn: &Transaction<'_>) -> Result<CommandBytes, Error> {
    match txn.command {
        Some(cmd) => phases.encode_command(cmd),
        None => Ok(CommandBytes::new()),
    }
}

fn bus_error(fault: ParallelFault) -> Error {
    Error::Bus(BusFault::from(fault))
}

/// One-shot DMA pass feeding a parallel bus
#[derive(Debug, Clone, Copy)]
struct DmaPass {
    channel: DmaChannelRef,
    chain: ChainHandle,
}

impl DmaPass {
    /// Chain `data`, bind it to a free transmit channel and start the bus.
    /// Nothing stays allocated on failure.
    fn launch<B, H, const CH: usize, const D: usize>(
        engine: &DmaEngine<H, CH, D>,
        bus: &mut B,
        data: DmaSlice<'_>,
    ) -> Result<Self, Error>
    where
        B: ParallelBus,
        H: DmaHardware,
    {
        let chain = engine.allocate_chain(&[data], ChainMode::OneShot)?;
        let channel = match engine.bind(chain, DmaDirection::Tx) {
            Ok(channel) => channel,
            Err(e) => {
                let _ = engine.free_chain(chain);
                return Err(e);
            }
        };
        let pass = Self { channel, chain };
        if let Err(e) = engine.start(channel) {
            pass.finish(engine);
            return Err(e);
        }
        if let Err(fault) = bus.start_dma(channel, data.len()) {
            pass.finish(engine);
            return Err(bus_error(fault));
        }
        Ok(pass)
    }

    /// Hand the channel and descriptors back once the bus reports done
    fn finish<H: DmaHardware, const CH: usize, const D: usize>(self, engine: &DmaEngine<H, CH, D>) {
        match engine.release(self.channel) {
            Ok(chain) if chain != self.chain => {
                error!("dma channel {} held a foreign chain", self.channel.index);
            }
            Ok(_) => {}
            // Already released by a channel fault
            Err(Error::InvalidArgument) => {}
            Err(e) => error!("dma channel release failed: {:?}", e),
        }
        if let Err(e) = engine.free_chain(self.chain) {
            error!("dma pass cleanup failed: {:?}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bus_phases() {
        assert_eq!(bus_phases(PhaseWidths::BYTE, 8), Ok(PhaseWidths::BYTE));
        assert_eq!(
            bus_phases(PhaseWidths::BYTE, 16).map(|p| p.cmd_bits),
            Ok(16)
        );
        assert_eq!(
            bus_phases(PhaseWidths::BYTE, 12),
            Err(ConfigError::BusWidth)
        );
    }

    #[test]
    fn test_dc_levels() {
        let levels = DcLevels::default();
        assert_eq!(levels.level(DcPhase::Command), Level::Low);
        assert_eq!(levels.level(DcPhase::Data), Level::High);
        assert_eq!(levels.level(DcPhase::Idle), Level::High);
    }
}
