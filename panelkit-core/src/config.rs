//! Configuration types
//!
//! Bus-independent settings of a panel I/O instance plus the command and
//! parameter phase widths every command-oriented bus shares. Bus-specific
//! configuration lives next to each transport.

use heapless::Vec;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::Error;

/// Invalid configuration, naming the offending parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Command width not 8, 16 or 32 bits
    CommandBits,
    /// Parameter width not 8, 16 or 32 bits
    ParamBits,
    /// Bus clock zero or above what the bus supports
    ClockFrequency,
    /// Two-wire device address outside the 7-bit range
    DeviceAddress,
    /// D/C bit offset outside the control byte
    DcBitOffset,
    /// More than one control phase byte
    ControlPhaseBytes,
    /// Parallel bus width not 8 or 16
    BusWidth,
    /// Inline threshold larger than the direct-write scratch
    InlineThreshold,
    /// Maximum transfer size zero
    MaxTransferBytes,
    /// Bounce buffer size zero or not a multiple of 4
    BounceBuffer,
    /// DMA descriptor chunk size out of range or unaligned
    ChunkSize,
    /// RGB timing has a zero resolution or pixel clock
    Timing,
    /// Frame buffer count outside 1..=3
    FrameBufferCount,
    /// Frame buffer does not match resolution and pixel format
    FrameBufferSize,
    /// Panel resolution zero
    Resolution,
    /// Panel I/O queue too shallow for a multi-transaction operation
    QueueDepth,
}

/// Where completion callbacks run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CallbackContext {
    /// Directly from the interrupt handler, after the queue lock is released
    #[default]
    Interrupt,
    /// Queued and delivered from the foreground by `poll_completions`
    Deferred,
}

/// Bus-independent panel I/O configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PanelIoConfig {
    /// Completion callback placement
    pub callback_context: CallbackContext,
}

impl PanelIoConfig {
    /// Callbacks from interrupt context
    pub const INTERRUPT: Self = Self {
        callback_context: CallbackContext::Interrupt,
    };

    /// Callbacks delivered from the foreground
    pub const DEFERRED: Self = Self {
        callback_context: CallbackContext::Deferred,
    };

    pub fn validate(&self) -> Result<(), ConfigError> {
        Ok(())
    }
}

/// Command bytes on the wire, most significant first
pub type CommandBytes = Vec<u8, 4>;

/// Widths of the command and parameter phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PhaseWidths {
    /// Command width in bits (8, 16 or 32)
    pub cmd_bits: u8,
    /// Parameter width in bits (8, 16 or 32)
    pub param_bits: u8,
}

impl Default for PhaseWidths {
    fn default() -> Self {
        Self::BYTE
    }
}

impl PhaseWidths {
    /// 8-bit commands and parameters (MIPI DCS)
    pub const BYTE: Self = Self {
        cmd_bits: 8,
        param_bits: 8,
    };

    /// 16-bit commands and parameters (some RGB bridge controllers)
    pub const HALFWORD: Self = Self {
        cmd_bits: 16,
        param_bits: 16,
    };

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.cmd_bits, 8 | 16 | 32) {
            return Err(ConfigError::CommandBits);
        }
        if !matches!(self.param_bits, 8 | 16 | 32) {
            return Err(ConfigError::ParamBits);
        }
        Ok(())
    }

    pub fn cmd_bytes(&self) -> usize {
        self.cmd_bits as usize / 8
    }

    pub fn param_bytes(&self) -> usize {
        self.param_bits as usize / 8
    }

    /// Big-endian command bytes; `InvalidArgument` if `cmd` does not fit
    pub fn encode_command(&self, cmd: u32) -> Result<CommandBytes, Error> {
        let width = self.cmd_bytes();
        if width < 4 && cmd >> (width * 8) != 0 {
            return Err(Error::InvalidArgument);
        }
        let be = cmd.to_be_bytes();
        Vec::from_slice(&be[4 - width..]).map_err(|_| Error::InvalidArgument)
    }

    /// Parameter payloads must be whole parameters
    pub fn check_params(&self, len: usize) -> Result<(), Error> {
        if len % self.param_bytes() != 0 {
            return Err(Error::InvalidArgument);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_command_big_endian() {
        let widths = PhaseWidths {
            cmd_bits: 16,
            param_bits: 8,
        };
        assert_eq!(widths.encode_command(0x2A01).unwrap().as_slice(), &[0x2A, 0x01]);
        assert_eq!(widths.encode_command(0x2A).unwrap().as_slice(), &[0x00, 0x2A]);
        assert_eq!(
            widths.encode_command(0x1_0000).unwrap_err(),
            Error::InvalidArgument
        );

        let wide = PhaseWidths {
            cmd_bits: 32,
            param_bits: 32,
        };
        assert_eq!(
            wide.encode_command(0xDEAD_BEEF).unwrap().as_slice(),
            &[0xDE, 0xAD, 0xBE, 0xEF]
        );
    }

    #[test]
    fn test_validate_widths() {
        assert!(PhaseWidths::BYTE.validate().is_ok());
        let bad = PhaseWidths {
            cmd_bits: 12,
            param_bits: 8,
        };
        assert_eq!(bad.validate(), Err(ConfigError::CommandBits));
        let bad = PhaseWidths {
            cmd_bits: 8,
            param_bits: 0,
        };
        assert_eq!(bad.validate(), Err(ConfigError::ParamBits));
    }

    #[test]
    fn test_param_alignment() {
        assert!(PhaseWidths::HALFWORD.check_params(4).is_ok());
        assert_eq!(
            PhaseWidths::HALFWORD.check_params(3),
            Err(Error::InvalidArgument)
        );
        assert!(PhaseWidths::BYTE.check_params(3).is_ok());
    }

    #[test]
    fn test_default_context() {
        assert_eq!(
            PanelIoConfig::default().callback_context,
            CallbackContext::Interrupt
        );
        assert_eq!(
            PanelIoConfig::DEFERRED.callback_context,
            CallbackContext::Deferred
        );
    }
}
