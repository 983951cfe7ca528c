//! GPIO pin abstractions
//!
//! Control lines that accompany a bus transfer: data/command select,
//! chip select, display enable.

/// Logic level of a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Level {
    Low,
    High,
}

impl Level {
    /// The opposite level
    pub const fn inverted(self) -> Self {
        match self {
            Level::Low => Level::High,
            Level::High => Level::Low,
        }
    }

    /// Level for a boolean "high" flag
    pub const fn from_high(high: bool) -> Self {
        if high {
            Level::High
        } else {
            Level::Low
        }
    }
}

/// Digital output pin
///
/// Implementations should handle the actual hardware register manipulation
/// for the specific chip. Setting a level must not block.
pub trait OutputPin {
    /// Set the pin high (logic 1)
    fn set_high(&mut self);

    /// Set the pin low (logic 0)
    fn set_low(&mut self);

    /// Set the pin to a specific level
    fn set_level(&mut self, level: Level) {
        match level {
            Level::High => self.set_high(),
            Level::Low => self.set_low(),
        }
    }

    /// Check if the pin is currently set high
    fn is_set_high(&self) -> bool;

    /// Check if the pin is currently set low
    fn is_set_low(&self) -> bool {
        !self.is_set_high()
    }
}

/// Placeholder for an absent control line
///
/// Buses that have no data/command select (or a panel without a display
/// enable line) use this type; writes are dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPin;

impl OutputPin for NoPin {
    fn set_high(&mut self) {}

    fn set_low(&mut self) {}

    fn is_set_high(&self) -> bool {
        false
    }
}

/// Adapter for pins implementing the `embedded-hal` digital traits
///
/// Errors from the wrapped pin are swallowed: a GPIO write that fails on a
/// push-pull output has no meaningful recovery in the middle of a transfer.
#[derive(Debug)]
pub struct EhPin<P> {
    pin: P,
    high: bool,
}

impl<P: embedded_hal::digital::OutputPin> EhPin<P> {
    /// Wrap a pin, driving it to `initial`
    pub fn new(mut pin: P, initial: Level) -> Self {
        let _ = match initial {
            Level::High => pin.set_high(),
            Level::Low => pin.set_low(),
        };
        Self {
            pin,
            high: initial == Level::High,
        }
    }

    /// Release the wrapped pin
    pub fn into_inner(self) -> P {
        self.pin
    }
}

impl<P: embedded_hal::digital::OutputPin> OutputPin for EhPin<P> {
    fn set_high(&mut self) {
        let _ = self.pin.set_high();
        self.high = true;
    }

    fn set_low(&mut self) {
        let _ = self.pin.set_low();
        self.high = false;
    }

    fn is_set_high(&self) -> bool {
        self.high
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_helpers() {
        assert_eq!(Level::Low.inverted(), Level::High);
        assert_eq!(Level::from_high(true), Level::High);
        assert_eq!(Level::from_high(false), Level::Low);
    }

    #[test]
    fn test_no_pin_is_inert() {
        let mut pin = NoPin;
        pin.set_level(Level::High);
        assert!(pin.is_set_low());
    }
}
