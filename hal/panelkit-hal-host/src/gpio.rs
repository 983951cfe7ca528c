//! Simulated control lines and delay source

use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use panelkit_hal::{Level, OutputPin};

use crate::{Event, Trace};

/// Named output line that records every level change
///
/// Implements both the panelkit and the `embedded-hal` output traits so it
/// can stand in for a D/C line as well as a panel reset line.
#[derive(Debug, Clone)]
pub struct SimPin {
    name: &'static str,
    high: Arc<AtomicBool>,
    trace: Trace,
}

impl SimPin {
    pub fn new(name: &'static str, trace: &Trace) -> Self {
        Self {
            name,
            high: Arc::new(AtomicBool::new(false)),
            trace: trace.clone(),
        }
    }

    /// Current level; clones share it
    pub fn level(&self) -> Level {
        Level::from_high(self.high.load(Ordering::SeqCst))
    }

    fn drive(&self, level: Level) {
        self.high.store(level == Level::High, Ordering::SeqCst);
        self.trace.record(Event::Line {
            pin: self.name,
            level,
        });
    }
}

impl OutputPin for SimPin {
    fn set_high(&mut self) {
        self.drive(Level::High);
    }

    fn set_low(&mut self) {
        self.drive(Level::Low);
    }

    fn is_set_high(&self) -> bool {
        self.high.load(Ordering::SeqCst)
    }
}

impl embedded_hal::digital::ErrorType for SimPin {
    type Error = Infallible;
}

impl embedded_hal::digital::OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.drive(Level::Low);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.drive(Level::High);
        Ok(())
    }
}

/// Delay source that only accumulates the requested time
#[derive(Debug, Clone, Default)]
pub struct SimDelay {
    elapsed_ns: Arc<AtomicU64>,
}

impl SimDelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total delay requested so far, in milliseconds
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ns.load(Ordering::SeqCst) / 1_000_000
    }
}

impl embedded_hal::delay::DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.elapsed_ns.fetch_add(u64::from(ns), Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::delay::DelayNs;

    #[test]
    fn test_pin_records_levels() {
        let trace = Trace::new();
        let mut pin = SimPin::new("dc", &trace);
        let view = pin.clone();
        OutputPin::set_high(&mut pin);
        assert_eq!(view.level(), Level::High);
        assert_eq!(
            trace.events(),
            vec![Event::Line {
                pin: "dc",
                level: Level::High
            }]
        );
    }

    #[test]
    fn test_delay_accumulates() {
        let mut delay = SimDelay::new();
        let view = delay.clone();
        delay.delay_ms(120);
        delay.delay_us(5_000);
        assert_eq!(view.elapsed_ms(), 125);
    }
}
