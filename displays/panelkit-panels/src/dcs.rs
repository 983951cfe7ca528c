//! Generic MIPI-DCS command panel
//!
//! Covers the command set shared by the common TFT controllers (ST7789,
//! ILI9341, GC9A01 and friends): sleep out, pixel format, memory access
//! control for orientation, column/row windows and memory write. Chip
//! specifics go into a vendor init sequence run after the standard
//! wake-up.
//!
//! The driver only submits transactions. When the I/O queue is full it
//! calls the wait hook (or sleeps a millisecond) and retries a bounded
//! number of times; completions are the caller's business.

use core::convert::Infallible;
use core::marker::PhantomData;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use panelkit_core::config::ConfigError;
use panelkit_core::io::{Payload, PanelIoOps, Transaction};
use panelkit_core::panel::{PanelDriver, PanelGeometry, PixelFormat, Window};
use panelkit_core::{BusFault, Error};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// MIPI-DCS commands
#[allow(dead_code)]
mod cmd {
    pub const SWRESET: u8 = 0x01;
    pub const SLPIN: u8 = 0x10;
    pub const SLPOUT: u8 = 0x11;
    pub const INVOFF: u8 = 0x20;
    pub const INVON: u8 = 0x21;
    pub const DISPOFF: u8 = 0x28;
    pub const DISPON: u8 = 0x29;
    pub const CASET: u8 = 0x2A;
    pub const RASET: u8 = 0x2B;
    pub const RAMWR: u8 = 0x2C;
    pub const MADCTL: u8 = 0x36;
    pub const COLMOD: u8 = 0x3A;
}

/// MADCTL bits
mod madctl {
    pub const MY: u8 = 0x80;
    pub const MX: u8 = 0x40;
    pub const MV: u8 = 0x20;
    pub const BGR: u8 = 0x08;
}

const RESET_PULSE_MS: u32 = 10;
const RESET_RECOVERY_MS: u32 = 10;
const SWRESET_RECOVERY_MS: u32 = 20;
const SLEEP_EXIT_MS: u32 = 100;

/// One step of a vendor init sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InitCommand {
    pub cmd: u8,
    /// Up to 64 parameter bytes
    pub data: &'static [u8],
    /// Wait after the command
    pub delay_ms: u16,
}

impl InitCommand {
    pub const fn new(cmd: u8, data: &'static [u8]) -> Self {
        Self {
            cmd,
            data,
            delay_ms: 0,
        }
    }

    pub const fn with_delay(mut self, delay_ms: u16) -> Self {
        self.delay_ms = delay_ms;
        self
    }
}

/// DCS panel configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DcsConfig {
    pub geometry: PanelGeometry,
    /// Panel wired with blue and red swapped
    pub bgr: bool,
    pub reset_active_high: bool,
    /// Extra submissions tried when the I/O queue is full
    pub busy_retries: u8,
}

impl DcsConfig {
    pub const fn new(geometry: PanelGeometry) -> Self {
        Self {
            geometry,
            bgr: false,
            reset_active_high: false,
            busy_retries: 8,
        }
    }

    pub fn with_bgr(mut self, bgr: bool) -> Self {
        self.bgr = bgr;
        self
    }

    pub fn with_reset_active_high(mut self, active_high: bool) -> Self {
        self.reset_active_high = active_high;
        self
    }

    pub fn with_busy_retries(mut self, retries: u8) -> Self {
        self.busy_retries = retries;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.geometry.validate()
    }
}

/// Stand-in for a panel without a reset line
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReset;

impl embedded_hal::digital::ErrorType for NoReset {
    type Error = Infallible;
}

impl OutputPin for NoReset {
    fn set_low(&mut self) -> Result<(), Infallible> {
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        Ok(())
    }
}

/// DCS panel driving panel I/O `IO` (whose transactions borrow for `'a`),
/// with optional reset line `RST` and delay source `DL`
pub struct DcsPanel<'io, 'a, IO, RST, DL> {
    io: &'io IO,
    reset: Option<RST>,
    delay: DL,
    config: DcsConfig,
    init_sequence: &'static [InitCommand],
    wait_hook: Option<&'io dyn Fn()>,
    /// Last value written to MADCTL
    madctl: u8,
    x_gap: u16,
    y_gap: u16,
    _payload: PhantomData<Payload<'a>>,
}

impl<'io, 'a, IO, DL> DcsPanel<'io, 'a, IO, NoReset, DL>
where
    IO: PanelIoOps<'a>,
    DL: DelayNs,
{
    pub fn new(io: &'io IO, delay: DL, config: DcsConfig) -> Self {
        let madctl = if config.bgr { madctl::BGR } else { 0 };
        Self {
            io,
            reset: None,
            delay,
            config,
            init_sequence: &[],
            wait_hook: None,
            madctl,
            x_gap: 0,
            y_gap: 0,
            _payload: PhantomData,
        }
    }

    /// Use a hardware reset line instead of the software reset command
    pub fn with_reset_pin<P: OutputPin>(self, pin: P) -> DcsPanel<'io, 'a, IO, P, DL> {
        DcsPanel {
            io: self.io,
            reset: Some(pin),
            delay: self.delay,
            config: self.config,
            init_sequence: self.init_sequence,
            wait_hook: self.wait_hook,
            madctl: self.madctl,
            x_gap: self.x_gap,
            y_gap: self.y_gap,
            _payload: PhantomData,
        }
    }
}

impl<'io, 'a, IO, RST, DL> DcsPanel<'io, 'a, IO, RST, DL>
where
    IO: PanelIoOps<'a>,
    RST: OutputPin,
    DL: DelayNs,
{
    /// Vendor commands sent at the end of `init`
    pub fn with_init_sequence(mut self, sequence: &'static [InitCommand]) -> Self {
        self.init_sequence = sequence;
        self
    }

    /// Called between retries while the I/O queue is full, typically to
    /// drain completions
    pub fn with_wait_hook(mut self, hook: &'io dyn Fn()) -> Self {
        self.wait_hook = Some(hook);
        self
    }

    pub fn config(&self) -> &DcsConfig {
        &self.config
    }

    pub fn release(self) -> (Option<RST>, DL) {
        (self.reset, self.delay)
    }

    fn wait(&mut self) {
        match self.wait_hook {
            Some(hook) => hook(),
            None => self.delay.delay_ms(1),
        }
    }

    fn send(&mut self, txn: Transaction<'a>) -> Result<(), Error> {
        let mut retries = self.config.busy_retries;
        loop {
            match self.io.submit(txn.clone()) {
                Ok(_) => return Ok(()),
                Err(Error::Busy) if retries > 0 => {
                    retries -= 1;
                    self.wait();
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Wait until `slots` transactions fit in the queue at once, so a
    /// multi-command operation is never left half submitted
    fn reserve(&mut self, slots: usize) -> Result<(), Error> {
        if self.io.capacity() < slots {
            return Err(Error::Config(ConfigError::QueueDepth));
        }
        let mut retries = self.config.busy_retries;
        while self.io.available() < slots {
            if retries == 0 {
                return Err(Error::Busy);
            }
            retries -= 1;
            self.wait();
        }
        Ok(())
    }

    fn command(&mut self, cmd: u8, params: &[u8]) -> Result<(), Error> {
        let payload = Payload::inline(params)?;
        self.send(Transaction::write(Some(u32::from(cmd)), payload))
    }

    fn write_madctl(&mut self) -> Result<(), Error> {
        let value = self.madctl;
        self.command(cmd::MADCTL, &[value])
    }

    fn drive_reset(&mut self, active: bool) -> Result<(), Error> {
        let Some(pin) = self.reset.as_mut() else {
            return Ok(());
        };
        let high = active == self.config.reset_active_high;
        let result = if high { pin.set_high() } else { pin.set_low() };
        result.map_err(|_| Error::Bus(BusFault::Hardware))
    }
}

fn colmod(format: PixelFormat) -> u8 {
    match format {
        PixelFormat::Rgb565 => 0x55,
        PixelFormat::Rgb666 => 0x66,
        PixelFormat::Rgb888 => 0x77,
    }
}

/// Start and inclusive end address, big-endian
fn address_window(start: u16, end: u16, gap: u16) -> Result<[u8; 4], Error> {
    let first = start.checked_add(gap).ok_or(Error::InvalidArgument)?;
    let last = end
        .checked_add(gap)
        .and_then(|e| e.checked_sub(1))
        .ok_or(Error::InvalidArgument)?;
    let [f0, f1] = first.to_be_bytes();
    let [l0, l1] = last.to_be_bytes();
    Ok([f0, f1, l0, l1])
}

impl<'io, 'a, IO, RST, DL> PanelDriver<'a> for DcsPanel<'io, 'a, IO, RST, DL>
where
    IO: PanelIoOps<'a>,
    RST: OutputPin,
    DL: DelayNs,
{
    fn geometry(&self) -> PanelGeometry {
        self.config.geometry
    }

    fn reset(&mut self) -> Result<(), Error> {
        if self.reset.is_some() {
            self.drive_reset(true)?;
            self.delay.delay_ms(RESET_PULSE_MS);
            self.drive_reset(false)?;
            self.delay.delay_ms(RESET_RECOVERY_MS);
            debug!("dcs panel hardware reset");
        } else {
            self.command(cmd::SWRESET, &[])?;
            self.delay.delay_ms(SWRESET_RECOVERY_MS);
            debug!("dcs panel software reset");
        }
        Ok(())
    }

    fn init(&mut self) -> Result<(), Error> {
        self.command(cmd::SLPOUT, &[])?;
        self.delay.delay_ms(SLEEP_EXIT_MS);
        self.write_madctl()?;
        self.command(cmd::COLMOD, &[colmod(self.config.geometry.format)])?;

        for step in self.init_sequence {
            // Orientation set by the vendor sequence sticks
            if step.cmd == cmd::MADCTL {
                if let Some(&value) = step.data.first() {
                    self.madctl = value;
                }
            }
            self.command(step.cmd, step.data)?;
            if step.delay_ms > 0 {
                self.delay.delay_ms(u32::from(step.delay_ms));
            }
        }
        debug!(
            "dcs panel ready, {} vendor commands",
            self.init_sequence.len()
        );
        Ok(())
    }

    fn draw_bitmap(&mut self, window: Window, pixels: Payload<'a>) -> Result<(), Error> {
        let columns = address_window(window.x_start, window.x_end, self.x_gap)?;
        let rows = address_window(window.y_start, window.y_end, self.y_gap)?;
        // Column window, row window, pixel data
        self.reserve(3)?;
        self.command(cmd::CASET, &columns)?;
        self.command(cmd::RASET, &rows)?;
        self.send(Transaction::color(Some(u32::from(cmd::RAMWR)), pixels))
    }

    fn invert_color(&mut self, invert: bool) -> Result<(), Error> {
        self.command(if invert { cmd::INVON } else { cmd::INVOFF }, &[])
    }

    fn mirror(&mut self, mirror_x: bool, mirror_y: bool) -> Result<(), Error> {
        self.madctl &= !(madctl::MX | madctl::MY);
        if mirror_x {
            self.madctl |= madctl::MX;
        }
        if mirror_y {
            self.madctl |= madctl::MY;
        }
        self.write_madctl()
    }

    fn swap_xy(&mut self, swap: bool) -> Result<(), Error> {
        if swap {
            self.madctl |= madctl::MV;
        } else {
            self.madctl &= !madctl::MV;
        }
        self.write_madctl()
    }

    fn axes_swapped(&self) -> Option<bool> {
        Some(self.madctl & madctl::MV != 0)
    }

    fn set_gap(&mut self, x_gap: u16, y_gap: u16) -> Result<(), Error> {
        self.x_gap = x_gap;
        self.y_gap = y_gap;
        Ok(())
    }

    fn disp_on_off(&mut self, on: bool) -> Result<(), Error> {
        self.command(if on { cmd::DISPON } else { cmd::DISPOFF }, &[])
    }

    fn disp_sleep(&mut self, sleep: bool) -> Result<(), Error> {
        self.command(if sleep { cmd::SLPIN } else { cmd::SLPOUT }, &[])?;
        self.delay.delay_ms(SLEEP_EXIT_MS);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::{Cell, RefCell};
    use panelkit_core::io::TransactionId;
    use panelkit_hal::Level;
    use panelkit_hal_host::{Event, SimDelay, SimPin, Trace};
    use std::vec;
    use std::vec::Vec;

    /// Panel I/O that records commands and can refuse with `Busy`
    #[derive(Default)]
    struct Recorder {
        sent: RefCell<Vec<(u32, Vec<u8>)>>,
        busy: Cell<usize>,
        /// Polls of `available` that report a full queue
        full: Cell<usize>,
    }

    impl<'a> PanelIoOps<'a> for Recorder {
        fn submit(&self, txn: Transaction<'a>) -> Result<TransactionId, Error> {
            if self.busy.get() > 0 {
                self.busy.set(self.busy.get() - 1);
                return Err(Error::Busy);
            }
            let mut sent = self.sent.borrow_mut();
            sent.push((txn.command.unwrap_or(0), txn.payload.as_bytes().to_vec()));
            Ok(TransactionId(sent.len() as u32))
        }

        fn is_idle(&self) -> bool {
            true
        }

        fn available(&self) -> usize {
            if self.full.get() > 0 {
                self.full.set(self.full.get() - 1);
                return 0;
            }
            self.capacity()
        }

        fn capacity(&self) -> usize {
            8
        }
    }

    impl Recorder {
        fn commands(&self) -> Vec<u32> {
            self.sent.borrow().iter().map(|(c, _)| *c).collect()
        }

        fn last(&self) -> (u32, Vec<u8>) {
            self.sent.borrow().last().cloned().unwrap()
        }
    }

    fn config() -> DcsConfig {
        DcsConfig::new(PanelGeometry::new(240, 135, PixelFormat::Rgb565))
    }

    #[test]
    fn test_hardware_reset_pulses_line() {
        let io = Recorder::default();
        let trace = Trace::new();
        let delay = SimDelay::new();
        let mut panel =
            DcsPanel::new(&io, delay.clone(), config()).with_reset_pin(SimPin::new("rst", &trace));

        panel.reset().unwrap();
        assert_eq!(
            trace.events(),
            vec![
                Event::Line {
                    pin: "rst",
                    level: Level::Low
                },
                Event::Line {
                    pin: "rst",
                    level: Level::High
                },
            ]
        );
        assert_eq!(delay.elapsed_ms(), 20);
        assert!(io.commands().is_empty());
    }

    #[test]
    fn test_software_reset_without_line() {
        let io = Recorder::default();
        let delay = SimDelay::new();
        let mut panel = DcsPanel::new(&io, delay.clone(), config());

        panel.reset().unwrap();
        assert_eq!(io.commands(), vec![0x01]);
        assert_eq!(delay.elapsed_ms(), 20);
    }

    #[test]
    fn test_init_sequence() {
        static VENDOR: [InitCommand; 2] = [
            InitCommand::new(0xB2, &[0x0C, 0x0C, 0x00, 0x33, 0x33]),
            InitCommand::new(0x36, &[0x70]).with_delay(5),
        ];
        let io = Recorder::default();
        let delay = SimDelay::new();
        let mut panel = DcsPanel::new(&io, delay.clone(), config().with_bgr(true))
            .with_init_sequence(&VENDOR);

        panel.init().unwrap();
        assert_eq!(
            *io.sent.borrow(),
            vec![
                (0x11, vec![]),
                (0x36, vec![0x08]),
                (0x3A, vec![0x55]),
                (0xB2, vec![0x0C, 0x0C, 0x00, 0x33, 0x33]),
                (0x36, vec![0x70]),
            ]
        );
        assert_eq!(delay.elapsed_ms(), 105);

        // Vendor orientation is the base for later changes
        assert_eq!(panel.axes_swapped(), Some(true));
        panel.mirror(false, false).unwrap();
        assert_eq!(io.last(), (0x36, vec![0x30]));
    }

    #[test]
    fn test_draw_sets_window_with_gap() {
        let io = Recorder::default();
        let mut panel = DcsPanel::new(&io, SimDelay::new(), config());
        panel.set_gap(40, 53).unwrap();

        let pixels = [0u8; 8];
        panel
            .draw_bitmap(Window::new(0, 0, 2, 2), Payload::from(&pixels))
            .unwrap();
        assert_eq!(
            *io.sent.borrow(),
            vec![
                (0x2A, vec![0x00, 40, 0x00, 41]),
                (0x2B, vec![0x00, 53, 0x00, 54]),
                (0x2C, vec![0u8; 8]),
            ]
        );
    }

    #[test]
    fn test_orientation_bits() {
        let io = Recorder::default();
        let mut panel = DcsPanel::new(&io, SimDelay::new(), config());

        panel.mirror(true, false).unwrap();
        assert_eq!(io.last(), (0x36, vec![0x40]));
        panel.swap_xy(true).unwrap();
        assert_eq!(io.last(), (0x36, vec![0x60]));
        panel.mirror(false, true).unwrap();
        assert_eq!(io.last(), (0x36, vec![0xA0]));
        panel.swap_xy(false).unwrap();
        assert_eq!(io.last(), (0x36, vec![0x80]));
        assert_eq!(panel.axes_swapped(), Some(false));
    }

    #[test]
    fn test_busy_queue_is_retried_through_hook() {
        let io = Recorder::default();
        let waits = Cell::new(0);
        let hook = || waits.set(waits.get() + 1);
        let mut panel =
            DcsPanel::new(&io, SimDelay::new(), config().with_busy_retries(2)).with_wait_hook(&hook);

        io.busy.set(2);
        panel.disp_on_off(true).unwrap();
        assert_eq!(waits.get(), 2);
        assert_eq!(io.commands(), vec![0x29]);

        io.busy.set(3);
        assert_eq!(panel.invert_color(true), Err(Error::Busy));
        assert_eq!(waits.get(), 4);
    }

    #[test]
    fn test_busy_without_hook_sleeps() {
        let io = Recorder::default();
        let delay = SimDelay::new();
        let mut panel = DcsPanel::new(&io, delay.clone(), config());

        io.busy.set(3);
        panel.invert_color(false).unwrap();
        assert_eq!(delay.elapsed_ms(), 3);
        assert_eq!(io.commands(), vec![0x20]);
    }

    #[test]
    fn test_draw_waits_for_room_for_whole_window() {
        let io = Recorder::default();
        let waits = Cell::new(0);
        let hook = || waits.set(waits.get() + 1);
        let mut panel =
            DcsPanel::new(&io, SimDelay::new(), config().with_busy_retries(2)).with_wait_hook(&hook);
        let pixels = [0u8; 8];

        io.full.set(2);
        panel
            .draw_bitmap(Window::new(0, 0, 2, 2), Payload::from(&pixels))
            .unwrap();
        assert_eq!(waits.get(), 2);
        assert_eq!(io.commands(), vec![0x2A, 0x2B, 0x2C]);

        // Queue stays full: no part of the window is submitted
        io.sent.borrow_mut().clear();
        io.full.set(3);
        assert_eq!(
            panel.draw_bitmap(Window::new(0, 0, 2, 2), Payload::from(&pixels)),
            Err(Error::Busy)
        );
        assert!(io.commands().is_empty());
    }

    #[test]
    fn test_window_overflowing_address_space() {
        let io = Recorder::default();
        let mut panel = DcsPanel::new(&io, SimDelay::new(), config());
        panel.set_gap(u16::MAX, 0).unwrap();

        let pixels = [0u8; 2];
        assert_eq!(
            panel.draw_bitmap(Window::new(1, 0, 2, 1), Payload::from(&pixels)),
            Err(Error::InvalidArgument)
        );
        assert!(io.commands().is_empty());
    }
}
