//! Streaming bus events and the frame sink contract

use panelkit_hal::DmaBuffer;

use crate::panel::PanelGeometry;
use crate::Error;

/// Event raised by a streaming bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StreamEvent {
    /// A full frame was scanned out
    FrameDone,
    /// A presented frame became the active one
    Swapped,
    /// The ring wrapped before the frame being drawn was presented; the
    /// previous frame is shown again
    Underrun,
    /// Streaming stopped and the channel was released
    Stopped,
}

/// Receiver of stream events, called from interrupt context
pub trait StreamEventHandler: Sync {
    fn on_event(&self, event: StreamEvent);
}

impl<F> StreamEventHandler for F
where
    F: Fn(StreamEvent) + Sync,
{
    fn on_event(&self, event: StreamEvent) {
        self(event)
    }
}

/// A bus that scans out frame buffers continuously
pub trait FrameSink<'d> {
    fn geometry(&self) -> PanelGeometry;

    /// Start scanning out the active frame
    fn start(&self) -> Result<(), Error>;

    /// Stop after the current pass
    fn stop(&self) -> Result<(), Error>;

    /// Writable frame holding a copy of the newest frame
    fn acquire_synced(&self) -> Result<DmaBuffer<'d>, Error>;

    /// Queue a frame for the next safe point. A frame that is refused is
    /// handed back with the error.
    fn present(&self, frame: DmaBuffer<'d>) -> Result<(), (DmaBuffer<'d>, Error)>;

    /// Drive the display-enable line, if the bus has one
    fn set_enabled(&self, on: bool) -> Result<(), Error>;
}
