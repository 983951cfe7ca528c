//! DMA descriptor engine

mod descriptor;
mod engine;

pub use descriptor::{ChainHandle, ChainMode, Descriptor, Link, Owner, MAX_DESCRIPTOR_LEN};
pub use engine::{CompletionEvent, DmaEngine, DmaEngineConfig, DmaStats, StopState};
