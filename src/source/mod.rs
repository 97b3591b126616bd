//! Pulse sources for the Geiger Sensor Agent.
//!
//! A source owns the asynchronous context of the node: it runs on its own
//! thread and calls [`PulseCounter::on_edge`] for every qualifying edge. It
//! never touches anything else.

pub mod gpiomon;
pub mod simulated;
pub mod types;

use crate::config::InputConfig;
use crate::core::counter::PulseCounter;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

// Re-export commonly used types
pub use gpiomon::GpiomonSource;
pub use simulated::SimulatedSource;
pub use types::{Edge, EdgeEvent, EdgeFilter, SourceKind};

/// Errors that can occur while starting a pulse source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Pulse source is already running")]
    AlreadyRunning,
    #[error("Could not open pulse input: {0}")]
    Io(String),
}

/// Something that delivers edges to the counter from its own thread.
pub trait PulseSource: Send {
    fn start(&mut self, counter: Arc<PulseCounter>) -> Result<(), SourceError>;
    fn stop(&mut self);
    fn is_running(&self) -> bool;
    /// Shared flag that stays set while the source can still deliver edges.
    /// Cleared by `stop` and by the source itself when its input ends.
    fn alive_flag(&self) -> Arc<AtomicBool>;
    /// Human-readable description for startup output.
    fn describe(&self) -> String;
}

/// Build the source selected by the input configuration.
pub fn build_source(input: &InputConfig) -> Box<dyn PulseSource> {
    match input.source {
        SourceKind::Gpiomon => Box::new(GpiomonSource::new(
            EdgeFilter {
                pin: input.pin,
                edge: input.edge,
            },
            input.path.clone(),
        )),
        SourceKind::Simulated => Box::new(SimulatedSource::new(input.simulated_cpm)),
    }
}
