//! Seam between the pipeline assembler and the media framework

use super::stage::{PropertyValue, StageKind};
use crate::error::HailoCamResult;
use std::sync::Arc;

/// Coarse framework states the assembler drives the pipeline through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameworkState {
    Null,
    Playing,
}

/// What a buffer probe tells the framework to do with the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProbeStatus {
    /// Leave the probe installed and pass the buffer on
    #[default]
    Ok,
    /// Drop the buffer
    Drop,
    /// Pass the buffer without blocking
    Pass,
    /// Pass the buffer and uninstall the probe
    Remove,
}

/// Asynchronous pipeline-wide events delivered on the control bus
#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
    Error {
        source: Option<String>,
        message: String,
        debug: Option<String>,
    },
    Warning {
        source: Option<String>,
        message: String,
        debug: Option<String>,
    },
    EndOfStream,
    StateChanged {
        old: String,
        new: String,
    },
}

/// Per-buffer callback installed on a stage's output boundary
pub type BufferProbe<Buf> = Arc<dyn Fn(&Buf) -> ProbeStatus + Send + Sync>;

/// Bus subscriber, invoked on the event-loop thread
pub type BusObserver = Box<dyn Fn(&BusEvent) + Send + 'static>;

/// Construct-configure-link-run-observe interface over a media framework.
///
/// The assembler never touches the framework directly; it only creates named
/// stages, sets their properties, links them, installs probes and observers
/// and drives the event loop through this trait.
pub trait MediaBackend: Send + Sync + 'static {
    /// Handle to a stage owned by the backend's pipeline
    type Stage: Clone + Send + Sync + 'static;
    /// Media buffer handed to probes
    type Buffer: ?Sized;

    fn create_stage(&self, kind: StageKind, factory: &str, name: &str)
        -> HailoCamResult<Self::Stage>;

    fn set_property(
        &self,
        stage: &Self::Stage,
        key: &str,
        value: &PropertyValue,
    ) -> HailoCamResult<()>;

    /// Add a created stage to the pipeline container
    fn add_stage(&self, stage: &Self::Stage) -> HailoCamResult<()>;

    fn link(&self, upstream: &Self::Stage, downstream: &Self::Stage) -> HailoCamResult<()>;

    /// Install `probe` on the data-output boundary of `stage`
    fn add_buffer_probe(
        &self,
        stage: &Self::Stage,
        probe: BufferProbe<Self::Buffer>,
    ) -> HailoCamResult<()>;

    fn set_state(&self, state: FrameworkState) -> HailoCamResult<()>;

    fn watch_bus(&self, observer: BusObserver) -> HailoCamResult<()>;

    /// Block on the event loop until `quit_loop` is called
    fn run_loop(&self);

    fn quit_loop(&self);

    fn loop_is_running(&self) -> bool;
}
