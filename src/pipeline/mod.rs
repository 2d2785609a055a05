//! Detection pipeline assembly and lifecycle
//!
//! [`DetectionPipeline`] builds the fixed ten-stage graph
//! `souphttpsrc ! jpegdec ! videoconvert ! videoscale ! capsfilter ! queue
//! ! hailonet ! hailofilter ! queue ! sink` through a [`MediaBackend`],
//! forwards every buffer leaving `hailofilter` to a caller-supplied callback
//! and tears the graph down on error, end of stream or explicit cleanup.

pub mod backend;
pub mod gst_backend;
pub mod recording;
pub mod stage;

pub use backend::{BufferProbe, BusEvent, BusObserver, FrameworkState, MediaBackend, ProbeStatus};
pub use gst_backend::{GstBackend, GstRuntime, LoopHandle};
pub use recording::{RecordedStage, RecordingBackend};
pub use stage::{PropertyValue, StageKind, StagePlan, StageSpec};

use crate::config::AppConfig;
use crate::error::{HailoCamError, HailoCamResult};
use crate::models;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{debug, error, info, warn};

/// Lifecycle of a [`DetectionPipeline`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Unbuilt,
    Assembled,
    Playing,
    Stopped,
}

/// A stage created by the assembler
#[derive(Debug, Clone)]
pub struct AssembledStage<S> {
    pub kind: StageKind,
    pub name: &'static str,
    pub handle: S,
}

/// State shared between the pipeline and its bus observers
struct Lifecycle<B: MediaBackend> {
    backend: Arc<B>,
    state: Mutex<PipelineState>,
    runtime_error: Mutex<Option<HailoCamError>>,
}

impl<B: MediaBackend> Lifecycle<B> {
    fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            state: Mutex::new(PipelineState::Unbuilt),
            runtime_error: Mutex::new(None),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, PipelineState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn state(&self) -> PipelineState {
        *self.lock_state()
    }

    fn lock_runtime_error(&self) -> MutexGuard<'_, Option<HailoCamError>> {
        self.runtime_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Move from `from` to `to`; returns false when the pipeline was elsewhere
    fn transition(&self, from: PipelineState, to: PipelineState) -> bool {
        let mut state = self.lock_state();
        if *state != from {
            return false;
        }
        *state = to;
        true
    }

    fn cleanup(&self) {
        {
            let mut state = self.lock_state();
            if *state == PipelineState::Stopped {
                return;
            }

            info!("Cleaning up pipeline...");
            if let Err(e) = self.backend.set_state(FrameworkState::Null) {
                warn!("Failed to stop pipeline: {}", e);
            }
            *state = PipelineState::Stopped;
        }

        if self.backend.loop_is_running() {
            self.backend.quit_loop();
        }
    }

    fn on_error(&self, event: &BusEvent) {
        match event {
            BusEvent::Error {
                source,
                message,
                debug: debug_info,
            } => {
                let details = debug_info.as_deref().unwrap_or("none");
                error!(
                    source = source.as_deref().unwrap_or("pipeline"),
                    "Pipeline error: {}", message
                );
                error!("Debug info: {}", details);

                *self.lock_runtime_error() = Some(HailoCamError::RuntimeObserved {
                    message: message.clone(),
                    debug: debug_info.clone(),
                });

                self.cleanup();
                self.backend.quit_loop();
            }
            BusEvent::Warning {
                source, message, ..
            } => {
                warn!(
                    source = source.as_deref().unwrap_or("pipeline"),
                    "Pipeline warning: {}", message
                );
            }
            _ => {}
        }
    }

    fn on_end_of_stream(&self, event: &BusEvent) {
        match event {
            BusEvent::EndOfStream => {
                info!("End of stream reached");
                self.cleanup();
                self.backend.quit_loop();
            }
            BusEvent::StateChanged { old, new } => {
                debug!("Pipeline state changed from {} to {}", old, new);
            }
            _ => {}
        }
    }
}

/// Runs cleanup when `run` leaves, whichever way it leaves
struct CleanupGuard<'a, B: MediaBackend>(&'a Lifecycle<B>);

impl<B: MediaBackend> Drop for CleanupGuard<'_, B> {
    fn drop(&mut self) {
        self.0.cleanup();
    }
}

/// IP camera detection pipeline
pub struct DetectionPipeline<B: MediaBackend> {
    backend: Arc<B>,
    hef_path: PathBuf,
    plan: StagePlan,
    stages: Vec<AssembledStage<B::Stage>>,
    lifecycle: Arc<Lifecycle<B>>,
}

impl<B: MediaBackend> DetectionPipeline<B> {
    /// Resolve the model, assemble the graph and install the buffer probe and
    /// bus observers.
    ///
    /// `callback` is invoked with every buffer leaving the `hailofilter` stage
    /// together with `user_data`. It runs on a streaming thread owned by the
    /// framework and must not block.
    pub fn new<T, F>(
        backend: Arc<B>,
        config: &AppConfig,
        callback: F,
        user_data: Arc<T>,
    ) -> HailoCamResult<Self>
    where
        T: Send + Sync + 'static,
        F: Fn(&B::Buffer, &T) -> ProbeStatus + Send + Sync + 'static,
    {
        config.validate()?;

        let install_dir = config.install_dir()?;
        let hef_path =
            models::resolve_hef(&config.model.name, config.model.hardware, &install_dir)?;
        info!(
            "Using model {} for {}: {}",
            config.model.name,
            config.model.hardware,
            hef_path.display()
        );

        let lifecycle = Arc::new(Lifecycle::new(backend.clone()));
        let plan = StagePlan::new(config, &hef_path);
        let stages = Self::assemble(&backend, &plan)?;

        let postprocess = stages
            .iter()
            .find(|s| s.kind == StageKind::PostProcess)
            .ok_or_else(|| HailoCamError::StageCreation {
                stage: StageKind::PostProcess.element_name().to_string(),
                factory: StageKind::PostProcess.default_factory().to_string(),
                reason: "stage missing from plan".to_string(),
            })?;
        let probe: BufferProbe<B::Buffer> =
            Arc::new(move |buffer: &B::Buffer| callback(buffer, user_data.as_ref()));
        backend.add_buffer_probe(&postprocess.handle, probe)?;

        // The backend owns its observers, so they only hold the lifecycle weakly
        let on_error = Arc::downgrade(&lifecycle);
        backend.watch_bus(Box::new(move |event: &BusEvent| {
            if let Some(lifecycle) = Weak::upgrade(&on_error) {
                lifecycle.on_error(event);
            }
        }))?;
        let on_eos = Arc::downgrade(&lifecycle);
        backend.watch_bus(Box::new(move |event: &BusEvent| {
            if let Some(lifecycle) = Weak::upgrade(&on_eos) {
                lifecycle.on_end_of_stream(event);
            }
        }))?;

        lifecycle.transition(PipelineState::Unbuilt, PipelineState::Assembled);
        info!("Pipeline assembled with {} stages", stages.len());

        Ok(Self {
            backend,
            hef_path,
            plan,
            stages,
            lifecycle,
        })
    }

    /// Create, configure, add and link every stage of `plan`, in order.
    /// Nothing is rolled back on failure.
    fn assemble(
        backend: &Arc<B>,
        plan: &StagePlan,
    ) -> HailoCamResult<Vec<AssembledStage<B::Stage>>> {
        let mut stages = Vec::with_capacity(plan.stages().len());

        for spec in plan.stages() {
            let handle = backend.create_stage(spec.kind, &spec.factory, spec.name)?;
            for (key, value) in &spec.properties {
                backend.set_property(&handle, key, value)?;
            }
            debug!("Created {} ({})", spec.name, spec.factory);
            stages.push(AssembledStage {
                kind: spec.kind,
                name: spec.name,
                handle,
            });
        }

        for stage in &stages {
            backend.add_stage(&stage.handle)?;
        }

        for pair in stages.windows(2) {
            backend.link(&pair[0].handle, &pair[1].handle)?;
            debug!("Linked {} -> {}", pair[0].name, pair[1].name);
        }

        Ok(stages)
    }

    /// Set the pipeline playing and block until an observer or
    /// [`MediaBackend::quit_loop`] ends the run loop.
    ///
    /// Errors reported on the bus while playing are logged and end the loop;
    /// they are not returned. Cleanup always runs before this returns.
    pub fn run(&self) -> HailoCamResult<()> {
        let state = self.lifecycle.state();
        if state != PipelineState::Assembled {
            return Err(HailoCamError::StateTransition(format!(
                "cannot run a pipeline in the {:?} state",
                state
            )));
        }

        let _guard = CleanupGuard(&self.lifecycle);

        self.backend.set_state(FrameworkState::Playing)?;
        self.lifecycle
            .transition(PipelineState::Assembled, PipelineState::Playing);
        info!("Pipeline playing");

        self.backend.run_loop();
        info!("Main loop finished");
        Ok(())
    }

    /// Stop the pipeline and the run loop. Does nothing once stopped.
    pub fn cleanup(&self) {
        self.lifecycle.cleanup();
    }

    pub fn state(&self) -> PipelineState {
        self.lifecycle.state()
    }

    pub fn hef_path(&self) -> &Path {
        &self.hef_path
    }

    pub fn plan(&self) -> &StagePlan {
        &self.plan
    }

    pub fn stages(&self) -> &[AssembledStage<B::Stage>] {
        &self.stages
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// The last error observed on the bus, if any
    pub fn take_runtime_error(&self) -> Option<HailoCamError> {
        self.lifecycle.lock_runtime_error().take()
    }
}

impl<B: MediaBackend> Drop for DetectionPipeline<B> {
    fn drop(&mut self) {
        if matches!(
            self.lifecycle.state(),
            PipelineState::Assembled | PipelineState::Playing
        ) {
            self.lifecycle.cleanup();
        }
    }
}
