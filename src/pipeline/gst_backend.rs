//! GStreamer implementation of [`MediaBackend`]

use super::backend::{
    BufferProbe, BusEvent, BusObserver, FrameworkState, MediaBackend, ProbeStatus,
};
use super::stage::{PropertyValue, StageKind};
use crate::error::{HailoCamError, HailoCamResult};
use gstreamer as gst;
use gstreamer::glib;
use gstreamer::prelude::*;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// Proof that the GStreamer runtime has been initialised in this process
#[derive(Debug, Clone, Copy)]
pub struct GstRuntime {
    _private: (),
}

impl GstRuntime {
    /// Initialise GStreamer. Safe to call more than once.
    pub fn init() -> HailoCamResult<Self> {
        gst::init().map_err(|e| HailoCamError::RuntimeInit(e.to_string()))?;
        debug!("GStreamer {} initialised", gst::version_string());
        Ok(Self { _private: () })
    }
}

/// Cloneable handle that stops the backend's main loop, e.g. from a signal handler.
/// A quit requested before the loop starts makes the next run return at once.
#[derive(Clone)]
pub struct LoopHandle {
    main_loop: glib::MainLoop,
    quit_requested: Arc<AtomicBool>,
}

impl LoopHandle {
    pub fn quit(&self) {
        self.quit_requested.store(true, Ordering::SeqCst);
        self.main_loop.quit();
    }
}

/// Backend over a `gst::Pipeline` and a `glib::MainLoop`
pub struct GstBackend {
    pipeline: gst::Pipeline,
    main_loop: glib::MainLoop,
    quit_requested: Arc<AtomicBool>,
    observers: Arc<Mutex<Vec<BusObserver>>>,
    bus_watch: Mutex<Option<gst::bus::BusWatchGuard>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl GstBackend {
    pub fn new(_runtime: &GstRuntime) -> Self {
        let pipeline = gst::Pipeline::builder()
            .name("ipcam-detection-pipeline")
            .build();

        Self {
            pipeline,
            main_loop: glib::MainLoop::new(None, false),
            quit_requested: Arc::new(AtomicBool::new(false)),
            observers: Arc::new(Mutex::new(Vec::new())),
            bus_watch: Mutex::new(None),
        }
    }

    pub fn quit_handle(&self) -> LoopHandle {
        LoopHandle {
            main_loop: self.main_loop.clone(),
            quit_requested: self.quit_requested.clone(),
        }
    }

    /// Untyped conversion; the caller transforms the result to the property's type
    fn to_value(value: &PropertyValue) -> Result<glib::Value, String> {
        Ok(match value {
            PropertyValue::Str(s) => s.to_value(),
            PropertyValue::Int(v) => v.to_value(),
            PropertyValue::UInt(v) => v.to_value(),
            PropertyValue::UInt64(v) => v.to_value(),
            PropertyValue::Bool(v) => v.to_value(),
            PropertyValue::Caps(s) => gst::Caps::from_str(s)
                .map_err(|e| format!("invalid caps \"{}\": {}", s, e))?
                .to_value(),
        })
    }

    fn translate(pipeline: &gst::Pipeline, msg: &gst::Message) -> Option<BusEvent> {
        let source = msg.src().map(|s| s.path_string().to_string());
        match msg.view() {
            gst::MessageView::Error(err) => Some(BusEvent::Error {
                source,
                message: err.error().to_string(),
                debug: err.debug().map(|d| d.to_string()),
            }),
            gst::MessageView::Warning(warning) => Some(BusEvent::Warning {
                source,
                message: warning.error().to_string(),
                debug: warning.debug().map(|d| d.to_string()),
            }),
            gst::MessageView::Eos(_) => Some(BusEvent::EndOfStream),
            gst::MessageView::StateChanged(state_changed) => {
                if state_changed.src() != Some(pipeline.upcast_ref::<gst::Object>()) {
                    return None;
                }
                Some(BusEvent::StateChanged {
                    old: format!("{:?}", state_changed.old()),
                    new: format!("{:?}", state_changed.current()),
                })
            }
            _ => None,
        }
    }
}

impl From<ProbeStatus> for gst::PadProbeReturn {
    fn from(status: ProbeStatus) -> Self {
        match status {
            ProbeStatus::Ok => gst::PadProbeReturn::Ok,
            ProbeStatus::Drop => gst::PadProbeReturn::Drop,
            ProbeStatus::Pass => gst::PadProbeReturn::Pass,
            ProbeStatus::Remove => gst::PadProbeReturn::Remove,
        }
    }
}

impl MediaBackend for GstBackend {
    type Stage = gst::Element;
    type Buffer = gst::BufferRef;

    fn create_stage(
        &self,
        kind: StageKind,
        factory: &str,
        name: &str,
    ) -> HailoCamResult<gst::Element> {
        gst::ElementFactory::make(factory)
            .name(name)
            .build()
            .map_err(|e| {
                let mut reason = e.to_string();
                if kind.is_accelerator() {
                    reason.push_str(". Make sure Hailo GStreamer plugins are installed.");
                }
                HailoCamError::StageCreation {
                    stage: name.to_string(),
                    factory: factory.to_string(),
                    reason,
                }
            })
    }

    fn set_property(
        &self,
        stage: &gst::Element,
        key: &str,
        value: &PropertyValue,
    ) -> HailoCamResult<()> {
        let property_error = |reason: String| HailoCamError::Property {
            stage: stage.name().to_string(),
            key: key.to_string(),
            reason,
        };

        let pspec = stage
            .find_property(key)
            .ok_or_else(|| property_error("no such property".to_string()))?;

        let value = Self::to_value(value)
            .map_err(property_error)?
            .transform_with_type(pspec.value_type())
            .map_err(|e| property_error(e.to_string()))?;

        stage.set_property_from_value(key, &value);
        Ok(())
    }

    fn add_stage(&self, stage: &gst::Element) -> HailoCamResult<()> {
        self.pipeline
            .add(stage)
            .map_err(|e| HailoCamError::StageCreation {
                stage: stage.name().to_string(),
                factory: stage
                    .factory()
                    .map(|f| f.name().to_string())
                    .unwrap_or_default(),
                reason: e.to_string(),
            })
    }

    fn link(&self, upstream: &gst::Element, downstream: &gst::Element) -> HailoCamResult<()> {
        upstream
            .link(downstream)
            .map_err(|e| HailoCamError::Link {
                upstream: upstream.name().to_string(),
                downstream: downstream.name().to_string(),
                reason: e.to_string(),
            })
    }

    fn add_buffer_probe(
        &self,
        stage: &gst::Element,
        probe: BufferProbe<gst::BufferRef>,
    ) -> HailoCamResult<()> {
        let pad = stage
            .static_pad("src")
            .ok_or_else(|| HailoCamError::Link {
                upstream: stage.name().to_string(),
                downstream: "probe".to_string(),
                reason: "element has no src pad".to_string(),
            })?;

        pad.add_probe(gst::PadProbeType::BUFFER, move |_pad, probe_info| {
            if let Some(gst::PadProbeData::Buffer(ref buffer)) = probe_info.data {
                let buffer: &gst::BufferRef = buffer;
                return probe(buffer).into();
            }
            gst::PadProbeReturn::Ok
        });

        Ok(())
    }

    fn set_state(&self, state: FrameworkState) -> HailoCamResult<()> {
        let target = match state {
            FrameworkState::Null => gst::State::Null,
            FrameworkState::Playing => gst::State::Playing,
        };

        self.pipeline
            .set_state(target)
            .map(|_| ())
            .map_err(|e| {
                HailoCamError::StateTransition(format!(
                    "Unable to set the pipeline to the {:?} state: {}",
                    target, e
                ))
            })
    }

    fn watch_bus(&self, observer: BusObserver) -> HailoCamResult<()> {
        lock(&self.observers).push(observer);

        let mut bus_watch = lock(&self.bus_watch);
        if bus_watch.is_some() {
            return Ok(());
        }

        let bus = self
            .pipeline
            .bus()
            .ok_or_else(|| HailoCamError::StateTransition("pipeline has no bus".to_string()))?;

        let observers = self.observers.clone();
        let pipeline = self.pipeline.clone();
        let guard = bus
            .add_watch(move |_bus, msg| {
                if let Some(event) = Self::translate(&pipeline, msg) {
                    for observer in lock(&observers).iter() {
                        observer(&event);
                    }
                }
                glib::ControlFlow::Continue
            })
            .map_err(|e| HailoCamError::StateTransition(format!("bus watch failed: {}", e)))?;

        *bus_watch = Some(guard);
        Ok(())
    }

    fn run_loop(&self) {
        if self.quit_requested.load(Ordering::SeqCst) {
            info!("Quit requested before the main loop started");
            return;
        }

        // `run` resets the loop's running flag, so a quit landing between the
        // check above and `run` is only seen once the loop iterates
        let quit_requested = self.quit_requested.clone();
        let main_loop = self.main_loop.clone();
        glib::idle_add_once(move || {
            if quit_requested.load(Ordering::SeqCst) {
                main_loop.quit();
            }
        });

        info!("Entering main loop");
        self.main_loop.run();
    }

    fn quit_loop(&self) {
        self.quit_requested.store(true, Ordering::SeqCst);
        self.main_loop.quit();
    }

    fn loop_is_running(&self) -> bool {
        self.main_loop.is_running()
    }
}
