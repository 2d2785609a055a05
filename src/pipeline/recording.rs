//! In-memory [`MediaBackend`] that records every call
//!
//! Used to exercise the assembler without GStreamer plugins or a camera:
//! failures can be injected per stage kind, and bus events and buffers can be
//! scripted for replay by [`MediaBackend::run_loop`].

use super::backend::{BufferProbe, BusEvent, BusObserver, FrameworkState, MediaBackend, ProbeStatus};
use super::stage::{PropertyValue, StageKind};
use crate::error::{HailoCamError, HailoCamResult};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Stage handle handed out by the recording backend
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedStage {
    pub kind: StageKind,
    pub factory: String,
    pub name: String,
}

#[derive(Debug, Clone)]
enum Scripted {
    Event(BusEvent),
    Buffer(Vec<u8>),
}

#[derive(Default)]
struct Recorder {
    created: Vec<RecordedStage>,
    properties: Vec<(String, String, PropertyValue)>,
    added: Vec<String>,
    links: Vec<(String, String)>,
    states: Vec<FrameworkState>,
    script: VecDeque<Scripted>,
    fail_create: Option<StageKind>,
    fail_link_from: Option<StageKind>,
    fail_state: Option<FrameworkState>,
}

#[derive(Default)]
pub struct RecordingBackend {
    recorder: Mutex<Recorder>,
    observers: Mutex<Vec<BusObserver>>,
    probes: Mutex<Vec<(String, BufferProbe<[u8]>)>>,
    running: AtomicBool,
    quit_requested: AtomicBool,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make creation of `kind` fail as if its plugin were missing
    pub fn fail_stage_creation(self, kind: StageKind) -> Self {
        self.with_recorder(|r| r.fail_create = Some(kind));
        self
    }

    /// Make linking `kind` to its downstream neighbour fail
    pub fn fail_link_from(self, kind: StageKind) -> Self {
        self.with_recorder(|r| r.fail_link_from = Some(kind));
        self
    }

    /// Make transitions to `state` be rejected
    pub fn fail_state(self, state: FrameworkState) -> Self {
        self.with_recorder(|r| r.fail_state = Some(state));
        self
    }

    /// Queue a bus event for delivery by the run loop
    pub fn script_event(&self, event: BusEvent) {
        self.with_recorder(|r| r.script.push_back(Scripted::Event(event)));
    }

    /// Queue a buffer to flow through the probes while the run loop is active
    pub fn script_buffer(&self, data: &[u8]) {
        self.with_recorder(|r| r.script.push_back(Scripted::Buffer(data.to_vec())));
    }

    /// Push a buffer through every installed probe right away
    pub fn push_buffer(&self, data: &[u8]) -> Vec<ProbeStatus> {
        self.lock_probes()
            .iter()
            .map(|(_, probe)| probe(data))
            .collect()
    }

    pub fn created(&self) -> Vec<RecordedStage> {
        self.with_recorder(|r| r.created.clone())
    }

    pub fn added(&self) -> Vec<String> {
        self.with_recorder(|r| r.added.clone())
    }

    pub fn links(&self) -> Vec<(String, String)> {
        self.with_recorder(|r| r.links.clone())
    }

    pub fn states(&self) -> Vec<FrameworkState> {
        self.with_recorder(|r| r.states.clone())
    }

    /// Properties set on the stage called `name`, in the order they were set
    pub fn properties_of(&self, name: &str) -> Vec<(String, PropertyValue)> {
        self.with_recorder(|r| {
            r.properties
                .iter()
                .filter(|(stage, _, _)| stage == name)
                .map(|(_, key, value)| (key.clone(), value.clone()))
                .collect()
        })
    }

    /// Names of the stages carrying a buffer probe
    pub fn probe_targets(&self) -> Vec<String> {
        self.lock_probes()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn observer_count(&self) -> usize {
        self.lock_observers().len()
    }

    fn lock_observers(&self) -> MutexGuard<'_, Vec<BusObserver>> {
        self.observers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_probes(&self) -> MutexGuard<'_, Vec<(String, BufferProbe<[u8]>)>> {
        self.probes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_recorder<R>(&self, f: impl FnOnce(&mut Recorder) -> R) -> R {
        let mut guard = match self.recorder.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    fn dispatch(&self, event: &BusEvent) {
        for observer in self.lock_observers().iter() {
            observer(event);
        }
    }
}

impl MediaBackend for RecordingBackend {
    type Stage = RecordedStage;
    type Buffer = [u8];

    fn create_stage(
        &self,
        kind: StageKind,
        factory: &str,
        name: &str,
    ) -> HailoCamResult<RecordedStage> {
        self.with_recorder(|r| {
            if r.fail_create == Some(kind) {
                return Err(HailoCamError::StageCreation {
                    stage: name.to_string(),
                    factory: factory.to_string(),
                    reason: "no such element factory".to_string(),
                });
            }
            let stage = RecordedStage {
                kind,
                factory: factory.to_string(),
                name: name.to_string(),
            };
            r.created.push(stage.clone());
            Ok(stage)
        })
    }

    fn set_property(
        &self,
        stage: &RecordedStage,
        key: &str,
        value: &PropertyValue,
    ) -> HailoCamResult<()> {
        self.with_recorder(|r| {
            r.properties
                .push((stage.name.clone(), key.to_string(), value.clone()))
        });
        Ok(())
    }

    fn add_stage(&self, stage: &RecordedStage) -> HailoCamResult<()> {
        self.with_recorder(|r| r.added.push(stage.name.clone()));
        Ok(())
    }

    fn link(&self, upstream: &RecordedStage, downstream: &RecordedStage) -> HailoCamResult<()> {
        self.with_recorder(|r| {
            if r.fail_link_from == Some(upstream.kind) {
                return Err(HailoCamError::Link {
                    upstream: upstream.name.clone(),
                    downstream: downstream.name.clone(),
                    reason: "could not negotiate format".to_string(),
                });
            }
            r.links.push((upstream.name.clone(), downstream.name.clone()));
            Ok(())
        })
    }

    fn add_buffer_probe(
        &self,
        stage: &RecordedStage,
        probe: BufferProbe<[u8]>,
    ) -> HailoCamResult<()> {
        self.lock_probes().push((stage.name.clone(), probe));
        Ok(())
    }

    fn set_state(&self, state: FrameworkState) -> HailoCamResult<()> {
        self.with_recorder(|r| {
            if r.fail_state == Some(state) {
                return Err(HailoCamError::StateTransition(format!(
                    "Unable to set the pipeline to the {:?} state",
                    state
                )));
            }
            r.states.push(state);
            Ok(())
        })
    }

    fn watch_bus(&self, observer: BusObserver) -> HailoCamResult<()> {
        self.lock_observers().push(observer);
        Ok(())
    }

    fn run_loop(&self) {
        self.running.store(true, Ordering::SeqCst);

        while !self.quit_requested.load(Ordering::SeqCst) {
            let next = self.with_recorder(|r| r.script.pop_front());
            match next {
                Some(Scripted::Event(event)) => self.dispatch(&event),
                Some(Scripted::Buffer(data)) => {
                    self.push_buffer(&data);
                }
                None => break,
            }
        }

        self.running.store(false, Ordering::SeqCst);
    }

    fn quit_loop(&self) {
        self.quit_requested.store(true, Ordering::SeqCst);
    }

    fn loop_is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
