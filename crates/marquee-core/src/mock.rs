//! In-memory host doubles
//!
//! A recording engine factory and a scripted media element. Used by the
//! tests and by the CLI's replay command; both hand out cheap clones that
//! share state with the copy the controller owns.

use crate::{
    config::EngineConfig,
    engine::{AdaptiveEngine, EngineFactory, MediaElement},
    Error, Result, SessionId,
};
use std::cell::RefCell;
use std::rc::Rc;
use url::Url;

/// A call made on a mock engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    Created,
    LoadSource(Url),
    AttachMedia,
    SetNextLevel(i32),
    StartLoad,
    RecoverMediaError,
    Destroy,
}

#[derive(Debug, Default)]
struct EngineLog {
    calls: Vec<(SessionId, EngineCall)>,
    created: usize,
    live: usize,
}

/// Factory producing [`MockEngine`]s that record every call
#[derive(Debug, Clone)]
pub struct MockEngineFactory {
    supported: bool,
    fail_create: bool,
    detaches: Option<MockMedia>,
    log: Rc<RefCell<EngineLog>>,
}

impl Default for MockEngineFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEngineFactory {
    pub fn new() -> Self {
        Self {
            supported: true,
            fail_create: false,
            detaches: None,
            log: Rc::new(RefCell::new(EngineLog::default())),
        }
    }

    /// Engines rewind `media` to 0 when destroyed, like a browser engine
    /// detaching from its element
    pub fn detaching(mut self, media: &MockMedia) -> Self {
        self.detaches = Some(media.clone());
        self
    }

    /// Host without adaptive playback
    pub fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::new()
        }
    }

    /// Host that claims support but fails to construct engines
    pub fn failing() -> Self {
        Self {
            fail_create: true,
            ..Self::new()
        }
    }

    /// All calls, in order
    pub fn calls(&self) -> Vec<EngineCall> {
        self.log.borrow().calls.iter().map(|(_, c)| c.clone()).collect()
    }

    /// Calls made on the engine of `session`
    pub fn calls_for(&self, session: SessionId) -> Vec<EngineCall> {
        self.log
            .borrow()
            .calls
            .iter()
            .filter(|(s, _)| *s == session)
            .map(|(_, c)| c.clone())
            .collect()
    }

    /// Calls with their session tags
    pub fn tagged_calls(&self) -> Vec<(SessionId, EngineCall)> {
        self.log.borrow().calls.clone()
    }

    /// Engines created and not yet destroyed
    pub fn live_instances(&self) -> usize {
        self.log.borrow().live
    }

    pub fn created_instances(&self) -> usize {
        self.log.borrow().created
    }
}

impl EngineFactory for MockEngineFactory {
    type Engine = MockEngine;

    fn is_supported(&self) -> bool {
        self.supported
    }

    fn create(&mut self, session: SessionId, _config: &EngineConfig) -> Result<MockEngine> {
        if self.fail_create {
            return Err(Error::EngineCreate("mock engine construction disabled".into()));
        }
        let mut log = self.log.borrow_mut();
        log.created += 1;
        log.live += 1;
        log.calls.push((session, EngineCall::Created));
        Ok(MockEngine {
            session,
            destroyed: false,
            detaches: self.detaches.clone(),
            log: Rc::clone(&self.log),
        })
    }
}

/// Engine double; records calls, emits nothing on its own
#[derive(Debug)]
pub struct MockEngine {
    session: SessionId,
    destroyed: bool,
    detaches: Option<MockMedia>,
    log: Rc<RefCell<EngineLog>>,
}

impl MockEngine {
    fn record(&self, call: EngineCall) {
        self.log.borrow_mut().calls.push((self.session, call));
    }
}

impl AdaptiveEngine for MockEngine {
    fn load_source(&mut self, url: &Url) {
        self.record(EngineCall::LoadSource(url.clone()));
    }

    fn attach_media(&mut self) {
        self.record(EngineCall::AttachMedia);
    }

    fn set_next_level(&mut self, level: i32) {
        self.record(EngineCall::SetNextLevel(level));
    }

    fn start_load(&mut self) {
        self.record(EngineCall::StartLoad);
    }

    fn recover_media_error(&mut self) {
        self.record(EngineCall::RecoverMediaError);
    }

    fn destroy(&mut self) {
        self.record(EngineCall::Destroy);
        if !self.destroyed {
            self.destroyed = true;
            self.log.borrow_mut().live -= 1;
            if let Some(media) = &self.detaches {
                media.set_position(0.0);
            }
        }
    }
}

#[derive(Debug, Default)]
struct MediaState {
    position: f64,
    source: Option<Url>,
    seeks: Vec<f64>,
    native_manifest: bool,
}

/// Media element double with a scriptable playhead
#[derive(Debug, Clone, Default)]
pub struct MockMedia {
    state: Rc<RefCell<MediaState>>,
}

impl MockMedia {
    pub fn new() -> Self {
        Self::default()
    }

    /// Host that plays manifests natively
    pub fn with_native_manifest() -> Self {
        let media = Self::new();
        media.state.borrow_mut().native_manifest = true;
        media
    }

    /// Move the playhead as playback would
    pub fn set_position(&self, seconds: f64) {
        self.state.borrow_mut().position = seconds;
    }

    pub fn position(&self) -> f64 {
        self.state.borrow().position
    }

    /// Source set directly on the element
    pub fn source(&self) -> Option<Url> {
        self.state.borrow().source.clone()
    }

    /// Seeks issued by the controller
    pub fn seeks(&self) -> Vec<f64> {
        self.state.borrow().seeks.clone()
    }
}

impl MediaElement for MockMedia {
    fn current_time(&self) -> f64 {
        self.state.borrow().position
    }

    fn seek(&mut self, seconds: f64) {
        let mut state = self.state.borrow_mut();
        state.position = seconds;
        state.seeks.push(seconds);
    }

    fn set_source(&mut self, url: &Url) {
        let mut state = self.state.borrow_mut();
        state.source = Some(url.clone());
        state.position = 0.0;
    }

    fn can_play_manifest(&self) -> bool {
        self.state.borrow().native_manifest
    }
}
