//! Adaptive Source Controller
//!
//! Owns the single engine instance of a mounted player and drives the
//! playback state machine:
//!
//! ```text
//! Uninitialized --open--> Loading --manifest parsed--> Ready
//!       |                    |                          |  ^
//!       |                    |                          |  | fatal network/media
//!       |                    +----fatal other----+      +--+
//!       |                                        v      |
//!       +--open, no engine--> Native      Degraded <----+ fatal other
//!       +--open, nothing----> Degraded
//!
//! any --close/open--> Uninitialized
//! ```
//!
//! Every entry point runs on the host's event loop. Timers are handed out
//! through [`SourceController::next_deadline`] and fired by the host with
//! [`SourceController::poll_timers`].

use crate::{
    config::PlayerConfig,
    engine::{AdaptiveEngine, EngineEvent, EngineFactory, MediaElement},
    quality::QualitySelector,
    session::PlaybackSession,
    storage::{KeyValueStore, SessionStore},
    timer::{TimerKind, TimerQueue},
    EngineError, EngineErrorKind, Error, LevelInfo, MediaAsset, PlaybackPhase, RenditionSelector,
    Result, SessionId, AUTO_LEVEL,
};
use tracing::{debug, error, info, instrument, warn};
use url::Url;
use web_time::Instant;

/// Adaptive Source Controller for one mounted player
pub struct SourceController<F: EngineFactory, M, S> {
    config: PlayerConfig,
    factory: F,
    media: M,
    store: SessionStore<S>,
    /// The only live engine; destroyed before another is created
    engine: Option<F::Engine>,
    session: Option<PlaybackSession>,
    phase: PlaybackPhase,
    timers: TimerQueue,
    quality: QualitySelector,
}

impl<F, M, S> SourceController<F, M, S>
where
    F: EngineFactory,
    M: MediaElement,
    S: KeyValueStore,
{
    /// Create a controller with no session
    pub fn new(config: PlayerConfig, factory: F, media: M, store: S) -> Self {
        Self {
            config,
            factory,
            media,
            store: SessionStore::new(store),
            engine: None,
            session: None,
            phase: PlaybackPhase::Uninitialized,
            timers: TimerQueue::new(),
            quality: QualitySelector::new(),
        }
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn phase(&self) -> PlaybackPhase {
        self.phase
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(|s| s.id)
    }

    pub fn asset(&self) -> Option<&MediaAsset> {
        self.session.as_ref().map(|s| &s.asset)
    }

    pub fn quality(&self) -> &QualitySelector {
        &self.quality
    }

    pub fn store(&self) -> &SessionStore<S> {
        &self.store
    }

    pub fn media(&self) -> &M {
        &self.media
    }

    pub fn has_engine(&self) -> bool {
        self.engine.is_some()
    }

    /// Earliest pending timer deadline
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    fn set_phase(&mut self, to: PlaybackPhase) -> bool {
        let from = self.phase;
        if !from.can_transition_to(to) {
            let err = Error::InvalidStateTransition {
                from: from.to_string(),
                to: to.to_string(),
            };
            warn!(error = %err, "Ignoring transition");
            return false;
        }
        self.phase = to;
        if from != to {
            info!(from = %from, to = %to, "State transition");
        }
        true
    }

    /// Start a session for `asset`, replacing any current one.
    ///
    /// Returns the id engine callbacks must be tagged with.
    #[instrument(skip(self, asset), fields(media_id = %asset.id))]
    pub fn open(&mut self, asset: MediaAsset) -> SessionId {
        if self.session.is_some() {
            self.flush_position();
            self.close();
        }

        let restored = self.store.load(&asset.id);
        let session = PlaybackSession::new(
            asset,
            restored,
            self.config.timing.position_persist_interval_secs,
        );
        let session_id = session.id;
        let manifest_url = session.asset.manifest_url.clone();
        let fallback_url = session.asset.fallback_url.clone();

        info!(
            session_id = %session_id,
            offset = restored.resume_offset(),
            quality = ?restored.rendition,
            "Opening media"
        );

        self.quality.clear();
        self.session = Some(session);

        if self.factory.is_supported() {
            match self.factory.create(session_id, &self.config.engine) {
                Ok(mut engine) => {
                    engine.load_source(&manifest_url);
                    engine.attach_media();
                    self.engine = Some(engine);
                    self.set_phase(PlaybackPhase::Loading);
                    return session_id;
                }
                Err(e) => {
                    warn!(error = %e, "Adaptive engine unavailable, using direct playback");
                }
            }
        }

        if self.media.can_play_manifest() {
            self.play_direct(&manifest_url, PlaybackPhase::Native);
        } else {
            self.play_direct(&fallback_url, PlaybackPhase::Degraded);
        }

        session_id
    }

    fn play_direct(&mut self, url: &Url, phase: PlaybackPhase) {
        self.media.set_source(url);
        if let Some(session) = self.session.as_mut() {
            let offset = session.resume_offset();
            if offset > 0.0 {
                self.media.seek(offset);
            }
            session.offset_restored = true;
        }
        info!(url = %url, phase = %phase, "Direct playback");
        self.set_phase(phase);
    }

    /// Tear down the engine and forget the session. Idempotent.
    pub fn close(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            engine.destroy();
            debug!("Adaptive engine destroyed");
        }
        if let Some(session) = self.session.take() {
            let cancelled = self.timers.cancel_session(session.id);
            info!(session_id = %session.id, media_id = %session.asset.id, cancelled, "Session closed");
        }
        self.quality.clear();
        if self.phase != PlaybackPhase::Uninitialized {
            self.set_phase(PlaybackPhase::Uninitialized);
        }
    }

    /// Flush the position, then close
    pub fn unmount(&mut self) {
        self.flush_position();
        self.close();
    }

    /// Route an engine callback. Callbacks of any other session are ignored.
    pub fn handle_engine_event(&mut self, session_id: SessionId, event: EngineEvent, now: Instant) {
        match self.session.as_ref() {
            Some(session) if session.id == session_id => {}
            _ => {
                debug!(session_id = %session_id, event = event.name(), "Ignoring engine event from stale session");
                return;
            }
        }
        if self.engine.is_none() {
            debug!(event = event.name(), phase = %self.phase, "Ignoring engine event without engine");
            return;
        }

        match event {
            EngineEvent::ManifestParsed { levels } => self.on_manifest_parsed(levels, now),
            EngineEvent::LevelSwitched { level } => self.on_level_switched(level),
            EngineEvent::MediaAttached => self.on_media_attached(now),
            EngineEvent::Error(err) => self.on_engine_error(err),
        }
    }

    fn on_manifest_parsed(&mut self, levels: Vec<LevelInfo>, now: Instant) {
        let first_load = self.phase == PlaybackPhase::Loading;
        if !self.set_phase(PlaybackPhase::Ready) {
            return;
        }
        let (Some(session), Some(engine)) = (self.session.as_mut(), self.engine.as_mut()) else {
            return;
        };

        info!(levels = levels.len(), "Manifest parsed");
        self.quality.set_levels(&levels);
        session.levels = levels;

        if first_load {
            if let Some(selector) = session.restored.restorable_rendition() {
                match selector.level_index(&session.levels) {
                    Some(index) => {
                        let token = session.programmatic.engage();
                        self.timers.schedule(
                            now,
                            self.config.timing.programmatic_change_window(),
                            session.id,
                            TimerKind::ReleaseProgrammatic { token },
                        );
                        engine.set_next_level(index);
                        self.quality.set_active(index);
                        info!(quality = %selector, level = index, "Restored saved quality");
                    }
                    None => {
                        warn!(quality = %selector, "Saved quality missing from manifest, staying on Auto");
                    }
                }
            }
        }

        if session.media_attached && !session.offset_restored {
            self.timers.schedule(
                now,
                self.config.timing.seek_settle(),
                session.id,
                TimerKind::RestoreOffset,
            );
        }
    }

    fn on_level_switched(&mut self, level: i32) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.suppressing_level_switches() {
            debug!(
                level,
                fullscreen = session.fullscreen.is_active(),
                programmatic = session.programmatic.is_active(),
                "Ignoring suppressed level switch"
            );
            return;
        }

        let selector = if level == AUTO_LEVEL {
            RenditionSelector::Auto
        } else {
            match usize::try_from(level).ok().and_then(|i| session.levels.get(i)) {
                Some(info) => RenditionSelector::of(info),
                None => {
                    warn!(level, levels = session.levels.len(), "Level switch outside manifest");
                    return;
                }
            }
        };

        debug!(level, quality = %selector, "Level switched");
        self.quality.set_active(level);
        self.store.save_rendition(&session.asset.id, selector);
    }

    fn on_media_attached(&mut self, now: Instant) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.media_attached = true;
        debug!("Media attached");
        if !session.offset_restored {
            self.timers.schedule(
                now,
                self.config.timing.seek_settle(),
                session.id,
                TimerKind::RestoreOffset,
            );
        }
    }

    fn on_engine_error(&mut self, err: EngineError) {
        if !err.fatal {
            debug!(kind = %err.kind, details = %err.details, "Non-fatal engine error");
            return;
        }
        let Some(engine) = self.engine.as_mut() else {
            return;
        };

        match err.kind {
            EngineErrorKind::Network => {
                warn!(details = %err.details, "Fatal network error, restarting load");
                engine.start_load();
            }
            EngineErrorKind::Media => {
                warn!(details = %err.details, "Fatal media error, recovering");
                engine.recover_media_error();
            }
            EngineErrorKind::Other => {
                error!(details = %err.details, "Unrecoverable engine error, falling back to progressive file");
                self.degrade();
            }
        }
    }

    /// Drop the engine for good and play the progressive file
    fn degrade(&mut self) {
        // Tearing the engine down detaches the element and resets its clock
        let live = self.media.current_time();
        if let Some(mut engine) = self.engine.take() {
            engine.destroy();
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };

        if session.offset_restored && live > 0.0 {
            session.last_offset = live;
        }
        let resume = session.last_offset;

        self.media.set_source(&session.asset.fallback_url);
        if resume > 0.0 {
            self.media.seek(resume);
        }
        session.offset_restored = true;
        self.quality.clear_renditions();

        info!(url = %session.asset.fallback_url, offset = resume, "Progressive fallback");
        self.set_phase(PlaybackPhase::Degraded);
    }

    /// Apply a user's rendition pick. Never suppressed.
    #[instrument(skip(self))]
    pub fn change_rendition(&mut self, selector: RenditionSelector) -> Result<()> {
        let (Some(session), Some(_)) = (self.session.as_ref(), self.engine.as_ref()) else {
            return Err(Error::EngineUnavailable);
        };
        let level = selector
            .level_index(&session.levels)
            .ok_or_else(|| Error::RenditionUnavailable(selector.to_string()))?;
        self.apply_user_level(level)
    }

    /// Apply a picker value (a level index of the current ladder) as a user pick
    pub fn select_quality(&mut self, value: &str) -> Result<()> {
        if self.engine.is_none() {
            return Err(Error::EngineUnavailable);
        }
        let level = self.quality.pick(value)?;
        self.apply_user_level(level)
    }

    /// `level` is Auto or an index of the current ladder
    fn apply_user_level(&mut self, level: i32) -> Result<()> {
        let (Some(session), Some(engine)) = (self.session.as_ref(), self.engine.as_mut()) else {
            return Err(Error::EngineUnavailable);
        };

        engine.set_next_level(level);
        self.quality.set_active(level);
        let selector = self.quality.active_selector();
        self.store.save_rendition(&session.asset.id, selector);
        info!(quality = %selector, level, "Quality changed by viewer");
        Ok(())
    }

    /// Playback progress tick; persists at most once per interval of media time
    pub fn on_time_update(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if !session.offset_restored {
            return;
        }
        let position = self.media.current_time();
        session.last_offset = position;
        if session.position_gate.admit(position) {
            session.last_saved_offset = position;
            self.store.save_offset(&session.asset.id, position);
        }
    }

    pub fn on_pause(&mut self) {
        self.flush_position();
    }

    pub fn on_seeking(&mut self) {
        self.flush_position();
    }

    pub fn on_page_hidden(&mut self) {
        self.flush_position();
    }

    /// Schedule the drift check that runs once the page is visible again
    pub fn on_page_visible(&mut self, now: Instant) {
        if let Some(session) = self.session.as_ref() {
            self.timers.schedule(
                now,
                self.config.timing.visibility_check_delay(),
                session.id,
                TimerKind::VisibilityCheck,
            );
        }
    }

    /// Ignore level switches for a short window around fullscreen changes
    pub fn on_fullscreen_change(&mut self, now: Instant) {
        if let Some(session) = self.session.as_mut() {
            let token = session.fullscreen.engage();
            self.timers.schedule(
                now,
                self.config.timing.fullscreen_transition_window(),
                session.id,
                TimerKind::ReleaseFullscreen { token },
            );
            debug!("Fullscreen transition");
        }
    }

    /// Unconditionally persist the live position
    pub fn flush_position(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        // Before the resume seek the element still reports 0
        if !session.offset_restored {
            return;
        }
        let position = self.media.current_time();
        session.last_offset = position;
        session.last_saved_offset = position;
        session.position_gate.reset(position);
        self.store.save_offset(&session.asset.id, position);
    }

    /// Fire every timer due at `now`
    pub fn poll_timers(&mut self, now: Instant) {
        for timer in self.timers.take_due(now) {
            let Some(session) = self.session.as_mut().filter(|s| s.id == timer.session) else {
                debug!(kind = ?timer.kind, "Ignoring stale timer");
                continue;
            };

            match timer.kind {
                TimerKind::ReleaseProgrammatic { token } => {
                    session.programmatic.release(token);
                }
                TimerKind::ReleaseFullscreen { token } => {
                    session.fullscreen.release(token);
                }
                TimerKind::RestoreOffset => {
                    if session.offset_restored {
                        continue;
                    }
                    let offset = session.resume_offset();
                    self.media.seek(offset);
                    session.offset_restored = true;
                    session.last_offset = offset;
                    info!(offset, "Restored playback position");
                }
                TimerKind::VisibilityCheck => {
                    if !session.offset_restored {
                        continue;
                    }
                    let live = self.media.current_time();
                    let saved = session.last_saved_offset;
                    if (live - saved).abs() > self.config.timing.drift_tolerance_secs {
                        info!(live, saved, "Position drifted while hidden, reseeking");
                        self.media.seek(saved);
                        session.last_offset = saved;
                    }
                }
            }
        }
    }
}

impl<F: EngineFactory, M, S> Drop for SourceController<F, M, S> {
    fn drop(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            engine.destroy();
        }
    }
}
