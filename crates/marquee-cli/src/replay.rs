//! Scripted session replay
//!
//! Drives a [`SourceController`] with the mock host doubles through a
//! recorded script of host notifications stamped in milliseconds, firing the
//! controller's timers at their deadlines in between. Everything the
//! controller does to its collaborators is collected into a timeline.

use anyhow::{bail, Context};
use marquee_core::{
    mock::{EngineCall, MockEngineFactory, MockMedia},
    EngineEvent, MediaId, MediaResolver, MemoryStore, PlaybackPhase, PlayerConfig, SessionId,
    SourceController,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::debug;
use url::Url;
use web_time::Instant;

pub const DEFAULT_BASE: &str = "http://localhost:8080/api/getfile";

fn default_base() -> String {
    DEFAULT_BASE.to_string()
}

fn default_true() -> bool {
    true
}

fn default_tick() -> f64 {
    0.25
}

/// A recorded session
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayScript {
    #[serde(default = "default_base")]
    pub base: String,
    /// Whether the simulated host can run an adaptive engine
    #[serde(default = "default_true")]
    pub engine_supported: bool,
    /// Whether the simulated host plays manifests natively
    #[serde(default)]
    pub native_manifest: bool,
    pub steps: Vec<ScriptStep>,
}

impl ReplayScript {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScriptStep {
    /// Milliseconds since the start of the replay
    pub at: u64,
    #[serde(flatten)]
    pub action: ScriptAction,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScriptAction {
    Open {
        media_id: MediaId,
    },
    Close,
    Unmount,
    /// Engine callback for the current session, or the one before it when `stale`
    Engine {
        event: EngineEvent,
        #[serde(default)]
        stale: bool,
    },
    /// Move the playhead without a progress notification
    Position {
        seconds: f64,
    },
    /// Play up to `to` seconds, one progress notification every `tick`
    Play {
        to: f64,
        #[serde(default = "default_tick")]
        tick: f64,
    },
    TimeUpdate,
    Pause,
    Seeking,
    PageHidden,
    PageVisible,
    FullscreenChange,
    /// Picker value: `-1` or a level index of the current ladder
    SelectQuality {
        value: String,
    },
}

/// Something the controller did
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Observation {
    Phase { from: PlaybackPhase, to: PlaybackPhase },
    EngineCall { call: String },
    Source { url: String },
    Seek { seconds: f64 },
    StorageWrite { key: String, value: String },
    Rejected { action: String, error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayEntry {
    pub at_ms: u64,
    #[serde(flatten)]
    pub observation: Observation,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayReport {
    pub timeline: Vec<ReplayEntry>,
    pub final_phase: PlaybackPhase,
    pub active_quality: String,
    pub storage: BTreeMap<String, String>,
}

fn describe(call: &EngineCall) -> String {
    match call {
        EngineCall::Created => "create".to_string(),
        EngineCall::LoadSource(url) => format!("load_source {}", url),
        EngineCall::AttachMedia => "attach_media".to_string(),
        EngineCall::SetNextLevel(level) => format!("set_next_level {}", level),
        EngineCall::StartLoad => "start_load".to_string(),
        EngineCall::RecoverMediaError => "recover_media_error".to_string(),
        EngineCall::Destroy => "destroy".to_string(),
    }
}

struct Replayer {
    controller: SourceController<MockEngineFactory, MockMedia, MemoryStore>,
    factory: MockEngineFactory,
    media: MockMedia,
    store: MemoryStore,
    resolver: MediaResolver,
    t0: Instant,
    sessions: Vec<SessionId>,
    seen_calls: usize,
    seen_writes: usize,
    seen_seeks: usize,
    last_source: Option<Url>,
    last_phase: PlaybackPhase,
    timeline: Vec<ReplayEntry>,
}

impl Replayer {
    fn instant(&self, at: u64) -> Instant {
        self.t0 + Duration::from_millis(at)
    }

    /// Fire every timer due by `at`, each at its own deadline
    fn advance(&mut self, until: Option<u64>) {
        while let Some(deadline) = self.controller.next_deadline() {
            if until.is_some_and(|at| deadline > self.instant(at)) {
                break;
            }
            let at = deadline.duration_since(self.t0).as_millis() as u64;
            self.controller.poll_timers(deadline);
            self.observe(at);
        }
    }

    fn apply(&mut self, at: u64, action: ScriptAction) -> anyhow::Result<()> {
        let now = self.instant(at);
        match action {
            ScriptAction::Open { media_id } => {
                let asset = self.resolver.resolve(&media_id)?;
                let session = self.controller.open(asset);
                self.sessions.push(session);
            }
            ScriptAction::Close => self.controller.close(),
            ScriptAction::Unmount => self.controller.unmount(),
            ScriptAction::Engine { event, stale } => {
                let back = if stale { 2 } else { 1 };
                let Some(session) = self.sessions.len().checked_sub(back).map(|i| self.sessions[i]) else {
                    bail!("engine event at {}ms has no session to belong to", at);
                };
                self.controller.handle_engine_event(session, event, now);
            }
            ScriptAction::Position { seconds } => self.media.set_position(seconds),
            ScriptAction::Play { to, tick } => {
                if !(tick > 0.0) {
                    bail!("play tick must be positive, got {}", tick);
                }
                let mut position = self.media.position();
                while position + tick <= to + f64::EPSILON {
                    position += tick;
                    self.media.set_position(position);
                    self.controller.on_time_update();
                }
            }
            ScriptAction::TimeUpdate => self.controller.on_time_update(),
            ScriptAction::Pause => self.controller.on_pause(),
            ScriptAction::Seeking => self.controller.on_seeking(),
            ScriptAction::PageHidden => self.controller.on_page_hidden(),
            ScriptAction::PageVisible => self.controller.on_page_visible(now),
            ScriptAction::FullscreenChange => self.controller.on_fullscreen_change(now),
            ScriptAction::SelectQuality { value } => {
                if let Err(e) = self.controller.select_quality(&value) {
                    self.timeline.push(ReplayEntry {
                        at_ms: at,
                        observation: Observation::Rejected {
                            action: format!("select_quality {}", value),
                            error: e.to_string(),
                        },
                    });
                }
            }
        }
        self.observe(at);
        Ok(())
    }

    /// Record what changed on the doubles since the last look
    fn observe(&mut self, at: u64) {
        let mut push = |observation| self.timeline.push(ReplayEntry { at_ms: at, observation });

        let phase = self.controller.phase();
        if phase != self.last_phase {
            push(Observation::Phase {
                from: self.last_phase,
                to: phase,
            });
            self.last_phase = phase;
        }

        let calls = self.factory.calls();
        for call in &calls[self.seen_calls..] {
            push(Observation::EngineCall { call: describe(call) });
        }
        self.seen_calls = calls.len();

        let source = self.media.source();
        if source != self.last_source {
            if let Some(url) = &source {
                push(Observation::Source { url: url.to_string() });
            }
            self.last_source = source;
        }

        let seeks = self.media.seeks();
        for &seconds in &seeks[self.seen_seeks..] {
            push(Observation::Seek { seconds });
        }
        self.seen_seeks = seeks.len();

        let writes = self.store.writes();
        for (key, value) in &writes[self.seen_writes..] {
            push(Observation::StorageWrite {
                key: key.clone(),
                value: value.clone(),
            });
        }
        self.seen_writes = writes.len();
    }
}

/// Replay `script` against a store seeded with `saved`
pub fn run(script: &ReplayScript, config: PlayerConfig, saved: BTreeMap<String, String>) -> anyhow::Result<ReplayReport> {
    let media = if script.native_manifest {
        MockMedia::with_native_manifest()
    } else {
        MockMedia::new()
    };
    let factory = if script.engine_supported {
        MockEngineFactory::new().detaching(&media)
    } else {
        MockEngineFactory::unsupported()
    };
    let store = MemoryStore::with_entries(saved);
    let resolver = MediaResolver::new(&script.base, config.sources.clone())?;
    let controller = SourceController::new(config, factory.clone(), media.clone(), store.clone());

    let mut replayer = Replayer {
        controller,
        factory,
        media,
        store,
        resolver,
        t0: Instant::now(),
        sessions: Vec::new(),
        seen_calls: 0,
        seen_writes: 0,
        seen_seeks: 0,
        last_source: None,
        last_phase: PlaybackPhase::Uninitialized,
        timeline: Vec::new(),
    };

    let mut last_at = 0;
    for step in &script.steps {
        if step.at < last_at {
            bail!("step at {}ms comes after a step at {}ms", step.at, last_at);
        }
        last_at = step.at;
        replayer.advance(Some(step.at));
        debug!(at = step.at, action = ?step.action, "Replaying step");
        replayer.apply(step.at, step.action.clone())?;
    }
    replayer.advance(None);

    Ok(ReplayReport {
        final_phase: replayer.controller.phase(),
        active_quality: replayer
            .controller
            .quality()
            .active_rendition()
            .map(|r| r.label.clone())
            .unwrap_or_else(|| "Auto".to_string()),
        storage: replayer.store.entries().into_iter().collect(),
        timeline: replayer.timeline,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(json: &str) -> ReplayScript {
        serde_json::from_str(json).unwrap()
    }

    fn saved_42() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("movie_42_time".to_string(), "137.5".to_string()),
            ("movie_42_quality".to_string(), "720".to_string()),
        ])
    }

    const RESUME: &str = r#"{
        "base": "https://api.marquee.test/api/getfile",
        "steps": [
            { "at": 0, "type": "open", "media_id": "42" },
            { "at": 15, "type": "engine", "event": { "type": "media_attached" } },
            { "at": 40, "type": "engine", "event": { "type": "manifest_parsed", "levels": [
                { "height": 480, "bitrate": 800000 },
                { "height": 720, "bitrate": 2500000 },
                { "height": 1080, "bitrate": 5000000 }
            ] } },
            { "at": 60, "type": "engine", "event": { "type": "level_switched", "level": 1 } }
        ]
    }"#;

    #[test]
    fn test_resume_timeline() {
        let report = run(&script(RESUME), PlayerConfig::default(), saved_42()).unwrap();

        let seeks: Vec<&ReplayEntry> = report
            .timeline
            .iter()
            .filter(|e| matches!(e.observation, Observation::Seek { .. }))
            .collect();
        assert_eq!(seeks.len(), 1);
        assert_eq!(seeks[0].at_ms, 215);
        assert_eq!(seeks[0].observation, Observation::Seek { seconds: 137.5 });

        assert!(report.timeline.contains(&ReplayEntry {
            at_ms: 40,
            observation: Observation::EngineCall {
                call: "set_next_level 1".to_string()
            },
        }));
        assert!(!report
            .timeline
            .iter()
            .any(|e| matches!(e.observation, Observation::StorageWrite { .. })));
        assert_eq!(report.final_phase, PlaybackPhase::Ready);
        assert_eq!(report.active_quality, "720p");
    }

    #[test]
    fn test_play_writes_every_five_seconds() {
        let json = r#"{
            "steps": [
                { "at": 0, "type": "open", "media_id": "7" },
                { "at": 10, "type": "engine", "event": { "type": "manifest_parsed", "levels": [] } },
                { "at": 20, "type": "play", "to": 12.0 }
            ]
        }"#;
        let report = run(&script(json), PlayerConfig::default(), BTreeMap::new()).unwrap();
        let writes: Vec<String> = report
            .timeline
            .iter()
            .filter_map(|e| match &e.observation {
                Observation::StorageWrite { key, value } if key == "movie_7_time" => Some(value.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(writes, vec!["5", "10"]);
    }

    #[test]
    fn test_unsupported_host_plays_fallback() {
        let json = r#"{
            "engineSupported": false,
            "steps": [{ "at": 0, "type": "open", "media_id": "3" }]
        }"#;
        let report = run(&script(json), PlayerConfig::default(), BTreeMap::new()).unwrap();
        assert_eq!(report.final_phase, PlaybackPhase::Degraded);
        assert!(report.timeline.contains(&ReplayEntry {
            at_ms: 0,
            observation: Observation::Source {
                url: "http://localhost:8080/api/getfile/movies/3/video-file".to_string()
            },
        }));
    }

    #[test]
    fn test_rejected_pick_is_reported() {
        let json = r#"{ "steps": [{ "at": 5, "type": "select_quality", "value": "720" }] }"#;
        let report = run(&script(json), PlayerConfig::default(), BTreeMap::new()).unwrap();
        assert!(matches!(
            report.timeline[0].observation,
            Observation::Rejected { .. }
        ));
    }

    #[test]
    fn test_pick_by_level_index() {
        let json = r#"{
            "steps": [
                { "at": 0, "type": "open", "media_id": "9" },
                { "at": 10, "type": "engine", "event": { "type": "manifest_parsed", "levels": [
                    { "height": 720, "bitrate": 2500000 },
                    { "height": 720, "bitrate": 4500000 }
                ] } },
                { "at": 20, "type": "select_quality", "value": "1" }
            ]
        }"#;
        let report = run(&script(json), PlayerConfig::default(), BTreeMap::new()).unwrap();
        assert!(report.timeline.contains(&ReplayEntry {
            at_ms: 20,
            observation: Observation::EngineCall {
                call: "set_next_level 1".to_string()
            },
        }));
        assert_eq!(report.storage.get("movie_9_quality").map(String::as_str), Some("720@4500000"));
        assert_eq!(report.active_quality, "720p (4500 kbps)");
    }

    #[test]
    fn test_rejects_out_of_order_steps() {
        let json = r#"{ "steps": [
            { "at": 50, "type": "pause" },
            { "at": 10, "type": "pause" }
        ] }"#;
        assert!(run(&script(json), PlayerConfig::default(), BTreeMap::new()).is_err());
    }

    #[test]
    fn test_engine_event_needs_session() {
        let json = r#"{ "steps": [{ "at": 0, "type": "engine", "event": { "type": "media_attached" } }] }"#;
        assert!(run(&script(json), PlayerConfig::default(), BTreeMap::new()).is_err());
    }
}
