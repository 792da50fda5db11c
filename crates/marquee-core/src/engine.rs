//! Host seams: adaptive engine, engine factory and media element
//!
//! The controller never talks to a browser or a decoder directly. A host
//! supplies these traits and feeds engine callbacks back as [`EngineEvent`]s
//! tagged with the [`SessionId`](crate::SessionId) the engine was created for.

use crate::{config::EngineConfig, EngineError, LevelInfo, Result, SessionId};
use serde::{Deserialize, Serialize};
use url::Url;

/// Client-side adaptive streaming engine bound to one media element
pub trait AdaptiveEngine {
    /// Begin loading the master manifest
    fn load_source(&mut self, url: &Url);

    /// Attach to the host media element
    fn attach_media(&mut self);

    /// Request a level for upcoming fragments, `AUTO_LEVEL` restores automatic selection
    fn set_next_level(&mut self, level: i32);

    /// Restart loading after a fatal network error
    fn start_load(&mut self);

    /// Attempt in-place recovery after a fatal media error
    fn recover_media_error(&mut self);

    /// Release the engine; no callbacks may follow
    fn destroy(&mut self);
}

/// Creates engines and reports whether the host can run one at all
pub trait EngineFactory {
    type Engine: AdaptiveEngine;

    /// Whether adaptive playback is available on this host
    fn is_supported(&self) -> bool;

    /// Build an engine whose callbacks are tagged with `session`
    fn create(&mut self, session: SessionId, config: &EngineConfig) -> Result<Self::Engine>;
}

/// The host's media element
pub trait MediaElement {
    /// Current playback position in seconds
    fn current_time(&self) -> f64;

    /// Move the playback position
    fn seek(&mut self, seconds: f64);

    /// Play `url` directly, bypassing any engine
    fn set_source(&mut self, url: &Url);

    /// Whether the host can play an adaptive manifest without an engine
    fn can_play_manifest(&self) -> bool;
}

/// Engine callback, delivered by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// Manifest parsed; levels in manifest order
    ManifestParsed { levels: Vec<LevelInfo> },
    /// Engine finished switching to `level`
    LevelSwitched { level: i32 },
    /// Engine attached to the media element
    MediaAttached,
    /// Engine error
    Error(EngineError),
}

impl EngineEvent {
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::ManifestParsed { .. } => "manifest_parsed",
            EngineEvent::LevelSwitched { .. } => "level_switched",
            EngineEvent::MediaAttached => "media_attached",
            EngineEvent::Error(_) => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EngineErrorKind;

    #[test]
    fn test_event_json_shape() {
        let event: EngineEvent = serde_json::from_str(
            r#"{"type":"manifest_parsed","levels":[{"height":480,"bitrate":800000}]}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            EngineEvent::ManifestParsed {
                levels: vec![LevelInfo::new(480, 800_000)]
            }
        );

        let event: EngineEvent =
            serde_json::from_str(r#"{"type":"error","fatal":true,"kind":"media"}"#).unwrap();
        assert_eq!(event, EngineEvent::Error(EngineError::fatal(EngineErrorKind::Media, "")));
        assert_eq!(event.name(), "error");
    }
}
