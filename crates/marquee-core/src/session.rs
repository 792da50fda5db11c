//! Playback Session - transient state of one mounted player for one media id
//!
//! Holds:
//! - the asset and the state restored for it
//! - last known and last saved offsets
//! - the two time-boxed suppression flags
//! - the media-time gate bounding periodic position writes

use crate::{LevelInfo, MediaAsset, PersistedPlaybackState, SessionId};

/// Time-boxed suppression flag.
///
/// Engaged right before the action whose echo must be ignored and released
/// only by the timer scheduled with the returned token. Re-engaging hands out
/// a new token, so a release scheduled for an older engagement is a no-op.
#[derive(Debug, Default)]
pub struct Suppression {
    engaged: bool,
    token: u64,
}

impl Suppression {
    /// Raise the flag; schedule the release with the returned token
    pub fn engage(&mut self) -> u64 {
        self.token += 1;
        self.engaged = true;
        self.token
    }

    /// Lower the flag if `token` belongs to the latest engagement
    pub fn release(&mut self, token: u64) -> bool {
        if self.engaged && token == self.token {
            self.engaged = false;
            true
        } else {
            false
        }
    }

    pub fn is_active(&self) -> bool {
        self.engaged
    }
}

/// Bounds periodic position writes by media time.
///
/// A progress tick is admitted once the position has moved at least
/// `interval` media-seconds from the last write, in either direction.
#[derive(Debug)]
pub struct PositionGate {
    interval: f64,
    anchor: f64,
}

impl PositionGate {
    pub fn new(interval: f64, anchor: f64) -> Self {
        Self { interval, anchor }
    }

    /// Admit `position` for a write and move the anchor if so
    pub fn admit(&mut self, position: f64) -> bool {
        if (position - self.anchor).abs() >= self.interval {
            self.anchor = position;
            true
        } else {
            false
        }
    }

    /// Re-anchor after an unconditional write
    pub fn reset(&mut self, position: f64) {
        self.anchor = position;
    }

    pub fn anchor(&self) -> f64 {
        self.anchor
    }
}

/// State of the mounted player for the current media id
#[derive(Debug)]
pub struct PlaybackSession {
    pub id: SessionId,
    pub asset: MediaAsset,
    /// What the Session Store held at open
    pub restored: PersistedPlaybackState,
    /// Levels of the current manifest load, in manifest order
    pub levels: Vec<LevelInfo>,
    /// Last observed playback position
    pub last_offset: f64,
    /// Last position written (or attempted) to the Session Store
    pub last_saved_offset: f64,
    pub media_attached: bool,
    pub offset_restored: bool,
    pub fullscreen: Suppression,
    pub programmatic: Suppression,
    pub position_gate: PositionGate,
}

impl PlaybackSession {
    pub fn new(asset: MediaAsset, restored: PersistedPlaybackState, persist_interval: f64) -> Self {
        let offset = restored.resume_offset();
        Self {
            id: SessionId::new(),
            asset,
            restored,
            levels: Vec::new(),
            last_offset: offset,
            last_saved_offset: offset,
            media_attached: false,
            offset_restored: offset <= 0.0,
            fullscreen: Suppression::default(),
            programmatic: Suppression::default(),
            position_gate: PositionGate::new(persist_interval, offset),
        }
    }

    /// Offset to seek to when resuming
    pub fn resume_offset(&self) -> f64 {
        self.restored.resume_offset()
    }

    /// Whether level-switch notifications are echoes to ignore
    pub fn suppressing_level_switches(&self) -> bool {
        self.fullscreen.is_active() || self.programmatic.is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MediaId, RenditionSelector};
    use url::Url;

    fn asset() -> MediaAsset {
        MediaAsset {
            id: MediaId::from(42u64),
            manifest_url: Url::parse("https://host/movies/42/transcoded/master-manifest").unwrap(),
            fallback_url: Url::parse("https://host/movies/42/video-file").unwrap(),
        }
    }

    #[test]
    fn test_suppression_release_requires_latest_token() {
        let mut flag = Suppression::default();
        let first = flag.engage();
        let second = flag.engage();

        assert!(!flag.release(first));
        assert!(flag.is_active());
        assert!(flag.release(second));
        assert!(!flag.is_active());
        assert!(!flag.release(second));
    }

    #[test]
    fn test_position_gate_bounds_writes() {
        let mut gate = PositionGate::new(5.0, 0.0);
        let ticks: Vec<f64> = (1..=48).map(|i| i as f64 * 0.25).collect();
        let admitted: Vec<f64> = ticks.into_iter().filter(|t| gate.admit(*t)).collect();
        assert_eq!(admitted, vec![5.0, 10.0]);
    }

    #[test]
    fn test_position_gate_backwards_and_reset() {
        let mut gate = PositionGate::new(5.0, 100.0);
        assert!(!gate.admit(97.0));
        assert!(gate.admit(94.0));
        gate.reset(30.0);
        assert_eq!(gate.anchor(), 30.0);
        assert!(!gate.admit(34.9));
    }

    #[test]
    fn test_new_session_seeds_offsets() {
        let restored = PersistedPlaybackState {
            offset: Some(137.5),
            rendition: Some(RenditionSelector::height(720)),
        };
        let session = PlaybackSession::new(asset(), restored, 5.0);
        assert_eq!(session.last_offset, 137.5);
        assert_eq!(session.last_saved_offset, 137.5);
        assert!(!session.offset_restored);
        assert_eq!(session.position_gate.anchor(), 137.5);
        assert!(!session.suppressing_level_switches());

        let fresh = PlaybackSession::new(asset(), PersistedPlaybackState::default(), 5.0);
        assert!(fresh.offset_restored);
        assert_eq!(fresh.last_offset, 0.0);
    }
}
