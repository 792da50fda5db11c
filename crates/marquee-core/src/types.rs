//! Core types for Marquee

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

/// Engine level index meaning "let the adaptive engine choose"
pub const AUTO_LEVEL: i32 = -1;

/// Unique identifier for a playback session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque catalog identifier of a playable movie
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaId(String);

impl MediaId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MediaId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for MediaId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u64> for MediaId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for MediaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Playable sources for one media id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaAsset {
    pub id: MediaId,
    /// Adaptive master manifest
    pub manifest_url: Url,
    /// Single progressive file used when adaptive playback is impossible
    pub fallback_url: Url,
}

/// Level description as reported by the engine on manifest parse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelInfo {
    /// Vertical resolution
    pub height: u32,
    /// Bitrate in bits per second
    pub bitrate: u64,
}

impl LevelInfo {
    pub fn new(height: u32, bitrate: u64) -> Self {
        Self { height, bitrate }
    }
}

/// One entry of the quality ladder shown to the viewer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rendition {
    /// Engine level index, `AUTO_LEVEL` for the synthetic Auto entry
    pub index: i32,
    /// Vertical resolution (0 for Auto)
    pub height: u32,
    /// Bitrate in bps (0 for Auto)
    pub bitrate: u64,
    /// Display label
    pub label: String,
}

impl Rendition {
    /// The synthetic "let the engine choose" entry
    pub fn auto() -> Self {
        Self {
            index: AUTO_LEVEL,
            height: 0,
            bitrate: 0,
            label: "Auto".to_string(),
        }
    }

    pub fn is_auto(&self) -> bool {
        self.index == AUTO_LEVEL
    }

    /// Identity that survives into the next manifest load
    pub fn selector(&self) -> RenditionSelector {
        if self.is_auto() {
            RenditionSelector::Auto
        } else {
            RenditionSelector::Level {
                height: self.height,
                bitrate: Some(self.bitrate),
            }
        }
    }
}

/// Build the quality ladder for a freshly parsed manifest.
///
/// Auto always comes first, followed by one entry per level in manifest order.
/// Levels sharing a height are told apart by bitrate in their label.
pub fn renditions_from_levels(levels: &[LevelInfo]) -> Vec<Rendition> {
    let shared_height = |height: u32| levels.iter().filter(|l| l.height == height).count() > 1;
    std::iter::once(Rendition::auto())
        .chain(levels.iter().enumerate().map(|(i, level)| Rendition {
            index: i as i32,
            height: level.height,
            bitrate: level.bitrate,
            label: level_label(level, shared_height(level.height)),
        }))
        .collect()
}

fn level_label(level: &LevelInfo, shared_height: bool) -> String {
    let kbps = level.bitrate / 1000;
    match level.height {
        0 => format!("{} kbps", kbps),
        h if shared_height => format!("{}p ({} kbps)", h, kbps),
        h => format!("{}p", h),
    }
}

/// Persistable rendition choice.
///
/// Engine indices are only stable within one manifest load, so a concrete
/// choice is remembered by its vertical resolution and bitrate. Stored as
/// `-1`, `{height}@{bitrate}`, or a bare `{height}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RenditionSelector {
    #[default]
    Auto,
    Level { height: u32, bitrate: Option<u64> },
}

impl RenditionSelector {
    /// Any level of the given height
    pub fn height(height: u32) -> Self {
        RenditionSelector::Level { height, bitrate: None }
    }

    /// Exactly this level
    pub fn of(level: &LevelInfo) -> Self {
        RenditionSelector::Level {
            height: level.height,
            bitrate: Some(level.bitrate),
        }
    }

    pub fn is_auto(&self) -> bool {
        matches!(self, RenditionSelector::Auto)
    }

    /// Parse a stored value
    pub fn parse(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        if trimmed == "-1" || trimmed.eq_ignore_ascii_case("auto") {
            return Ok(RenditionSelector::Auto);
        }
        let invalid = || Error::InvalidSelector(value.to_string());
        match trimmed.split_once('@') {
            Some((height, bitrate)) => {
                let height = height.parse::<u32>().map_err(|_| invalid())?;
                let bitrate = bitrate.parse::<u64>().map_err(|_| invalid())?;
                Ok(RenditionSelector::Level {
                    height,
                    bitrate: Some(bitrate),
                })
            }
            None => match trimmed.trim_end_matches('p').parse::<u32>() {
                Ok(height) if height > 0 => Ok(RenditionSelector::height(height)),
                _ => Err(invalid()),
            },
        }
    }

    /// Level index of this selector within the given level list.
    ///
    /// An exact height and bitrate match wins; otherwise the first level of
    /// the same height.
    pub fn level_index(&self, levels: &[LevelInfo]) -> Option<i32> {
        let (height, bitrate) = match *self {
            RenditionSelector::Auto => return Some(AUTO_LEVEL),
            RenditionSelector::Level { height, bitrate } => (height, bitrate),
        };
        bitrate
            .and_then(|bitrate| {
                levels
                    .iter()
                    .position(|level| level.height == height && level.bitrate == bitrate)
            })
            .or_else(|| levels.iter().position(|level| level.height == height))
            .map(|i| i as i32)
    }
}

impl std::str::FromStr for RenditionSelector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl std::fmt::Display for RenditionSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenditionSelector::Auto => write!(f, "{}", AUTO_LEVEL),
            RenditionSelector::Level {
                height,
                bitrate: Some(bitrate),
            } => write!(f, "{}@{}", height, bitrate),
            RenditionSelector::Level { height, bitrate: None } => write!(f, "{}", height),
        }
    }
}

impl Serialize for RenditionSelector {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RenditionSelector {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        RenditionSelector::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Playback state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackPhase {
    /// No session
    Uninitialized,
    /// Engine created, waiting for the manifest
    Loading,
    /// Manifest parsed, renditions known
    Ready,
    /// Host plays the manifest natively, no engine
    Native,
    /// Playing the progressive fallback for the rest of the session
    Degraded,
}

impl PlaybackPhase {
    /// Check if transition to target phase is valid
    pub fn can_transition_to(&self, target: PlaybackPhase) -> bool {
        use PlaybackPhase::*;
        matches!(
            (self, target),
            // From Uninitialized
            (Uninitialized, Loading) | (Uninitialized, Native) | (Uninitialized, Degraded) |
            // From Loading
            (Loading, Ready) | (Loading, Degraded) | (Loading, Uninitialized) |
            // From Ready
            (Ready, Ready) | (Ready, Degraded) | (Ready, Uninitialized) |
            // Terminal per media id, left only by close
            (Native, Uninitialized) |
            (Degraded, Uninitialized)
        )
    }
}

impl std::fmt::Display for PlaybackPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackPhase::Uninitialized => write!(f, "uninitialized"),
            PlaybackPhase::Loading => write!(f, "loading"),
            PlaybackPhase::Ready => write!(f, "ready"),
            PlaybackPhase::Native => write!(f, "native"),
            PlaybackPhase::Degraded => write!(f, "degraded"),
        }
    }
}

/// Engine error classes that drive recovery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineErrorKind {
    Network,
    Media,
    Other,
}

impl std::fmt::Display for EngineErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineErrorKind::Network => write!(f, "network"),
            EngineErrorKind::Media => write!(f, "media"),
            EngineErrorKind::Other => write!(f, "other"),
        }
    }
}

/// Error notification from the adaptive engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineError {
    pub fatal: bool,
    pub kind: EngineErrorKind,
    #[serde(default)]
    pub details: String,
}

impl EngineError {
    pub fn fatal(kind: EngineErrorKind, details: impl Into<String>) -> Self {
        Self {
            fatal: true,
            kind,
            details: details.into(),
        }
    }

    pub fn transient(kind: EngineErrorKind, details: impl Into<String>) -> Self {
        Self {
            fatal: false,
            kind,
            details: details.into(),
        }
    }
}

/// Playback state remembered per media id
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedPlaybackState {
    /// Last playback offset in seconds
    pub offset: Option<f64>,
    /// Last rendition choice
    pub rendition: Option<RenditionSelector>,
}

impl PersistedPlaybackState {
    /// Offset to resume from, 0 when nothing was saved
    pub fn resume_offset(&self) -> f64 {
        self.offset.unwrap_or(0.0)
    }

    /// Saved concrete rendition, `None` for Auto or nothing saved
    pub fn restorable_rendition(&self) -> Option<RenditionSelector> {
        self.rendition.filter(|r| !r.is_auto())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renditions_keep_manifest_order() {
        let levels = [
            LevelInfo::new(1080, 5_000_000),
            LevelInfo::new(480, 800_000),
            LevelInfo::new(720, 2_500_000),
        ];
        let renditions = renditions_from_levels(&levels);

        assert_eq!(renditions.len(), 4);
        assert!(renditions[0].is_auto());
        assert_eq!(renditions[0].label, "Auto");
        let heights: Vec<u32> = renditions[1..].iter().map(|r| r.height).collect();
        assert_eq!(heights, vec![1080, 480, 720]);
        assert_eq!(renditions[3].index, 2);
        assert_eq!(renditions[3].label, "720p");
    }

    #[test]
    fn test_empty_manifest_still_has_auto() {
        let renditions = renditions_from_levels(&[]);
        assert_eq!(renditions, vec![Rendition::auto()]);
    }

    #[test]
    fn test_repeated_height_labels_carry_bitrate() {
        let levels = [
            LevelInfo::new(720, 2_500_000),
            LevelInfo::new(720, 4_500_000),
            LevelInfo::new(0, 128_000),
            LevelInfo::new(1080, 5_000_000),
        ];
        let labels: Vec<String> = renditions_from_levels(&levels).into_iter().map(|r| r.label).collect();
        assert_eq!(labels, vec!["Auto", "720p (2500 kbps)", "720p (4500 kbps)", "128 kbps", "1080p"]);
    }

    #[test]
    fn test_selector_parse() {
        assert_eq!(RenditionSelector::parse("-1").unwrap(), RenditionSelector::Auto);
        assert_eq!(RenditionSelector::parse("Auto").unwrap(), RenditionSelector::Auto);
        assert_eq!(RenditionSelector::parse("720").unwrap(), RenditionSelector::height(720));
        assert_eq!(RenditionSelector::parse("1080p").unwrap(), RenditionSelector::height(1080));
        assert_eq!(
            RenditionSelector::parse("720@4500000").unwrap(),
            RenditionSelector::of(&LevelInfo::new(720, 4_500_000))
        );
        assert_eq!(
            RenditionSelector::parse("0@128000").unwrap(),
            RenditionSelector::of(&LevelInfo::new(0, 128_000))
        );
        assert!(RenditionSelector::parse("0").is_err());
        assert!(RenditionSelector::parse("hd").is_err());
        assert!(RenditionSelector::parse("720@fast").is_err());
    }

    #[test]
    fn test_selector_display_is_storage_format() {
        assert_eq!(RenditionSelector::Auto.to_string(), "-1");
        assert_eq!(RenditionSelector::height(480).to_string(), "480");
        assert_eq!(RenditionSelector::of(&LevelInfo::new(480, 800_000)).to_string(), "480@800000");
    }

    #[test]
    fn test_selector_level_index() {
        let levels = [LevelInfo::new(480, 1), LevelInfo::new(720, 2)];
        assert_eq!(RenditionSelector::Auto.level_index(&levels), Some(AUTO_LEVEL));
        assert_eq!(RenditionSelector::height(720).level_index(&levels), Some(1));
        assert_eq!(RenditionSelector::height(1080).level_index(&levels), None);
    }

    #[test]
    fn test_selector_level_index_prefers_exact_bitrate() {
        let levels = [
            LevelInfo::new(720, 2_500_000),
            LevelInfo::new(720, 4_500_000),
            LevelInfo::new(0, 128_000),
        ];
        let second = RenditionSelector::of(&levels[1]);
        assert_eq!(second.level_index(&levels), Some(1));
        assert_eq!(RenditionSelector::of(&levels[2]).level_index(&levels), Some(2));

        // Re-encoded ladder: same height, new bitrate
        let reencoded = [LevelInfo::new(480, 900_000), LevelInfo::new(720, 3_000_000)];
        assert_eq!(second.level_index(&reencoded), Some(1));
    }

    #[test]
    fn test_phase_transitions() {
        use PlaybackPhase::*;

        assert!(Uninitialized.can_transition_to(Loading));
        assert!(Loading.can_transition_to(Ready));
        assert!(Ready.can_transition_to(Ready));
        assert!(Ready.can_transition_to(Degraded));
        assert!(Ready.can_transition_to(Uninitialized));

        assert!(!Uninitialized.can_transition_to(Ready));
        assert!(!Degraded.can_transition_to(Ready));
        assert!(!Degraded.can_transition_to(Loading));
        assert!(!Native.can_transition_to(Degraded));
    }

    #[test]
    fn test_persisted_state_ignores_auto() {
        let state = PersistedPlaybackState {
            offset: Some(12.0),
            rendition: Some(RenditionSelector::Auto),
        };
        assert_eq!(state.restorable_rendition(), None);
        assert_eq!(state.resume_offset(), 12.0);
        assert_eq!(PersistedPlaybackState::default().resume_offset(), 0.0);
    }
}
