//! Quality Selector binder
//!
//! Presentation-facing view of the rendition ladder and the active choice.
//! Empty until the first manifest parse; a picker renders nothing then.
//! Picker values are engine level indices of the current manifest load.

use crate::{renditions_from_levels, Error, LevelInfo, Rendition, RenditionSelector, Result, AUTO_LEVEL};
use serde::{Deserialize, Serialize};

/// One `<option>` of a quality picker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityOption {
    /// Value to hand back on pick (`-1` or a level index)
    pub value: String,
    pub label: String,
    pub selected: bool,
}

/// Rendition list and active level, as published to observers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualitySnapshot {
    pub renditions: Vec<Rendition>,
    pub active: i32,
}

impl Default for QualitySnapshot {
    fn default() -> Self {
        Self {
            renditions: Vec::new(),
            active: AUTO_LEVEL,
        }
    }
}

#[derive(Debug)]
pub struct QualitySelector {
    renditions: Vec<Rendition>,
    active: i32,
}

impl Default for QualitySelector {
    fn default() -> Self {
        Self {
            renditions: Vec::new(),
            active: AUTO_LEVEL,
        }
    }
}

impl QualitySelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the ladder wholesale for a new manifest load
    pub fn set_levels(&mut self, levels: &[LevelInfo]) {
        self.renditions = renditions_from_levels(levels);
        self.active = AUTO_LEVEL;
    }

    pub fn set_active(&mut self, level: i32) {
        self.active = level;
    }

    /// Forget everything (new session, or no engine left to act on picks)
    pub fn clear(&mut self) {
        self.renditions.clear();
        self.active = AUTO_LEVEL;
    }

    /// Drop the ladder but keep the active level
    pub fn clear_renditions(&mut self) {
        self.renditions.clear();
    }

    pub fn renditions(&self) -> &[Rendition] {
        &self.renditions
    }

    /// Active engine level, `AUTO_LEVEL` for Auto
    pub fn active(&self) -> i32 {
        self.active
    }

    pub fn active_rendition(&self) -> Option<&Rendition> {
        self.renditions.iter().find(|r| r.index == self.active)
    }

    /// Persistable identity of the active level
    pub fn active_selector(&self) -> RenditionSelector {
        self.active_rendition()
            .map(Rendition::selector)
            .unwrap_or(RenditionSelector::Auto)
    }

    pub fn is_empty(&self) -> bool {
        self.renditions.is_empty()
    }

    /// Resolve a picker value to a level of the current ladder
    pub fn pick(&self, value: &str) -> Result<i32> {
        let trimmed = value.trim();
        let level = if trimmed.eq_ignore_ascii_case("auto") {
            AUTO_LEVEL
        } else {
            trimmed
                .parse::<i32>()
                .map_err(|_| Error::InvalidSelector(value.to_string()))?
        };
        if self.renditions.iter().any(|r| r.index == level) {
            Ok(level)
        } else {
            Err(Error::RenditionUnavailable(value.to_string()))
        }
    }

    /// Picker options, in ladder order
    pub fn view(&self) -> Vec<QualityOption> {
        self.renditions
            .iter()
            .map(|r| QualityOption {
                value: r.index.to_string(),
                label: r.label.clone(),
                selected: r.index == self.active,
            })
            .collect()
    }

    pub fn snapshot(&self) -> QualitySnapshot {
        QualitySnapshot {
            renditions: self.renditions.clone(),
            active: self.active,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ladder() -> Vec<LevelInfo> {
        vec![
            LevelInfo::new(720, 2_500_000),
            LevelInfo::new(720, 4_500_000),
            LevelInfo::new(0, 128_000),
        ]
    }

    #[test]
    fn test_empty_before_manifest() {
        let selector = QualitySelector::new();
        assert!(selector.is_empty());
        assert!(selector.view().is_empty());
        assert_eq!(selector.active(), AUTO_LEVEL);
        assert_eq!(selector.active_selector(), RenditionSelector::Auto);
        assert!(matches!(selector.pick("-1"), Err(Error::RenditionUnavailable(_))));
    }

    #[test]
    fn test_view_marks_active() {
        let mut selector = QualitySelector::new();
        selector.set_levels(&[LevelInfo::new(480, 1), LevelInfo::new(720, 2), LevelInfo::new(1080, 3)]);
        selector.set_active(1);

        let view = selector.view();
        assert_eq!(view.len(), 4);
        assert_eq!(view[0].value, "-1");
        assert_eq!(view[0].label, "Auto");
        assert!(!view[0].selected);
        assert_eq!(view[2].value, "1");
        assert_eq!(view[2].label, "720p");
        assert!(view[2].selected);
    }

    #[test]
    fn test_repeated_height_selects_one_option() {
        let mut selector = QualitySelector::new();
        selector.set_levels(&ladder());
        selector.set_active(1);

        let view = selector.view();
        let values: Vec<&str> = view.iter().map(|o| o.value.as_str()).collect();
        assert_eq!(values, vec!["-1", "0", "1", "2"]);
        let selected: Vec<&str> = view.iter().filter(|o| o.selected).map(|o| o.value.as_str()).collect();
        assert_eq!(selected, vec!["1"]);
        assert_eq!(selector.active_selector(), RenditionSelector::of(&LevelInfo::new(720, 4_500_000)));
    }

    #[test]
    fn test_every_option_can_be_picked() {
        let mut selector = QualitySelector::new();
        selector.set_levels(&ladder());
        let picked: Vec<i32> = selector
            .view()
            .iter()
            .map(|o| selector.pick(&o.value).unwrap())
            .collect();
        assert_eq!(picked, vec![-1, 0, 1, 2]);
    }

    #[test]
    fn test_set_levels_replaces_wholesale() {
        let mut selector = QualitySelector::new();
        selector.set_levels(&[LevelInfo::new(480, 1), LevelInfo::new(720, 2)]);
        selector.set_active(1);
        selector.set_levels(&[LevelInfo::new(360, 1)]);
        let heights: Vec<u32> = selector.renditions().iter().map(|r| r.height).collect();
        assert_eq!(heights, vec![0, 360]);
        assert_eq!(selector.active(), AUTO_LEVEL);
    }

    #[test]
    fn test_pick_rejects_unknown_values() {
        let mut selector = QualitySelector::new();
        selector.set_levels(&ladder());
        assert_eq!(selector.pick("auto").unwrap(), AUTO_LEVEL);
        assert!(matches!(selector.pick("3"), Err(Error::RenditionUnavailable(_))));
        assert!(matches!(selector.pick("720p"), Err(Error::InvalidSelector(_))));
        assert!(matches!(selector.pick(""), Err(Error::InvalidSelector(_))));
    }
}
