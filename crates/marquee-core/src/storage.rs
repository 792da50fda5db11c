//! Session Store - per-media playback state over a key-value surface
//!
//! The surface is tab-scoped on the browser host. Faults on either side of
//! the surface are logged and swallowed: a failed write skips persistence
//! for that write, a failed read means "no prior state".

use crate::{
    asset::{quality_key, time_key},
    Error, MediaId, PersistedPlaybackState, RenditionSelector, Result,
};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, warn};

/// Key-value persistence surface
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
}

#[derive(Debug, Default)]
struct MemoryInner {
    entries: HashMap<String, String>,
    writes: Vec<(String, String)>,
    quota_bytes: Option<usize>,
    fail_reads: bool,
}

impl MemoryInner {
    fn used_bytes(&self) -> usize {
        self.entries.iter().map(|(k, v)| k.len() + v.len()).sum()
    }
}

/// In-memory store with a shared handle.
///
/// Clones see the same entries, which lets a test or the replay tool keep a
/// handle while the controller owns another. Supports a byte quota and a
/// read-failure switch to exercise the fault paths.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Rc<RefCell<MemoryInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with existing entries
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let store = Self::new();
        store.inner.borrow_mut().entries = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        store
    }

    /// Reject writes that would grow keys + values past `bytes`
    pub fn set_quota(&self, bytes: Option<usize>) {
        self.inner.borrow_mut().quota_bytes = bytes;
    }

    /// Make every read fail, as a disabled storage would
    pub fn set_fail_reads(&self, fail: bool) {
        self.inner.borrow_mut().fail_reads = fail;
    }

    /// Current value of `key`, bypassing the failure switches
    pub fn peek(&self, key: &str) -> Option<String> {
        self.inner.borrow().entries.get(key).cloned()
    }

    /// Successful writes in order
    pub fn writes(&self) -> Vec<(String, String)> {
        self.inner.borrow().writes.clone()
    }

    /// Successful writes to `key`
    pub fn writes_to(&self, key: &str) -> Vec<String> {
        self.inner
            .borrow()
            .writes
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .collect()
    }

    /// Snapshot of all entries
    pub fn entries(&self) -> HashMap<String, String> {
        self.inner.borrow().entries.clone()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let inner = self.inner.borrow();
        if inner.fail_reads {
            return Err(Error::StorageUnavailable("reads disabled".into()));
        }
        Ok(inner.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        if let Some(quota) = inner.quota_bytes {
            let existing = inner.entries.get(key).map(|v| key.len() + v.len()).unwrap_or(0);
            if inner.used_bytes() - existing + key.len() + value.len() > quota {
                return Err(Error::QuotaExceeded { key: key.to_string() });
            }
        }
        inner.entries.insert(key.to_string(), value.to_string());
        inner.writes.push((key.to_string(), value.to_string()));
        Ok(())
    }
}

/// Persists offset and rendition choice per media id
#[derive(Debug)]
pub struct SessionStore<S> {
    backend: S,
}

impl<S: KeyValueStore> SessionStore<S> {
    pub fn new(backend: S) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &S {
        &self.backend
    }

    /// Persist the playback offset. Returns whether the write landed.
    pub fn save_offset(&mut self, id: &MediaId, offset: f64) -> bool {
        if !offset.is_finite() || offset < 0.0 {
            warn!(media_id = %id, offset, "Refusing to persist invalid offset");
            return false;
        }
        self.write(&time_key(id), &offset.to_string())
    }

    /// Persist the rendition choice. Returns whether the write landed.
    pub fn save_rendition(&mut self, id: &MediaId, selector: RenditionSelector) -> bool {
        self.write(&quality_key(id), &selector.to_string())
    }

    /// Read prior state; unreadable or malformed fields come back absent
    pub fn load(&self, id: &MediaId) -> PersistedPlaybackState {
        let offset = self.read(&time_key(id)).and_then(|raw| match raw.trim().parse::<f64>() {
            Ok(v) if v.is_finite() && v >= 0.0 => Some(v),
            _ => {
                warn!(media_id = %id, value = %raw, "Ignoring malformed saved offset");
                None
            }
        });

        let rendition = self
            .read(&quality_key(id))
            .and_then(|raw| match RenditionSelector::parse(&raw) {
                Ok(selector) => Some(selector),
                Err(e) => {
                    warn!(media_id = %id, error = %e, "Ignoring malformed saved quality");
                    None
                }
            });

        PersistedPlaybackState { offset, rendition }
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.backend.get(key) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, code = e.error_code(), "Could not read saved playback state");
                None
            }
        }
    }

    fn write(&mut self, key: &str, value: &str) -> bool {
        match self.backend.set(key, value) {
            Ok(()) => {
                debug!(key, value, "Persisted playback state");
                true
            }
            Err(e) => {
                warn!(key, error = %e, code = e.error_code(), "Could not persist playback state");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LevelInfo;

    #[test]
    fn test_load_without_prior_state() {
        let store = SessionStore::new(MemoryStore::new());
        let state = store.load(&MediaId::from(42u64));
        assert_eq!(state, PersistedPlaybackState::default());
    }

    #[test]
    fn test_save_and_load() {
        let mut store = SessionStore::new(MemoryStore::new());
        let id = MediaId::from(42u64);

        assert!(store.save_offset(&id, 137.5));
        let level = LevelInfo::new(720, 4_500_000);
        assert!(store.save_rendition(&id, RenditionSelector::of(&level)));

        let state = store.load(&id);
        assert_eq!(state.offset, Some(137.5));
        assert_eq!(state.rendition, Some(RenditionSelector::of(&level)));
        assert_eq!(store.backend().peek("movie_42_quality").as_deref(), Some("720@4500000"));
    }

    #[test]
    fn test_bare_height_still_loads() {
        let store = SessionStore::new(MemoryStore::with_entries([("movie_42_quality", "720")]));
        assert_eq!(
            store.load(&MediaId::from(42u64)).rendition,
            Some(RenditionSelector::height(720))
        );
    }

    #[test]
    fn test_auto_is_stored_as_sentinel() {
        let mut store = SessionStore::new(MemoryStore::new());
        let id = MediaId::from("x");
        store.save_rendition(&id, RenditionSelector::Auto);
        assert_eq!(store.backend().peek("movie_x_quality").as_deref(), Some("-1"));
        assert_eq!(store.load(&id).rendition, Some(RenditionSelector::Auto));
    }

    #[test]
    fn test_quota_exceeded_is_swallowed() {
        let backend = MemoryStore::new();
        backend.set_quota(Some(8));
        let mut store = SessionStore::new(backend.clone());

        assert!(!store.save_offset(&MediaId::from(42u64), 10.0));
        assert!(backend.writes().is_empty());
    }

    #[test]
    fn test_overwrite_fits_quota() {
        let backend = MemoryStore::new();
        let mut store = SessionStore::new(backend.clone());
        let id = MediaId::from(1u64);
        assert!(store.save_offset(&id, 10.0));

        backend.set_quota(Some("movie_1_time".len() + 4));
        assert!(store.save_offset(&id, 12.0));
        assert!(!store.save_offset(&id, 12345.5));
        assert_eq!(backend.peek("movie_1_time").as_deref(), Some("12"));
    }

    #[test]
    fn test_read_failure_means_no_state() {
        let backend = MemoryStore::with_entries([("movie_5_time", "30")]);
        backend.set_fail_reads(true);
        let store = SessionStore::new(backend);
        assert_eq!(store.load(&MediaId::from(5u64)), PersistedPlaybackState::default());
    }

    #[test]
    fn test_malformed_values_read_absent() {
        let backend = MemoryStore::with_entries([
            ("movie_5_time", "NaN"),
            ("movie_5_quality", "best"),
        ]);
        let store = SessionStore::new(backend);
        assert_eq!(store.load(&MediaId::from(5u64)), PersistedPlaybackState::default());

        let backend = MemoryStore::with_entries([("movie_6_time", "-3")]);
        let store = SessionStore::new(backend);
        assert_eq!(store.load(&MediaId::from(6u64)).offset, None);
    }

    #[test]
    fn test_invalid_offset_not_written() {
        let backend = MemoryStore::new();
        let mut store = SessionStore::new(backend.clone());
        assert!(!store.save_offset(&MediaId::from(1u64), f64::INFINITY));
        assert!(backend.writes().is_empty());
    }
}
