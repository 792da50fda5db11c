//! `sessionStorage` as the controller's key-value surface
//!
//! Tab-scoped: survives reloads, not new tabs. Browsers may refuse access
//! (privacy modes, sandboxed frames); the store then reports every call as
//! unavailable and the controller carries on without persistence.

use marquee_core::{Error, KeyValueStore, Result};
use wasm_bindgen::{JsCast, JsValue};
use web_sys::Storage;

pub struct BrowserSessionStorage {
    storage: Option<Storage>,
}

impl BrowserSessionStorage {
    pub fn new() -> Self {
        let storage = web_sys::window().and_then(|w| w.session_storage().ok().flatten());
        if storage.is_none() {
            tracing::warn!("sessionStorage unavailable, playback state will not persist");
        }
        Self { storage }
    }

    fn storage(&self) -> Result<&Storage> {
        self.storage
            .as_ref()
            .ok_or_else(|| Error::StorageUnavailable("sessionStorage".into()))
    }
}

impl Default for BrowserSessionStorage {
    fn default() -> Self {
        Self::new()
    }
}

fn describe(err: &JsValue) -> String {
    match err.dyn_ref::<js_sys::Error>() {
        Some(e) => format!("{}: {}", String::from(e.name()), String::from(e.message())),
        None => err.as_string().unwrap_or_else(|| format!("{:?}", err)),
    }
}

impl KeyValueStore for BrowserSessionStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.storage()?.get_item(key).map_err(|e| Error::StorageRead {
            key: key.to_string(),
            reason: describe(&e),
        })
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.storage()?.set_item(key, value).map_err(|e| {
            let reason = describe(&e);
            if reason.contains("QuotaExceeded") {
                Error::QuotaExceeded { key: key.to_string() }
            } else {
                Error::storage_write(key, reason)
            }
        })
    }
}
