//! hls.js bindings
//!
//! Expects the `Hls` global from the hls.js bundle. Event payloads are read
//! field by field so that extra or missing properties never abort a callback.

use js_sys::{Array, Function, Reflect};
use marquee_core::{EngineError, EngineErrorKind, EngineEvent, LevelInfo};
use wasm_bindgen::prelude::*;
use web_sys::HtmlMediaElement;

pub const MANIFEST_PARSED: &str = "hlsManifestParsed";
pub const LEVEL_SWITCHED: &str = "hlsLevelSwitched";
pub const MEDIA_ATTACHED: &str = "hlsMediaAttached";
pub const ERROR: &str = "hlsError";

/// Events the controller listens to
pub const EVENTS: [&str; 4] = [MANIFEST_PARSED, LEVEL_SWITCHED, MEDIA_ATTACHED, ERROR];

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_name = Hls)]
    pub type Hls;

    #[wasm_bindgen(catch, static_method_of = Hls, js_name = isSupported)]
    fn is_supported_raw() -> Result<bool, JsValue>;

    #[wasm_bindgen(catch, constructor)]
    pub fn new(config: &JsValue) -> Result<Hls, JsValue>;

    #[wasm_bindgen(method, js_name = loadSource)]
    pub fn load_source(this: &Hls, url: &str);

    #[wasm_bindgen(method, js_name = attachMedia)]
    pub fn attach_media(this: &Hls, media: &HtmlMediaElement);

    #[wasm_bindgen(method, setter = nextLevel)]
    pub fn set_next_level(this: &Hls, level: i32);

    #[wasm_bindgen(method, js_name = startLoad)]
    pub fn start_load(this: &Hls);

    #[wasm_bindgen(method, js_name = recoverMediaError)]
    pub fn recover_media_error(this: &Hls);

    #[wasm_bindgen(method)]
    pub fn destroy(this: &Hls);

    #[wasm_bindgen(method)]
    pub fn on(this: &Hls, event: &str, listener: &Function);
}

/// Whether hls.js is loaded and Media Source Extensions are available
pub fn is_supported() -> bool {
    Hls::is_supported_raw().unwrap_or(false)
}

/// Map an hls.js error type onto the recovery class
pub fn error_kind(error_type: &str) -> EngineErrorKind {
    match error_type {
        "networkError" => EngineErrorKind::Network,
        "mediaError" => EngineErrorKind::Media,
        _ => EngineErrorKind::Other,
    }
}

/// Convert an hls.js callback into an engine event
pub fn to_engine_event(event: &str, data: &JsValue) -> Option<EngineEvent> {
    match event {
        MANIFEST_PARSED => Some(EngineEvent::ManifestParsed { levels: levels(data) }),
        LEVEL_SWITCHED => number(data, "level").map(|level| EngineEvent::LevelSwitched { level: level as i32 }),
        MEDIA_ATTACHED => Some(EngineEvent::MediaAttached),
        ERROR => Some(EngineEvent::Error(engine_error(data))),
        _ => None,
    }
}

fn field(data: &JsValue, name: &str) -> JsValue {
    Reflect::get(data, &JsValue::from_str(name)).unwrap_or(JsValue::UNDEFINED)
}

fn number(data: &JsValue, name: &str) -> Option<f64> {
    field(data, name).as_f64()
}

fn levels(data: &JsValue) -> Vec<LevelInfo> {
    let levels = field(data, "levels");
    if !Array::is_array(&levels) {
        return Vec::new();
    }
    Array::from(&levels)
        .iter()
        .map(|level| {
            LevelInfo::new(
                number(&level, "height").unwrap_or(0.0) as u32,
                number(&level, "bitrate").unwrap_or(0.0) as u64,
            )
        })
        .collect()
}

fn engine_error(data: &JsValue) -> EngineError {
    let fatal = field(data, "fatal").as_bool().unwrap_or(false);
    let kind = field(data, "type").as_string().map(|t| error_kind(&t)).unwrap_or(EngineErrorKind::Other);
    let details = field(data, "details").as_string().unwrap_or_default();
    EngineError { fatal, kind, details }
}
