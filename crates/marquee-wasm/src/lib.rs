//! Marquee WASM - browser player widget
//!
//! Binds the Marquee playback core to the page:
//! - hls.js as the adaptive engine
//! - the `<video>` element for direct and fallback playback
//! - `sessionStorage` for per-tab resume state
//! - DOM events for progress, pause, seek, visibility and fullscreen
//!
//! ## Usage
//!
//! ```javascript
//! import init, { MarqueePlayer, player_dimensions } from '@marquee/wasm';
//!
//! await init();
//! const player = new MarqueePlayer(videoEl, 'https://api.example.com/api/getfile');
//! player.on_quality_change((options) => renderPicker(options));
//! player.resize(container.offsetWidth);
//! player.mount('42');
//! ```
//!
//! hls.js must be loaded first so that the `Hls` global exists; without it
//! the widget falls back to native or progressive playback.

use wasm_bindgen::prelude::*;

mod engine;
mod hls;
mod layout;
mod media;
mod player;
mod storage;

pub use engine::{HlsEngine, HlsEngineFactory};
pub use layout::{player_dimensions, PlayerDimensions, MAX_PLAYER_WIDTH};
pub use media::VideoElement;
pub use player::MarqueePlayer;
pub use storage::BrowserSessionStorage;

/// Initialize the WASM module
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
    tracing_wasm::set_as_global_default();
    marquee_core::init();
}

/// Library version
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
