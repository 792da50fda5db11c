//! Player box sizing

use serde::{Deserialize, Serialize};
use wasm_bindgen::prelude::*;

/// Widest the player is ever laid out
pub const MAX_PLAYER_WIDTH: f64 = 1200.0;

/// Pixel size of the player box
#[wasm_bindgen]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlayerDimensions {
    pub width: f64,
    pub height: f64,
}

/// 16:9 box filling `container_width`, capped at [`MAX_PLAYER_WIDTH`]
#[wasm_bindgen]
pub fn player_dimensions(container_width: f64) -> PlayerDimensions {
    let width = if container_width.is_finite() {
        container_width.clamp(0.0, MAX_PLAYER_WIDTH)
    } else {
        0.0
    };
    PlayerDimensions {
        width,
        height: width * 9.0 / 16.0,
    }
}
