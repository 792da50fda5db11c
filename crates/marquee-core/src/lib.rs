//! Marquee Core - resumable adaptive playback for the Marquee catalog
//!
//! This crate provides the player-side logic behind a movie page:
//! - source resolution for a catalog media id
//! - adaptive engine lifecycle with native and progressive fallbacks
//! - quality ladder presentation and user selection
//! - per-media position and quality persistence
//! - recovery and degradation on engine errors
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Marquee Core                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐           │
//! │  │    Media     │  │   Quality    │  │    Timer     │           │
//! │  │   Resolver   │  │   Selector   │  │    Queue     │           │
//! │  └──────┬───────┘  └──────┬───────┘  └──────┬───────┘           │
//! │         │                 │                 │                   │
//! │         └─────────────────┼─────────────────┘                   │
//! │                           │                                     │
//! │                    ┌──────┴──────┐                              │
//! │                    │   Source    │                              │
//! │                    │ Controller  │                              │
//! │                    └──────┬──────┘                              │
//! │                           │                                     │
//! │  ┌──────────────┐  ┌──────┴──────┐  ┌──────────────┐           │
//! │  │   Session    │  │  Playback   │  │   Adaptive   │           │
//! │  │    Store     │  │   Session   │  │    Engine    │           │
//! │  └──────────────┘  └─────────────┘  └──────────────┘           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The controller is synchronous and single-threaded. Browser hosts drive it
//! from their event loop; native hosts can wrap it in
//! [`runtime::PlayerRuntime`] (feature `runtime`).

pub mod asset;
pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod mock;
pub mod quality;
pub mod session;
pub mod storage;
pub mod timer;
pub mod types;

#[cfg(feature = "runtime")]
pub mod runtime;

pub use asset::{quality_key, time_key, MediaResolver};
pub use config::{EngineConfig, PlayerConfig, SourceLayout, TimingConfig};
pub use controller::SourceController;
pub use engine::{AdaptiveEngine, EngineEvent, EngineFactory, MediaElement};
pub use error::{Error, Result};
pub use quality::{QualityOption, QualitySelector, QualitySnapshot};
pub use session::PlaybackSession;
pub use storage::{KeyValueStore, MemoryStore, SessionStore};
pub use types::*;

#[cfg(feature = "runtime")]
pub use runtime::{PlayerHandle, PlayerRuntime};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the player library with default configuration
pub fn init() {
    tracing::info!(version = VERSION, "Marquee Core initialized");
}
