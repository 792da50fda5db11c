//! hls.js as the controller's adaptive engine

use crate::hls::{self, Hls};
use marquee_core::{AdaptiveEngine, EngineConfig, EngineEvent, EngineFactory, Error, Result, SessionId};
use serde::Serialize;
use std::rc::Rc;
use tracing::{debug, warn};
use url::Url;
use wasm_bindgen::prelude::*;
use web_sys::HtmlVideoElement;

/// Receives engine callbacks tagged with their session
pub type EventSink = Rc<dyn Fn(SessionId, EngineEvent)>;

type Listener = Closure<dyn FnMut(JsValue, JsValue)>;

/// Builds one hls.js instance per session against the page's video element
pub struct HlsEngineFactory {
    video: HtmlVideoElement,
    sink: EventSink,
}

impl HlsEngineFactory {
    pub fn new(video: HtmlVideoElement, sink: EventSink) -> Self {
        Self { video, sink }
    }
}

impl EngineFactory for HlsEngineFactory {
    type Engine = HlsEngine;

    fn is_supported(&self) -> bool {
        hls::is_supported()
    }

    fn create(&mut self, session: SessionId, config: &EngineConfig) -> Result<HlsEngine> {
        let options = config
            .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
            .map_err(|e| Error::EngineCreate(e.to_string()))?;
        let hls = Hls::new(&options).map_err(|e| Error::EngineCreate(format!("{:?}", e)))?;

        let listeners = hls::EVENTS
            .iter()
            .map(|&name| {
                let sink = Rc::clone(&self.sink);
                let listener: Listener = Closure::new(move |_event: JsValue, data: JsValue| {
                    match hls::to_engine_event(name, &data) {
                        Some(event) => sink(session, event),
                        None => warn!(event = name, "Unreadable hls.js event payload"),
                    }
                });
                hls.on(name, listener.as_ref().unchecked_ref());
                listener
            })
            .collect();

        debug!(session_id = %session, "hls.js instance created");
        Ok(HlsEngine {
            hls,
            video: self.video.clone(),
            listeners,
            destroyed: false,
        })
    }
}

/// One hls.js instance and the closures it calls back into
pub struct HlsEngine {
    hls: Hls,
    video: HtmlVideoElement,
    listeners: Vec<Listener>,
    destroyed: bool,
}

impl AdaptiveEngine for HlsEngine {
    fn load_source(&mut self, url: &Url) {
        self.hls.load_source(url.as_str());
    }

    fn attach_media(&mut self) {
        self.hls.attach_media(&self.video);
    }

    fn set_next_level(&mut self, level: i32) {
        self.hls.set_next_level(level);
    }

    fn start_load(&mut self) {
        self.hls.start_load();
    }

    fn recover_media_error(&mut self) {
        self.hls.recover_media_error();
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        // hls.js drops its listeners here, so the closures can go
        self.hls.destroy();
        self.listeners.clear();
    }
}

impl Drop for HlsEngine {
    fn drop(&mut self) {
        self.destroy();
    }
}
