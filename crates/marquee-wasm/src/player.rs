//! Mountable player widget
//!
//! Wires the page's video element, document and window events into a
//! [`SourceController`] and keeps one `setTimeout` armed for the
//! controller's next deadline.
//!
//! hls.js may call back synchronously from inside a controller call (for
//! example while being destroyed). Such callbacks are queued and drained by
//! the call already holding the controller, so the controller is never
//! entered twice.

use crate::{
    engine::{EventSink, HlsEngineFactory},
    layout::{player_dimensions, PlayerDimensions},
    media::VideoElement,
    storage::BrowserSessionStorage,
};
use js_sys::Function;
use marquee_core::{
    EngineEvent, MediaAsset, MediaId, MediaResolver, PlayerConfig, QualitySnapshot, SessionId,
    SourceController,
};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt::Display;
use std::rc::{Rc, Weak};
use tracing::{debug, info, warn};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Event, EventTarget, HtmlVideoElement};
use web_time::Instant;

type Controller = SourceController<HlsEngineFactory, VideoElement, BrowserSessionStorage>;

fn js_error(message: impl Display) -> JsValue {
    JsValue::from_str(&message.to_string())
}

fn core_error(err: marquee_core::Error) -> JsValue {
    js_error(format!("{}: {}", err.error_code(), err))
}

/// Work for the controller, applied in arrival order
enum Action {
    Open(MediaAsset),
    Unmount,
    Engine(SessionId, EngineEvent),
    TimeUpdate,
    Pause,
    Seeking,
    PageHidden,
    PageVisible,
    FullscreenChange,
    Flush,
    Timers,
}

impl Action {
    fn apply(self, controller: &mut Controller) {
        let now = Instant::now();
        match self {
            Action::Open(asset) => {
                controller.open(asset);
            }
            Action::Unmount => controller.unmount(),
            Action::Engine(session, event) => controller.handle_engine_event(session, event, now),
            Action::TimeUpdate => controller.on_time_update(),
            Action::Pause => controller.on_pause(),
            Action::Seeking => controller.on_seeking(),
            Action::PageHidden => controller.on_page_hidden(),
            Action::PageVisible => controller.on_page_visible(now),
            Action::FullscreenChange => controller.on_fullscreen_change(now),
            Action::Flush => controller.flush_position(),
            Action::Timers => controller.poll_timers(now),
        }
    }
}

struct Shared {
    controller: RefCell<Controller>,
    queue: RefCell<VecDeque<Action>>,
    busy: Cell<bool>,
    /// Reused for every `setTimeout`
    timer: RefCell<Option<Closure<dyn FnMut()>>>,
    /// Armed timeout handle and the deadline it targets
    timeout: Cell<Option<(i32, Instant)>>,
    published: RefCell<QualitySnapshot>,
    on_quality_change: RefCell<Option<Function>>,
}

impl Shared {
    /// Run `f` on the controller, then drain queued work. `None` if the
    /// controller is already in use further up the stack.
    fn run<R>(self: &Rc<Self>, f: impl FnOnce(&mut Controller) -> R) -> Option<R> {
        if self.busy.replace(true) {
            return None;
        }
        let result = f(&mut self.controller.borrow_mut());
        loop {
            let next = self.queue.borrow_mut().pop_front();
            match next {
                Some(action) => action.apply(&mut self.controller.borrow_mut()),
                None => break,
            }
        }
        self.busy.set(false);

        self.rearm_timer();
        self.publish_quality();
        Some(result)
    }

    fn dispatch(self: &Rc<Self>, action: Action) {
        if self.busy.get() {
            self.queue.borrow_mut().push_back(action);
            return;
        }
        self.run(move |controller| action.apply(controller));
    }

    fn rearm_timer(&self) {
        let deadline = self.controller.borrow().next_deadline();
        let armed = self.timeout.get();
        if armed.map(|(_, at)| at) == deadline {
            return;
        }
        let Some(window) = web_sys::window() else {
            return;
        };
        if let Some((handle, _)) = armed {
            window.clear_timeout_with_handle(handle);
        }
        self.timeout.set(None);

        let Some(deadline) = deadline else {
            return;
        };
        let delay = deadline
            .saturating_duration_since(Instant::now())
            .as_micros()
            .div_ceil(1000)
            .min(i32::MAX as u128) as i32;
        if let Some(timer) = self.timer.borrow().as_ref() {
            match window.set_timeout_with_callback_and_timeout_and_arguments_0(timer.as_ref().unchecked_ref(), delay) {
                Ok(handle) => self.timeout.set(Some((handle, deadline))),
                Err(e) => warn!(error = ?e, "Could not arm player timer"),
            }
        }
    }

    fn disarm_timer(&self) {
        if let (Some((handle, _)), Some(window)) = (self.timeout.take(), web_sys::window()) {
            window.clear_timeout_with_handle(handle);
        }
    }

    fn publish_quality(&self) {
        let snapshot = self.controller.borrow().quality().snapshot();
        if *self.published.borrow() == snapshot {
            return;
        }
        *self.published.borrow_mut() = snapshot;

        let callback = self.on_quality_change.borrow().clone();
        if let Some(callback) = callback {
            let options = self.controller.borrow().quality().view();
            match serde_wasm_bindgen::to_value(&options) {
                Ok(value) => {
                    if let Err(e) = callback.call1(&JsValue::NULL, &value) {
                        warn!(error = ?e, "Quality change callback threw");
                    }
                }
                Err(e) => warn!(error = %e, "Could not serialize quality options"),
            }
        }
    }
}

/// DOM listener kept alive for the lifetime of the widget
struct DomListener {
    target: EventTarget,
    event: &'static str,
    callback: Closure<dyn FnMut(Event)>,
}

impl DomListener {
    fn attach(target: EventTarget, event: &'static str, callback: Closure<dyn FnMut(Event)>) -> Result<Self, JsValue> {
        target.add_event_listener_with_callback(event, callback.as_ref().unchecked_ref())?;
        Ok(Self {
            target,
            event,
            callback,
        })
    }

    fn detach(&self) {
        let _ = self
            .target
            .remove_event_listener_with_callback(self.event, self.callback.as_ref().unchecked_ref());
    }
}

fn forward(shared: &Weak<Shared>, action: impl Fn() -> Action + 'static) -> Closure<dyn FnMut(Event)> {
    let shared = shared.clone();
    Closure::new(move |_event: Event| {
        if let Some(shared) = shared.upgrade() {
            shared.dispatch(action());
        }
    })
}

/// Resumable adaptive player bound to one `<video>` element
#[wasm_bindgen]
pub struct MarqueePlayer {
    shared: Rc<Shared>,
    resolver: MediaResolver,
    video: HtmlVideoElement,
    listeners: Vec<DomListener>,
}

#[wasm_bindgen]
impl MarqueePlayer {
    /// Create a player for `video`, resolving media ids against `base_url`
    #[wasm_bindgen(constructor)]
    pub fn new(video: HtmlVideoElement, base_url: &str, config_json: Option<String>) -> Result<MarqueePlayer, JsValue> {
        let config = match config_json.as_deref() {
            Some(json) => PlayerConfig::from_json_str(json).map_err(core_error)?,
            None => PlayerConfig::default(),
        };
        let resolver = MediaResolver::new(base_url, config.sources.clone()).map_err(core_error)?;

        let shared = Rc::new_cyclic(|weak: &Weak<Shared>| {
            let events = weak.clone();
            let sink: EventSink = Rc::new(move |session, event| {
                if let Some(shared) = events.upgrade() {
                    shared.dispatch(Action::Engine(session, event));
                }
            });

            let fire = weak.clone();
            let timer = Closure::<dyn FnMut()>::new(move || {
                if let Some(shared) = fire.upgrade() {
                    shared.timeout.set(None);
                    shared.dispatch(Action::Timers);
                }
            });

            let controller = SourceController::new(
                config,
                HlsEngineFactory::new(video.clone(), sink),
                VideoElement::new(video.clone()),
                BrowserSessionStorage::new(),
            );

            Shared {
                controller: RefCell::new(controller),
                queue: RefCell::new(VecDeque::new()),
                busy: Cell::new(false),
                timer: RefCell::new(Some(timer)),
                timeout: Cell::new(None),
                published: RefCell::new(QualitySnapshot::default()),
                on_quality_change: RefCell::new(None),
            }
        });

        let listeners = Self::wire(&shared, &video)?;
        info!(base = %resolver.base(), "Marquee player created");

        Ok(MarqueePlayer {
            shared,
            resolver,
            video,
            listeners,
        })
    }

    fn wire(shared: &Rc<Shared>, video: &HtmlVideoElement) -> Result<Vec<DomListener>, JsValue> {
        let weak = Rc::downgrade(shared);
        let window = web_sys::window().ok_or_else(|| js_error("no window"))?;
        let document = window.document().ok_or_else(|| js_error("no document"))?;
        let video_target: EventTarget = video.clone().into();

        let visibility = {
            let document = document.clone();
            forward(&weak, move || {
                if document.hidden() {
                    Action::PageHidden
                } else {
                    Action::PageVisible
                }
            })
        };

        Ok(vec![
            DomListener::attach(video_target.clone(), "timeupdate", forward(&weak, || Action::TimeUpdate))?,
            DomListener::attach(video_target.clone(), "pause", forward(&weak, || Action::Pause))?,
            DomListener::attach(video_target, "seeking", forward(&weak, || Action::Seeking))?,
            DomListener::attach(document.clone().into(), "visibilitychange", visibility)?,
            DomListener::attach(document.into(), "fullscreenchange", forward(&weak, || Action::FullscreenChange))?,
            DomListener::attach(window.into(), "beforeunload", forward(&weak, || Action::Flush))?,
        ])
    }

    /// Start playback of `media_id`, replacing whatever is playing
    pub fn mount(&self, media_id: &str) -> Result<(), JsValue> {
        let id = MediaId::from(media_id.trim());
        if id.as_str().is_empty() {
            return Err(js_error("media id is empty"));
        }
        let asset = self.resolver.resolve(&id).map_err(core_error)?;
        debug!(media_id = %id, manifest = %asset.manifest_url, "Mounting");
        self.shared.dispatch(Action::Open(asset));
        Ok(())
    }

    /// Persist the position and release the engine
    pub fn unmount(&self) {
        self.shared.dispatch(Action::Unmount);
    }

    /// Picker options as `[{ value, label, selected }]`, empty before the manifest loads
    pub fn quality_options(&self) -> Result<JsValue, JsValue> {
        let options = self.shared.controller.borrow().quality().view();
        serde_wasm_bindgen::to_value(&options).map_err(js_error)
    }

    /// Value of the selected picker option: `-1` for Auto, otherwise a level index
    pub fn active_quality(&self) -> String {
        self.shared.controller.borrow().quality().active().to_string()
    }

    /// Apply a picker option's value as the viewer's choice
    pub fn select_quality(&self, value: &str) -> Result<(), JsValue> {
        self.shared
            .run(|controller| controller.select_quality(value))
            .ok_or_else(|| js_error("player busy"))?
            .map_err(core_error)
    }

    /// Called with the picker options whenever they change
    pub fn on_quality_change(&self, callback: Option<Function>) {
        *self.shared.on_quality_change.borrow_mut() = callback;
    }

    pub fn phase(&self) -> String {
        self.shared.controller.borrow().phase().to_string()
    }

    /// Size the video for a container `container_width` pixels wide
    pub fn resize(&self, container_width: f64) -> PlayerDimensions {
        let dims = player_dimensions(container_width);
        self.video.set_width(dims.width.round() as u32);
        self.video.set_height(dims.height.round() as u32);
        dims
    }
}

impl Drop for MarqueePlayer {
    fn drop(&mut self) {
        for listener in &self.listeners {
            listener.detach();
        }
        self.shared.dispatch(Action::Unmount);
        self.shared.disarm_timer();
        self.shared.timer.borrow_mut().take();
    }
}
