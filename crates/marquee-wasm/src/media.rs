//! The page's `<video>` element as the controller's media element

use marquee_core::MediaElement;
use url::Url;
use web_sys::HtmlVideoElement;

/// MIME type checked for native manifest playback
pub const MANIFEST_MIME: &str = "application/vnd.apple.mpegurl";

#[derive(Clone)]
pub struct VideoElement {
    video: HtmlVideoElement,
}

impl VideoElement {
    pub fn new(video: HtmlVideoElement) -> Self {
        Self { video }
    }
}

impl MediaElement for VideoElement {
    fn current_time(&self) -> f64 {
        self.video.current_time()
    }

    fn seek(&mut self, seconds: f64) {
        self.video.set_current_time(seconds);
    }

    fn set_source(&mut self, url: &Url) {
        self.video.set_src(url.as_str());
    }

    fn can_play_manifest(&self) -> bool {
        !self.video.can_play_type(MANIFEST_MIME).is_empty()
    }
}
