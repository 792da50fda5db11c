//! Media asset resolution
//!
//! Maps a catalog id onto its adaptive manifest and progressive fallback
//! URLs, and onto the storage keys its playback state lives under.

use crate::{config::SourceLayout, Error, MediaAsset, MediaId, Result};
use url::Url;

/// Storage key holding the last playback offset of a media id
pub fn time_key(id: &MediaId) -> String {
    format!("movie_{}_time", id)
}

/// Storage key holding the last rendition choice of a media id
pub fn quality_key(id: &MediaId) -> String {
    format!("movie_{}_quality", id)
}

/// Resolves media ids against an API base URL
#[derive(Debug, Clone)]
pub struct MediaResolver {
    base: Url,
    layout: SourceLayout,
}

impl MediaResolver {
    /// Create a resolver for `base`, e.g. `https://host/api/getfile`
    pub fn new(base: &str, layout: SourceLayout) -> Result<Self> {
        let base = Url::parse(base)?;
        if base.cannot_be_a_base() {
            return Err(Error::InvalidBaseUrl(base.to_string()));
        }
        Ok(Self { base, layout })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Build the playable sources for `id`
    pub fn resolve(&self, id: &MediaId) -> Result<MediaAsset> {
        Ok(MediaAsset {
            id: id.clone(),
            manifest_url: self.source_url(id, &self.layout.manifest)?,
            fallback_url: self.source_url(id, &self.layout.fallback)?,
        })
    }

    fn source_url(&self, id: &MediaId, tail: &[String]) -> Result<Url> {
        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| Error::InvalidBaseUrl(self.base.to_string()))?;
            segments.pop_if_empty();
            segments.push("movies");
            segments.push(id.as_str());
            segments.extend(tail.iter().map(String::as_str));
        }
        Ok(url)
    }
}
