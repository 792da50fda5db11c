//! CLI command implementations

use crate::output::{emit, to_json, OutputFormat};
use crate::replay::{self, Observation, ReplayReport, ReplayScript};
use anyhow::Context;
use marquee_core::{
    quality_key, renditions_from_levels, time_key, LevelInfo, MediaId, MediaResolver, PlayerConfig, Rendition,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tabled::{settings::Style, Table, Tabled};
use tracing::{debug, info, warn};
use url::Url;

fn load_config(file: Option<&Path>) -> anyhow::Result<PlayerConfig> {
    match file {
        Some(path) => PlayerConfig::from_file(path).with_context(|| format!("loading config {}", path.display())),
        None => Ok(PlayerConfig::default()),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResolvedSources {
    media_id: MediaId,
    manifest_url: Url,
    fallback_url: Url,
    time_key: String,
    quality_key: String,
}

/// Print the sources and storage keys of a media id
pub fn resolve(id: &str, base: &str, config: Option<PathBuf>, format: OutputFormat) -> anyhow::Result<()> {
    let config = load_config(config.as_deref())?;
    let resolver = MediaResolver::new(base, config.sources)?;
    let id = MediaId::from(id);
    let asset = resolver.resolve(&id)?;

    let resolved = ResolvedSources {
        time_key: time_key(&id),
        quality_key: quality_key(&id),
        media_id: asset.id,
        manifest_url: asset.manifest_url,
        fallback_url: asset.fallback_url,
    };

    emit(&resolved, format, |r| {
        println!("Media {}", r.media_id);
        println!("  Manifest:    {}", r.manifest_url);
        println!("  Fallback:    {}", r.fallback_url);
        println!("  Time key:    {}", r.time_key);
        println!("  Quality key: {}", r.quality_key);
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SourceCheck {
    role: &'static str,
    url: Url,
    status: Option<u16>,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InspectReport {
    media_id: MediaId,
    sources: Vec<SourceCheck>,
    renditions: Vec<Rendition>,
    manifest_error: Option<String>,
}

#[derive(Tabled)]
struct RenditionRow {
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "Bitrate")]
    bitrate: String,
}

impl From<&Rendition> for RenditionRow {
    fn from(r: &Rendition) -> Self {
        Self {
            value: r.index.to_string(),
            label: r.label.clone(),
            bitrate: if r.is_auto() {
                "-".to_string()
            } else {
                format!("{} kbps", r.bitrate / 1000)
            },
        }
    }
}

async fn head(client: &reqwest::Client, role: &'static str, url: &Url) -> SourceCheck {
    match client.head(url.as_str()).send().await {
        Ok(resp) => SourceCheck {
            role,
            url: url.clone(),
            status: Some(resp.status().as_u16()),
            error: None,
        },
        Err(e) => SourceCheck {
            role,
            url: url.clone(),
            status: None,
            error: Some(e.to_string()),
        },
    }
}

/// Levels of a master playlist in declaration order, I-frame variants excluded
pub fn master_levels(content: &[u8]) -> anyhow::Result<Vec<LevelInfo>> {
    let master = m3u8_rs::parse_master_playlist_res(content)
        .map_err(|e| anyhow::anyhow!("failed to parse master playlist: {:?}", e))?;
    Ok(master
        .variants
        .iter()
        .filter(|v| !v.is_i_frame)
        .map(|v| LevelInfo::new(v.resolution.map(|r| r.height as u32).unwrap_or(0), v.bandwidth))
        .collect())
}

async fn fetch_levels(client: &reqwest::Client, url: &Url) -> anyhow::Result<Vec<LevelInfo>> {
    let resp = client.get(url.as_str()).send().await?.error_for_status()?;
    let body = resp.bytes().await?;
    master_levels(&body)
}

/// Check both sources of a media id and list the renditions a viewer would see
pub async fn inspect(id: &str, base: &str, config: Option<PathBuf>, format: OutputFormat) -> anyhow::Result<()> {
    let config = load_config(config.as_deref())?;
    let resolver = MediaResolver::new(base, config.sources)?;
    let asset = resolver.resolve(&MediaId::from(id))?;
    info!(media_id = %asset.id, "Probing sources");

    let client = reqwest::Client::builder().timeout(Duration::from_secs(30)).build()?;
    let sources = vec![
        head(&client, "manifest", &asset.manifest_url).await,
        head(&client, "fallback", &asset.fallback_url).await,
    ];

    let (renditions, manifest_error) = match fetch_levels(&client, &asset.manifest_url).await {
        Ok(levels) => {
            debug!(levels = levels.len(), "Master playlist parsed");
            (renditions_from_levels(&levels), None)
        }
        Err(e) => {
            warn!(error = %e, "Could not read master playlist");
            (Vec::new(), Some(e.to_string()))
        }
    };

    let report = InspectReport {
        media_id: asset.id,
        sources,
        renditions,
        manifest_error,
    };

    emit(&report, format, |r| {
        println!("Media {}", r.media_id);
        for source in &r.sources {
            let outcome = match (&source.status, &source.error) {
                (Some(status), _) => status.to_string(),
                (None, Some(error)) => format!("unreachable ({})", error),
                (None, None) => "unknown".to_string(),
            };
            println!("  {:<9} {}  {}", source.role, outcome, source.url);
        }
        match &r.manifest_error {
            Some(error) => println!("\nNo renditions: {}", error),
            None => {
                let rows: Vec<RenditionRow> = r.renditions.iter().map(RenditionRow::from).collect();
                println!("\n{}", Table::new(rows).with(Style::rounded()));
            }
        }
    })
}

fn describe(observation: &Observation) -> String {
    match observation {
        Observation::Phase { from, to } => format!("phase     {} -> {}", from, to),
        Observation::EngineCall { call } => format!("engine    {}", call),
        Observation::Source { url } => format!("source    {}", url),
        Observation::Seek { seconds } => format!("seek      {}s", seconds),
        Observation::StorageWrite { key, value } => format!("store     {} = {}", key, value),
        Observation::Rejected { action, error } => format!("rejected  {}: {}", action, error),
    }
}

fn print_report(report: &ReplayReport) {
    for entry in &report.timeline {
        println!("{:>8}ms  {}", entry.at_ms, describe(&entry.observation));
    }
    println!("\nFinal phase: {}", report.final_phase);
    println!("Active quality: {}", report.active_quality);
    println!("Storage:");
    for (key, value) in &report.storage {
        println!("  {} = {}", key, value);
    }
}

/// Replay a recorded session script
pub fn replay(
    script: &Path,
    state: Option<PathBuf>,
    config: Option<PathBuf>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let config = load_config(config.as_deref())?;
    let script = ReplayScript::from_file(script)?;
    let saved: BTreeMap<String, String> = match state {
        Some(path) => {
            let raw = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?
        }
        None => BTreeMap::new(),
    };

    info!(steps = script.steps.len(), saved = saved.len(), "Replaying session");
    let report = replay::run(&script, config, saved)?;
    emit(&report, format, print_report)
}

/// Print the effective configuration
pub fn config(file: Option<PathBuf>) -> anyhow::Result<()> {
    let config = load_config(file.as_deref())?;
    println!("{}", to_json(&config)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MASTER: &str = "#EXTM3U
#EXT-X-VERSION:3
#EXT-X-STREAM-INF:BANDWIDTH=2500000,RESOLUTION=1280x720
720p.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=854x480
480p.m3u8
#EXT-X-I-FRAME-STREAM-INF:BANDWIDTH=200000,RESOLUTION=1280x720,URI=\"iframe.m3u8\"
#EXT-X-STREAM-INF:BANDWIDTH=5000000,RESOLUTION=1920x1080
1080p.m3u8
";

    #[test]
    fn test_master_levels_keep_declaration_order() {
        let levels = master_levels(MASTER.as_bytes()).unwrap();
        let heights: Vec<u32> = levels.iter().map(|l| l.height).collect();
        assert_eq!(heights, vec![720, 480, 1080]);
        assert_eq!(levels[1].bitrate, 800_000);
    }

    #[test]
    fn test_rendition_rows() {
        let levels = master_levels(MASTER.as_bytes()).unwrap();
        let rows: Vec<RenditionRow> = renditions_from_levels(&levels).iter().map(RenditionRow::from).collect();
        assert_eq!(rows[0].value, "-1");
        assert_eq!(rows[0].bitrate, "-");
        assert_eq!(rows[1].label, "720p");
        assert_eq!(rows[1].bitrate, "2500 kbps");
    }

    #[test]
    fn test_master_levels_rejects_non_playlist() {
        assert!(master_levels(b"<html>not found</html>").is_err());
    }
}
