//! Output formatting for CLI

use serde::Serialize;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            _ => OutputFormat::Text,
        }
    }
}

/// Pretty JSON rendering shared by every command
pub fn to_json<T: Serialize>(data: &T) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(data)?)
}

/// Print `data` as JSON, or run `text` to print it for humans
pub fn emit<T: Serialize>(data: &T, format: OutputFormat, text: impl FnOnce(&T)) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", to_json(data)?),
        OutputFormat::Text => text(data),
    }
    Ok(())
}
