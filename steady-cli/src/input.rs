//! Declarative input files.

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde::de::DeserializeOwned;

/// Parameters of one run plus the connection settings that may ride along.
#[derive(Debug, Deserialize)]
pub struct Task<T> {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    #[serde(flatten)]
    pub params: T,
}

/// Load a JSON or YAML mapping from `path`, or from stdin when `path` is `-`.
pub fn load<T: DeserializeOwned>(path: &Path) -> Result<Task<T>> {
    let text = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read parameters from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?
    };
    parse(&text).with_context(|| format!("Invalid parameters in {}", path.display()))
}

/// YAML is a superset of JSON, so one parser covers both.
pub fn parse<T: DeserializeOwned>(text: &str) -> Result<Task<T>> {
    Ok(serde_yaml::from_str(text)?)
}
