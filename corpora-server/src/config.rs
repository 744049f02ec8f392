//! Server configuration (§6 "Environment"), following
//! `popgetter::config::Config`'s TOML-with-`Default` pattern.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub listen_addr: String,
    pub sketch_index_addr: Option<String>,
    /// Overrides the built-in source list; matches the flat JSON array of
    /// `{url, auth?, check_interval?}` the original `socrata.json` loader
    /// reads (`discovery/socrata/socrata_discovery.py`).
    pub source_list_path: Option<String>,
    pub discovery_check_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen_addr: "0.0.0.0:8080".into(),
            sketch_index_addr: None,
            source_list_path: None,
            discovery_check_interval_secs: 24 * 60 * 60,
        }
    }
}

/// One entry of an overriding source list file.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SourceConfigEntry {
    pub url: String,
    #[serde(default)]
    pub auth: BTreeMap<String, String>,
    pub check_interval_secs: Option<u64>,
}

pub fn read_config_from_toml() -> Config {
    let file_path = dirs::config_dir()
        .expect("no config directory for this platform")
        .join("corpora")
        .join("config.toml");
    match std::fs::read_to_string(&file_path) {
        Ok(contents) => toml::from_str(&contents).expect("invalid TOML in config file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Config::default(),
        Err(e) => panic!("error reading config file {}: {:#?}", file_path.display(), e),
    }
}

pub fn read_source_list(path: &str) -> anyhow::Result<Vec<SourceConfigEntry>> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}
