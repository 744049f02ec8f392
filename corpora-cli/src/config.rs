//! CLI-local configuration, following `popgetter::config::Config`'s
//! TOML-with-`Default` pattern (grounded on `popgetter/src/config.rs`).

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Directory of `<dataset-id>.json` `Profile` documents used by `search`
    /// and `purge` when `--catalog-dir` isn't passed explicitly.
    pub default_catalog_dir: Option<String>,
}

pub fn read_config_from_toml() -> Config {
    let file_path = dirs::config_dir()
        .expect("no config directory for this platform")
        .join("corpora")
        .join("config.toml");
    match std::fs::read_to_string(file_path) {
        Ok(contents) => toml::from_str(&contents).expect("Invalid TOML in config file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Config::default(),
        Err(e) => panic!("Error reading config file: {:#?}", e),
    }
}
