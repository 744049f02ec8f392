use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use enum_dispatch::enum_dispatch;
use log::{debug, info};
use serde_json::Value;
use spinners::{Spinner, Spinners};

use corpora_core::catalog::memory::InMemoryCatalog;
use corpora_core::catalog::Catalog;
use corpora_core::model::{dataset_id, Profile};
use corpora_core::profiler::{ProfileRequest, Profiler};
use corpora_core::query::{self, CompiledQuery, QueryNode};
use corpora_core::sketch::{InMemorySketchIndex, SketchIndex};

use crate::config::Config;
use crate::display::{display_profile, display_profile_json, display_purge_summary, display_search_hits};
use crate::error::CliResult;

const DEFAULT_PROGRESS_SPINNER: Spinners = Spinners::Dots;
const COMPLETE_PROGRESS_STRING: &str = "✔";

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
}

/// Trait that defines what to run when a given subcommand is invoked.
#[enum_dispatch]
pub trait RunCommand {
    async fn run(&self, config: Config) -> CliResult<()>;
}

/// Profile a local CSV file and print the resulting document (§4.3, §10).
#[derive(clap::Args, Debug)]
pub struct ProfileCommand {
    /// Path to the CSV file to profile.
    path: String,
    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value_t = OutputFormat::Table,
        help = "table|json"
    )]
    output_format: OutputFormat,
    #[arg(short = 'o', long, help = "Write the JSON document to this file")]
    output_file: Option<String>,
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for ProfileCommand {
    async fn run(&self, _config: Config) -> CliResult<()> {
        info!("Running `profile` subcommand");
        let sp = (!self.quiet).then(|| {
            Spinner::with_timer(DEFAULT_PROGRESS_SPINNER, format!("Profiling {}...", self.path))
        });

        let bytes = fs::read(&self.path)?;
        let stem = PathBuf::from(&self.path)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "dataset".to_string());
        let request = ProfileRequest {
            dataset_id: dataset_id("local", &stem),
            name: stem.clone(),
            description: None,
            materialize: Default::default(),
            column_hints: &[],
        };
        let profiler = Profiler::new();
        let profile = profiler.profile(&bytes, request)?;

        if let Some(mut s) = sp {
            s.stop_with_symbol(COMPLETE_PROGRESS_STRING);
        }
        debug!("{profile:#?}");

        match self.output_format {
            OutputFormat::Table => display_profile(&profile)?,
            OutputFormat::Json => display_profile_json(&profile)?,
        }
        if let Some(path) = &self.output_file {
            fs::write(path, serde_json::to_string_pretty(&profile)?)?;
        }
        Ok(())
    }
}

/// Run a query against a directory-backed catalog (§4.6, §10).
#[derive(clap::Args, Debug)]
pub struct SearchCommand {
    /// Path to a JSON file holding the `dataset`/`required_variables`/
    /// `desired_variables` query object described in §4.6.
    query_file: String,
    #[arg(
        long,
        help = "Directory of <dataset-id>.json Profile documents to search"
    )]
    catalog_dir: Option<String>,
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for SearchCommand {
    async fn run(&self, config: Config) -> CliResult<()> {
        info!("Running `search` subcommand");
        let dir = resolve_catalog_dir(self.catalog_dir.clone(), &config)?;
        let (catalog, _paths) = load_catalog_dir(&dir)?;

        let contents = fs::read_to_string(&self.query_file)?;
        let value: Value = serde_json::from_str(&contents)?;
        let compiled = query::compile(&value)?.unwrap_or(CompiledQuery {
            filter: QueryNode::MatchAll,
            should: Vec::new(),
        });

        let sp = (!self.quiet)
            .then(|| Spinner::with_timer(DEFAULT_PROGRESS_SPINNER, "Searching catalog...".into()));
        let hits = catalog.search(&compiled)?;
        if let Some(mut s) = sp {
            s.stop_with_symbol(COMPLETE_PROGRESS_STRING);
        }

        display_search_hits(&hits)?;
        Ok(())
    }
}

/// The standalone purge tool from §9 Design Notes, grounded on
/// `scripts/purge_source.py`: delete every document under `identifier`
/// from both the catalog directory and the sketch index.
#[derive(clap::Args, Debug)]
pub struct PurgeCommand {
    /// Source identifier whose datasets should be deleted, e.g. `socrata-data-cityofnewyork-us`.
    identifier: String,
    #[arg(long, help = "Directory of <dataset-id>.json Profile documents to purge")]
    catalog_dir: Option<String>,
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for PurgeCommand {
    async fn run(&self, config: Config) -> CliResult<()> {
        info!("Running `purge` subcommand for identifier {}", self.identifier);
        let dir = resolve_catalog_dir(self.catalog_dir.clone(), &config)?;
        let (catalog, paths) = load_catalog_dir(&dir)?;
        let sketch = InMemorySketchIndex::new();

        let sp = (!self.quiet)
            .then(|| Spinner::with_timer(DEFAULT_PROGRESS_SPINNER, "Purging...".into()));
        let matched = catalog.scan(&self.identifier)?;
        let mut removed = Vec::with_capacity(matched.len());
        for profile in matched {
            catalog.delete(&profile.id)?;
            sketch.remove(&profile.id).map_err(|e| anyhow::anyhow!(e.to_string()))?;
            if let Some(path) = paths.get(&profile.id) {
                fs::remove_file(path)?;
            }
            removed.push(profile.id);
        }
        if let Some(mut s) = sp {
            s.stop_with_symbol(COMPLETE_PROGRESS_STRING);
        }

        display_purge_summary(&self.identifier, &removed)?;
        Ok(())
    }
}

fn resolve_catalog_dir(explicit: Option<String>, config: &Config) -> CliResult<String> {
    explicit
        .or_else(|| config.default_catalog_dir.clone())
        .ok_or_else(|| {
            anyhow::anyhow!(
                "no catalog directory given; pass --catalog-dir or set default_catalog_dir in config.toml"
            )
            .into()
        })
}

fn load_catalog_dir(dir: &str) -> CliResult<(InMemoryCatalog, HashMap<String, PathBuf>)> {
    let catalog = InMemoryCatalog::new();
    let mut paths = HashMap::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let contents = fs::read_to_string(&path)?;
        let profile: Profile = serde_json::from_str(&contents)?;
        paths.insert(profile.id.clone(), path);
        catalog.put(profile)?;
    }
    Ok((catalog, paths))
}

/// The entrypoint for the CLI.
#[derive(Parser, Debug)]
#[command(
    version,
    about = "Operator tooling for the federated dataset catalog",
    long_about = None,
    name = "corpora"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
    #[arg(
        short = 'q',
        long = "quiet",
        help = "Do not print progress spinners to stdout.",
        global = true
    )]
    quiet: bool,
}

/// Commands contains the list of subcommands available for use in the CLI.
/// Each command implements the RunCommand trait and specifies the list of
/// required args for that command.
#[derive(Subcommand, Debug)]
#[enum_dispatch(RunCommand)]
pub enum Commands {
    /// Profile a local CSV file and print the resulting document
    Profile(ProfileCommand),
    /// Run a query against a directory-backed catalog
    Search(SearchCommand),
    /// Delete every dataset under a source identifier
    Purge(PurgeCommand),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[tokio::test]
    async fn profile_command_prints_table_for_csv_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        use std::io::Write;
        writeln!(file, "name,count\na,1\nb,2").unwrap();
        let cmd = ProfileCommand {
            path: file.path().to_string_lossy().to_string(),
            output_format: OutputFormat::Table,
            output_file: None,
            quiet: true,
        };
        let result = cmd.run(Config::default()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn search_command_requires_a_catalog_dir() {
        let cmd = SearchCommand {
            query_file: "nonexistent.json".to_string(),
            catalog_dir: None,
            quiet: true,
        };
        let result = cmd.run(Config::default()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn purge_command_removes_matching_documents_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut profile = corpora_core::model::Profile {
            id: "acme.1".to_string(),
            name: "widgets".to_string(),
            description: None,
            nb_rows: 1,
            size_bytes: 1,
            columns: vec![],
            spatial_coverage: vec![],
            materialize: Default::default(),
            indexed_at: chrono::Utc::now(),
            lazo: vec![],
        };
        profile
            .materialize
            .insert("identifier".to_string(), "acme".to_string());
        fs::write(
            dir.path().join("acme.1.json"),
            serde_json::to_string(&profile).unwrap(),
        )
        .unwrap();

        let cmd = PurgeCommand {
            identifier: "acme".to_string(),
            catalog_dir: Some(dir.path().to_string_lossy().to_string()),
            quiet: true,
        };
        let result = cmd.run(Config::default()).await;
        assert!(result.is_ok());
        assert!(!dir.path().join("acme.1.json").exists());
    }
}
