//! Command line arguments and settings resolution.
//!
//! Each setting is taken from its flag when given, then from the YAML file passed with
//! `--config`, then from the environment, then from its default.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::Deserialize;

use crate::observability::LogFormatChoice;

const DEFAULT_OUTPUT_FILE: &str = "free_electricity.json";
const DEFAULT_CACHE_DIR: &str = ".cache";

/// Reconcile free electricity events from Octopus Energy and the community feed.
#[derive(Debug, Parser)]
#[command(name = "wattfeed", version, about, long_about = None)]
pub(crate) struct Args {
    /// Path to a YAML configuration file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Octopus Energy account number.
    #[arg(long = "account")]
    pub account_number: Option<String>,

    /// Meter point ID (MPAN).
    #[arg(long = "meter")]
    pub meter_point_id: Option<String>,

    /// Octopus Energy API key.
    #[arg(long = "key")]
    pub api_key: Option<String>,

    /// Published dataset path.
    #[arg(long = "output")]
    pub output_file: Option<PathBuf>,

    /// Directory for the community feed cache.
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormatChoice::Auto)]
    pub log_format: LogFormatChoice,
}

/// Shape of the optional YAML configuration file.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileConfig {
    account_number: Option<String>,
    #[serde(rename = "meterPointID")]
    meter_point_id: Option<String>,
    api_key: Option<String>,
    output_file: Option<PathBuf>,
    cache_dir: Option<PathBuf>,
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Settings {
    pub account_number: String,
    pub meter_point_id: String,
    pub api_key: String,
    pub output_file: PathBuf,
    pub cache_dir: PathBuf,
}

#[derive(thiserror::Error, Debug)]
pub(crate) enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("{field} is required (use {flag} flag, config file, or {env} env var)")]
    Missing {
        field: &'static str,
        flag: &'static str,
        env: &'static str,
    },
}

impl Args {
    /// Combine flags, the config file, and `env` into [`Settings`].
    pub(crate) fn resolve<F>(&self, env: F) -> Result<Settings, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = match &self.config {
            Some(path) => load_file(path)?,
            None => FileConfig::default(),
        };

        let pick = |flag: &Option<String>, from_file: Option<String>, var: &str| {
            non_empty(flag.clone())
                .or_else(|| non_empty(from_file))
                .or_else(|| non_empty(env(var)))
        };

        let api_key = pick(&self.api_key, file.api_key, "OCTOPUS_API_KEY").ok_or(
            ConfigError::Missing {
                field: "API key",
                flag: "--key",
                env: "OCTOPUS_API_KEY",
            },
        )?;
        let account_number = pick(&self.account_number, file.account_number, "ACCOUNT_NUMBER")
            .ok_or(ConfigError::Missing {
                field: "account number",
                flag: "--account",
                env: "ACCOUNT_NUMBER",
            })?;
        let meter_point_id = pick(&self.meter_point_id, file.meter_point_id, "METER_POINT_ID")
            .ok_or(ConfigError::Missing {
                field: "meter point ID",
                flag: "--meter",
                env: "METER_POINT_ID",
            })?;

        let output_file = self
            .output_file
            .clone()
            .or(file.output_file)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_FILE));
        let cache_dir = self
            .cache_dir
            .clone()
            .or(file.cache_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR));

        Ok(Settings {
            account_number,
            meter_point_id,
            api_key,
            output_file,
            cache_dir,
        })
    }
}

fn load_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let parsed = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    tracing::info!(filename = %path.display(), "loaded configuration from file");
    Ok(parsed)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.trim().is_empty())
}
