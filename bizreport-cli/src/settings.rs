//! Layered settings: built-in defaults, then `bizreport.toml` (or the file
//! given with `--config`), then `BIZREPORT_*` environment variables. Command
//! line flags are applied last by the caller.

use std::path::Path;

use anyhow::{Context, Result};
use clap::ValueEnum;
use config::{Config, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;

use bizreport_pipeline::comparator::{CompareOptions, Pairing};
use bizreport_pipeline::TrafficMode;

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_NAME: &str = "bizreport";

const ENV_PREFIX: &str = "BIZREPORT";

/// How periods are lined up.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    /// Order given on the command line.
    #[default]
    Insertion,
    /// Date found in each file name.
    Date,
    /// Only the labels passed with `--period`, in that order.
    Explicit,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub mode: TrafficMode,
    pub order: OrderKind,
    pub pairing: Pairing,
    pub top_n: usize,
    pub significance_pct: Decimal,
    pub currency_symbol: String,
}

impl Default for Settings {
    fn default() -> Self {
        let compare = CompareOptions::default();
        Self {
            mode: TrafficMode::default(),
            order: OrderKind::default(),
            pairing: compare.pairing,
            top_n: compare.top_n,
            significance_pct: compare.significance_pct,
            currency_symbol: compare.currency_symbol,
        }
    }
}

impl Settings {
    /// Load settings. An explicit `config_path` must exist; the default
    /// `bizreport.toml` is optional.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let file = match config_path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_NAME).required(false),
        };

        let settings = Config::builder()
            .add_source(file)
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .context("reading settings")?
            .try_deserialize()
            .context("invalid settings")?;
        Ok(settings)
    }

    pub fn compare_options(&self) -> CompareOptions {
        CompareOptions {
            pairing: self.pairing,
            top_n: self.top_n,
            significance_pct: self.significance_pct,
            currency_symbol: self.currency_symbol.clone(),
        }
    }
}
