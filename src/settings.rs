use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::parser::Profile;

pub const CONFIG_FILE: &str = "extrator.toml";
const ENV_PREFIX: &str = "EXTRATOR";

/// Runtime settings: defaults, then `extrator.toml`, then `EXTRATOR_*`
/// environment variables. Command-line flags are applied on top by the caller.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub profile: Profile,
    pub db_path: PathBuf,
    pub output: PathBuf,
    pub operator: String,
    pub preview_rows: usize,
}

impl Settings {
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    pub fn load_from(file: &Path) -> Result<Self> {
        let config = Config::builder()
            .set_default("profile", "full")?
            .set_default("db_path", "data/extrator.sqlite")?
            .set_default("output", "Relatorio_Ls.csv")?
            .set_default("operator", default_operator())?
            .set_default("preview_rows", 10)?
            .add_source(File::from(file).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()
            .with_context(|| format!("Failed to load settings from {:?}", file))?;
        config
            .try_deserialize()
            .context("Invalid settings")
    }
}

fn default_operator() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "local".to_string())
}

// ── Tests ──
