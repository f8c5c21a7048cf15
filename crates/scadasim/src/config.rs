//! Settings file for scadasim
//!
//! ```yaml
//! connection_string: "Provider=PostgreSQL;Host=${PGHOST:-localhost};Database=scada;\
//!   Username=scada;Password=${PGPASSWORD}"
//! simulation:
//!   commit_batch_size: 1000
//!   value_min: 40
//!   value_max: 95
//!   noise_amplitude: 0.5
//! ```

use anyhow::Context;
use scadasim_core::generator::Bounds;
use scadasim_core::params::{parse_date, RunParameters, DEFAULT_BATCH_SIZE};
use scadasim_core::SimError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::debug;

use crate::cli::SimulateArgs;

/// Settings file looked up in the working directory
pub const DEFAULT_SETTINGS_FILE: &str = "scadasim.yaml";

/// Pre-compiled regex for environment variable expansion
/// Pattern: ${VAR} or ${VAR:-default}
static ENV_VAR_REGEX: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\$\{([a-zA-Z_][a-zA-Z0-9_]*)(?::-([^}]*))?\}")
        .expect("env var regex pattern is invalid - this is a bug")
});

/// Root settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    /// Connection descriptor
    #[serde(default)]
    pub connection_string: Option<String>,

    /// Generation settings
    #[serde(default)]
    pub simulation: SimulationSettings,
}

/// Generation settings
#[derive(Debug, Clone, Deserialize)]
pub struct SimulationSettings {
    /// Rows per committed batch
    #[serde(default = "default_batch_size")]
    pub commit_batch_size: usize,

    /// Value bounds and noise
    #[serde(flatten)]
    pub bounds: Bounds,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            commit_batch_size: default_batch_size(),
            bounds: Bounds::default(),
        }
    }
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

impl Settings {
    /// Load settings from a YAML file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse settings file {}", path.display()))
    }

    /// Parse settings from YAML text, expanding environment variables first
    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        let expanded = expand_env_vars(content);
        if expanded.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(&expanded)?)
    }

    /// Load the explicit settings file, or the default one when present
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default = PathBuf::from(DEFAULT_SETTINGS_FILE);
                if default.is_file() {
                    debug!(path = %default.display(), "using default settings file");
                    Self::from_file(&default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Combine settings with command-line arguments
    ///
    /// Command-line values win. Returns the connection descriptor and the
    /// validated run parameters.
    pub fn resolve(&self, args: &SimulateArgs) -> Result<(String, RunParameters), SimError> {
        let descriptor = args
            .connection_string
            .as_deref()
            .or(self.connection_string.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                SimError::configuration(
                    "no connection string: pass --connection-string, set \
                     SCADASIM_CONNECTION_STRING, or add connection_string to the settings file",
                )
            })?
            .to_string();

        let start = parse_date(&args.start)?;
        let end = parse_date(&args.end)?;

        let defaults = self.simulation.bounds;
        let bounds = Bounds::new(
            args.value_min.unwrap_or(defaults.min),
            args.value_max.unwrap_or(defaults.max),
            args.noise.unwrap_or(defaults.noise_amplitude),
        );

        let mut params = RunParameters::new(args.table.trim(), start, end)
            .with_interval(args.interval)
            .with_batch_size(args.batch_size.unwrap_or(self.simulation.commit_batch_size))
            .with_bounds(bounds);
        if let Some(seed) = args.seed {
            params = params.with_seed(seed);
        }

        params.validate()?;
        params.validate_window()?;
        Ok((descriptor, params))
    }
}

/// Expand environment variables in the format ${VAR} or ${VAR:-default}
pub fn expand_env_vars(content: &str) -> String {
    ENV_VAR_REGEX
        .replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default = caps.get(2).map(|m| m.as_str());

            std::env::var(var_name).unwrap_or_else(|_| default.unwrap_or("").to_string())
        })
        .to_string()
}
