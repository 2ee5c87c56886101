use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ResidueError, Result};
use crate::registry::RegistryPolicy;
use crate::shell::RunOptions;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub trace: TraceConfig,
}

impl Config {
    /// Load configuration, starting from defaults and merging one patch
    /// file if given. The file comes from `explicit_path` or, failing that,
    /// the `RESIDUE_CONFIG` environment variable; when either names a path
    /// the file must exist. Environment overrides apply last.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        let explicit = explicit_path
            .map(PathBuf::from)
            .or_else(|| std::env::var("RESIDUE_CONFIG").ok().map(PathBuf::from));

        if let Some(path) = explicit {
            let patch = Self::load_patch(&path)?;
            config.merge_patch(patch);
        }

        config.apply_env_overrides()?;

        Ok(config)
    }

    fn load_patch(path: &Path) -> Result<ConfigPatch> {
        if !path.exists() {
            return Err(ResidueError::ConfigNotFound(path.display().to_string()));
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|err| ResidueError::Config(format!("read config {}: {err}", path.display())))?;
        let patch = toml::from_str(&raw)
            .map_err(|err| ResidueError::Config(format!("parse config {}: {err}", path.display())))?;
        Ok(patch)
    }

    fn merge_patch(&mut self, patch: ConfigPatch) {
        if let Some(patch) = patch.runner {
            self.runner.merge(patch);
        }
        if let Some(patch) = patch.registry {
            self.registry.merge(patch);
        }
        if let Some(patch) = patch.trace {
            self.trace.merge(patch);
        }
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(value) = env_bool("RESIDUE_FAIL_FAST") {
            self.runner.fail_fast = value;
        }
        if let Some(values) = env_list("RESIDUE_INCLUDE_TAGS") {
            self.runner.include_tags = values;
        }
        if let Some(values) = env_list("RESIDUE_EXCLUDE_TAGS") {
            self.runner.exclude_tags = values;
        }
        if let Some(value) = env_bool("RESIDUE_ENFORCE_SEMVER") {
            self.registry.enforce_semver = value;
        }
        if let Some(value) = env_f64("RESIDUE_ATTRIBUTION_FLOOR")? {
            self.trace.attribution_floor = value;
        }

        Ok(())
    }
}

/// Suite execution defaults, feeding [`RunOptions`].
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RunnerConfig {
    #[serde(default)]
    pub fail_fast: bool,
    #[serde(default)]
    pub include_tags: Vec<String>,
    #[serde(default)]
    pub exclude_tags: Vec<String>,
}

impl RunnerConfig {
    fn merge(&mut self, patch: RunnerPatch) {
        if let Some(value) = patch.fail_fast {
            self.fail_fast = value;
        }
        if let Some(values) = patch.include_tags {
            self.include_tags = values;
        }
        if let Some(values) = patch.exclude_tags {
            self.exclude_tags = values;
        }
    }
}

impl From<&RunnerConfig> for RunOptions {
    fn from(config: &RunnerConfig) -> Self {
        Self {
            fail_fast: config.fail_fast,
            include_tags: config.include_tags.clone(),
            exclude_tags: config.exclude_tags.clone(),
        }
    }
}

/// Registration strictness, feeding [`RegistryPolicy`].
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RegistryConfig {
    #[serde(default)]
    pub enforce_semver: bool,
}

impl RegistryConfig {
    fn merge(&mut self, patch: RegistryPatch) {
        if let Some(value) = patch.enforce_semver {
            self.enforce_semver = value;
        }
    }
}

impl From<&RegistryConfig> for RegistryPolicy {
    fn from(config: &RegistryConfig) -> Self {
        Self {
            enforce_semver: config.enforce_semver,
        }
    }
}

/// Trace derivation knobs shared by the built-in shells.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceConfig {
    /// Ghost circuits with absolute attribution below this floor are left
    /// out of traces.
    #[serde(default)]
    pub attribution_floor: f64,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            attribution_floor: 0.05,
        }
    }
}

impl TraceConfig {
    fn merge(&mut self, patch: TracePatch) {
        if let Some(value) = patch.attribution_floor {
            self.attribution_floor = value;
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigPatch {
    pub runner: Option<RunnerPatch>,
    pub registry: Option<RegistryPatch>,
    pub trace: Option<TracePatch>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RunnerPatch {
    pub fail_fast: Option<bool>,
    pub include_tags: Option<Vec<String>>,
    pub exclude_tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RegistryPatch {
    pub enforce_semver: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct TracePatch {
    pub attribution_floor: Option<f64>,
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|value| matches!(value.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

fn env_f64(key: &str) -> Result<Option<f64>> {
    match std::env::var(key) {
        Ok(value) => value
            .parse::<f64>()
            .map(Some)
            .map_err(|err| ResidueError::Config(format!("invalid {key} value {value}: {err}"))),
        Err(_) => Ok(None),
    }
}

fn env_list(key: &str) -> Option<Vec<String>> {
    let value = std::env::var(key).ok()?;
    let list = value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect::<Vec<_>>();
    Some(list)
}
