use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Which QoE metric the reward is computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RewardKind {
    Bitrate,
    Vmaf,
}

impl RewardKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RewardKind::Bitrate => "bitrate",
            RewardKind::Vmaf => "vmaf",
        }
    }
}

impl fmt::Display for RewardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RewardKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bitrate" => Ok(RewardKind::Bitrate),
            "vmaf" => Ok(RewardKind::Vmaf),
            other => Err(format!("unknown reward kind '{}' (expected bitrate or vmaf)", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Experiment name, used as the results subdirectory
    pub name: String,
    pub results_dir: PathBuf,
    pub reward_kind: RewardKind,
    /// Overrides for the reward defaults of `reward_kind`
    pub rebuffer_penalty: Option<f64>,
    pub smoothing_penalty: Option<f64>,
    pub reference_chunk_len_s: Option<f64>,
    pub lookahead_depth: usize,
    pub robust: bool,
    pub warm_up_probes: usize,
    pub buffer_threshold_s: f64,
    pub drain_step_ms: f64,
    pub packet_payload_fraction: f64,
    pub link_rtt_ms: f64,
    /// Videos evaluated concurrently in a batch
    pub parallel_runs: usize,
    /// Stop a video after this many chunks (the log stays incomplete)
    pub chunk_budget: Option<usize>,
    /// Only use these trace file names
    pub keep_traces: Option<Vec<String>>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            name: "mpc".to_string(),
            results_dir: PathBuf::from("Data/Results"),
            reward_kind: RewardKind::Bitrate,
            rebuffer_penalty: None,
            smoothing_penalty: None,
            reference_chunk_len_s: None,
            lookahead_depth: 5,
            robust: true,
            warm_up_probes: 5,
            buffer_threshold_s: 60.0,
            drain_step_ms: 500.0,
            packet_payload_fraction: 0.95,
            link_rtt_ms: 200.0,
            parallel_runs: 1,
            chunk_budget: None,
            keep_traces: None,
        }
    }
}

impl SimConfig {
    /// Load from `path`, else from the user config file if it exists, else defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => Some(path.to_path_buf()),
            None => config_path().filter(|p| p.exists()),
        };

        let config = match path {
            Some(path) => {
                let text = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                    path: path.clone(),
                    source,
                })?;
                log::debug!("Loading config from {}", path.display());
                serde_json::from_str(&text).map_err(|source| ConfigError::Parse { path, source })?
            }
            None => SimConfig::default(),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let data = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, data).map_err(write_err)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("buffer_threshold_s", self.buffer_threshold_s),
            ("drain_step_ms", self.drain_step_ms),
            ("packet_payload_fraction", self.packet_payload_fraction),
        ];
        for (field, value) in positive {
            if !(value > 0.0 && value.is_finite()) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be positive, got {}",
                    field, value
                )));
            }
        }
        if self.packet_payload_fraction > 1.0 {
            return Err(ConfigError::Invalid(format!(
                "packet_payload_fraction must be at most 1, got {}",
                self.packet_payload_fraction
            )));
        }
        if !(self.link_rtt_ms >= 0.0 && self.link_rtt_ms.is_finite()) {
            return Err(ConfigError::Invalid(format!(
                "link_rtt_ms must be non-negative, got {}",
                self.link_rtt_ms
            )));
        }
        if let Some(len) = self.reference_chunk_len_s {
            if !(len > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "reference_chunk_len_s must be positive, got {}",
                    len
                )));
            }
        }
        if self.parallel_runs == 0 {
            return Err(ConfigError::Invalid("parallel_runs must be at least 1".to_string()));
        }
        if self.name.is_empty() || self.name.contains(['/', '\\']) {
            return Err(ConfigError::Invalid(format!("invalid experiment name '{}'", self.name)));
        }
        Ok(())
    }

    /// Directory holding this experiment's result logs
    pub fn experiment_dir(&self) -> PathBuf {
        self.results_dir.join(&self.name)
    }
}

pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("abrlab").join("config.json"))
}
