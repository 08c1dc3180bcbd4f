use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, anyhow, ensure};
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

pub const CONFIG_PATH_ENV: &str = "CADENCE_JOBSTORE_CONFIG_PATH";
pub const CONFIG_JSON_ENV: &str = "CADENCE_JOBSTORE_CONFIG_JSON";

/// Source that produced the job-store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum JobStoreConfigSource {
    #[default]
    Default,
    EnvPath(PathBuf),
    EnvInline,
    File(PathBuf),
}

/// Tuning for the job-store coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobStoreConfig {
    /// How late (ms) a trigger may be picked up before it counts as misfired
    /// and its misfire instruction is applied instead.
    pub misfire_threshold_ms: u64,
    /// Reported to the scheduler as the cost of one release/acquire cycle.
    pub estimated_release_acquire_ms: u64,
    /// Transaction retry policy for optimistic-concurrency conflicts.
    pub retry: RetryConfig,
    /// Cross-node event propagation.
    pub propagation: PropagationConfig,
}

impl Default for JobStoreConfig {
    fn default() -> Self {
        Self {
            misfire_threshold_ms: 60_000,
            estimated_release_acquire_ms: 70,
            retry: RetryConfig::default(),
            propagation: PropagationConfig::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Percentage-based jitter to spread out competing nodes.
    pub jitter_ratio: f32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            backoff_base_ms: 25,
            backoff_max_ms: 1_000,
            jitter_ratio: 0.25,
        }
    }
}

impl RetryConfig {
    /// Un-jittered delay before retry number `attempt` (1-based).
    pub fn base_delay_ms(&self, attempt: u32) -> u64 {
        if attempt == 0 {
            return 0;
        }
        let exp = attempt.saturating_sub(1).min(30) as i32;
        let scaled = (self.backoff_base_ms as f64) * 2f64.powi(exp);
        scaled.min(self.backoff_max_ms as f64).max(0.0) as u64
    }

    /// Delay spread around the base delay; `unit` is drawn from `[0, 1]`.
    pub fn jittered_delay_ms(&self, attempt: u32, unit: f64) -> u64 {
        let anchor = self.base_delay_ms(attempt);
        if anchor == 0 {
            return 0;
        }
        let jitter_span = (anchor as f64) * f64::from(self.jitter_ratio.max(0.0));
        let lower = (anchor as f64 - jitter_span).max(0.0);
        let upper = (anchor as f64 + jitter_span).min(self.backoff_max_ms as f64);
        if upper <= lower {
            return lower.round() as u64;
        }
        (lower + (upper - lower) * unit.clamp(0.0, 1.0)).round() as u64
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropagationConfig {
    /// Buffered events per subscriber before slow nodes start lagging.
    pub channel_capacity: usize,
    /// One-shot triggers due within this window (ms) count as "run now" and
    /// wake the node they are limited to immediately.
    pub run_now_window_ms: u64,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1_024,
            run_now_window_ms: 5_000,
        }
    }
}

impl PropagationConfig {
    pub fn run_now_window(&self) -> TimeDelta {
        millis_saturating(self.run_now_window_ms)
    }
}

fn millis_saturating(ms: u64) -> TimeDelta {
    i64::try_from(ms)
        .ok()
        .and_then(TimeDelta::try_milliseconds)
        .unwrap_or(TimeDelta::MAX)
}

impl JobStoreConfig {
    pub fn misfire_threshold(&self) -> TimeDelta {
        millis_saturating(self.misfire_threshold_ms)
    }

    pub fn estimated_release_acquire(&self) -> Duration {
        Duration::from_millis(self.estimated_release_acquire_ms)
    }

    /// Load configuration overrides using environment variables.
    /// Evaluation order:
    /// 1) `$CADENCE_JOBSTORE_CONFIG_PATH` (TOML or JSON file),
    /// 2) `$CADENCE_JOBSTORE_CONFIG_JSON` (inline JSON),
    /// 3) `jobstore.toml` / `jobstore.json` in the working directory,
    /// 4) defaults.
    pub fn load_from_env() -> anyhow::Result<(Self, JobStoreConfigSource)> {
        if let Ok(path_str) = env::var(CONFIG_PATH_ENV)
            && !path_str.trim().is_empty()
        {
            let path = PathBuf::from(path_str);
            let config = Self::load_from_file(&path)?;
            return Ok((config, JobStoreConfigSource::EnvPath(path)));
        }

        if let Ok(raw) = env::var(CONFIG_JSON_ENV)
            && !raw.trim().is_empty()
        {
            let parsed = Self::parse_json(&raw)
                .with_context(|| format!("failed to parse {CONFIG_JSON_ENV}"))?;
            return Ok((parsed, JobStoreConfigSource::EnvInline));
        }

        if let Some(path) = Self::find_default_file() {
            let config = Self::load_from_file(&path)?;
            return Ok((config, JobStoreConfigSource::File(path)));
        }

        Ok((Self::default(), JobStoreConfigSource::Default))
    }

    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path).with_context(|| {
            format!("failed to read job store config from {}", path.display())
        })?;

        let config: Self = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&contents).with_context(|| {
                format!("invalid job store config {}", path.display())
            })?,
            Some("toml") => toml::from_str(&contents).map_err(|err| {
                anyhow!("invalid job store config {}: {}", path.display(), err)
            })?,
            _ => return Self::parse_from_str(&contents, &path.display().to_string()),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn parse_from_str(contents: &str, origin: &str) -> anyhow::Result<Self> {
        // Try TOML first, then JSON.
        let config: Self = toml::from_str(contents).or_else(|toml_err| {
            serde_json::from_str(contents).map_err(|json_err| {
                anyhow!(
                    "failed to parse job store config {}: toml error: {}; json error: {}",
                    origin,
                    toml_err,
                    json_err
                )
            })
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn parse_json(raw: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|err| anyhow!("invalid job store config json: {err}"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.retry.max_attempts >= 1, "retry.max_attempts must be at least 1");
        ensure!(
            self.retry.backoff_base_ms <= self.retry.backoff_max_ms,
            "retry.backoff_base_ms must not exceed retry.backoff_max_ms"
        );
        ensure!(
            self.propagation.channel_capacity > 0,
            "propagation.channel_capacity must be positive"
        );
        ensure!(
            i64::try_from(self.misfire_threshold_ms).is_ok(),
            "misfire_threshold_ms is out of range"
        );
        Ok(())
    }

    fn find_default_file() -> Option<PathBuf> {
        const CANDIDATES: &[&str] = &[
            "jobstore.toml",
            "jobstore.json",
            "config/jobstore.toml",
            "config/jobstore.json",
        ];

        CANDIDATES
            .iter()
            .map(Path::new)
            .find(|path| path.exists())
            .map(|path| path.to_path_buf())
    }
}
