//! TOML config loading, env overrides and validation for the controller and
//! its monitoring loop.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Config path used when `CONFIG_PATH` is unset.
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// pH scale bounds accepted for the setpoint.
const PH_SCALE_MIN: f64 = 0.0;
const PH_SCALE_MAX: f64 = 14.0;

// ---------------------------------------------------------------------------
// Config file structures
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub sim: SimConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub optimal_ph: f64,
    pub ph_tolerance: f64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            optimal_ph: 6.0,
            ph_tolerance: 0.5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub duration_seconds: f64,
    pub interval_seconds: f64,
    /// History length at which the model is trained.
    pub training_threshold: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            duration_seconds: 60.0,
            interval_seconds: 5.0,
            training_threshold: 10,
        }
    }
}

impl MonitorConfig {
    /// Total run length.  Fails for negative, non-finite or out-of-range values.
    pub fn duration(&self) -> Result<Duration> {
        Duration::try_from_secs_f64(self.duration_seconds).with_context(|| {
            format!(
                "monitor: duration_seconds must be non-negative and representable, got {}",
                self.duration_seconds
            )
        })
    }

    /// Tick period.  Values that round down to zero are rejected;
    /// `tokio::time::interval` panics on a zero period.
    pub fn interval(&self) -> Result<Duration> {
        let interval = Duration::try_from_secs_f64(self.interval_seconds)
            .ok()
            .filter(|d| !d.is_zero());
        match interval {
            Some(d) => Ok(d),
            None => bail!(
                "monitor: interval_seconds must be positive and representable, got {}",
                self.interval_seconds
            ),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimConfig {
    /// Fixed RNG seed; `None` seeds from entropy.
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl Config {
    /// Validate all sections. Returns `Ok(())` or an error describing every
    /// violation found (not just the first one).
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        self.validate_controller(&mut errors);
        self.validate_monitor(&mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "config validation failed ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }

    fn validate_controller(&self, errors: &mut Vec<String>) {
        let c = &self.controller;

        if !c.optimal_ph.is_finite() || !(PH_SCALE_MIN..=PH_SCALE_MAX).contains(&c.optimal_ph) {
            errors.push(format!(
                "controller: optimal_ph {} out of range [{PH_SCALE_MIN}, {PH_SCALE_MAX}]",
                c.optimal_ph
            ));
        }
        if !c.ph_tolerance.is_finite() || c.ph_tolerance < 0.0 {
            errors.push(format!(
                "controller: ph_tolerance must be non-negative, got {}",
                c.ph_tolerance
            ));
        }
    }

    fn validate_monitor(&self, errors: &mut Vec<String>) {
        let m = &self.monitor;

        if let Err(e) = m.interval() {
            errors.push(e.to_string());
        }
        if let Err(e) = m.duration() {
            errors.push(e.to_string());
        }
        if m.training_threshold == 0 {
            errors.push("monitor: training_threshold must be at least 1".to_string());
        }
    }

    /// Apply `SIM_SEED`, `MONITOR_DURATION_S` and `MONITOR_INTERVAL_S`
    /// overrides.  `lookup` abstracts the environment for tests.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(seed) = parse_env(&lookup, "SIM_SEED") {
            self.sim.seed = Some(seed);
        }
        if let Some(secs) = parse_env(&lookup, "MONITOR_DURATION_S") {
            self.monitor.duration_seconds = secs;
        }
        if let Some(secs) = parse_env(&lookup, "MONITOR_INTERVAL_S") {
            self.monitor.interval_seconds = secs;
        }
    }
}

fn parse_env<F, T>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable env override");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Read, parse, and validate a TOML config file.
pub fn load(path: &str) -> Result<Config> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("failed to read config: {path}"))?;
    let config = parse(&contents).with_context(|| format!("invalid config: {path}"))?;
    Ok(config)
}

/// Parse and validate TOML config text.
pub fn parse(contents: &str) -> Result<Config> {
    let config: Config = toml::from_str(contents).context("failed to parse config")?;
    config.validate()?;
    Ok(config)
}

/// Resolve the config from `CONFIG_PATH` and the environment.
///
/// An explicit `CONFIG_PATH` must exist.  When unset, `config.toml` is used
/// if present and built-in defaults otherwise.
pub fn from_env() -> Result<Config> {
    let mut config = match std::env::var("CONFIG_PATH") {
        Ok(path) => load(&path)?,
        Err(_) if Path::new(DEFAULT_CONFIG_PATH).exists() => load(DEFAULT_CONFIG_PATH)?,
        Err(_) => {
            tracing::info!("no {DEFAULT_CONFIG_PATH} found, using built-in defaults");
            Config::default()
        }
    };

    config.apply_env(|key| std::env::var(key).ok());
    config
        .validate()
        .context("invalid config after env overrides")?;
    Ok(config)
}

// ===========================================================================
// Tests
// ===========================================================================
