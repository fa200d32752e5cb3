//! Configuration loading from TOML files.
//!
//! The config file is selected via:
//! 1. `--config <path>` on the command line
//! 2. the `CONFIG_FILE` environment variable
//! 3. `config/dev.toml`
//!
//! Every key has a default, so a partial file (or no file at all) is valid.

use anyhow::{Context, bail};
use metrogate_core::constants::{
    DEFAULT_ACTUATOR_TIMEOUT_MS, DEFAULT_CAPACITY, DEFAULT_COOLDOWN_MS, DEFAULT_DOOR_ID,
    DEFAULT_DWELL_WINDOW_MS, DEFAULT_LOCKOUT_SECS, DEFAULT_MAX_LOGIN_ATTEMPTS,
    DEFAULT_MAX_OPEN_WAIT_SECS, DEFAULT_MAX_SENSOR_FAILURES, DEFAULT_PARTIAL_TIMEOUT_MS,
    DEFAULT_SENSOR_TICK_MS, DEFAULT_SESSION_SWEEP_MS, DEFAULT_SESSION_TIMEOUT_SECS,
    DEFAULT_STALL_HOLD_SECS, DEFAULT_STATUS_INTERVAL_MS, DEFAULT_TELEMETRY_BATCH,
    DEFAULT_TELEMETRY_BUFFER,
};
use metrogate_engine::crossing::CrossingConfig;
use metrogate_engine::door::DoorConfig;
use metrogate_engine::driver::LoopConfig;
use metrogate_engine::registry::CredentialSeed;
use metrogate_engine::{EngineConfig, GateConfig, GateMode, SessionConfig, SessionPolicy};
use metrogate_telemetry::{InfluxConfig, PipelineConfig};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

pub const CONFIG_FILE_ENV: &str = "CONFIG_FILE";
pub const DEFAULT_CONFIG_PATH: &str = "config/dev.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// Value of the `door` tag on access points.
    pub door_id: String,
    /// Upper bound of `people_inside`.
    pub capacity: u64,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            door_id: DEFAULT_DOOR_ID.to_string(),
            capacity: DEFAULT_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GateSection {
    #[serde(default)]
    pub mode: GateMode,
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
}

fn default_cooldown_ms() -> u64 {
    DEFAULT_COOLDOWN_MS
}

impl Default for GateSection {
    fn default() -> Self {
        Self {
            mode: GateMode::default(),
            cooldown_ms: default_cooldown_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DoorSection {
    #[serde(default = "default_actuator_timeout_ms")]
    pub actuator_timeout_ms: u64,
    #[serde(default = "default_max_open_wait_secs")]
    pub max_open_wait_secs: u64,
    #[serde(default = "default_stall_hold_secs")]
    pub stall_hold_secs: u64,
}

fn default_actuator_timeout_ms() -> u64 {
    DEFAULT_ACTUATOR_TIMEOUT_MS
}

fn default_max_open_wait_secs() -> u64 {
    DEFAULT_MAX_OPEN_WAIT_SECS
}

fn default_stall_hold_secs() -> u64 {
    DEFAULT_STALL_HOLD_SECS
}

impl Default for DoorSection {
    fn default() -> Self {
        Self {
            actuator_timeout_ms: default_actuator_timeout_ms(),
            max_open_wait_secs: default_max_open_wait_secs(),
            stall_hold_secs: default_stall_hold_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CrossingSection {
    #[serde(default = "default_dwell_window_ms")]
    pub dwell_window_ms: u64,
    #[serde(default = "default_partial_timeout_ms")]
    pub partial_timeout_ms: u64,
}

fn default_dwell_window_ms() -> u64 {
    DEFAULT_DWELL_WINDOW_MS
}

fn default_partial_timeout_ms() -> u64 {
    DEFAULT_PARTIAL_TIMEOUT_MS
}

impl Default for CrossingSection {
    fn default() -> Self {
        Self {
            dwell_window_ms: default_dwell_window_ms(),
            partial_timeout_ms: default_partial_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionSection {
    #[serde(default)]
    pub policy: SessionPolicy,
    #[serde(default = "default_session_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_login_attempts")]
    pub max_login_attempts: u32,
    #[serde(default = "default_lockout_secs")]
    pub lockout_secs: u64,
}

fn default_session_timeout_secs() -> u64 {
    DEFAULT_SESSION_TIMEOUT_SECS
}

fn default_max_login_attempts() -> u32 {
    DEFAULT_MAX_LOGIN_ATTEMPTS
}

fn default_lockout_secs() -> u64 {
    DEFAULT_LOCKOUT_SECS
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            policy: SessionPolicy::default(),
            timeout_secs: default_session_timeout_secs(),
            max_login_attempts: default_max_login_attempts(),
            lockout_secs: default_lockout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoopsSection {
    #[serde(default = "default_sensor_tick_ms")]
    pub sensor_tick_ms: u64,
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
    #[serde(default = "default_max_sensor_failures")]
    pub max_sensor_failures: u32,
    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u64,
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

fn default_sensor_tick_ms() -> u64 {
    DEFAULT_SENSOR_TICK_MS
}

fn default_sweep_interval_ms() -> u64 {
    DEFAULT_SESSION_SWEEP_MS
}

fn default_max_sensor_failures() -> u32 {
    DEFAULT_MAX_SENSOR_FAILURES
}

fn default_status_interval_ms() -> u64 {
    DEFAULT_STATUS_INTERVAL_MS
}

fn default_shutdown_grace_ms() -> u64 {
    5000
}

impl Default for LoopsSection {
    fn default() -> Self {
        Self {
            sensor_tick_ms: default_sensor_tick_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
            max_sensor_failures: default_max_sensor_failures(),
            status_interval_ms: default_status_interval_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

/// Where telemetry goes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Influx,
    /// In-memory backend; nothing leaves the process.
    Mock,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelemetrySection {
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default)]
    pub influx: InfluxConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSection {
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_health_interval_ms")]
    pub health_interval_ms: u64,
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
}

fn default_buffer_capacity() -> usize {
    DEFAULT_TELEMETRY_BUFFER
}

fn default_batch_size() -> usize {
    DEFAULT_TELEMETRY_BATCH
}

fn default_write_timeout_ms() -> u64 {
    5_000
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_health_interval_ms() -> u64 {
    30_000
}

fn default_flush_interval_ms() -> u64 {
    1_000
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            buffer_capacity: default_buffer_capacity(),
            batch_size: default_batch_size(),
            write_timeout_ms: default_write_timeout_ms(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            health_interval_ms: default_health_interval_ms(),
            flush_interval_ms: default_flush_interval_ms(),
        }
    }
}

/// Daemon configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub gate: GateSection,
    #[serde(default)]
    pub door: DoorSection,
    #[serde(default)]
    pub crossing: CrossingSection,
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub loops: LoopsSection,
    #[serde(default)]
    pub telemetry: TelemetrySection,
    #[serde(default)]
    pub pipeline: PipelineSection,
    /// Credential registry seed. Empty means the built-in accounts.
    #[serde(default)]
    pub credentials: Vec<CredentialSeed>,
}

impl Config {
    /// `--config` wins over `CONFIG_FILE`, which wins over the default path.
    pub fn resolve_path(cli: Option<PathBuf>) -> PathBuf {
        if let Some(path) = cli {
            return path;
        }
        if let Ok(path) = env::var(CONFIG_FILE_ENV)
            && !path.trim().is_empty()
        {
            return PathBuf::from(path);
        }
        PathBuf::from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path`, or the defaults if it does not exist. A file that exists
    /// but does not parse is an error.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            warn!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        Self::from_file(path)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.engine.door_id.trim().is_empty() {
            bail!("engine.door_id must not be empty");
        }
        if self.engine.capacity == 0 {
            bail!("engine.capacity must be at least 1");
        }
        if self.loops.sensor_tick_ms == 0 || self.loops.sweep_interval_ms == 0 {
            bail!("loops.sensor_tick_ms and loops.sweep_interval_ms must be positive");
        }
        if self.loops.status_interval_ms == 0 {
            bail!("loops.status_interval_ms must be positive");
        }
        if self.crossing.partial_timeout_ms > self.crossing.dwell_window_ms {
            bail!("crossing.partial_timeout_ms must not exceed crossing.dwell_window_ms");
        }
        if self.session.max_login_attempts == 0 {
            bail!("session.max_login_attempts must be at least 1");
        }
        self.pipeline_config().validate().context("Invalid [pipeline] section")?;
        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            door_id: self.engine.door_id.trim().to_string(),
            gate: GateConfig {
                mode: self.gate.mode,
                cooldown: Duration::from_millis(self.gate.cooldown_ms),
            },
            door: DoorConfig {
                actuator_timeout: Duration::from_millis(self.door.actuator_timeout_ms),
                max_open_wait: Duration::from_secs(self.door.max_open_wait_secs),
                stall_hold: Duration::from_secs(self.door.stall_hold_secs),
            },
            crossing: CrossingConfig {
                dwell_window: Duration::from_millis(self.crossing.dwell_window_ms),
                partial_timeout: Duration::from_millis(self.crossing.partial_timeout_ms),
            },
            session: SessionConfig {
                policy: self.session.policy,
                timeout: Duration::from_secs(self.session.timeout_secs),
                max_login_attempts: self.session.max_login_attempts,
                lockout: Duration::from_secs(self.session.lockout_secs),
            },
            capacity: self.engine.capacity,
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        let p = &self.pipeline;
        PipelineConfig {
            buffer_capacity: p.buffer_capacity,
            batch_size: p.batch_size,
            write_timeout: Duration::from_millis(p.write_timeout_ms),
            initial_backoff: Duration::from_millis(p.initial_backoff_ms),
            max_backoff: Duration::from_millis(p.max_backoff_ms),
            health_interval: Duration::from_millis(p.health_interval_ms),
            flush_interval: Duration::from_millis(p.flush_interval_ms),
        }
    }

    pub fn loop_config(&self) -> LoopConfig {
        LoopConfig {
            tick: Duration::from_millis(self.loops.sensor_tick_ms),
            sweep_interval: Duration::from_millis(self.loops.sweep_interval_ms),
            max_sensor_failures: self.loops.max_sensor_failures,
        }
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.loops.status_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.loops.shutdown_grace_ms)
    }
}
