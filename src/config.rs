//! Configuration System using Figment
//!
//! Strongly-typed configuration for the simulator. Values are layered, later
//! sources overriding earlier ones:
//! 1. Built-in defaults (two channels, one-second time unit, `/tmp/multimeter.sock`)
//! 2. An optional TOML file (missing files are ignored)
//! 3. Environment variables prefixed with `MULTIMETER_`, nested keys separated by `__`
//!
//! The channel count and socket path are read once at startup and stay fixed
//! for the lifetime of the process.
//!
//! # Example
//! ```no_run
//! use multimeter_sim::config::MultimeterConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // MULTIMETER_INSTRUMENT__CHANNEL_COUNT=4 overrides the file value
//! let config = MultimeterConfig::load_from("config/multimeter.toml")?;
//! config.validate()?;
//! println!("{} channels on {}", config.instrument.channel_count, config.server.socket_path.display());
//! # Ok(())
//! # }
//! ```

use crate::error::{AppResult, MultimeterError};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Well-known socket path shared by server and client.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/multimeter.sock";

/// Number of channels when nothing else is configured.
pub const DEFAULT_CHANNEL_COUNT: usize = 2;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/multimeter.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "MULTIMETER_";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MultimeterConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Simulated instrument layout
    #[serde(default)]
    pub instrument: InstrumentConfig,
    /// Background simulation timing and probabilities
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Socket server settings
    #[serde(default)]
    pub server: ServerConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Instrument layout
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstrumentConfig {
    /// Number of channels, named `channel0..channel{N-1}`
    #[serde(default = "default_channel_count")]
    pub channel_count: usize,
}

/// Simulation timing.
///
/// Intervals are expressed in whole time units so the whole simulation can be
/// sped up by shrinking `time_unit` alone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationConfig {
    /// Length of one simulation time unit
    #[serde(default = "default_time_unit", with = "humantime_serde")]
    pub time_unit: Duration,
    /// Units between voltage samples
    #[serde(default = "default_sample_interval")]
    pub sample_interval: u32,
    /// Lower bound (inclusive) of the perturber's sleep, in units
    #[serde(default = "default_perturb_min")]
    pub perturb_interval_min: u32,
    /// Upper bound (inclusive) of the perturber's sleep, in units
    #[serde(default = "default_perturb_max")]
    pub perturb_interval_max: u32,
    /// Units a Busy channel waits before recovering to Measuring
    #[serde(default = "default_busy_recovery_delay")]
    pub busy_recovery_delay: u32,
    /// Probability that a perturbed Measuring channel fails into Error
    #[serde(default = "default_error_probability")]
    pub error_probability: f64,
    /// Cumulative threshold below which a perturbed channel becomes Busy
    #[serde(default = "default_busy_probability")]
    pub busy_probability: f64,
    /// Fixed RNG seed for reproducible runs
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Socket server settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Filesystem path of the Unix socket
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,
}

// Default value functions
fn default_name() -> String {
    "Multimeter Simulator".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_channel_count() -> usize {
    DEFAULT_CHANNEL_COUNT
}

fn default_time_unit() -> Duration {
    Duration::from_secs(1)
}

fn default_sample_interval() -> u32 {
    1
}

fn default_perturb_min() -> u32 {
    10
}

fn default_perturb_max() -> u32 {
    15
}

fn default_busy_recovery_delay() -> u32 {
    10
}

fn default_error_probability() -> f64 {
    0.02
}

fn default_busy_probability() -> f64 {
    0.20
}

fn default_socket_path() -> PathBuf {
    PathBuf::from(DEFAULT_SOCKET_PATH)
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
        }
    }
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            channel_count: default_channel_count(),
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            time_unit: default_time_unit(),
            sample_interval: default_sample_interval(),
            perturb_interval_min: default_perturb_min(),
            perturb_interval_max: default_perturb_max(),
            busy_recovery_delay: default_busy_recovery_delay(),
            error_probability: default_error_probability(),
            busy_probability: default_busy_probability(),
            seed: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
        }
    }
}

impl SimulationConfig {
    /// Convert a number of time units into wall-clock time.
    pub fn units(&self, units: u32) -> Duration {
        self.time_unit.saturating_mul(units)
    }

    /// Period of the voltage sampler.
    pub fn sample_period(&self) -> Duration {
        self.units(self.sample_interval)
    }

    /// Delay before a Busy channel is restored.
    pub fn recovery_delay(&self) -> Duration {
        self.units(self.busy_recovery_delay)
    }

    /// Reject timings and probabilities the background tasks cannot run with.
    pub fn validate(&self) -> AppResult<()> {
        if self.time_unit.is_zero() {
            return Err(MultimeterError::Configuration(
                "time_unit must be greater than zero".to_string(),
            ));
        }
        if self.sample_interval == 0 {
            return Err(MultimeterError::Configuration(
                "sample_interval must be at least 1 unit".to_string(),
            ));
        }
        if self.perturb_interval_min == 0 || self.perturb_interval_min > self.perturb_interval_max {
            return Err(MultimeterError::Configuration(format!(
                "Invalid perturbation interval [{}, {}]",
                self.perturb_interval_min, self.perturb_interval_max
            )));
        }
        let probabilities_ok = (0.0..=1.0).contains(&self.error_probability)
            && (0.0..=1.0).contains(&self.busy_probability)
            && self.error_probability <= self.busy_probability;
        if !probabilities_ok {
            return Err(MultimeterError::Configuration(format!(
                "Invalid perturbation thresholds: error={} busy={} (need 0 <= error <= busy <= 1)",
                self.error_probability, self.busy_probability
            )));
        }

        Ok(())
    }
}

impl MultimeterConfig {
    /// Load configuration from the default file location and environment.
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path and environment.
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        Ok(Self::figment(path.as_ref()).extract()?)
    }

    /// The layered provider chain, exposed for callers that merge CLI overrides.
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(MultimeterConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(MultimeterError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.instrument.channel_count == 0 {
            return Err(MultimeterError::Configuration(
                "channel_count must be at least 1".to_string(),
            ));
        }

        self.simulation.validate()?;

        if self.server.socket_path.as_os_str().is_empty() {
            return Err(MultimeterError::Configuration(
                "socket_path must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}
