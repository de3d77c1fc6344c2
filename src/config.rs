use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::NanonisError;
use crate::nanonis::client::{ConnectionConfig, DEFAULT_PORT, LimitKind};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub nanonis: NanonisConfig,
    pub limits: Limits,
    pub console: ConsoleConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct NanonisConfig {
    pub host_ip: String,
    pub control_port: u16,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
}

impl Default for NanonisConfig {
    fn default() -> Self {
        Self {
            host_ip: "127.0.0.1".to_string(),
            control_port: DEFAULT_PORT,
            connect_timeout_ms: 5_000,
            read_timeout_ms: 10_000,
            write_timeout_ms: 5_000,
        }
    }
}

impl NanonisConfig {
    pub fn connection(&self) -> ConnectionConfig {
        ConnectionConfig {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            write_timeout: Duration::from_millis(self.write_timeout_ms),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ConsoleConfig {
    pub verbosity: String,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            verbosity: "info".to_string(),
        }
    }
}

/// Safety bounds for named commands, in base units (V, m, A).
///
/// Scanner limits are magnitudes: X must lie in `[-x_scanner, x_scanner]`.
/// `None` leaves a quantity unchecked.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct Limits {
    pub bias: f64,
    pub x_scanner: f64,
    pub y_scanner: f64,
    pub z_scanner: Option<f64>,
    pub lower_setpoint: Option<f64>,
    pub upper_setpoint: Option<f64>,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            bias: 10.0,
            x_scanner: 1e-6,
            y_scanner: 1e-6,
            z_scanner: None,
            lower_setpoint: None,
            upper_setpoint: None,
        }
    }
}

impl Limits {
    /// Scanner limits from the piezo ranges reported by `Piezo.RangeGet`.
    /// The scanner is centred, so each axis reaches half its range.
    pub fn from_piezo_range(self, range: [f32; 3]) -> Self {
        Self {
            x_scanner: range[0] as f64 / 2.0,
            y_scanner: range[1] as f64 / 2.0,
            z_scanner: Some(range[2] as f64 / 2.0),
            ..self
        }
    }

    fn bounds(&self, kind: LimitKind) -> (Option<f64>, Option<f64>) {
        let symmetric = |limit: f64| (Some(-limit), Some(limit));
        match kind {
            LimitKind::Bias => symmetric(self.bias),
            LimitKind::XScanner => symmetric(self.x_scanner),
            LimitKind::YScanner => symmetric(self.y_scanner),
            LimitKind::ZScanner => self.z_scanner.map_or((None, None), symmetric),
            LimitKind::Setpoint => (self.lower_setpoint, self.upper_setpoint),
        }
    }

    pub fn check(&self, kind: LimitKind, name: &str, value: f64) -> Result<(), NanonisError> {
        if value.is_nan() {
            return Err(NanonisError::InvalidValue(format!("{name}: NaN")));
        }
        let (lower, upper) = self.bounds(kind);
        let below = lower.is_some_and(|l| value < l);
        let above = upper.is_some_and(|u| value > u);
        if below || above {
            return Err(NanonisError::InvalidValue(format!(
                "{name}: {value} out of bounds [{}, {}]",
                lower.map_or("-inf".to_string(), |l| l.to_string()),
                upper.map_or("inf".to_string(), |u| u.to_string()),
            )));
        }
        Ok(())
    }
}

/// Load configuration from file with layered fallbacks
pub fn load_config(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder().add_source(Config::try_from(&AppConfig::default())?);

    if let Some(path) = config_path {
        if path.exists() {
            builder = builder.add_source(File::from(path));
        } else {
            return Err(ConfigError::Message(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
    } else if Path::new("nanonis.toml").exists() {
        builder = builder.add_source(File::with_name("nanonis.toml"));
    }

    // Environment overrides, e.g. NANONIS__NANONIS__HOST_IP=10.0.0.2
    builder = builder.add_source(
        Environment::with_prefix("NANONIS")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize::<AppConfig>()
}

/// Load configuration, falling back to defaults when nothing usable is found
pub fn load_config_or_default(config_path: Option<&Path>) -> AppConfig {
    match load_config(config_path) {
        Ok(config) => {
            log::info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            log::warn!("Failed to load config ({}), using defaults", e);
            AppConfig::default()
        }
    }
}
