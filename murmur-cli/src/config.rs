//! CLI configuration: TOML files with include-merge over defaults.

use color_eyre::eyre::{Context, Result};
use murmur_core::config::TransportConfig;
use murmur_core::processor::ProcessorConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};

/// Deep merge JSON values - override takes precedence over base.
/// Objects merge recursively; arrays and primitives are replaced.
fn merge_json_values(base: &mut JsonValue, override_val: JsonValue) {
    match (base, override_val) {
        (JsonValue::Object(base_map), JsonValue::Object(override_map)) => {
            for (key, value) in override_map {
                if let Some(base_value) = base_map.get_mut(&key) {
                    merge_json_values(base_value, value);
                } else {
                    base_map.insert(key, value);
                }
            }
        }
        (base_val, override_val) => {
            *base_val = override_val;
        }
    }
}

/// Complete CLI configuration bundle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    /// Path(s) to other config file(s) to merge in first, resolved relative
    /// to this file's directory
    #[serde(default)]
    pub include: Vec<String>,

    /// Processor configuration (physical layer + AGC)
    #[serde(default = "default_processor")]
    pub processor: ProcessorConfig,

    /// XMODEM transport parameters
    #[serde(default)]
    pub transport: TransportConfig,

    /// Terminal interface configuration
    #[serde(default)]
    pub terminal: TerminalConfig,
}

fn default_processor() -> ProcessorConfig {
    ProcessorConfig::fsk_duplex(true)
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            include: Vec::new(),
            processor: default_processor(),
            transport: TransportConfig::default(),
            terminal: TerminalConfig::default(),
        }
    }
}

/// Terminal interface configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalConfig {
    /// Output WAV filename for `encode` (optional)
    #[serde(default)]
    pub wav_output: Option<PathBuf>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Telemetry sampling interval in seconds
    #[serde(default = "default_telemetry_interval")]
    pub telemetry_interval_secs: f64,
}

fn default_telemetry_interval() -> f64 {
    1.0
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            wav_output: None,
            logging: LoggingConfig::default(),
            telemetry_interval_secs: default_telemetry_interval(),
        }
    }
}

/// Logging output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_target")]
    pub target: LogTarget,

    /// Log file path (if target is File)
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    #[serde(default = "default_log_format")]
    pub format: LogFormat,

    #[serde(default = "default_log_level")]
    pub level: LogLevel,
}

fn default_log_target() -> LogTarget {
    LogTarget::Stderr
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            target: default_log_target(),
            file_path: None,
            format: default_log_format(),
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    Stdout,
    Stderr,
    File,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Logfmt,
    Pretty,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl CliConfig {
    /// Load configuration from a TOML file, merging any `include` files in
    /// order beneath it, all over the built-in defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read config file: {}", path.display()))?;

        let config_toml: toml::Value =
            toml::from_str(&content).wrap_err("Failed to parse TOML configuration")?;
        let mut config_json =
            serde_json::to_value(&config_toml).wrap_err("Failed to convert TOML to JSON")?;

        let includes = match config_json.get("include") {
            Some(JsonValue::String(s)) => vec![s.clone()],
            Some(JsonValue::Array(values)) => values
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect(),
            _ => Vec::new(),
        };
        if let JsonValue::Object(map) = &mut config_json {
            map.remove("include");
        }

        let mut merged = serde_json::to_value(Self::default())
            .wrap_err("Failed to serialize default config")?;

        for include_path in &includes {
            let full_path = if Path::new(include_path).is_absolute() {
                PathBuf::from(include_path)
            } else {
                path.parent()
                    .unwrap_or_else(|| Path::new("."))
                    .join(include_path)
            };
            let included = Self::from_file(&full_path).wrap_err_with(|| {
                format!("Failed to load included config: {}", full_path.display())
            })?;
            let included_json = serde_json::to_value(&included)
                .wrap_err("Failed to convert included config")?;
            merge_json_values(&mut merged, included_json);
        }

        merge_json_values(&mut merged, config_json);
        let config: CliConfig =
            serde_json::from_value(merged).wrap_err("Failed to parse final configuration")?;
        Ok(config)
    }
}
