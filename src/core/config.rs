//! Configuration management for veriscan.

use crate::core::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Scan engine settings
    #[serde(default)]
    pub scan: ScanConfig,
    /// Heuristic scorer settings
    #[serde(default)]
    pub heuristics: HeuristicConfig,
    /// Signature store settings
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Realtime monitor settings
    #[serde(default)]
    pub realtime: RealtimeConfig,
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigLoad(format!("Failed to read config file: {}", e)))?;

        serde_json::from_str(&contents)
            .map_err(|e| Error::ConfigLoad(format!("Failed to parse config file: {}", e)))
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::ConfigSave(format!("Failed to create config directory: {}", e))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| Error::ConfigSave(format!("Failed to write config file: {}", e)))
    }

    /// Load configuration from default location, or create default if not exists.
    pub fn load_or_default() -> Self {
        let config_path = Self::default_config_path();

        if config_path.exists() {
            match Self::load(&config_path).and_then(|c| c.validate().map(|_| c)) {
                Ok(config) => return config,
                Err(e) => {
                    log::warn!("Failed to load config, using defaults: {}", e);
                }
            }
        }

        let config = Self::default();

        if let Err(e) = config.save(&config_path) {
            log::warn!("Failed to save default config: {}", e);
        }

        config
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        Self::data_dir().join("config.json")
    }

    /// Get the application data directory.
    pub fn data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| std::env::temp_dir())
            .join("veriscan")
    }

    /// Validate the configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.scan.max_file_size_mb == 0 {
            return Err(invalid("scan.max_file_size_mb", "Must be greater than 0"));
        }

        if self.scan.worker_threads == 0 {
            return Err(invalid("scan.worker_threads", "Must be greater than 0"));
        }

        if self.scan.external_engine.enabled && self.scan.external_engine.program.trim().is_empty() {
            return Err(invalid("scan.external_engine.program", "Must not be empty when enabled"));
        }

        if !(0.0..=8.0).contains(&self.heuristics.entropy_threshold) {
            return Err(invalid("heuristics.entropy_threshold", "Must be between 0 and 8"));
        }

        if self.database.expected_signatures == 0 || self.database.expected_domains == 0 {
            return Err(invalid("database.expected_*", "Capacities must be greater than 0"));
        }

        let fpp = self.database.false_positive_rate;
        if !(fpp > 0.0 && fpp < 1.0) {
            return Err(invalid(
                "database.false_positive_rate",
                "Must be strictly between 0 and 1",
            ));
        }

        if self.realtime.worker_threads == 0 {
            return Err(invalid("realtime.worker_threads", "Must be greater than 0"));
        }

        if self.realtime.max_tracked_paths == 0 {
            return Err(invalid("realtime.max_tracked_paths", "Must be greater than 0"));
        }

        Ok(())
    }
}

fn invalid(field: &str, message: &str) -> Error {
    Error::ConfigInvalid {
        field: field.to_string(),
        message: message.to_string(),
    }
}

/// Scan engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Skip files larger than this size (MB)
    pub max_file_size_mb: u64,
    /// Batch worker pool size
    pub worker_threads: usize,
    /// Seconds `stop_scan` waits for in-flight files before detaching them
    pub stop_grace_secs: u64,
    /// Look inside ZIP-family containers for known entries
    pub scan_archives: bool,
    /// Skip archive entries larger than this size (MB)
    pub max_archive_entry_mb: u64,
    /// Maximum number of entries inspected per archive
    pub max_archive_entries: usize,
    /// Delegate clean files to an external scanner
    pub external_engine: ExternalEngineConfig,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: 100,
            worker_threads: num_cpus(),
            stop_grace_secs: 5,
            scan_archives: true,
            max_archive_entry_mb: 50,
            max_archive_entries: 10_000,
            external_engine: ExternalEngineConfig::default(),
        }
    }
}

impl ScanConfig {
    /// Maximum scannable file size in bytes.
    pub fn max_file_size(&self) -> u64 {
        self.max_file_size_mb * 1024 * 1024
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }
}

/// External scanner invoked as `program args... <file>`.
///
/// Exit code 0 means clean and 1 means infected; anything else is a failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalEngineConfig {
    pub enabled: bool,
    /// Executable name (searched on PATH) or path
    pub program: String,
    pub args: Vec<String>,
}

impl Default for ExternalEngineConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            program: "clamdscan".to_string(),
            args: vec!["--no-summary".to_string()],
        }
    }
}

/// Heuristic scorer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicConfig {
    /// Entropy above this value flags packed/encrypted content
    pub entropy_threshold: f64,
    /// Leading bytes sampled for entropy
    pub entropy_sample_bytes: usize,
    /// Score above this value marks a file suspicious
    pub suspicious_threshold: u32,
    /// Filename suffixes treated as suspicious (checked case-insensitively)
    pub suspicious_extensions: Vec<String>,
    /// Files smaller than this are anomalously small
    pub small_file_bytes: u64,
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        Self {
            entropy_threshold: 7.5,
            entropy_sample_bytes: 1024 * 1024,
            suspicious_threshold: 50,
            suspicious_extensions: [".exe", ".scr", ".bat", ".cmd", ".vbs", ".js"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            small_file_bytes: 100,
        }
    }
}

/// Signature store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Expected number of digests per algorithm filter
    pub expected_signatures: u64,
    /// Target false-positive rate of every filter
    pub false_positive_rate: f64,
    /// Expected number of malicious domains
    pub expected_domains: u64,
    /// Database file location (defaults to the data directory)
    pub database_path: Option<PathBuf>,
    /// Write the exact signature index alongside the filters
    pub persist_exact_index: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            expected_signatures: 10_000_000,
            false_positive_rate: 0.001,
            expected_domains: 1_000_000,
            database_path: None,
            persist_exact_index: true,
        }
    }
}

impl DatabaseConfig {
    /// Get the effective database file path.
    pub fn database_file(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| Config::data_dir().join("signatures.sgdb"))
    }
}

/// Realtime monitor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Per-path debounce window in milliseconds
    pub cooldown_ms: u64,
    /// Background scan pool size
    pub worker_threads: usize,
    /// Cap on paths remembered by the cooldown cache
    pub max_tracked_paths: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: 2000,
            worker_threads: (num_cpus() / 2).max(1),
            max_tracked_paths: 100_000,
        }
    }
}

impl RealtimeConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Enable verbose console output
    pub verbose_console: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            verbose_console: false,
        }
    }
}

/// Get the number of CPUs, with a reasonable default.
pub(crate) fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scan.max_file_size(), 100 * 1024 * 1024);
        assert_eq!(config.realtime.cooldown(), Duration::from_millis(2000));
        assert_eq!(config.heuristics.suspicious_threshold, 50);
        assert!(!config.scan.external_engine.enabled);
        assert_eq!(config.scan.external_engine.program, "clamdscan");
    }

    #[test]
    fn test_config_save_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::default();
        config.scan.max_file_size_mb = 42;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.scan.max_file_size_mb, 42);
        assert_eq!(loaded.realtime.cooldown_ms, config.realtime.cooldown_ms);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let loaded: Config = serde_json::from_str(r#"{"scan": {"max_file_size_mb": 7}}"#).unwrap();
        assert_eq!(loaded.scan.max_file_size_mb, 7);
        assert_eq!(loaded.scan.stop_grace_secs, 5);
        assert_eq!(loaded.database.expected_signatures, 10_000_000);
    }

    #[test]
    fn test_invalid_config() {
        let mut config = Config::default();
        config.scan.max_file_size_mb = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.database.false_positive_rate = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.scan.external_engine.enabled = true;
        config.scan.external_engine.program = " ".to_string();
        assert!(config.validate().is_err());
    }
}
