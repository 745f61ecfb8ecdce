//! Runtime configuration module.
//!
//! Handles loading and validating `config.toml`. Stock defaults are the base
//! layer; a user file overrides only the keys it names, and command-line
//! flags override both.
//!
//! ## Config File Location
//!
//! Pass `--config <FILE>`, or place `config.toml` in the workspace:
//!
//! ```text
//! workspace/
//! ├── config.toml      # optional
//! ├── grid_num_4
//! └── output/
//! ```
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [source]
//! endpoint = "http://127.0.0.1:9000"  # object store URL or local directory (no default)
//! timeout_secs = 60                   # per-request HTTP timeout
//!
//! [processing]
//! workers = 4               # parallel cell workers (omit for 4)
//! resume = false            # keep cells that already carry a `done` marker
//! footprint_filter = false  # skip scenes whose footprint misses the cell
//!
//! [mosaic]
//! resampling = "bilinear"   # "bilinear" or "nearest"
//! pixel_size_deg = 0.01     # output pixel size (omit for the finest tile)
//! compression = "deflate"   # "deflate" or "none"
//!
//! [logging]
//! level = "info"            # tracing filter directive; RUST_LOG wins
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::cell::CellOptions;
use crate::raster::{Compression, EncodeOptions, MergeOptions, Resampling};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Worker count when neither the command line nor the config sets one.
pub const DEFAULT_WORKERS: usize = 4;

pub const CONFIG_FILE: &str = "config.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Configuration loaded from `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MosaicConfig {
    /// Where scene rasters are read from.
    pub source: SourceConfig,
    /// Worker pool and per-cell behavior.
    pub processing: ProcessingConfig,
    /// Final mosaic settings.
    pub mosaic: MergeConfig,
    pub logging: LoggingConfig,
}

impl MosaicConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.processing.workers == Some(0) {
            return Err(ConfigError::Validation(
                "processing.workers must be at least 1".into(),
            ));
        }
        if self.source.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "source.timeout_secs must be at least 1".into(),
            ));
        }
        if self
            .mosaic
            .pixel_size_deg
            .is_some_and(|size| !(size > 0.0 && size.is_finite()))
        {
            return Err(ConfigError::Validation(
                "mosaic.pixel_size_deg must be a positive number".into(),
            ));
        }
        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::Validation(
                "logging.level must not be empty".into(),
            ));
        }
        Ok(())
    }

    pub fn cell_options(&self) -> CellOptions {
        CellOptions {
            footprint_filter: self.processing.footprint_filter,
            encode: self.encode_options(),
        }
    }

    pub fn encode_options(&self) -> EncodeOptions {
        EncodeOptions {
            compression: self.mosaic.compression,
        }
    }

    pub fn merge_options(&self) -> MergeOptions {
        MergeOptions {
            resampling: self.mosaic.resampling,
            pixel_size_deg: self.mosaic.pixel_size_deg,
        }
    }
}

/// Raster source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceConfig {
    /// Object-store URL or local directory. `--endpoint` overrides it.
    pub endpoint: Option<String>,
    pub timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: 60,
        }
    }
}

impl SourceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Number of parallel cell workers. When absent, [`DEFAULT_WORKERS`].
    pub workers: Option<usize>,
    /// Leave cells that already carry a `done` marker untouched.
    pub resume: bool,
    /// Drop candidates whose footprint box does not intersect the cell.
    pub footprint_filter: bool,
}

/// Resolve the worker count: command line, then config, then the default.
///
/// The operator's count is used as given; cell work is mostly waiting on
/// reads, so more workers than cores is reasonable.
pub fn effective_workers(config: &ProcessingConfig, cli: Option<usize>) -> usize {
    cli.or(config.workers).unwrap_or(DEFAULT_WORKERS).max(1)
}

/// Mosaic output settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MergeConfig {
    pub resampling: Resampling,
    /// Output pixel size in degrees. When absent, the finest tile pixel size.
    pub pixel_size_deg: Option<f64>,
    /// Compression of tiles and the mosaic.
    pub compression: Compression,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// `tracing` filter directive, e.g. `info` or `cloudless_mosaic=debug`.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(MosaicConfig::default()).unwrap_or_else(|_| toml::Value::Table(Default::default()))
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Merge an optional overlay onto the stock defaults, then deserialize and
/// validate.
pub fn resolve_config(overlay: Option<toml::Value>) -> Result<MosaicConfig, ConfigError> {
    let base = stock_defaults_value();
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: MosaicConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load an explicit config file. The file must exist.
pub fn load_config_file(path: &Path) -> Result<MosaicConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    resolve_config(Some(value))
}

/// Load `config.toml` from `dir`, falling back to stock defaults when the
/// file does not exist.
pub fn load_config(dir: &Path) -> Result<MosaicConfig, ConfigError> {
    let path = dir.join(CONFIG_FILE);
    if !path.exists() {
        return resolve_config(None);
    }
    load_config_file(&path)
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Cloudless Mosaic Configuration
# ==============================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Place this file at <workspace>/config.toml or pass --config <FILE>.
# Command-line flags override values set here.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Raster source
# ---------------------------------------------------------------------------
[source]
# Object-store endpoint (http:// or https://) or a local directory laid out
# as <endpoint>/<bucket>/<path>. No default; --endpoint overrides it.
# endpoint = "http://127.0.0.1:9000"

# Timeout for each HTTP request, in seconds.
timeout_secs = 60

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Number of cells processed in parallel. Omit for 4; --workers overrides it.
# workers = 4

# Keep cells that already carry a `done` marker from an earlier run.
resume = false

# Skip candidate scenes whose footprint does not reach the cell.
footprint_filter = false

# ---------------------------------------------------------------------------
# Mosaic
# ---------------------------------------------------------------------------
[mosaic]
# Resampling used to fit tiles onto the mosaic grid: "bilinear" or "nearest".
resampling = "bilinear"

# Output pixel size in degrees. Omit to use the finest tile pixel size.
# pixel_size_deg = 0.01

# GeoTIFF compression for tiles and the mosaic: "deflate" or "none".
compression = "deflate"

# ---------------------------------------------------------------------------
# Logging
# ---------------------------------------------------------------------------
[logging]
# tracing filter directive. The RUST_LOG environment variable takes priority.
level = "info"
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_values() {
        let config = MosaicConfig::default();
        assert_eq!(config.source.endpoint, None);
        assert_eq!(config.source.timeout_secs, 60);
        assert_eq!(config.processing.workers, None);
        assert!(!config.processing.resume);
        assert!(!config.processing.footprint_filter);
        assert_eq!(config.mosaic.resampling, Resampling::Bilinear);
        assert_eq!(config.mosaic.compression, Compression::Deflate);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn parse_partial_config() {
        let toml = r#"
[processing]
workers = 8
"#;
        let config: MosaicConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.processing.workers, Some(8));
        assert_eq!(config.source.timeout_secs, 60);
        assert_eq!(config.mosaic.resampling, Resampling::Bilinear);
    }

    #[test]
    fn derived_options() {
        let toml = r#"
[processing]
footprint_filter = true

[mosaic]
resampling = "nearest"
pixel_size_deg = 0.25
compression = "none"
"#;
        let config: MosaicConfig = toml::from_str(toml).unwrap();
        let merge = config.merge_options();
        assert_eq!(merge.resampling, Resampling::Nearest);
        assert_eq!(merge.pixel_size_deg, Some(0.25));
        let cell = config.cell_options();
        assert!(cell.footprint_filter);
        assert_eq!(cell.encode.compression, Compression::None);
    }

    // =========================================================================
    // load_config tests
    // =========================================================================

    #[test]
    fn load_config_returns_default_when_no_file() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.source.timeout_secs, 60);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn load_config_reads_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("config.toml"),
            r#"
[source]
endpoint = "http://minio:9000"

[logging]
level = "debug"
"#,
        )
        .unwrap();

        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.source.endpoint.as_deref(), Some("http://minio:9000"));
        assert_eq!(config.logging.level, "debug");
        // Unspecified values should be defaults
        assert_eq!(config.source.timeout_secs, 60);
    }

    #[test]
    fn load_config_file_must_exist() {
        let tmp = TempDir::new().unwrap();
        let result = load_config_file(&tmp.path().join("missing.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("config.toml"), "this is not valid toml [[[").unwrap();
        assert!(matches!(load_config(tmp.path()), Err(ConfigError::Toml(_))));
    }

    // =========================================================================
    // Worker count
    // =========================================================================

    #[test]
    fn effective_workers_precedence() {
        let none = ProcessingConfig::default();
        let six = ProcessingConfig {
            workers: Some(6),
            ..Default::default()
        };
        assert_eq!(effective_workers(&none, None), DEFAULT_WORKERS);
        assert_eq!(effective_workers(&six, None), 6);
        assert_eq!(effective_workers(&six, Some(2)), 2);
    }

    #[test]
    fn effective_workers_not_capped_at_cores() {
        let config = ProcessingConfig::default();
        assert_eq!(effective_workers(&config, Some(512)), 512);
    }

    // =========================================================================
    // Unknown keys and validation
    // =========================================================================

    #[test]
    fn unknown_key_rejected() {
        let toml = r#"
[processing]
max_processes = 4
"#;
        assert!(toml::from_str::<MosaicConfig>(toml).is_err());
    }

    #[test]
    fn unknown_section_rejected() {
        assert!(toml::from_str::<MosaicConfig>("[cache]\nsize = 1\n").is_err());
    }

    #[test]
    fn unknown_resampling_rejected() {
        let toml = r#"
[mosaic]
resampling = "lanczos"
"#;
        assert!(toml::from_str::<MosaicConfig>(toml).is_err());
    }

    #[test]
    fn validate_zero_workers() {
        let mut config = MosaicConfig::default();
        config.processing.workers = Some(0);
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn validate_zero_timeout() {
        let mut config = MosaicConfig::default();
        config.source.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_pixel_size() {
        let mut config = MosaicConfig::default();
        config.mosaic.pixel_size_deg = Some(-0.5);
        assert!(config.validate().is_err());
        config.mosaic.pixel_size_deg = Some(0.5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn load_config_validates_values() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("config.toml"), "[processing]\nworkers = 0\n").unwrap();
        assert!(matches!(
            load_config(tmp.path()),
            Err(ConfigError::Validation(_))
        ));
    }

    // =========================================================================
    // merge_toml tests
    // =========================================================================

    #[test]
    fn merge_toml_scalar_override() {
        let base: toml::Value = toml::from_str("a = 1\nb = 2").unwrap();
        let overlay: toml::Value = toml::from_str("b = 3").unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged.get("a").unwrap().as_integer(), Some(1));
        assert_eq!(merged.get("b").unwrap().as_integer(), Some(3));
    }

    #[test]
    fn merge_toml_table_merge() {
        let merged = merge_toml(
            stock_defaults_value(),
            toml::from_str("[processing]\nresume = true").unwrap(),
        );
        let processing = merged.get("processing").unwrap();
        assert_eq!(processing.get("resume").unwrap().as_bool(), Some(true));
        assert_eq!(processing.get("footprint_filter").unwrap().as_bool(), Some(false));
    }

    // =========================================================================
    // stock_config_toml tests
    // =========================================================================

    #[test]
    fn stock_config_toml_is_valid_toml() {
        let content = stock_config_toml();
        let _: toml::Value = toml::from_str(content).expect("stock config must be valid TOML");
    }

    #[test]
    fn stock_config_toml_roundtrips_to_defaults() {
        let config: MosaicConfig = toml::from_str(stock_config_toml()).unwrap();
        assert_eq!(config.source.endpoint, None);
        assert_eq!(config.source.timeout_secs, 60);
        assert_eq!(config.processing.workers, None);
        assert_eq!(config.mosaic.resampling, Resampling::Bilinear);
        assert_eq!(config.mosaic.pixel_size_deg, None);
        assert_eq!(config.mosaic.compression, Compression::Deflate);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn stock_config_toml_contains_all_sections() {
        let content = stock_config_toml();
        assert!(content.contains("[source]"));
        assert!(content.contains("[processing]"));
        assert!(content.contains("[mosaic]"));
        assert!(content.contains("[logging]"));
    }

    #[test]
    fn stock_defaults_value_has_all_sections() {
        let val = stock_defaults_value();
        assert!(val.is_table());
        assert!(val.get("source").is_some());
        assert!(val.get("processing").is_some());
        assert!(val.get("mosaic").is_some());
        assert!(val.get("logging").is_some());
    }
}
