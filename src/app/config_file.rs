//! Config file loading for CLI defaults.
//!
//! The file is a flat list of `key = value` lines. Strings are
//! double-quoted, `#` starts a comment outside strings.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

/// File-backed defaults for the batch fetcher.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct FileConfig {
    /// Default output folder.
    pub(crate) output_dir: Option<PathBuf>,
    /// Default concurrency (same range as CLI).
    pub(crate) concurrency: Option<u8>,
    /// Default maximum attempts per URL.
    pub(crate) max_attempts: Option<u8>,
    /// Default per-request timeout in milliseconds.
    pub(crate) timeout_ms: Option<u64>,
    /// Default base retry backoff in milliseconds.
    pub(crate) backoff_base_ms: Option<u64>,
    /// Default maximum retry backoff in milliseconds.
    pub(crate) backoff_max_ms: Option<u64>,
    /// Default whole-job deadline in seconds.
    pub(crate) job_timeout_secs: Option<u64>,
    /// Keep existing files instead of overwriting.
    pub(crate) skip_existing: Option<bool>,
    /// Default verbosity mode.
    pub(crate) verbosity: Option<VerbositySetting>,
}

impl FileConfig {
    /// Validates config values against the CLI ranges.
    pub(crate) fn validate(&self) -> Result<()> {
        if let Some(concurrency) = self.concurrency {
            if !(1..=100).contains(&concurrency) {
                bail!(
                    "Invalid config value for `concurrency`: {concurrency}. Expected range: 1..=100"
                );
            }
        }
        if let Some(max_attempts) = self.max_attempts {
            if !(1..=10).contains(&max_attempts) {
                bail!(
                    "Invalid config value for `max_attempts`: {max_attempts}. Expected range: 1..=10"
                );
            }
        }
        validate_range("timeout_ms", self.timeout_ms, 1, 600_000)?;
        validate_range("backoff_base_ms", self.backoff_base_ms, 0, 600_000)?;
        validate_range("backoff_max_ms", self.backoff_max_ms, 0, 600_000)?;
        validate_range("job_timeout_secs", self.job_timeout_secs, 1, 86_400)?;

        if let (Some(base), Some(max)) = (self.backoff_base_ms, self.backoff_max_ms) {
            if base > max {
                bail!(
                    "Invalid config values: `backoff_base_ms` ({base}) is larger than `backoff_max_ms` ({max})"
                );
            }
        }
        Ok(())
    }
}

fn validate_range(field: &str, value: Option<u64>, min: u64, max: u64) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(min..=max).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: {min}..={max}");
    }
    Ok(())
}

/// Supported config verbosity labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum VerbositySetting {
    Default,
    Verbose,
    Quiet,
    Debug,
}

impl VerbositySetting {
    /// Tracing level used when no CLI flag or `RUST_LOG` overrides it.
    pub(crate) fn log_level(self) -> &'static str {
        match self {
            Self::Default => "info",
            Self::Verbose => "debug",
            Self::Quiet => "error",
            Self::Debug => "trace",
        }
    }
}

/// Loaded config metadata.
#[derive(Debug, Clone)]
pub(crate) struct LoadedConfig {
    /// Config path that was considered, if any.
    pub(crate) path: Option<PathBuf>,
    /// Parsed file config when a config file exists and was valid.
    pub(crate) config: Option<FileConfig>,
    /// Indicates whether configuration was loaded from disk.
    pub(crate) loaded_from_file: bool,
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/batch-fetch/config.toml`
/// 2. `$HOME/.config/batch-fetch/config.toml`
pub(crate) fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("batch-fetch")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("batch-fetch")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads the config file.
///
/// An explicit path must exist. The default path is optional and silently
/// skipped when absent.
pub(crate) fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    if let Some(path) = explicit {
        if !path.exists() {
            bail!("{} does not exist", path.display());
        }
        let config = load_file_config(path)?;
        return Ok(LoadedConfig {
            path: Some(path.to_path_buf()),
            config: Some(config),
            loaded_from_file: true,
        });
    }

    let path = resolve_default_config_path();
    let Some(path_ref) = path.as_deref().filter(|p| p.exists()) else {
        return Ok(LoadedConfig {
            path,
            config: None,
            loaded_from_file: false,
        });
    };

    let config = load_file_config(path_ref)?;
    Ok(LoadedConfig {
        path,
        config: Some(config),
        loaded_from_file: true,
    })
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

pub(crate) fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line_no = line_index + 1;
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_no}: expected key = value");
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let invalid = || format!("Invalid `{key}` value on line {line_no}");

        match key {
            "output_dir" => {
                let parsed = parse_string_literal(value).with_context(invalid)?;
                cfg.output_dir = Some(PathBuf::from(parsed));
            }
            "concurrency" => {
                cfg.concurrency = Some(parse_integer_u8(value).with_context(invalid)?);
            }
            "max_attempts" => {
                cfg.max_attempts = Some(parse_integer_u8(value).with_context(invalid)?);
            }
            "timeout_ms" => {
                cfg.timeout_ms = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "backoff_base_ms" => {
                cfg.backoff_base_ms = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "backoff_max_ms" => {
                cfg.backoff_max_ms = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "job_timeout_secs" => {
                cfg.job_timeout_secs = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "skip_existing" => {
                cfg.skip_existing = Some(parse_boolean(value).with_context(invalid)?);
            }
            "verbosity" => {
                let parsed = parse_string_literal(value).with_context(invalid)?;
                cfg.verbosity = Some(parse_verbosity(&parsed).with_context(|| {
                    format!("Invalid `verbosity` value '{parsed}' on line {line_no}")
                })?);
            }
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {line_no}");
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer_u8(raw_value: &str) -> Result<u8> {
    let value = parse_integer_u64(raw_value)?;
    u8::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u8"))
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}

fn parse_verbosity(value: &str) -> Result<VerbositySetting> {
    match value {
        "default" => Ok(VerbositySetting::Default),
        "verbose" => Ok(VerbositySetting::Verbose),
        "quiet" => Ok(VerbositySetting::Quiet),
        "debug" => Ok(VerbositySetting::Debug),
        _ => bail!("Expected one of: default, verbose, quiet, debug"),
    }
}

fn parse_boolean(raw_value: &str) -> Result<bool> {
    match raw_value.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => bail!("Expected 'true' or 'false'"),
    }
}
