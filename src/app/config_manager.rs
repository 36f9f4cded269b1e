//! Configuration lifecycle: load file config, merge CLI, build the job config.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, bail};
use batch_fetch_core::{JobConfig, OverridePolicy};

use crate::app::config_file::{FileConfig, LoadedConfig, VerbositySetting, load_config};
use crate::cli::{Args, DEFAULT_CLI_TIMEOUT_MS};

/// Fully resolved settings for one run.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedConfig {
    pub(crate) input_file: PathBuf,
    pub(crate) output_dir: PathBuf,
    pub(crate) job: JobConfig,
    /// Tracing level used when `RUST_LOG` is unset.
    pub(crate) log_level: &'static str,
    pub(crate) config_path: Option<PathBuf>,
    pub(crate) loaded_from_file: bool,
}

/// Loads the config file and merges it under the CLI flags.
pub(crate) fn resolve_config(args: &Args) -> Result<ResolvedConfig> {
    let loaded = load_config(args.config.as_deref())?;
    merge(args, loaded)
}

/// Priority per setting: explicit CLI flag > config file > default.
pub(crate) fn merge(args: &Args, loaded: LoadedConfig) -> Result<ResolvedConfig> {
    let file = loaded.config.unwrap_or_default();

    let Some(output_dir) = args.output_folder.clone().or_else(|| file.output_dir.clone()) else {
        bail!("No output folder given. Pass -o <DIR> or set `output_dir` in the config file");
    };

    let job = build_job_config(args, &file);
    let log_level = resolve_log_level(args, file.verbosity);

    Ok(ResolvedConfig {
        input_file: args.input_file.clone(),
        output_dir,
        job,
        log_level,
        config_path: loaded.path,
        loaded_from_file: loaded.loaded_from_file,
    })
}

fn build_job_config(args: &Args, file: &FileConfig) -> JobConfig {
    let defaults = JobConfig::default();

    let concurrency = args
        .concurrency
        .or(file.concurrency)
        .map_or(defaults.concurrency_limit, usize::from);
    let max_attempts = args
        .max_attempts
        .or(file.max_attempts)
        .map_or(defaults.max_attempts, u32::from);
    let timeout_ms = args
        .timeout_ms
        .or(file.timeout_ms)
        .unwrap_or(DEFAULT_CLI_TIMEOUT_MS);
    let backoff_base = args
        .backoff_base_ms
        .or(file.backoff_base_ms)
        .map_or(defaults.backoff_base, Duration::from_millis);
    let backoff_max = args
        .backoff_max_ms
        .or(file.backoff_max_ms)
        .map_or(defaults.backoff_max, Duration::from_millis);
    let job_timeout = args
        .job_timeout_secs
        .or(file.job_timeout_secs)
        .map(Duration::from_secs);
    let policy = if args.skip_existing || file.skip_existing.unwrap_or(false) {
        OverridePolicy::SkipIfExists
    } else {
        OverridePolicy::Overwrite
    };

    defaults
        .with_concurrency(concurrency)
        .with_max_attempts(max_attempts)
        .with_per_item_timeout(Duration::from_millis(timeout_ms))
        .with_backoff(backoff_base, backoff_max)
        .with_override_policy(policy)
        .with_job_timeout(job_timeout)
}

/// Returns the default tracing level.
///
/// Priority: `-q` > `-v`/`-vv` > config `verbosity` > info. `RUST_LOG`, when
/// set, beats all of these (see `terminal::filter_directives`).
pub(crate) fn resolve_log_level(
    args: &Args,
    file_verbosity: Option<VerbositySetting>,
) -> &'static str {
    if args.quiet {
        "error"
    } else if args.verbose == 1 {
        "debug"
    } else if args.verbose > 1 {
        "trace"
    } else {
        file_verbosity.unwrap_or(VerbositySetting::Default).log_level()
    }
}
