//! Terminal capability checks and tracing setup.

use crate::cli::Args;

pub(crate) fn no_color_env_requested() -> bool {
    std::env::var_os("NO_COLOR").is_some_and(|value| !value.is_empty())
}

pub(crate) fn is_dumb_terminal() -> bool {
    std::env::var("TERM")
        .map(|value| value.eq_ignore_ascii_case("dumb"))
        .unwrap_or(false)
}

pub(crate) fn should_disable_color(
    no_color_flag: bool,
    no_color_env: bool,
    dumb_terminal: bool,
) -> bool {
    no_color_flag || no_color_env || dumb_terminal
}

pub(crate) fn is_no_color_requested(args: &Args) -> bool {
    should_disable_color(args.no_color, no_color_env_requested(), is_dumb_terminal())
}

/// The progress bar shares stderr with the logs, so it is drawn only on an
/// interactive, non-dumb terminal and never together with `--json` or `-q`.
pub(crate) fn should_show_progress(
    stderr_is_terminal: bool,
    args: &Args,
    dumb_terminal: bool,
) -> bool {
    stderr_is_terminal && !args.quiet && !args.json && !args.no_progress && !dumb_terminal
}

/// Picks the filter directives: a non-empty `RUST_LOG` wins over the level
/// resolved from flags and config.
pub(crate) fn filter_directives(rust_log: Option<&str>, default_level: &str) -> String {
    rust_log
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(default_level)
        .to_string()
}

pub(crate) fn init_tracing(default_level: &str, no_color: bool) {
    let rust_log = std::env::var(tracing_subscriber::EnvFilter::DEFAULT_ENV).ok();
    let directives = filter_directives(rust_log.as_deref(), default_level);
    let filter = tracing_subscriber::EnvFilter::try_new(&directives)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(!no_color)
        .with_env_filter(filter)
        .try_init();
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use clap::Parser;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["batch-fetch", "-i", "u.txt", "-o", "out"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_should_disable_color_any_source() {
        assert!(!should_disable_color(false, false, false));
        assert!(should_disable_color(true, false, false));
        assert!(should_disable_color(false, true, false));
        assert!(should_disable_color(false, false, true));
    }

    #[test]
    fn test_progress_shown_only_on_plain_terminal() {
        assert!(should_show_progress(true, &args(&[]), false));
        assert!(!should_show_progress(false, &args(&[]), false));
        assert!(!should_show_progress(true, &args(&[]), true));
        assert!(!should_show_progress(true, &args(&["-q"]), false));
        assert!(!should_show_progress(true, &args(&["--json"]), false));
        assert!(!should_show_progress(true, &args(&["--no-progress"]), false));
    }

    #[test]
    fn test_rust_log_beats_cli_level() {
        assert_eq!(filter_directives(Some("warn"), "error"), "warn");
        assert_eq!(
            filter_directives(Some("batch_fetch_core=trace"), "debug"),
            "batch_fetch_core=trace"
        );
    }

    #[test]
    fn test_blank_rust_log_falls_back_to_cli_level() {
        assert_eq!(filter_directives(None, "error"), "error");
        assert_eq!(filter_directives(Some("  "), "trace"), "trace");
    }
}
