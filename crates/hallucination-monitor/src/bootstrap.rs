use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Name of the per-user state directory under `$HOME`.
pub const MONITOR_DIR: &str = ".hallucination-monitor";

// ── Directory bootstrap ────────────────────────────────────────────────────────

/// `~/.hallucination-monitor/`, or `./.hallucination-monitor/` without a home.
pub fn monitor_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(MONITOR_DIR)
}

/// Ensure `~/.hallucination-monitor/` and its `logs/` subdirectory exist.
pub fn ensure_directories() -> anyhow::Result<()> {
    let dir = monitor_dir();
    std::fs::create_dir_all(&dir)?;
    std::fs::create_dir_all(dir.join("logs"))?;
    Ok(())
}

/// Log file used by the dashboard when `--log-file` is not given.
pub fn default_log_file() -> PathBuf {
    monitor_dir().join("logs").join("monitor.log")
}

// ── Logging bootstrap ──────────────────────────────────────────────────────────

/// Map `--log-level` names (`DEBUG`, `WARNING`, ...) to an `EnvFilter` directive.
fn normalise_level(log_level: &str) -> String {
    match log_level.to_uppercase().as_str() {
        "DEBUG" => "debug".to_string(),
        "INFO" => "info".to_string(),
        "WARNING" => "warn".to_string(),
        "ERROR" | "CRITICAL" => "error".to_string(),
        _ => log_level.to_lowercase(),
    }
}

/// Initialise the global `tracing` subscriber.
///
/// With `log_file` set, output is appended to that file without ANSI colours;
/// otherwise it goes to stderr. Falls back to `"info"` when the level string
/// is not recognised.
pub fn setup_logging(log_level: &str, log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_new(normalise_level(log_level)).unwrap_or_else(|_| EnvFilter::new("info"));

    match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            let layer = fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(Arc::new(file));
            tracing_subscriber::registry()
                .with(filter)
                .with(layer)
                .try_init()?;
        }
        None => {
            let layer = fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr);
            tracing_subscriber::registry()
                .with(filter)
                .with(layer)
                .try_init()?;
        }
    }

    Ok(())
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn with_home<T>(home: &Path, f: impl FnOnce() -> T) -> T {
        let original_home = std::env::var_os("HOME");
        std::env::set_var("HOME", home);
        let result = f();
        match original_home {
            Some(v) => std::env::set_var("HOME", v),
            None => std::env::remove_var("HOME"),
        }
        result
    }

    // ── test_ensure_directories ───────────────────────────────────────────────

    #[test]
    fn test_ensure_directories_and_log_path() {
        let tmp = TempDir::new().expect("tempdir");

        let (result, log_file) = with_home(tmp.path(), || (ensure_directories(), default_log_file()));
        result.expect("ensure_directories should succeed");

        let dir = tmp.path().join(MONITOR_DIR);
        assert!(dir.is_dir(), "monitor dir must exist");
        assert!(dir.join("logs").is_dir(), "logs subdir must exist");
        assert_eq!(log_file, dir.join("logs").join("monitor.log"));
    }

    // ── test_normalise_level ──────────────────────────────────────────────────

    #[test]
    fn test_normalise_level() {
        assert_eq!(normalise_level("DEBUG"), "debug");
        assert_eq!(normalise_level("info"), "info");
        assert_eq!(normalise_level("WARNING"), "warn");
        assert_eq!(normalise_level("ERROR"), "error");
        assert_eq!(normalise_level("CRITICAL"), "error");
        assert_eq!(normalise_level("Trace"), "trace");
    }
}
