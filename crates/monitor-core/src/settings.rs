use clap::{CommandFactory, Parser};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::models::StartRequest;
use crate::notifications::NotificationPermission;
use crate::reconnect::ReconnectPolicy;

/// Default backend address.
pub const DEFAULT_API_BASE: &str = "http://localhost:8000";

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Real-time hallucination monitoring for AI agents
#[derive(Parser, Debug, Clone)]
#[command(
    name = "hallucination-monitor",
    about = "Real-time hallucination monitoring for AI agents",
    version
)]
pub struct Settings {
    /// Base URL of the detection backend
    #[arg(long, env = "HALLUCINATION_MONITOR_API", default_value = DEFAULT_API_BASE)]
    pub api_base: String,

    /// Delay before the first reconnect attempt, in milliseconds
    #[arg(long, default_value = "1000", value_parser = clap::value_parser!(u64).range(1..))]
    pub reconnect_base_ms: u64,

    /// Reconnect attempts before giving up
    #[arg(long, default_value = "5")]
    pub max_reconnect_attempts: u32,

    /// Upper bound for a single reconnect delay, in milliseconds (uncapped if unset)
    #[arg(long)]
    pub max_reconnect_delay_ms: Option<u64>,

    /// Seconds between liveness pings (1-3600)
    #[arg(long, default_value = "30", value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub ping_interval: u64,

    /// Treat the connection as dead after this many silent seconds (disabled if unset)
    #[arg(long)]
    pub liveness_timeout: Option<u64>,

    /// Ask the backend to start generating responses after connecting
    #[arg(long)]
    pub start_monitoring: bool,

    /// Seconds between simulated agent responses
    #[arg(long, default_value = "5.0")]
    pub response_interval: f64,

    /// Random spread applied to the response interval, in seconds
    #[arg(long, default_value = "1.0")]
    pub jitter: f64,

    /// Disable the audible alert for flagged detections
    #[arg(long)]
    pub no_sound: bool,

    /// Desktop notification permission (remembered across runs)
    #[arg(long, value_parser = ["granted", "denied", "default"])]
    pub notifications: Option<String>,

    /// Display theme
    #[arg(long, default_value = "auto", value_parser = ["light", "dark", "classic", "auto"])]
    pub theme: String,

    /// Number of recent detections shown on the dashboard (1-500)
    #[arg(long, default_value = "20", value_parser = clap::value_parser!(u32).range(1..=500))]
    pub recent_window: u32,

    /// Run without the terminal dashboard, logging detections instead
    #[arg(long)]
    pub headless: bool,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"])]
    pub log_level: String,

    /// Log file path
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Clear saved configuration
    #[arg(long)]
    pub clear: bool,
}

// ── LastUsedParams ─────────────────────────────────────────────────────────────

/// Persisted last-used parameters saved to `~/.hallucination-monitor/last_used.json`.
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct LastUsedParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recent_window: Option<u32>,
}

impl LastUsedParams {
    /// Return the default path to the persisted config file.
    /// Uses `~/.hallucination-monitor/last_used.json`.
    pub fn config_path() -> PathBuf {
        Self::config_path_in(&dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
    }

    /// Return the config path rooted at `base_dir` (used for testing).
    pub fn config_path_in(base_dir: &std::path::Path) -> PathBuf {
        base_dir.join(".hallucination-monitor").join("last_used.json")
    }

    /// Load persisted params from the default path.
    /// Returns `Default` when the file is absent or cannot be parsed.
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load persisted params from an explicit path.
    pub fn load_from(path: &std::path::Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        serde_json::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!(error = %e, path = %path.display(), "ignoring unreadable last-used params");
            Self::default()
        })
    }

    /// Atomically write params to the default path, creating parent directories
    /// if needed.
    pub fn save(&self) -> Result<(), std::io::Error> {
        self.save_to(&Self::config_path())
    }

    /// Atomically write params to an explicit path.
    pub fn save_to(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, path)?;

        Ok(())
    }

    /// Delete the default config file if it exists.
    pub fn clear() -> Result<(), std::io::Error> {
        Self::clear_at(&Self::config_path())
    }

    /// Delete the config file at an explicit path if it exists.
    pub fn clear_at(path: &std::path::Path) -> Result<(), std::io::Error> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

// ── Settings impl ──────────────────────────────────────────────────────────────

impl Settings {
    /// Parse CLI arguments, merge with last-used params where no explicit CLI
    /// value was provided, resolve `"auto"` values, and persist the result.
    pub fn load_with_last_used() -> Self {
        Self::load_with_last_used_impl(
            std::env::args_os().collect(),
            &LastUsedParams::config_path(),
        )
    }

    /// Full implementation. Accepts args and an explicit config path so that
    /// tests can redirect to a temporary directory.
    pub fn load_with_last_used_impl(
        args: Vec<std::ffi::OsString>,
        config_path: &std::path::Path,
    ) -> Self {
        let matches = Settings::command().get_matches_from(args.clone());
        let mut settings = Settings::parse_from(args);

        if settings.clear {
            if let Err(e) = LastUsedParams::clear_at(config_path) {
                tracing::warn!(error = %e, "failed to clear last-used params");
            }
            return Self::resolve_auto_values(settings);
        }

        let last = LastUsedParams::load_from(config_path);

        // CLI and environment always win over persisted values.
        if !is_arg_explicitly_set(&matches, "api_base") {
            if let Some(v) = last.api_base {
                settings.api_base = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "theme") {
            if let Some(v) = last.theme {
                settings.theme = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "recent_window") {
            if let Some(v) = last.recent_window {
                settings.recent_window = v.clamp(1, 500);
            }
        }

        settings = Self::resolve_auto_values(settings);

        let params = LastUsedParams::from(&settings);
        if let Err(e) = params.save_to(config_path) {
            tracing::warn!(error = %e, path = %config_path.display(), "failed to save last-used params");
        }

        settings
    }

    /// Resolve `"auto"` sentinel values and apply the `--debug` flag.
    fn resolve_auto_values(mut settings: Settings) -> Settings {
        if settings.theme == "auto" {
            settings.theme = detect_theme().to_string();
        }

        if settings.debug {
            settings.log_level = "DEBUG".to_string();
        }

        settings
    }

    // ── Derived configuration ────────────────────────────────────────────────

    /// Backoff policy configured by the reconnect flags.
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        let policy = ReconnectPolicy::new(
            Duration::from_millis(self.reconnect_base_ms),
            self.max_reconnect_attempts,
        );
        match self.max_reconnect_delay_ms {
            Some(cap) => policy.with_max_delay(Duration::from_millis(cap)),
            None => policy,
        }
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval)
    }

    /// `None` disables the pong/liveness timeout.
    pub fn liveness_timeout(&self) -> Option<Duration> {
        self.liveness_timeout
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Body of the start request, with negative values floored at zero.
    pub fn start_request(&self) -> StartRequest {
        StartRequest {
            response_interval: self.response_interval.max(0.0),
            jitter: self.jitter.max(0.0),
        }
    }

    /// Permission given on the command line, if any.
    pub fn notification_override(&self) -> Option<NotificationPermission> {
        self.notifications.as_deref().and_then(|s| s.parse().ok())
    }

    pub fn sound_enabled(&self) -> bool {
        !self.no_sound
    }
}

/// Guess light or dark from the `COLORFGBG` convention, defaulting to dark.
fn detect_theme() -> &'static str {
    let Ok(value) = std::env::var("COLORFGBG") else {
        return "dark";
    };
    theme_from_colorfgbg(&value)
}

fn theme_from_colorfgbg(value: &str) -> &'static str {
    // "fg;bg" or "fg;default;bg": backgrounds 7 and 15 are light.
    match value.rsplit(';').next().and_then(|bg| bg.parse::<u8>().ok()) {
        Some(7) | Some(15) => "light",
        _ => "dark",
    }
}

// ── Conversion ─────────────────────────────────────────────────────────────────

impl From<&Settings> for LastUsedParams {
    fn from(s: &Settings) -> Self {
        LastUsedParams {
            api_base: Some(s.api_base.clone()),
            theme: Some(s.theme.clone()),
            recent_window: Some(s.recent_window),
        }
    }
}

// ── Helper: check if an arg was explicitly set ────────────────────────────────

/// Returns `true` when `name` was supplied on the command line or through its
/// environment variable, as opposed to a default value.
fn is_arg_explicitly_set(matches: &clap::ArgMatches, name: &str) -> bool {
    matches!(
        matches.value_source(name),
        Some(clap::parser::ValueSource::CommandLine) | Some(clap::parser::ValueSource::EnvVariable)
    )
}

// ── Tests ──────────────────────────────────────────────────────────────────────
