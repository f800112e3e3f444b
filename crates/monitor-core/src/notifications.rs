//! Persisted OS-notification permission.
//!
//! Desktop notifications are only requested when the user has granted
//! permission in an earlier run (or on this run's command line). The decision
//! is stored in `~/.hallucination-monitor/notification_permission.json` so it
//! survives restarts, the same way a browser remembers a site's permission.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// File name of the persisted permission, inside the config directory.
pub const PERMISSION_FILE: &str = "notification_permission.json";

/// Whether OS-level notifications may be shown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPermission {
    /// The user allowed notifications.
    Granted,
    /// The user refused notifications.
    Denied,
    /// The user was never asked.
    #[default]
    Default,
}

impl NotificationPermission {
    pub fn is_granted(&self) -> bool {
        matches!(self, NotificationPermission::Granted)
    }
}

impl std::str::FromStr for NotificationPermission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "granted" => Ok(NotificationPermission::Granted),
            "denied" => Ok(NotificationPermission::Denied),
            "default" => Ok(NotificationPermission::Default),
            other => Err(format!("unknown notification permission: {other}")),
        }
    }
}

/// On-disk record of the permission decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PermissionRecord {
    pub permission: NotificationPermission,
    /// When the decision was last changed, `None` if never.
    pub decided_at: Option<DateTime<Utc>>,
}

impl Default for PermissionRecord {
    fn default() -> Self {
        Self {
            permission: NotificationPermission::Default,
            decided_at: None,
        }
    }
}

/// Loads and persists the [`NotificationPermission`].
///
/// # Example
///
/// ```no_run
/// use monitor_core::notifications::{NotificationPermission, PermissionStore};
/// use std::path::Path;
///
/// let mut store = PermissionStore::new(Path::new("/tmp/hallucination-monitor"));
/// if !store.permission().is_granted() {
///     store.set(NotificationPermission::Granted);
/// }
/// ```
pub struct PermissionStore {
    file: PathBuf,
    record: PermissionRecord,
}

impl PermissionStore {
    /// Create a store persisting to `config_dir`.
    ///
    /// A missing or unreadable file yields [`NotificationPermission::Default`];
    /// the store then still works in memory and save errors are only logged.
    pub fn new(config_dir: &Path) -> Self {
        let file = config_dir.join(PERMISSION_FILE);
        let record = Self::load(&file);
        Self { file, record }
    }

    /// Create a store in the default `~/.hallucination-monitor/` directory.
    ///
    /// Returns `None` when the home directory cannot be determined.
    pub fn with_default_path() -> Option<Self> {
        let config_dir = dirs::home_dir()?.join(".hallucination-monitor");
        Some(Self::new(&config_dir))
    }

    pub fn permission(&self) -> NotificationPermission {
        self.record.permission
    }

    pub fn record(&self) -> &PermissionRecord {
        &self.record
    }

    /// Record a new decision and persist it. A no-op when unchanged.
    pub fn set(&mut self, permission: NotificationPermission) {
        if self.record.permission == permission && self.record.decided_at.is_some() {
            return;
        }
        self.record = PermissionRecord {
            permission,
            decided_at: Some(Utc::now()),
        };
        self.save();
    }

    fn load(path: &Path) -> PermissionRecord {
        if !path.exists() {
            return PermissionRecord::default();
        }
        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!(
                    error = %e,
                    path = %path.display(),
                    "failed to deserialise notification permission; using default"
                );
                PermissionRecord::default()
            }),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    path = %path.display(),
                    "failed to read notification permission; using default"
                );
                PermissionRecord::default()
            }
        }
    }

    fn save(&self) {
        let json = match serde_json::to_string_pretty(&self.record) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialise notification permission");
                return;
            }
        };
        if let Some(parent) = self.file.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!(error = %e, path = %parent.display(), "failed to create config dir");
                return;
            }
        }
        if let Err(e) = std::fs::write(&self.file, json) {
            tracing::warn!(
                error = %e,
                path = %self.file.display(),
                "failed to save notification permission"
            );
        }
    }
}
