//! Alert fan-out for detections, server errors and connection changes.
//!
//! Each surface is an optional capability behind a trait. Surfaces are
//! independent: a failing or missing surface never stops the others, and
//! failures are only logged.

use std::sync::Arc;
use std::time::Duration;

use monitor_core::error::{ConnectionError, MonitorError};
use monitor_core::formatting::{format_delay, format_risk, truncate_chars};
use monitor_core::models::{ConnectionState, DetectionEvent};
use monitor_core::notifications::NotificationPermission;

use crate::connection::ConnectionSnapshot;

/// How long a flagged-detection toast stays up.
pub const FLAGGED_TOAST_DURATION: Duration = Duration::from_secs(6);
/// How long a clean-detection toast stays up.
pub const CLEAN_TOAST_DURATION: Duration = Duration::from_secs(2);
/// How long error toasts stay up.
pub const ERROR_TOAST_DURATION: Duration = Duration::from_secs(5);
/// How long connection status toasts stay up.
pub const STATUS_TOAST_DURATION: Duration = Duration::from_secs(3);
/// OS notifications close themselves after this long.
pub const NOTIFICATION_AUTO_DISMISS: Duration = Duration::from_secs(5);

const SEGMENT_PREVIEW_CHARS: usize = 80;

// ── Alert values ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToastLevel {
    /// Flagged detection.
    Critical,
    Success,
    Warning,
    Error,
    Info,
}

/// An in-app notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub level: ToastLevel,
    pub title: String,
    pub message: String,
    /// `None` keeps the toast up until dismissed.
    pub duration: Option<Duration>,
}

impl Toast {
    fn new(level: ToastLevel, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            message: message.into(),
            duration: Some(ERROR_TOAST_DURATION),
        }
    }

    fn lasting(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    fn persistent(mut self) -> Self {
        self.duration = None;
        self
    }

    pub fn is_persistent(&self) -> bool {
        self.duration.is_none()
    }
}

/// An OS-level notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsNotification {
    /// Notifications with the same tag replace each other.
    pub tag: String,
    pub title: String,
    pub body: String,
    pub auto_dismiss: Duration,
    pub require_interaction: bool,
}

// ── Capabilities ──────────────────────────────────────────────────────────────

/// Shows in-app toasts.
pub trait ToastSurface: Send + Sync {
    fn show(&self, toast: Toast) -> Result<(), MonitorError>;
}

/// Plays the audible alert.
pub trait AudioAlert: Send + Sync {
    fn play_alert(&self) -> Result<(), MonitorError>;
}

/// Shows OS-level notifications.
pub trait SystemNotifier: Send + Sync {
    fn permission(&self) -> NotificationPermission;
    fn notify(&self, notification: OsNotification) -> Result<(), MonitorError>;
}

// ── AlertDispatcher ───────────────────────────────────────────────────────────

/// Routes alert-worthy events to whichever surfaces are installed.
#[derive(Clone)]
pub struct AlertDispatcher {
    toasts: Option<Arc<dyn ToastSurface>>,
    audio: Option<Arc<dyn AudioAlert>>,
    notifier: Option<Arc<dyn SystemNotifier>>,
    sound_enabled: bool,
}

impl AlertDispatcher {
    /// A dispatcher with no surfaces; every alert is dropped.
    pub fn new() -> Self {
        Self {
            toasts: None,
            audio: None,
            notifier: None,
            sound_enabled: true,
        }
    }

    pub fn with_toasts(mut self, toasts: Arc<dyn ToastSurface>) -> Self {
        self.toasts = Some(toasts);
        self
    }

    pub fn with_audio(mut self, audio: Arc<dyn AudioAlert>) -> Self {
        self.audio = Some(audio);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn SystemNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn sound_enabled(mut self, enabled: bool) -> Self {
        self.sound_enabled = enabled;
        self
    }

    // ── Detections ───────────────────────────────────────────────────────────

    /// Alert on one detection result.
    pub fn detection(&self, event: &DetectionEvent) {
        if !event.flagged {
            self.toast(
                Toast::new(
                    ToastLevel::Success,
                    format!("Clean response · {}", event.agent_id),
                    format!("{} risk", format_risk(event.hallucination_risk)),
                )
                .lasting(CLEAN_TOAST_DURATION),
            );
            return;
        }

        let body = flagged_summary(event);
        self.toast(
            Toast::new(
                ToastLevel::Critical,
                format!("Hallucination detected · {}", event.agent_id),
                body.clone(),
            )
            .lasting(FLAGGED_TOAST_DURATION),
        );

        if self.sound_enabled {
            if let Some(audio) = &self.audio {
                if let Err(e) = audio.play_alert() {
                    tracing::debug!(error = %e, "audible alert failed");
                }
            }
        }

        if let Some(notifier) = &self.notifier {
            if notifier.permission().is_granted() {
                let notification = OsNotification {
                    tag: format!("hallucination-{}", event.agent_id),
                    title: format!("Hallucination detected: {}", event.agent_id),
                    body,
                    auto_dismiss: NOTIFICATION_AUTO_DISMISS,
                    require_interaction: true,
                };
                if let Err(e) = notifier.notify(notification) {
                    tracing::debug!(error = %e, agent_id = %event.agent_id, "OS notification failed");
                }
            }
        }
    }

    // ── Errors ───────────────────────────────────────────────────────────────

    pub fn server_error(&self, message: &str) {
        self.toast(Toast::new(ToastLevel::Error, "Server error", message));
    }

    pub fn processing_error(&self, agent_id: Option<&str>, message: &str) {
        let title = match agent_id {
            Some(agent) => format!("Processing failed · {agent}"),
            None => "Processing failed".to_string(),
        };
        self.toast(Toast::new(ToastLevel::Warning, title, message));
    }

    // ── Status ───────────────────────────────────────────────────────────────

    /// Toast a connection state change.
    pub fn connection_changed(&self, snapshot: &ConnectionSnapshot) {
        let toast = match (snapshot.state, &snapshot.error) {
            (ConnectionState::Connected, _) => Toast::new(
                ToastLevel::Success,
                "Connected",
                "Receiving live detections",
            )
            .lasting(STATUS_TOAST_DURATION),
            (ConnectionState::Connecting, _) => {
                let message = if snapshot.attempts == 0 {
                    "Opening the monitoring stream".to_string()
                } else {
                    format!(
                        "Reconnect attempt {} of {}",
                        snapshot.attempts, snapshot.max_attempts
                    )
                };
                Toast::new(ToastLevel::Info, "Connecting", message).lasting(STATUS_TOAST_DURATION)
            }
            (ConnectionState::Disconnected, _) => Toast::new(
                ToastLevel::Info,
                "Disconnected",
                "Press r to reconnect",
            )
            .lasting(STATUS_TOAST_DURATION),
            (ConnectionState::Errored, Some(ConnectionError::ReconnectExhausted { attempts })) => {
                Toast::new(
                    ToastLevel::Error,
                    "Connection failed",
                    format!("Gave up after {attempts} attempts. Press r to reconnect."),
                )
                .persistent()
            }
            (ConnectionState::Errored, error) => {
                let cause = error
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "Connection lost".to_string());
                let message = match snapshot.retry_in {
                    Some(delay) => format!(
                        "{cause}. Retrying in {} (attempt {} of {})",
                        format_delay(delay),
                        snapshot.attempts,
                        snapshot.max_attempts
                    ),
                    None => cause,
                };
                Toast::new(ToastLevel::Warning, "Connection lost", message)
            }
        };
        self.toast(toast);
    }

    /// Toast the backend generator starting or stopping.
    pub fn monitoring_status(&self, active: bool) {
        let toast = if active {
            Toast::new(ToastLevel::Info, "Monitoring started", "The backend is generating responses")
        } else {
            Toast::new(ToastLevel::Info, "Monitoring stopped", "The backend stopped generating responses")
        };
        self.toast(toast.lasting(STATUS_TOAST_DURATION));
    }

    fn toast(&self, toast: Toast) {
        if let Some(surface) = &self.toasts {
            if let Err(e) = surface.show(toast) {
                tracing::debug!(error = %e, "toast delivery failed");
            }
        }
    }
}

impl Default for AlertDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Headline for a flagged event: risk plus the first unsupported segment.
fn flagged_summary(event: &DetectionEvent) -> String {
    let risk = format_risk(event.hallucination_risk);
    match event.primary_segment() {
        Some(segment) => format!(
            "{risk} risk: \"{}\"",
            truncate_chars(segment, SEGMENT_PREVIEW_CHARS)
        ),
        None if !event.output.is_empty() => format!(
            "{risk} risk: {}",
            truncate_chars(&event.output, SEGMENT_PREVIEW_CHARS)
        ),
        None => format!("{risk} risk"),
    }
}
