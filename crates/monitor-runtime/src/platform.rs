//! Alert surfaces backed by the host.

use std::io::Write;

use monitor_core::error::MonitorError;
use monitor_core::notifications::NotificationPermission;

use crate::alerts::{AudioAlert, OsNotification, SystemNotifier, Toast, ToastLevel, ToastSurface};

// ── LogToasts ─────────────────────────────────────────────────────────────────

/// Writes toasts to the log. Used in headless mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogToasts;

impl ToastSurface for LogToasts {
    fn show(&self, toast: Toast) -> Result<(), MonitorError> {
        match toast.level {
            ToastLevel::Critical | ToastLevel::Error | ToastLevel::Warning => {
                tracing::warn!(title = %toast.title, "{}", toast.message)
            }
            ToastLevel::Success | ToastLevel::Info => {
                tracing::info!(title = %toast.title, "{}", toast.message)
            }
        }
        Ok(())
    }
}

// ── TerminalBell ──────────────────────────────────────────────────────────────

/// Rings the terminal bell on stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalBell;

impl AudioAlert for TerminalBell {
    fn play_alert(&self) -> Result<(), MonitorError> {
        let mut stderr = std::io::stderr();
        stderr.write_all(b"\x07")?;
        stderr.flush()?;
        Ok(())
    }
}

// ── DesktopNotifier ───────────────────────────────────────────────────────────

/// Shows notifications through `notify-send` (Linux) or `osascript` (macOS).
///
/// The helper process is spawned on the current tokio runtime and never
/// awaited by the caller.
#[derive(Debug, Clone)]
pub struct DesktopNotifier {
    permission: NotificationPermission,
}

impl DesktopNotifier {
    pub fn new(permission: NotificationPermission) -> Self {
        Self { permission }
    }
}

impl SystemNotifier for DesktopNotifier {
    fn permission(&self) -> NotificationPermission {
        self.permission
    }

    fn notify(&self, notification: OsNotification) -> Result<(), MonitorError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| MonitorError::Alert(format!("no async runtime: {e}")))?;
        let (program, args) = helper_command(&notification)?;

        let mut command = tokio::process::Command::new(program);
        command
            .args(&args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true);
        let mut child = command
            .spawn()
            .map_err(|e| MonitorError::Alert(format!("failed to run {program}: {e}")))?;

        let tag = notification.tag;
        runtime.spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => {}
                Ok(status) => tracing::debug!(%tag, %status, "notification helper failed"),
                Err(e) => tracing::debug!(%tag, error = %e, "notification helper did not finish"),
            }
        });
        Ok(())
    }
}

fn helper_command(
    notification: &OsNotification,
) -> Result<(&'static str, Vec<String>), MonitorError> {
    if cfg!(target_os = "linux") {
        Ok(("notify-send", notify_send_args(notification)))
    } else if cfg!(target_os = "macos") {
        Ok((
            "osascript",
            vec!["-e".to_string(), osascript_script(notification)],
        ))
    } else {
        Err(MonitorError::Alert(
            "desktop notifications are not supported on this platform".to_string(),
        ))
    }
}

/// Arguments for `notify-send`. The synchronous hint makes notifications with
/// the same tag replace each other.
fn notify_send_args(notification: &OsNotification) -> Vec<String> {
    let urgency = if notification.require_interaction {
        "critical"
    } else {
        "normal"
    };
    vec![
        "--app-name=hallucination-monitor".to_string(),
        format!("--urgency={urgency}"),
        format!("--expire-time={}", notification.auto_dismiss.as_millis()),
        format!(
            "--hint=string:x-canonical-private-synchronous:{}",
            notification.tag
        ),
        notification.title.clone(),
        notification.body.clone(),
    ]
}

fn osascript_script(notification: &OsNotification) -> String {
    format!(
        "display notification \"{}\" with title \"{}\"",
        applescript_escape(&notification.body),
        applescript_escape(&notification.title)
    )
}

fn applescript_escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}
