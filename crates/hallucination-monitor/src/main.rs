mod bootstrap;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;

use monitor_core::error::ConnectionError;
use monitor_core::notifications::{NotificationPermission, PermissionStore};
use monitor_core::protocol::monitor_url;
use monitor_core::settings::Settings;
use monitor_runtime::alerts::{AlertDispatcher, ToastSurface};
use monitor_runtime::control::ControlClient;
use monitor_runtime::manager::{ConnectionManager, ManagerConfig, MonitorHandle, MonitorSnapshot};
use monitor_runtime::platform::{DesktopNotifier, LogToasts, TerminalBell};
use monitor_runtime::router::MessageRouter;
use monitor_runtime::transport::WsConnector;
use monitor_ui::app::App;
use monitor_ui::toasts::ChannelToasts;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load_with_last_used();

    bootstrap::ensure_directories()?;
    // The dashboard owns the terminal, so it logs to a file by default.
    let log_file = settings
        .log_file
        .clone()
        .or_else(|| (!settings.headless).then(bootstrap::default_log_file));
    bootstrap::setup_logging(&settings.log_level, log_file.as_deref())?;

    tracing::info!("Hallucination Monitor v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        api_base = %settings.api_base,
        theme = %settings.theme,
        headless = settings.headless,
        "configuration loaded"
    );

    let url = monitor_url(&settings.api_base)?;
    let permission = resolve_permission(&settings);

    let (toasts, toast_rx): (Arc<dyn ToastSurface>, _) = if settings.headless {
        (Arc::new(LogToasts), None)
    } else {
        let (surface, rx) = ChannelToasts::channel();
        (Arc::new(surface), Some(rx))
    };

    let mut dispatcher = AlertDispatcher::new()
        .with_toasts(toasts)
        .with_notifier(Arc::new(DesktopNotifier::new(permission)))
        .sound_enabled(settings.sound_enabled());
    if settings.sound_enabled() {
        dispatcher = dispatcher.with_audio(Arc::new(TerminalBell));
    }

    let mut config = ManagerConfig::new(url.clone());
    config.policy = settings.reconnect_policy();
    config.ping_interval = settings.ping_interval();
    config.liveness_timeout = settings.liveness_timeout();
    config.recent_window = settings.recent_window as usize;

    let handle = ConnectionManager::new(
        config,
        Arc::new(WsConnector),
        MessageRouter::new(dispatcher),
    )
    .spawn();
    handle.connect()?;

    let control = if settings.start_monitoring {
        let client = ControlClient::new(&settings.api_base)?;
        match client.start(&settings.start_request()).await {
            Ok(status) => tracing::info!(?status, "backend generator start acknowledged"),
            Err(e) => tracing::warn!(error = %e, "could not start backend generator"),
        }
        Some(client)
    } else {
        None
    };

    let mut outcome = Ok(());
    match toast_rx {
        Some(rx) => {
            let app = App::new(&settings.theme, url.to_string(), handle.clone(), rx);
            // Ctrl+C is also caught at the OS level in case the terminal is
            // not in raw mode yet.
            tokio::select! {
                result = app.run() => outcome = result.map_err(Into::into),
                _ = tokio::signal::ctrl_c() => tracing::info!("Ctrl+C received; shutting down"),
            }
        }
        None => {
            if let HeadlessExit::GaveUp(attempts) = run_headless(handle.subscribe()).await {
                outcome = Err(ConnectionError::ReconnectExhausted { attempts }.into());
            }
        }
    }

    if let Some(client) = control {
        match client.stop().await {
            Ok(response) => {
                let stats = response.stats.unwrap_or_default();
                tracing::info!(
                    status = response.status.as_deref().unwrap_or("stopped"),
                    total_processed = ?stats.total_processed,
                    flagged_count = ?stats.flagged_count,
                    "backend generator stopped"
                );
            }
            Err(e) => tracing::warn!(error = %e, "could not stop backend generator"),
        }
    }

    log_session_summary(&handle);
    if let Err(e) = handle.shutdown().await {
        tracing::debug!(error = %e, "monitor task already stopped");
    }

    outcome
}

/// Apply `--notifications` and fall back to the persisted decision.
fn resolve_permission(settings: &Settings) -> NotificationPermission {
    let override_ = settings.notification_override();
    let permission = match PermissionStore::with_default_path() {
        Some(mut store) => {
            if let Some(p) = override_ {
                store.set(p);
            }
            store.permission()
        }
        None => override_.unwrap_or_default(),
    };
    if permission == NotificationPermission::Default {
        tracing::info!("desktop notifications off; pass --notifications granted to enable");
    }
    permission
}

// ── Headless mode ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeadlessExit {
    Interrupted,
    MonitorStopped,
    GaveUp(u32),
}

/// Wait for Ctrl+C, the monitor task to stop, or the reconnect budget to run
/// out. Toasts already go to the log.
async fn run_headless(mut snapshots: watch::Receiver<MonitorSnapshot>) -> HeadlessExit {
    tracing::info!("running headless; press Ctrl+C to stop");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received; shutting down");
                return HeadlessExit::Interrupted;
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    return HeadlessExit::MonitorStopped;
                }
                let exhausted = match snapshots.borrow_and_update().connection.error {
                    Some(ConnectionError::ReconnectExhausted { attempts }) => Some(attempts),
                    _ => None,
                };
                if let Some(attempts) = exhausted {
                    tracing::error!(attempts, "reconnect attempts exhausted; exiting");
                    return HeadlessExit::GaveUp(attempts);
                }
            }
        }
    }
}

fn log_session_summary(handle: &MonitorHandle) {
    let snapshot = handle.snapshot();
    let stats = &snapshot.stats;
    tracing::info!(
        total = stats.total,
        flagged = stats.flagged,
        flagged_rate = stats.flagged_rate,
        average_risk = stats.average_risk,
        duration_secs = stats.duration.as_secs(),
        agents = stats.per_agent.len(),
        "session summary"
    );
    if let Some(accuracy) = snapshot.accuracy {
        tracing::info!(
            labelled = accuracy.labelled(),
            accuracy = accuracy.accuracy(),
            precision = accuracy.precision(),
            recall = accuracy.recall(),
            f1 = accuracy.f1(),
            "detector accuracy"
        );
    }
}
