//! Application state and TUI event loop for the hallucination monitor.
//!
//! [`App`] owns the theme, the toast stack and the last published
//! [`MonitorSnapshot`]. Keys are turned into [`KeyAction`]s and forwarded to
//! the connection manager through its [`MonitorHandle`].

use std::io;
use std::time::{Duration, Instant};

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Frame, Terminal};
use tokio::sync::{mpsc, watch};

use monitor_runtime::alerts::Toast;
use monitor_runtime::manager::{MonitorHandle, MonitorSnapshot};

use crate::dashboard::{self, DashboardView};
use crate::themes::Theme;
use crate::toasts::ToastQueue;

// ── KeyAction ─────────────────────────────────────────────────────────────────

/// What a key press asks the app to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Quit,
    Reconnect,
    Disconnect,
    ClearSession,
    DismissToasts,
}

impl KeyAction {
    /// Map a key press; `None` for keys the app ignores.
    pub fn from_key(key: &KeyEvent) -> Option<Self> {
        if key.kind == KeyEventKind::Release {
            return None;
        }
        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Some(Self::Quit),
            KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => Some(Self::Quit),
            KeyCode::Char('r') | KeyCode::Char('R') => Some(Self::Reconnect),
            KeyCode::Char('d') | KeyCode::Char('D') => Some(Self::Disconnect),
            KeyCode::Char('c') | KeyCode::Char('C') => Some(Self::ClearSession),
            KeyCode::Char('x') | KeyCode::Char('X') => Some(Self::DismissToasts),
            _ => None,
        }
    }
}

// ── App ───────────────────────────────────────────────────────────────────────

/// Root application state for the monitor TUI.
pub struct App {
    /// Active colour theme.
    pub theme: Theme,
    /// Stream endpoint shown in the header.
    pub endpoint: String,
    /// Set to `true` to break out of the event loop on the next iteration.
    pub should_quit: bool,
    /// Toasts currently on screen.
    pub toasts: ToastQueue,
    /// Most recent snapshot published by the connection manager.
    pub snapshot: MonitorSnapshot,
    handle: MonitorHandle,
    snapshots: watch::Receiver<MonitorSnapshot>,
    toast_rx: mpsc::UnboundedReceiver<Toast>,
}

impl App {
    pub fn new(
        theme_name: &str,
        endpoint: String,
        handle: MonitorHandle,
        toast_rx: mpsc::UnboundedReceiver<Toast>,
    ) -> Self {
        let snapshots = handle.subscribe();
        let snapshot = snapshots.borrow().clone();
        Self {
            theme: Theme::from_name(theme_name),
            endpoint,
            should_quit: false,
            toasts: ToastQueue::new(),
            snapshot,
            handle,
            snapshots,
            toast_rx,
        }
    }

    // ── Public event loop ─────────────────────────────────────────────────────

    /// Run the dashboard until the user quits or the monitor task exits.
    ///
    /// Uses `crossterm::event::poll` with a 250 ms timeout so the terminal
    /// stays on the current thread while snapshots and toasts arrive on
    /// async channels.
    pub async fn run(mut self) -> io::Result<()> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let tick_rate = Duration::from_millis(250);

        let result = loop {
            let now = Instant::now();
            self.pull_updates(now);
            if self.should_quit {
                break Ok(());
            }

            if let Err(e) = terminal.draw(|frame| self.render(frame, now)) {
                break Err(e);
            }

            match event::poll(tick_rate) {
                Ok(true) => match event::read() {
                    Ok(Event::Key(key)) => {
                        if let Some(action) = KeyAction::from_key(&key) {
                            self.perform(action).await;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => break Err(e),
                },
                Ok(false) => {}
                Err(e) => break Err(e),
            }

            if self.should_quit {
                break Ok(());
            }
        };

        // Restore terminal state unconditionally.
        disable_raw_mode()?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    // ── State updates ─────────────────────────────────────────────────────────

    /// Take the latest snapshot, drain pending toasts and expire old ones.
    pub fn pull_updates(&mut self, now: Instant) {
        match self.snapshots.has_changed() {
            Ok(true) => self.snapshot = self.snapshots.borrow_and_update().clone(),
            Ok(false) => {}
            Err(_) => {
                tracing::info!("monitor task stopped; leaving dashboard");
                self.should_quit = true;
            }
        }

        while let Ok(toast) = self.toast_rx.try_recv() {
            self.toasts.push(toast, now);
        }
        self.toasts.prune(now);
    }

    /// Carry out a key action against the connection manager.
    pub async fn perform(&mut self, action: KeyAction) {
        let outcome = match action {
            KeyAction::Quit => {
                self.should_quit = true;
                Ok(())
            }
            KeyAction::Reconnect => {
                self.toasts.dismiss_persistent();
                self.handle.connect()
            }
            KeyAction::Disconnect => self.handle.disconnect().await,
            KeyAction::ClearSession => self.handle.clear_session(),
            KeyAction::DismissToasts => {
                self.toasts.clear();
                Ok(())
            }
        };
        if let Err(e) = outcome {
            tracing::warn!(?action, error = %e, "key action failed");
        }
    }

    fn render(&self, frame: &mut Frame, now: Instant) {
        let view = DashboardView {
            endpoint: &self.endpoint,
            snapshot: &self.snapshot,
            toasts: &self.toasts,
            now,
        };
        dashboard::render_dashboard(frame, frame.area(), &view, &self.theme);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use url::Url;

    use monitor_core::error::{MonitorError, Result};
    use monitor_core::models::ConnectionState;
    use monitor_runtime::alerts::{AlertDispatcher, ToastLevel};
    use monitor_runtime::manager::{ConnectionManager, ManagerConfig};
    use monitor_runtime::router::MessageRouter;
    use monitor_runtime::transport::{Connector, TransportLink};

    use crate::toasts::ChannelToasts;

    /// Never manages to open anything.
    struct RefusingConnector;

    #[async_trait]
    impl Connector for RefusingConnector {
        async fn connect(&self, _url: &Url) -> Result<TransportLink> {
            Err(MonitorError::Transport("connection refused".to_string()))
        }
    }

    fn spawn_app() -> App {
        let (toasts, toast_rx) = ChannelToasts::channel();
        let dispatcher = AlertDispatcher::new().with_toasts(Arc::new(toasts));
        let url = Url::parse("ws://127.0.0.1:9/ws/monitor").unwrap();
        let handle = ConnectionManager::new(
            ManagerConfig::new(url.clone()),
            Arc::new(RefusingConnector),
            MessageRouter::new(dispatcher),
        )
        .spawn();
        App::new("dark", url.to_string(), handle, toast_rx)
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    // ── KeyAction ─────────────────────────────────────────────────────────────

    #[test]
    fn test_key_mapping() {
        assert_eq!(KeyAction::from_key(&key(KeyCode::Char('q'))), Some(KeyAction::Quit));
        assert_eq!(KeyAction::from_key(&key(KeyCode::Esc)), Some(KeyAction::Quit));
        assert_eq!(KeyAction::from_key(&key(KeyCode::Char('r'))), Some(KeyAction::Reconnect));
        assert_eq!(KeyAction::from_key(&key(KeyCode::Char('d'))), Some(KeyAction::Disconnect));
        assert_eq!(
            KeyAction::from_key(&key(KeyCode::Char('c'))),
            Some(KeyAction::ClearSession)
        );
        assert_eq!(
            KeyAction::from_key(&key(KeyCode::Char('x'))),
            Some(KeyAction::DismissToasts)
        );
        assert_eq!(KeyAction::from_key(&key(KeyCode::Char('z'))), None);
    }

    #[test]
    fn test_ctrl_c_quits() {
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(KeyAction::from_key(&ctrl_c), Some(KeyAction::Quit));
    }

    #[test]
    fn test_key_release_ignored() {
        let mut release = key(KeyCode::Char('q'));
        release.kind = KeyEventKind::Release;
        assert_eq!(KeyAction::from_key(&release), None);
    }

    // ── App ───────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_app_creation_defaults() {
        let app = spawn_app();
        assert!(!app.should_quit);
        assert!(app.toasts.is_empty());
        assert_eq!(app.snapshot.connection.state, ConnectionState::Disconnected);
        assert_eq!(app.endpoint, "ws://127.0.0.1:9/ws/monitor");
    }

    #[tokio::test]
    async fn test_app_creation_unknown_theme_falls_back() {
        let mut app = spawn_app();
        app.theme = Theme::from_name("nope");
        assert!(app.theme.header.fg.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_failure_surfaces_toast_and_state() {
        let mut app = spawn_app();
        app.perform(KeyAction::Reconnect).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        app.pull_updates(Instant::now());
        assert_eq!(app.snapshot.connection.state, ConnectionState::Errored);
        assert!(app
            .toasts
            .visible()
            .any(|t| t.level == ToastLevel::Warning && t.message.contains("attempt 1 of 5")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_cancels_retry() {
        let mut app = spawn_app();
        app.perform(KeyAction::Reconnect).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        app.perform(KeyAction::Disconnect).await;

        app.pull_updates(Instant::now());
        assert_eq!(app.snapshot.connection.state, ConnectionState::Disconnected);
        assert_eq!(app.snapshot.connection.retry_in, None);
    }

    #[tokio::test]
    async fn test_dismiss_and_quit() {
        let mut app = spawn_app();
        app.toasts.push(
            Toast {
                level: ToastLevel::Info,
                title: "Monitoring".to_string(),
                message: "started".to_string(),
                duration: None,
            },
            Instant::now(),
        );
        app.perform(KeyAction::DismissToasts).await;
        assert!(app.toasts.is_empty());

        app.perform(KeyAction::Quit).await;
        assert!(app.should_quit);
    }

    #[tokio::test]
    async fn test_quits_when_monitor_task_stops() {
        let mut app = spawn_app();
        app.handle.shutdown().await.unwrap();
        tokio::task::yield_now().await;
        app.pull_updates(Instant::now());
        assert!(app.should_quit);
    }
}
