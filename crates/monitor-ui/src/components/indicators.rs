use crate::themes::Theme;
use ratatui::text::{Line, Span};

use monitor_core::formatting;
use monitor_core::models::ConnectionState;
use monitor_runtime::connection::ConnectionSnapshot;

// ── ConnectionIndicator ──────────────────────────────────────────────────────

/// Connection state with a glyph, plus retry progress when reconnecting.
///
/// | State        | Glyph |
/// |--------------|-------|
/// | connected    | ●     |
/// | connecting   | ◐     |
/// | disconnected | ○     |
/// | error        | ✖     |
pub struct ConnectionIndicator<'a> {
    pub snapshot: &'a ConnectionSnapshot,
    pub theme: &'a Theme,
}

impl<'a> ConnectionIndicator<'a> {
    pub fn new(snapshot: &'a ConnectionSnapshot, theme: &'a Theme) -> Self {
        Self { snapshot, theme }
    }

    pub fn glyph(&self) -> &'static str {
        match self.snapshot.state {
            ConnectionState::Connected => "●",
            ConnectionState::Connecting => "◐",
            ConnectionState::Disconnected => "○",
            ConnectionState::Errored => "✖",
        }
    }

    fn label(&self) -> &'static str {
        match self.snapshot.state {
            ConnectionState::Connected => "Connected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Errored => "Error",
        }
    }

    /// Format: `"● Connected"` or `"✖ Error · retry 2/5 in 2s"`.
    pub fn to_line(&self) -> Line<'a> {
        let style = self.theme.state_style(self.snapshot.state);
        let mut spans = vec![Span::styled(
            format!("{} {}", self.glyph(), self.label()),
            style,
        )];

        if let Some(delay) = self.snapshot.retry_in {
            spans.push(Span::styled(
                format!(
                    " · retry {}/{} in {}",
                    self.snapshot.attempts,
                    self.snapshot.max_attempts,
                    formatting::format_delay(delay)
                ),
                self.theme.warning,
            ));
        } else if let Some(ref error) = self.snapshot.error {
            spans.push(Span::styled(format!(" · {error}"), self.theme.dim));
        }

        Line::from(spans)
    }
}

// ── MonitoringIndicator ──────────────────────────────────────────────────────

/// Whether the backend is currently generating responses.
pub struct MonitoringIndicator<'a> {
    pub active: bool,
    pub theme: &'a Theme,
}

impl<'a> MonitoringIndicator<'a> {
    pub fn new(active: bool, theme: &'a Theme) -> Self {
        Self { active, theme }
    }

    pub fn to_line(&self) -> Line<'a> {
        let (text, style) = if self.active {
            ("▶ monitoring", self.theme.success)
        } else {
            ("■ idle", self.theme.dim)
        };
        Line::from(vec![Span::styled(text, style)])
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
