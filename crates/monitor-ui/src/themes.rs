use ratatui::style::{Color, Modifier, Style};

use monitor_core::models::ConnectionState;
use monitor_runtime::alerts::ToastLevel;

/// Terminal background type detection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BackgroundType {
    Dark,
    Light,
}

/// Detect terminal background type from the `COLORFGBG` environment variable.
///
/// The variable has the format `"foreground;background"`.  Background values
/// 0–6 are considered dark; 7–15 are considered light.  If the variable is
/// absent or unparseable, `BackgroundType::Dark` is returned.
pub fn detect_background() -> BackgroundType {
    if let Ok(val) = std::env::var("COLORFGBG") {
        if let Some(bg) = val.split(';').next_back() {
            if let Ok(bg_num) = bg.parse::<u8>() {
                return if bg_num <= 6 {
                    BackgroundType::Dark
                } else {
                    BackgroundType::Light
                };
            }
        }
    }
    BackgroundType::Dark
}

/// Every style used by the dashboard.
#[derive(Debug, Clone)]
pub struct Theme {
    // ── Header ───────────────────────────────────────────────────────────────
    pub header: Style,
    pub separator: Style,

    // ── Text ─────────────────────────────────────────────────────────────────
    pub text: Style,
    pub dim: Style,
    pub label: Style,
    pub value: Style,

    // ── Status ───────────────────────────────────────────────────────────────
    pub info: Style,
    pub success: Style,
    pub warning: Style,
    pub error: Style,

    // ── Risk ─────────────────────────────────────────────────────────────────
    /// Risk below 30 %.
    pub risk_low: Style,
    /// Risk between 30 % and 70 %.
    pub risk_medium: Style,
    /// Risk at or above 70 %.
    pub risk_high: Style,
    /// Row highlight for flagged detections.
    pub flagged_row: Style,

    // ── Table ────────────────────────────────────────────────────────────────
    pub table_header: Style,
    pub table_border: Style,
    pub table_row: Style,

    // ── Toasts ───────────────────────────────────────────────────────────────
    pub toast_critical: Style,
    pub toast_border: Style,
}

impl Theme {
    // ── Constructors ─────────────────────────────────────────────────────────

    /// Dark-background terminal theme (default).
    pub fn dark() -> Self {
        Self {
            header: Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
            separator: Style::default().fg(Color::DarkGray),

            text: Style::default().fg(Color::White),
            dim: Style::default().fg(Color::DarkGray),
            label: Style::default().fg(Color::Gray),
            value: Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),

            info: Style::default().fg(Color::Cyan),
            success: Style::default().fg(Color::Green),
            warning: Style::default().fg(Color::Yellow),
            error: Style::default().fg(Color::Red),

            risk_low: Style::default().fg(Color::Green),
            risk_medium: Style::default().fg(Color::Yellow),
            risk_high: Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            flagged_row: Style::default().fg(Color::LightRed),

            table_header: Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
            table_border: Style::default().fg(Color::DarkGray),
            table_row: Style::default().fg(Color::White),

            toast_critical: Style::default()
                .fg(Color::White)
                .bg(Color::Red)
                .add_modifier(Modifier::BOLD),
            toast_border: Style::default().fg(Color::Gray),
        }
    }

    /// Light-background terminal theme.
    pub fn light() -> Self {
        Self {
            header: Style::default()
                .fg(Color::Blue)
                .add_modifier(Modifier::BOLD),
            separator: Style::default().fg(Color::Gray),

            text: Style::default().fg(Color::Black),
            dim: Style::default().fg(Color::Gray),
            label: Style::default().fg(Color::DarkGray),
            value: Style::default()
                .fg(Color::Black)
                .add_modifier(Modifier::BOLD),

            info: Style::default().fg(Color::Blue),
            success: Style::default().fg(Color::Green),
            warning: Style::default().fg(Color::Yellow),
            error: Style::default().fg(Color::Red),

            risk_low: Style::default().fg(Color::Green),
            risk_medium: Style::default().fg(Color::Yellow),
            risk_high: Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            flagged_row: Style::default().fg(Color::Red),

            table_header: Style::default()
                .fg(Color::Blue)
                .add_modifier(Modifier::BOLD),
            table_border: Style::default().fg(Color::Gray),
            table_row: Style::default().fg(Color::Black),

            toast_critical: Style::default()
                .fg(Color::White)
                .bg(Color::Red)
                .add_modifier(Modifier::BOLD),
            toast_border: Style::default().fg(Color::DarkGray),
        }
    }

    /// Basic 8-colour ANSI palette without bold modifiers.
    pub fn classic() -> Self {
        Self {
            header: Style::default().fg(Color::Cyan),
            separator: Style::default().fg(Color::DarkGray),

            text: Style::default().fg(Color::White),
            dim: Style::default().fg(Color::DarkGray),
            label: Style::default().fg(Color::Gray),
            value: Style::default().fg(Color::White),

            info: Style::default().fg(Color::Cyan),
            success: Style::default().fg(Color::Green),
            warning: Style::default().fg(Color::Yellow),
            error: Style::default().fg(Color::Red),

            risk_low: Style::default().fg(Color::Green),
            risk_medium: Style::default().fg(Color::Yellow),
            risk_high: Style::default().fg(Color::Red),
            flagged_row: Style::default().fg(Color::Red),

            table_header: Style::default().fg(Color::Cyan),
            table_border: Style::default().fg(Color::DarkGray),
            table_row: Style::default().fg(Color::White),

            toast_critical: Style::default().fg(Color::White).bg(Color::Red),
            toast_border: Style::default().fg(Color::Gray),
        }
    }

    /// Choose a theme automatically based on the detected terminal background.
    pub fn auto_detect() -> Self {
        match detect_background() {
            BackgroundType::Light => Self::light(),
            BackgroundType::Dark => Self::dark(),
        }
    }

    /// Construct a theme by name.  Falls back to `auto_detect` for unknown
    /// names.
    pub fn from_name(name: &str) -> Self {
        match name {
            "light" => Self::light(),
            "dark" => Self::dark(),
            "classic" => Self::classic(),
            _ => Self::auto_detect(),
        }
    }

    // ── Style helpers ────────────────────────────────────────────────────────

    /// Style for a hallucination risk in `[0, 1]`.
    ///
    /// * `< 0.3`     → `risk_low`
    /// * `0.3–0.7`   → `risk_medium`
    /// * `≥ 0.7`     → `risk_high`
    pub fn risk_style(&self, risk: f64) -> Style {
        if risk >= 0.7 {
            self.risk_high
        } else if risk >= 0.3 {
            self.risk_medium
        } else {
            self.risk_low
        }
    }

    /// Style for the connection indicator.
    pub fn state_style(&self, state: ConnectionState) -> Style {
        match state {
            ConnectionState::Connected => self.success,
            ConnectionState::Connecting => self.warning,
            ConnectionState::Disconnected => self.dim,
            ConnectionState::Errored => self.error,
        }
    }

    /// Style for a toast's title line.
    pub fn toast_style(&self, level: ToastLevel) -> Style {
        match level {
            ToastLevel::Critical => self.toast_critical,
            ToastLevel::Success => self.success,
            ToastLevel::Warning => self.warning,
            ToastLevel::Error => self.error.add_modifier(Modifier::BOLD),
            ToastLevel::Info => self.info,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
