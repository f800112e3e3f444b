use crate::themes::Theme;
use ratatui::text::{Line, Span};

/// Configuration controlling visual appearance of a bar.
pub struct BarConfig {
    /// Width in terminal columns of the bar portion (excluding label).
    pub width: u16,
    /// Character used for the filled portion.
    pub filled_char: char,
    /// Character used for the empty portion.
    pub empty_char: char,
}

impl Default for BarConfig {
    fn default() -> Self {
        Self {
            width: 20,
            filled_char: '\u{2588}', // █  FULL BLOCK
            empty_char: '\u{2591}',  // ░  LIGHT SHADE
        }
    }
}

impl BarConfig {
    pub fn with_width(width: u16) -> Self {
        Self {
            width,
            ..Self::default()
        }
    }

    /// Split the bar width into filled and empty columns for `ratio`.
    fn split(&self, ratio: f64) -> (String, String) {
        let ratio = if ratio.is_finite() {
            ratio.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let filled = (ratio * self.width as f64).round() as u16;
        let empty = self.width.saturating_sub(filled);
        (
            std::iter::repeat_n(self.filled_char, filled as usize).collect(),
            std::iter::repeat_n(self.empty_char, empty as usize).collect(),
        )
    }
}

// ── RiskBar ──────────────────────────────────────────────────────────────────

/// Hallucination risk as a bar coloured by severity, followed by `NN%`.
pub struct RiskBar<'a> {
    /// Risk in `[0, 1]`.
    pub risk: f64,
    pub theme: &'a Theme,
    pub config: BarConfig,
}

impl<'a> RiskBar<'a> {
    pub fn new(risk: f64, theme: &'a Theme) -> Self {
        Self {
            risk,
            theme,
            config: BarConfig::default(),
        }
    }

    pub fn width(mut self, width: u16) -> Self {
        self.config = BarConfig::with_width(width);
        self
    }

    pub fn to_line(&self) -> Line<'a> {
        let (filled, empty) = self.config.split(self.risk);
        let style = self.theme.risk_style(self.risk);
        Line::from(vec![
            Span::styled(filled, style),
            Span::styled(empty, self.theme.dim),
            Span::styled(
                format!(" {}", monitor_core::formatting::format_risk(self.risk)),
                style,
            ),
        ])
    }
}

// ── FlaggedRateBar ───────────────────────────────────────────────────────────

/// Share of processed responses that were flagged, with `flagged/total`.
pub struct FlaggedRateBar<'a> {
    pub flagged: u64,
    pub total: u64,
    pub theme: &'a Theme,
    pub config: BarConfig,
}

impl<'a> FlaggedRateBar<'a> {
    pub fn new(flagged: u64, total: u64, theme: &'a Theme) -> Self {
        Self {
            flagged,
            total,
            theme,
            config: BarConfig::default(),
        }
    }

    fn ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.flagged as f64 / self.total as f64
        }
    }

    pub fn to_line(&self) -> Line<'a> {
        let ratio = self.ratio();
        let (filled, empty) = self.config.split(ratio);
        let style = self.theme.risk_style(ratio);
        Line::from(vec![
            Span::styled(filled, style),
            Span::styled(empty, self.theme.dim),
            Span::styled(
                format!(
                    " {} ({}/{})",
                    monitor_core::formatting::format_rate(ratio),
                    monitor_core::formatting::format_count(self.flagged),
                    monitor_core::formatting::format_count(self.total),
                ),
                self.theme.label,
            ),
        ])
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
