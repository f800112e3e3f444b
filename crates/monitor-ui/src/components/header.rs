use crate::components::indicators::{ConnectionIndicator, MonitoringIndicator};
use crate::themes::Theme;
use ratatui::text::{Line, Span};

use monitor_runtime::connection::ConnectionSnapshot;

/// Decoration placed either side of the application title.
pub const TITLE_MARKS: &str = "◆ ◇ ◆";

/// Width of the `=` separator under the title.
pub const SEPARATOR_WIDTH: usize = 60;

/// Dashboard header rendering four lines:
///
/// 1. Application title.
/// 2. A 60-column `=` separator.
/// 3. `[ endpoint | connection | monitoring ]`.
/// 4. An empty line.
pub struct Header<'a> {
    /// Stream endpoint being watched.
    pub endpoint: &'a str,
    pub connection: &'a ConnectionSnapshot,
    pub monitoring_active: bool,
    pub theme: &'a Theme,
}

impl<'a> Header<'a> {
    pub fn new(
        endpoint: &'a str,
        connection: &'a ConnectionSnapshot,
        monitoring_active: bool,
        theme: &'a Theme,
    ) -> Self {
        Self {
            endpoint,
            connection,
            monitoring_active,
            theme,
        }
    }

    /// Render the header as exactly four lines.
    pub fn to_lines(&self) -> Vec<Line<'a>> {
        let mut status: Vec<Span<'a>> = vec![
            Span::styled("[ ", self.theme.label),
            Span::styled(self.endpoint, self.theme.value),
            Span::styled(" | ", self.theme.label),
        ];
        status.extend(ConnectionIndicator::new(self.connection, self.theme).to_line().spans);
        status.push(Span::styled(" | ", self.theme.label));
        status.extend(
            MonitoringIndicator::new(self.monitoring_active, self.theme)
                .to_line()
                .spans,
        );
        status.push(Span::styled(" ]", self.theme.label));

        vec![
            Line::from(vec![
                Span::styled(TITLE_MARKS, self.theme.dim),
                Span::styled(" HALLUCINATION MONITOR ", self.theme.header),
                Span::styled(TITLE_MARKS, self.theme.dim),
            ]),
            Line::from(Span::styled(
                "=".repeat(SEPARATOR_WIDTH),
                self.theme.separator,
            )),
            Line::from(status),
            Line::from(""),
        ]
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
