//! Live dashboard for the hallucination monitor.
//!
//! Laid out top to bottom: header, session stats beside the accuracy panel,
//! per-agent table, recent detections, key help. Toasts are stacked over the
//! top-right corner.

use std::time::Instant;

use ratatui::{
    layout::{Constraint, Layout, Rect},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table},
    Frame,
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use monitor_core::formatting;
use monitor_core::models::DetectionEvent;
use monitor_data::accuracy::AccuracyReport;
use monitor_data::session_store::AgentStats;
use monitor_runtime::manager::MonitorSnapshot;

use crate::components::header::Header;
use crate::components::progress_bar::{FlaggedRateBar, RiskBar};
use crate::themes::Theme;
use crate::toasts::ToastQueue;

/// Key help shown on the last row.
pub const KEY_HELP: &str = "q quit · r reconnect · d disconnect · c clear session · x dismiss";

const TOAST_WIDTH: u16 = 48;
const TOAST_HEIGHT: u16 = 4;
const SUMMARY_HEIGHT: u16 = 9;
const MAX_AGENT_ROWS: u16 = 8;

/// Everything one frame needs.
pub struct DashboardView<'a> {
    /// Stream endpoint shown in the header.
    pub endpoint: &'a str,
    pub snapshot: &'a MonitorSnapshot,
    pub toasts: &'a ToastQueue,
    pub now: Instant,
}

/// Render the full dashboard into `area`.
pub fn render_dashboard(frame: &mut Frame, area: Rect, view: &DashboardView, theme: &Theme) {
    let snapshot = view.snapshot;
    let agent_rows = (snapshot.stats.per_agent.len() as u16).clamp(1, MAX_AGENT_ROWS);

    let [header_area, summary_area, agents_area, events_area, help_area] = Layout::vertical([
        Constraint::Length(4),
        Constraint::Length(SUMMARY_HEIGHT),
        Constraint::Length(agent_rows + 3),
        Constraint::Min(5),
        Constraint::Length(1),
    ])
    .areas(area);

    let header = Header::new(
        view.endpoint,
        &snapshot.connection,
        snapshot.monitoring_active,
        theme,
    );
    frame.render_widget(Paragraph::new(Text::from(header.to_lines())), header_area);

    let [stats_area, accuracy_area] =
        Layout::horizontal([Constraint::Percentage(55), Constraint::Percentage(45)])
            .areas(summary_area);
    frame.render_widget(
        Paragraph::new(Text::from(stats_lines(snapshot, theme))).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(theme.table_border)
                .title(" Session "),
        ),
        stats_area,
    );
    frame.render_widget(
        Paragraph::new(Text::from(accuracy_lines(snapshot.accuracy.as_ref(), theme))).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(theme.table_border)
                .title(" Accuracy "),
        ),
        accuracy_area,
    );

    render_agents_table(frame, agents_area, &snapshot.stats.per_agent, theme);

    if snapshot.recent.is_empty() {
        render_waiting(frame, events_area, theme);
    } else {
        render_events_table(frame, events_area, &snapshot.recent, theme);
    }

    frame.render_widget(
        Paragraph::new(Line::from(Span::styled(KEY_HELP, theme.dim))),
        help_area,
    );

    render_toasts(frame, area, view.toasts, view.now, theme);
}

// ── Summary panels ────────────────────────────────────────────────────────────

/// Lines of the session panel (extracted for testability).
pub fn stats_lines<'a>(snapshot: &MonitorSnapshot, theme: &'a Theme) -> Vec<Line<'a>> {
    let stats = &snapshot.stats;
    let mut lines = Vec::with_capacity(7);

    lines.push(Line::from(vec![
        Span::styled("Processed:   ", theme.label),
        Span::styled(formatting::format_count(stats.total), theme.value),
    ]));

    let mut flagged = vec![Span::styled("Flagged:     ", theme.label)];
    flagged.extend(
        FlaggedRateBar::new(stats.flagged, stats.total, theme)
            .to_line()
            .spans,
    );
    lines.push(Line::from(flagged));

    let mut risk = vec![Span::styled("Avg risk:    ", theme.label)];
    risk.extend(RiskBar::new(stats.average_risk, theme).to_line().spans);
    lines.push(Line::from(risk));

    lines.push(Line::from(vec![
        Span::styled("Latency:     ", theme.label),
        Span::styled(format!("{:.0} ms", stats.average_processing_ms), theme.value),
        Span::styled("   Rate: ", theme.label),
        Span::styled(
            formatting::format_throughput(stats.events_per_minute),
            theme.value,
        ),
    ]));

    lines.push(Line::from(vec![
        Span::styled("Session:     ", theme.label),
        Span::styled(formatting::format_duration(stats.duration), theme.value),
    ]));

    if let Some(ref reported) = snapshot.reported_stats {
        let count = |value: Option<u64>| {
            value
                .map(formatting::format_count)
                .unwrap_or_else(|| "-".to_string())
        };
        lines.push(Line::from(vec![
            Span::styled("Backend:     ", theme.label),
            Span::styled(
                format!(
                    "{} processed, {} flagged",
                    count(reported.total_processed),
                    count(reported.flagged_count)
                ),
                theme.dim,
            ),
        ]));
    }

    lines
}

/// Lines of the accuracy panel (extracted for testability).
pub fn accuracy_lines<'a>(report: Option<&AccuracyReport>, theme: &'a Theme) -> Vec<Line<'a>> {
    let Some(report) = report else {
        return vec![
            Line::from(""),
            Line::from(Span::styled("No labelled responses yet", theme.dim)),
        ];
    };

    let metric = |label: &'static str, value: f64| {
        Line::from(vec![
            Span::styled(label, theme.label),
            Span::styled(formatting::format_rate(value), theme.value),
        ])
    };

    vec![
        metric("Accuracy:  ", report.accuracy()),
        metric("Precision: ", report.precision()),
        metric("Recall:    ", report.recall()),
        metric("F1:        ", report.f1()),
        Line::from(vec![
            Span::styled("TP ", theme.label),
            Span::styled(report.true_positives.to_string(), theme.success),
            Span::styled("  FP ", theme.label),
            Span::styled(report.false_positives.to_string(), theme.warning),
            Span::styled("  TN ", theme.label),
            Span::styled(report.true_negatives.to_string(), theme.success),
            Span::styled("  FN ", theme.label),
            Span::styled(report.false_negatives.to_string(), theme.error),
        ]),
        Line::from(Span::styled(
            format!("{} labelled", formatting::format_count(report.labelled())),
            theme.dim,
        )),
    ]
}

// ── Tables ────────────────────────────────────────────────────────────────────

fn render_agents_table(frame: &mut Frame, area: Rect, agents: &[AgentStats], theme: &Theme) {
    let header = Row::new(
        ["Agent", "Total", "Flagged", "Rate", "Avg risk", "Max risk", "Last seen"]
            .iter()
            .map(|h| Cell::from(*h).style(theme.table_header)),
    );

    let rows: Vec<Row> = agents
        .iter()
        .map(|agent| {
            Row::new(vec![
                Cell::from(fit_width(&agent.agent_id, 16)),
                Cell::from(formatting::format_count(agent.total)),
                Cell::from(formatting::format_count(agent.flagged)),
                Cell::from(formatting::format_rate(agent.flagged_rate())),
                Cell::from(Span::styled(
                    formatting::format_risk(agent.average_risk()),
                    theme.risk_style(agent.average_risk()),
                )),
                Cell::from(Span::styled(
                    formatting::format_risk(agent.max_risk),
                    theme.risk_style(agent.max_risk),
                )),
                Cell::from(clock_time(&agent.last_seen)),
            ])
            .style(theme.table_row)
        })
        .collect();

    let widths = [
        Constraint::Length(16),
        Constraint::Length(8),
        Constraint::Length(8),
        Constraint::Length(7),
        Constraint::Length(9),
        Constraint::Length(9),
        Constraint::Length(9),
    ];

    frame.render_widget(
        Table::new(rows, widths)
            .header(header)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(theme.table_border)
                    .title(" Agents "),
            )
            .style(theme.text),
        area,
    );
}

/// Recent detections, newest at the top.
fn render_events_table(frame: &mut Frame, area: Rect, recent: &[DetectionEvent], theme: &Theme) {
    const FIXED: u16 = 9 + 14 + 16 + 3 + 6 + 7 + 2;
    let detail_width = area.width.saturating_sub(FIXED + 8).max(10) as usize;

    let header = Row::new(
        ["Time", "Agent", "Risk", "", "Conf", "ms", "Detail"]
            .iter()
            .map(|h| Cell::from(*h).style(theme.table_header)),
    );

    let rows: Vec<Row> = recent
        .iter()
        .rev()
        .map(|event| {
            let style = if event.flagged {
                theme.flagged_row
            } else {
                theme.table_row
            };
            Row::new(vec![
                Cell::from(clock_time(&event.timestamp)),
                Cell::from(fit_width(&event.agent_id, 14)),
                Cell::from(RiskBar::new(event.hallucination_risk, theme).width(10).to_line()),
                Cell::from(if event.flagged { "⚠" } else { "✓" }),
                Cell::from(formatting::format_risk(event.confidence)),
                Cell::from(event.processing_time_ms.to_string()),
                Cell::from(fit_width(&event_detail(event), detail_width)),
            ])
            .style(style)
        })
        .collect();

    let widths = [
        Constraint::Length(9),
        Constraint::Length(14),
        Constraint::Length(16),
        Constraint::Length(3),
        Constraint::Length(6),
        Constraint::Length(7),
        Constraint::Min(10),
    ];

    frame.render_widget(
        Table::new(rows, widths)
            .header(header)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(theme.table_border)
                    .title(format!(" Recent detections ({}) ", recent.len())),
            )
            .style(theme.text),
        area,
    );
}

/// Placeholder shown before the first detection arrives.
pub fn render_waiting(frame: &mut Frame, area: Rect, theme: &Theme) {
    let text = vec![
        Line::from(""),
        Line::from(Span::styled("Waiting for detections…", theme.warning)),
        Line::from(""),
        Line::from(Span::styled(
            "Start the backend generator with --start-monitoring.",
            theme.dim,
        )),
    ];
    frame.render_widget(
        Paragraph::new(Text::from(text)).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(theme.table_border)
                .title(" Recent detections "),
        ),
        area,
    );
}

// ── Toasts ────────────────────────────────────────────────────────────────────

fn render_toasts(frame: &mut Frame, area: Rect, toasts: &ToastQueue, now: Instant, theme: &Theme) {
    let width = TOAST_WIDTH.min(area.width);
    let inner_width = width.saturating_sub(2) as usize;
    let x = area.x + area.width - width;
    let mut y = area.y;

    for (index, toast) in toasts.visible().enumerate() {
        if y + TOAST_HEIGHT > area.y + area.height {
            break;
        }
        let rect = Rect::new(x, y, width, TOAST_HEIGHT);
        let mut title = toast.title.clone();
        if let Some(left) = toasts.remaining(index, now) {
            title = format!("{title} · {}s", left.as_secs_f64().ceil() as u64);
        }
        let body = vec![
            Line::from(Span::styled(
                fit_width(&title, inner_width),
                theme.toast_style(toast.level),
            )),
            Line::from(Span::styled(fit_width(&toast.message, inner_width), theme.text)),
        ];
        frame.render_widget(Clear, rect);
        frame.render_widget(
            Paragraph::new(Text::from(body)).block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(theme.toast_border),
            ),
            rect,
        );
        y += TOAST_HEIGHT;
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// The flagged segment when present, otherwise the query.
fn event_detail(event: &DetectionEvent) -> String {
    match event.primary_segment() {
        Some(segment) if event.flagged => format!("“{segment}”"),
        _ => event.query.clone(),
    }
}

fn clock_time(ts: &chrono::DateTime<chrono::Utc>) -> String {
    ts.with_timezone(&chrono::Local).format("%H:%M:%S").to_string()
}

/// Shorten `text` to at most `max_width` display columns, appending `…` when
/// cut. Wide characters count as two columns.
pub fn fit_width(text: &str, max_width: usize) -> String {
    if UnicodeWidthStr::width(text) <= max_width {
        return text.to_string();
    }
    if max_width == 0 {
        return String::new();
    }
    let budget = max_width - 1;
    let mut used = 0;
    let mut out = String::new();
    for c in text.chars() {
        let w = UnicodeWidthChar::width(c).unwrap_or(0);
        if used + w > budget {
            break;
        }
        used += w;
        out.push(c);
    }
    out.push('…');
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────
