use std::time::Duration;

/// Format an integer count with thousands separators.
///
/// # Examples
///
/// ```
/// use monitor_core::formatting::format_count;
///
/// assert_eq!(format_count(0), "0");
/// assert_eq!(format_count(1234), "1,234");
/// assert_eq!(format_count(1234567), "1,234,567");
/// ```
pub fn format_count(value: u64) -> String {
    group_thousands(&value.to_string())
}

/// Format a ratio in `[0, 1]` as a percentage with one decimal place.
///
/// # Examples
///
/// ```
/// use monitor_core::formatting::format_rate;
///
/// assert_eq!(format_rate(0.0), "0.0%");
/// assert_eq!(format_rate(0.125), "12.5%");
/// assert_eq!(format_rate(1.0), "100.0%");
/// ```
pub fn format_rate(ratio: f64) -> String {
    format!("{:.1}%", ratio * 100.0)
}

/// Format a hallucination risk in `[0, 1]` as a whole percentage.
///
/// ```
/// use monitor_core::formatting::format_risk;
///
/// assert_eq!(format_risk(0.82), "82%");
/// assert_eq!(format_risk(0.826), "83%");
/// ```
pub fn format_risk(risk: f64) -> String {
    format!("{:.0}%", risk * 100.0)
}

/// Format a session length for the dashboard.
///
/// * `< 1` minute → `"42s"`
/// * `< 1` hour → `"12m 05s"`
/// * otherwise → `"2h 03m"`
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use monitor_core::formatting::format_duration;
///
/// assert_eq!(format_duration(Duration::from_secs(42)), "42s");
/// assert_eq!(format_duration(Duration::from_secs(725)), "12m 05s");
/// assert_eq!(format_duration(Duration::from_secs(7380)), "2h 03m");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{}h {:02}m", secs / 3600, (secs % 3600) / 60)
    }
}

/// Format a reconnect delay compactly: `"500ms"`, `"4s"`, `"1.5s"`.
pub fn format_delay(delay: Duration) -> String {
    let millis = delay.as_millis();
    if millis < 1000 {
        format!("{}ms", millis)
    } else if millis % 1000 == 0 {
        format!("{}s", millis / 1000)
    } else {
        format!("{:.1}s", delay.as_secs_f64())
    }
}

/// Format a throughput figure in events per minute.
pub fn format_throughput(events_per_minute: f64) -> String {
    format!("{:.1}/min", events_per_minute)
}

/// Shorten `text` to at most `max_chars` characters, appending `…` when cut.
///
/// Operates on `char`s so multi-byte text is never split mid-codepoint.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars == 0 {
        return String::new();
    }
    let mut out: String = text.chars().take(max_chars - 1).collect();
    out.push('…');
    out
}

// ── Internal helpers ──────────────────────────────────────────────────────────

/// Insert commas every three digits from the right of an integer string.
fn group_thousands(s: &str) -> String {
    let len = s.len();
    let mut result = String::with_capacity(len + len / 3);
    for (i, c) in s.chars().enumerate() {
        if i != 0 && (len - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}
