//! Wire contract of the streaming and control endpoints.
//!
//! Server frames are JSON objects discriminated by a `type` field. Decoding
//! happens in two steps: the discriminant is read from a generic
//! [`serde_json::Value`] first, so that unknown kinds can be reported by name
//! and malformed bodies can be told apart from frames we simply don't handle.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use url::Url;

use crate::error::{ConnectionError, MonitorError, Result};
use crate::models::{DetectionEvent, ReportedStats};

/// Path of the streaming endpoint, relative to the API base.
pub const MONITOR_PATH: &str = "/ws/monitor";
/// Path of the control endpoint that starts the backend's response generator.
pub const START_PATH: &str = "/monitor/start";
/// Path of the control endpoint that stops it.
pub const STOP_PATH: &str = "/monitor/stop";
/// WebSocket close code for an intentional, orderly shutdown.
pub const NORMAL_CLOSURE: u16 = 1000;

// ── Client → server ───────────────────────────────────────────────────────────

/// Frames the client sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Liveness frame, sent on open and on every ping interval.
    Ping,
}

impl ClientFrame {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ── Server → client ───────────────────────────────────────────────────────────

/// A decoded server frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerFrame {
    DetectionResult(DetectionEvent),
    MonitoringStarted,
    MonitoringStopped { stats: Option<ReportedStats> },
    ConnectionEstablished,
    Keepalive,
    Error { message: String },
    ProcessingError { agent_id: Option<String>, message: String },
    /// Any discriminant this client does not know.
    Unknown { kind: String },
}

impl ServerFrame {
    /// The wire discriminant of this frame.
    pub fn kind(&self) -> &str {
        match self {
            ServerFrame::DetectionResult(_) => "detection_result",
            ServerFrame::MonitoringStarted => "monitoring_started",
            ServerFrame::MonitoringStopped { .. } => "monitoring_stopped",
            ServerFrame::ConnectionEstablished => "connection_established",
            ServerFrame::Keepalive => "keepalive",
            ServerFrame::Error { .. } => "error",
            ServerFrame::ProcessingError { .. } => "processing_error",
            ServerFrame::Unknown { kind } => kind,
        }
    }
}

/// Decode one inbound text frame.
///
/// Returns [`ConnectionError::Protocol`] for invalid JSON, a missing `type`,
/// or a `detection_result` body that does not match [`DetectionEvent`].
/// Unknown discriminants are not an error; they decode to
/// [`ServerFrame::Unknown`].
pub fn decode_frame(text: &str) -> std::result::Result<ServerFrame, ConnectionError> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| ConnectionError::Protocol(format!("invalid JSON: {e}")))?;

    let Some(kind) = value.get("type").and_then(Value::as_str) else {
        return Err(ConnectionError::Protocol(
            "frame has no string \"type\" field".to_string(),
        ));
    };

    let frame = match kind {
        "detection_result" => {
            // Some backend versions nest the result under "data".
            let body = match value.get("data") {
                Some(data) if data.is_object() => data,
                _ => &value,
            };
            let event = DetectionEvent::deserialize(body).map_err(|e| {
                ConnectionError::Protocol(format!("invalid detection_result: {e}"))
            })?;
            ServerFrame::DetectionResult(event.with_clamped_scores())
        }
        "monitoring_started" => ServerFrame::MonitoringStarted,
        "monitoring_stopped" => ServerFrame::MonitoringStopped {
            stats: value
                .get("stats")
                .filter(|s| s.is_object())
                .and_then(|s| ReportedStats::deserialize(s).ok()),
        },
        "connection_established" => ServerFrame::ConnectionEstablished,
        "keepalive" => ServerFrame::Keepalive,
        "error" => ServerFrame::Error {
            message: message_of(&value),
        },
        "processing_error" => ServerFrame::ProcessingError {
            agent_id: value
                .get("agent_id")
                .and_then(Value::as_str)
                .map(str::to_string),
            message: message_of(&value),
        },
        other => ServerFrame::Unknown {
            kind: other.to_string(),
        },
    };

    Ok(frame)
}

fn message_of(value: &Value) -> String {
    ["message", "error", "detail"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .unwrap_or("Unknown server error")
        .to_string()
}

// ── Timestamps ────────────────────────────────────────────────────────────────

/// Parse a backend timestamp.
///
/// Accepts RFC 3339 strings (with or without a `Z` suffix), naive ISO 8601
/// strings (interpreted as UTC, which is what the backend emits), and Unix
/// epoch seconds as an integer or float.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_timestamp_str(s),
        Value::Number(n) => {
            if let Some(secs) = n.as_i64() {
                DateTime::from_timestamp(secs, 0)
            } else {
                let f = n.as_f64()?;
                let nanos = (f.fract() * 1_000_000_000.0).round() as u32;
                DateTime::from_timestamp(f.trunc() as i64, nanos)
            }
        }
        _ => None,
    }
}

fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    const NAIVE_FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
    ];
    NAIVE_FORMATS.iter().find_map(|fmt| {
        chrono::NaiveDateTime::parse_from_str(s, fmt)
            .ok()
            .map(|naive| Utc.from_utc_datetime(&naive))
    })
}

/// Serde adapter for [`DetectionEvent::timestamp`].
///
/// Unparseable values fall back to the receipt time rather than rejecting the
/// whole event.
pub fn deserialize_timestamp<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(parse_timestamp(&value).unwrap_or_else(|| {
        tracing::debug!(%value, "unparseable detection timestamp; using receipt time");
        Utc::now()
    }))
}

// ── Endpoint URLs ─────────────────────────────────────────────────────────────

/// Build the streaming endpoint URL from the configured API base.
///
/// `http` becomes `ws` and `https` becomes `wss`; a base already using a
/// WebSocket scheme is kept as is.
///
/// ```
/// use monitor_core::protocol::monitor_url;
///
/// let url = monitor_url("https://api.example.com").unwrap();
/// assert_eq!(url.as_str(), "wss://api.example.com/ws/monitor");
/// ```
pub fn monitor_url(api_base: &str) -> Result<Url> {
    let mut url = parse_base(api_base)?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(invalid_url(api_base, format!("unsupported scheme {other:?}"))),
    };
    url.set_scheme(scheme)
        .map_err(|_| invalid_url(api_base, format!("cannot switch scheme to {scheme}")))?;
    append_path(&mut url, MONITOR_PATH);
    Ok(url)
}

/// Build the URL of a control endpoint such as [`START_PATH`].
pub fn control_url(api_base: &str, path: &str) -> Result<Url> {
    let mut url = parse_base(api_base)?;
    let scheme = match url.scheme() {
        "http" | "ws" => "http",
        "https" | "wss" => "https",
        other => return Err(invalid_url(api_base, format!("unsupported scheme {other:?}"))),
    };
    url.set_scheme(scheme)
        .map_err(|_| invalid_url(api_base, format!("cannot switch scheme to {scheme}")))?;
    append_path(&mut url, path);
    Ok(url)
}

fn parse_base(api_base: &str) -> Result<Url> {
    Url::parse(api_base.trim()).map_err(|e| invalid_url(api_base, e.to_string()))
}

fn append_path(url: &mut Url, path: &str) {
    let joined = format!("{}{}", url.path().trim_end_matches('/'), path);
    url.set_path(&joined);
}

fn invalid_url(url: &str, reason: String) -> MonitorError {
    MonitorError::InvalidUrl {
        url: url.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── ClientFrame ───────────────────────────────────────────────────────────

    #[test]
    fn test_ping_serialises_to_type_only() {
        assert_eq!(ClientFrame::Ping.to_json().unwrap(), r#"{"type":"ping"}"#);
    }

    // ── decode_frame ──────────────────────────────────────────────────────────

    #[test]
    fn test_decode_detection_result() {
        let text = r#"{
            "type": "detection_result",
            "agent_id": "it_bot",
            "query": "What is the capital of France?",
            "output": "The capital of France is Berlin.",
            "hallucination_risk": 0.82,
            "flagged": true,
            "confidence": 0.91,
            "flagged_segments": ["capital of France is Berlin"],
            "mitigation": "Paris is the capital of France.",
            "timestamp": "2024-05-01T12:00:00Z",
            "processing_time_ms": 140
        }"#;
        let ServerFrame::DetectionResult(event) = decode_frame(text).unwrap() else {
            panic!("expected a detection result");
        };
        assert_eq!(event.agent_id, "it_bot");
        assert!(event.flagged);
        assert_eq!(event.flagged_segments, vec!["capital of France is Berlin"]);
        assert_eq!(event.processing_time_ms, 140);
        assert_eq!(event.timestamp.to_rfc3339(), "2024-05-01T12:00:00+00:00");
    }

    #[test]
    fn test_decode_detection_result_nested_under_data() {
        let text = r#"{"type":"detection_result","data":{"agent_id":"x","hallucination_risk":0.2,"flagged":false}}"#;
        let frame = decode_frame(text).unwrap();
        assert_eq!(frame.kind(), "detection_result");
    }

    #[test]
    fn test_decode_detection_result_missing_required_field_is_protocol_error() {
        let err = decode_frame(r#"{"type":"detection_result","agent_id":"x"}"#).unwrap_err();
        assert!(matches!(err, ConnectionError::Protocol(_)));
    }

    #[test]
    fn test_decode_invalid_json_is_protocol_error() {
        let err = decode_frame("{not json").unwrap_err();
        assert!(matches!(err, ConnectionError::Protocol(_)));
    }

    #[test]
    fn test_decode_missing_type_is_protocol_error() {
        let err = decode_frame(r#"{"agent_id":"x"}"#).unwrap_err();
        assert!(matches!(err, ConnectionError::Protocol(_)));
    }

    #[test]
    fn test_decode_unknown_type() {
        let frame = decode_frame(r#"{"type":"leaderboard_update"}"#).unwrap();
        assert_eq!(
            frame,
            ServerFrame::Unknown {
                kind: "leaderboard_update".to_string()
            }
        );
    }

    #[test]
    fn test_decode_error_message_fallbacks() {
        let frame = decode_frame(r#"{"type":"error","message":"rate limited"}"#).unwrap();
        assert_eq!(
            frame,
            ServerFrame::Error {
                message: "rate limited".to_string()
            }
        );
        let frame = decode_frame(r#"{"type":"error"}"#).unwrap();
        assert_eq!(
            frame,
            ServerFrame::Error {
                message: "Unknown server error".to_string()
            }
        );
    }

    #[test]
    fn test_decode_processing_error() {
        let frame =
            decode_frame(r#"{"type":"processing_error","agent_id":"hr_bot","error":"timeout"}"#)
                .unwrap();
        assert_eq!(
            frame,
            ServerFrame::ProcessingError {
                agent_id: Some("hr_bot".to_string()),
                message: "timeout".to_string()
            }
        );
    }

    #[test]
    fn test_decode_monitoring_stopped_with_and_without_stats() {
        let frame =
            decode_frame(r#"{"type":"monitoring_stopped","stats":{"total_processed":12}}"#).unwrap();
        let ServerFrame::MonitoringStopped { stats: Some(stats) } = frame else {
            panic!("expected stats");
        };
        assert_eq!(stats.total_processed, Some(12));

        let frame = decode_frame(r#"{"type":"monitoring_stopped"}"#).unwrap();
        assert_eq!(frame, ServerFrame::MonitoringStopped { stats: None });
    }

    #[test]
    fn test_decode_protocol_internal_frames() {
        assert_eq!(
            decode_frame(r#"{"type":"keepalive"}"#).unwrap(),
            ServerFrame::Keepalive
        );
        assert_eq!(
            decode_frame(r#"{"type":"connection_established"}"#).unwrap(),
            ServerFrame::ConnectionEstablished
        );
    }

    // ── Timestamps ────────────────────────────────────────────────────────────

    #[test]
    fn test_parse_timestamp_variants() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(
            parse_timestamp(&Value::from("2024-05-01T12:00:00Z")),
            Some(expected)
        );
        assert_eq!(
            parse_timestamp(&Value::from("2024-05-01T12:00:00.000000")),
            Some(expected)
        );
        assert_eq!(
            parse_timestamp(&Value::from(expected.timestamp())),
            Some(expected)
        );
        assert_eq!(parse_timestamp(&Value::from("yesterday")), None);
        assert_eq!(parse_timestamp(&Value::Null), None);
    }

    #[test]
    fn test_unparseable_timestamp_falls_back_to_now() {
        let before = Utc::now();
        let text = r#"{"type":"detection_result","agent_id":"x","hallucination_risk":0.2,"flagged":false,"timestamp":"soon"}"#;
        let ServerFrame::DetectionResult(event) = decode_frame(text).unwrap() else {
            panic!("expected a detection result");
        };
        assert!(event.timestamp >= before);
    }

    // ── URLs ──────────────────────────────────────────────────────────────────

    #[test]
    fn test_monitor_url_upgrades_scheme() {
        assert_eq!(
            monitor_url("http://localhost:8000").unwrap().as_str(),
            "ws://localhost:8000/ws/monitor"
        );
        assert_eq!(
            monitor_url("https://api.example.com/v1/").unwrap().as_str(),
            "wss://api.example.com/v1/ws/monitor"
        );
        assert_eq!(
            monitor_url("ws://127.0.0.1:9000").unwrap().as_str(),
            "ws://127.0.0.1:9000/ws/monitor"
        );
    }

    #[test]
    fn test_monitor_url_rejects_bad_input() {
        assert!(matches!(
            monitor_url("ftp://example.com"),
            Err(MonitorError::InvalidUrl { .. })
        ));
        assert!(matches!(
            monitor_url("not a url"),
            Err(MonitorError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_control_url() {
        assert_eq!(
            control_url("http://localhost:8000", START_PATH).unwrap().as_str(),
            "http://localhost:8000/monitor/start"
        );
        assert_eq!(
            control_url("wss://api.example.com/", STOP_PATH).unwrap().as_str(),
            "https://api.example.com/monitor/stop"
        );
    }
}
