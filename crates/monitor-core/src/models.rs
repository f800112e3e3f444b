use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Lifecycle state of the streaming connection.
///
/// Exactly one value holds at any time; only the connection manager mutates it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No transport exists and nothing is scheduled.
    #[default]
    Disconnected,
    /// A transport is being opened.
    Connecting,
    /// The transport is open and liveness pings are running.
    Connected,
    /// The transport failed; a retry may be pending or the budget is spent.
    Errored,
}

impl ConnectionState {
    /// Lower-case label used in logs and the dashboard header.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Errored => "errored",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One evaluation of an agent's output reported by the detection backend.
///
/// Built from a `detection_result` frame and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    /// Identifier of the monitored agent.
    pub agent_id: String,
    /// Prompt the agent answered.
    #[serde(default)]
    pub query: String,
    /// Text the agent produced.
    #[serde(default)]
    pub output: String,
    /// Estimated probability that the output is hallucinated, in `[0, 1]`.
    pub hallucination_risk: f64,
    /// Whether the backend's reporting threshold was crossed.
    pub flagged: bool,
    /// Backend confidence in its own verdict, in `[0, 1]`.
    #[serde(default)]
    pub confidence: f64,
    /// Fragments of `output` the backend considers unsupported, in order.
    #[serde(default)]
    pub flagged_segments: Vec<String>,
    /// Suggested correction, when the backend offers one.
    #[serde(default)]
    pub mitigation: Option<String>,
    /// When the backend produced the verdict. Receipt time when absent.
    #[serde(
        default = "Utc::now",
        deserialize_with = "crate::protocol::deserialize_timestamp"
    )]
    pub timestamp: DateTime<Utc>,
    /// Backend processing time for this evaluation.
    #[serde(default)]
    pub processing_time_ms: u64,
    /// Ground-truth label, present only for benchmark traffic.
    #[serde(default, alias = "is_hallucination", alias = "ground_truth_flagged")]
    pub expected_flagged: Option<bool>,
    /// Reference answer, present only for benchmark traffic.
    #[serde(default)]
    pub ground_truth: Option<String>,
}

impl DetectionEvent {
    /// Risk as a percentage in `[0, 100]`.
    pub fn risk_percent(&self) -> f64 {
        self.hallucination_risk * 100.0
    }

    /// The first flagged segment, used as the headline of an alert.
    pub fn primary_segment(&self) -> Option<&str> {
        self.flagged_segments.first().map(String::as_str)
    }

    /// `true` when the event carries a ground-truth label.
    pub fn is_labelled(&self) -> bool {
        self.expected_flagged.is_some()
    }

    /// Clamp the probability fields into `[0, 1]`; NaN becomes `0`.
    pub(crate) fn with_clamped_scores(mut self) -> Self {
        self.hallucination_risk = clamp_unit(self.hallucination_risk);
        self.confidence = clamp_unit(self.confidence);
        self
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Statistics snapshot reported by the backend itself.
///
/// Only the two counters the dashboard shows are typed; everything else the
/// backend sends is kept verbatim in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportedStats {
    #[serde(default, alias = "total_responses", alias = "total")]
    pub total_processed: Option<u64>,
    #[serde(default, alias = "flagged", alias = "hallucinations_detected")]
    pub flagged_count: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ── Control endpoint payloads ─────────────────────────────────────────────────

/// Body of `POST /monitor/start`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartRequest {
    /// Seconds between simulated agent responses.
    pub response_interval: f64,
    /// Random spread applied to `response_interval`, in seconds.
    pub jitter: f64,
}

/// Outcome reported by `POST /monitor/start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartStatus {
    Started,
    AlreadyRunning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartResponse {
    pub status: StartStatus,
}

/// Response of `POST /monitor/stop`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StopResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub stats: Option<ReportedStats>,
}
