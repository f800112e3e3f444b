//! In-memory store of the detection events of one monitoring session.
//!
//! The store is append-only: events are never edited or dropped until the
//! caller explicitly calls [`SessionStore::clear`]. Reconnecting the stream
//! does not start a new session. Every aggregate is maintained incrementally
//! on append, so [`SessionStore::stats`] does no per-event work beyond
//! copying the per-agent table.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use monitor_core::models::DetectionEvent;

use crate::accuracy::AccuracyReport;

// ── AgentStats ────────────────────────────────────────────────────────────────

/// Running totals for a single agent.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentStats {
    pub agent_id: String,
    pub total: u64,
    pub flagged: u64,
    /// Highest risk seen for this agent.
    pub max_risk: f64,
    /// Receipt time of the agent's latest event.
    pub last_seen: DateTime<Utc>,
    risk_sum: f64,
}

impl AgentStats {
    fn new(agent_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            total: 0,
            flagged: 0,
            max_risk: 0.0,
            last_seen: now,
            risk_sum: 0.0,
        }
    }

    fn add(&mut self, event: &DetectionEvent, now: DateTime<Utc>) {
        self.total += 1;
        if event.flagged {
            self.flagged += 1;
        }
        self.risk_sum += event.hallucination_risk;
        self.max_risk = self.max_risk.max(event.hallucination_risk);
        self.last_seen = now;
    }

    pub fn average_risk(&self) -> f64 {
        mean(self.risk_sum, self.total)
    }

    /// Fraction of this agent's events that were flagged.
    pub fn flagged_rate(&self) -> f64 {
        mean(self.flagged as f64, self.total)
    }
}

// ── SessionStats ──────────────────────────────────────────────────────────────

/// Derived statistics of the current session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionStats {
    pub total: u64,
    pub flagged: u64,
    /// `flagged / total`, `0` for an empty session.
    pub flagged_rate: f64,
    pub average_risk: f64,
    pub average_processing_ms: f64,
    /// Time since the first event of the session was received.
    pub duration: Duration,
    pub events_per_minute: f64,
    /// Receipt time of the first event, `None` while empty.
    pub started_at: Option<DateTime<Utc>>,
    /// One row per agent, ordered by agent id.
    pub per_agent: Vec<AgentStats>,
}

impl SessionStats {
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

// ── SessionStore ──────────────────────────────────────────────────────────────

/// Ordered, append-only collection of [`DetectionEvent`]s.
#[derive(Debug, Default)]
pub struct SessionStore {
    events: Vec<DetectionEvent>,
    flagged: u64,
    risk_sum: f64,
    processing_ms_sum: u64,
    started_at: Option<DateTime<Utc>>,
    agents: BTreeMap<String, AgentStats>,
    accuracy: AccuracyReport,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `event`, stamping its receipt at the current time.
    pub fn append(&mut self, event: DetectionEvent) {
        self.append_at(event, Utc::now());
    }

    /// Append `event` as received at `now`.
    pub fn append_at(&mut self, event: DetectionEvent, now: DateTime<Utc>) {
        if event.flagged {
            self.flagged += 1;
        }
        self.risk_sum += event.hallucination_risk;
        self.processing_ms_sum = self
            .processing_ms_sum
            .saturating_add(event.processing_time_ms);
        self.started_at.get_or_insert(now);
        self.agents
            .entry(event.agent_id.clone())
            .or_insert_with(|| AgentStats::new(&event.agent_id, now))
            .add(&event, now);
        self.accuracy.record(&event);
        self.events.push(event);
    }

    /// Drop every event and reset all aggregates. Starts a new session.
    pub fn clear(&mut self) {
        let dropped = self.events.len();
        *self = Self::default();
        tracing::info!(dropped, "session cleared");
    }

    /// All events, oldest first.
    pub fn events(&self) -> &[DetectionEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// The last `n` events, oldest first.
    pub fn recent(&self, n: usize) -> &[DetectionEvent] {
        let start = self.events.len().saturating_sub(n);
        &self.events[start..]
    }

    /// The last `n` flagged events, oldest first.
    pub fn recent_flagged(&self, n: usize) -> Vec<&DetectionEvent> {
        let mut flagged: Vec<&DetectionEvent> = self
            .events
            .iter()
            .rev()
            .filter(|e| e.flagged)
            .take(n)
            .collect();
        flagged.reverse();
        flagged
    }

    /// Running totals for `agent_id`, if it has reported anything.
    pub fn agent(&self, agent_id: &str) -> Option<&AgentStats> {
        self.agents.get(agent_id)
    }

    /// Accuracy over labelled events, `None` when nothing is labelled.
    pub fn accuracy(&self) -> Option<AccuracyReport> {
        (self.accuracy.labelled() > 0).then_some(self.accuracy)
    }

    /// Session statistics as of now.
    pub fn stats(&self) -> SessionStats {
        self.stats_at(Utc::now())
    }

    /// Session statistics as of `now`.
    pub fn stats_at(&self, now: DateTime<Utc>) -> SessionStats {
        let total = self.events.len() as u64;
        let duration = self
            .started_at
            .and_then(|start| (now - start).to_std().ok())
            .unwrap_or_default();
        let minutes = duration.as_secs_f64() / 60.0;
        let events_per_minute = if minutes > 0.0 {
            total as f64 / minutes
        } else {
            0.0
        };

        SessionStats {
            total,
            flagged: self.flagged,
            flagged_rate: mean(self.flagged as f64, total),
            average_risk: mean(self.risk_sum, total),
            average_processing_ms: mean(self.processing_ms_sum as f64, total),
            duration,
            events_per_minute,
            started_at: self.started_at,
            per_agent: self.agents.values().cloned().collect(),
        }
    }
}

fn mean(sum: f64, count: u64) -> f64 {
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}
