//! Dispatch of decoded server frames.
//!
//! The router owns the [`SessionStore`] and the [`AlertDispatcher`]. It never
//! touches connection state directly; frames that matter to the connection
//! are reported back to the manager as a [`RouteOutcome`].

use monitor_core::models::ReportedStats;
use monitor_core::protocol::{decode_frame, ServerFrame};
use monitor_data::session_store::SessionStore;

use crate::alerts::AlertDispatcher;

/// What routing one frame did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    Detection { flagged: bool },
    MonitoringStarted,
    MonitoringStopped,
    /// The backend confirmed the session.
    ConnectionEstablished,
    Keepalive,
    ServerError(String),
    ProcessingError { agent_id: Option<String> },
    /// A well-formed frame of a type this client does not handle.
    Ignored(String),
    /// The frame could not be decoded and was discarded.
    Malformed,
}

pub struct MessageRouter {
    store: SessionStore,
    alerts: AlertDispatcher,
    reported_stats: Option<ReportedStats>,
    monitoring_active: bool,
}

impl MessageRouter {
    pub fn new(alerts: AlertDispatcher) -> Self {
        Self {
            store: SessionStore::new(),
            alerts,
            reported_stats: None,
            monitoring_active: false,
        }
    }

    /// Decode and dispatch one inbound text frame.
    pub fn route(&mut self, text: &str) -> RouteOutcome {
        let frame = match decode_frame(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, len = text.len(), "discarding malformed frame");
                return RouteOutcome::Malformed;
            }
        };

        match frame {
            ServerFrame::DetectionResult(event) => {
                let flagged = event.flagged;
                tracing::debug!(
                    agent_id = %event.agent_id,
                    risk = event.hallucination_risk,
                    flagged,
                    "detection received"
                );
                self.store.append(event);
                if let Some(stored) = self.store.events().last() {
                    self.alerts.detection(stored);
                }
                RouteOutcome::Detection { flagged }
            }
            ServerFrame::MonitoringStarted => {
                tracing::info!("backend monitoring started");
                self.monitoring_active = true;
                self.alerts.monitoring_status(true);
                RouteOutcome::MonitoringStarted
            }
            ServerFrame::MonitoringStopped { stats } => {
                tracing::info!(has_stats = stats.is_some(), "backend monitoring stopped");
                self.monitoring_active = false;
                if let Some(stats) = stats {
                    self.reported_stats = Some(stats);
                }
                self.alerts.monitoring_status(false);
                RouteOutcome::MonitoringStopped
            }
            ServerFrame::ConnectionEstablished => {
                tracing::debug!("backend acknowledged connection");
                RouteOutcome::ConnectionEstablished
            }
            ServerFrame::Keepalive => RouteOutcome::Keepalive,
            ServerFrame::Error { message } => {
                tracing::warn!(%message, "backend reported an error");
                self.alerts.server_error(&message);
                RouteOutcome::ServerError(message)
            }
            ServerFrame::ProcessingError { agent_id, message } => {
                tracing::warn!(agent_id = ?agent_id, %message, "backend failed to evaluate a response");
                self.alerts.processing_error(agent_id.as_deref(), &message);
                RouteOutcome::ProcessingError { agent_id }
            }
            ServerFrame::Unknown { kind } => {
                tracing::debug!(%kind, "ignoring unknown frame type");
                RouteOutcome::Ignored(kind)
            }
        }
    }

    /// Start a new session. The connection is not affected.
    pub fn clear_session(&mut self) {
        self.store.clear();
        self.reported_stats = None;
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Last stats the backend reported in a `monitoring_stopped` frame.
    pub fn reported_stats(&self) -> Option<&ReportedStats> {
        self.reported_stats.as_ref()
    }

    /// Whether the backend's response generator is believed to be running.
    pub fn monitoring_active(&self) -> bool {
        self.monitoring_active
    }

    pub fn alerts(&self) -> &AlertDispatcher {
        &self.alerts
    }
}
