//! Connection lifecycle state machine.
//!
//! [`ConnectionMachine`] is a pure transition function: it consumes
//! [`ConnectionEvent`]s and returns the [`Effect`]s the async driver in
//! [`crate::manager`] must perform. It never touches a socket or a timer
//! itself, which keeps every transition testable without a transport.
//!
//! ```text
//! Disconnected --Connect--> Connecting --Opened--> Connected
//!      ^                        |                      |
//!      |  Closed(1000)          | failure              | Closed(!=1000) / error
//!      +------------------------+----------------------+
//!                               v
//!                            Errored --RetryElapsed--> Connecting
//!                               |
//!                               +-- budget spent: Errored(ReconnectExhausted)
//! ```
//!
//! `Disconnect` leads to `Disconnected` from every state.

use std::time::Duration;

use monitor_core::error::ConnectionError;
use monitor_core::models::ConnectionState;
use monitor_core::protocol::{ClientFrame, NORMAL_CLOSURE};
use monitor_core::reconnect::ReconnectPolicy;

// ── Events and effects ────────────────────────────────────────────────────────

/// Input to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Caller asked to connect.
    Connect,
    /// Caller asked to disconnect.
    Disconnect,
    /// The transport finished opening.
    Opened,
    /// A text frame arrived on the open transport.
    FrameReceived(String),
    /// The transport closed, with the close code when the peer sent one.
    Closed { code: Option<u16> },
    /// Opening, reading or writing the transport failed.
    TransportError(String),
    /// The scheduled retry delay has passed.
    RetryElapsed,
    /// The liveness interval ticked.
    PingDue,
    /// The backend confirmed the session (`connection_established`).
    ServerAcknowledged,
    /// The backend reported an error over the stream.
    ServerError(String),
}

/// Work the driver must perform after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Begin opening a new transport.
    Open,
    /// Close the live or in-flight transport.
    Close,
    /// Send a frame over the open transport.
    Send(ClientFrame),
    /// Start the liveness interval.
    StartPing,
    /// Stop the liveness interval.
    StopPing,
    /// Arm the retry timer.
    ScheduleRetry { attempt: u32, delay: Duration },
    /// Disarm the retry timer.
    CancelRetry,
    /// Hand an inbound frame to the message router.
    Route(String),
}

/// Read-only view of the machine for observers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionSnapshot {
    pub state: ConnectionState,
    pub error: Option<ConnectionError>,
    /// Retries scheduled since the last successful open.
    pub attempts: u32,
    pub max_attempts: u32,
    /// Delay of the pending retry, if one is armed.
    pub retry_in: Option<Duration>,
}

// ── ConnectionMachine ─────────────────────────────────────────────────────────

/// Owns [`ConnectionState`], the attempt counter and the current error.
#[derive(Debug, Clone)]
pub struct ConnectionMachine {
    state: ConnectionState,
    attempts: u32,
    error: Option<ConnectionError>,
    policy: ReconnectPolicy,
    /// An open is in flight.
    opening: bool,
    /// The transport is open.
    open: bool,
    ping_running: bool,
    pending_retry: Option<Duration>,
}

impl ConnectionMachine {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            attempts: 0,
            error: None,
            policy,
            opening: false,
            open: false,
            ping_running: false,
            pending_retry: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn error(&self) -> Option<&ConnectionError> {
        self.error.as_ref()
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    pub fn is_retry_pending(&self) -> bool {
        self.pending_retry.is_some()
    }

    pub fn is_ping_running(&self) -> bool {
        self.ping_running
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot {
            state: self.state,
            error: self.error.clone(),
            attempts: self.attempts,
            max_attempts: self.policy.max_attempts,
            retry_in: self.pending_retry,
        }
    }

    /// Apply `event` and return the effects to perform, in order.
    pub fn handle(&mut self, event: ConnectionEvent) -> Vec<Effect> {
        match event {
            ConnectionEvent::Connect => self.on_connect(),
            ConnectionEvent::Disconnect => self.on_disconnect(),
            ConnectionEvent::Opened => self.on_opened(),
            ConnectionEvent::FrameReceived(text) => {
                if self.open {
                    vec![Effect::Route(text)]
                } else {
                    tracing::debug!("dropping frame received without an open transport");
                    Vec::new()
                }
            }
            ConnectionEvent::Closed { code } => self.on_closed(code),
            ConnectionEvent::TransportError(message) => self.on_transport_error(message),
            ConnectionEvent::RetryElapsed => self.on_retry_elapsed(),
            ConnectionEvent::PingDue => {
                if self.open && self.ping_running {
                    vec![Effect::Send(ClientFrame::Ping)]
                } else {
                    Vec::new()
                }
            }
            ConnectionEvent::ServerAcknowledged => {
                if self.open {
                    self.attempts = 0;
                    self.error = None;
                }
                Vec::new()
            }
            ConnectionEvent::ServerError(message) => {
                self.error = Some(ConnectionError::Server(message));
                Vec::new()
            }
        }
    }

    // ── Transitions ──────────────────────────────────────────────────────────

    fn on_connect(&mut self) -> Vec<Effect> {
        if self.open || self.opening {
            tracing::debug!(state = %self.state, "connect ignored; transport already active");
            return Vec::new();
        }
        let mut effects = Vec::new();
        if self.pending_retry.take().is_some() {
            effects.push(Effect::CancelRetry);
        }
        self.attempts = 0;
        self.error = None;
        self.begin_open(&mut effects);
        effects
    }

    fn on_disconnect(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.pending_retry.take().is_some() {
            effects.push(Effect::CancelRetry);
        }
        if self.ping_running {
            self.ping_running = false;
            effects.push(Effect::StopPing);
        }
        if self.open || self.opening {
            self.open = false;
            self.opening = false;
            effects.push(Effect::Close);
        }
        self.attempts = 0;
        self.error = None;
        self.set_state(ConnectionState::Disconnected);
        effects
    }

    fn on_opened(&mut self) -> Vec<Effect> {
        if !self.opening {
            tracing::debug!("ignoring open of a transport that is no longer wanted");
            return vec![Effect::Close];
        }
        self.opening = false;
        self.open = true;
        self.attempts = 0;
        self.error = None;
        self.ping_running = true;
        self.set_state(ConnectionState::Connected);
        vec![Effect::Send(ClientFrame::Ping), Effect::StartPing]
    }

    fn on_closed(&mut self, code: Option<u16>) -> Vec<Effect> {
        if !self.open && !self.opening {
            tracing::debug!(?code, "ignoring close of an inactive transport");
            return Vec::new();
        }
        self.open = false;
        self.opening = false;
        let mut effects = Vec::new();
        self.stop_ping(&mut effects);

        if code == Some(NORMAL_CLOSURE) {
            self.attempts = 0;
            self.error = None;
            self.set_state(ConnectionState::Disconnected);
            return effects;
        }

        let reason = match code {
            Some(code) => format!("connection closed with code {code}"),
            None => "connection closed without a close frame".to_string(),
        };
        self.fail(ConnectionError::Network(reason), &mut effects);
        effects
    }

    fn on_transport_error(&mut self, message: String) -> Vec<Effect> {
        if !self.open && !self.opening {
            tracing::debug!(error = %message, "ignoring error of an inactive transport");
            return Vec::new();
        }
        self.open = false;
        self.opening = false;
        let mut effects = Vec::new();
        self.stop_ping(&mut effects);
        effects.push(Effect::Close);
        self.fail(ConnectionError::Network(message), &mut effects);
        effects
    }

    fn on_retry_elapsed(&mut self) -> Vec<Effect> {
        if self.pending_retry.take().is_none() {
            return Vec::new();
        }
        let mut effects = Vec::new();
        self.begin_open(&mut effects);
        effects
    }

    // ── Helpers ──────────────────────────────────────────────────────────────

    fn begin_open(&mut self, effects: &mut Vec<Effect>) {
        self.opening = true;
        self.set_state(ConnectionState::Connecting);
        effects.push(Effect::Open);
    }

    fn stop_ping(&mut self, effects: &mut Vec<Effect>) {
        if self.ping_running {
            self.ping_running = false;
            effects.push(Effect::StopPing);
        }
    }

    /// Enter `Errored` and schedule the next retry if the budget allows.
    fn fail(&mut self, error: ConnectionError, effects: &mut Vec<Effect>) {
        self.set_state(ConnectionState::Errored);
        let attempt = self.attempts.saturating_add(1);
        match self.policy.delay_for_attempt(attempt) {
            Some(delay) => {
                tracing::warn!(
                    error = %error,
                    attempt,
                    max_attempts = self.policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "connection lost; scheduling reconnect"
                );
                self.attempts = attempt;
                self.error = Some(error);
                self.pending_retry = Some(delay);
                effects.push(Effect::ScheduleRetry { attempt, delay });
            }
            None => {
                tracing::error!(
                    error = %error,
                    attempts = self.attempts,
                    "reconnect attempts exhausted"
                );
                self.error = Some(ConnectionError::ReconnectExhausted {
                    attempts: self.attempts,
                });
            }
        }
    }

    fn set_state(&mut self, next: ConnectionState) {
        if self.state != next {
            tracing::info!(from = %self.state, to = %next, "connection state changed");
            self.state = next;
        }
    }
}
