use thiserror::Error;

/// All errors produced by the hallucination monitor.
#[derive(Error, Debug)]
pub enum MonitorError {
    /// The configured API base could not be turned into an endpoint URL.
    #[error("Invalid API base URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// A JSON document could not be parsed.
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// The streaming transport failed to open, send, or stay connected.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A request to one of the backend control endpoints failed.
    #[error("Control request failed: {0}")]
    Control(String),

    /// An alert surface (toast, sound, OS notification) could not deliver.
    #[error("Alert delivery failed: {0}")]
    Alert(String),

    /// An error originating from the terminal / TUI layer.
    #[error("Terminal error: {0}")]
    Terminal(String),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The background monitor task has exited and no longer accepts commands.
    #[error("Monitor task is no longer running")]
    ChannelClosed,

    /// Pass-through for any raw I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Catch-all for errors from third-party crates via `anyhow`.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Convenience alias used throughout the monitor crates.
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Error value carried by the connection state machine.
///
/// Unlike [`MonitorError`] this is state, not a propagated failure: it is
/// surfaced in snapshots and cleared on the next successful transition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Transport-level open, close, or I/O failure.
    #[error("Network error: {0}")]
    Network(String),

    /// A frame could not be decoded. Never escalates to connection state.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The backend reported an error over the stream.
    #[error("Server error: {0}")]
    Server(String),

    /// Every reconnect attempt was used; only an explicit `connect()` resumes.
    #[error("Reconnect attempts exhausted after {attempts} tries")]
    ReconnectExhausted { attempts: u32 },
}

impl ConnectionError {
    /// `true` for the terminal error that requires manual intervention.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionError::ReconnectExhausted { .. })
    }
}
