//! Shared types for the hallucination monitor.
//!
//! Holds the wire protocol, detection models, connection error taxonomy,
//! reconnect backoff policy, CLI settings and notification permission
//! persistence used by the data, runtime and UI crates.

pub mod error;
pub mod formatting;
pub mod models;
pub mod notifications;
pub mod protocol;
pub mod reconnect;
pub mod settings;
