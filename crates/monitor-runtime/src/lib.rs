//! Runtime layer for the hallucination monitor.
//!
//! Owns the streaming connection: the lifecycle state machine and its async
//! driver, the transport, frame routing, alert fan-out, and the control
//! endpoint client.

pub mod alerts;
pub mod connection;
pub mod control;
pub mod manager;
pub mod platform;
pub mod router;
pub mod transport;

pub use monitor_core as core;
pub use monitor_data as data;
