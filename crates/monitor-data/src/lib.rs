//! Session data layer for the hallucination monitor.
//!
//! Accumulates detection events for the current session and derives the
//! statistics and accuracy figures shown on the dashboard.

pub mod accuracy;
pub mod session_store;

pub use monitor_core as core;
