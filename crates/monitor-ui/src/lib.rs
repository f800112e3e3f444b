//! Terminal UI layer for the hallucination monitor.
//!
//! Provides themes, bars, header and indicator components, the toast stack,
//! the live dashboard, and the application event loop built on top of
//! [`ratatui`].

pub mod app;
pub mod components;
pub mod dashboard;
pub mod themes;
pub mod toasts;

pub use monitor_core as core;
