//! Reusable line-level widgets for the dashboard.

pub mod header;
pub mod indicators;
pub mod progress_bar;
