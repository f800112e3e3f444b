//! In-app toast stack.
//!
//! [`ChannelToasts`] is the [`ToastSurface`] handed to the alert dispatcher;
//! it forwards toasts to the UI task, which keeps them in a [`ToastQueue`]
//! until they expire.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use monitor_core::error::MonitorError;
use monitor_runtime::alerts::{Toast, ToastSurface};

/// Most toasts stacked on screen at once. The oldest timed toast is dropped
/// first.
pub const MAX_TOASTS: usize = 4;

// ── ChannelToasts ─────────────────────────────────────────────────────────────

/// Sends toasts to the UI over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelToasts {
    tx: mpsc::UnboundedSender<Toast>,
}

impl ChannelToasts {
    pub fn new(tx: mpsc::UnboundedSender<Toast>) -> Self {
        Self { tx }
    }

    /// A surface plus the receiver the UI drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Toast>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl ToastSurface for ChannelToasts {
    fn show(&self, toast: Toast) -> Result<(), MonitorError> {
        self.tx.send(toast).map_err(|_| MonitorError::ChannelClosed)
    }
}

// ── ToastQueue ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Entry {
    toast: Toast,
    expires_at: Option<Instant>,
}

/// Toasts currently on screen, oldest first.
#[derive(Debug, Default)]
pub struct ToastQueue {
    entries: VecDeque<Entry>,
}

impl ToastQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, toast: Toast, now: Instant) {
        let expires_at = toast.duration.map(|d| now + d);
        self.entries.push_back(Entry { toast, expires_at });
        while self.entries.len() > MAX_TOASTS {
            // Persistent toasts wait for the user; timed ones go first.
            match self.entries.iter().position(|e| e.expires_at.is_some()) {
                Some(index) => self.entries.remove(index),
                None => self.entries.pop_front(),
            };
        }
    }

    /// Drop every toast whose duration has run out.
    pub fn prune(&mut self, now: Instant) {
        self.entries
            .retain(|e| e.expires_at.map_or(true, |deadline| deadline > now));
    }

    /// Remove persistent toasts; timed ones expire on their own.
    pub fn dismiss_persistent(&mut self) {
        self.entries.retain(|e| e.expires_at.is_some());
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Newest first, the order they are stacked on screen.
    pub fn visible(&self) -> impl Iterator<Item = &Toast> {
        self.entries.iter().rev().map(|e| &e.toast)
    }

    /// Time left before the toast at `index` (in [`visible`](Self::visible)
    /// order) expires.
    pub fn remaining(&self, index: usize, now: Instant) -> Option<Duration> {
        let entry = self.entries.iter().rev().nth(index)?;
        entry
            .expires_at
            .map(|deadline| deadline.saturating_duration_since(now))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use monitor_runtime::alerts::ToastLevel;

    fn toast(title: &str, duration: Option<Duration>) -> Toast {
        Toast {
            level: ToastLevel::Info,
            title: title.to_string(),
            message: String::new(),
            duration,
        }
    }

    // ── ToastQueue ────────────────────────────────────────────────────────────

    #[test]
    fn test_push_and_visible_newest_first() {
        let now = Instant::now();
        let mut queue = ToastQueue::new();
        queue.push(toast("first", Some(Duration::from_secs(2))), now);
        queue.push(toast("second", Some(Duration::from_secs(2))), now);
        let titles: Vec<&str> = queue.visible().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["second", "first"]);
    }

    #[test]
    fn test_prune_drops_expired_only() {
        let now = Instant::now();
        let mut queue = ToastQueue::new();
        queue.push(toast("clean", Some(Duration::from_secs(2))), now);
        queue.push(toast("flagged", Some(Duration::from_secs(6))), now);
        queue.push(toast("gave up", None), now);

        queue.prune(now + Duration::from_secs(3));
        let titles: Vec<&str> = queue.visible().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["gave up", "flagged"]);

        queue.prune(now + Duration::from_secs(3600));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_prune_at_exact_deadline_removes() {
        let now = Instant::now();
        let mut queue = ToastQueue::new();
        queue.push(toast("clean", Some(Duration::from_secs(2))), now);
        queue.prune(now + Duration::from_secs(2));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let now = Instant::now();
        let mut queue = ToastQueue::new();
        for i in 0..(MAX_TOASTS + 2) {
            queue.push(toast(&format!("t{i}"), None), now);
        }
        assert_eq!(queue.len(), MAX_TOASTS);
        assert_eq!(queue.visible().last().unwrap().title, "t2");
    }

    #[test]
    fn test_capacity_keeps_persistent_toast() {
        let now = Instant::now();
        let mut queue = ToastQueue::new();
        queue.push(toast("gave up", None), now);
        for i in 0..(MAX_TOASTS + 3) {
            queue.push(toast(&format!("t{i}"), Some(Duration::from_secs(2))), now);
        }
        assert_eq!(queue.len(), MAX_TOASTS);
        let titles: Vec<&str> = queue.visible().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["t6", "t5", "t4", "gave up"]);
    }

    #[test]
    fn test_dismiss_persistent() {
        let now = Instant::now();
        let mut queue = ToastQueue::new();
        queue.push(toast("gave up", None), now);
        queue.push(toast("status", Some(Duration::from_secs(3))), now);
        queue.dismiss_persistent();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.visible().next().unwrap().title, "status");
    }

    #[test]
    fn test_remaining() {
        let now = Instant::now();
        let mut queue = ToastQueue::new();
        queue.push(toast("gave up", None), now);
        queue.push(toast("status", Some(Duration::from_secs(3))), now);
        assert_eq!(
            queue.remaining(0, now + Duration::from_secs(1)),
            Some(Duration::from_secs(2))
        );
        assert_eq!(queue.remaining(1, now), None);
        assert_eq!(queue.remaining(5, now), None);
    }

    // ── ChannelToasts ─────────────────────────────────────────────────────────

    #[test]
    fn test_channel_toasts_forward() {
        let (surface, mut rx) = ChannelToasts::channel();
        surface.show(toast("hello", None)).unwrap();
        assert_eq!(rx.try_recv().unwrap().title, "hello");
    }

    #[test]
    fn test_channel_toasts_closed_is_error() {
        let (surface, rx) = ChannelToasts::channel();
        drop(rx);
        assert!(matches!(
            surface.show(toast("lost", None)),
            Err(MonitorError::ChannelClosed)
        ));
    }
}
