//! Async driver of the connection state machine.
//!
//! [`ConnectionManager::spawn`] moves the [`ConnectionMachine`], the
//! [`MessageRouter`] and the transport into a single tokio task. Everything
//! that task does happens sequentially: frames are routed in arrival order
//! and effects are executed before the next event is taken. The liveness
//! interval and the retry timer are locals of the task's `select!` loop, so
//! dropping them is enough to guarantee they never fire again.
//!
//! Callers talk to the task through a [`MonitorHandle`]: commands go over an
//! `mpsc` channel and state comes back as [`MonitorSnapshot`]s on a `watch`
//! channel.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{self, Instant, Interval, MissedTickBehavior, Sleep};
use url::Url;

use monitor_core::error::{MonitorError, Result};
use monitor_core::models::{DetectionEvent, ReportedStats};
use monitor_core::reconnect::ReconnectPolicy;
use monitor_data::accuracy::AccuracyReport;
use monitor_data::session_store::SessionStats;

use crate::connection::{ConnectionEvent, ConnectionMachine, ConnectionSnapshot, Effect};
use crate::router::{MessageRouter, RouteOutcome};
use crate::transport::{Connector, TransportEvent, TransportLink};

/// Default interval between liveness pings.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(30);

// ── Public types ──────────────────────────────────────────────────────────────

/// Static configuration of the manager.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Streaming endpoint, e.g. `ws://localhost:8000/ws/monitor`.
    pub url: Url,
    pub policy: ReconnectPolicy,
    pub ping_interval: Duration,
    /// Fail the connection after this long without inbound traffic.
    pub liveness_timeout: Option<Duration>,
    /// Number of recent events carried in each snapshot.
    pub recent_window: usize,
}

impl ManagerConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            policy: ReconnectPolicy::default(),
            ping_interval: DEFAULT_PING_INTERVAL,
            liveness_timeout: None,
            recent_window: 20,
        }
    }
}

/// Everything an observer needs to render the monitor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonitorSnapshot {
    pub connection: ConnectionSnapshot,
    pub stats: SessionStats,
    /// Most recent events, oldest first.
    pub recent: Vec<DetectionEvent>,
    pub reported_stats: Option<ReportedStats>,
    pub accuracy: Option<AccuracyReport>,
    /// Whether the backend's response generator is running.
    pub monitoring_active: bool,
}

enum Command {
    Connect,
    Disconnect(oneshot::Sender<()>),
    ClearSession,
    Events(oneshot::Sender<Vec<DetectionEvent>>),
    Shutdown(oneshot::Sender<()>),
}

// ── MonitorHandle ─────────────────────────────────────────────────────────────

/// Cloneable handle to a running manager task.
#[derive(Clone)]
pub struct MonitorHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<MonitorSnapshot>,
}

impl MonitorHandle {
    /// Request a connection. A no-op when already connected or connecting.
    pub fn connect(&self) -> Result<()> {
        self.send(Command::Connect)
    }

    /// Tear the connection down. Returns once no retry or ping can fire.
    pub async fn disconnect(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Disconnect(tx))?;
        rx.await.map_err(|_| MonitorError::ChannelClosed)
    }

    /// Drop every event of the current session.
    pub fn clear_session(&self) -> Result<()> {
        self.send(Command::ClearSession)
    }

    /// Every event of the current session, oldest first.
    pub async fn events(&self) -> Result<Vec<DetectionEvent>> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Events(tx))?;
        rx.await.map_err(|_| MonitorError::ChannelClosed)
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> MonitorSnapshot {
        self.snapshots.borrow().clone()
    }

    /// A receiver notified on every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<MonitorSnapshot> {
        self.snapshots.clone()
    }

    /// Disconnect and stop the manager task.
    pub async fn shutdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Shutdown(tx))?;
        rx.await.map_err(|_| MonitorError::ChannelClosed)
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| MonitorError::ChannelClosed)
    }
}

// ── ConnectionManager ─────────────────────────────────────────────────────────

type OpenFuture = Pin<Box<dyn Future<Output = Result<TransportLink>> + Send>>;

/// Owner of the connection lifecycle.
pub struct ConnectionManager {
    config: ManagerConfig,
    connector: Arc<dyn Connector>,
    machine: ConnectionMachine,
    router: MessageRouter,
    link: Option<TransportLink>,
    opening: Option<OpenFuture>,
    ping: Option<Interval>,
    retry: Option<Pin<Box<Sleep>>>,
    last_inbound: Instant,
    snapshots: Option<watch::Sender<MonitorSnapshot>>,
}

impl ConnectionManager {
    pub fn new(config: ManagerConfig, connector: Arc<dyn Connector>, router: MessageRouter) -> Self {
        Self {
            machine: ConnectionMachine::new(config.policy),
            config,
            connector,
            router,
            link: None,
            opening: None,
            ping: None,
            retry: None,
            last_inbound: Instant::now(),
            snapshots: None,
        }
    }

    /// Start the manager task. Nothing connects until [`MonitorHandle::connect`].
    pub fn spawn(mut self) -> MonitorHandle {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (snap_tx, snap_rx) = watch::channel(self.snapshot());
        self.snapshots = Some(snap_tx);

        tokio::spawn(async move {
            self.run(cmd_rx).await;
        });

        MonitorHandle {
            commands: cmd_tx,
            snapshots: snap_rx,
        }
    }

    // ── Event loop ───────────────────────────────────────────────────────────

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        tracing::debug!(url = %self.config.url, "connection manager started");
        loop {
            tokio::select! {
                biased;

                command = commands.recv() => {
                    let Some(command) = command else {
                        // Every handle is gone.
                        self.apply(ConnectionEvent::Disconnect);
                        break;
                    };
                    if !self.on_command(command) {
                        break;
                    }
                }

                result = wait_open(&mut self.opening) => {
                    self.opening = None;
                    match result {
                        Ok(link) => {
                            self.link = Some(link);
                            self.apply(ConnectionEvent::Opened);
                        }
                        Err(e) => self.apply(ConnectionEvent::TransportError(e.to_string())),
                    }
                }

                event = recv_link(&mut self.link) => {
                    let event = match event {
                        Some(TransportEvent::Frame(text)) => {
                            self.last_inbound = Instant::now();
                            ConnectionEvent::FrameReceived(text)
                        }
                        Some(TransportEvent::Closed(code)) => ConnectionEvent::Closed { code },
                        Some(TransportEvent::Error(message)) => ConnectionEvent::TransportError(message),
                        None => ConnectionEvent::TransportError("transport reader stopped".to_string()),
                    };
                    if !matches!(event, ConnectionEvent::FrameReceived(_)) {
                        // Nothing more arrives on a link whose reader has finished.
                        self.link = None;
                    }
                    self.apply(event);
                }

                _ = tick_opt(&mut self.ping) => self.on_ping_tick(),

                _ = sleep_opt(&mut self.retry) => {
                    self.retry = None;
                    self.apply(ConnectionEvent::RetryElapsed);
                }
            }
        }
        tracing::debug!("connection manager stopped");
    }

    /// Returns `false` when the task should stop.
    fn on_command(&mut self, command: Command) -> bool {
        match command {
            Command::Connect => self.apply(ConnectionEvent::Connect),
            Command::Disconnect(ack) => {
                self.apply(ConnectionEvent::Disconnect);
                let _ = ack.send(());
            }
            Command::ClearSession => {
                self.router.clear_session();
                self.publish();
            }
            Command::Events(reply) => {
                let _ = reply.send(self.router.store().events().to_vec());
            }
            Command::Shutdown(ack) => {
                self.apply(ConnectionEvent::Disconnect);
                let _ = ack.send(());
                return false;
            }
        }
        true
    }

    fn on_ping_tick(&mut self) {
        if let Some(timeout) = self.config.liveness_timeout {
            let silent = self.last_inbound.elapsed();
            if silent > timeout {
                tracing::warn!(
                    silent_secs = silent.as_secs(),
                    timeout_secs = timeout.as_secs(),
                    "no inbound traffic; treating connection as dead"
                );
                self.apply(ConnectionEvent::TransportError(format!(
                    "no traffic for {}s",
                    silent.as_secs()
                )));
                return;
            }
        }
        self.apply(ConnectionEvent::PingDue);
    }

    // ── Effects ──────────────────────────────────────────────────────────────

    /// Feed `event` and any follow-up events through the machine, then publish.
    fn apply(&mut self, event: ConnectionEvent) {
        let mut queue = VecDeque::from([event]);
        while let Some(event) = queue.pop_front() {
            let before = self.machine.state();
            for effect in self.machine.handle(event) {
                if let Some(follow_up) = self.execute(effect) {
                    queue.push_back(follow_up);
                }
            }
            if self.machine.state() != before {
                self.router
                    .alerts()
                    .connection_changed(&self.machine.snapshot());
            }
        }
        self.publish();
    }

    fn execute(&mut self, effect: Effect) -> Option<ConnectionEvent> {
        match effect {
            Effect::Open => {
                self.link = None;
                let connector = Arc::clone(&self.connector);
                let url = self.config.url.clone();
                self.opening = Some(Box::pin(async move { connector.connect(&url).await }));
                None
            }
            Effect::Close => {
                self.opening = None;
                if let Some(link) = self.link.take() {
                    link.close();
                }
                None
            }
            Effect::Send(frame) => {
                let text = match frame.to_json() {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::error!(error = %e, "failed to encode client frame");
                        return None;
                    }
                };
                let link = self.link.as_ref()?;
                match link.send(text) {
                    Ok(()) => None,
                    Err(e) => Some(ConnectionEvent::TransportError(e.to_string())),
                }
            }
            Effect::StartPing => {
                let period = self.config.ping_interval;
                let mut interval = time::interval_at(Instant::now() + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                self.ping = Some(interval);
                self.last_inbound = Instant::now();
                None
            }
            Effect::StopPing => {
                self.ping = None;
                None
            }
            Effect::ScheduleRetry { attempt, delay } => {
                tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "retry armed");
                self.retry = Some(Box::pin(time::sleep(delay)));
                None
            }
            Effect::CancelRetry => {
                self.retry = None;
                None
            }
            Effect::Route(text) => match self.router.route(&text) {
                RouteOutcome::ConnectionEstablished => Some(ConnectionEvent::ServerAcknowledged),
                RouteOutcome::ServerError(message) => Some(ConnectionEvent::ServerError(message)),
                _ => None,
            },
        }
    }

    // ── Snapshots ────────────────────────────────────────────────────────────

    fn snapshot(&self) -> MonitorSnapshot {
        let store = self.router.store();
        MonitorSnapshot {
            connection: self.machine.snapshot(),
            stats: store.stats(),
            recent: store.recent(self.config.recent_window).to_vec(),
            reported_stats: self.router.reported_stats().cloned(),
            accuracy: store.accuracy(),
            monitoring_active: self.router.monitoring_active(),
        }
    }

    fn publish(&self) {
        if let Some(tx) = &self.snapshots {
            tx.send_replace(self.snapshot());
        }
    }
}

// ── select! helpers ───────────────────────────────────────────────────────────

async fn wait_open(opening: &mut Option<OpenFuture>) -> Result<TransportLink> {
    match opening {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

async fn recv_link(link: &mut Option<TransportLink>) -> Option<TransportEvent> {
    match link {
        Some(link) => link.recv().await,
        None => std::future::pending().await,
    }
}

async fn tick_opt(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn sleep_opt(sleep: &mut Option<Pin<Box<Sleep>>>) {
    match sleep {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::alerts::recording::RecordingToasts;
    use crate::alerts::{AlertDispatcher, ToastLevel};
    use crate::transport::{OutboundFrame, TransportPeer};
    use monitor_core::error::ConnectionError;
    use monitor_core::models::ConnectionState;

    // ── helpers ───────────────────────────────────────────────────────────────

    const PING: &str = r#"{"type":"ping"}"#;

    /// Hands each opened link's peer end to the test.
    struct FakeConnector {
        peers: mpsc::UnboundedSender<TransportPeer>,
        fail: Arc<AtomicBool>,
        opens: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Connector for FakeConnector {
        async fn connect(&self, _url: &Url) -> Result<TransportLink> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(MonitorError::Transport("connection refused".to_string()));
            }
            let (link, peer) = TransportLink::channel();
            let _ = self.peers.send(peer);
            Ok(link)
        }
    }

    struct Harness {
        handle: MonitorHandle,
        peers: mpsc::UnboundedReceiver<TransportPeer>,
        fail: Arc<AtomicBool>,
        opens: Arc<AtomicU32>,
        toasts: Arc<RecordingToasts>,
    }

    impl Harness {
        fn opens(&self) -> u32 {
            self.opens.load(Ordering::SeqCst)
        }

        async fn wait_state(&self, state: ConnectionState) -> MonitorSnapshot {
            let mut rx = self.handle.subscribe();
            let snapshot = rx
                .wait_for(|s| s.connection.state == state)
                .await
                .expect("manager alive");
            snapshot.clone()
        }

        /// Connect and return the peer of the opened link, initial ping consumed.
        async fn connect(&mut self) -> TransportPeer {
            self.handle.connect().unwrap();
            let mut peer = self.peers.recv().await.expect("link opened");
            self.wait_state(ConnectionState::Connected).await;
            assert_eq!(
                peer.outbound.recv().await,
                Some(OutboundFrame::Text(PING.to_string()))
            );
            peer
        }
    }

    fn harness_with(config: ManagerConfig) -> Harness {
        let (peer_tx, peers) = mpsc::unbounded_channel();
        let fail = Arc::new(AtomicBool::new(false));
        let opens = Arc::new(AtomicU32::new(0));
        let connector = FakeConnector {
            peers: peer_tx,
            fail: fail.clone(),
            opens: opens.clone(),
        };
        let toasts = Arc::new(RecordingToasts::default());
        let router = MessageRouter::new(AlertDispatcher::new().with_toasts(toasts.clone()));
        let handle = ConnectionManager::new(config, Arc::new(connector), router).spawn();
        Harness {
            handle,
            peers,
            fail,
            opens,
            toasts,
        }
    }

    fn config() -> ManagerConfig {
        let mut config = ManagerConfig::new(Url::parse("ws://localhost:8000/ws/monitor").unwrap());
        config.policy = ReconnectPolicy::new(Duration::from_millis(1000), 5);
        config
    }

    fn harness() -> Harness {
        harness_with(config())
    }

    // ── connect ───────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_connect_opens_and_sends_initial_ping() {
        let mut h = harness();
        assert_eq!(h.handle.snapshot().connection.state, ConnectionState::Disconnected);
        let _peer = h.connect().await;
        let snap = h.handle.snapshot();
        assert_eq!(snap.connection.attempts, 0);
        assert!(snap.connection.error.is_none());
        assert_eq!(h.opens(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_while_connected_is_noop() {
        let mut h = harness();
        let mut peer = h.connect().await;

        h.handle.connect().unwrap();
        h.handle.connect().unwrap();
        // Round-trip a command so both connects were processed.
        h.handle.events().await.unwrap();

        assert_eq!(h.opens(), 1);
        assert!(peer.outbound.try_recv().is_err(), "no duplicate ping");

        // Still exactly one ping per interval.
        time::sleep(Duration::from_secs(31)).await;
        assert_eq!(
            peer.outbound.recv().await,
            Some(OutboundFrame::Text(PING.to_string()))
        );
        assert!(peer.outbound.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ping_sent_every_interval() {
        let mut h = harness();
        let mut peer = h.connect().await;
        for _ in 0..3 {
            time::sleep(Duration::from_secs(30)).await;
            assert_eq!(
                peer.outbound.recv().await,
                Some(OutboundFrame::Text(PING.to_string()))
            );
        }
    }

    // ── frames ────────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_flagged_detection_reaches_store_and_toasts() {
        let mut h = harness();
        let peer = h.connect().await;
        let frame = r#"{"type":"detection_result","agent_id":"it_bot","query":"What is the capital of France?","output":"The capital of France is Berlin.","hallucination_risk":0.82,"flagged":true,"confidence":0.9,"flagged_segments":["capital of France is Berlin"],"timestamp":"2024-05-01T12:00:00Z","processing_time_ms":130}"#;
        peer.inbound
            .send(TransportEvent::Frame(frame.to_string()))
            .unwrap();

        let mut rx = h.handle.subscribe();
        let snap = rx.wait_for(|s| s.stats.total == 1).await.unwrap().clone();
        assert_eq!(snap.stats.flagged, 1);
        assert_eq!(snap.recent[0].agent_id, "it_bot");
        assert!(h
            .toasts
            .all()
            .iter()
            .any(|t| t.level == ToastLevel::Critical));
    }

    #[tokio::test(start_paused = true)]
    async fn test_detections_kept_in_arrival_order() {
        let mut h = harness();
        let peer = h.connect().await;
        let agents = ["hr_bot", "it_bot", "sales_bot", "hr_bot", "support_bot"];
        for (i, agent) in agents.iter().enumerate() {
            let frame = format!(
                r#"{{"type":"detection_result","agent_id":"{agent}","query":"q{i}","hallucination_risk":0.{i},"flagged":{}}}"#,
                i % 2 == 1
            );
            peer.inbound.send(TransportEvent::Frame(frame)).unwrap();
        }

        let mut rx = h.handle.subscribe();
        rx.wait_for(|s| s.stats.total == agents.len() as u64)
            .await
            .unwrap();
        let events = h.handle.events().await.unwrap();
        let seen: Vec<&str> = events.iter().map(|e| e.agent_id.as_str()).collect();
        assert_eq!(seen, agents);
        let queries: Vec<&str> = events.iter().map(|e| e.query.as_str()).collect();
        assert_eq!(queries, ["q0", "q1", "q2", "q3", "q4"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_frames_do_not_change_state_or_store() {
        let mut h = harness();
        let peer = h.connect().await;
        for text in ["{not json", r#"{"no_type":1}"#, r#"{"type":"mystery"}"#] {
            peer.inbound
                .send(TransportEvent::Frame(text.to_string()))
                .unwrap();
        }
        assert!(h.handle.events().await.unwrap().is_empty());
        let snap = h.handle.snapshot();
        assert_eq!(snap.connection.state, ConnectionState::Connected);
        assert!(snap.connection.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_error_frame_records_error_but_stays_connected() {
        let mut h = harness();
        let peer = h.connect().await;
        peer.inbound
            .send(TransportEvent::Frame(
                r#"{"type":"error","message":"overloaded"}"#.to_string(),
            ))
            .unwrap();

        let mut rx = h.handle.subscribe();
        let snap = rx
            .wait_for(|s| s.connection.error.is_some())
            .await
            .unwrap()
            .clone();
        assert_eq!(snap.connection.state, ConnectionState::Connected);
        assert_eq!(
            snap.connection.error,
            Some(ConnectionError::Server("overloaded".to_string()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_session_keeps_connection() {
        let mut h = harness();
        let peer = h.connect().await;
        peer.inbound
            .send(TransportEvent::Frame(
                r#"{"type":"detection_result","agent_id":"a","hallucination_risk":0.1,"flagged":false}"#
                    .to_string(),
            ))
            .unwrap();
        assert_eq!(h.handle.events().await.unwrap().len(), 1);

        h.handle.clear_session().unwrap();
        assert!(h.handle.events().await.unwrap().is_empty());
        assert_eq!(h.handle.snapshot().connection.state, ConnectionState::Connected);
        assert_eq!(h.handle.snapshot().stats.total, 0);
    }

    // ── reconnect ─────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_abnormal_close_retries_after_base_delay() {
        let mut h = harness();
        let peer = h.connect().await;

        let closed_at = Instant::now();
        peer.inbound.send(TransportEvent::Closed(Some(1006))).unwrap();
        let snap = h.wait_state(ConnectionState::Errored).await;
        assert_eq!(snap.connection.attempts, 1);
        assert_eq!(snap.connection.retry_in, Some(Duration::from_millis(1000)));

        let _second = h.peers.recv().await.expect("reconnected");
        assert!(closed_at.elapsed() >= Duration::from_millis(1000));
        assert_eq!(h.opens(), 2);
        let snap = h.wait_state(ConnectionState::Connected).await;
        assert_eq!(snap.connection.attempts, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_normal_closure_never_reconnects() {
        let mut h = harness();
        let peer = h.connect().await;
        peer.inbound.send(TransportEvent::Closed(Some(1000))).unwrap();
        let snap = h.wait_state(ConnectionState::Disconnected).await;
        assert_eq!(snap.connection.attempts, 0);

        time::sleep(Duration::from_secs(120)).await;
        assert_eq!(h.opens(), 1);
        assert_eq!(h.handle.snapshot().connection.state, ConnectionState::Disconnected);
    }

    /// Real time: a task that keeps polling a finished link never lets the
    /// paused clock advance.
    async fn assert_quiet_after_peer_close(code: u16, state: ConnectionState) {
        let mut h = harness();
        let peer = h.connect().await;
        peer.inbound.send(TransportEvent::Closed(Some(code))).unwrap();
        drop(peer);
        h.wait_state(state).await;

        let mut rx = h.handle.subscribe();
        rx.borrow_and_update();
        time::sleep(Duration::from_millis(200)).await;
        assert!(
            !rx.has_changed().unwrap(),
            "snapshot republished after the peer went away"
        );
        assert_eq!(h.opens(), 1);
    }

    #[tokio::test]
    async fn test_normal_close_with_peer_gone_stays_quiet() {
        assert_quiet_after_peer_close(1000, ConnectionState::Disconnected).await;
    }

    #[tokio::test]
    async fn test_abnormal_close_with_peer_gone_waits_for_retry() {
        assert_quiet_after_peer_close(1006, ConnectionState::Errored).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhaust_into_persistent_toast() {
        let mut config = config();
        config.policy = ReconnectPolicy::new(Duration::from_millis(100), 2);
        let h = harness_with(config);
        h.fail.store(true, Ordering::SeqCst);
        h.handle.connect().unwrap();

        let mut rx = h.handle.subscribe();
        let snap = rx
            .wait_for(|s| {
                s.connection
                    .error
                    .as_ref()
                    .is_some_and(ConnectionError::is_terminal)
            })
            .await
            .unwrap()
            .clone();
        assert_eq!(snap.connection.state, ConnectionState::Errored);
        assert_eq!(
            snap.connection.error,
            Some(ConnectionError::ReconnectExhausted { attempts: 2 })
        );
        assert_eq!(h.opens(), 3);

        let last = h.toasts.all().pop().unwrap();
        assert!(last.is_persistent());
        assert!(last.message.contains("Press r"));

        // Nothing else is scheduled.
        time::sleep(Duration::from_secs(60)).await;
        assert_eq!(h.opens(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_after_exhaustion_starts_over() {
        let mut config = config();
        config.policy = ReconnectPolicy::new(Duration::from_millis(100), 1);
        let mut h = harness_with(config);
        h.fail.store(true, Ordering::SeqCst);
        h.handle.connect().unwrap();
        let mut rx = h.handle.subscribe();
        rx.wait_for(|s| s.connection.error.as_ref().is_some_and(ConnectionError::is_terminal))
            .await
            .unwrap();

        h.fail.store(false, Ordering::SeqCst);
        let _peer = h.connect().await;
        assert_eq!(h.handle.snapshot().connection.attempts, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_liveness_timeout_triggers_reconnect() {
        let mut config = config();
        config.liveness_timeout = Some(Duration::from_secs(45));
        let mut h = harness_with(config);
        let _peer = h.connect().await;

        // First tick at 30s is within the timeout; the 60s tick is not.
        let snap = h.wait_state(ConnectionState::Errored).await;
        assert_eq!(snap.connection.attempts, 1);
        assert!(matches!(snap.connection.error, Some(ConnectionError::Network(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_liveness_disabled_by_default() {
        let mut h = harness();
        let _peer = h.connect().await;
        time::sleep(Duration::from_secs(600)).await;
        assert_eq!(h.handle.snapshot().connection.state, ConnectionState::Connected);
    }

    // ── disconnect ────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_closes_transport_and_stops_ping() {
        let mut h = harness();
        let mut peer = h.connect().await;

        h.handle.disconnect().await.unwrap();
        assert_eq!(h.handle.snapshot().connection.state, ConnectionState::Disconnected);
        assert_eq!(peer.outbound.recv().await, Some(OutboundFrame::Close));

        time::sleep(Duration::from_secs(120)).await;
        assert_eq!(peer.outbound.recv().await, None, "no ping after disconnect");
        assert_eq!(h.opens(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_cancels_pending_retry() {
        let h = harness();
        h.fail.store(true, Ordering::SeqCst);
        h.handle.connect().unwrap();
        h.wait_state(ConnectionState::Errored).await;

        h.handle.disconnect().await.unwrap();
        let snap = h.handle.snapshot();
        assert_eq!(snap.connection.state, ConnectionState::Disconnected);
        assert_eq!(snap.connection.attempts, 0);
        assert!(snap.connection.error.is_none());

        time::sleep(Duration::from_secs(120)).await;
        assert_eq!(h.opens(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_when_idle_is_harmless() {
        let h = harness();
        h.handle.disconnect().await.unwrap();
        assert_eq!(h.handle.snapshot().connection.state, ConnectionState::Disconnected);
        assert_eq!(h.opens(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_task() {
        let mut h = harness();
        let mut peer = h.connect().await;
        h.handle.shutdown().await.unwrap();
        assert_eq!(peer.outbound.recv().await, Some(OutboundFrame::Close));
        assert!(matches!(
            h.handle.events().await,
            Err(MonitorError::ChannelClosed)
        ));
    }
}
