//! Network reachability and link quality.
//!
//! [`QualityTracker`] turns raw platform signals into a [`ConnectivityState`];
//! [`ConnectivityMonitor`] runs it on a background task and publishes changes
//! through a `watch` channel, at most once per debounce interval.

use crate::settings::ConnectivitySettings;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Coarse reachability/quality bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityStatus {
    #[default]
    Online,
    Offline,
    Slow,
    Unstable,
}

impl ConnectivityStatus {
    pub fn is_offline(&self) -> bool {
        matches!(self, ConnectivityStatus::Offline)
    }
}

/// Link metrics as reported by the platform, when it reports any.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LinkQuality {
    pub rtt_ms: Option<u64>,
    pub downlink_mbps: Option<f64>,
}

impl LinkQuality {
    pub fn is_empty(&self) -> bool {
        self.rtt_ms.is_none() && self.downlink_mbps.is_none()
    }
}

/// Published connectivity snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectivityState {
    pub status: ConnectivityStatus,
    pub rtt_ms: Option<u64>,
    pub downlink_mbps: Option<f64>,
    pub last_success: Option<DateTime<Utc>>,
    /// False when the platform exposes no quality metrics and the status is a
    /// plain online/offline reading.
    pub quality_known: bool,
}

impl ConnectivityState {
    pub fn online() -> Self {
        Self {
            status: ConnectivityStatus::Online,
            rtt_ms: None,
            downlink_mbps: None,
            last_success: None,
            quality_known: false,
        }
    }

    pub fn offline() -> Self {
        Self {
            status: ConnectivityStatus::Offline,
            ..Self::online()
        }
    }

    pub fn is_offline(&self) -> bool {
        self.status.is_offline()
    }
}

impl Default for ConnectivityState {
    fn default() -> Self {
        Self::online()
    }
}

/// Raw input from the host platform.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectivitySignal {
    Online,
    Offline,
    Quality(LinkQuality),
    RequestSucceeded,
}

/// Source of link quality measurements polled by the monitor.
#[async_trait]
pub trait LinkProbe: Send + Sync {
    /// Measure the link; `None` when no metrics are available.
    async fn probe(&self) -> Option<LinkQuality>;
}

/// Synchronous connectivity state machine.
#[derive(Debug, Clone)]
pub struct QualityTracker {
    settings: ConnectivitySettings,
    online: bool,
    quality: LinkQuality,
    flips: VecDeque<Instant>,
    last_success: Option<DateTime<Utc>>,
}

impl QualityTracker {
    pub fn new(settings: ConnectivitySettings, online: bool) -> Self {
        Self {
            settings,
            online,
            quality: LinkQuality::default(),
            flips: VecDeque::new(),
            last_success: None,
        }
    }

    /// Fold one platform signal into the tracker.
    pub fn apply(&mut self, signal: ConnectivitySignal, now: Instant, wall: DateTime<Utc>) {
        match signal {
            ConnectivitySignal::Online => self.set_online(true, now),
            ConnectivitySignal::Offline => self.set_online(false, now),
            ConnectivitySignal::Quality(quality) => {
                if quality.rtt_ms.is_some() {
                    self.quality.rtt_ms = quality.rtt_ms;
                }
                if quality.downlink_mbps.is_some() {
                    self.quality.downlink_mbps = quality.downlink_mbps;
                }
            }
            ConnectivitySignal::RequestSucceeded => {
                self.last_success = Some(wall);
                self.set_online(true, now);
            }
        }
        self.prune(now);
    }

    fn set_online(&mut self, online: bool, now: Instant) {
        if self.online != online {
            self.online = online;
            self.flips.push_back(now);
        }
    }

    fn prune(&mut self, now: Instant) {
        let window = self.settings.flap_window;
        while let Some(front) = self.flips.front() {
            if now.saturating_duration_since(*front) > window {
                self.flips.pop_front();
            } else {
                break;
            }
        }
    }

    fn recent_flips(&self, now: Instant) -> usize {
        self.flips
            .iter()
            .filter(|at| now.saturating_duration_since(**at) <= self.settings.flap_window)
            .count()
    }

    pub fn status(&self, now: Instant) -> ConnectivityStatus {
        if !self.online {
            return ConnectivityStatus::Offline;
        }
        if self.recent_flips(now) >= self.settings.flap_threshold {
            return ConnectivityStatus::Unstable;
        }
        let slow_rtt = self
            .quality
            .rtt_ms
            .is_some_and(|rtt| rtt >= self.settings.slow_rtt.as_millis() as u64);
        let slow_downlink = self
            .quality
            .downlink_mbps
            .is_some_and(|mbps| mbps < self.settings.slow_downlink_mbps);
        if slow_rtt || slow_downlink {
            ConnectivityStatus::Slow
        } else {
            ConnectivityStatus::Online
        }
    }

    pub fn state(&self, now: Instant) -> ConnectivityState {
        ConnectivityState {
            status: self.status(now),
            rtt_ms: self.quality.rtt_ms,
            downlink_mbps: self.quality.downlink_mbps,
            last_success: self.last_success,
            quality_known: !self.quality.is_empty(),
        }
    }

    /// When an `Unstable` reading will age out without further signals.
    pub fn next_expiry(&self, now: Instant) -> Option<Instant> {
        let threshold = self.settings.flap_threshold;
        let recent: Vec<_> = self
            .flips
            .iter()
            .filter(|at| now.saturating_duration_since(**at) <= self.settings.flap_window)
            .collect();
        if threshold == 0 || recent.len() < threshold {
            return None;
        }
        let pivot = recent[recent.len() - threshold];
        Some(*pivot + self.settings.flap_window + std::time::Duration::from_millis(1))
    }
}

/// Background connectivity monitor.
///
/// Platform adapters push [`ConnectivitySignal`]s in; consumers read the
/// debounced [`ConnectivityState`] through [`subscribe`](Self::subscribe).
pub struct ConnectivityMonitor {
    signal_tx: mpsc::UnboundedSender<ConnectivitySignal>,
    state_rx: watch::Receiver<ConnectivityState>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectivityMonitor {
    /// Start a monitor fed only by pushed signals. Must be called inside a
    /// tokio runtime.
    pub fn start(settings: ConnectivitySettings, initially_online: bool) -> Self {
        Self::spawn(settings, initially_online, None)
    }

    /// Start a monitor that additionally polls `probe` every `interval`.
    pub fn start_with_probe(
        settings: ConnectivitySettings,
        initially_online: bool,
        probe: Arc<dyn LinkProbe>,
        interval: std::time::Duration,
    ) -> Self {
        Self::spawn(settings, initially_online, Some((probe, interval)))
    }

    fn spawn(
        settings: ConnectivitySettings,
        initially_online: bool,
        probe: Option<(Arc<dyn LinkProbe>, std::time::Duration)>,
    ) -> Self {
        let tracker = QualityTracker::new(settings, initially_online);
        let initial = tracker.state(Instant::now());
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(initial);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run_monitor(
            tracker,
            signal_rx,
            state_tx,
            probe,
            cancel.clone(),
        ));

        Self {
            signal_tx,
            state_rx,
            cancel,
            task: Mutex::new(Some(task)),
        }
    }

    /// Push a raw platform signal. Ignored once the monitor is shut down.
    pub fn signal(&self, signal: ConnectivitySignal) {
        let _ = self.signal_tx.send(signal);
    }

    pub fn set_online(&self, online: bool) {
        self.signal(if online {
            ConnectivitySignal::Online
        } else {
            ConnectivitySignal::Offline
        });
    }

    pub fn report_quality(&self, quality: LinkQuality) {
        self.signal(ConnectivitySignal::Quality(quality));
    }

    pub fn record_success(&self) {
        self.signal(ConnectivitySignal::RequestSucceeded);
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.state_rx.clone()
    }

    pub fn current(&self) -> ConnectivityState {
        self.state_rx.borrow().clone()
    }

    /// Stop the background task. Idempotent.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        let task = match self.task.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(task) = task {
            task.abort();
        }
    }
}

impl Drop for ConnectivityMonitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_monitor(
    mut tracker: QualityTracker,
    mut signal_rx: mpsc::UnboundedReceiver<ConnectivitySignal>,
    state_tx: watch::Sender<ConnectivityState>,
    probe: Option<(Arc<dyn LinkProbe>, std::time::Duration)>,
    cancel: CancellationToken,
) {
    let debounce = tracker.settings.debounce;
    let mut last_publish: Option<Instant> = None;
    let mut pending = false;
    let mut probe_interval = probe
        .as_ref()
        .map(|(_, every)| tokio::time::interval(*every));

    loop {
        let now = Instant::now();
        let debounce_at = if pending {
            last_publish.map(|at| at + debounce)
        } else {
            None
        };
        let wake_at = match (debounce_at, tracker.next_expiry(now)) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            signal = signal_rx.recv() => match signal {
                Some(signal) => tracker.apply(signal, Instant::now(), Utc::now()),
                None => break,
            },
            _ = async {
                match wake_at {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            } => {}
            _ = async {
                match probe_interval.as_mut() {
                    Some(interval) => { interval.tick().await; }
                    None => std::future::pending::<()>().await,
                }
            } => {
                if let Some((probe, _)) = probe.as_ref() {
                    if let Some(quality) = probe.probe().await {
                        tracker.apply(ConnectivitySignal::Quality(quality), Instant::now(), Utc::now());
                    }
                }
            }
        }

        let now = Instant::now();
        let next = tracker.state(now);
        if next == *state_tx.borrow() {
            pending = false;
            continue;
        }
        let due = last_publish.map_or(true, |at| now.saturating_duration_since(at) >= debounce);
        if due {
            if next.status != state_tx.borrow().status {
                tracing::info!(status = ?next.status, rtt_ms = ?next.rtt_ms, "connectivity changed");
            }
            state_tx.send_replace(next);
            last_publish = Some(now);
            pending = false;
        } else {
            pending = true;
        }
    }
    tracing::debug!("connectivity monitor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn tracker() -> QualityTracker {
        QualityTracker::new(ConnectivitySettings::default(), true)
    }

    #[test]
    fn test_tracker_without_metrics_should_report_binary_status() {
        // Given: a tracker that never receives quality metrics
        let mut tracker = tracker();
        let now = Instant::now();

        // When: going offline
        tracker.apply(ConnectivitySignal::Offline, now, Utc::now());

        // Then: the reading is plain offline with unknown quality
        let state = tracker.state(now);
        assert_eq!(state.status, ConnectivityStatus::Offline);
        assert!(!state.quality_known);
    }

    #[test]
    fn test_tracker_should_flag_high_latency_as_slow() {
        let mut tracker = tracker();
        let now = Instant::now();

        tracker.apply(
            ConnectivitySignal::Quality(LinkQuality {
                rtt_ms: Some(900),
                downlink_mbps: Some(10.0),
            }),
            now,
            Utc::now(),
        );

        assert_eq!(tracker.status(now), ConnectivityStatus::Slow);
        assert!(tracker.state(now).quality_known);
    }

    #[test]
    fn test_tracker_should_flag_low_bandwidth_as_slow() {
        let mut tracker = tracker();
        let now = Instant::now();

        tracker.apply(
            ConnectivitySignal::Quality(LinkQuality {
                rtt_ms: None,
                downlink_mbps: Some(0.4),
            }),
            now,
            Utc::now(),
        );

        assert_eq!(tracker.status(now), ConnectivityStatus::Slow);
    }

    #[test]
    fn test_tracker_should_detect_flapping_and_recover_after_window() {
        // Given: three flips within a few seconds
        let mut tracker = tracker();
        let start = Instant::now();
        tracker.apply(ConnectivitySignal::Offline, start, Utc::now());
        tracker.apply(ConnectivitySignal::Online, start + Duration::from_secs(1), Utc::now());
        tracker.apply(ConnectivitySignal::Offline, start + Duration::from_secs(2), Utc::now());
        tracker.apply(ConnectivitySignal::Online, start + Duration::from_secs(3), Utc::now());

        // Then: the link is unstable now
        let now = start + Duration::from_secs(3);
        assert_eq!(tracker.status(now), ConnectivityStatus::Unstable);
        let expiry = tracker.next_expiry(now).expect("unstable reading should expire");

        // And: stable again once the flips age out
        assert_eq!(tracker.status(expiry), ConnectivityStatus::Online);
    }

    #[test]
    fn test_request_success_should_record_timestamp_and_mark_online() {
        let mut tracker = QualityTracker::new(ConnectivitySettings::default(), false);
        let wall = Utc::now();

        tracker.apply(ConnectivitySignal::RequestSucceeded, Instant::now(), wall);

        let state = tracker.state(Instant::now());
        assert_eq!(state.status, ConnectivityStatus::Online);
        assert_eq!(state.last_success, Some(wall));
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_should_debounce_rapid_transitions() {
        // Given: a running monitor
        let monitor = ConnectivityMonitor::start(ConnectivitySettings::default(), true);
        let mut rx = monitor.subscribe();
        let started = Instant::now();

        // When: dropping offline, the first change publishes right away
        monitor.set_online(false);
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().status, ConnectivityStatus::Offline);

        // And: an immediate reconnect waits for the debounce interval
        monitor.set_online(true);
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().status, ConnectivityStatus::Online);
        assert!(Instant::now().duration_since(started) >= Duration::from_millis(250));

        monitor.shutdown();
        monitor.shutdown();
    }

    struct FixedProbe;

    #[async_trait]
    impl LinkProbe for FixedProbe {
        async fn probe(&self) -> Option<LinkQuality> {
            Some(LinkQuality {
                rtt_ms: Some(1200),
                downlink_mbps: Some(0.5),
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_should_poll_probe_for_quality() {
        let monitor = ConnectivityMonitor::start_with_probe(
            ConnectivitySettings::default(),
            true,
            Arc::new(FixedProbe),
            Duration::from_secs(5),
        );
        let mut rx = monitor.subscribe();

        rx.changed().await.unwrap();
        let state = rx.borrow_and_update().clone();
        assert_eq!(state.status, ConnectivityStatus::Slow);
        assert_eq!(state.rtt_ms, Some(1200));

        monitor.shutdown();
    }
}
