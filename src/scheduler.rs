//! Automatic retry lifecycle for a single error record.
//!
//! ```text
//! Idle -> Scheduled -> Retrying -> Succeeded
//!            ^            |
//!            +-- failed --+--> Exhausted
//! ```
//!
//! While connectivity is offline the scheduler sits in `Suspended` with its
//! attempt counter untouched and picks up from `Scheduled` once the link is
//! back. An attempt that is in flight when the link drops is abandoned and
//! rerun under the same attempt number. Cancellation moves straight to `Idle`
//! from any non-terminal state and can be repeated safely.

use crate::classifier::RawFailure;
use crate::connectivity::ConnectivityState;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Caller-supplied recovery operation. The engine imposes no timeout on it.
#[async_trait]
pub trait RecoveryAction: Send + Sync {
    async fn run(&self) -> Result<(), RawFailure>;
}

#[async_trait]
impl<F, Fut> RecoveryAction for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), RawFailure>> + Send + 'static,
{
    async fn run(&self) -> Result<(), RawFailure> {
        (self)().await
    }
}

/// Observable scheduler state.
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerState {
    Idle,
    /// Waiting out the backoff for `attempt` (0-based).
    Scheduled {
        attempt: u32,
        delay: Duration,
        deadline: Instant,
    },
    /// Parked until connectivity returns.
    Suspended { attempt: u32 },
    Retrying { attempt: u32 },
    Succeeded { attempts: u32 },
    Exhausted { retry_count: u32 },
}

impl SchedulerState {
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SchedulerState::Scheduled { .. }
                | SchedulerState::Suspended { .. }
                | SchedulerState::Retrying { .. }
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SchedulerState::Succeeded { .. } | SchedulerState::Exhausted { .. }
        )
    }

    /// Countdown left before the next attempt.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        match self {
            SchedulerState::Scheduled { deadline, .. } => {
                Some(deadline.saturating_duration_since(now))
            }
            _ => None,
        }
    }
}

/// Transition notification sent to the owner of the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerEvent {
    pub error_id: Uuid,
    /// Distinguishes successive schedulers for the same record.
    pub run_id: u64,
    pub kind: SchedulerEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerEventKind {
    Scheduled { attempt: u32, delay: Duration },
    Suspended { attempt: u32 },
    AttemptStarted { attempt: u32 },
    AttemptFailed {
        attempt: u32,
        retry_count: u32,
        failure: RawFailure,
    },
    Succeeded { attempts: u32 },
    Exhausted { retry_count: u32 },
}

/// Handle to a running retry loop.
#[derive(Debug)]
pub struct RetryScheduler {
    error_id: Uuid,
    run_id: u64,
    state_tx: Arc<watch::Sender<SchedulerState>>,
    state_rx: watch::Receiver<SchedulerState>,
    cancel: CancellationToken,
}

impl RetryScheduler {
    /// Start retrying `action` for `error_id`, continuing from `retry_count`
    /// failures already spent. Must be called inside a tokio runtime.
    pub fn spawn(
        error_id: Uuid,
        run_id: u64,
        policy: RetryPolicy,
        retry_count: u32,
        action: Arc<dyn RecoveryAction>,
        connectivity: watch::Receiver<ConnectivityState>,
        events: mpsc::UnboundedSender<SchedulerEvent>,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(SchedulerState::Idle);
        let state_tx = Arc::new(state_tx);
        let cancel = CancellationToken::new();

        let task = SchedulerTask {
            error_id,
            run_id,
            policy,
            action,
            connectivity,
            events,
            state_tx: state_tx.clone(),
            cancel: cancel.clone(),
        };
        tokio::spawn(task.run(retry_count));

        Self {
            error_id,
            run_id,
            state_tx,
            state_rx,
            cancel,
        }
    }

    pub fn error_id(&self) -> Uuid {
        self.error_id
    }

    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    pub fn state(&self) -> SchedulerState {
        self.state_rx.borrow().clone()
    }

    /// Subscribe to state changes, e.g. to render the countdown.
    pub fn watch(&self) -> watch::Receiver<SchedulerState> {
        self.state_rx.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Discard any pending retry and return to `Idle`. Terminal states are
    /// kept as they are. Idempotent.
    pub fn cancel(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.cancel.cancel();
        self.state_tx.send_if_modified(|state| {
            if state.is_terminal() || *state == SchedulerState::Idle {
                false
            } else {
                *state = SchedulerState::Idle;
                true
            }
        });
        tracing::debug!(error_id = %self.error_id, run_id = self.run_id, "retry scheduler cancelled");
    }
}

impl Drop for RetryScheduler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct SchedulerTask {
    error_id: Uuid,
    run_id: u64,
    policy: RetryPolicy,
    action: Arc<dyn RecoveryAction>,
    connectivity: watch::Receiver<ConnectivityState>,
    events: mpsc::UnboundedSender<SchedulerEvent>,
    state_tx: Arc<watch::Sender<SchedulerState>>,
    cancel: CancellationToken,
}

/// Outcome of waiting on something while watching the link.
enum Wait<T> {
    Done(T),
    WentOffline,
    Cancelled,
}

impl SchedulerTask {
    async fn run(mut self, mut retry_count: u32) {
        loop {
            if !self.policy.should_retry(retry_count) {
                self.publish(SchedulerState::Exhausted { retry_count });
                self.emit(SchedulerEventKind::Exhausted { retry_count });
                tracing::warn!(error_id = %self.error_id, retry_count, "automatic retries exhausted");
                return;
            }
            let attempt = retry_count;

            if self.is_offline() && !self.suspend(attempt).await {
                return;
            }

            let delay = self.policy.calculate_delay(attempt);
            let deadline = Instant::now() + delay;
            self.publish(SchedulerState::Scheduled {
                attempt,
                delay,
                deadline,
            });
            self.emit(SchedulerEventKind::Scheduled { attempt, delay });
            tracing::debug!(error_id = %self.error_id, attempt, delay_ms = delay.as_millis() as u64, "retry scheduled");

            match self.until_offline(tokio::time::sleep_until(deadline)).await {
                Wait::Done(()) => {}
                Wait::WentOffline => continue,
                Wait::Cancelled => return,
            }

            self.publish(SchedulerState::Retrying { attempt });
            self.emit(SchedulerEventKind::AttemptStarted { attempt });
            let action = self.action.clone();
            match self.until_offline(action.run()).await {
                Wait::Done(Ok(())) => {
                    let attempts = attempt + 1;
                    self.publish(SchedulerState::Succeeded { attempts });
                    self.emit(SchedulerEventKind::Succeeded { attempts });
                    tracing::info!(error_id = %self.error_id, attempts, "automatic retry succeeded");
                    return;
                }
                Wait::Done(Err(failure)) => {
                    retry_count += 1;
                    tracing::debug!(error_id = %self.error_id, attempt, error = %failure.message, "retry attempt failed");
                    self.emit(SchedulerEventKind::AttemptFailed {
                        attempt,
                        retry_count,
                        failure,
                    });
                }
                Wait::WentOffline => {
                    tracing::debug!(error_id = %self.error_id, attempt, "attempt abandoned, link went offline");
                }
                Wait::Cancelled => return,
            }
        }
    }

    fn is_offline(&self) -> bool {
        self.connectivity.borrow().is_offline()
    }

    /// Park in `Suspended` until the link is back. False when cancelled.
    async fn suspend(&mut self, attempt: u32) -> bool {
        self.publish(SchedulerState::Suspended { attempt });
        self.emit(SchedulerEventKind::Suspended { attempt });
        tracing::debug!(error_id = %self.error_id, attempt, "retry suspended while offline");

        let cancel = self.cancel.clone();
        let connectivity = &mut self.connectivity;
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = async {
                // A closed channel means nobody reports connectivity any more.
                let _ = connectivity.wait_for(|state| !state.is_offline()).await;
            } => true,
        }
    }

    /// Drive `fut` unless the link drops or the scheduler is cancelled first.
    async fn until_offline<F: Future>(&mut self, fut: F) -> Wait<F::Output> {
        let cancel = self.cancel.clone();
        let connectivity = &mut self.connectivity;
        tokio::select! {
            _ = cancel.cancelled() => Wait::Cancelled,
            output = fut => Wait::Done(output),
            _ = async {
                let closed = connectivity.wait_for(|state| state.is_offline()).await.is_err();
                if closed {
                    std::future::pending::<()>().await;
                }
            } => Wait::WentOffline,
        }
    }

    fn publish(&self, next: SchedulerState) {
        let cancel = &self.cancel;
        self.state_tx.send_if_modified(|state| {
            if cancel.is_cancelled() {
                return false;
            }
            *state = next;
            true
        });
    }

    fn emit(&self, kind: SchedulerEventKind) {
        if self.cancel.is_cancelled() {
            return;
        }
        let _ = self.events.send(SchedulerEvent {
            error_id: self.error_id,
            run_id: self.run_id,
            kind,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Harness {
        connectivity: watch::Sender<ConnectivityState>,
        events: mpsc::UnboundedReceiver<SchedulerEvent>,
        calls: Arc<AtomicU32>,
        scheduler: RetryScheduler,
    }

    /// Action that fails `failures` times, then succeeds after `work`.
    fn harness(online: bool, failures: u32, work: Duration) -> Harness {
        let initial = if online {
            ConnectivityState::online()
        } else {
            ConnectivityState::offline()
        };
        let (connectivity, rx) = watch::channel(initial);
        let (events_tx, events) = mpsc::unbounded_channel();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let action = move || {
            let counter = counter.clone();
            async move {
                let call = counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(work).await;
                if call < failures {
                    Err(RawFailure::new("still failing"))
                } else {
                    Ok(())
                }
            }
        };
        let scheduler = RetryScheduler::spawn(
            Uuid::new_v4(),
            1,
            RetryPolicy::standard().with_jitter_fraction(0.0),
            0,
            Arc::new(action),
            rx,
            events_tx,
        );
        Harness {
            connectivity,
            events,
            calls,
            scheduler,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_should_succeed_after_failed_attempt() {
        // Given: an action that fails once
        let mut h = harness(true, 1, Duration::ZERO);
        let mut state = h.scheduler.watch();

        // When: letting the scheduler run
        state
            .wait_for(|s| s.is_terminal())
            .await
            .unwrap();

        // Then: the second attempt succeeds
        assert_eq!(h.scheduler.state(), SchedulerState::Succeeded { attempts: 2 });
        assert_eq!(h.calls.load(Ordering::SeqCst), 2);

        let first = h.events.recv().await.unwrap();
        assert_eq!(
            first.kind,
            SchedulerEventKind::Scheduled {
                attempt: 0,
                delay: Duration::from_secs(1)
            }
        );
        let mut kinds = vec![first.kind];
        while let Ok(event) = h.events.try_recv() {
            kinds.push(event.kind);
        }
        assert!(kinds.contains(&SchedulerEventKind::Scheduled {
            attempt: 1,
            delay: Duration::from_secs(2)
        }));
        assert_eq!(kinds.last(), Some(&SchedulerEventKind::Succeeded { attempts: 2 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_should_exhaust_and_stop_attempting() {
        // Given: an action that never succeeds
        let h = harness(true, u32::MAX, Duration::ZERO);
        let mut state = h.scheduler.watch();

        // When: the retry budget is spent
        state.wait_for(|s| s.is_terminal()).await.unwrap();

        // Then: exactly max_retries attempts ran and no more follow
        assert_eq!(h.scheduler.state(), SchedulerState::Exhausted { retry_count: 3 });
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(h.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_should_wait_for_connectivity_before_first_attempt() {
        // Given: a scheduler started while offline
        let h = harness(false, 0, Duration::ZERO);
        let mut state = h.scheduler.watch();
        state
            .wait_for(|s| matches!(s, SchedulerState::Suspended { attempt: 0 }))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(h.calls.load(Ordering::SeqCst), 0);

        // When: the link comes back
        h.connectivity.send_replace(ConnectivityState::online());

        // Then: attempt 0 is scheduled with the base delay
        let scheduled = state
            .wait_for(|s| matches!(s, SchedulerState::Scheduled { .. }))
            .await
            .unwrap()
            .clone();
        assert!(matches!(
            scheduled,
            SchedulerState::Scheduled { attempt: 0, delay, .. } if delay == Duration::from_secs(1)
        ));
        state.wait_for(|s| s.is_terminal()).await.unwrap();
        assert_eq!(h.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_going_offline_while_retrying_should_preserve_attempt() {
        // Given: an attempt in flight
        let h = harness(true, 0, Duration::from_secs(10));
        let mut state = h.scheduler.watch();
        state
            .wait_for(|s| matches!(s, SchedulerState::Retrying { attempt: 0 }))
            .await
            .unwrap();

        // When: the link drops mid-attempt
        h.connectivity.send_replace(ConnectivityState::offline());

        // Then: the scheduler suspends on the same attempt
        state
            .wait_for(|s| matches!(s, SchedulerState::Suspended { attempt: 0 }))
            .await
            .unwrap();

        // And: resumes from it once back online
        h.connectivity.send_replace(ConnectivityState::online());
        state
            .wait_for(|s| matches!(s, SchedulerState::Scheduled { attempt: 0, .. }))
            .await
            .unwrap();
        state.wait_for(|s| s.is_terminal()).await.unwrap();
        assert_eq!(h.scheduler.state(), SchedulerState::Succeeded { attempts: 1 });
        assert_eq!(h.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_should_return_to_idle_and_be_idempotent() {
        // Given: a scheduler waiting on its first backoff
        let mut h = harness(true, 0, Duration::ZERO);
        let mut state = h.scheduler.watch();
        state
            .wait_for(|s| matches!(s, SchedulerState::Scheduled { .. }))
            .await
            .unwrap();
        assert!(h.scheduler.state().remaining(Instant::now()).is_some());

        // When: cancelling twice
        h.scheduler.cancel();
        h.scheduler.cancel();

        // Then: no attempt ever runs
        assert_eq!(h.scheduler.state(), SchedulerState::Idle);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(h.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.scheduler.state(), SchedulerState::Idle);
        while let Ok(event) = h.events.try_recv() {
            assert!(matches!(event.kind, SchedulerEventKind::Scheduled { .. }));
        }
    }
}
