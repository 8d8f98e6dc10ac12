//! The recovery orchestrator.
//!
//! One explicitly owned instance per application session. It is the only
//! writer of the health window, the global error slot and the offline flag;
//! the connectivity monitor is the only writer of connectivity state. Every
//! other component gets snapshots or plain values.
//!
//! Background work is a single pump task that folds scheduler events and
//! connectivity changes back into the orchestrator. It holds a weak reference,
//! so dropping the last [`RecoveryOrchestrator`] handle tears everything down.

use crate::category::{RecoveryStrategy, Severity};
use crate::classifier::{AmbientContext, Classifier, RawFailure};
use crate::connectivity::{
    ConnectivityMonitor, ConnectivitySignal, ConnectivityState, ConnectivityStatus, LinkProbe,
};
use crate::error::{RecoveryError, RecoveryResult};
use crate::escalation::{EscalationGenerator, EscalationTrigger, HealthSignals, SupportEscalation};
use crate::health::{HealthTracker, ResolutionMethod};
use crate::messages::{MessageCatalog, TableCatalog};
use crate::offline::{FileOfflineStore, MemoryOfflineStore, OfflineFlag, OfflineStore};
use crate::record::ErrorRecord;
use crate::retry::RetryPolicy;
use crate::scheduler::{RecoveryAction, RetryScheduler, SchedulerEvent, SchedulerEventKind, SchedulerState};
use crate::settings::EngineSettings;
use crate::strategy::StrategySelector;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const EVENT_CAPACITY: usize = 64;

/// Reactive view for rendering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecoverySnapshot {
    pub current_error: Option<ErrorRecord>,
    pub is_recovering: bool,
    pub connectivity: ConnectivityState,
    pub error_rate: f64,
    pub frustration_score: f64,
    pub offline_mode: bool,
    /// Pre-empted errors waiting for the global slot.
    pub parked_errors: usize,
}

/// Notable transitions, for adapters that prefer a stream to the snapshot.
#[derive(Debug, Clone)]
pub enum RecoveryEvent {
    Reported { record: ErrorRecord, displayed: bool },
    RetryScheduled {
        error_id: Uuid,
        attempt: u32,
        delay: Duration,
    },
    RetrySucceeded { error_id: Uuid, attempts: u32 },
    RetryExhausted { error_id: Uuid, retry_count: u32 },
    Escalated(Box<SupportEscalation>),
    ConnectivityChanged(ConnectivityState),
    Cleared { error_id: Uuid },
}

/// Result of a manual [`RecoveryOrchestrator::retry`].
#[derive(Debug, Clone, PartialEq)]
pub enum RetryOutcome {
    Succeeded,
    Failed {
        retry_count: u32,
        exhausted: bool,
        failure: RawFailure,
    },
}

struct TrackedError {
    record: ErrorRecord,
    action: Option<Arc<dyn RecoveryAction>>,
    scheduler: Option<RetryScheduler>,
    escalated: bool,
}

struct Inner {
    health: HealthTracker,
    records: HashMap<Uuid, TrackedError>,
    current: Option<Uuid>,
    parked: Vec<Uuid>,
    connectivity: ConnectivityState,
    offline_mode: bool,
    manual_retry: Option<Uuid>,
    shut_down: bool,
}

impl Inner {
    fn current(&self) -> Option<&TrackedError> {
        self.current.and_then(|id| self.records.get(&id))
    }

    fn signals(&self) -> HealthSignals {
        HealthSignals {
            frustration_score: self.health.frustration_score(),
            error_rate: self.health.error_rate(),
        }
    }

    /// Give the global slot to the most severe parked error still tracked.
    fn promote_parked(&mut self) -> Option<Uuid> {
        let records = &self.records;
        self.parked.retain(|id| records.contains_key(id));
        let next = self
            .parked
            .iter()
            .enumerate()
            .max_by_key(|(index, id)| {
                let severity = records
                    .get(*id)
                    .map_or(Severity::Low, |tracked| tracked.record.severity());
                (severity, *index)
            })
            .map(|(index, id)| (index, *id));
        self.current = next.map(|(index, id)| {
            self.parked.remove(index);
            id
        });
        self.current
    }

    fn forget(&mut self, id: Uuid) {
        self.records.remove(&id);
        self.parked.retain(|parked| *parked != id);
        if self.current == Some(id) {
            self.promote_parked();
        }
    }
}

struct Shared {
    settings: EngineSettings,
    classifier: Classifier,
    escalation: EscalationGenerator,
    monitor: ConnectivityMonitor,
    offline_store: Arc<dyn OfflineStore>,
    scheduler_connectivity: watch::Receiver<ConnectivityState>,
    // Keeps the always-online channel open when offline support is disabled.
    _always_online: Option<watch::Sender<ConnectivityState>>,
    scheduler_tx: mpsc::UnboundedSender<SchedulerEvent>,
    snapshot_tx: watch::Sender<RecoverySnapshot>,
    events_tx: broadcast::Sender<RecoveryEvent>,
    next_run_id: AtomicU64,
    shutdown: CancellationToken,
    inner: Mutex<Inner>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: RecoveryEvent) {
        // No receivers is fine.
        let _ = self.events_tx.send(event);
    }

    fn snapshot(&self, inner: &Inner) -> RecoverySnapshot {
        let is_recovering = inner.manual_retry.is_some()
            || inner.records.values().any(|tracked| {
                tracked
                    .scheduler
                    .as_ref()
                    .is_some_and(|scheduler| scheduler.state().is_active())
            });
        RecoverySnapshot {
            current_error: inner.current().map(|tracked| tracked.record.clone()),
            is_recovering,
            connectivity: inner.connectivity.clone(),
            error_rate: inner.health.error_rate(),
            frustration_score: inner.health.frustration_score(),
            offline_mode: inner.offline_mode,
            parked_errors: inner.parked.len(),
        }
    }

    fn publish(&self, inner: &Inner) {
        self.snapshot_tx.send_replace(self.snapshot(inner));
    }

    fn spawn_scheduler(
        &self,
        record: &ErrorRecord,
        action: Arc<dyn RecoveryAction>,
        retry_count: u32,
    ) -> RetryScheduler {
        let policy = RetryPolicy::for_category(record.category(), &self.settings.retry)
            .with_max_retries(record.max_retries());
        let run_id = self.next_run_id.fetch_add(1, Ordering::Relaxed);
        RetryScheduler::spawn(
            record.id(),
            run_id,
            policy,
            retry_count,
            action,
            self.scheduler_connectivity.clone(),
            self.scheduler_tx.clone(),
        )
    }

    fn escalate_locked(
        &self,
        inner: &mut Inner,
        id: Uuid,
        trigger: EscalationTrigger,
    ) -> Option<SupportEscalation> {
        let signals = inner.signals();
        let tracked = inner.records.get_mut(&id)?;
        let escalation =
            self.escalation
                .generate(&tracked.record, signals, trigger, Some(Utc::now()));
        tracked.escalated = true;
        inner.health.resolve(id, ResolutionMethod::Escalation, Utc::now());
        tracing::warn!(
            error_id = %id,
            ticket_id = %escalation.ticket_id,
            channel = %escalation.channel,
            trigger = ?trigger,
            "error escalated to support"
        );
        self.emit(RecoveryEvent::Escalated(Box::new(escalation.clone())));
        Some(escalation)
    }

    /// Critical records that list contact_support escalate as soon as one
    /// recovery cycle has failed.
    fn escalate_if_critical(&self, inner: &mut Inner, id: Uuid) {
        let due = inner.records.get(&id).is_some_and(|tracked| {
            !tracked.escalated
                && tracked.record.severity() == Severity::Critical
                && tracked
                    .record
                    .category()
                    .candidate_strategies()
                    .contains(&RecoveryStrategy::ContactSupport)
        });
        if due {
            self.escalate_locked(inner, id, EscalationTrigger::CriticalFailure);
        }
    }

    fn resolve_success(&self, inner: &mut Inner, id: Uuid, attempts: u32) {
        inner.health.resolve(id, ResolutionMethod::RetrySuccess, Utc::now());
        inner.health.record_success();
        inner.forget(id);
        tracing::info!(error_id = %id, attempts, "error recovered");
        self.emit(RecoveryEvent::RetrySucceeded {
            error_id: id,
            attempts,
        });
    }

    fn set_retry_count(inner: &mut Inner, id: Uuid, retry_count: u32) {
        if let Some(tracked) = inner.records.get_mut(&id) {
            tracked.record.set_retry_count(retry_count);
        }
        inner.health.update_retry_count(id, retry_count);
    }

    fn on_scheduler_event(&self, event: SchedulerEvent) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        if inner.shut_down {
            return;
        }
        let id = event.error_id;
        let is_live = inner.records.get(&id).is_some_and(|tracked| {
            tracked
                .scheduler
                .as_ref()
                .is_some_and(|scheduler| scheduler.run_id() == event.run_id && !scheduler.is_cancelled())
        });
        if !is_live {
            return;
        }

        match event.kind {
            SchedulerEventKind::Scheduled { attempt, delay } => {
                Self::set_retry_count(inner, id, attempt);
                self.emit(RecoveryEvent::RetryScheduled {
                    error_id: id,
                    attempt,
                    delay,
                });
            }
            SchedulerEventKind::AttemptFailed { retry_count, .. } => {
                Self::set_retry_count(inner, id, retry_count);
                self.escalate_if_critical(inner, id);
            }
            SchedulerEventKind::Succeeded { attempts } => {
                self.resolve_success(inner, id, attempts);
            }
            SchedulerEventKind::Exhausted { retry_count } => {
                Self::set_retry_count(inner, id, retry_count);
                self.emit(RecoveryEvent::RetryExhausted {
                    error_id: id,
                    retry_count,
                });
                let visible = inner.current == Some(id) || inner.parked.contains(&id);
                if !visible {
                    inner.records.remove(&id);
                }
            }
            SchedulerEventKind::Suspended { .. } | SchedulerEventKind::AttemptStarted { .. } => {}
        }
        self.publish(inner);
    }

    fn on_connectivity(&self, state: ConnectivityState) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        if inner.shut_down {
            return;
        }
        inner.connectivity = state.clone();
        for tracked in inner.records.values_mut() {
            StrategySelector::apply(&mut tracked.record, state.status);
        }

        if self.settings.enable_offline_support {
            if state.is_offline() && !inner.offline_mode {
                inner.offline_mode = true;
                self.persist_offline(true);
            } else if !state.is_offline() && inner.offline_mode {
                inner.offline_mode = false;
                self.persist_offline(false);
            }
        }

        self.emit(RecoveryEvent::ConnectivityChanged(state));
        self.publish(inner);
    }

    fn persist_offline(&self, offline: bool) {
        let result = if offline {
            self.offline_store
                .save(&OfflineFlag::offline_since(Utc::now()))
        } else {
            self.offline_store.clear()
        };
        match result {
            Ok(()) => tracing::info!(offline, "offline mode updated"),
            Err(err) => tracing::warn!(offline, error = %err, "failed to persist offline flag"),
        }
    }
}

async fn pump(
    shared: Weak<Shared>,
    mut scheduler_rx: mpsc::UnboundedReceiver<SchedulerEvent>,
    mut connectivity_rx: watch::Receiver<ConnectivityState>,
    shutdown: CancellationToken,
) {
    let mut watching = true;
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            event = scheduler_rx.recv() => {
                let Some(event) = event else { break };
                let Some(shared) = shared.upgrade() else { break };
                shared.on_scheduler_event(event);
            }
            changed = connectivity_rx.changed(), if watching => {
                if changed.is_err() {
                    watching = false;
                    continue;
                }
                let state = connectivity_rx.borrow_and_update().clone();
                let Some(shared) = shared.upgrade() else { break };
                shared.on_connectivity(state);
            }
        }
    }
    tracing::debug!("recovery event pump stopped");
}

/// Builder for [`RecoveryOrchestrator`].
pub struct RecoveryOrchestratorBuilder {
    settings: EngineSettings,
    catalog: Option<Arc<dyn MessageCatalog>>,
    offline_store: Option<Arc<dyn OfflineStore>>,
    initially_online: bool,
    probe: Option<(Arc<dyn LinkProbe>, Duration)>,
}

impl Default for RecoveryOrchestratorBuilder {
    fn default() -> Self {
        Self {
            settings: EngineSettings::default(),
            catalog: None,
            offline_store: None,
            initially_online: true,
            probe: None,
        }
    }
}

impl RecoveryOrchestratorBuilder {
    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn MessageCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_offline_store(mut self, store: Arc<dyn OfflineStore>) -> Self {
        self.offline_store = Some(store);
        self
    }

    pub fn with_initially_online(mut self, online: bool) -> Self {
        self.initially_online = online;
        self
    }

    /// Poll `probe` for link quality every `interval`.
    pub fn with_probe(mut self, probe: Arc<dyn LinkProbe>, interval: Duration) -> Self {
        self.probe = Some((probe, interval));
        self
    }

    /// Start the orchestrator. Must be called inside a tokio runtime.
    pub fn build(self) -> RecoveryOrchestrator {
        let settings = self.settings;
        let offline_store: Arc<dyn OfflineStore> = match self.offline_store {
            Some(store) => store,
            None => match &settings.offline_flag_path {
                Some(path) => Arc::new(FileOfflineStore::new(path.clone())),
                None => Arc::new(MemoryOfflineStore::new()),
            },
        };

        let persisted_offline = settings.enable_offline_support
            && match offline_store.load() {
                Ok(flag) => flag.is_some_and(|flag| flag.offline),
                Err(err) => {
                    tracing::warn!(error = %err, "ignoring unreadable offline flag");
                    false
                }
            };
        let online = self.initially_online && !persisted_offline;

        let monitor = match self.probe {
            Some((probe, interval)) => ConnectivityMonitor::start_with_probe(
                settings.connectivity.clone(),
                online,
                probe,
                interval,
            ),
            None => ConnectivityMonitor::start(settings.connectivity.clone(), online),
        };
        let connectivity = monitor.current();

        let (scheduler_connectivity, always_online) = if settings.enable_offline_support {
            (monitor.subscribe(), None)
        } else {
            let (tx, rx) = watch::channel(ConnectivityState::online());
            (rx, Some(tx))
        };

        let offline_mode = settings.enable_offline_support && connectivity.is_offline();
        if offline_mode && !persisted_offline {
            if let Err(err) = offline_store.save(&OfflineFlag::offline_since(Utc::now())) {
                tracing::warn!(error = %err, "failed to persist offline flag");
            }
        }

        let catalog = self
            .catalog
            .unwrap_or_else(|| Arc::new(TableCatalog::builtin()));
        let classifier = Classifier::new(catalog, settings.retry.max_retries);
        let escalation = EscalationGenerator::new(settings.support.clone());
        let inner = Inner {
            health: HealthTracker::new(settings.health.clone()),
            records: HashMap::new(),
            current: None,
            parked: Vec::new(),
            connectivity,
            offline_mode,
            manual_retry: None,
            shut_down: false,
        };

        let (scheduler_tx, scheduler_rx) = mpsc::unbounded_channel();
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let connectivity_rx = monitor.subscribe();
        let shutdown = CancellationToken::new();

        let shared = Arc::new(Shared {
            settings,
            classifier,
            escalation,
            monitor,
            offline_store,
            scheduler_connectivity,
            _always_online: always_online,
            scheduler_tx,
            snapshot_tx: watch::channel(RecoverySnapshot {
                current_error: None,
                is_recovering: false,
                connectivity: inner.connectivity.clone(),
                error_rate: 0.0,
                frustration_score: 0.0,
                offline_mode: inner.offline_mode,
                parked_errors: 0,
            })
            .0,
            events_tx,
            next_run_id: AtomicU64::new(1),
            shutdown: shutdown.clone(),
            inner: Mutex::new(inner),
        });

        tokio::spawn(pump(
            Arc::downgrade(&shared),
            scheduler_rx,
            connectivity_rx,
            shutdown,
        ));
        tracing::debug!(online, offline_mode, "recovery orchestrator started");

        RecoveryOrchestrator { shared }
    }
}

/// Process-wide recovery façade. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct RecoveryOrchestrator {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for RecoveryOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryOrchestrator")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

impl RecoveryOrchestrator {
    pub fn builder() -> RecoveryOrchestratorBuilder {
        RecoveryOrchestratorBuilder::default()
    }

    /// Start with settings read from the environment.
    pub fn from_env() -> Self {
        Self::builder()
            .with_settings(EngineSettings::global().clone())
            .build()
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.shared.settings
    }

    /// Classify and track a failure with no retry action attached.
    pub fn report(&self, raw: RawFailure, context: AmbientContext) -> RecoveryResult<ErrorRecord> {
        self.report_inner(raw, context, None)
    }

    /// Classify and track a failure; auto-recoverable categories start
    /// retrying `action` right away.
    pub fn report_with_action(
        &self,
        raw: RawFailure,
        context: AmbientContext,
        action: Arc<dyn RecoveryAction>,
    ) -> RecoveryResult<ErrorRecord> {
        self.report_inner(raw, context, Some(action))
    }

    fn report_inner(
        &self,
        raw: RawFailure,
        mut context: AmbientContext,
        action: Option<Arc<dyn RecoveryAction>>,
    ) -> RecoveryResult<ErrorRecord> {
        let shared = &self.shared;
        let mut guard = shared.lock();
        let inner = &mut *guard;
        if inner.shut_down {
            return Err(RecoveryError::ShutDown);
        }

        let status = inner.connectivity.status;
        if context.connectivity == ConnectivityStatus::Online {
            context.connectivity = status;
        }
        let mut record = shared.classifier.classify(&raw, &context);
        StrategySelector::apply(&mut record, context.connectivity);
        if shared.settings.log_errors {
            record.log();
        }
        let id = record.id();
        let now = Utc::now();

        if let Some(key) = record.operation_key() {
            let superseded = inner
                .records
                .iter()
                .find(|(_, tracked)| tracked.record.operation_key() == Some(key))
                .map(|(id, _)| *id);
            if let Some(old) = superseded {
                tracing::debug!(error_id = %old, operation = key, "superseding earlier report");
                inner.records.remove(&old);
                inner.parked.retain(|parked| *parked != old);
            }
        }

        let update = inner.health.record(record.clone(), now);

        let showing = inner
            .current()
            .map(|current| (current.record.id(), current.record.severity()));
        let displayed = match showing {
            None => true,
            Some((preempted, severity)) if record.severity() > severity => {
                inner.parked.push(preempted);
                tracing::debug!(error_id = %preempted, "global error parked");
                true
            }
            Some(_) => false,
        };
        if displayed {
            inner.current = Some(id);
        }

        let scheduler = match &action {
            Some(action) if record.can_auto_recover() => {
                Some(shared.spawn_scheduler(&record, action.clone(), 0))
            }
            _ => None,
        };
        if displayed || scheduler.is_some() {
            inner.records.insert(
                id,
                TrackedError {
                    record: record.clone(),
                    action,
                    scheduler,
                    escalated: false,
                },
            );
        }

        shared.emit(RecoveryEvent::Reported {
            record: record.clone(),
            displayed,
        });

        let threshold = shared.settings.health.escalation_threshold;
        if update.current > threshold {
            let due = inner.current().filter(|current| !current.escalated).map(|c| c.record.id());
            if let Some(current) = due {
                shared.escalate_locked(inner, current, EscalationTrigger::Frustration);
            }
        }

        shared.publish(inner);
        Ok(record)
    }

    /// Run one recovery attempt for the current global error right away.
    ///
    /// Uses `action` if given (and remembers it), otherwise the action the
    /// error was reported with. A failure on an auto-recoverable error that
    /// still has budget restarts automatic retries from the new count.
    ///
    /// Only one manual retry runs at a time; a second call made while one is
    /// in flight returns [`RecoveryError::RetryInProgress`] without running
    /// the action.
    pub async fn retry(
        &self,
        action: Option<Arc<dyn RecoveryAction>>,
    ) -> RecoveryResult<RetryOutcome> {
        let shared = &self.shared;
        let (id, action, previous_count) = {
            let mut guard = shared.lock();
            let inner = &mut *guard;
            if inner.shut_down {
                return Err(RecoveryError::ShutDown);
            }
            if let Some(error_id) = inner.manual_retry {
                return Err(RecoveryError::RetryInProgress { error_id });
            }
            let id = inner.current.ok_or(RecoveryError::NoActiveError)?;
            let tracked = inner
                .records
                .get_mut(&id)
                .ok_or(RecoveryError::NoActiveError)?;
            let action = match action {
                Some(action) => {
                    tracked.action = Some(action.clone());
                    action
                }
                None => tracked
                    .action
                    .clone()
                    .ok_or_else(|| RecoveryError::no_recovery_action(id))?,
            };
            if let Some(scheduler) = tracked.scheduler.take() {
                scheduler.cancel();
            }
            let previous_count = tracked.record.retry_count();
            inner.manual_retry = Some(id);
            shared.publish(inner);
            (id, action, previous_count)
        };

        tracing::debug!(error_id = %id, "manual retry started");
        let result = action.run().await;

        let mut guard = shared.lock();
        let inner = &mut *guard;
        inner.manual_retry = None;
        let retry_count = inner
            .records
            .get(&id)
            .map_or(previous_count, |tracked| tracked.record.retry_count())
            + 1;
        let outcome = match result {
            Ok(()) => {
                shared.resolve_success(inner, id, retry_count);
                RetryOutcome::Succeeded
            }
            Err(failure) => {
                Shared::set_retry_count(inner, id, retry_count);
                let mut exhausted = true;
                if let Some(tracked) = inner.records.get_mut(&id) {
                    exhausted = tracked.record.retries_exhausted();
                    if tracked.record.can_auto_recover() && !exhausted && !inner.shut_down {
                        tracked.scheduler =
                            Some(shared.spawn_scheduler(&tracked.record, action, retry_count));
                    }
                }
                tracing::info!(error_id = %id, retry_count, exhausted, error = %failure.message, "manual retry failed");
                shared.escalate_if_critical(inner, id);
                RetryOutcome::Failed {
                    retry_count,
                    exhausted,
                    failure,
                }
            }
        };
        shared.publish(inner);
        Ok(outcome)
    }

    /// Resolve the current global error by hand. Returns its id, or `None`
    /// if nothing was showing.
    pub fn clear(&self) -> Option<Uuid> {
        let shared = &self.shared;
        let mut guard = shared.lock();
        let inner = &mut *guard;
        let id = inner.current?;
        let now = Utc::now();
        inner.health.resolve(id, ResolutionMethod::ManualClear, now);
        inner.health.decay(shared.settings.health.clear_decay, now);
        inner.current = None;
        inner.records.remove(&id);
        let promoted = inner.promote_parked();
        tracing::info!(error_id = %id, promoted = ?promoted, "global error cleared");
        shared.emit(RecoveryEvent::Cleared { error_id: id });
        shared.publish(inner);
        Some(id)
    }

    /// Build a support escalation for the current global error.
    pub fn escalate(&self) -> RecoveryResult<SupportEscalation> {
        let shared = &self.shared;
        let mut guard = shared.lock();
        let inner = &mut *guard;
        if inner.shut_down {
            return Err(RecoveryError::ShutDown);
        }
        let id = inner.current.ok_or(RecoveryError::NoActiveError)?;
        let escalation = shared
            .escalate_locked(inner, id, EscalationTrigger::Manual)
            .ok_or(RecoveryError::NoActiveError)?;
        shared.publish(inner);
        Ok(escalation)
    }

    /// Contextual hints to render next to `record`.
    pub fn recommended_actions(&self, record: &ErrorRecord) -> Vec<String> {
        self.shared.classifier.catalog().recommended_actions(record)
    }

    /// Count a successful operation toward the error rate.
    pub fn report_success(&self) {
        let shared = &self.shared;
        shared.monitor.record_success();
        let mut inner = shared.lock();
        if inner.shut_down {
            return;
        }
        inner.health.record_success();
        shared.publish(&inner);
    }

    /// Feed a platform connectivity signal to the monitor.
    pub fn connectivity_signal(&self, signal: ConnectivitySignal) {
        self.shared.monitor.signal(signal);
    }

    pub fn set_online(&self, online: bool) {
        self.shared.monitor.set_online(online);
    }

    pub fn subscribe(&self) -> watch::Receiver<RecoverySnapshot> {
        self.shared.snapshot_tx.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<RecoveryEvent> {
        self.shared.events_tx.subscribe()
    }

    pub fn snapshot(&self) -> RecoverySnapshot {
        let inner = self.shared.lock();
        self.shared.snapshot(&inner)
    }

    pub fn connectivity(&self) -> ConnectivityState {
        self.shared.lock().connectivity.clone()
    }

    pub fn error_rate(&self) -> f64 {
        self.shared.lock().health.error_rate()
    }

    pub fn frustration_score(&self) -> f64 {
        self.shared.lock().health.frustration_score()
    }

    pub fn current_error(&self) -> Option<ErrorRecord> {
        self.shared.lock().current().map(|tracked| tracked.record.clone())
    }

    pub fn parked_errors(&self) -> Vec<ErrorRecord> {
        let inner = self.shared.lock();
        inner
            .parked
            .iter()
            .filter_map(|id| inner.records.get(id))
            .map(|tracked| tracked.record.clone())
            .collect()
    }

    pub fn offline_mode(&self) -> bool {
        self.shared.lock().offline_mode
    }

    /// Persisted offline flag, as stored.
    pub fn offline_flag(&self) -> RecoveryResult<Option<OfflineFlag>> {
        self.shared.offline_store.load()
    }

    /// Scheduler state of the current global error, if one is attached.
    pub fn retry_state(&self) -> Option<SchedulerState> {
        let id = self.shared.lock().current?;
        self.retry_state_of(id)
    }

    pub fn retry_state_of(&self, id: Uuid) -> Option<SchedulerState> {
        let inner = self.shared.lock();
        inner
            .records
            .get(&id)?
            .scheduler
            .as_ref()
            .map(RetryScheduler::state)
    }

    pub fn resolution_breakdown(&self) -> HashMap<ResolutionMethod, usize> {
        self.shared.lock().health.resolution_breakdown()
    }

    /// Cancel every scheduler, stop background tasks and reset counters.
    /// Idempotent; later reports fail with [`RecoveryError::ShutDown`].
    pub fn shutdown(&self) {
        let shared = &self.shared;
        let mut guard = shared.lock();
        let inner = &mut *guard;
        if inner.shut_down {
            return;
        }
        inner.shut_down = true;
        for tracked in inner.records.values() {
            if let Some(scheduler) = &tracked.scheduler {
                scheduler.cancel();
            }
        }
        inner.records.clear();
        inner.parked.clear();
        inner.current = None;
        inner.manual_retry = None;
        inner.health.reset();
        shared.shutdown.cancel();
        shared.monitor.shutdown();
        shared.publish(inner);
        tracing::debug!("recovery orchestrator shut down");
    }
}
