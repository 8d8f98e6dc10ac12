//! Rolling error history, lifetime error rate and frustration score.
//!
//! The frustration score is recomputed on every `record`/`resolve` from the
//! entries inside the trailing window:
//!
//! - 15 points per unresolved entry, capped at 60
//! - 25 points per critical entry
//! - 5 points per entry, capped at 50
//! - minus any clear decay credited inside the window
//!
//! and clamped to `[0, 100]`. All weights come from [`HealthSettings`].

use crate::category::Severity;
use crate::record::ErrorRecord;
use crate::settings::HealthSettings;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

/// How a health entry was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMethod {
    ManualClear,
    RetrySuccess,
    Escalation,
}

/// One record in the health window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthEntry {
    pub record: ErrorRecord,
    pub recorded_at: DateTime<Utc>,
    pub resolved: bool,
    pub resolution: Option<ResolutionMethod>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Score movement caused by one tracker update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthUpdate {
    pub previous: f64,
    pub current: f64,
}

impl HealthUpdate {
    /// True when this update moved the score from at-or-below to above
    /// `threshold`.
    pub fn crossed(&self, threshold: f64) -> bool {
        self.previous <= threshold && self.current > threshold
    }
}

/// Aggregate health tracker. Never fails; every signal is clamped.
#[derive(Debug, Clone)]
pub struct HealthTracker {
    settings: HealthSettings,
    entries: VecDeque<HealthEntry>,
    decay: VecDeque<(DateTime<Utc>, f64)>,
    error_count: u64,
    success_count: u64,
    frustration: f64,
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new(HealthSettings::default())
    }
}

impl HealthTracker {
    /// Create an empty tracker.
    pub fn new(settings: HealthSettings) -> Self {
        Self {
            settings,
            entries: VecDeque::new(),
            decay: VecDeque::new(),
            error_count: 0,
            success_count: 0,
            frustration: 0.0,
        }
    }

    pub fn settings(&self) -> &HealthSettings {
        &self.settings
    }

    /// Push a new error into the window.
    pub fn record(&mut self, record: ErrorRecord, now: DateTime<Utc>) -> HealthUpdate {
        self.error_count += 1;
        self.entries.push_back(HealthEntry {
            record,
            recorded_at: now,
            resolved: false,
            resolution: None,
            resolved_at: None,
        });
        let capacity = self.settings.capacity.max(1);
        while self.entries.len() > capacity {
            self.entries.pop_front();
        }
        self.recompute(now)
    }

    /// Mark the entry for `id` resolved. Returns `None` if no unresolved entry
    /// matched (evicted, unknown or already resolved).
    pub fn resolve(
        &mut self,
        id: Uuid,
        method: ResolutionMethod,
        now: DateTime<Utc>,
    ) -> Option<HealthUpdate> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.record.id() == id && !e.resolved)?;
        entry.resolved = true;
        entry.resolution = Some(method);
        entry.resolved_at = Some(now);
        tracing::debug!(error_id = %id, method = ?method, "health entry resolved");
        Some(self.recompute(now))
    }

    /// Count a successful operation toward the lifetime error rate.
    pub fn record_success(&mut self) {
        self.success_count += 1;
    }

    /// Credit `points` of frustration relief for the length of the window.
    pub fn decay(&mut self, points: f64, now: DateTime<Utc>) -> HealthUpdate {
        if points > 0.0 {
            self.decay.push_back((now, points));
        }
        self.recompute(now)
    }

    /// Keep the retry counter of a tracked record in step with its scheduler.
    pub fn update_retry_count(&mut self, id: Uuid, retry_count: u32) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.record.id() == id) {
            entry.record.set_retry_count(retry_count);
        }
    }

    /// Lifetime `errors / (errors + successes)`, 0 before any traffic.
    pub fn error_rate(&self) -> f64 {
        let total = self.error_count + self.success_count;
        if total == 0 {
            0.0
        } else {
            self.error_count as f64 / total as f64
        }
    }

    /// Errors recorded since start or the last reset.
    pub fn error_count(&self) -> u64 {
        self.error_count
    }

    /// Successful operations reported since start or the last reset.
    pub fn success_count(&self) -> u64 {
        self.success_count
    }

    /// Score as of the last update.
    pub fn frustration_score(&self) -> f64 {
        self.frustration
    }

    /// Entries in the window, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &HealthEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the entry with `id` is in the window and resolved.
    pub fn is_resolved(&self, id: Uuid) -> bool {
        self.entries
            .iter()
            .any(|e| e.record.id() == id && e.resolved)
    }

    /// Resolved entries currently in the window, by method.
    pub fn resolution_breakdown(&self) -> HashMap<ResolutionMethod, usize> {
        let mut breakdown = HashMap::new();
        for method in self.entries.iter().filter_map(|e| e.resolution) {
            *breakdown.entry(method).or_insert(0) += 1;
        }
        breakdown
    }

    /// Drop all history and counters.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.decay.clear();
        self.error_count = 0;
        self.success_count = 0;
        self.frustration = 0.0;
    }

    fn window(&self) -> ChronoDuration {
        ChronoDuration::from_std(self.settings.frustration_window)
            .unwrap_or_else(|_| ChronoDuration::minutes(5))
    }

    /// Recompute the frustration score as of `now`.
    pub fn recompute(&mut self, now: DateTime<Utc>) -> HealthUpdate {
        let window = self.window();
        let horizon = now - window;
        while self.decay.front().is_some_and(|(at, _)| *at < horizon) {
            self.decay.pop_front();
        }

        let recent: Vec<&HealthEntry> = self
            .entries
            .iter()
            .filter(|e| e.recorded_at >= horizon)
            .collect();
        let unresolved = recent.iter().filter(|e| !e.resolved).count() as f64;
        let critical = recent
            .iter()
            .filter(|e| e.record.severity() == Severity::Critical)
            .count() as f64;
        let volume = recent.len() as f64;
        let relief: f64 = self.decay.iter().map(|(_, points)| points).sum();

        let s = &self.settings;
        let raw = (unresolved * s.unresolved_weight).min(s.unresolved_cap)
            + critical * s.critical_weight
            + (volume * s.volume_weight).min(s.volume_cap)
            - relief;
        let score = if raw.is_finite() { raw.clamp(0.0, 100.0) } else { 0.0 };

        let previous = self.frustration;
        self.frustration = score;
        HealthUpdate {
            previous,
            current: score,
        }
    }
}
