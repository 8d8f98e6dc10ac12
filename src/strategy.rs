//! Recovery strategy selection.
//!
//! Candidates come from the category table; connectivity then filters them.
//! While offline, `retry` is replaced by `offline_mode` and `reload` is dropped,
//! since neither can succeed without a network round trip. An empty result is
//! valid and means manual handling only.

use crate::category::{ErrorCategory, RecoveryStrategy};
use crate::connectivity::ConnectivityStatus;
use crate::record::ErrorRecord;

/// Pure lookup-and-filter over the strategy table.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrategySelector;

impl StrategySelector {
    /// Ordered strategies for `category` under `connectivity`.
    pub fn select(category: ErrorCategory, connectivity: ConnectivityStatus) -> Vec<RecoveryStrategy> {
        let candidates = category.candidate_strategies();
        if !connectivity.is_offline() {
            return candidates.to_vec();
        }

        let mut selected = Vec::with_capacity(candidates.len());
        for strategy in candidates {
            let replacement = match strategy {
                RecoveryStrategy::Retry => Some(RecoveryStrategy::OfflineMode),
                RecoveryStrategy::Reload => None,
                other => Some(*other),
            };
            if let Some(strategy) = replacement {
                if !selected.contains(&strategy) {
                    selected.push(strategy);
                }
            }
        }
        selected
    }

    /// Strategies for an existing record.
    pub fn select_for(record: &ErrorRecord, connectivity: ConnectivityStatus) -> Vec<RecoveryStrategy> {
        Self::select(record.category(), connectivity)
    }

    /// Re-filter a record's strategies in place.
    pub fn apply(record: &mut ErrorRecord, connectivity: ConnectivityStatus) {
        let strategies = Self::select_for(record, connectivity);
        record.set_recovery_strategy(strategies);
    }
}
