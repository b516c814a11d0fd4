//! Reconciler configuration.

use std::collections::BTreeSet;
use std::time::Duration;

use daylock_core::LockType;

/// Configuration for the schedule reconciler.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Period of the reconciliation ticker. A lock transition at a schedule
    /// boundary may lag by up to one interval.
    pub tick_interval: Duration,
    /// Lock types whose gates drive the native control adapter
    pub focus_lock_types: BTreeSet<LockType>,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(30),
            focus_lock_types: LockType::ALL.into_iter().collect(),
        }
    }
}

impl ReconcilerConfig {
    /// Set the tick interval.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Set which gate types count as focus gates.
    pub fn with_focus_lock_types(mut self, types: impl IntoIterator<Item = LockType>) -> Self {
        self.focus_lock_types = types.into_iter().collect();
        self
    }

    /// Whether gates of this type drive the native adapter.
    pub fn is_focus(&self, lock_type: LockType) -> bool {
        self.focus_lock_types.contains(&lock_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_treats_every_gate_as_focus() {
        let config = ReconcilerConfig::default();
        assert_eq!(config.tick_interval, Duration::from_secs(30));
        assert!(LockType::ALL.iter().all(|t| config.is_focus(*t)));
    }

    #[test]
    fn builder_narrows_focus_types() {
        let config = ReconcilerConfig::default().with_focus_lock_types([LockType::Apps]);
        assert!(config.is_focus(LockType::Apps));
        assert!(!config.is_focus(LockType::Wifi));
    }
}
