//! Discovery state and its per-cycle transitions.
//!
//! Transitions take the state by value and return the next state, so each one
//! can be tested on its own and no stage mutates shared globals.

use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;

use crate::error::{DiscoveryError, ErrorKind};
use crate::quota::{QuotaEntry, QuotaSnapshot};

/// Shared state type alias
pub type SharedState = Arc<RwLock<DiscoveryState>>;

/// Last failure, kept for diagnostics only
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LastError {
    pub kind: ErrorKind,
    pub message: String,
}

/// What changed when a snapshot was applied
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Applied {
    /// The server reported an active model different from the last one seen
    pub active_model_changed: Option<String>,
    /// `selected_model` was rewritten by the sync
    pub selected_model_changed: bool,
}

/// Process-wide view maintained by one pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryState {
    /// Model the user wants displayed
    pub selected_model: String,
    /// Last active model reported by the server
    pub last_known_active_model: Option<String>,
    /// Latest successful snapshot (empty until the first success)
    pub latest_snapshot: QuotaSnapshot,
    /// Error from the most recent failed cycle, cleared on success
    pub last_error: Option<LastError>,
    /// Failed cycles since the last success
    pub consecutive_failures: u32,
}

impl DiscoveryState {
    /// Fresh state with `default_model` selected
    pub fn new(default_model: impl Into<String>) -> Self {
        Self {
            selected_model: default_model.into(),
            last_known_active_model: None,
            latest_snapshot: QuotaSnapshot::default(),
            last_error: None,
            consecutive_failures: 0,
        }
    }

    /// Wrap a fresh state for sharing
    pub fn shared(default_model: impl Into<String>) -> SharedState {
        Arc::new(RwLock::new(Self::new(default_model)))
    }

    /// Apply a successful cycle.
    ///
    /// The snapshot replaces the previous one wholesale. `selected_model`
    /// follows the server only when its active model changes, so a manual
    /// override survives cycles that repeat the same active model. An absent
    /// active model leaves both model fields untouched.
    pub fn apply_snapshot(mut self, snapshot: QuotaSnapshot) -> (Self, Applied) {
        let mut applied = Applied::default();

        if let Some(active) = &snapshot.active_model {
            if self.last_known_active_model.as_ref() != Some(active) {
                applied.active_model_changed = Some(active.clone());
                if self.selected_model != *active {
                    self.selected_model = active.clone();
                    applied.selected_model_changed = true;
                }
            }
            self.last_known_active_model = Some(active.clone());
        }

        self.latest_snapshot = snapshot;
        self.last_error = None;
        self.consecutive_failures = 0;
        (self, applied)
    }

    /// Apply a failed cycle: only the diagnostic fields change
    pub fn record_failure(mut self, error: &DiscoveryError) -> Self {
        self.last_error = Some(LastError {
            kind: error.kind(),
            message: error.to_string(),
        });
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self
    }

    /// Manual override from the model picker
    pub fn select_model(mut self, model: impl Into<String>) -> Self {
        self.selected_model = model.into();
        self
    }

    /// Quota entry of the selected model in the latest snapshot
    pub fn selected_entry(&self) -> Option<&QuotaEntry> {
        self.latest_snapshot.entry(&self.selected_model)
    }
}

/// Replace the state behind `shared` with `f(state)`
pub(crate) fn transition<R>(
    shared: &SharedState,
    f: impl FnOnce(DiscoveryState) -> (DiscoveryState, R),
) -> R {
    let mut guard = shared.write();
    let current = std::mem::replace(&mut *guard, DiscoveryState::new(String::new()));
    let (next, result) = f(current);
    *guard = next;
    result
}
