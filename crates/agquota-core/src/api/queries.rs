//! Read-only queries on [`QuotaCore`].
//!
//! Every method clones out of the locked state, so callers never hold a lock.

use tokio::sync::watch;

use super::core::QuotaCore;
use crate::pipeline::CyclePhase;
use crate::quota::{QuotaEntry, QuotaSnapshot};
use crate::state::{DiscoveryState, LastError};

impl QuotaCore {
    /// Latest successful snapshot (empty before the first success)
    pub fn latest_snapshot(&self) -> QuotaSnapshot {
        self.state().read().latest_snapshot.clone()
    }

    /// Model the status display should show
    pub fn selected_model(&self) -> String {
        self.state().read().selected_model.clone()
    }

    /// Quota entry of the selected model, if the latest snapshot has one
    pub fn selected_entry(&self) -> Option<QuotaEntry> {
        self.state().read().selected_entry().cloned()
    }

    /// Last active model the server reported
    pub fn active_model(&self) -> Option<String> {
        self.state().read().last_known_active_model.clone()
    }

    /// Error of the most recent cycle, if it failed
    pub fn last_error(&self) -> Option<LastError> {
        self.state().read().last_error.clone()
    }

    /// Copy of the whole discovery state
    pub fn state_snapshot(&self) -> DiscoveryState {
        self.state().read().clone()
    }

    /// Phase of the current cycle (`Idle` between cycles)
    pub fn phase(&self) -> CyclePhase {
        self.pipeline().phase()
    }

    /// Watch channel that always holds the latest snapshot
    pub fn snapshot_receiver(&self) -> watch::Receiver<QuotaSnapshot> {
        self.pipeline().snapshot_receiver()
    }
}
