//! Core event system for push-based change notification.

use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use super::core::QuotaCore;
use crate::error::ErrorKind;
use crate::quota::QuotaSnapshot;

/// Events emitted by the core when state changes occur.
///
/// Consumers call [`QuotaCore::subscribe()`] to receive these events
/// via a `broadcast::Receiver`.
///
/// Serialized with an `event` tag, e.g.
/// `{"event":"fetch_failed","kind":"process_not_found","message":"..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CoreEvent {
    /// A cycle succeeded and the latest snapshot was replaced
    SnapshotUpdated,

    /// The server reported a different active model than last time
    ActiveModelChanged {
        /// Display name of the new active model
        model: String,
    },

    /// The selected model changed (server sync or manual override)
    SelectedModelChanged {
        /// Newly selected model
        model: String,
    },

    /// A cycle failed; the previous snapshot is still served
    FetchFailed {
        /// Stage that failed
        kind: ErrorKind,
        /// Human-readable cause
        message: String,
    },
}

impl QuotaCore {
    /// Subscribe to core events.
    ///
    /// If the receiver falls behind, older events are dropped (lagged).
    pub fn subscribe(&self) -> broadcast::Receiver<CoreEvent> {
        self.event_sender().subscribe()
    }

    /// Call `callback` with every new snapshot.
    ///
    /// Runs until the core is dropped; abort the handle to stop earlier.
    pub fn on_snapshot_updated<F>(&self, callback: F) -> JoinHandle<()>
    where
        F: Fn(QuotaSnapshot) + Send + 'static,
    {
        let mut rx = self.snapshot_receiver();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let snapshot = rx.borrow_and_update().clone();
                callback(snapshot);
            }
        })
    }

    /// Call `callback` with the kind and message of every failed cycle
    pub fn on_fetch_failed<F>(&self, callback: F) -> JoinHandle<()>
    where
        F: Fn(ErrorKind, String) + Send + 'static,
    {
        let mut rx = self.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(CoreEvent::FetchFailed { kind, message }) => callback(kind, message),
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::builder::tests::fake_core;
    use crate::pipeline::cycle::tests::{payload, FakeBackend};
    use crate::DiscoveryError;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_subscribe_receives_events() {
        let core = fake_core(FakeBackend::new(vec![4000]).answer(4000, payload(None, &[("A", 0.5)])));
        let mut rx = core.subscribe();

        core.refresh_now().await;

        assert_eq!(rx.recv().await.unwrap(), CoreEvent::SnapshotUpdated);
    }

    #[tokio::test]
    async fn test_on_snapshot_updated_callback() {
        let core = fake_core(FakeBackend::new(vec![4000]).answer(4000, payload(None, &[("A", 0.25)])));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _handle = core.on_snapshot_updated(move |snapshot| {
            let _ = tx.send(snapshot.entries[0].percentage);
        });

        core.refresh_now().await;

        let pct = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap();
        assert_eq!(pct, Some(25));
    }

    #[tokio::test]
    async fn test_on_fetch_failed_callback() {
        let mut backend = FakeBackend::new(vec![4000]);
        backend.pid = Err(DiscoveryError::ProcessNotFound {
            name: "language_server".to_string(),
        });
        let core = fake_core(backend);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _handle = core.on_fetch_failed(move |kind, _message| {
            let _ = tx.send(kind);
        });

        core.refresh_now().await;

        let kind = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap();
        assert_eq!(kind, Some(ErrorKind::ProcessNotFound));
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let failed = CoreEvent::FetchFailed {
            kind: ErrorKind::TokenNotFound,
            message: "csrf token not found in command line of pid 7".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            serde_json::json!({
                "event": "fetch_failed",
                "kind": "token_not_found",
                "message": "csrf token not found in command line of pid 7"
            })
        );
        assert_eq!(
            serde_json::to_value(CoreEvent::SnapshotUpdated).unwrap(),
            serde_json::json!({ "event": "snapshot_updated" })
        );
    }

    #[test]
    fn test_no_subscribers_is_fine() {
        let core = fake_core(FakeBackend::new(vec![]));
        core.set_selected_model("X");
    }
}
