//! Timer-driven loop that keeps running cycles until shutdown.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use super::Pipeline;

/// Handles the poller listens on besides its own timer
pub(crate) struct PollerSignals {
    /// Explicit refresh requests
    pub refresh: Arc<Notify>,
    /// Flips to `true` on shutdown
    pub shutdown: watch::Receiver<bool>,
}

/// Start polling in a background task.
///
/// The first tick fires immediately, giving the startup fetch. Shutdown stops
/// future cycles but lets an in-flight cycle finish.
pub(crate) fn spawn(
    pipeline: Arc<Pipeline>,
    interval: Duration,
    signals: PollerSignals,
) -> JoinHandle<()> {
    tokio::spawn(run(pipeline, interval, signals))
}

/// Shortest period the timer accepts; a zero period would panic the task
const MIN_INTERVAL: Duration = Duration::from_secs(1);

async fn run(pipeline: Arc<Pipeline>, interval: Duration, signals: PollerSignals) {
    let PollerSignals {
        refresh,
        mut shutdown,
    } = signals;

    let mut ticker = tokio::time::interval(interval.max(MIN_INTERVAL));
    // A cycle that overruns the interval must not cause a burst of catch-up cycles
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        if *shutdown.borrow() {
            break;
        }

        // Registered before waiting so a refresh sent from now on is not lost;
        // refreshes sent while a cycle ran were already rejected by the caller
        let notified = refresh.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        tokio::select! {
            _ = ticker.tick() => debug!("Poller: timer tick"),
            _ = &mut notified => debug!("Poller: refresh requested"),
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        }

        pipeline.run_once().await;
    }

    debug!("Poller: stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::CoreEvent;
    use crate::pipeline::cycle::tests::{payload, FakeBackend};
    use crate::state::DiscoveryState;
    use tokio::sync::broadcast;

    fn setup() -> (Arc<Pipeline>, broadcast::Receiver<CoreEvent>) {
        let backend = FakeBackend::new(vec![4000]).answer(4000, payload(None, &[("A", 0.5)]));
        let (tx, rx) = broadcast::channel(64);
        let pipeline = Pipeline::new(Arc::new(backend), DiscoveryState::shared("Default"), tx);
        (Arc::new(pipeline), rx)
    }

    #[tokio::test]
    async fn test_immediate_first_cycle_and_shutdown() {
        let (pipeline, mut rx) = setup();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = spawn(
            pipeline.clone(),
            Duration::from_secs(3600),
            PollerSignals {
                refresh: Arc::new(Notify::new()),
                shutdown: shutdown_rx,
            },
        );

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event, CoreEvent::SnapshotUpdated);

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_refresh_triggers_extra_cycle() {
        let (pipeline, mut rx) = setup();
        let refresh = Arc::new(Notify::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = spawn(
            pipeline.clone(),
            Duration::from_secs(3600),
            PollerSignals {
                refresh: refresh.clone(),
                shutdown: shutdown_rx,
            },
        );

        let first = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await;
        assert!(matches!(first, Ok(Ok(CoreEvent::SnapshotUpdated))));

        refresh.notify_waiters();
        let second = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await;
        assert!(matches!(second, Ok(Ok(CoreEvent::SnapshotUpdated))));

        drop(shutdown_tx);
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_zero_interval_is_clamped() {
        let (pipeline, mut rx) = setup();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = spawn(
            pipeline,
            Duration::ZERO,
            PollerSignals {
                refresh: Arc::new(Notify::new()),
                shutdown: shutdown_rx,
            },
        );

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await;
        assert!(matches!(event, Ok(Ok(CoreEvent::SnapshotUpdated))));
        assert!(!handle.is_finished());

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_refresh_before_start_is_not_stored() {
        let (pipeline, mut rx) = setup();
        let refresh = Arc::new(Notify::new());
        refresh.notify_waiters();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = spawn(
            pipeline,
            Duration::from_secs(3600),
            PollerSignals {
                refresh,
                shutdown: shutdown_rx,
            },
        );

        let first = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await;
        assert!(matches!(first, Ok(Ok(CoreEvent::SnapshotUpdated))));
        // Only the startup cycle runs
        let second = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
        assert!(second.is_err());

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_timer_drives_cycles() {
        let (pipeline, mut rx) = setup();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let _handle = spawn(
            pipeline,
            Duration::from_millis(20),
            PollerSignals {
                refresh: Arc::new(Notify::new()),
                shutdown: shutdown_rx,
            },
        );

        for _ in 0..3 {
            let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(event, CoreEvent::SnapshotUpdated);
        }
    }
}
