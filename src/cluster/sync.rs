// Join synchronisation.
//
// A joining member is seeded from an existing one through a pair of actions
// queued under the submission lock: a capture marker at the tail of the
// source's queue and a restore action at the head of the newcomer's queue.
// Everything broadcast afterwards lands behind both, so the captured state is
// exactly "every action before the join" on the source.

use crate::core::{ClusterError, Result};
use crate::member::MemberId;
use crate::store::{Action, BackingStore, StoreSynchronizer, SyncSnapshot};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{Level, event};

type Slot = Option<SyncSnapshot>;

/// Builds the capture/restore pair for one join.
pub(crate) fn sync_pair<S: BackingStore>(
    synchronizer: Arc<dyn StoreSynchronizer<S>>,
    source: MemberId,
    target: MemberId,
    timeout: Duration,
) -> (CaptureAction<S>, RestoreAction<S>) {
    let (tx, rx) = watch::channel(None);
    (
        CaptureAction {
            synchronizer: Arc::clone(&synchronizer),
            slot: tx,
            target,
        },
        RestoreAction {
            synchronizer,
            slot: rx,
            source,
            timeout,
        },
    )
}

/// Runs on the source member: captures its state for the joining member.
pub(crate) struct CaptureAction<S: BackingStore> {
    synchronizer: Arc<dyn StoreSynchronizer<S>>,
    slot: watch::Sender<Slot>,
    target: MemberId,
}

#[async_trait]
impl<S: BackingStore> Action<S> for CaptureAction<S> {
    async fn apply(&self, store: &S) -> Result<()> {
        // Already captured on an earlier attempt; the slot is write-once.
        if self.slot.borrow().is_some() {
            return Ok(());
        }
        let snapshot = self.synchronizer.capture(store).await?;
        self.slot.send_replace(Some(snapshot));
        event!(Level::DEBUG, target = %self.target, "sync snapshot captured");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("capture for {}", self.target)
    }
}

/// Runs on the joining member: waits for the source snapshot and restores it.
pub(crate) struct RestoreAction<S: BackingStore> {
    synchronizer: Arc<dyn StoreSynchronizer<S>>,
    slot: watch::Receiver<Slot>,
    source: MemberId,
    timeout: Duration,
}

#[async_trait]
impl<S: BackingStore> Action<S> for RestoreAction<S> {
    async fn apply(&self, store: &S) -> Result<()> {
        let mut slot = self.slot.clone();
        let waited = tokio::time::timeout(self.timeout, async {
            slot.wait_for(Option::is_some)
                .await
                .map(|captured| captured.clone())
        })
        .await;
        let snapshot = match waited {
            Ok(Ok(captured)) => captured,
            Ok(Err(_)) => {
                return Err(ClusterError::SyncFailed(format!(
                    "source {} left before its state was captured",
                    self.source
                )));
            }
            Err(_) => {
                return Err(ClusterError::Timeout(format!(
                    "waiting {:?} for snapshot from {}",
                    self.timeout, self.source
                )));
            }
        };
        let Some(snapshot) = snapshot else {
            return Err(ClusterError::SyncFailed(format!(
                "empty snapshot from {}",
                self.source
            )));
        };

        if let Err(err) = self.synchronizer.restore(store, snapshot).await {
            event!(Level::ERROR, source = %self.source, error = %err, "sync restore failed");
            return Err(err);
        }
        event!(Level::INFO, source = %self.source, "member synchronised");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("restore from {}", self.source)
    }
}

/// Implicit synchronisation step when there is nothing to restore.
pub(crate) struct SyncMarker;

#[async_trait]
impl<S: BackingStore> Action<S> for SyncMarker {
    async fn apply(&self, _store: &S) -> Result<()> {
        Ok(())
    }

    fn describe(&self) -> String {
        "sync marker".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct Kv {
        value: Mutex<serde_json::Value>,
    }
    impl BackingStore for Kv {}

    struct CopyValue;

    #[async_trait]
    impl StoreSynchronizer<Kv> for CopyValue {
        async fn capture(&self, source: &Kv) -> Result<serde_json::Value> {
            Ok(source.value.lock().await.clone())
        }

        async fn restore(&self, target: &Kv, snapshot: serde_json::Value) -> Result<()> {
            *target.value.lock().await = snapshot;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_restore_receives_captured_state() {
        let (capture, restore) =
            sync_pair::<Kv>(Arc::new(CopyValue), MemberId(1), MemberId(2), Duration::from_secs(1));
        let source = Kv::default();
        *source.value.lock().await = json!({"rows": 3});
        let target = Kv::default();

        capture.apply(&source).await.unwrap();
        restore.apply(&target).await.unwrap();
        assert_eq!(*target.value.lock().await, json!({"rows": 3}));
    }

    #[tokio::test]
    async fn test_restore_times_out_without_capture() {
        let (_capture, restore) = sync_pair::<Kv>(
            Arc::new(CopyValue),
            MemberId(1),
            MemberId(2),
            Duration::from_millis(20),
        );
        let err = restore.apply(&Kv::default()).await.unwrap_err();
        assert!(matches!(err, ClusterError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_restore_fails_when_source_abandons() {
        let (capture, restore) = sync_pair::<Kv>(
            Arc::new(CopyValue),
            MemberId(1),
            MemberId(2),
            Duration::from_secs(5),
        );
        drop(capture);
        let err = restore.apply(&Kv::default()).await.unwrap_err();
        assert!(matches!(err, ClusterError::SyncFailed(_)));
    }

    #[tokio::test]
    async fn test_capture_is_write_once() {
        let (capture, restore) =
            sync_pair::<Kv>(Arc::new(CopyValue), MemberId(1), MemberId(2), Duration::from_secs(1));
        let source = Kv::default();
        *source.value.lock().await = json!(1);
        capture.apply(&source).await.unwrap();
        *source.value.lock().await = json!(2);
        capture.apply(&source).await.unwrap();

        let target = Kv::default();
        restore.apply(&target).await.unwrap();
        assert_eq!(*target.value.lock().await, json!(1));
    }
}
