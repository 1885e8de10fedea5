use super::action_queue::ActionQueue;
use crate::core::{ClusterError, Result};
use crate::member::MemberId;
use crate::store::{ActionRef, BackingStore};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tracing::{Level, event};

/// Owns one [`ActionQueue`] per member.
///
/// Every producer-side operation goes through the submission lock, so an
/// action broadcast to all queues lands in the same relative position on
/// each of them even when callers race. The lock never spans a backing-store
/// call; consumers do not take it.
pub struct ActionQueueList<S: BackingStore> {
    queues: RwLock<HashMap<MemberId, Arc<ActionQueue<S>>>>,
    submission: Mutex<()>,
}

impl<S: BackingStore> Default for ActionQueueList<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: BackingStore> ActionQueueList<S> {
    pub fn new() -> Self {
        Self {
            queues: RwLock::new(HashMap::new()),
            submission: Mutex::new(()),
        }
    }

    /// Create (or return the existing) queue for `member`.
    pub async fn create(&self, member: MemberId) -> Arc<ActionQueue<S>> {
        let mut queues = self.queues.write().await;
        Arc::clone(
            queues
                .entry(member)
                .or_insert_with(|| Arc::new(ActionQueue::new(member))),
        )
    }

    /// Remove and discard `member`'s queue.
    pub async fn remove(&self, member: MemberId) -> Option<Arc<ActionQueue<S>>> {
        let removed = self.queues.write().await.remove(&member);
        if let Some(queue) = &removed {
            let discarded = queue.clear().await;
            if discarded > 0 {
                event!(Level::DEBUG, member = %member, discarded, "queue discarded");
            }
        }
        removed
    }

    pub async fn clear(&self) {
        let drained: Vec<_> = self.queues.write().await.drain().collect();
        for (_, queue) in drained {
            queue.clear().await;
        }
    }

    pub async fn get(&self, member: MemberId) -> Option<Arc<ActionQueue<S>>> {
        self.queues.read().await.get(&member).cloned()
    }

    /// Take the submission lock for a sequence of queue mutations that must
    /// not interleave with other producers.
    pub async fn lock_submissions(&self) -> SubmissionGuard<'_, S> {
        SubmissionGuard {
            list: self,
            _guard: self.submission.lock().await,
        }
    }

    /// Queue `action` for one member.
    pub async fn queue(&self, member: MemberId, action: ActionRef<S>) -> Result<u64> {
        self.lock_submissions().await.queue(member, action).await
    }

    /// Queue `action` on every member's queue. Returns the number of queues reached.
    pub async fn queue_all(&self, action: ActionRef<S>) -> usize {
        self.lock_submissions().await.queue_all(action).await
    }

    /// Append a copy of `source`'s pending actions onto `dest`'s queue.
    pub async fn copy_from_to(&self, source: MemberId, dest: MemberId) -> Result<usize> {
        self.lock_submissions().await.copy_from_to(source, dest).await
    }

    pub async fn size_of(&self, member: MemberId) -> Option<usize> {
        match self.get(member).await {
            Some(queue) => Some(queue.len().await),
            None => None,
        }
    }

    /// Pending length of every queue, ordered by member id.
    pub async fn sizes(&self) -> Vec<(MemberId, usize)> {
        let queues: Vec<_> = self
            .queues
            .read()
            .await
            .iter()
            .map(|(id, queue)| (*id, Arc::clone(queue)))
            .collect();
        let mut sizes = Vec::with_capacity(queues.len());
        for (id, queue) in queues {
            sizes.push((id, queue.len().await));
        }
        sizes.sort_by_key(|(id, _)| *id);
        sizes
    }

    pub async fn total_pending(&self) -> usize {
        self.sizes().await.iter().map(|(_, len)| len).sum()
    }

    /// True while any queue still holds pending actions.
    pub async fn is_draining(&self) -> bool {
        self.total_pending().await > 0
    }

    pub async fn len(&self) -> usize {
        self.queues.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.queues.read().await.is_empty()
    }
}

/// Producer access to the queues while the submission lock is held.
pub struct SubmissionGuard<'a, S: BackingStore> {
    list: &'a ActionQueueList<S>,
    _guard: MutexGuard<'a, ()>,
}

impl<S: BackingStore> SubmissionGuard<'_, S> {
    pub async fn queue(&self, member: MemberId, action: ActionRef<S>) -> Result<u64> {
        let queue = self
            .list
            .get(member)
            .await
            .ok_or_else(|| ClusterError::MemberNotFound(member.to_string()))?;
        Ok(queue.push(action).await)
    }

    pub async fn queue_all(&self, action: ActionRef<S>) -> usize {
        let queues: Vec<_> = self.list.queues.read().await.values().cloned().collect();
        for queue in &queues {
            queue.push(Arc::clone(&action)).await;
        }
        queues.len()
    }

    pub async fn copy_from_to(&self, source: MemberId, dest: MemberId) -> Result<usize> {
        let from = self
            .list
            .get(source)
            .await
            .ok_or_else(|| ClusterError::MemberNotFound(source.to_string()))?;
        let to = self
            .list
            .get(dest)
            .await
            .ok_or_else(|| ClusterError::MemberNotFound(dest.to_string()))?;

        let actions = from
            .pending()
            .await
            .into_iter()
            .map(|entry| Arc::clone(entry.action()))
            .collect();
        let copied = to.extend(actions).await;
        event!(
            Level::DEBUG,
            source = %source,
            dest = %dest,
            copied,
            "queue copied"
        );
        Ok(copied)
    }
}
