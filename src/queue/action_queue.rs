use crate::member::MemberId;
use crate::store::{ActionRef, BackingStore};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, Notify};
use tokio::sync::futures::Notified;

/// A queued action together with its position in one member's queue.
pub struct QueueEntry<S: BackingStore> {
    seq: u64,
    action: ActionRef<S>,
}

impl<S: BackingStore> Clone for QueueEntry<S> {
    fn clone(&self) -> Self {
        Self {
            seq: self.seq,
            action: Arc::clone(&self.action),
        }
    }
}

impl<S: BackingStore> QueueEntry<S> {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn action(&self) -> &ActionRef<S> {
        &self.action
    }

    /// True if both entries carry the same action instance.
    pub fn same_action(&self, other: &QueueEntry<S>) -> bool {
        same_action(&self.action, &other.action)
    }
}

/// Identity comparison of two action handles (data pointer only).
pub fn same_action<S: BackingStore>(a: &ActionRef<S>, b: &ActionRef<S>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

/// FIFO of pending actions for a single member.
///
/// Producers append at the tail; the member's consumer peeks the head,
/// applies it, and only then pops it, so a failed head stays in place for
/// a retry.
pub struct ActionQueue<S: BackingStore> {
    member: MemberId,
    entries: Mutex<VecDeque<QueueEntry<S>>>,
    ready: Notify,
    next_seq: AtomicU64,
}

impl<S: BackingStore> ActionQueue<S> {
    pub fn new(member: MemberId) -> Self {
        Self {
            member,
            entries: Mutex::new(VecDeque::new()),
            ready: Notify::new(),
            next_seq: AtomicU64::new(1),
        }
    }

    pub fn member(&self) -> MemberId {
        self.member
    }

    /// Append an action and wake the consumer. Returns the entry's sequence number.
    pub async fn push(&self, action: ActionRef<S>) -> u64 {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        self.entries.lock().await.push_back(QueueEntry { seq, action });
        self.ready.notify_one();
        seq
    }

    /// Append several actions, preserving their order.
    pub async fn extend(&self, actions: Vec<ActionRef<S>>) -> usize {
        let count = actions.len();
        if count == 0 {
            return 0;
        }
        let mut entries = self.entries.lock().await;
        for action in actions {
            let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
            entries.push_back(QueueEntry { seq, action });
        }
        drop(entries);
        self.ready.notify_one();
        count
    }

    /// Peek at the head of the queue.
    pub async fn head(&self) -> Option<QueueEntry<S>> {
        self.entries.lock().await.front().cloned()
    }

    /// Pop the head if it is still the entry with `seq`.
    pub async fn pop_head(&self, seq: u64) -> Option<QueueEntry<S>> {
        let mut entries = self.entries.lock().await;
        if entries.front().is_some_and(|entry| entry.seq == seq) {
            entries.pop_front()
        } else {
            None
        }
    }

    /// Pop the head with `seq` and run `on_remaining` with the new length
    /// while producers are still locked out.
    pub(crate) async fn complete_head<F>(&self, seq: u64, on_remaining: F) -> usize
    where
        F: FnOnce(usize),
    {
        let mut entries = self.entries.lock().await;
        if entries.front().is_some_and(|entry| entry.seq == seq) {
            entries.pop_front();
        }
        let remaining = entries.len();
        on_remaining(remaining);
        remaining
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Copy of the pending actions, head first.
    pub async fn pending(&self) -> Vec<QueueEntry<S>> {
        self.entries.lock().await.iter().cloned().collect()
    }

    /// Drop all pending actions, returning how many were discarded.
    pub async fn clear(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let discarded = entries.len();
        entries.clear();
        discarded
    }

    pub(crate) fn notified(&self) -> Notified<'_> {
        self.ready.notified()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Result;
    use crate::store::Action;
    use async_trait::async_trait;

    struct Db;
    impl BackingStore for Db {}

    struct Noop;

    #[async_trait]
    impl Action<Db> for Noop {
        async fn apply(&self, _store: &Db) -> Result<()> {
            Ok(())
        }
    }

    fn noop() -> ActionRef<Db> {
        Arc::new(Noop)
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = ActionQueue::<Db>::new(MemberId(1));
        let first = noop();
        let second = noop();
        queue.push(Arc::clone(&first)).await;
        queue.push(Arc::clone(&second)).await;

        let head = queue.head().await.unwrap();
        assert!(same_action(head.action(), &first));
        queue.pop_head(head.seq()).await.unwrap();

        let head = queue.head().await.unwrap();
        assert!(same_action(head.action(), &second));
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn test_pop_head_requires_matching_seq() {
        let queue = ActionQueue::<Db>::new(MemberId(1));
        let seq = queue.push(noop()).await;
        assert!(queue.pop_head(seq + 1).await.is_none());
        assert_eq!(queue.len().await, 1);
        assert!(queue.pop_head(seq).await.is_some());
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_complete_head_reports_remaining() {
        let queue = ActionQueue::<Db>::new(MemberId(1));
        let seq = queue.push(noop()).await;
        queue.push(noop()).await;

        let mut seen = None;
        let remaining = queue.complete_head(seq, |left| seen = Some(left)).await;
        assert_eq!(remaining, 1);
        assert_eq!(seen, Some(1));
    }

    #[tokio::test]
    async fn test_push_wakes_waiter() {
        let queue = Arc::new(ActionQueue::<Db>::new(MemberId(1)));
        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.notified().await })
        };
        tokio::task::yield_now().await;
        queue.push(noop()).await;
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_clear_discards_everything() {
        let queue = ActionQueue::<Db>::new(MemberId(1));
        queue.extend(vec![noop(), noop(), noop()]).await;
        assert_eq!(queue.clear().await, 3);
        assert!(queue.head().await.is_none());
    }
}
