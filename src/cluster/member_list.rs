use super::details::ClusterDetails;
use crate::core::{MemberStatus, Result};
use crate::member::{MemberId, MemberInfo};
use crate::store::{ActionRef, BackingStore};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// The primary collection of cluster members.
///
/// Implementors only decide how a store joins ([`MemberList::add`]); every
/// other operation works on the shared [`ClusterDetails`] and is safe to call
/// concurrently with membership changes and with the members' consumers.
///
/// Stores are identified by their `Arc`, so queries take the same handle
/// that was added.
#[async_trait]
pub trait MemberList<S: BackingStore>: Send + Sync {
    /// Shared cluster state behind this view.
    fn details(&self) -> &Arc<ClusterDetails<S>>;

    /// Adds `store` as a member. Adding an existing member returns its id.
    async fn add(&self, store: Arc<S>) -> Result<MemberId>;

    async fn add_all(&self, stores: Vec<Arc<S>>) -> Result<Vec<MemberId>> {
        let mut ids = Vec::with_capacity(stores.len());
        for store in stores {
            ids.push(self.add(store).await?);
        }
        Ok(ids)
    }

    /// Removes `store` and discards its queue. Returns false if it was absent.
    async fn remove(&self, store: &Arc<S>) -> bool {
        self.details().remove(store).await
    }

    async fn remove_all(&self, stores: &[Arc<S>]) -> usize {
        let mut removed = 0;
        for store in stores {
            if self.details().remove(store).await {
                removed += 1;
            }
        }
        removed
    }

    async fn clear(&self) -> usize {
        self.details().clear().await
    }

    async fn contains(&self, store: &Arc<S>) -> bool {
        self.details().member_of(store).await.is_some()
    }

    async fn contains_all(&self, stores: &[Arc<S>]) -> bool {
        for store in stores {
            if !self.contains(store).await {
                return false;
            }
        }
        true
    }

    async fn len(&self) -> usize {
        self.details().len().await
    }

    async fn is_empty(&self) -> bool {
        self.details().is_empty().await
    }

    /// Point-in-time copy of all live stores, ordered by member id.
    async fn databases(&self) -> Vec<Arc<S>> {
        self.details()
            .members()
            .await
            .iter()
            .map(|member| Arc::clone(member.store()))
            .collect()
    }

    /// Diagnostic records for every member.
    async fn members(&self) -> Vec<MemberInfo> {
        self.details().member_infos().await
    }

    async fn databases_by_status(&self, statuses: &[MemberStatus]) -> Vec<Arc<S>> {
        self.details()
            .members_with_status(statuses)
            .await
            .iter()
            .map(|member| Arc::clone(member.store()))
            .collect()
    }

    async fn ready_databases(&self) -> Vec<Arc<S>> {
        self.databases_by_status(&[MemberStatus::Ready]).await
    }

    async fn count_with_status(&self, status: MemberStatus) -> usize {
        self.details().members_with_status(&[status]).await.len()
    }

    async fn count_ready(&self) -> usize {
        self.count_with_status(MemberStatus::Ready).await
    }

    async fn count_paused(&self) -> usize {
        self.count_with_status(MemberStatus::Paused).await
    }

    /// True iff every live member is READY; an empty list counts as ready.
    async fn are_all_ready(&self) -> bool {
        self.details()
            .members()
            .await
            .iter()
            .all(|member| member.status() == MemberStatus::Ready)
    }

    /// Current status of `store`, or `None` if it is not a member.
    async fn status_of(&self, store: &Arc<S>) -> Option<MemberStatus> {
        self.details()
            .member_of(store)
            .await
            .map(|member| member.status())
    }

    async fn is_ready(&self, store: &Arc<S>) -> bool {
        self.status_of(store).await == Some(MemberStatus::Ready)
    }

    async fn is_dead(&self, store: &Arc<S>) -> bool {
        self.status_of(store).await == Some(MemberStatus::Dead)
    }

    /// A READY member's store chosen at random.
    ///
    /// Fails with [`ClusterError::NoAvailableDatabase`](crate::ClusterError::NoAvailableDatabase)
    /// if none is READY right now.
    async fn ready_database(&self) -> Result<Arc<S>> {
        self.details().ready_store_within(Some(Duration::ZERO)).await
    }

    /// Like [`MemberList::ready_database`], but waits up to `timeout` for a
    /// member to become READY.
    async fn ready_database_within(&self, timeout: Duration) -> Result<Arc<S>> {
        self.details().ready_store_within(Some(timeout)).await
    }

    /// Blocks until `store` reaches `status` or `timeout` elapses.
    /// Returns whether the status was reached.
    async fn wait_on_status_change(
        &self,
        store: &Arc<S>,
        timeout: Duration,
        status: MemberStatus,
    ) -> bool {
        let Some(member) = self.details().member_of(store).await else {
            return false;
        };
        let id = member.id();
        self.details()
            .wait_until(Some(timeout), move |snapshot| {
                snapshot.status_of(id) == Some(status)
            })
            .await
            .is_some()
    }

    /// Blocks until no member is joining or working through its queue.
    ///
    /// `None` falls back to the configured default wait timeout, which
    /// itself defaults to waiting indefinitely.
    async fn wait_until_synchronised(&self, timeout: Option<Duration>) -> bool {
        let timeout = timeout.or(self.details().config().default_wait_timeout_duration());
        self.details()
            .wait_until(timeout, |snapshot| snapshot.is_synchronised())
            .await
            .is_some()
    }

    /// Blocks until `store` is READY or `timeout` elapses.
    async fn wait_until_database_has_synchronized(
        &self,
        store: &Arc<S>,
        timeout: Option<Duration>,
    ) -> bool {
        let Some(member) = self.details().member_of(store).await else {
            return false;
        };
        let id = member.id();
        self.details()
            .wait_until(timeout, move |snapshot| {
                snapshot.status_of(id) == Some(MemberStatus::Ready)
            })
            .await
            .is_some()
    }

    /// Queues `action` for `store` only. Returns its queue sequence number.
    async fn queue_action(&self, store: &Arc<S>, action: ActionRef<S>) -> Result<u64> {
        let member = self.details().require_member(store).await?;
        self.details().queues().queue(member.id(), action).await
    }

    /// Broadcasts `action` to every member. Returns the number of members reached.
    async fn queue_action_all(&self, action: ActionRef<S>) -> usize {
        self.details().queues().queue_all(action).await
    }

    /// Appends a copy of `from`'s pending actions onto `to`'s queue.
    async fn copy_queue(&self, from: &Arc<S>, to: &Arc<S>) -> Result<usize> {
        let source = self.details().require_member(from).await?;
        let dest = self.details().require_member(to).await?;
        self.details()
            .queues()
            .copy_from_to(source.id(), dest.id())
            .await
    }

    async fn set_status(&self, store: &Arc<S>, status: MemberStatus) -> Result<()> {
        self.details().require_member(store).await?.set_status(status)
    }

    async fn set_status_all(&self, stores: &[Arc<S>], status: MemberStatus) -> Result<()> {
        for store in stores {
            self.set_status(store, status).await?;
        }
        Ok(())
    }

    async fn set_ready(&self, store: &Arc<S>) -> Result<()> {
        self.set_status(store, MemberStatus::Ready).await
    }

    async fn set_processing(&self, store: &Arc<S>) -> Result<()> {
        self.set_status(store, MemberStatus::Processing).await
    }

    async fn set_paused(&self, store: &Arc<S>) -> Result<()> {
        self.set_status(store, MemberStatus::Paused).await
    }

    async fn set_unknown(&self, store: &Arc<S>) -> Result<()> {
        self.set_status(store, MemberStatus::Unknown).await
    }

    /// Counts a quarantine attempt; escalates to DEAD at the threshold.
    async fn set_quarantined(&self, store: &Arc<S>) -> Result<()> {
        self.set_status(store, MemberStatus::Quarantined).await
    }

    /// Requires the member to be QUARANTINED already.
    async fn set_dead(&self, store: &Arc<S>) -> Result<()> {
        self.set_status(store, MemberStatus::Dead).await
    }
}
