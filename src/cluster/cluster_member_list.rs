use super::database_list::DatabaseList;
use super::details::ClusterDetails;
use super::member_list::MemberList;
use super::sync::{SyncMarker, sync_pair};
use crate::config::ClusterConfig;
use crate::core::{MemberStatus, Result};
use crate::member::MemberId;
use crate::store::{BackingStore, StoreSynchronizer};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{Instrument, Level, event, info_span};

/// Member list with automatic synchronisation on join.
///
/// A new member starts UNSYNCHRONISED, moves to SYNCHRONIZING once its
/// implicit synchronisation action is queued, and becomes READY on its own
/// when its consumer has drained everything queued up to that point.
///
/// With a [`StoreSynchronizer`] the newcomer restores a snapshot captured
/// from an existing member at the exact point of the join. Without one, it
/// is seeded with a copy of that member's pending queue instead.
pub struct ClusterMemberList<S: BackingStore> {
    details: Arc<ClusterDetails<S>>,
    synchronizer: Option<Arc<dyn StoreSynchronizer<S>>>,
}

impl<S: BackingStore> ClusterMemberList<S> {
    pub fn new(config: ClusterConfig) -> Result<Self> {
        Ok(Self {
            details: ClusterDetails::new(config)?,
            synchronizer: None,
        })
    }

    pub fn with_synchronizer(
        config: ClusterConfig,
        synchronizer: Arc<dyn StoreSynchronizer<S>>,
    ) -> Result<Self> {
        Ok(Self {
            details: ClusterDetails::new(config)?,
            synchronizer: Some(synchronizer),
        })
    }

    /// A view over existing cluster state.
    pub fn from_details(
        details: Arc<ClusterDetails<S>>,
        synchronizer: Option<Arc<dyn StoreSynchronizer<S>>>,
    ) -> Self {
        Self {
            details,
            synchronizer,
        }
    }

    /// The lightweight view over the same members.
    pub fn database_list(&self) -> DatabaseList<S> {
        DatabaseList::from_details(Arc::clone(&self.details))
    }

    async fn join(&self, store: Arc<S>) -> Result<MemberId> {
        let submissions = self.details.queues().lock_submissions().await;
        if let Some(existing) = self.details.member_of(&store).await {
            return Ok(existing.id());
        }
        let source = self.details.sync_source().await;
        let member = self
            .details
            .insert(store, MemberStatus::Unsynchronised)
            .await;
        member.reset_joining(MemberStatus::Synchronizing);

        match (&self.synchronizer, source) {
            (Some(synchronizer), Some(source)) => {
                let (capture, restore) = sync_pair(
                    Arc::clone(synchronizer),
                    source.id(),
                    member.id(),
                    self.details.config().sync_timeout_duration(),
                );
                submissions.queue(source.id(), Arc::new(capture)).await?;
                submissions.queue(member.id(), Arc::new(restore)).await?;
                event!(Level::DEBUG, source = %source.id(), "snapshot sync queued");
            }
            (None, Some(source)) => {
                submissions.queue(member.id(), Arc::new(SyncMarker)).await?;
                let copied = submissions.copy_from_to(source.id(), member.id()).await?;
                event!(Level::DEBUG, source = %source.id(), copied, "queue replay sync queued");
            }
            (_, None) => {
                submissions.queue(member.id(), Arc::new(SyncMarker)).await?;
            }
        }
        Ok(member.id())
    }
}

impl<S: BackingStore> Clone for ClusterMemberList<S> {
    fn clone(&self) -> Self {
        Self {
            details: Arc::clone(&self.details),
            synchronizer: self.synchronizer.clone(),
        }
    }
}

#[async_trait]
impl<S: BackingStore> MemberList<S> for ClusterMemberList<S> {
    fn details(&self) -> &Arc<ClusterDetails<S>> {
        &self.details
    }

    async fn add(&self, store: Arc<S>) -> Result<MemberId> {
        let span = info_span!(
            "cluster.member.join",
            cluster = %self.details.name(),
            label = %store.label()
        );
        self.join(store).instrument(span).await
    }
}
