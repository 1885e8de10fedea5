use super::details::ClusterDetails;
use super::member_list::MemberList;
use crate::config::ClusterConfig;
use crate::core::{MemberStatus, Result};
use crate::member::MemberId;
use crate::store::BackingStore;
use async_trait::async_trait;
use std::sync::Arc;

/// Lightweight member list.
///
/// Stores join directly in PROCESSING with no synchronisation step; the
/// caller marks them READY with [`MemberList::set_ready`] once it knows they
/// are current.
pub struct DatabaseList<S: BackingStore> {
    details: Arc<ClusterDetails<S>>,
}

impl<S: BackingStore> DatabaseList<S> {
    pub fn new(config: ClusterConfig) -> Result<Self> {
        Ok(Self {
            details: ClusterDetails::new(config)?,
        })
    }

    /// A view over existing cluster state.
    pub fn from_details(details: Arc<ClusterDetails<S>>) -> Self {
        Self { details }
    }
}

impl<S: BackingStore> Clone for DatabaseList<S> {
    fn clone(&self) -> Self {
        Self {
            details: Arc::clone(&self.details),
        }
    }
}

#[async_trait]
impl<S: BackingStore> MemberList<S> for DatabaseList<S> {
    fn details(&self) -> &Arc<ClusterDetails<S>> {
        &self.details
    }

    async fn add(&self, store: Arc<S>) -> Result<MemberId> {
        let member = self.details.insert(store, MemberStatus::Processing).await;
        Ok(member.id())
    }
}
