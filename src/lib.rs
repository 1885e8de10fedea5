// ============================================================================
// dbcluster Library
// ============================================================================
//
// Membership and status tracking for a cluster of replicated backing stores.
// Every member owns an ordered action queue drained by its own background
// task; the cluster routes reads to READY members and walks failing members
// through quarantine towards DEAD.

pub mod cluster;
pub mod config;
pub mod core;
pub mod member;
pub mod memory;
pub mod queue;
pub mod store;

// Re-export main types for convenience
pub use core::{ClusterError, MemberStatus, Result};

pub use config::{ActionFailurePolicy, ClusterConfig};
pub use member::{Member, MemberId, MemberInfo, MemberState};
pub use store::{Action, ActionRef, BackingStore, StoreKey, StoreSynchronizer, SyncSnapshot};

pub use queue::{ActionQueue, ActionQueueList, QueueEntry, SubmissionGuard, same_action};

pub use cluster::{
    ClusterDetails, ClusterMemberList, ClusterStatusSnapshot, DatabaseList, MemberList,
};

pub use memory::{DelayAction, InMemoryStore, LogSynchronizer, StatementAction};
