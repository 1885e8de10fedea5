// ============================================================================
// Cluster Membership
// ============================================================================
//
// Shared cluster state (ClusterDetails), the MemberList operations over it,
// and the two list flavours:
// - DatabaseList: members join in PROCESSING, caller marks them READY
// - ClusterMemberList: members synchronise on join and become READY alone
//
// ============================================================================

pub mod cluster_member_list;
pub mod database_list;
pub mod details;
pub mod member_list;
pub mod snapshot;
mod sync;

pub use cluster_member_list::ClusterMemberList;
pub use database_list::DatabaseList;
pub use details::ClusterDetails;
pub use member_list::MemberList;
pub use snapshot::ClusterStatusSnapshot;
