use crate::core::{MemberStatus, Result};
use crate::member::{MemberId, MemberInfo};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Immutable copy of every member's status at one instant.
///
/// Safe to hold, print and compare without touching live cluster state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterStatusSnapshot {
    pub cluster: String,
    pub taken_at: DateTime<Utc>,
    pub members: Vec<MemberInfo>,
}

impl ClusterStatusSnapshot {
    pub(crate) fn new(cluster: &str, members: Vec<MemberInfo>) -> Self {
        Self {
            cluster: cluster.to_string(),
            taken_at: Utc::now(),
            members,
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn member(&self, id: MemberId) -> Option<&MemberInfo> {
        self.members.iter().find(|member| member.id == id)
    }

    pub fn status_of(&self, id: MemberId) -> Option<MemberStatus> {
        self.member(id).map(|member| member.status)
    }

    pub fn count(&self, status: MemberStatus) -> usize {
        self.count_in(&[status])
    }

    pub fn count_in(&self, statuses: &[MemberStatus]) -> usize {
        self.members
            .iter()
            .filter(|member| statuses.contains(&member.status))
            .count()
    }

    /// True iff every member is READY. An empty cluster counts as ready.
    pub fn all_ready(&self) -> bool {
        self.members
            .iter()
            .all(|member| member.status == MemberStatus::Ready)
    }

    /// No member is still catching up or working through its queue.
    ///
    /// PAUSED and DEAD members are settled. READY and QUARANTINED members are
    /// settled once their queue is empty. PROCESSING and the joining states
    /// never are.
    pub fn is_synchronised(&self) -> bool {
        self.members.iter().all(|member| match member.status {
            MemberStatus::Paused | MemberStatus::Dead => true,
            MemberStatus::Ready | MemberStatus::Quarantined => member.pending_actions == 0,
            _ => false,
        })
    }

    pub fn total_pending(&self) -> usize {
        self.members.iter().map(|member| member.pending_actions).sum()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for ClusterStatusSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Cluster '{}' at {}: {} member(s), {} ready, {} pending action(s)",
            self.cluster,
            self.taken_at.format("%Y-%m-%d %H:%M:%S%.3f"),
            self.len(),
            self.count(MemberStatus::Ready),
            self.total_pending()
        )?;
        for member in &self.members {
            writeln!(f, "  {}", member)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(id: u64, status: MemberStatus, pending: usize) -> MemberInfo {
        MemberInfo {
            id: MemberId(id),
            label: format!("db{}", id),
            status,
            quarantine_attempts: 0,
            pending_actions: pending,
        }
    }

    #[test]
    fn test_counts() {
        let snapshot = ClusterStatusSnapshot::new(
            "c",
            vec![
                info(1, MemberStatus::Ready, 0),
                info(2, MemberStatus::Paused, 3),
                info(3, MemberStatus::Ready, 0),
            ],
        );
        assert_eq!(snapshot.count(MemberStatus::Ready), 2);
        assert_eq!(
            snapshot.count_in(&[MemberStatus::Ready, MemberStatus::Paused]),
            3
        );
        assert_eq!(snapshot.status_of(MemberId(2)), Some(MemberStatus::Paused));
        assert_eq!(snapshot.status_of(MemberId(9)), None);
        assert!(!snapshot.all_ready());
        assert_eq!(snapshot.total_pending(), 3);
    }

    #[test]
    fn test_empty_cluster_is_ready_and_synchronised() {
        let snapshot = ClusterStatusSnapshot::new("c", Vec::new());
        assert!(snapshot.all_ready());
        assert!(snapshot.is_synchronised());
    }

    #[test]
    fn test_synchronised_rules() {
        let settled = ClusterStatusSnapshot::new(
            "c",
            vec![
                info(1, MemberStatus::Ready, 0),
                info(2, MemberStatus::Dead, 4),
                info(3, MemberStatus::Quarantined, 0),
            ],
        );
        assert!(settled.is_synchronised());

        let retrying =
            ClusterStatusSnapshot::new("c", vec![info(1, MemberStatus::Quarantined, 1)]);
        assert!(!retrying.is_synchronised());

        let joining =
            ClusterStatusSnapshot::new("c", vec![info(1, MemberStatus::Synchronizing, 0)]);
        assert!(!joining.is_synchronised());

        let woken = ClusterStatusSnapshot::new("c", vec![info(1, MemberStatus::Ready, 2)]);
        assert!(!woken.is_synchronised());
    }

    #[test]
    fn test_display_lists_members() {
        let snapshot = ClusterStatusSnapshot::new("orders", vec![info(1, MemberStatus::Ready, 0)]);
        let text = snapshot.to_string();
        assert!(text.starts_with("Cluster 'orders'"));
        assert!(text.contains("member-1 [db1] READY"));
    }

    #[test]
    fn test_json_round_trip() {
        let snapshot = ClusterStatusSnapshot::new("c", vec![info(1, MemberStatus::Ready, 0)]);
        let json = snapshot.to_json().unwrap();
        let parsed: ClusterStatusSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, snapshot);
    }
}
