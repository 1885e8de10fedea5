use super::error::{ClusterError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a cluster member.
///
/// Transitions are guarded: a member only moves along the edges listed in
/// [`MemberStatus::can_transition_to`]. Recovery from `Dead` always re-enters
/// through `Quarantined`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberStatus {
    #[default]
    Unknown,
    Unsynchronised,
    Synchronizing,
    Processing,
    Ready,
    Paused,
    Quarantined,
    Dead,
}

impl MemberStatus {
    pub const ALL: [MemberStatus; 8] = [
        MemberStatus::Unknown,
        MemberStatus::Unsynchronised,
        MemberStatus::Synchronizing,
        MemberStatus::Processing,
        MemberStatus::Ready,
        MemberStatus::Paused,
        MemberStatus::Quarantined,
        MemberStatus::Dead,
    ];

    /// Returns true if `self -> to` is a direct edge of the transition table.
    pub fn can_transition_to(self, to: MemberStatus) -> bool {
        use MemberStatus::*;
        match (self, to) {
            (Unknown | Unsynchronised | Synchronizing, Processing) => true,
            (Processing, Ready | Quarantined | Paused | Unknown) => true,
            (Ready, Processing | Paused | Quarantined | Unknown) => true,
            (Paused, Processing) => true,
            (Quarantined, Processing | Dead) => true,
            (Dead, Quarantined) => true,
            _ => false,
        }
    }

    /// Resolves the sequence of hops needed to reach `to`.
    ///
    /// Returns an empty path when already in `to`. A missing direct edge is
    /// bridged through `Processing` only when leaving a non-failure state;
    /// `Quarantined` and `Dead` must be walked out of explicitly.
    pub fn route_to(self, to: MemberStatus) -> Result<Vec<MemberStatus>> {
        if self == to {
            return Ok(Vec::new());
        }
        if self.can_transition_to(to) {
            return Ok(vec![to]);
        }
        let bridgeable = matches!(
            self,
            MemberStatus::Unknown
                | MemberStatus::Unsynchronised
                | MemberStatus::Synchronizing
                | MemberStatus::Paused
        );
        if bridgeable
            && self.can_transition_to(MemberStatus::Processing)
            && MemberStatus::Processing.can_transition_to(to)
        {
            return Ok(vec![MemberStatus::Processing, to]);
        }
        Err(ClusterError::IllegalTransition { from: self, to })
    }

    /// States a member passes through while it is still catching up.
    pub fn is_joining(self) -> bool {
        matches!(
            self,
            MemberStatus::Unknown | MemberStatus::Unsynchronised | MemberStatus::Synchronizing
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MemberStatus::Unknown => "UNKNOWN",
            MemberStatus::Unsynchronised => "UNSYNCHRONISED",
            MemberStatus::Synchronizing => "SYNCHRONIZING",
            MemberStatus::Processing => "PROCESSING",
            MemberStatus::Ready => "READY",
            MemberStatus::Paused => "PAUSED",
            MemberStatus::Quarantined => "QUARANTINED",
            MemberStatus::Dead => "DEAD",
        }
    }
}

impl fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use MemberStatus::*;

    #[test]
    fn test_table_edges() {
        for from in [Unknown, Unsynchronised, Synchronizing] {
            assert!(from.can_transition_to(Processing));
            assert!(!from.can_transition_to(Ready));
        }
        assert!(Processing.can_transition_to(Ready));
        assert!(Processing.can_transition_to(Quarantined));
        assert!(Ready.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Processing));
        assert!(!Paused.can_transition_to(Ready));
        assert!(Quarantined.can_transition_to(Dead));
        assert!(Dead.can_transition_to(Quarantined));
    }

    #[test]
    fn test_forbidden_edges() {
        assert!(!Ready.can_transition_to(Dead));
        assert!(!Dead.can_transition_to(Ready));
        assert!(!Dead.can_transition_to(Paused));
        assert!(!Paused.can_transition_to(Dead));
    }

    #[test]
    fn test_route_same_state_is_empty() {
        for status in MemberStatus::ALL {
            assert!(status.route_to(status).unwrap().is_empty());
        }
    }

    #[test]
    fn test_route_bridges_through_processing() {
        assert_eq!(Paused.route_to(Ready).unwrap(), vec![Processing, Ready]);
        assert_eq!(Unknown.route_to(Quarantined).unwrap(), vec![Processing, Quarantined]);
    }

    #[test]
    fn test_route_never_bridges_failure_states() {
        assert!(matches!(
            Quarantined.route_to(Ready),
            Err(ClusterError::IllegalTransition { from: Quarantined, to: Ready })
        ));
        assert!(Dead.route_to(Ready).is_err());
        assert!(Dead.route_to(Paused).is_err());
        assert!(Dead.route_to(Processing).is_err());
        assert!(Ready.route_to(Dead).is_err());
    }

    #[test]
    fn test_default_is_unknown() {
        assert_eq!(MemberStatus::default(), Unknown);
    }

    #[test]
    fn test_display_matches_wire_name() {
        assert_eq!(Unsynchronised.to_string(), "UNSYNCHRONISED");
        let json = serde_json::to_string(&Quarantined).unwrap();
        assert_eq!(json, "\"QUARANTINED\"");
    }
}
