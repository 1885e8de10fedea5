use crate::core::{ClusterError, MemberStatus, Result};
use crate::store::{BackingStore, StoreKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{Level, event};

/// Stable identifier of a member within one cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemberId(pub u64);

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "member-{}", self.0)
    }
}

/// Status plus quarantine counter, updated together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemberState {
    pub status: MemberStatus,
    pub quarantine_attempts: u32,
}

/// Cluster-wide change counter.
///
/// Bumped after every status or membership change; timed waits subscribe to
/// it instead of polling.
#[derive(Debug)]
pub(crate) struct ChangeSignal {
    tx: watch::Sender<u64>,
}

impl ChangeSignal {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self { tx }
    }

    pub(crate) fn bump(&self) {
        self.tx.send_modify(|version| *version = version.wrapping_add(1));
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }
}

/// One backing store tracked by the cluster.
pub struct Member<S: BackingStore> {
    id: MemberId,
    store: Arc<S>,
    label: String,
    state: watch::Sender<MemberState>,
    changes: Arc<ChangeSignal>,
    quarantine_threshold: u32,
}

impl<S: BackingStore> Member<S> {
    pub(crate) fn new(
        id: MemberId,
        store: Arc<S>,
        initial: MemberStatus,
        changes: Arc<ChangeSignal>,
        quarantine_threshold: u32,
    ) -> Self {
        let label = store.label();
        let (state, _) = watch::channel(MemberState {
            status: initial,
            quarantine_attempts: 0,
        });
        Self {
            id,
            store,
            label,
            state,
            changes,
            quarantine_threshold,
        }
    }

    pub fn id(&self) -> MemberId {
        self.id
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn store_key(&self) -> StoreKey {
        StoreKey::of(&self.store)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn state(&self) -> MemberState {
        *self.state.borrow()
    }

    pub fn status(&self) -> MemberStatus {
        self.state.borrow().status
    }

    pub fn quarantine_attempts(&self) -> u32 {
        self.state.borrow().quarantine_attempts
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<MemberState> {
        self.state.subscribe()
    }

    /// Moves the member to `to`, applying the transition guard.
    ///
    /// Same-state requests are accepted without change. `Quarantined` is
    /// delegated to [`Member::quarantine`] so the attempt is counted.
    pub fn set_status(&self, to: MemberStatus) -> Result<()> {
        if to == MemberStatus::Quarantined {
            return self.quarantine();
        }
        self.update(|state| {
            if state.status.route_to(to)?.is_empty() {
                return Ok(false);
            }
            state.status = to;
            if to == MemberStatus::Ready {
                state.quarantine_attempts = 0;
            }
            Ok(true)
        })
        .map(|_| ())
    }

    /// Counts a quarantine attempt and moves the member to `Quarantined`,
    /// or to `Dead` once the threshold is reached without an intervening READY.
    pub fn quarantine(&self) -> Result<()> {
        let threshold = self.quarantine_threshold;
        self.update(|state| Self::escalate(state, threshold)).map(|_| ())
    }

    /// Consumer-side failure: quarantines only if the member is still
    /// `Processing`, leaving caller-set states alone.
    pub(crate) fn fail_in_flight(&self) -> bool {
        let threshold = self.quarantine_threshold;
        self.update(|state| {
            if state.status != MemberStatus::Processing {
                return Ok(false);
            }
            Self::escalate(state, threshold)
        })
        .unwrap_or(false)
    }

    /// Compare-and-set transition used by the consumer.
    ///
    /// Returns true if the member was in one of `expected` and moved to `to`.
    pub(crate) fn transition_if(&self, expected: &[MemberStatus], to: MemberStatus) -> bool {
        self.update(|state| {
            if !expected.contains(&state.status) || !state.status.can_transition_to(to) {
                return Ok(false);
            }
            state.status = to;
            if to == MemberStatus::Ready {
                state.quarantine_attempts = 0;
            }
            Ok(true)
        })
        .unwrap_or(false)
    }

    /// Forces the initial joining status without a guard check.
    pub(crate) fn reset_joining(&self, status: MemberStatus) {
        let _ = self.update(|state| {
            if !state.status.is_joining() || state.status == status {
                return Ok(false);
            }
            state.status = status;
            Ok(true)
        });
    }

    fn escalate(state: &mut MemberState, threshold: u32) -> Result<bool> {
        match state.status {
            MemberStatus::Dead => {
                state.status = MemberStatus::Quarantined;
                state.quarantine_attempts = 1;
            }
            MemberStatus::Quarantined => {
                state.quarantine_attempts = state.quarantine_attempts.saturating_add(1);
            }
            from => {
                from.route_to(MemberStatus::Quarantined)?;
                state.status = MemberStatus::Quarantined;
                state.quarantine_attempts = state.quarantine_attempts.saturating_add(1);
            }
        }
        if state.quarantine_attempts >= threshold {
            state.status = MemberStatus::Dead;
        }
        Ok(true)
    }

    fn update<F>(&self, modify: F) -> Result<bool>
    where
        F: FnOnce(&mut MemberState) -> Result<bool>,
    {
        let mut failure = None;
        let mut before = MemberStatus::Unknown;
        let mut after = MemberState::default();
        let changed = self.state.send_if_modified(|state| {
            before = state.status;
            match modify(state) {
                Ok(changed) => {
                    after = *state;
                    changed
                }
                Err(err) => {
                    failure = Some(err);
                    false
                }
            }
        });

        if let Some(err) = failure {
            return Err(err);
        }
        if changed {
            self.log_change(before, after);
            self.changes.bump();
        }
        Ok(changed)
    }

    fn log_change(&self, before: MemberStatus, after: MemberState) {
        match after.status {
            MemberStatus::Dead if before != MemberStatus::Dead => event!(
                Level::ERROR,
                member = %self.id,
                label = %self.label,
                attempts = after.quarantine_attempts,
                "member declared dead"
            ),
            MemberStatus::Quarantined => event!(
                Level::WARN,
                member = %self.id,
                label = %self.label,
                from = %before,
                attempts = after.quarantine_attempts,
                "member quarantined"
            ),
            _ => event!(
                Level::DEBUG,
                member = %self.id,
                from = %before,
                to = %after.status,
                "member status changed"
            ),
        }
    }

    pub(crate) fn info(&self, pending_actions: usize) -> MemberInfo {
        let state = self.state();
        MemberInfo {
            id: self.id,
            label: self.label.clone(),
            status: state.status,
            quarantine_attempts: state.quarantine_attempts,
            pending_actions,
        }
    }
}

impl<S: BackingStore> fmt::Debug for Member<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Member")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("state", &self.state())
            .finish()
    }
}

/// Point-in-time diagnostic record for one member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberInfo {
    pub id: MemberId,
    pub label: String,
    pub status: MemberStatus,
    pub quarantine_attempts: u32,
    pub pending_actions: usize,
}

impl fmt::Display for MemberInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {} (quarantined {}x, {} pending)",
            self.id, self.label, self.status, self.quarantine_attempts, self.pending_actions
        )
    }
}

pub(crate) fn not_found<S: BackingStore>(store: &Arc<S>) -> ClusterError {
    ClusterError::MemberNotFound(store.label())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Db;
    impl BackingStore for Db {
        fn label(&self) -> String {
            "db".to_string()
        }
    }

    fn member(initial: MemberStatus, threshold: u32) -> Member<Db> {
        Member::new(
            MemberId(1),
            Arc::new(Db),
            initial,
            Arc::new(ChangeSignal::new()),
            threshold,
        )
    }

    #[test]
    fn test_ready_resets_counter() {
        let m = member(MemberStatus::Ready, 8);
        m.quarantine().unwrap();
        assert_eq!(m.quarantine_attempts(), 1);
        m.set_status(MemberStatus::Processing).unwrap();
        m.set_status(MemberStatus::Ready).unwrap();
        assert_eq!(m.quarantine_attempts(), 0);
    }

    #[test]
    fn test_threshold_escalates_to_dead() {
        let m = member(MemberStatus::Ready, 8);
        for _ in 0..7 {
            m.quarantine().unwrap();
            assert_eq!(m.status(), MemberStatus::Quarantined);
        }
        m.quarantine().unwrap();
        assert_eq!(m.status(), MemberStatus::Dead);
    }

    #[test]
    fn test_dead_recovery_resets_attempts() {
        let m = member(MemberStatus::Ready, 2);
        m.quarantine().unwrap();
        m.quarantine().unwrap();
        assert_eq!(m.status(), MemberStatus::Dead);

        m.quarantine().unwrap();
        assert_eq!(m.status(), MemberStatus::Quarantined);
        assert_eq!(m.quarantine_attempts(), 1);
    }

    #[test]
    fn test_illegal_transition_is_rejected_and_state_kept() {
        let m = member(MemberStatus::Ready, 8);
        let err = m.set_status(MemberStatus::Dead).unwrap_err();
        assert_eq!(
            err,
            ClusterError::IllegalTransition {
                from: MemberStatus::Ready,
                to: MemberStatus::Dead
            }
        );
        assert_eq!(m.status(), MemberStatus::Ready);
    }

    #[test]
    fn test_transition_if_only_from_expected() {
        let m = member(MemberStatus::Paused, 8);
        assert!(!m.transition_if(&[MemberStatus::Processing], MemberStatus::Ready));
        assert_eq!(m.status(), MemberStatus::Paused);
        assert!(m.transition_if(&[MemberStatus::Paused], MemberStatus::Processing));
        assert_eq!(m.status(), MemberStatus::Processing);
    }

    #[test]
    fn test_fail_in_flight_ignores_paused_member() {
        let m = member(MemberStatus::Paused, 8);
        assert!(!m.fail_in_flight());
        assert_eq!(m.status(), MemberStatus::Paused);
        assert_eq!(m.quarantine_attempts(), 0);
    }

    #[test]
    fn test_changes_bump_signal() {
        let signal = Arc::new(ChangeSignal::new());
        let rx = signal.subscribe();
        let m = Member::new(MemberId(7), Arc::new(Db), MemberStatus::Processing, signal, 8);
        m.set_status(MemberStatus::Ready).unwrap();
        assert!(rx.has_changed().unwrap());
    }
}
