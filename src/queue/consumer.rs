// Background consumer: one task per member, draining that member's queue.

use super::action_queue::{ActionQueue, QueueEntry};
use crate::config::{ActionFailurePolicy, ClusterConfig};
use crate::core::MemberStatus;
use crate::member::{Member, MemberState};
use crate::store::BackingStore;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{Instrument, Level, event, info_span};

const STARTABLE: [MemberStatus; 4] = [
    MemberStatus::Unknown,
    MemberStatus::Unsynchronised,
    MemberStatus::Synchronizing,
    MemberStatus::Ready,
];

pub(crate) struct Consumer<S: BackingStore> {
    member: Arc<Member<S>>,
    queue: Arc<ActionQueue<S>>,
    config: Arc<ClusterConfig>,
}

impl<S: BackingStore> Consumer<S> {
    pub(crate) fn new(
        member: Arc<Member<S>>,
        queue: Arc<ActionQueue<S>>,
        config: Arc<ClusterConfig>,
    ) -> Self {
        Self {
            member,
            queue,
            config,
        }
    }

    pub(crate) fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        let mut states = self.member.subscribe();
        event!(Level::DEBUG, member = %self.member.id(), "consumer started");

        loop {
            let status = states.borrow_and_update().status;
            match status {
                MemberStatus::Paused | MemberStatus::Dead => {
                    if states.changed().await.is_err() {
                        break;
                    }
                    continue;
                }
                MemberStatus::Quarantined => {
                    if !self.recover(&mut states).await {
                        break;
                    }
                    continue;
                }
                _ => {}
            }

            let Some(entry) = self.queue.head().await else {
                if !self.idle(&mut states).await {
                    break;
                }
                continue;
            };

            if status != MemberStatus::Processing
                && !self.member.transition_if(&STARTABLE, MemberStatus::Processing)
            {
                continue;
            }

            self.apply(entry).await;
        }

        event!(Level::DEBUG, member = %self.member.id(), "consumer stopped");
    }

    /// Waits for a new item or a status change. Returns false once the
    /// member has been dropped.
    async fn idle(&self, states: &mut watch::Receiver<MemberState>) -> bool {
        tokio::select! {
            _ = self.queue.notified() => true,
            changed = states.changed() => changed.is_ok(),
        }
    }

    /// Quarantined member: retry pending work after the configured delay.
    async fn recover(&self, states: &mut watch::Receiver<MemberState>) -> bool {
        if self.queue.is_empty().await {
            return self.idle(states).await;
        }
        tokio::select! {
            _ = tokio::time::sleep(self.config.retry_delay()) => {
                if self
                    .member
                    .transition_if(&[MemberStatus::Quarantined], MemberStatus::Processing)
                {
                    event!(
                        Level::INFO,
                        member = %self.member.id(),
                        attempts = self.member.quarantine_attempts(),
                        "retrying quarantined member"
                    );
                }
                true
            }
            changed = states.changed() => changed.is_ok(),
        }
    }

    async fn apply(&self, entry: QueueEntry<S>) {
        let span = info_span!(
            "cluster.member.apply",
            member = %self.member.id(),
            seq = entry.seq(),
            action = %entry.action().describe()
        );

        let outcome = entry
            .action()
            .apply(self.member.store())
            .instrument(span)
            .await;

        match outcome {
            Ok(()) => {
                let member = &self.member;
                self.queue
                    .complete_head(entry.seq(), |remaining| {
                        if remaining == 0 {
                            member.transition_if(&[MemberStatus::Processing], MemberStatus::Ready);
                        }
                    })
                    .await;
            }
            Err(err) => {
                event!(
                    Level::WARN,
                    member = %self.member.id(),
                    seq = entry.seq(),
                    error = %err,
                    "action failed"
                );
                if self.config.failure_policy == ActionFailurePolicy::Discard {
                    self.queue.pop_head(entry.seq()).await;
                }
                self.member.fail_in_flight();
            }
        }
    }
}
