use super::snapshot::ClusterStatusSnapshot;
use crate::config::ClusterConfig;
use crate::core::{ClusterError, MemberStatus, Result};
use crate::member::{ChangeSignal, Member, MemberId, MemberInfo};
use crate::queue::ActionQueueList;
use crate::queue::consumer::Consumer;
use crate::store::{BackingStore, StoreKey};
use futures::future::join_all;
use rand::seq::SliceRandom;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{Level, event};

struct MemberSlot<S: BackingStore> {
    member: Arc<Member<S>>,
    consumer: JoinHandle<()>,
}

struct Registry<S: BackingStore> {
    members: BTreeMap<MemberId, MemberSlot<S>>,
    by_store: HashMap<StoreKey, MemberId>,
}

/// Cluster-wide shared state.
///
/// Holds the cluster label, the live member set and every member's queue.
/// [`DatabaseList`](super::DatabaseList) and
/// [`ClusterMemberList`](super::ClusterMemberList) are views over one shared
/// instance, so a status change made through either is visible to both.
pub struct ClusterDetails<S: BackingStore> {
    config: Arc<ClusterConfig>,
    registry: RwLock<Registry<S>>,
    queues: ActionQueueList<S>,
    changes: Arc<ChangeSignal>,
    next_id: AtomicU64,
}

impl<S: BackingStore> ClusterDetails<S> {
    pub fn new(config: ClusterConfig) -> Result<Arc<Self>> {
        config.validate()?;
        Ok(Arc::new(Self {
            config: Arc::new(config),
            registry: RwLock::new(Registry {
                members: BTreeMap::new(),
                by_store: HashMap::new(),
            }),
            queues: ActionQueueList::new(),
            changes: Arc::new(ChangeSignal::new()),
            next_id: AtomicU64::new(1),
        }))
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn queues(&self) -> &ActionQueueList<S> {
        &self.queues
    }

    // ------------------------------------------------------------------
    // Membership
    // ------------------------------------------------------------------

    /// Registers `store` with `initial` status and starts its consumer.
    ///
    /// Adding a store that is already a member returns the existing member.
    pub(crate) async fn insert(&self, store: Arc<S>, initial: MemberStatus) -> Arc<Member<S>> {
        let key = StoreKey::of(&store);
        let mut registry = self.registry.write().await;
        if let Some(existing) = registry
            .by_store
            .get(&key)
            .and_then(|id| registry.members.get(id))
        {
            return Arc::clone(&existing.member);
        }

        let id = MemberId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let member = Arc::new(Member::new(
            id,
            store,
            initial,
            Arc::clone(&self.changes),
            self.config.quarantine_threshold,
        ));
        let queue = self.queues.create(id).await;
        let consumer =
            Consumer::new(Arc::clone(&member), queue, Arc::clone(&self.config)).spawn();

        registry.by_store.insert(key, id);
        registry.members.insert(
            id,
            MemberSlot {
                member: Arc::clone(&member),
                consumer,
            },
        );
        drop(registry);

        event!(
            Level::INFO,
            cluster = %self.config.name,
            member = %id,
            label = %member.label(),
            status = %initial,
            "member added"
        );
        self.changes.bump();
        member
    }

    /// Removes `store`, stops its consumer and discards its queue.
    /// Removing an absent store is a no-op.
    ///
    /// Waits for the submission lock, so a join that picked `store` as its
    /// sync source finishes queueing before the source disappears.
    pub async fn remove(&self, store: &Arc<S>) -> bool {
        let _submissions = self.queues.lock_submissions().await;
        let key = StoreKey::of(store);
        let slot = {
            let mut registry = self.registry.write().await;
            let Some(id) = registry.by_store.remove(&key) else {
                return false;
            };
            registry.members.remove(&id)
        };
        let Some(slot) = slot else {
            return false;
        };

        slot.consumer.abort();
        self.queues.remove(slot.member.id()).await;
        event!(
            Level::INFO,
            cluster = %self.config.name,
            member = %slot.member.id(),
            label = %slot.member.label(),
            "member removed"
        );
        self.changes.bump();
        true
    }

    /// Removes every member. Returns how many were removed.
    pub async fn clear(&self) -> usize {
        let _submissions = self.queues.lock_submissions().await;
        let slots: Vec<_> = {
            let mut registry = self.registry.write().await;
            registry.by_store.clear();
            std::mem::take(&mut registry.members).into_values().collect()
        };
        let removed = slots.len();

        let consumers: Vec<_> = slots
            .into_iter()
            .map(|slot| {
                slot.consumer.abort();
                slot.consumer
            })
            .collect();
        // Aborted tasks resolve to a cancellation error; only completion matters.
        let _ = join_all(consumers).await;
        self.queues.clear().await;

        if removed > 0 {
            event!(Level::INFO, cluster = %self.config.name, removed, "members cleared");
            self.changes.bump();
        }
        removed
    }

    pub async fn member_of(&self, store: &Arc<S>) -> Option<Arc<Member<S>>> {
        let registry = self.registry.read().await;
        registry
            .by_store
            .get(&StoreKey::of(store))
            .and_then(|id| registry.members.get(id))
            .map(|slot| Arc::clone(&slot.member))
    }

    pub(crate) async fn require_member(&self, store: &Arc<S>) -> Result<Arc<Member<S>>> {
        self.member_of(store)
            .await
            .ok_or_else(|| crate::member::not_found(store))
    }

    /// Live members ordered by id.
    pub async fn members(&self) -> Vec<Arc<Member<S>>> {
        self.registry
            .read()
            .await
            .members
            .values()
            .map(|slot| Arc::clone(&slot.member))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.registry.read().await.members.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.registry.read().await.members.is_empty()
    }

    /// Members whose current status is one of `statuses`.
    pub async fn members_with_status(&self, statuses: &[MemberStatus]) -> Vec<Arc<Member<S>>> {
        self.members()
            .await
            .into_iter()
            .filter(|member| statuses.contains(&member.status()))
            .collect()
    }

    /// One READY member picked at random, if any.
    pub async fn pick_ready(&self) -> Option<Arc<Member<S>>> {
        let ready = self.members_with_status(&[MemberStatus::Ready]).await;
        ready.choose(&mut rand::thread_rng()).cloned()
    }

    /// Best member to seed a joining member from: READY first, then any
    /// member that is not DEAD.
    pub(crate) async fn sync_source(&self) -> Option<Arc<Member<S>>> {
        let members = self.members().await;
        members
            .iter()
            .find(|member| member.status() == MemberStatus::Ready)
            .or_else(|| {
                members
                    .iter()
                    .find(|member| member.status() != MemberStatus::Dead)
            })
            .cloned()
    }

    // ------------------------------------------------------------------
    // Snapshots and waits
    // ------------------------------------------------------------------

    pub async fn member_infos(&self) -> Vec<MemberInfo> {
        let members = self.members().await;
        let mut infos = Vec::with_capacity(members.len());
        for member in members {
            let pending = self.queues.size_of(member.id()).await.unwrap_or(0);
            infos.push(member.info(pending));
        }
        infos
    }

    /// Immutable point-in-time view of every member's status.
    pub async fn status_snapshot(&self) -> ClusterStatusSnapshot {
        ClusterStatusSnapshot::new(&self.config.name, self.member_infos().await)
    }

    /// Prints the current statuses under `label` and returns the printed text.
    pub async fn print_statuses(&self, label: &str) -> String {
        let text = format!("{}\n{}", label, self.status_snapshot().await);
        println!("{}", text);
        text
    }

    pub async fn print_cluster_statuses(&self) -> String {
        let label = format!("== {} ==", self.config.name);
        self.print_statuses(&label).await
    }

    /// Blocks until `predicate` holds for a fresh snapshot or `timeout`
    /// elapses. Returns the matching snapshot, or `None` on timeout.
    pub async fn wait_until<F>(
        &self,
        timeout: Option<Duration>,
        mut predicate: F,
    ) -> Option<ClusterStatusSnapshot>
    where
        F: FnMut(&ClusterStatusSnapshot) -> bool + Send,
    {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        let mut changes = self.changes.subscribe();
        loop {
            changes.borrow_and_update();
            let snapshot = self.status_snapshot().await;
            if predicate(&snapshot) {
                return Some(snapshot);
            }
            if !Self::next_change(&mut changes, deadline).await {
                return None;
            }
        }
    }

    /// Returns a READY member's store, waiting up to `timeout` for one to appear.
    pub async fn ready_store_within(&self, timeout: Option<Duration>) -> Result<Arc<S>> {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        let mut changes = self.changes.subscribe();
        loop {
            changes.borrow_and_update();
            if let Some(member) = self.pick_ready().await {
                return Ok(Arc::clone(member.store()));
            }
            if !Self::next_change(&mut changes, deadline).await {
                return Err(ClusterError::NoAvailableDatabase(format!(
                    "no READY member in cluster '{}'",
                    self.config.name
                )));
            }
        }
    }

    /// Waits for the next change notification. Returns false once the
    /// deadline has passed.
    async fn next_change(changes: &mut watch::Receiver<u64>, deadline: Option<Instant>) -> bool {
        match deadline {
            Some(deadline) => matches!(
                tokio::time::timeout_at(deadline, changes.changed()).await,
                Ok(Ok(()))
            ),
            None => changes.changed().await.is_ok(),
        }
    }
}

impl<S: BackingStore> Drop for ClusterDetails<S> {
    fn drop(&mut self) {
        for slot in self.registry.get_mut().members.values() {
            slot.consumer.abort();
        }
    }
}
