use crate::core::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// A backing store that can be tracked as a cluster member.
///
/// Members are identified by the `Arc` they were added with, never by value,
/// so two stores with the same label are still distinct members.
pub trait BackingStore: Send + Sync + 'static {
    /// Human readable name used in diagnostics.
    fn label(&self) -> String {
        "store".to_string()
    }
}

/// An opaque unit of mutating work replayed on every member.
#[async_trait]
pub trait Action<S: BackingStore>: Send + Sync {
    /// Applies the action to a single backing store.
    async fn apply(&self, store: &S) -> Result<()>;

    /// Short description for logs.
    fn describe(&self) -> String {
        "action".to_string()
    }
}

/// Shared handle to a queued action. Copies between queues clone the handle,
/// so identity survives `copy_from_to`.
pub type ActionRef<S> = Arc<dyn Action<S>>;

/// Serialized state of one member, handed from the source to a joining member.
pub type SyncSnapshot = serde_json::Value;

/// Captures the state of one member and restores it onto a joining member.
#[async_trait]
pub trait StoreSynchronizer<S: BackingStore>: Send + Sync {
    /// Reads a consistent copy of `source`'s state.
    async fn capture(&self, source: &S) -> Result<SyncSnapshot>;

    /// Replaces `target`'s state with a previously captured copy.
    async fn restore(&self, target: &S, snapshot: SyncSnapshot) -> Result<()>;
}

/// Identity of a store handle, derived from the `Arc` allocation.
///
/// Stable for as long as the cluster holds the handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StoreKey(usize);

impl StoreKey {
    pub fn of<S: BackingStore>(store: &Arc<S>) -> Self {
        Self(Arc::as_ptr(store) as *const () as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    impl BackingStore for Named {
        fn label(&self) -> String {
            self.0.to_string()
        }
    }

    #[test]
    fn test_store_key_is_identity_not_value() {
        let a = Arc::new(Named("db"));
        let b = Arc::new(Named("db"));
        assert_eq!(StoreKey::of(&a), StoreKey::of(&a.clone()));
        assert_ne!(StoreKey::of(&a), StoreKey::of(&b));
    }

    #[test]
    fn test_default_label() {
        struct Plain;
        impl BackingStore for Plain {}
        assert_eq!(Plain.label(), "store");
    }
}
