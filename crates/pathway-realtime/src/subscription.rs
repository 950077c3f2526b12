//! Local table-change listeners.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use pathway_core::{RowFilter, TableChange};
use tracing::debug;

/// Listener invoked for each matching change.
pub type ChangeCallback = Arc<dyn Fn(&TableChange) + Send + Sync>;

struct Subscription {
    id: u64,
    filter: RowFilter,
    callback: ChangeCallback,
}

/// Identifies one registration. Unsubscribing twice is a no-op.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    id: u64,
    table: String,
}

impl SubscriptionHandle {
    /// Table the listener watches.
    pub fn table(&self) -> &str {
        &self.table
    }
}

/// Table name to listeners, in registration order.
#[derive(Default)]
pub struct SubscriptionRegistry {
    next_id: AtomicU64,
    tables: RwLock<HashMap<String, Vec<Subscription>>>,
}

impl SubscriptionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for `table`.
    pub fn subscribe(
        &self,
        table: impl Into<String>,
        filter: RowFilter,
        callback: ChangeCallback,
    ) -> SubscriptionHandle {
        let table = table.into();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(table = %table, %filter, subscription_id = id, "subscribed");
        self.tables
            .write()
            .entry(table.clone())
            .or_default()
            .push(Subscription {
                id,
                filter,
                callback,
            });
        SubscriptionHandle { id, table }
    }

    /// Remove a listener. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        let mut tables = self.tables.write();
        let Some(subs) = tables.get_mut(&handle.table) else {
            return false;
        };
        let before = subs.len();
        subs.retain(|s| s.id != handle.id);
        let removed = subs.len() != before;
        if subs.is_empty() {
            let _ = tables.remove(&handle.table);
        }
        if removed {
            debug!(table = %handle.table, subscription_id = handle.id, "unsubscribed");
        }
        removed
    }

    /// Deliver `change` to every matching listener of its table.
    ///
    /// Callbacks run after the registry lock is released, so a callback may
    /// subscribe or unsubscribe. Returns the number of listeners invoked.
    pub fn dispatch(&self, change: &TableChange) -> usize {
        let callbacks: Vec<ChangeCallback> = {
            let tables = self.tables.read();
            tables
                .get(&change.table)
                .map(|subs| {
                    subs.iter()
                        .filter(|s| s.filter.matches(change))
                        .map(|s| Arc::clone(&s.callback))
                        .collect()
                })
                .unwrap_or_default()
        };
        for callback in &callbacks {
            callback(change);
        }
        callbacks.len()
    }

    /// Listener count for `table`.
    pub fn count(&self, table: &str) -> usize {
        self.tables.read().get(table).map_or(0, Vec::len)
    }

    /// Listener count across all tables.
    pub fn total(&self) -> usize {
        self.tables.read().values().map(Vec::len).sum()
    }
}

/// Unsubscribes when dropped, for listeners scoped to a feature's lifetime.
pub struct SubscriptionGuard {
    registry: Weak<SubscriptionRegistry>,
    handle: Option<SubscriptionHandle>,
}

impl SubscriptionGuard {
    pub(crate) fn new(registry: &Arc<SubscriptionRegistry>, handle: SubscriptionHandle) -> Self {
        Self {
            registry: Arc::downgrade(registry),
            handle: Some(handle),
        }
    }

    /// The guarded handle.
    pub fn handle(&self) -> Option<&SubscriptionHandle> {
        self.handle.as_ref()
    }

    /// Unsubscribe now.
    pub fn release(&mut self) {
        if let (Some(handle), Some(registry)) = (self.handle.take(), self.registry.upgrade()) {
            let _ = registry.unsubscribe(&handle);
        }
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.release();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
