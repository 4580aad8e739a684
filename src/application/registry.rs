//! Charge point registry: live state of every connected charge point
//!
//! The registry is the single owner of charge point state. Entry add/remove
//! and per-entry mutation both go through `DashMap` shard locks, so two
//! events for the same charge point never interleave inside one mutation.
//! The transaction ID counter lives here too and travels with snapshots.
//!
//! Every connect stamps the identity with a fresh connection generation.
//! A disconnect only removes the entry while its generation is still the
//! current one, so a stale connection cannot drop state that a newer
//! connection of the same device relies on.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::domain::{ChargePointState, DomainError, DomainResult, TransactionId};

/// Whole-registry snapshot, as persisted by the state store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySnapshot {
    pub charge_points: HashMap<String, ChargePointState>,
    /// Counter value at the time of the snapshot
    #[serde(default)]
    pub next_transaction_id: TransactionId,
}

impl RegistrySnapshot {
    /// Smallest counter value that cannot collide with any stored transaction.
    pub fn resume_transaction_id(&self) -> TransactionId {
        let observed = self
            .charge_points
            .values()
            .filter_map(ChargePointState::max_transaction_id)
            .max()
            .map(|max| {
                max.checked_add(1).unwrap_or_else(|| {
                    error!(max, "Stored transaction IDs reach the end of the ID space");
                    TransactionId::MAX
                })
            })
            .unwrap_or(0);
        observed.max(self.next_transaction_id)
    }
}

/// Outcome of [`ChargePointRegistry::connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    /// Token to pass back to [`ChargePointRegistry::disconnect`]
    pub generation: u64,
    /// `false` when an existing entry was kept
    pub created: bool,
}

/// Thread-safe registry of charge point state
pub struct ChargePointRegistry {
    charge_points: DashMap<String, ChargePointState>,
    /// Current connection generation per identity; locked before `charge_points`
    generations: DashMap<String, u64>,
    next_generation: AtomicU64,
    next_transaction_id: AtomicI32,
}

/// Shared, reference-counted registry
pub type SharedRegistry = Arc<ChargePointRegistry>;

impl ChargePointRegistry {
    pub fn new() -> Self {
        Self {
            charge_points: DashMap::new(),
            generations: DashMap::new(),
            next_generation: AtomicU64::new(1),
            next_transaction_id: AtomicI32::new(0),
        }
    }

    /// Wrap in `Arc` for shared ownership
    pub fn shared() -> SharedRegistry {
        Arc::new(Self::new())
    }

    /// Register a new connection of `charge_point_id`.
    ///
    /// An existing entry (restored from a snapshot or left by an earlier
    /// connection) is kept as is. The returned generation supersedes every
    /// earlier one for this identity.
    pub fn connect(&self, charge_point_id: &str) -> Registration {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let mut current = self.generations.entry(charge_point_id.to_string()).or_insert(0);
        *current = generation;
        let created = self.ensure(charge_point_id);
        drop(current);

        if created {
            info!(charge_point_id, generation, "Charge point registered");
        } else {
            info!(charge_point_id, generation, "Charge point reconnected, keeping existing state");
        }
        Registration { generation, created }
    }

    /// Create an empty entry unless one exists. Returns `true` if created.
    pub fn ensure(&self, charge_point_id: &str) -> bool {
        let mut created = false;
        self.charge_points
            .entry(charge_point_id.to_string())
            .or_insert_with(|| {
                created = true;
                ChargePointState::new()
            });
        created
    }

    /// Remove the entry of the connection identified by `generation`.
    ///
    /// Returns `None` and keeps the entry when a newer connection has
    /// registered the identity since.
    pub fn disconnect(&self, charge_point_id: &str, generation: u64) -> Option<ChargePointState> {
        let current = match self.generations.entry(charge_point_id.to_string()) {
            Entry::Occupied(current) => current,
            Entry::Vacant(_) => {
                debug!(charge_point_id, generation, "Disconnect for charge point without a connection");
                return None;
            }
        };
        if *current.get() != generation {
            info!(
                charge_point_id,
                generation,
                current = *current.get(),
                "Charge point reconnected meanwhile, keeping entry"
            );
            return None;
        }

        let removed = self.charge_points.remove(charge_point_id).map(|(_, state)| state);
        current.remove();
        if removed.is_some() {
            info!(charge_point_id, generation, "Charge point removed from registry");
        } else {
            debug!(charge_point_id, "Disconnect for charge point without registry entry");
        }
        removed
    }

    /// Insert or replace an entry.
    pub fn insert(&self, charge_point_id: &str, state: ChargePointState) {
        self.charge_points.insert(charge_point_id.to_string(), state);
    }

    pub fn contains(&self, charge_point_id: &str) -> bool {
        self.charge_points.contains_key(charge_point_id)
    }

    pub fn len(&self) -> usize {
        self.charge_points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.charge_points.is_empty()
    }

    /// Sorted identities of all registered charge points.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.charge_points.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Clone of a single entry.
    pub fn get(&self, charge_point_id: &str) -> Option<ChargePointState> {
        self.charge_points.get(charge_point_id).map(|e| e.value().clone())
    }

    /// Read an entry under its lock.
    pub fn read<R>(
        &self,
        charge_point_id: &str,
        f: impl FnOnce(&ChargePointState) -> R,
    ) -> DomainResult<R> {
        self.charge_points
            .get(charge_point_id)
            .map(|entry| f(entry.value()))
            .ok_or_else(|| DomainError::charge_point_not_found(charge_point_id))
    }

    /// Mutate an entry under its exclusive lock.
    ///
    /// The closure must not call back into the registry for the same shard.
    pub fn update<R>(
        &self,
        charge_point_id: &str,
        f: impl FnOnce(&mut ChargePointState) -> R,
    ) -> DomainResult<R> {
        self.charge_points
            .get_mut(charge_point_id)
            .map(|mut entry| f(entry.value_mut()))
            .ok_or_else(|| DomainError::charge_point_not_found(charge_point_id))
    }

    /// Hand out the next transaction ID.
    ///
    /// Fails once the ID space is used up instead of wrapping into IDs that
    /// may still be referenced.
    pub fn allocate_transaction_id(&self) -> DomainResult<TransactionId> {
        self.next_transaction_id
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |id| id.checked_add(1))
            .map_err(|id| {
                error!(next_transaction_id = id, "Transaction ID space exhausted");
                DomainError::Exhausted("transaction IDs")
            })
    }

    /// The ID the next `allocate_transaction_id` call will return.
    pub fn next_transaction_id(&self) -> TransactionId {
        self.next_transaction_id.load(Ordering::SeqCst)
    }

    /// Copy of the whole registry.
    ///
    /// Entries are cloned one at a time, so the result is not an atomic cut
    /// across charge points.
    pub fn snapshot(&self) -> RegistrySnapshot {
        let charge_points = self
            .charge_points
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        RegistrySnapshot {
            charge_points,
            next_transaction_id: self.next_transaction_id(),
        }
    }

    /// Replace the registry wholesale and resume the transaction counter.
    pub fn restore(&self, snapshot: RegistrySnapshot) {
        let next_id = snapshot.resume_transaction_id();
        self.charge_points.clear();
        for (id, state) in snapshot.charge_points {
            self.charge_points.insert(id, state);
        }
        self.next_transaction_id.store(next_id, Ordering::SeqCst);
        info!(
            charge_points = self.charge_points.len(),
            next_transaction_id = next_id,
            "Registry restored"
        );
    }
}

impl Default for ChargePointRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Transaction;
    use chrono::Utc;

    fn with_transaction(id: TransactionId, ended: bool) -> ChargePointState {
        let mut cp = ChargePointState::new();
        let mut tx = Transaction::new(id, 1, "TAG", 0, Utc::now());
        if ended {
            tx.stop(Utc::now(), 10, None).unwrap();
        } else {
            cp.connector_mut(1).active_transaction = Some(id);
        }
        cp.transactions.insert(id, tx);
        cp
    }

    #[test]
    fn connect_creates_empty_entry_once() {
        let registry = ChargePointRegistry::new();
        assert!(registry.connect("CP1").created);
        registry
            .update("CP1", |cp| cp.connector_mut(1).status = None)
            .unwrap();
        assert!(!registry.connect("CP1").created);

        let cp = registry.get("CP1").unwrap();
        assert_eq!(cp.connectors.len(), 1);
        assert!(cp.transactions.is_empty());
    }

    #[test]
    fn disconnect_removes_entry() {
        let registry = ChargePointRegistry::new();
        let registration = registry.connect("CP1");
        assert!(registry.disconnect("CP1", registration.generation).is_some());
        assert!(!registry.contains("CP1"));
        assert!(registry.disconnect("CP1", registration.generation).is_none());
    }

    #[test]
    fn stale_connection_keeps_entry_of_newer_one() {
        let registry = ChargePointRegistry::new();
        let old = registry.connect("CP1");
        let new = registry.connect("CP1");
        assert!(new.generation > old.generation);
        assert!(!new.created);

        assert!(registry.disconnect("CP1", old.generation).is_none());
        assert!(registry.contains("CP1"));
        registry.update("CP1", |cp| cp.connector_mut(1).status = None).unwrap();

        assert!(registry.disconnect("CP1", new.generation).is_some());
        assert!(!registry.contains("CP1"));
    }

    #[test]
    fn ensure_does_not_claim_the_connection() {
        let registry = ChargePointRegistry::new();
        let registration = registry.connect("CP1");
        assert!(!registry.ensure("CP1"));
        assert!(registry.ensure("CP2"));
        assert!(registry.disconnect("CP1", registration.generation).is_some());
    }

    #[test]
    fn unknown_charge_point_is_not_found() {
        let registry = ChargePointRegistry::new();
        let err = registry.update("nope", |_| ()).unwrap_err();
        assert!(err.is_not_found());
        assert!(registry.read("nope", |_| ()).unwrap_err().is_not_found());
    }

    #[test]
    fn transaction_ids_strictly_increase() {
        let registry = ChargePointRegistry::new();
        let ids: Vec<_> = (0..5).map(|_| registry.allocate_transaction_id().unwrap()).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
        assert_eq!(registry.next_transaction_id(), 5);
    }

    #[test]
    fn restore_resumes_counter_past_highest_id() {
        let mut snapshot = RegistrySnapshot::default();
        snapshot.charge_points.insert("CP1".into(), with_transaction(4, true));
        snapshot.charge_points.insert("CP2".into(), with_transaction(11, false));

        let registry = ChargePointRegistry::new();
        registry.connect("stale");
        registry.restore(snapshot);

        assert!(!registry.contains("stale"));
        assert_eq!(registry.ids(), vec!["CP1".to_string(), "CP2".to_string()]);
        assert_eq!(registry.allocate_transaction_id().unwrap(), 12);
    }

    #[test]
    fn restore_keeps_persisted_counter_when_higher() {
        let mut snapshot = RegistrySnapshot::default();
        snapshot.charge_points.insert("CP1".into(), with_transaction(2, true));
        snapshot.next_transaction_id = 40;

        let registry = ChargePointRegistry::new();
        registry.restore(snapshot);
        assert_eq!(registry.next_transaction_id(), 40);
    }

    #[test]
    fn counter_refuses_to_wrap() {
        let registry = ChargePointRegistry::new();
        registry.restore(RegistrySnapshot {
            next_transaction_id: TransactionId::MAX - 1,
            ..Default::default()
        });
        assert_eq!(registry.allocate_transaction_id().unwrap(), TransactionId::MAX - 1);
        assert_eq!(
            registry.allocate_transaction_id(),
            Err(DomainError::Exhausted("transaction IDs"))
        );
        assert_eq!(registry.next_transaction_id(), TransactionId::MAX);
    }

    #[test]
    fn resume_saturates_at_highest_id() {
        let mut snapshot = RegistrySnapshot::default();
        snapshot
            .charge_points
            .insert("CP1".into(), with_transaction(TransactionId::MAX, true));
        assert_eq!(snapshot.resume_transaction_id(), TransactionId::MAX);
    }

    #[test]
    fn restore_of_empty_snapshot_starts_at_zero() {
        let registry = ChargePointRegistry::new();
        registry.restore(RegistrySnapshot::default());
        assert!(registry.is_empty());
        assert_eq!(registry.next_transaction_id(), 0);
    }

    #[test]
    fn concurrent_starts_on_one_connector_admit_exactly_one() {
        let registry = Arc::new(ChargePointRegistry::new());
        registry.connect("CP1");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    registry
                        .update("CP1", |cp| {
                            cp.start_transaction(
                                1,
                                || registry.allocate_transaction_id(),
                                |id| Transaction::new(id, 1, "TAG", 0, Utc::now()),
                            )
                        })
                        .unwrap()
                })
            })
            .collect();

        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(Result::is_ok)
            .count();

        assert_eq!(successes, 1);
        let cp = registry.get("CP1").unwrap();
        assert_eq!(cp.transactions.len(), 1);
        cp.check_invariants().unwrap();
    }
}
