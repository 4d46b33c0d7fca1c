//! In-process registry of active sagas.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use common::SagaId;
use serde::Serialize;

use crate::saga::{Saga, SagaSnapshot};

/// Aggregate view over every registered saga.
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStatistics {
    pub total_active: usize,
    /// Count of sagas per status name.
    pub status_breakdown: BTreeMap<String, usize>,
    pub total_steps: usize,
    /// Steps whose forward call succeeded, across all sagas.
    pub completed_steps: usize,
    pub step_completion_rate: f64,
    pub average_steps_per_saga: f64,
}

/// The single shared structure of the coordinator.
///
/// Each saga is mutated by exactly one engine task through its own lock;
/// the registry only adds, removes, and reads. Readers get snapshots, never
/// references into a live saga.
pub struct SagaRegistry<C> {
    sagas: RwLock<HashMap<SagaId, Arc<RwLock<Saga<C>>>>>,
}

impl<C> SagaRegistry<C> {
    pub fn new() -> Self {
        Self {
            sagas: RwLock::new(HashMap::new()),
        }
    }

    /// Inserts a saga at creation and returns the shared handle the engine
    /// drives. An id collision is a programming error.
    pub fn register(&self, saga: Saga<C>) -> Arc<RwLock<Saga<C>>> {
        let id = saga.id();
        let cell = Arc::new(RwLock::new(saga));
        let previous = self
            .sagas
            .write()
            .unwrap()
            .insert(id, Arc::clone(&cell));
        assert!(previous.is_none(), "saga id collision: {id}");
        cell
    }

    /// Requests abort of a running saga. Returns false if unknown.
    pub fn abort(&self, id: SagaId) -> bool {
        let signal = {
            let sagas = self.sagas.read().unwrap();
            sagas.get(&id).map(|cell| cell.read().unwrap().abort_signal())
        };
        match signal {
            Some(signal) => {
                signal.trigger();
                true
            }
            None => false,
        }
    }

    /// Removes a saga. Retention policy is the caller's concern.
    pub fn evict(&self, id: SagaId) -> bool {
        self.sagas.write().unwrap().remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sagas.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sagas.read().unwrap().is_empty()
    }
}

impl<C: Serialize> SagaRegistry<C> {
    /// Returns a read-only copy of one saga, or None if unknown.
    pub fn snapshot(&self, id: SagaId) -> Option<SagaSnapshot> {
        let cell = { self.sagas.read().unwrap().get(&id).cloned() };
        cell.map(|cell| cell.read().unwrap().snapshot())
    }

    /// Returns read-only copies of every registered saga.
    pub fn list(&self) -> Vec<SagaSnapshot> {
        let cells: Vec<_> = { self.sagas.read().unwrap().values().cloned().collect() };
        cells
            .iter()
            .map(|cell| cell.read().unwrap().snapshot())
            .collect()
    }

    /// Computes aggregate statistics from a consistent set of snapshots.
    pub fn statistics(&self) -> RegistryStatistics {
        let snapshots = self.list();
        let total_active = snapshots.len();
        let mut status_breakdown = BTreeMap::new();
        let mut total_steps = 0;
        let mut completed_steps = 0;
        for snapshot in &snapshots {
            *status_breakdown
                .entry(snapshot.status.as_str().to_string())
                .or_insert(0) += 1;
            total_steps += snapshot.steps.len();
            completed_steps += snapshot.completed_step_count();
        }
        RegistryStatistics {
            total_active,
            status_breakdown,
            total_steps,
            completed_steps,
            step_completion_rate: if total_steps == 0 {
                0.0
            } else {
                completed_steps as f64 / total_steps as f64
            },
            average_steps_per_saga: if total_active == 0 {
                0.0
            } else {
                total_steps as f64 / total_active as f64
            },
        }
    }
}

impl<C> Default for SagaRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}
