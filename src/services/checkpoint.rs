use crate::engines::generation::EvolutionScheduler;
use crate::engines::risk::RiskController;
use crate::error::Result;
use crate::storage::{RunSnapshot, SnapshotStore};
use std::sync::Arc;

/// Persists scheduler and alert state between generations, and restores it
/// on startup.
pub struct Checkpointer {
    store: Arc<dyn SnapshotStore>,
    controller: Arc<RiskController>,
}

impl Checkpointer {
    pub fn new(store: Arc<dyn SnapshotStore>, controller: Arc<RiskController>) -> Self {
        Self { store, controller }
    }

    pub fn save(&self, scheduler: &EvolutionScheduler) -> Result<()> {
        let Some(population) = scheduler.population() else {
            return Ok(());
        };
        let snapshot = RunSnapshot::new(
            population.clone(),
            scheduler.next_genome_id(),
            self.controller.alert_history(),
            self.controller.gate_records(),
        );
        self.store.save(&snapshot)
    }

    /// Returns the restored generation number, if a snapshot existed.
    pub fn restore(&self, scheduler: &mut EvolutionScheduler) -> Result<Option<usize>> {
        let Some(snapshot) = self.store.load()? else {
            return Ok(None);
        };
        log::info!(
            "Resuming from generation {} snapshot saved at {}",
            snapshot.generation,
            snapshot.saved_at
        );
        self.controller.restore_alerts(snapshot.alerts);
        self.controller.restore_gate_records(snapshot.gate_states);
        scheduler.restore(snapshot.population, snapshot.next_genome_id);
        Ok(Some(snapshot.generation))
    }
}
