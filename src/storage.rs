use crate::engines::generation::Population;
use crate::engines::risk::{Alert, GateRecord};
use crate::error::{EvoError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Everything needed to resume a run: the population, id counter and the
/// alert trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub generation: usize,
    pub population: Population,
    pub next_genome_id: u64,
    pub alerts: Vec<Alert>,
    /// Settled risk gate states, so rejections survive a resume.
    #[serde(default)]
    pub gate_states: Vec<GateRecord>,
    pub saved_at: DateTime<Utc>,
}

impl RunSnapshot {
    pub fn new(
        population: Population,
        next_genome_id: u64,
        alerts: Vec<Alert>,
        gate_states: Vec<GateRecord>,
    ) -> Self {
        Self {
            generation: population.generation,
            population,
            next_genome_id,
            alerts,
            gate_states,
            saved_at: Utc::now(),
        }
    }
}

pub trait SnapshotStore: Send + Sync {
    fn save(&self, snapshot: &RunSnapshot) -> Result<()>;
    fn load(&self) -> Result<Option<RunSnapshot>>;
}

/// Single JSON file, replaced atomically on each save.
pub struct JsonSnapshotStore {
    path: PathBuf,
}

impl JsonSnapshotStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotStore for JsonSnapshotStore {
    fn save(&self, snapshot: &RunSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(snapshot)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            EvoError::Storage(format!("Failed to replace {}: {}", self.path.display(), e))
        })?;

        log::debug!(
            "Saved generation {} snapshot to {}",
            snapshot.generation,
            self.path.display()
        );
        Ok(())
    }

    fn load(&self) -> Result<Option<RunSnapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path)?;
        let snapshot = serde_json::from_str(&contents).map_err(|e| {
            EvoError::Storage(format!("Corrupt snapshot {}: {}", self.path.display(), e))
        })?;
        Ok(Some(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::evaluation::FitnessResult;
    use crate::engines::generation::{Genome, ParameterSet};
    use crate::engines::risk::{GateStatus, LimitKind, Severity};
    use crate::types::GenomeId;
    use std::collections::BTreeMap;

    fn sample_snapshot() -> RunSnapshot {
        let mut values = BTreeMap::new();
        values.insert("spread_ratio".to_string(), 0.2);
        let mut genome = Genome::new(GenomeId(3), 2, values, vec![GenomeId(1)]);
        genome.fitness = Some(FitnessResult::from_scalar(0.5));

        let alert = Alert {
            timestamp: Utc::now(),
            severity: Severity::Critical,
            source: LimitKind::MaxDrawdown,
            genome_id: GenomeId(3),
            message: "drawdown 25.00% exceeds 20.00%".to_string(),
        };

        RunSnapshot::new(
            Population {
                generation: 2,
                members: vec![genome],
            },
            4,
            vec![alert],
            vec![GateRecord {
                genome_id: GenomeId(3),
                status: GateStatus::Rejected,
                params: ParameterSet(BTreeMap::new()),
                assessment: None,
                updated_at: Utc::now(),
            }],
        )
    }

    #[test]
    fn test_missing_file_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSnapshotStore::new(dir.path().join("run.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_save_then_load_restores_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSnapshotStore::new(dir.path().join("nested").join("run.json"));
        let snapshot = sample_snapshot();

        store.save(&snapshot).unwrap();
        let loaded = store.load().unwrap().unwrap();

        assert_eq!(loaded.generation, 2);
        assert_eq!(loaded.next_genome_id, 4);
        assert_eq!(loaded.population, snapshot.population);
        assert_eq!(loaded.alerts.len(), 1);
        assert_eq!(loaded.gate_states, snapshot.gate_states);
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[test]
    fn test_corrupt_file_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        fs::write(&path, "{ not json").unwrap();
        let store = JsonSnapshotStore::new(&path);
        assert!(matches!(store.load(), Err(EvoError::Storage(_))));
    }
}
