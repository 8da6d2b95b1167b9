use super::{
    controller::{GateStatus, RiskController},
    snapshot::{MarketSnapshot, PositionSnapshot},
};
use crate::error::Result;
use crate::types::GenomeId;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::mpsc::{channel, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Supplies live account and market state for genomes under watch.
pub trait LiveStateSource: Send + Sync {
    fn snapshot(&self, genome_id: GenomeId) -> Option<(PositionSnapshot, MarketSnapshot)>;
}

/// Live state pushed in by whoever tracks execution.
#[derive(Default)]
pub struct SharedLiveState {
    states: RwLock<HashMap<GenomeId, (PositionSnapshot, MarketSnapshot)>>,
}

impl SharedLiveState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, genome_id: GenomeId, position: PositionSnapshot, market: MarketSnapshot) {
        self.states.write().insert(genome_id, (position, market));
    }

    pub fn remove(&self, genome_id: GenomeId) {
        self.states.write().remove(&genome_id);
    }
}

impl LiveStateSource for SharedLiveState {
    fn snapshot(&self, genome_id: GenomeId) -> Option<(PositionSnapshot, MarketSnapshot)> {
        self.states.read().get(&genome_id).cloned()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub reassessed: usize,
    pub rejected: usize,
    pub quarantined: usize,
}

/// Periodic reassessment loop on its own thread.
pub struct RiskMonitor {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<usize>>,
}

impl RiskMonitor {
    /// One pass over every approved or quarantined genome with live state.
    pub fn run_cycle(controller: &RiskController, source: &dyn LiveStateSource) -> CycleReport {
        let mut report = CycleReport::default();
        for genome_id in controller.monitored() {
            let Some((position, market)) = source.snapshot(genome_id) else {
                continue;
            };
            match controller.reassess(genome_id, &position, &market, Utc::now()) {
                Some(GateStatus::Rejected) => report.rejected += 1,
                Some(GateStatus::Quarantined) => report.quarantined += 1,
                _ => {}
            }
            report.reassessed += 1;
        }
        report
    }

    pub fn spawn(
        controller: Arc<RiskController>,
        source: Arc<dyn LiveStateSource>,
        interval: Duration,
    ) -> Result<Self> {
        let (stop_tx, stop_rx) = channel::<()>();

        let handle = thread::Builder::new()
            .name("risk-monitor".to_string())
            .spawn(move || {
                let mut cycles = 0;
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            let report = Self::run_cycle(&controller, source.as_ref());
                            cycles += 1;
                            if report.rejected > 0 || report.quarantined > 0 {
                                log::warn!(
                                    "Risk monitor cycle {}: {} reassessed, {} quarantined, {} rejected",
                                    cycles,
                                    report.reassessed,
                                    report.quarantined,
                                    report.rejected
                                );
                            }
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                log::debug!("Risk monitor stopped after {} cycles", cycles);
                cycles
            })?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Stop the loop and wait for it. Returns the number of completed cycles.
    pub fn stop(mut self) -> usize {
        self.shutdown()
    }

    fn shutdown(&mut self) -> usize {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        self.handle
            .take()
            .and_then(|h| h.join().ok())
            .unwrap_or(0)
    }
}

impl Drop for RiskMonitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RiskConfig;
    use crate::engines::generation::ParameterSet;
    use crate::execution::NullExecutionSink;
    use std::collections::BTreeMap;

    fn position(equity: f64, spx: f64) -> PositionSnapshot {
        PositionSnapshot {
            equity,
            peak_equity: 100_000.0,
            day_start_equity: equity,
            positions: [("SPX".to_string(), spx)].into(),
        }
    }

    #[test]
    fn test_cycle_rejects_on_live_drawdown() {
        let controller = RiskController::new(RiskConfig::default(), Arc::new(NullExecutionSink), None);
        let live = SharedLiveState::new();
        let id = GenomeId(7);
        controller.submit(
            id,
            ParameterSet(BTreeMap::new()),
            &position(100_000.0, 10_000.0),
            &MarketSnapshot::default(),
            Utc::now(),
        );

        live.update(id, position(70_000.0, 10_000.0), MarketSnapshot::default());
        let report = RiskMonitor::run_cycle(&controller, &live);
        assert_eq!(report.rejected, 1);
        assert_eq!(controller.view().status(id), Some(GateStatus::Rejected));

        // Rejected genomes drop out of the watch list.
        assert_eq!(RiskMonitor::run_cycle(&controller, &live).reassessed, 0);
    }

    #[test]
    fn test_spawned_monitor_stops() {
        let controller = Arc::new(RiskController::new(
            RiskConfig::default(),
            Arc::new(NullExecutionSink),
            None,
        ));
        let monitor = RiskMonitor::spawn(
            controller,
            Arc::new(SharedLiveState::new()),
            Duration::from_millis(5),
        )
        .unwrap();
        thread::sleep(Duration::from_millis(30));
        assert!(monitor.stop() >= 1);
    }
}
