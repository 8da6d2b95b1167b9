use super::{
    alerts::{Alert, AlertHistory, BreachEpisode, Severity},
    calculator::{LimitKind, RiskAssessment, RiskCalculator, RiskLevel},
    snapshot::{MarketSnapshot, PositionSnapshot},
};
use crate::{
    config::RiskConfig,
    engines::generation::{Genome, ParameterSet},
    error::{EvoError, Result},
    execution::{ExecutionSignal, ExecutionSink},
    types::GenomeId,
};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::mpsc::Sender;
use std::sync::Arc;

/// Gate status of a genome. `Rejected` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GateStatus {
    Pending,
    Evaluated,
    Approved,
    Quarantined,
    Rejected,
}

impl GateStatus {
    /// Approved and quarantined parameter sets reach execution; the latter
    /// flagged as such.
    pub fn is_publishable(&self) -> bool {
        matches!(self, GateStatus::Approved | GateStatus::Quarantined)
    }
}

#[derive(Debug, Clone)]
pub struct GenomeRiskState {
    pub status: GateStatus,
    pub assessment: Option<RiskAssessment>,
    pub params: ParameterSet,
    pub updated_at: DateTime<Utc>,
    episode: Option<BreachEpisode>,
}

/// Persisted form of one genome's gate state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateRecord {
    pub genome_id: GenomeId,
    pub status: GateStatus,
    pub params: ParameterSet,
    pub assessment: Option<RiskAssessment>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GateDecision {
    pub genome_id: GenomeId,
    pub status: GateStatus,
    pub assessment: RiskAssessment,
}

/// Approval boundary between evolution and execution.
pub trait RiskGate: Send + Sync {
    /// Review a freshly selected elite using its simulated exposure.
    fn review(
        &self,
        genome: &Genome,
        params: &ParameterSet,
        market: &MarketSnapshot,
        now: DateTime<Utc>,
    ) -> Result<GateDecision>;
}

type StateMap = HashMap<GenomeId, GenomeRiskState>;

/// Read-only handle on the controller's state.
#[derive(Clone)]
pub struct RiskStateView {
    states: Arc<RwLock<StateMap>>,
}

impl RiskStateView {
    pub fn status(&self, id: GenomeId) -> Option<GateStatus> {
        self.states.read().get(&id).map(|s| s.status)
    }

    pub fn assessment(&self, id: GenomeId) -> Option<RiskAssessment> {
        self.states.read().get(&id).and_then(|s| s.assessment.clone())
    }

    pub fn is_approved(&self, id: GenomeId) -> bool {
        self.status(id) == Some(GateStatus::Approved)
    }

    pub fn is_publishable(&self, id: GenomeId) -> bool {
        self.status(id).map(|s| s.is_publishable()).unwrap_or(false)
    }

    pub fn with_status(&self, status: GateStatus) -> Vec<GenomeId> {
        let mut ids: Vec<GenomeId> = self
            .states
            .read()
            .iter()
            .filter(|(_, s)| s.status == status)
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.states.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.read().is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskSummary {
    pub tracked: usize,
    pub approved: usize,
    pub quarantined: usize,
    pub rejected: usize,
    pub warning_alerts: usize,
    pub critical_alerts: usize,
    pub average_portfolio_risk: f64,
    pub average_position_risk: f64,
    pub average_market_risk: f64,
    pub average_liquidity_risk: f64,
    pub highest_level: Option<RiskLevel>,
}

/// Sole writer of gate status. Alerts leave through the channel given at
/// construction, execution signals through the sink.
pub struct RiskController {
    calculator: RiskCalculator,
    rearm: chrono::Duration,
    states: Arc<RwLock<StateMap>>,
    history: Mutex<AlertHistory>,
    alert_tx: Option<Mutex<Sender<Alert>>>,
    sink: Arc<dyn ExecutionSink>,
}

impl RiskController {
    pub fn new(
        config: RiskConfig,
        sink: Arc<dyn ExecutionSink>,
        alert_tx: Option<Sender<Alert>>,
    ) -> Self {
        let rearm = chrono::Duration::seconds(config.rearm_interval_secs.min(i64::MAX as u64) as i64);
        let history = AlertHistory::new(config.alert_history_size);
        Self {
            calculator: RiskCalculator::new(config),
            rearm,
            states: Arc::new(RwLock::new(HashMap::new())),
            history: Mutex::new(history),
            alert_tx: alert_tx.map(Mutex::new),
            sink,
        }
    }

    pub fn view(&self) -> RiskStateView {
        RiskStateView {
            states: Arc::clone(&self.states),
        }
    }

    pub fn calculator(&self) -> &RiskCalculator {
        &self.calculator
    }

    fn decide(assessment: &RiskAssessment) -> GateStatus {
        let breaches = &assessment.breached_limits;
        if breaches.is_empty() {
            GateStatus::Approved
        } else if breaches.len() >= 2 || assessment.has_critical_breach() {
            GateStatus::Rejected
        } else {
            GateStatus::Quarantined
        }
    }

    /// Run a genome through the gate: Pending, Evaluated, then a decision.
    /// Genomes already under watch are reassessed instead; rejected ones stay
    /// rejected.
    pub fn submit(
        &self,
        genome_id: GenomeId,
        params: ParameterSet,
        position: &PositionSnapshot,
        market: &MarketSnapshot,
        now: DateTime<Utc>,
    ) -> GateDecision {
        let previous = {
            let mut states = self.states.write();
            match states.get(&genome_id).map(|s| s.status) {
                Some(status) if status == GateStatus::Rejected || status.is_publishable() => status,
                _ => {
                    states.insert(
                        genome_id,
                        GenomeRiskState {
                            status: GateStatus::Pending,
                            assessment: None,
                            params,
                            updated_at: now,
                            episode: None,
                        },
                    );
                    GateStatus::Pending
                }
            }
        };

        let assessment = self.calculator.assess(position, market);
        if previous == GateStatus::Rejected {
            return GateDecision {
                genome_id,
                status: GateStatus::Rejected,
                assessment,
            };
        }

        let previous = if previous == GateStatus::Pending {
            if let Some(state) = self.states.write().get_mut(&genome_id) {
                state.assessment = Some(assessment.clone());
                state.status = GateStatus::Evaluated;
            }
            GateStatus::Evaluated
        } else {
            previous
        };

        let status = self.transition(genome_id, previous, &assessment, now);
        GateDecision {
            genome_id,
            status,
            assessment,
        }
    }

    /// Re-run the gate for an approved or quarantined genome with live state.
    /// Returns the new status, or `None` if the genome is not under watch.
    pub fn reassess(
        &self,
        genome_id: GenomeId,
        position: &PositionSnapshot,
        market: &MarketSnapshot,
        now: DateTime<Utc>,
    ) -> Option<GateStatus> {
        let previous = self.states.read().get(&genome_id).map(|s| s.status)?;
        if !previous.is_publishable() {
            return None;
        }
        let assessment = self.calculator.assess(position, market);
        Some(self.transition(genome_id, previous, &assessment, now))
    }

    fn transition(
        &self,
        genome_id: GenomeId,
        previous: GateStatus,
        assessment: &RiskAssessment,
        now: DateTime<Utc>,
    ) -> GateStatus {
        let next = Self::decide(assessment);
        let mut alerts = Vec::new();
        let mut signals = Vec::new();

        {
            let mut states = self.states.write();
            let Some(state) = states.get_mut(&genome_id) else {
                return previous;
            };

            if assessment.breached_limits.is_empty() {
                state.episode = None;
            } else {
                let due = state
                    .episode
                    .get_or_insert_with(BreachEpisode::new)
                    .due(&assessment.breached_limits, now, self.rearm);
                if next == GateStatus::Rejected {
                    // A rejection raises one critical alert covering every breach.
                    if previous != GateStatus::Rejected {
                        alerts.push(Self::rejection_alert(genome_id, assessment, now));
                    }
                } else {
                    alerts.extend(due.into_iter().map(|kind| {
                        Self::alert(genome_id, kind, Severity::Warning, assessment, now)
                    }));
                }
            }

            match next {
                GateStatus::Rejected if previous != GateStatus::Rejected => {
                    let reasons: Vec<String> =
                        assessment.breached_limits.iter().map(|k| k.to_string()).collect();
                    signals.push(ExecutionSignal::Halt {
                        genome_id,
                        reason: format!("risk limits breached: {}", reasons.join(", ")),
                    });
                }
                GateStatus::Approved | GateStatus::Quarantined if next != previous => {
                    signals.push(ExecutionSignal::Parameters {
                        genome_id,
                        params: state.params.clone(),
                        status: next,
                    });
                }
                _ => {}
            }

            state.status = next;
            state.assessment = Some(assessment.clone());
            state.updated_at = now;
        }

        if next != previous {
            log::info!("Genome {} risk gate: {:?} -> {:?}", genome_id, previous, next);
        }
        for alert in alerts {
            self.emit(alert);
        }
        for signal in signals {
            if let Err(e) = self.sink.publish(signal) {
                log::error!("Failed to publish execution signal for {}: {}", genome_id, e);
            }
        }
        next
    }

    fn raw_value(kind: LimitKind, assessment: &RiskAssessment) -> f64 {
        let raw = &assessment.raw;
        match kind {
            LimitKind::MaxDrawdown => raw.drawdown,
            LimitKind::PositionLimit => raw.largest_position_fraction,
            LimitKind::DailyLossLimit => raw.daily_loss,
            LimitKind::GrossExposure => raw.gross_exposure,
        }
    }

    /// Sourced from the first critical breach, or the first breach if none is
    /// critical.
    fn rejection_alert(genome_id: GenomeId, assessment: &RiskAssessment, now: DateTime<Utc>) -> Alert {
        let breaches = &assessment.breached_limits;
        let source = breaches
            .iter()
            .find(|k| k.is_critical())
            .or_else(|| breaches.iter().next())
            .copied()
            .unwrap_or(LimitKind::MaxDrawdown);
        let detail: Vec<String> = breaches
            .iter()
            .map(|k| format!("{} at {:.4}", k, Self::raw_value(*k, assessment)))
            .collect();
        Alert {
            timestamp: now,
            severity: Severity::Critical,
            source,
            genome_id,
            message: format!(
                "{} rejected: {} (composite {:.2})",
                genome_id,
                detail.join(", "),
                assessment.composite_score
            ),
        }
    }

    fn alert(
        genome_id: GenomeId,
        kind: LimitKind,
        severity: Severity,
        assessment: &RiskAssessment,
        now: DateTime<Utc>,
    ) -> Alert {
        let value = Self::raw_value(kind, assessment);
        Alert {
            timestamp: now,
            severity,
            source: kind,
            genome_id,
            message: format!(
                "{} breached {} at {:.4} (composite {:.2})",
                genome_id, kind, value, assessment.composite_score
            ),
        }
    }

    fn emit(&self, alert: Alert) {
        match alert.severity {
            Severity::Critical => log::error!("{}", alert.message),
            Severity::Warning => log::warn!("{}", alert.message),
        }
        self.history.lock().push(alert.clone());
        if let Some(tx) = &self.alert_tx {
            if tx.lock().send(alert).is_err() {
                log::debug!("Alert receiver dropped");
            }
        }
    }

    /// Genomes the monitor keeps reassessing.
    pub fn monitored(&self) -> Vec<GenomeId> {
        let mut ids: Vec<GenomeId> = self
            .states
            .read()
            .iter()
            .filter(|(_, s)| s.status.is_publishable())
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    pub fn alert_history(&self) -> Vec<Alert> {
        self.history.lock().to_vec()
    }

    /// Reload alerts from a snapshot. Not re-sent on the channel.
    pub fn restore_alerts(&self, alerts: Vec<Alert>) {
        let mut history = self.history.lock();
        for alert in alerts {
            history.push(alert);
        }
    }

    /// Settled gate states, for snapshots. Genomes still mid-review are left
    /// out and get reviewed again after a resume.
    pub fn gate_records(&self) -> Vec<GateRecord> {
        let mut records: Vec<GateRecord> = self
            .states
            .read()
            .iter()
            .filter(|(_, s)| s.status == GateStatus::Rejected || s.status.is_publishable())
            .map(|(id, s)| GateRecord {
                genome_id: *id,
                status: s.status,
                params: s.params.clone(),
                assessment: s.assessment.clone(),
                updated_at: s.updated_at,
            })
            .collect();
        records.sort_by_key(|r| r.genome_id);
        records
    }

    /// Reload gate states from a snapshot without publishing anything. A
    /// genome already rejected here stays rejected.
    pub fn restore_gate_records(&self, records: Vec<GateRecord>) {
        let mut states = self.states.write();
        for record in records {
            if states.get(&record.genome_id).map(|s| s.status) == Some(GateStatus::Rejected) {
                continue;
            }
            states.insert(
                record.genome_id,
                GenomeRiskState {
                    status: record.status,
                    assessment: record.assessment,
                    params: record.params,
                    updated_at: record.updated_at,
                    episode: None,
                },
            );
        }
    }

    pub fn summary(&self) -> RiskSummary {
        let states = self.states.read();
        let history = self.history.lock();

        let assessments: Vec<&RiskAssessment> =
            states.values().filter_map(|s| s.assessment.as_ref()).collect();
        let avg = |f: fn(&RiskAssessment) -> f64| {
            if assessments.is_empty() {
                0.0
            } else {
                assessments.iter().map(|a| f(a)).sum::<f64>() / assessments.len() as f64
            }
        };
        let count = |status: GateStatus| states.values().filter(|s| s.status == status).count();

        RiskSummary {
            tracked: states.len(),
            approved: count(GateStatus::Approved),
            quarantined: count(GateStatus::Quarantined),
            rejected: count(GateStatus::Rejected),
            warning_alerts: history.iter().filter(|a| a.severity == Severity::Warning).count(),
            critical_alerts: history.iter().filter(|a| a.severity == Severity::Critical).count(),
            average_portfolio_risk: avg(|a| a.portfolio_risk),
            average_position_risk: avg(|a| a.position_risk),
            average_market_risk: avg(|a| a.market_risk),
            average_liquidity_risk: avg(|a| a.liquidity_risk),
            highest_level: assessments.iter().map(|a| a.level()).max(),
        }
    }
}

impl RiskGate for RiskController {
    fn review(
        &self,
        genome: &Genome,
        params: &ParameterSet,
        market: &MarketSnapshot,
        now: DateTime<Utc>,
    ) -> Result<GateDecision> {
        let exposure = genome.exposure.as_ref().ok_or_else(|| {
            EvoError::DataQuality(format!("genome {} has no simulated exposure", genome.id))
        })?;
        let position = PositionSnapshot::from_exposure(exposure);
        Ok(self.submit(genome.id, params.clone(), &position, market, now))
    }
}
