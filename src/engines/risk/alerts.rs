use super::calculator::LimitKind;
use crate::types::GenomeId;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub source: LimitKind,
    pub genome_id: GenomeId,
    pub message: String,
}

/// One uninterrupted stretch of breaches for a genome. Ends when an
/// assessment comes back clean.
#[derive(Debug, Clone, PartialEq)]
pub struct BreachEpisode {
    alerted: BTreeSet<LimitKind>,
    last_alert_at: Option<DateTime<Utc>>,
}

impl BreachEpisode {
    pub fn new() -> Self {
        Self {
            alerted: BTreeSet::new(),
            last_alert_at: None,
        }
    }

    /// Limits that should alert now: any not yet alerted in this episode, or
    /// all current breaches once `rearm` has passed since the last alert.
    pub fn due(
        &mut self,
        breached: &BTreeSet<LimitKind>,
        now: DateTime<Utc>,
        rearm: Duration,
    ) -> Vec<LimitKind> {
        let rearmed = self
            .last_alert_at
            .map(|last| now - last >= rearm)
            .unwrap_or(false);

        let due: Vec<LimitKind> = breached
            .iter()
            .filter(|kind| rearmed || !self.alerted.contains(kind))
            .copied()
            .collect();

        if !due.is_empty() {
            self.alerted.extend(due.iter().copied());
            self.last_alert_at = Some(now);
        }
        due
    }
}

impl Default for BreachEpisode {
    fn default() -> Self {
        Self::new()
    }
}

/// Most recent alerts, oldest dropped first.
#[derive(Debug, Clone)]
pub struct AlertHistory {
    alerts: VecDeque<Alert>,
    capacity: usize,
}

impl AlertHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            alerts: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, alert: Alert) {
        while self.alerts.len() >= self.capacity {
            self.alerts.pop_front();
        }
        self.alerts.push_back(alert);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Alert> {
        self.alerts.iter()
    }

    pub fn to_vec(&self) -> Vec<Alert> {
        self.alerts.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }
}
