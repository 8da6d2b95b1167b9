pub mod alerts;
pub mod calculator;
pub mod controller;
pub mod monitor;
pub mod snapshot;

pub use alerts::{Alert, AlertHistory, Severity};
pub use calculator::{LimitKind, RawRiskValues, RiskAssessment, RiskCalculator, RiskLevel};
pub use controller::{
    GateDecision, GateRecord, GateStatus, RiskController, RiskGate, RiskStateView, RiskSummary,
};
pub use monitor::{CycleReport, LiveStateSource, RiskMonitor, SharedLiveState};
pub use snapshot::{ExposureProfile, MarketSnapshot, PositionSnapshot, SymbolMarket};
