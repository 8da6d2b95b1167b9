pub mod engine;
pub mod profitability;
pub mod risk;

pub use engine::MetricsEngine;
pub use profitability::ProfitabilityMetrics;
pub use risk::RiskMetrics;
