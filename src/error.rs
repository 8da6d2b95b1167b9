use thiserror::Error;

#[derive(Error, Debug)]
pub enum EvoError {
    #[error("Invalid gene: {0}")]
    InvalidGene(String),

    #[error("Data quality error: {0}")]
    DataQuality(String),

    #[error("Evaluation timed out after {elapsed_ms} ms (budget {budget_ms} ms)")]
    EvaluationTimeout { elapsed_ms: u128, budget_ms: u128 },

    #[error("Data loading error: {0}")]
    DataLoading(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Execution sink error: {0}")]
    Execution(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("Serde error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Config source error: {0}")]
    ConfigSource(#[from] config::ConfigError),
}

impl EvoError {
    /// Per-genome failures are isolated and scored as worst case instead of
    /// aborting the generation.
    pub fn is_genome_local(&self) -> bool {
        matches!(
            self,
            EvoError::InvalidGene(_) | EvoError::DataQuality(_) | EvoError::EvaluationTimeout { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, EvoError>;
