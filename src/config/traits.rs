use crate::error::EvoError;
use serde::{Deserialize, Serialize};

/// Trait for configuration sections
pub trait ConfigSection: Serialize + for<'de> Deserialize<'de> + Default + Clone {
    fn section_name() -> &'static str;
    fn validate(&self) -> Result<(), EvoError>;
}

/// Shared check for fractions that must lie in `[0, 1]`.
pub(crate) fn check_unit_interval(section: &str, field: &str, value: f64) -> Result<(), EvoError> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(EvoError::Configuration(format!(
            "{}.{} must be between 0 and 1, got {}",
            section, field, value
        )));
    }
    Ok(())
}

pub(crate) fn check_positive(section: &str, field: &str, value: f64) -> Result<(), EvoError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(EvoError::Configuration(format!(
            "{}.{} must be positive, got {}",
            section, field, value
        )));
    }
    Ok(())
}
