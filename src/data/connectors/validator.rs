use super::types::MarketColumn;
use crate::error::{EvoError, Result};
use polars::prelude::*;
use std::collections::HashMap;

pub struct DataValidator;

impl DataValidator {
    /// Resolve required and optional market columns. Missing optional columns
    /// are simply absent from the map.
    pub fn validate_market_columns(df: &DataFrame) -> Result<HashMap<MarketColumn, String>> {
        let mut column_map = HashMap::new();

        for required in MarketColumn::required() {
            match Self::find_column(df, &required) {
                Some(col_name) => {
                    column_map.insert(required, col_name.to_string());
                }
                None => {
                    return Err(EvoError::DataLoading(format!(
                        "Missing required column: {} (tried aliases: {:?})",
                        required.as_str(),
                        required.aliases()
                    )));
                }
            }
        }
        for optional in MarketColumn::optional() {
            if let Some(col_name) = Self::find_column(df, &optional) {
                column_map.insert(optional, col_name.to_string());
            }
        }

        for (kind, actual_name) in &column_map {
            let column = df.column(actual_name)?;
            if !matches!(
                column.dtype(),
                DataType::Float64
                    | DataType::Float32
                    | DataType::Int64
                    | DataType::Int32
                    | DataType::UInt64
                    | DataType::UInt32
            ) {
                return Err(EvoError::DataLoading(format!(
                    "Column '{}' ({}) must be numeric, found {:?}",
                    actual_name,
                    kind.as_str(),
                    column.dtype()
                )));
            }
        }

        Ok(column_map)
    }

    fn find_column(df: &DataFrame, column: &MarketColumn) -> Option<&'static str> {
        let columns = df.get_column_names();
        column
            .aliases()
            .into_iter()
            .find(|alias| columns.iter().any(|col| col.as_str() == *alias))
    }

    /// Timestamps must never go backwards. Null timestamps are rejected too,
    /// since the bar cannot be placed.
    pub fn validate_timestamps(df: &DataFrame, column: &str) -> Result<Vec<i64>> {
        let ts = df.column(column)?.cast(&DataType::Int64)?;
        let ts = ts.i64()?;

        let mut out = Vec::with_capacity(ts.len());
        for (i, value) in ts.into_iter().enumerate() {
            let value = value.ok_or_else(|| {
                EvoError::DataQuality(format!("Null timestamp at row {}", i))
            })?;
            if let Some(&prev) = out.last() {
                if value < prev {
                    return Err(EvoError::DataQuality(format!(
                        "Timestamp at row {} ({}) precedes previous ({})",
                        i, value, prev
                    )));
                }
            }
            out.push(value);
        }
        Ok(out)
    }

    pub fn validate_minimum_rows(df: &DataFrame, min_rows: usize) -> Result<()> {
        if df.height() < min_rows {
            return Err(EvoError::DataLoading(format!(
                "Insufficient data: {} rows, minimum {} required",
                df.height(),
                min_rows
            )));
        }
        Ok(())
    }

    /// Null counts per column, only for columns that have any.
    pub fn check_nulls(df: &DataFrame) -> Result<Vec<(String, usize)>> {
        let mut null_report = Vec::new();

        for col_name in df.get_column_names() {
            let null_count = df.column(col_name)?.null_count();
            if null_count > 0 {
                null_report.push((col_name.to_string(), null_count));
            }
        }

        Ok(null_report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::df;

    #[test]
    fn test_validate_good_data() {
        let df = df! {
            "timestamp" => &[1i64, 2, 3],
            "price" => &[100.0, 101.0, 102.0],
            "iv" => &[0.2, 0.21, 0.19],
        }
        .unwrap();

        let map = DataValidator::validate_market_columns(&df).unwrap();
        assert_eq!(map[&MarketColumn::ImpliedVol], "iv");
        assert!(!map.contains_key(&MarketColumn::Spread));
    }

    #[test]
    fn test_validate_missing_column() {
        let df = df! {
            "timestamp" => &[1i64, 2],
            "price" => &[100.0, 101.0],
        }
        .unwrap();

        assert!(DataValidator::validate_market_columns(&df).is_err());
    }

    #[test]
    fn test_decreasing_timestamps_rejected() {
        let df = df! {
            "timestamp" => &[1i64, 3, 2],
        }
        .unwrap();

        assert!(matches!(
            DataValidator::validate_timestamps(&df, "timestamp"),
            Err(EvoError::DataQuality(_))
        ));
    }

    #[test]
    fn test_null_report() {
        let df = df! {
            "price" => &[Some(100.0), None, Some(101.0)],
        }
        .unwrap();

        let report = DataValidator::check_nulls(&df).unwrap();
        assert_eq!(report, vec![("price".to_string(), 1)]);
    }
}
