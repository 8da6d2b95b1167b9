use super::{
    types::{DatasetMetadata, MarketColumn},
    validator::DataValidator,
};
use crate::data::market::{MarketBar, MarketDataWindow};
use crate::error::{EvoError, Result};
use polars::prelude::*;
use std::collections::HashMap;
use std::path::Path;

pub struct CsvConnector;

impl CsvConnector {
    /// Load CSV file into DataFrame
    pub fn load<P: AsRef<Path>>(path: P) -> Result<DataFrame> {
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(path.as_ref().to_path_buf()))?
            .finish()
            .map_err(|e| EvoError::DataLoading(format!("Failed to read CSV: {}", e)))?;

        Ok(df)
    }

    /// Load one symbol's bars from a CSV file into a window.
    pub fn load_window<P: AsRef<Path>>(
        path: P,
        symbol: &str,
        min_rows: Option<usize>,
    ) -> Result<MarketDataWindow> {
        let df = Self::load(&path)?;
        DataValidator::validate_minimum_rows(&df, min_rows.unwrap_or(2))?;

        // Nulls become missing bars, not failures.
        let null_report = DataValidator::check_nulls(&df)?;
        if !null_report.is_empty() {
            log::warn!(
                "{}: null values detected: {:?}",
                path.as_ref().display(),
                null_report
            );
        }

        let mut window = MarketDataWindow::new();
        window.insert(symbol, Self::to_bars(&df)?)?;
        log::info!(
            "Loaded {} bars for {} from {}",
            df.height(),
            symbol,
            path.as_ref().display()
        );
        Ok(window)
    }

    /// Convert a validated frame into bars.
    pub fn to_bars(df: &DataFrame) -> Result<Vec<MarketBar>> {
        let column_map = DataValidator::validate_market_columns(df)?;
        let timestamps = DataValidator::validate_timestamps(df, &column_map[&MarketColumn::Timestamp])?;

        let price = Self::float_column(df, &column_map, MarketColumn::Price)?;
        let iv = Self::float_column(df, &column_map, MarketColumn::ImpliedVol)?;
        let spread = Self::float_column(df, &column_map, MarketColumn::Spread)?;
        let depth = Self::float_column(df, &column_map, MarketColumn::Depth)?;

        let at = |col: &Option<Vec<Option<f64>>>, i: usize| col.as_ref().and_then(|v| v[i]);

        Ok(timestamps
            .into_iter()
            .enumerate()
            .map(|(i, timestamp)| MarketBar {
                timestamp,
                price: at(&price, i),
                implied_vol: at(&iv, i),
                spread: at(&spread, i),
                depth: at(&depth, i),
            })
            .collect())
    }

    fn float_column(
        df: &DataFrame,
        column_map: &HashMap<MarketColumn, String>,
        kind: MarketColumn,
    ) -> Result<Option<Vec<Option<f64>>>> {
        let Some(name) = column_map.get(&kind) else {
            return Ok(None);
        };
        let column = df.column(name)?.cast(&DataType::Float64)?;
        Ok(Some(column.f64()?.into_iter().collect()))
    }

    pub fn create_metadata<P: AsRef<Path>>(
        path: P,
        symbol: &str,
        df: &DataFrame,
    ) -> Result<DatasetMetadata> {
        let column_map = DataValidator::validate_market_columns(df)?;
        let timestamps = DataValidator::validate_timestamps(df, &column_map[&MarketColumn::Timestamp])?;

        let price = df
            .column(&column_map[&MarketColumn::Price])?
            .cast(&DataType::Float64)?;
        let price = price.f64()?;

        Ok(DatasetMetadata {
            file_path: path.as_ref().to_string_lossy().to_string(),
            symbol: symbol.to_string(),
            num_rows: df.height(),
            columns: df.get_column_names().iter().map(|s| s.to_string()).collect(),
            first_timestamp: timestamps.first().copied(),
            last_timestamp: timestamps.last().copied(),
            price_range: (price.min().unwrap_or(0.0), price.max().unwrap_or(0.0)),
            null_counts: DataValidator::check_nulls(df)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::df;
    use std::io::Write;

    #[test]
    fn test_to_bars_maps_aliases_and_nulls() {
        let df = df! {
            "ts" => &[1i64, 2, 3],
            "close" => &[Some(100.0), None, Some(102.0)],
            "iv" => &[0.2, 0.2, 0.25],
            "spread" => &[0.001, 0.002, 0.001],
        }
        .unwrap();

        let bars = CsvConnector::to_bars(&df).unwrap();
        assert_eq!(bars.len(), 3);
        assert!(bars[1].usable().is_none());
        assert_eq!(bars[2].price, Some(102.0));
        assert_eq!(bars[0].spread, Some(0.001));
        assert_eq!(bars[0].depth, None);
    }

    #[test]
    fn test_load_window_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "timestamp,price,implied_vol").unwrap();
        writeln!(file, "1000,100.0,0.2").unwrap();
        writeln!(file, "2000,,0.2").unwrap();
        writeln!(file, "3000,101.5,0.22").unwrap();
        file.flush().unwrap();

        let window = CsvConnector::load_window(file.path(), "SPX", None).unwrap();
        let bars = window.bars("SPX").unwrap();
        assert_eq!(bars.len(), 3);
        assert_eq!(bars.iter().filter(|b| b.usable().is_some()).count(), 2);
    }

    #[test]
    fn test_metadata() {
        let df = df! {
            "timestamp" => &[10i64, 20],
            "price" => &[99.0, 105.0],
            "implied_vol" => &[0.2, 0.3],
        }
        .unwrap();

        let meta = CsvConnector::create_metadata("spx.csv", "SPX", &df).unwrap();
        assert_eq!(meta.num_rows, 2);
        assert_eq!(meta.first_timestamp, Some(10));
        assert_eq!(meta.price_range, (99.0, 105.0));
    }
}
