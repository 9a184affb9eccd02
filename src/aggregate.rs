//! Chart series and summary statistics over a table or view.

use crate::error::{DashError, Result};
use crate::models::{ColumnSummary, Dataset, GroupKey, GroupValue, Record};
use polars::prelude::*;
use std::collections::{BTreeMap, HashMap};

/// Sums `Count` per group, or counts rows when there is no `Count` column.
///
/// Stages come out in first-seen order, years ascending. Rows with a null
/// key are skipped.
pub fn aggregate_by(dataset: &Dataset, key: GroupKey) -> Result<Vec<(GroupValue, u64)>> {
    if dataset.is_empty() {
        return Err(DashError::EmptyInput);
    }
    let has_key = match key {
        GroupKey::Stage => dataset.columns.has_stage,
        GroupKey::Year => dataset.columns.has_year,
    };
    if !has_key {
        return Err(DashError::MissingColumn(key.column().to_string()));
    }

    let has_count = dataset.columns.has_count;
    let weight = |r: &Record| if has_count { r.count.unwrap_or(0) } else { 1 };

    let groups = match key {
        GroupKey::Stage => {
            let mut order: Vec<(GroupValue, u64)> = Vec::new();
            let mut index: HashMap<&str, usize> = HashMap::new();
            for record in &dataset.records {
                let Some(stage) = record.stage.as_deref() else {
                    continue;
                };
                let slot = *index.entry(stage).or_insert_with(|| {
                    order.push((GroupValue::Label(stage.to_string()), 0));
                    order.len() - 1
                });
                order[slot].1 = add_count(order[slot].1, weight(record))?;
            }
            order
        }
        GroupKey::Year => {
            let mut years: BTreeMap<i64, u64> = BTreeMap::new();
            for record in &dataset.records {
                if let Some(year) = record.year {
                    let total = years.entry(year).or_insert(0);
                    *total = add_count(*total, weight(record))?;
                }
            }
            years
                .into_iter()
                .map(|(year, total)| (GroupValue::Year(year), total))
                .collect()
        }
    };

    tracing::debug!(?key, groups = groups.len(), "aggregated");
    Ok(groups)
}

fn add_count(total: u64, count: u64) -> Result<u64> {
    total.checked_add(count).ok_or(DashError::CountOverflow)
}

/// Per-column counts, plus min/max/mean for numeric columns.
pub fn summarize(dataset: &Dataset) -> Result<Vec<ColumnSummary>> {
    let mut out = Vec::with_capacity(dataset.frame.width());
    for column in dataset.frame.get_columns() {
        let series = column.as_materialized_series();
        let nulls = series.null_count();
        let distinct = series.drop_nulls().n_unique()?;

        let numeric = matches!(
            series.dtype(),
            DataType::Int32
                | DataType::Int64
                | DataType::UInt32
                | DataType::UInt64
                | DataType::Float32
                | DataType::Float64
        );
        let (min, max, mean) = if numeric {
            let values: Vec<f64> = series
                .cast(&DataType::Float64)?
                .f64()?
                .into_iter()
                .flatten()
                .collect();
            numeric_stats(&values)
        } else {
            (None, None, None)
        };

        out.push(ColumnSummary {
            column: series.name().to_string(),
            dtype: series.dtype().to_string(),
            count: series.len() - nulls,
            nulls,
            distinct,
            min,
            max,
            mean,
        });
    }
    Ok(out)
}

fn numeric_stats(values: &[f64]) -> (Option<f64>, Option<f64>, Option<f64>) {
    if values.is_empty() {
        return (None, None, None);
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    (Some(min), Some(max), Some(mean))
}
