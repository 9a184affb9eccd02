use crate::config::Config;
use crate::error::{DashError, Result};
use crate::models::{
    AGE_GROUP, COUNT, Columns, Dataset, GroupValue, MatchResult, Record, Report, STAGE, Source,
    YEAR,
};
use polars::prelude::*;
use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct LoadOptions {
    pub infer_schema_length: usize,
    pub missing_marker: String,
    /// Dtypes read as given instead of inferred. `Age_Group` and `Stage` are
    /// always read as strings.
    pub column_types: Vec<(String, DataType)>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Config::default().load_options()
    }
}

impl LoadOptions {
    /// Reads columns with the dtypes of `dataset`, so a CSV exported from it
    /// loads back unchanged even where a column holds only missing values.
    pub fn matching(mut self, dataset: &Dataset) -> Self {
        self.column_types = dataset
            .frame
            .get_columns()
            .iter()
            .map(|c| (c.name().to_string(), c.dtype().clone()))
            .collect();
        self
    }

    fn schema_overwrite(&self, header: &DataFrame) -> Schema {
        let mut schema = Schema::default();
        for name in header.get_column_names() {
            let name = name.as_str();
            let dtype = match name {
                AGE_GROUP | STAGE => Some(DataType::String),
                _ => self
                    .column_types
                    .iter()
                    .find(|(known, _)| known == name)
                    .map(|(_, dtype)| dtype.clone()),
            };
            if let Some(dtype) = dtype {
                schema.with_column(name.into(), dtype);
            }
        }
        schema
    }
}

/// The five-row table shown when nothing has been uploaded.
pub fn sample_dataset() -> Result<Dataset> {
    let frame = df!(
        AGE_GROUP => &["30-39", "40-49", "50-59", "60-69", "70+"],
        STAGE => &["Stage I", "Stage II", "Stage III", "Stage II", "Stage III"],
        YEAR => &[2018i64, 2019, 2020, 2021, 2022],
        COUNT => &[12i64, 25, 18, 22, 15]
    )?;
    Dataset::from_frame("Sample", Source::Sample, frame)
}

pub fn empty_dataset() -> Dataset {
    Dataset {
        name: "Empty".to_string(),
        source: Source::Empty,
        frame: DataFrame::empty(),
        records: Vec::new(),
        columns: Columns::default(),
    }
}

pub fn load_csv_dataset<P: AsRef<Path>>(path: P, options: &LoadOptions) -> Result<Dataset> {
    let path = path.as_ref();
    let bytes = fs::read(path)?;
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("csv")
        .to_string();
    let dataset = load_csv_bytes(name, Source::File(path.to_path_buf()), bytes, options)?;
    tracing::info!(
        path = %path.display(),
        rows = dataset.len(),
        columns = dataset.columns.names.len(),
        "loaded CSV dataset"
    );
    Ok(dataset)
}

pub fn load_csv_bytes(
    name: impl Into<String>,
    source: Source,
    bytes: Vec<u8>,
    options: &LoadOptions,
) -> Result<Dataset> {
    let header = CsvReader::new(Cursor::new(bytes.clone()))
        .with_options(
            CsvReadOptions::default()
                .with_has_header(true)
                .with_infer_schema_length(Some(0))
                .with_n_rows(Some(0)),
        )
        .finish()?;
    let overwrite = options.schema_overwrite(&header);

    let marker = options.missing_marker.clone();
    let frame = CsvReader::new(Cursor::new(bytes))
        .with_options(
            CsvReadOptions::default()
                .with_has_header(true)
                .with_infer_schema_length(Some(options.infer_schema_length))
                .with_schema_overwrite(Some(Arc::new(overwrite)))
                .map_parse_options(move |parse| {
                    parse.with_null_values(Some(NullValues::AllColumnsSingle(
                        marker.clone().into(),
                    )))
                }),
        )
        .finish()?;
    Dataset::from_frame(name, source, frame)
}

/// Loads `path`, or falls back to the sample (or an empty table when the
/// sample is disabled). The second value is the load failure to show the user.
pub fn load_or_fallback(path: Option<&Path>, config: &Config) -> (Dataset, Option<String>) {
    let failure = match path {
        Some(path) => match load_csv_dataset(path, &config.load_options()) {
            Ok(dataset) => return (dataset, None),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "could not load CSV");
                Some(format!("Error reading {}: {}", path.display(), err))
            }
        },
        None => None,
    };

    (fallback_dataset(config.use_sample), failure)
}

pub fn fallback_dataset(use_sample: bool) -> Dataset {
    if use_sample {
        match sample_dataset() {
            Ok(sample) => return sample,
            Err(err) => tracing::error!(error = %err, "could not build the sample dataset"),
        }
    }
    empty_dataset()
}

pub fn export_csv<W: Write>(dataset: &Dataset, writer: W, missing_marker: &str) -> Result<()> {
    let mut frame = dataset.frame.clone();
    CsvWriter::new(writer)
        .include_header(true)
        .with_null_value(missing_marker.to_string())
        .finish(&mut frame)?;
    tracing::debug!(name = %dataset.name, rows = dataset.len(), "exported CSV");
    Ok(())
}

pub fn export_report<W: Write>(
    result: &MatchResult,
    stage_counts: &[(GroupValue, u64)],
    year_counts: &[(GroupValue, u64)],
    writer: W,
) -> Result<()> {
    let report = Report {
        dataset: result.view.name.clone(),
        criteria: result.criteria.clone(),
        result: result.kind.clone(),
        rows: result.view.len(),
        total: result.total,
        stage_counts: stage_counts.to_vec(),
        year_counts: year_counts.to_vec(),
    };
    serde_json::to_writer_pretty(writer, &report)?;
    Ok(())
}

fn normalize(frame: &mut DataFrame) -> PolarsResult<()> {
    for (name, dtype) in [
        (AGE_GROUP, DataType::String),
        (STAGE, DataType::String),
        (YEAR, DataType::Int64),
        (COUNT, DataType::Int64),
    ] {
        let casted = match frame.column(name) {
            Ok(column) if column.dtype() != &dtype => column.cast(&dtype)?,
            _ => continue,
        };
        frame.with_column(casted)?;
    }

    // Labels are compared verbatim: drop surrounding whitespace, blanks are null.
    for name in [AGE_GROUP, STAGE] {
        let trimmed: Vec<Option<String>> = match frame.column(name) {
            Ok(column) => column
                .as_materialized_series()
                .str()?
                .into_iter()
                .map(|v| v.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string))
                .collect(),
            Err(_) => continue,
        };
        frame.with_column(Series::new(name.into(), trimmed))?;
    }
    Ok(())
}

fn labels(frame: &DataFrame, name: &str) -> PolarsResult<Vec<Option<String>>> {
    match frame.column(name) {
        Ok(column) => Ok(column
            .as_materialized_series()
            .str()?
            .into_iter()
            .map(|v| v.map(str::to_string))
            .collect()),
        Err(_) => Ok(vec![None; frame.height()]),
    }
}

fn integers(frame: &DataFrame, name: &str) -> PolarsResult<Vec<Option<i64>>> {
    match frame.column(name) {
        Ok(column) => Ok(column.as_materialized_series().i64()?.into_iter().collect()),
        Err(_) => Ok(vec![None; frame.height()]),
    }
}

impl Dataset {
    /// Normalises the known columns and extracts typed records.
    pub fn from_frame(name: impl Into<String>, source: Source, mut frame: DataFrame) -> Result<Self> {
        normalize(&mut frame)?;

        let age_groups = labels(&frame, AGE_GROUP)?;
        let stages = labels(&frame, STAGE)?;
        let years = integers(&frame, YEAR)?;
        let counts = integers(&frame, COUNT)?;

        let mut records = Vec::with_capacity(frame.height());
        for (row, (((age_group, stage), year), count)) in age_groups
            .into_iter()
            .zip(stages)
            .zip(years)
            .zip(counts)
            .enumerate()
        {
            let count = match count {
                Some(value) if value < 0 => return Err(DashError::InvalidCount { row, value }),
                other => other.map(|v| v as u64),
            };
            records.push(Record {
                age_group,
                stage,
                year,
                count,
            });
        }

        let columns = Columns::from_names(
            frame
                .get_column_names()
                .iter()
                .map(|s| s.to_string())
                .collect(),
        );

        Ok(Dataset {
            name: name.into(),
            source,
            frame,
            records,
            columns,
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Derived view holding the given rows, in table order.
    pub fn select_rows(&self, rows: &[usize]) -> Result<Dataset> {
        let mut keep = vec![false; self.frame.height()];
        for &row in rows {
            if let Some(slot) = keep.get_mut(row) {
                *slot = true;
            }
        }
        let mask = BooleanChunked::from_slice("mask".into(), &keep);
        let frame = self.frame.filter(&mask)?;
        let records = self
            .records
            .iter()
            .zip(&keep)
            .filter(|(_, keep)| **keep)
            .map(|(record, _)| record.clone())
            .collect();

        Ok(Dataset {
            name: self.name.clone(),
            source: Source::View,
            frame,
            records,
            columns: self.columns.clone(),
        })
    }

    /// One-row table laid out like this dataset. Columns other than the four
    /// known ones are null; `Age_Group` and `Stage` are always present.
    pub fn synthesize(&self, record: &Record) -> Result<Dataset> {
        let mut names: Vec<String> = Vec::new();
        for required in [AGE_GROUP, STAGE] {
            if !self.columns.names.iter().any(|n| n == required) {
                names.push(required.to_string());
            }
        }
        names.extend(self.columns.names.iter().cloned());

        let mut columns: Vec<Column> = Vec::with_capacity(names.len());
        for name in &names {
            let name = name.as_str();
            let series = match name {
                AGE_GROUP => Series::new(name.into(), &[record.age_group.as_deref()]),
                STAGE => Series::new(name.into(), &[record.stage.as_deref()]),
                YEAR => Series::new(name.into(), &[record.year]),
                COUNT => Series::new(name.into(), &[record.count.map(|c| c as i64)]),
                _ => {
                    let dtype = self.frame.column(name)?.dtype().clone();
                    Series::full_null(name.into(), 1, &dtype)
                }
            };
            columns.push(series.into());
        }

        let frame = DataFrame::new(columns)?;
        Dataset::from_frame(self.name.clone(), Source::Synthesized, frame)
    }

    pub fn known_age_groups(&self) -> Vec<String> {
        distinct_sorted(self.records.iter().filter_map(|r| r.age_group.as_deref()))
    }

    pub fn known_stages(&self) -> Vec<String> {
        distinct_sorted(self.records.iter().filter_map(|r| r.stage.as_deref()))
    }
}

fn distinct_sorted<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = values.map(str::to_string).collect();
    out.sort();
    out.dedup();
    out
}
