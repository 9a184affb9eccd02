//! Error types shared by the engine and the dashboard.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DashError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Column '{0}' is missing from the dataset")]
    MissingColumn(String),

    #[error("Count must be a non-negative integer (row {row}: {value})")]
    InvalidCount { row: usize, value: i64 },

    #[error("Count total does not fit in 64 bits")]
    CountOverflow,

    #[error("Nothing to aggregate: the table has no rows")]
    EmptyInput,

    #[error("Age {age} is outside the accepted range 0-{max}")]
    AgeOutOfRange { age: i64, max: u32 },

    #[error("Invalid value for {key}: '{value}'")]
    InvalidConfig { key: String, value: String },
}

pub type Result<T> = std::result::Result<T, DashError>;
