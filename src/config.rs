use crate::data::LoadOptions;
use crate::error::DashError;
use crate::models::FallbackPolicy;
use dotenv::dotenv;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

pub const INFER_SCHEMA_LENGTH: &str = "STAGELENS_INFER_SCHEMA_LENGTH";
pub const FALLBACK: &str = "STAGELENS_FALLBACK";
pub const MAX_AGE: &str = "STAGELENS_MAX_AGE";
pub const MISSING_MARKER: &str = "STAGELENS_MISSING_MARKER";
pub const USE_SAMPLE: &str = "STAGELENS_USE_SAMPLE";
pub const DATA: &str = "STAGELENS_DATA";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub infer_schema_length: usize,
    pub fallback: FallbackPolicy,
    pub max_age: u32,
    pub missing_marker: String,
    pub use_sample: bool,
    pub data_path: Option<PathBuf>,
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            infer_schema_length: 10_000,
            fallback: FallbackPolicy::Constructed,
            max_age: 120,
            missing_marker: "NA".to_string(),
            use_sample: true,
            data_path: None,
            log_filter: "stagelens=info".to_string(),
        }
    }
}

impl FromStr for FallbackPolicy {
    type Err = DashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "zero" | "zero-estimate" | "zero_estimate" => Ok(FallbackPolicy::ZeroEstimate),
            "nearest" | "nearest-estimate" | "nearest_estimate" => {
                Ok(FallbackPolicy::NearestEstimate)
            }
            "constructed" | "new-row" | "new_row" => Ok(FallbackPolicy::Constructed),
            _ => Err(DashError::InvalidConfig {
                key: FALLBACK.to_string(),
                value: s.to_string(),
            }),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Config {
    /// Reads `.env` then the process environment.
    ///
    /// Invalid values keep their default and are returned so the caller can
    /// log them once logging is up.
    pub fn from_env() -> (Self, Vec<DashError>) {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> (Self, Vec<DashError>)
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();
        let mut issues = Vec::new();
        let mut invalid = |key: &str, value: &str| {
            issues.push(DashError::InvalidConfig {
                key: key.to_string(),
                value: value.to_string(),
            })
        };

        if let Some(val) = lookup(INFER_SCHEMA_LENGTH) {
            match val.trim().parse::<usize>() {
                Ok(n) if n > 0 => config.infer_schema_length = n,
                _ => invalid(INFER_SCHEMA_LENGTH, &val),
            }
        }
        if let Some(val) = lookup(FALLBACK) {
            match val.parse::<FallbackPolicy>() {
                Ok(policy) => config.fallback = policy,
                Err(_) => invalid(FALLBACK, &val),
            }
        }
        if let Some(val) = lookup(MAX_AGE) {
            match val.trim().parse::<u32>() {
                Ok(n) => config.max_age = n,
                Err(_) => invalid(MAX_AGE, &val),
            }
        }
        if let Some(val) = lookup(MISSING_MARKER) {
            config.missing_marker = val;
        }
        if let Some(val) = lookup(USE_SAMPLE) {
            match parse_bool(&val) {
                Some(flag) => config.use_sample = flag,
                None => invalid(USE_SAMPLE, &val),
            }
        }
        if let Some(val) = lookup(DATA) {
            if !val.trim().is_empty() {
                config.data_path = Some(PathBuf::from(val.trim()));
            }
        }
        if let Some(val) = lookup("RUST_LOG") {
            config.log_filter = val;
        }

        (config, issues)
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            infer_schema_length: self.infer_schema_length,
            missing_marker: self.missing_marker.clone(),
            column_types: Vec::new(),
        }
    }
}
