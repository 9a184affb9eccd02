use crate::config::Config;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

pub const AGE_GROUP: &str = "Age_Group";
pub const STAGE: &str = "Stage";
pub const YEAR: &str = "Year";
pub const COUNT: &str = "Count";

/// One row of the case-count table. Null cells are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub age_group: Option<String>,
    pub stage: Option<String>,
    pub year: Option<i64>,
    pub count: Option<u64>,
}

/// Which of the known columns a table carries, plus its full column order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Columns {
    pub names: Vec<String>,
    pub has_age_group: bool,
    pub has_stage: bool,
    pub has_year: bool,
    pub has_count: bool,
}

impl Columns {
    pub fn from_names(names: Vec<String>) -> Self {
        let has = |wanted: &str| names.iter().any(|n| n == wanted);
        Columns {
            has_age_group: has(AGE_GROUP),
            has_stage: has(STAGE),
            has_year: has(YEAR),
            has_count: has(COUNT),
            names,
        }
    }

    /// Inline notices for the features a missing column disables.
    pub fn notices(&self) -> Vec<String> {
        let mut notices = Vec::new();
        if self.names.is_empty() {
            return notices;
        }
        if !self.has_age_group {
            notices.push(format!(
                "No '{AGE_GROUP}' column: age group filters will not match any row."
            ));
        }
        if !self.has_stage {
            notices.push(format!(
                "No '{STAGE}' column: stage filters and the stage chart are unavailable."
            ));
        }
        if !self.has_year {
            notices.push(format!("No '{YEAR}' column: the yearly trend chart is unavailable."));
        }
        if !self.has_count {
            notices.push(format!("No '{COUNT}' column: charts count rows instead of cases."));
        }
        notices
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Source {
    Sample,
    File(PathBuf),
    View,
    Synthesized,
    Empty,
}

/// An immutable table: the polars frame for display and export, and the
/// typed records the engine works on. `records[i]` is row `i` of `frame`.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub name: String,
    pub source: Source,
    pub frame: DataFrame,
    pub records: Vec<Record>,
    pub columns: Columns,
}

/// Lookup criteria. Blank inputs are stored as `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Criteria {
    pub age_group: Option<String>,
    pub stage: Option<String>,
}

impl Criteria {
    pub fn new(age_group: &str, stage: &str) -> Self {
        fn clean(value: &str) -> Option<String> {
            let value = value.trim();
            (!value.is_empty()).then(|| value.to_string())
        }
        Criteria {
            age_group: clean(age_group),
            stage: clean(stage),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.age_group.is_none() && self.stage.is_none()
    }
}

/// What to do when a lookup finds no rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FallbackPolicy {
    ZeroEstimate,
    NearestEstimate,
    #[default]
    Constructed,
}

impl FallbackPolicy {
    pub const ALL: [FallbackPolicy; 3] = [
        FallbackPolicy::ZeroEstimate,
        FallbackPolicy::NearestEstimate,
        FallbackPolicy::Constructed,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            FallbackPolicy::ZeroEstimate => "Zero count",
            FallbackPolicy::NearestEstimate => "Nearest age group",
            FallbackPolicy::Constructed => "New row from input",
        }
    }
}

/// How a lookup result was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    ZeroEstimate,
    NearestEstimate { bucket: String, distance: f64 },
    Constructed,
}

impl MatchKind {
    pub fn is_exact(&self) -> bool {
        matches!(self, MatchKind::Exact)
    }

    pub fn label(&self) -> String {
        match self {
            MatchKind::Exact => "Exact match".to_string(),
            MatchKind::ZeroEstimate => "Estimate: combination not recorded, count 0".to_string(),
            MatchKind::NearestEstimate { bucket, distance } => {
                format!("Estimate: nearest age group {bucket} (distance {distance:.1})")
            }
            MatchKind::Constructed => "Constructed from input, not in dataset".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MatchResult {
    pub criteria: Criteria,
    pub kind: MatchKind,
    pub view: Dataset,
    pub total: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupKey {
    Stage,
    Year,
}

impl GroupKey {
    pub fn column(&self) -> &'static str {
        match self {
            GroupKey::Stage => STAGE,
            GroupKey::Year => YEAR,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupValue {
    Label(String),
    Year(i64),
}

impl fmt::Display for GroupValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupValue::Label(label) => f.write_str(label),
            GroupValue::Year(year) => write!(f, "{year}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSummary {
    pub column: String,
    pub dtype: String,
    pub count: usize,
    pub nulls: usize,
    pub distinct: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub age: u32,
    pub bucket: String,
    pub kind: MatchKind,
    pub matched_bucket: Option<String>,
    pub most_frequent_stage: Option<String>,
    pub recorded_count: Option<u64>,
}

/// Saved alongside a CSV export so the estimate/exact tag is not lost.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub dataset: String,
    pub criteria: Criteria,
    pub result: MatchKind,
    pub rows: usize,
    pub total: Option<u64>,
    pub stage_counts: Vec<(GroupValue, u64)>,
    pub year_counts: Vec<(GroupValue, u64)>,
}

pub struct AppState {
    pub config: Config,
    pub dataset: Dataset,
    pub load_notice: Option<String>,
    pub use_sample: bool,
    pub policy: FallbackPolicy,
    pub selected_tab: Tab,
    pub age_group_input: String,
    pub stage_input: String,
    pub result: Option<MatchResult>,
    pub stage_counts: Vec<(GroupValue, u64)>,
    pub year_counts: Vec<(GroupValue, u64)>,
    pub chart_notices: Vec<String>,
    pub age_input: String,
    pub prediction: Option<Result<Prediction, String>>,
    pub summary: Vec<ColumnSummary>,
    pub status: Option<Result<String, String>>,
    pub debug_output: String,
    pub debug_panel_height: f32,
    pub debug_panel_visible: bool,
}

#[derive(PartialEq, Debug, Clone, Copy)]
pub enum Tab {
    Query,
    Charts,
    Predict,
    Summary,
}
