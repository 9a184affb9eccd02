use crate::bucket::bucketize;
use crate::error::{DashError, Result};
use crate::lookup::LookupEngine;
use crate::models::{Criteria, Dataset, FallbackPolicy, MatchKind, Prediction, Record};

/// Maps an age to its bucket and reports what the table holds for it,
/// borrowing the nearest recorded age group when the bucket is absent.
#[derive(Debug, Clone, Copy)]
pub struct Predictor {
    max_age: u32,
    engine: LookupEngine,
}

impl Predictor {
    pub fn new(max_age: u32) -> Self {
        Self {
            max_age,
            engine: LookupEngine::new(FallbackPolicy::NearestEstimate),
        }
    }

    pub fn max_age(&self) -> u32 {
        self.max_age
    }

    pub fn predict(&self, dataset: &Dataset, age: i64) -> Result<Prediction> {
        if age < 0 || age > i64::from(self.max_age) {
            return Err(DashError::AgeOutOfRange {
                age,
                max: self.max_age,
            });
        }
        let age = age as u32;
        let bucket = bucketize(age);
        let result = self.engine.lookup(dataset, &Criteria::new(bucket, ""))?;

        let matched_bucket = match &result.kind {
            MatchKind::Exact => Some(bucket.to_string()),
            MatchKind::NearestEstimate { bucket, .. } => Some(bucket.clone()),
            MatchKind::ZeroEstimate | MatchKind::Constructed => None,
        };
        let (most_frequent_stage, recorded_count) = if matched_bucket.is_some() {
            (most_frequent_stage(&result.view.records), result.total)
        } else {
            (None, None)
        };

        tracing::info!(
            age,
            bucket,
            outcome = %result.kind.label(),
            stage = most_frequent_stage.as_deref().unwrap_or("-"),
            "prediction"
        );

        Ok(Prediction {
            age,
            bucket: bucket.to_string(),
            kind: result.kind,
            matched_bucket,
            most_frequent_stage,
            recorded_count,
        })
    }
}

/// Stage on the most rows; ties go to the one seen first.
pub fn most_frequent_stage(records: &[Record]) -> Option<String> {
    let mut tally: Vec<(&str, usize)> = Vec::new();
    for stage in records.iter().filter_map(|r| r.stage.as_deref()) {
        match tally.iter().position(|(s, _)| *s == stage) {
            Some(i) => tally[i].1 += 1,
            None => tally.push((stage, 1)),
        }
    }

    let mut best: Option<(&str, usize)> = None;
    for (stage, n) in tally {
        if best.is_none_or(|(_, top)| n > top) {
            best = Some((stage, n));
        }
    }
    best.map(|(stage, _)| stage.to_string())
}
