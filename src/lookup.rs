//! Exact age-group/stage lookup with a configurable miss policy.

use crate::bucket::midpoint;
use crate::error::{DashError, Result};
use crate::models::{Criteria, Dataset, FallbackPolicy, MatchKind, MatchResult, Record};

#[derive(Debug, Clone, Copy, Default)]
pub struct LookupEngine {
    policy: FallbackPolicy,
}

impl LookupEngine {
    pub fn new(policy: FallbackPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> FallbackPolicy {
        self.policy
    }

    /// Rows equal to every provided criterion. A miss is resolved by the
    /// engine's policy, never reported as an error.
    pub fn lookup(&self, dataset: &Dataset, criteria: &Criteria) -> Result<MatchResult> {
        let rows = exact_rows(dataset, criteria);
        if !rows.is_empty() || criteria.is_empty() {
            tracing::debug!(rows = rows.len(), ?criteria, "exact match");
            return finish(dataset.select_rows(&rows)?, criteria, MatchKind::Exact);
        }

        match self.policy {
            FallbackPolicy::ZeroEstimate => {
                let bucket_known = criteria.age_group.as_deref().is_some_and(|wanted| {
                    dataset
                        .records
                        .iter()
                        .any(|r| r.age_group.as_deref() == Some(wanted))
                });
                if bucket_known {
                    let record = Record {
                        age_group: criteria.age_group.clone(),
                        stage: criteria.stage.clone(),
                        year: None,
                        count: dataset.columns.has_count.then_some(0),
                    };
                    tracing::info!(?criteria, "no rows, reporting zero count");
                    return finish(dataset.synthesize(&record)?, criteria, MatchKind::ZeroEstimate);
                }
            }
            FallbackPolicy::NearestEstimate => {
                if let Some((rows, bucket, distance)) = nearest_rows(dataset, criteria) {
                    tracing::info!(?criteria, %bucket, distance, "no rows, using nearest age group");
                    return finish(
                        dataset.select_rows(&rows)?,
                        criteria,
                        MatchKind::NearestEstimate { bucket, distance },
                    );
                }
            }
            FallbackPolicy::Constructed => {}
        }

        if self.policy != FallbackPolicy::Constructed {
            tracing::info!(policy = ?self.policy, ?criteria, "fallback not applicable, constructing row");
        }
        constructed(dataset, criteria)
    }
}

pub fn exact_rows(dataset: &Dataset, criteria: &Criteria) -> Vec<usize> {
    fn accepts(wanted: &Option<String>, value: &Option<String>) -> bool {
        match wanted {
            Some(wanted) => value.as_deref() == Some(wanted.as_str()),
            None => true,
        }
    }

    dataset
        .records
        .iter()
        .enumerate()
        .filter(|(_, r)| accepts(&criteria.age_group, &r.age_group) && accepts(&criteria.stage, &r.stage))
        .map(|(i, _)| i)
        .collect()
}

/// Rows in the age group whose midpoint is closest to the requested one.
///
/// Candidates are the rows with the requested stage when any exist, else the
/// whole table. Ties go to the earliest row.
pub fn nearest_rows(dataset: &Dataset, criteria: &Criteria) -> Option<(Vec<usize>, String, f64)> {
    let target = midpoint(criteria.age_group.as_deref()?)?;
    let records = &dataset.records;

    let mut pool: Vec<usize> = match criteria.stage.as_deref() {
        Some(stage) => (0..records.len())
            .filter(|&i| records[i].stage.as_deref() == Some(stage))
            .collect(),
        None => Vec::new(),
    };
    if pool.is_empty() {
        pool = (0..records.len()).collect();
    }

    let mut best: Option<(usize, f64)> = None;
    for &i in &pool {
        let Some(mid) = records[i].age_group.as_deref().and_then(midpoint) else {
            continue;
        };
        let distance = (mid - target).abs();
        if best.is_none_or(|(_, d)| distance < d) {
            best = Some((i, distance));
        }
    }

    let (winner, distance) = best?;
    let bucket = records[winner].age_group.clone()?;
    let rows = pool
        .into_iter()
        .filter(|&i| records[i].age_group.as_deref() == Some(bucket.as_str()))
        .collect();
    Some((rows, bucket, distance))
}

fn constructed(dataset: &Dataset, criteria: &Criteria) -> Result<MatchResult> {
    let record = Record {
        age_group: criteria.age_group.clone(),
        stage: criteria.stage.clone(),
        year: None,
        count: None,
    };
    finish(dataset.synthesize(&record)?, criteria, MatchKind::Constructed)
}

fn finish(view: Dataset, criteria: &Criteria, kind: MatchKind) -> Result<MatchResult> {
    let total = total_count(&view)?;
    Ok(MatchResult {
        criteria: criteria.clone(),
        kind,
        view,
        total,
    })
}

/// Sum of the recorded counts, `None` when there is nothing to sum.
pub fn total_count(dataset: &Dataset) -> Result<Option<u64>> {
    if !dataset.columns.has_count {
        return Ok(None);
    }
    let mut total: Option<u64> = None;
    for count in dataset.records.iter().filter_map(|r| r.count) {
        let sum = total.unwrap_or(0).checked_add(count);
        total = Some(sum.ok_or(DashError::CountOverflow)?);
    }
    Ok(total)
}
