//! End-to-end checks: load, query, aggregate, export and reload.

use polars::prelude::*;
use stagelens::aggregate::aggregate_by;
use stagelens::bucket::{BUCKETS, bucket_index, bucketize};
use stagelens::config::Config;
use stagelens::data::{
    LoadOptions, export_csv, export_report, load_csv_bytes, load_csv_dataset, load_or_fallback,
    sample_dataset,
};
use stagelens::lookup::LookupEngine;
use stagelens::models::{
    AGE_GROUP, COUNT, Criteria, Dataset, FallbackPolicy, GroupKey, MatchKind, STAGE, Source, YEAR,
};
use stagelens::predict::Predictor;

const CASES_CSV: &str = "\
Age_Group,Stage,Year,Count,District
30-39,Stage I,2018,12,Chennai
40-49,Stage II,2019,25,Madurai
50-59,Stage III,2020,18,Salem
60-69,Stage II,2021,22,Chennai
70+,Stage III,2022,15,Trichy
40-49,Stage II,2020,9,Chennai
40-49,Stage I,2021,4,Salem
";

fn cases() -> Dataset {
    load_csv_bytes(
        "cases.csv",
        Source::View,
        CASES_CSV.as_bytes().to_vec(),
        &LoadOptions::default(),
    )
    .unwrap()
}

fn round_trip(view: &Dataset, marker: &str) -> Dataset {
    let mut buf = Vec::new();
    export_csv(view, &mut buf, marker).unwrap();
    let options = LoadOptions {
        missing_marker: marker.to_string(),
        ..LoadOptions::default()
    }
    .matching(view);
    load_csv_bytes("reloaded", Source::View, buf, &options).unwrap()
}

// ============================================================================
// Bucketizer
// ============================================================================

#[test]
fn test_bucketize_documented_boundaries() {
    assert_eq!(bucketize(9), "0-9");
    assert_eq!(bucketize(10), "10-19");
    assert_eq!(bucketize(70), "70+");
    assert_eq!(bucketize(119), "70+");
}

#[test]
fn test_bucketize_total_and_monotonic() {
    for a1 in 0..=120u32 {
        for a2 in a1..=120u32 {
            assert!(bucket_index(a1) <= bucket_index(a2));
        }
        assert!(BUCKETS.contains(&bucketize(a1)));
    }
}

// ============================================================================
// Lookup
// ============================================================================

#[test]
fn test_lookup_empty_criteria_is_exact_everything() {
    let ds = cases();
    let result = LookupEngine::new(FallbackPolicy::NearestEstimate)
        .lookup(&ds, &Criteria::new("", ""))
        .unwrap();
    assert_eq!(result.kind, MatchKind::Exact);
    assert_eq!(result.view.len(), ds.len());
    assert!(result.view.frame.equals_missing(&ds.frame));
}

#[test]
fn test_lookup_sums_across_years() {
    let ds = cases();
    let result = LookupEngine::default()
        .lookup(&ds, &Criteria::new("40-49", "Stage II"))
        .unwrap();
    assert!(result.kind.is_exact());
    assert_eq!(result.view.len(), 2);
    assert_eq!(result.total, Some(34));
}

#[test]
fn test_lookup_nearest_two_row_table() {
    let frame = df!(AGE_GROUP => &["0-9", "70+"], COUNT => &[2i64, 12]).unwrap();
    let ds = Dataset::from_frame("pair", Source::View, frame).unwrap();
    let result = LookupEngine::new(FallbackPolicy::NearestEstimate)
        .lookup(&ds, &Criteria::new("60-69", ""))
        .unwrap();
    assert!(matches!(result.kind, MatchKind::NearestEstimate { ref bucket, .. } if bucket == "70+"));
    assert_eq!(result.view.len(), 1);
    assert_eq!(result.total, Some(12));
}

#[test]
fn test_lookup_never_mutates_source() {
    let ds = cases();
    let before = ds.frame.clone();
    for policy in FallbackPolicy::ALL {
        let engine = LookupEngine::new(policy);
        engine.lookup(&ds, &Criteria::new("20-29", "Stage IV")).unwrap();
        engine.lookup(&ds, &Criteria::new("70+", "Stage I")).unwrap();
    }
    assert!(ds.frame.equals_missing(&before));
    assert_eq!(ds.len(), 7);
}

#[test]
fn test_lookup_tags_every_outcome() {
    let ds = cases();
    let criteria = Criteria::new("70+", "Stage I");
    let zero = LookupEngine::new(FallbackPolicy::ZeroEstimate).lookup(&ds, &criteria).unwrap();
    let nearest = LookupEngine::new(FallbackPolicy::NearestEstimate).lookup(&ds, &criteria).unwrap();
    let constructed = LookupEngine::new(FallbackPolicy::Constructed).lookup(&ds, &criteria).unwrap();

    assert_eq!(zero.kind, MatchKind::ZeroEstimate);
    assert_eq!(zero.total, Some(0));
    match &nearest.kind {
        MatchKind::NearestEstimate { bucket, .. } => assert_eq!(bucket, "40-49"),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(constructed.kind, MatchKind::Constructed);
    assert_eq!(constructed.total, None);
    assert_eq!(constructed.view.frame.column("District").unwrap().null_count(), 1);
}

#[test]
fn test_lookup_matches_labels_as_written() {
    let csv = "Age_Group,Stage,Count\n007,1.10,3\n08,2,4\n 40-49,Stage II ,5\n";
    let ds = load_csv_bytes("codes", Source::View, csv.as_bytes().to_vec(), &LoadOptions::default())
        .unwrap();
    let engine = LookupEngine::default();

    let coded = engine.lookup(&ds, &Criteria::new("007", "1.10")).unwrap();
    assert_eq!(coded.kind, MatchKind::Exact);
    assert_eq!(coded.total, Some(3));

    let bare = engine.lookup(&ds, &Criteria::new("08", "")).unwrap();
    assert_eq!(bare.kind, MatchKind::Exact);
    assert_eq!(bare.total, Some(4));

    let padded = engine.lookup(&ds, &Criteria::new("40-49", " Stage II")).unwrap();
    assert_eq!(padded.kind, MatchKind::Exact);
    assert_eq!(padded.total, Some(5));
}

#[test]
fn test_lookup_without_age_group_column() {
    let frame = df!(STAGE => &["Stage I", "Stage II"], COUNT => &[1i64, 2]).unwrap();
    let ds = Dataset::from_frame("no-age", Source::View, frame).unwrap();
    let result = LookupEngine::new(FallbackPolicy::ZeroEstimate)
        .lookup(&ds, &Criteria::new("40-49", ""))
        .unwrap();
    assert_eq!(result.kind, MatchKind::Constructed);
    assert_eq!(result.view.columns.names, vec![AGE_GROUP, STAGE, COUNT]);
}

// ============================================================================
// Aggregation
// ============================================================================

#[test]
fn test_aggregate_conserves_count() {
    let ds = cases();
    let by_stage = aggregate_by(&ds, GroupKey::Stage).unwrap();
    let by_year = aggregate_by(&ds, GroupKey::Year).unwrap();
    let total: u64 = ds.records.iter().filter_map(|r| r.count).sum();
    assert_eq!(by_stage.iter().map(|(_, c)| c).sum::<u64>(), total);
    assert_eq!(by_year.iter().map(|(_, c)| c).sum::<u64>(), total);
    let years: Vec<String> = by_year.iter().map(|(y, _)| y.to_string()).collect();
    assert_eq!(years, vec!["2018", "2019", "2020", "2021", "2022"]);
}

#[test]
fn test_aggregate_filtered_view() {
    let ds = cases();
    let result = LookupEngine::default()
        .lookup(&ds, &Criteria::new("40-49", ""))
        .unwrap();
    let by_stage = aggregate_by(&result.view, GroupKey::Stage).unwrap();
    assert_eq!(by_stage.len(), 2);
    assert_eq!(by_stage[0].1, 34);
    assert_eq!(by_stage[1].1, 4);
}

// ============================================================================
// Export
// ============================================================================

#[test]
fn test_filtered_view_round_trip() {
    let ds = cases();
    let result = LookupEngine::default()
        .lookup(&ds, &Criteria::new("", "Stage II"))
        .unwrap();
    let reloaded = round_trip(&result.view, "NA");
    assert!(reloaded.frame.equals_missing(&result.view.frame));
    assert_eq!(reloaded.records, result.view.records);
}

#[test]
fn test_constructed_row_round_trip() {
    let ds = cases();
    let result = LookupEngine::new(FallbackPolicy::Constructed)
        .lookup(&ds, &Criteria::new("25-29", "Stage IV"))
        .unwrap();
    let reloaded = round_trip(&result.view, "NA");
    assert_eq!(reloaded.records, result.view.records);
    assert_eq!(reloaded.columns, result.view.columns);

    let twice = round_trip(&reloaded, "NA");
    assert!(twice.frame.equals_missing(&reloaded.frame));
}

#[test]
fn test_constructed_row_keeps_extra_column_types() {
    let csv = "Age_Group,Stage,Year,Count,Verified\n40-49,Stage II,2019,25,20\n";
    let ds = load_csv_bytes("t", Source::View, csv.as_bytes().to_vec(), &LoadOptions::default())
        .unwrap();
    let result = LookupEngine::new(FallbackPolicy::Constructed)
        .lookup(&ds, &Criteria::new("70+", "Stage IV"))
        .unwrap();
    assert_eq!(result.view.frame.column("Verified").unwrap().dtype(), &DataType::Int64);

    let reloaded = round_trip(&result.view, "NA");
    assert_eq!(reloaded.frame.dtypes(), result.view.frame.dtypes());
    assert!(reloaded.frame.equals_missing(&result.view.frame));
}

#[test]
fn test_export_uses_missing_marker() {
    let ds = cases();
    let result = LookupEngine::new(FallbackPolicy::ZeroEstimate)
        .lookup(&ds, &Criteria::new("30-39", "Stage IV"))
        .unwrap();
    let mut buf = Vec::new();
    export_csv(&result.view, &mut buf, "<missing>").unwrap();
    let text = String::from_utf8(buf).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("Age_Group,Stage,Year,Count,District"));
    assert_eq!(lines.next(), Some("30-39,Stage IV,<missing>,0,<missing>"));
}

#[test]
fn test_report_carries_result_tag() {
    let ds = cases();
    let result = LookupEngine::new(FallbackPolicy::NearestEstimate)
        .lookup(&ds, &Criteria::new("20-29", ""))
        .unwrap();
    let stages = aggregate_by(&result.view, GroupKey::Stage).unwrap();
    let mut buf = Vec::new();
    export_report(&result, &stages, &[], &mut buf).unwrap();
    let json: serde_json::Value = serde_json::from_slice(&buf).unwrap();
    assert_eq!(json["result"]["kind"], "nearest_estimate");
    assert_eq!(json["result"]["bucket"], "30-39");
    assert_eq!(json["criteria"]["age_group"], "20-29");
    assert_eq!(json["total"], 12);
}

// ============================================================================
// Loading
// ============================================================================

#[test]
fn test_load_from_file_and_fallback() {
    let dir = std::env::temp_dir().join(format!("stagelens-test-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let good = dir.join("cases.csv");
    std::fs::write(&good, CASES_CSV).unwrap();
    let bad = dir.join("broken.csv");
    std::fs::write(&bad, "Age_Group,Stage,Count\n40-49,Stage I,-1\n").unwrap();

    let loaded = load_csv_dataset(&good, &LoadOptions::default()).unwrap();
    assert_eq!(loaded.len(), 7);
    assert_eq!(loaded.name, "cases.csv");
    assert_eq!(loaded.source, Source::File(good.clone()));

    let config = Config::default();
    let (ds, notice) = load_or_fallback(Some(bad.as_path()), &config);
    assert_eq!(ds.source, Source::Sample);
    assert!(notice.is_some());

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_missing_year_degrades_trend_only() {
    let csv = "Age_Group,Stage,Count\n40-49,Stage I,3\n";
    let ds = load_csv_bytes("t", Source::View, csv.as_bytes().to_vec(), &LoadOptions::default())
        .unwrap();
    assert!(aggregate_by(&ds, GroupKey::Stage).is_ok());
    assert!(aggregate_by(&ds, GroupKey::Year).is_err());
    assert!(ds.columns.notices().iter().any(|n| n.contains(YEAR)));
}

// ============================================================================
// Predictor
// ============================================================================

#[test]
fn test_predict_against_sample() {
    let sample = sample_dataset().unwrap();
    let predictor = Predictor::new(120);

    let exact = predictor.predict(&sample, 63).unwrap();
    assert_eq!(exact.bucket, "60-69");
    assert_eq!(exact.kind, MatchKind::Exact);
    assert_eq!(exact.most_frequent_stage.as_deref(), Some("Stage II"));
    assert_eq!(exact.recorded_count, Some(22));

    let estimate = predictor.predict(&sample, 5).unwrap();
    assert!(!estimate.kind.is_exact());
    assert_eq!(estimate.matched_bucket.as_deref(), Some("30-39"));
}
