//! Fixed age buckets and the numeric midpoints of age-group labels.

pub const BUCKETS: [&str; 8] = [
    "0-9", "10-19", "20-29", "30-39", "40-49", "50-59", "60-69", "70+",
];

/// Position of `age` in [`BUCKETS`]. Every age from 70 up lands in the last one.
pub fn bucket_index(age: u32) -> usize {
    (age / 10).min(BUCKETS.len() as u32 - 1) as usize
}

/// Range checks belong to the caller; see [`crate::predict::Predictor`].
pub fn bucketize(age: u32) -> &'static str {
    BUCKETS[bucket_index(age)]
}

/// Midpoint of an age-group label: `"A-B"` is `(A+B)/2`, `"N+"` is `N`,
/// a bare number is itself. Anything else has no midpoint.
pub fn midpoint(label: &str) -> Option<f64> {
    let label = label.trim();
    if let Some(lower) = label.strip_suffix('+') {
        return lower.trim().parse::<u32>().ok().map(f64::from);
    }
    if let Some((low, high)) = label.split_once('-') {
        let low = low.trim().parse::<u32>().ok()?;
        let high = high.trim().parse::<u32>().ok()?;
        return Some((f64::from(low) + f64::from(high)) / 2.0);
    }
    label.parse::<u32>().ok().map(f64::from)
}
