//! Min/max point reduction for line plots.
//!
//! The x range is cut into equal buckets; each bucket keeps only its lowest
//! and highest point, in x order. Spikes survive no matter how many points
//! fall into one terminal cell.

/// Reduces `points` (sorted by x) to at most two points per bucket.
/// Inputs already small enough are returned unchanged.
pub fn min_max(points: &[(f64, f64)], buckets: usize) -> Vec<(f64, f64)> {
    if buckets == 0 || points.len() <= 2 * buckets {
        return points.to_vec();
    }
    let x0 = points[0].0;
    let x1 = points[points.len() - 1].0;
    let span = x1 - x0;
    if span <= 0.0 {
        return extremes(points);
    }

    let mut out = Vec::with_capacity(2 * buckets);
    let mut start = 0;
    while start < points.len() {
        let bucket = bucket_of(points[start].0, x0, span, buckets);
        let mut end = start + 1;
        while end < points.len() && bucket_of(points[end].0, x0, span, buckets) == bucket {
            end += 1;
        }
        out.extend_from_slice(&extremes(&points[start..end]));
        start = end;
    }
    out
}

fn bucket_of(x: f64, x0: f64, span: f64, buckets: usize) -> usize {
    let b = ((x - x0) / span * buckets as f64) as usize;
    b.min(buckets - 1)
}

/// Lowest and highest point of a run, in x order. A run of one point
/// yields it once.
fn extremes(run: &[(f64, f64)]) -> Vec<(f64, f64)> {
    let mut lo = 0;
    let mut hi = 0;
    for (i, p) in run.iter().enumerate() {
        if p.1 < run[lo].1 {
            lo = i;
        }
        if p.1 > run[hi].1 {
            hi = i;
        }
    }
    match lo.cmp(&hi) {
        std::cmp::Ordering::Equal => vec![run[lo]],
        std::cmp::Ordering::Less => vec![run[lo], run[hi]],
        std::cmp::Ordering::Greater => vec![run[hi], run[lo]],
    }
}
