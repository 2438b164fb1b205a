use crate::outputs::SurfaceExtrema;
use serde::Serialize;

/// Compute metrics (mean, median, 25th percentile, 75th percentile) from samples
pub fn compute_metrics(samples: &[f64]) -> Option<(f64, f64, f64, f64)> {
    if samples.len() < 2 {
        return None;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();
    let mean = samples.iter().sum::<f64>() / samples.len() as f64;
    let median = sorted[n / 2];
    let p25 = sorted[n / 4];
    let p75 = sorted[3 * n / 4];
    Some((mean, median, p25, p75))
}

/// Statistics over the unmasked nodes of a surface extrema record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtremaSummary {
    pub nodes: usize,
    pub masked: usize,
    pub max_value: Option<f64>,
    pub max_node: Option<u64>,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub p25: Option<f64>,
    pub p75: Option<f64>,
}

pub fn summarize_extrema(extrema: &SurfaceExtrema) -> ExtremaSummary {
    let max = extrema
        .valid()
        .max_by(|(_, a), (_, b)| a.total_cmp(b));
    let values: Vec<f64> = extrema.valid().map(|(_, v)| v).collect();
    let stats = compute_metrics(&values);
    ExtremaSummary {
        nodes: extrema.len(),
        masked: extrema.masked_count(),
        max_value: max.map(|(_, v)| v),
        max_node: max.map(|(node, _)| node),
        mean: stats.map(|s| s.0),
        median: stats.map(|s| s.1),
        p25: stats.map(|s| s.2),
        p75: stats.map(|s| s.3),
    }
}
