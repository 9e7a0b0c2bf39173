//! Numeric summaries of interval series.
//!
//! The core summary is count/min/max/mean/median over signed cycle
//! durations, with an all-zero summary for an empty series: "no data for
//! this metric" is an answer, not an error. Extended statistics (stddev
//! and tail percentiles) run through Trueno's SIMD vectors on the
//! microsecond values.

use serde::Serialize;

use crate::clock::ClockConfig;

/// Five-number summary over cycle durations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Summary {
    pub count: usize,
    pub min: i64,
    pub max: i64,
    pub mean: f64,
    pub median: f64,
}

impl Summary {
    /// Summarize a series of durations. Empty input yields the zero
    /// summary.
    pub fn of(durations: &[i64]) -> Self {
        if durations.is_empty() {
            return Self::zero();
        }
        let count = durations.len();
        let min = *durations.iter().min().expect("non-empty");
        let max = *durations.iter().max().expect("non-empty");
        let mean = durations.iter().map(|&d| d as f64).sum::<f64>() / count as f64;

        let mut sorted = durations.to_vec();
        sorted.sort_unstable();
        let median = if count % 2 == 1 {
            sorted[count / 2] as f64
        } else {
            (sorted[count / 2 - 1] as f64 + sorted[count / 2] as f64) / 2.0
        };

        Self {
            count,
            min,
            max,
            mean,
            median,
        }
    }

    pub fn zero() -> Self {
        Self {
            count: 0,
            min: 0,
            max: 0,
            mean: 0.0,
            median: 0.0,
        }
    }

    /// Convert every statistic to microseconds.
    pub fn to_usecs(&self, clock: &ClockConfig) -> UsecSummary {
        UsecSummary {
            min: clock.cycles_to_usecs(self.min),
            max: clock.cycles_to_usecs(self.max),
            mean: self.mean / clock.cpu_mhz,
            median: self.median / clock.cpu_mhz,
        }
    }

    /// Reinterpret the raw values without scaling, for count-valued
    /// series that have no time unit.
    pub fn unscaled(&self) -> UsecSummary {
        UsecSummary {
            min: self.min as f64,
            max: self.max as f64,
            mean: self.mean,
            median: self.median,
        }
    }
}

/// The same summary in microseconds (or unscaled, for count series).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UsecSummary {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
}

/// Extended statistics over the microsecond values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtendedStats {
    pub mean: f32,
    pub stddev: f32,
    pub min: f32,
    pub max: f32,
    pub p75: f32,
    pub p90: f32,
    pub p95: f32,
    pub p99: f32,
}

/// Compute extended statistics with Trueno's SIMD vector math.
///
/// Returns `None` for an empty series.
pub fn extended_statistics(samples: &[f32]) -> Option<ExtendedStats> {
    if samples.is_empty() {
        return None;
    }
    let v = trueno::Vector::from_slice(samples);
    let mean = v.mean().unwrap_or(0.0);
    let stddev = v.stddev().unwrap_or(0.0);
    let min = v.min().unwrap_or(0.0);
    let max = v.max().unwrap_or(0.0);

    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    Some(ExtendedStats {
        mean,
        stddev,
        min,
        max,
        p75: percentile(&sorted, 75.0),
        p90: percentile(&sorted, 90.0),
        p95: percentile(&sorted, 95.0),
        p99: percentile(&sorted, 99.0),
    })
}

/// Linear-interpolated percentile over sorted data.
fn percentile(sorted: &[f32], pct: f32) -> f32 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let index = (pct / 100.0) * (sorted.len() - 1) as f32;
    let lower = index.floor() as usize;
    let upper = index.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let weight = index - lower as f32;
        sorted[lower] * (1.0 - weight) + sorted[upper] * weight
    }
}

/// Bucket durations by rounded log2, for quick latency histograms.
///
/// Non-positive durations are skipped. Returns `(bucket, count)` pairs for
/// every bucket up to the largest occupied one, including empty buckets.
pub fn log2_histogram(durations: &[i64]) -> Vec<(u32, usize)> {
    let buckets: Vec<u32> = durations
        .iter()
        .filter(|&&d| d > 0)
        .map(|&d| (d as f64).log2().round() as u32)
        .collect();
    let Some(&top) = buckets.iter().max() else {
        return Vec::new();
    };
    (0..=top)
        .map(|b| (b, buckets.iter().filter(|&&x| x == b).count()))
        .collect()
}
