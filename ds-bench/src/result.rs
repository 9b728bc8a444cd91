//! Timing percentiles and per-rollout results.

use serde::{Deserialize, Serialize};

use ds_core::OpRef;

use crate::BenchError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub pct01: f64,
    pub pct10: f64,
    pub pct50: f64,
    pub pct90: f64,
    pub pct99: f64,
    pub stddev: f64,
}

fn percentile(sorted: &[f64], q: f64) -> f64 {
    let idx = ((sorted.len() - 1) as f64 * q).round() as usize;
    sorted[idx]
}

impl BenchmarkResult {
    /// Percentiles of one rank's measured iteration times. Sorts in place.
    pub fn from_times(times: &mut [f64]) -> Result<Self, BenchError> {
        if times.is_empty() {
            return Err(BenchError::Malformed("no measured times".into()));
        }
        for &t in times.iter() {
            if !t.is_finite() || t < 0.0 {
                return Err(BenchError::BadTime(t));
            }
        }
        times.sort_by(|a, b| a.partial_cmp(b).expect("times are finite"));

        let n = times.len() as f64;
        let mean = times.iter().sum::<f64>() / n;
        let var = times.iter().map(|t| (t - mean) * (t - mean)).sum::<f64>() / n;

        Ok(Self {
            pct01: percentile(times, 0.01),
            pct10: percentile(times, 0.10),
            pct50: percentile(times, 0.50),
            pct90: percentile(times, 0.90),
            pct99: percentile(times, 0.99),
            stddev: var.sqrt(),
        })
    }

    pub fn as_array(&self) -> [f64; 6] {
        [
            self.pct01,
            self.pct10,
            self.pct50,
            self.pct90,
            self.pct99,
            self.stddev,
        ]
    }

    pub fn from_array(a: [f64; 6]) -> Result<Self, BenchError> {
        for v in a {
            if !v.is_finite() || v < 0.0 {
                return Err(BenchError::BadTime(v));
            }
        }
        Ok(Self {
            pct01: a[0],
            pct10: a[1],
            pct50: a[2],
            pct90: a[3],
            pct99: a[4],
            stddev: a[5],
        })
    }
}

/// One rollout: the bound order actually measured and its timing.
#[derive(Debug, Clone)]
pub struct SimResult {
    pub order: Vec<OpRef>,
    pub result: BenchmarkResult,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentiles_of_known_series() {
        let mut times: Vec<f64> = (1..=100).map(|i| i as f64).collect();
        let r = BenchmarkResult::from_times(&mut times).unwrap();
        assert_eq!(r.pct01, 2.0);
        assert_eq!(r.pct10, 11.0);
        assert_eq!(r.pct50, 51.0);
        assert_eq!(r.pct90, 90.0);
        assert_eq!(r.pct99, 99.0);
        assert!(r.stddev > 28.0 && r.stddev < 29.0);
    }

    #[test]
    fn single_sample_is_every_percentile() {
        let mut times = vec![0.25];
        let r = BenchmarkResult::from_times(&mut times).unwrap();
        assert_eq!(r.pct01, 0.25);
        assert_eq!(r.pct99, 0.25);
        assert_eq!(r.stddev, 0.0);
    }

    #[test]
    fn bad_times_are_rejected() {
        assert!(BenchmarkResult::from_times(&mut [1.0, f64::NAN]).is_err());
        assert!(BenchmarkResult::from_times(&mut [-0.1]).is_err());
        assert!(BenchmarkResult::from_times(&mut []).is_err());
        assert!(BenchmarkResult::from_array([0.0; 6]).is_ok());
        assert!(BenchmarkResult::from_array([f64::INFINITY; 6]).is_err());
    }
}
