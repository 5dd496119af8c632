//! Population Stability Index computation, mirroring
//! `services/drift_detector.py::compute_psi` bin-for-bin.

pub mod scheduler;

use crate::db::models::Severity;

const BIN_COUNT: usize = 10;
const EPSILON: f64 = 1e-4;

pub const BASELINE_MIN_SAMPLES: usize = 10;
pub const CURRENT_MIN_SAMPLES: usize = 5;
pub const DEFAULT_BASELINE_HOURS: i64 = 24;
pub const DEFAULT_CURRENT_HOURS: i64 = 1;

/// Computes the Population Stability Index between a baseline and current
/// sample. Returns `0.0` for degenerate inputs (empty, zero-variance).
pub fn compute_psi(baseline: &[f64], current: &[f64]) -> f64 {
    if baseline.is_empty() || current.is_empty() {
        return 0.0;
    }

    let all = baseline.iter().chain(current.iter());
    let min = all.clone().cloned().fold(f64::INFINITY, f64::min);
    let max = all.cloned().fold(f64::NEG_INFINITY, f64::max);

    if !(max > min) {
        return 0.0;
    }

    let width = (max - min) / BIN_COUNT as f64;
    let bin_index = |v: f64| -> usize {
        let idx = ((v - min) / width).floor();
        (idx as usize).min(BIN_COUNT - 1)
    };

    let mut baseline_hist = [0.0f64; BIN_COUNT];
    for &v in baseline {
        baseline_hist[bin_index(v)] += 1.0;
    }
    let mut current_hist = [0.0f64; BIN_COUNT];
    for &v in current {
        current_hist[bin_index(v)] += 1.0;
    }

    let baseline_total = baseline.len() as f64;
    let current_total = current.len() as f64;

    let mut psi = 0.0;
    for i in 0..BIN_COUNT {
        let b = baseline_hist[i] / baseline_total + EPSILON;
        let c = current_hist[i] / current_total + EPSILON;
        psi += (c - b) * (c / b).ln();
    }
    psi
}

pub fn severity_from_psi(psi: f64) -> Severity {
    if psi < 0.1 {
        Severity::Low
    } else if psi < 0.2 {
        Severity::Medium
    } else {
        Severity::High
    }
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_distributions_have_zero_psi() {
        let xs = vec![1.0; 10];
        assert_eq!(compute_psi(&xs, &xs), 0.0);
    }

    #[test]
    fn zero_variance_union_yields_zero() {
        let baseline = vec![5.0; 10];
        let current = vec![5.0; 5];
        assert_eq!(compute_psi(&baseline, &current), 0.0);
    }

    #[test]
    fn empty_side_yields_zero() {
        assert_eq!(compute_psi(&[], &[1.0, 2.0]), 0.0);
        assert_eq!(compute_psi(&[1.0, 2.0], &[]), 0.0);
    }

    #[test]
    fn shifted_distributions_exceed_threshold() {
        let baseline: Vec<f64> = (0..10).flat_map(|_| [1.0, 1.1, 1.2, 1.3, 1.4]).collect();
        let current: Vec<f64> = (0..10).flat_map(|_| [5.0, 5.1, 5.2, 5.3, 5.4]).collect();
        assert!(compute_psi(&baseline, &current) > 0.1);
    }

    #[test]
    fn psi_is_non_negative() {
        let baseline = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0];
        let current = vec![1.5, 2.5, 3.5, 4.5, 5.5];
        assert!(compute_psi(&baseline, &current) >= 0.0);
    }

    #[test]
    fn severity_is_monotone() {
        assert_eq!(severity_from_psi(0.05), Severity::Low);
        assert_eq!(severity_from_psi(0.15), Severity::Medium);
        assert_eq!(severity_from_psi(0.5), Severity::High);
    }
}
