use super::rolling::Window;
use serde::{Deserialize, Serialize};

/// Mean and standard deviation of the leading points of a series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub mean: f64,
    pub std_dev: f64,
    pub sample_count: usize,
}

impl Baseline {
    /// Fixed baseline over the first `min(baseline_n, len)` points (at least one).
    /// A zero standard deviation is reported as 1.0.
    pub fn leading(series: &[f64], baseline_n: usize) -> Option<Self> {
        if series.is_empty() {
            return None;
        }
        let n = baseline_n.clamp(1, series.len());
        let window = Window::new(&series[..n]);
        let var = window.variance();
        Some(Self {
            mean: window.mean(),
            std_dev: if var > 0.0 { var.sqrt() } else { 1.0 },
            sample_count: n,
        })
    }

    pub fn z_score(&self, value: f64) -> f64 {
        (value - self.mean) / self.std_dev
    }
}

/// Z-score every element of `series` against its fixed leading baseline.
pub fn zscore_vs_baseline(series: &[f64], baseline_n: usize) -> Vec<f64> {
    match Baseline::leading(series, baseline_n) {
        Some(b) => series.iter().map(|&x| b.z_score(x)).collect(),
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_series_scores_zero() {
        let z = zscore_vs_baseline(&[3.5; 40], 30);
        assert_eq!(z.len(), 40);
        assert!(z.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_baseline_is_fixed_not_sliding() {
        // Baseline is the first 4 points: mean 2.5, population std sqrt(1.25)
        let series = [1.0, 2.0, 3.0, 4.0, 100.0, 200.0];
        let b = Baseline::leading(&series, 4).unwrap();
        assert_eq!(b.sample_count, 4);
        assert!((b.mean - 2.5).abs() < 1e-12);
        assert!((b.std_dev - 1.25f64.sqrt()).abs() < 1e-12);

        let z = zscore_vs_baseline(&series, 4);
        assert!((z[5] - (200.0 - 2.5) / 1.25f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_zero_std_treated_as_one() {
        let z = zscore_vs_baseline(&[5.0, 5.0, 8.0], 2);
        assert_eq!(z, vec![0.0, 0.0, 3.0]);
    }

    #[test]
    fn test_short_and_empty_series() {
        assert!(zscore_vs_baseline(&[], 30).is_empty());
        // baseline_n of zero still uses one point
        assert_eq!(zscore_vs_baseline(&[2.0, 4.0], 0), vec![0.0, 2.0]);
    }
}
