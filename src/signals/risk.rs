/// Default EMA smoothing factor for the composite risk.
pub const DEFAULT_ALPHA: f64 = 0.25;

const AUTOCORR_WEIGHT: f64 = 0.5;
const VARIANCE_WEIGHT: f64 = 0.3;
const TREND_WEIGHT: f64 = 0.2;

/// Map a z-score in [-3, 3] linearly onto [0, 1].
fn unit_scale(z: f64) -> f64 {
    (z.clamp(-3.0, 3.0) + 3.0) / 6.0
}

/// Blend the three indicator z-scores into a risk in [0, 1], smoothed
/// against the previous day's value when there is one.
pub fn combine_risk(
    autocorr_z: f64,
    variance_z: f64,
    trend_z: f64,
    previous_ema: Option<f64>,
    alpha: f64,
) -> f64 {
    let raw = AUTOCORR_WEIGHT * unit_scale(autocorr_z)
        + VARIANCE_WEIGHT * unit_scale(variance_z)
        + TREND_WEIGHT * unit_scale(trend_z);
    let score = match previous_ema {
        Some(prev) => alpha * raw + (1.0 - alpha) * prev,
        None => raw,
    };
    score.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neutral_and_extremes() {
        assert!((combine_risk(0.0, 0.0, 0.0, None, DEFAULT_ALPHA) - 0.5).abs() < 1e-12);
        assert_eq!(combine_risk(3.0, 3.0, 3.0, None, DEFAULT_ALPHA), 1.0);
        assert_eq!(combine_risk(-9.0, -9.0, -9.0, None, DEFAULT_ALPHA), 0.0);
    }

    #[test]
    fn test_weights() {
        // Only autocorrelation saturated: 0.5 * 1 + 0.3 * 0.5 + 0.2 * 0.5
        let r = combine_risk(3.0, 0.0, 0.0, None, DEFAULT_ALPHA);
        assert!((r - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_ema_smoothing() {
        let r = combine_risk(3.0, 3.0, 3.0, Some(0.0), DEFAULT_ALPHA);
        assert!((r - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_always_in_unit_interval() {
        let zs = [-100.0, -3.0, -1.2, 0.0, 0.7, 3.0, 42.0, f64::INFINITY, f64::NEG_INFINITY];
        let prevs = [None, Some(0.0), Some(0.3), Some(1.0), Some(5.0), Some(-2.0)];
        for &a in &zs {
            for &v in &zs {
                for &t in &zs {
                    for &p in &prevs {
                        let r = combine_risk(a, v, t, p, DEFAULT_ALPHA);
                        assert!((0.0..=1.0).contains(&r), "risk = {}", r);
                    }
                }
            }
        }
    }
}
