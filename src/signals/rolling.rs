//! Trailing-window statistics. Every output is aligned index-for-index with
//! its input, and index `i` only ever looks at `values[..=i]`.

/// A borrowed window of samples.
pub struct Window<'a> {
    values: &'a [f64],
}

impl<'a> Window<'a> {
    pub fn new(values: &'a [f64]) -> Self {
        Self { values }
    }

    /// The trailing window ending at `i`, at most `size` long.
    pub fn trailing(values: &'a [f64], i: usize, size: usize) -> Self {
        let size = size.max(1);
        let start = (i + 1).saturating_sub(size);
        Self::new(&values[start..=i])
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }

    /// Population variance.
    pub fn variance(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let mean = self.mean();
        let sum_sq_diff: f64 = self.values.iter().map(|&x| (x - mean).powi(2)).sum();
        sum_sq_diff / self.values.len() as f64
    }

    /// Lag-1 autocorrelation about the window mean, clamped to [-1, 1].
    pub fn lag1_autocorrelation(&self) -> f64 {
        if self.values.len() < 2 {
            return 0.0;
        }
        let m = self.mean();
        let num: f64 = self
            .values
            .windows(2)
            .map(|p| (p[1] - m) * (p[0] - m))
            .sum();
        let den: f64 = self.values.iter().map(|&x| (x - m).powi(2)).sum();
        if den == 0.0 {
            return 0.0;
        }
        (num / den).clamp(-1.0, 1.0)
    }

    /// Least-squares slope of value against 0-based position.
    pub fn slope(&self) -> f64 {
        let n = self.values.len();
        if n < 2 {
            return 0.0;
        }
        let xm = (n - 1) as f64 / 2.0;
        let ym = self.mean();
        let (num, den) = self
            .values
            .iter()
            .enumerate()
            .fold((0.0, 0.0), |(num, den), (i, &y)| {
                let dx = i as f64 - xm;
                (num + dx * (y - ym), den + dx * dx)
            });
        if den == 0.0 {
            0.0
        } else {
            num / den
        }
    }
}

/// Trailing moving average; the window grows from 1 up to `window`.
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    let mut out = Vec::with_capacity(values.len());
    let mut sum = 0.0;
    for (i, &v) in values.iter().enumerate() {
        sum += v;
        if i >= window {
            sum -= values[i - window];
        }
        out.push(sum / (i + 1).min(window) as f64);
    }
    out
}

/// Population variance over the trailing window.
pub fn rolling_variance(values: &[f64], window: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| Window::trailing(values, i, window).variance().max(0.0))
        .collect()
}

/// Lag-1 autocorrelation over the trailing window; 0 until two points exist.
pub fn lag1_autocorrelation(values: &[f64], window: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| Window::trailing(values, i, window).lag1_autocorrelation())
        .collect()
}

/// OLS slope over the trailing window; 0 until two points exist.
pub fn rolling_trend(values: &[f64], window: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| Window::trailing(values, i, window).slope())
        .collect()
}
