//! Summary statistics over a numeric series.
//!
//! Empty input yields NaN rather than an error; callers that need to
//! distinguish "undefined" from a value check `is_nan`.

pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return f64::NAN;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

/// Bessel-corrected standard deviation; NaN below two samples.
pub fn sample_sd(data: &[f64]) -> f64 {
    let n = data.len();
    if n < 2 {
        return f64::NAN;
    }
    let m = mean(data);
    (data.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (n as f64 - 1.0)).sqrt()
}

pub fn sample_variance(data: &[f64]) -> f64 {
    sample_sd(data).powi(2)
}

pub fn min(data: &[f64]) -> f64 {
    if data.is_empty() {
        return f64::NAN;
    }
    data.iter().copied().fold(f64::INFINITY, f64::min)
}

pub fn max(data: &[f64]) -> f64 {
    if data.is_empty() {
        return f64::NAN;
    }
    data.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

/// `sd / mean`, NaN when the mean is exactly zero.
pub fn coefficient_of_variation(data: &[f64]) -> f64 {
    let m = mean(data);
    if m == 0.0 {
        return f64::NAN;
    }
    sample_sd(data) / m
}

pub fn sorted(data: &[f64]) -> Vec<f64> {
    let mut out = data.to_vec();
    out.sort_by(|a, b| a.total_cmp(b));
    out
}

/// Quantile with linear interpolation between order statistics
/// (`(n - 1) * q` positioning).
pub fn quantile(data: &[f64], q: f64) -> f64 {
    if data.is_empty() || !(0.0..=1.0).contains(&q) {
        return f64::NAN;
    }
    quantile_sorted(&sorted(data), q)
}

pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = (sorted.len() - 1) as f64 * q;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    sorted[lo] + (pos - lo as f64) * (sorted[hi] - sorted[lo])
}

pub fn median(data: &[f64]) -> f64 {
    quantile(data, 0.5)
}

pub fn iqr(data: &[f64]) -> f64 {
    if data.is_empty() {
        return f64::NAN;
    }
    let s = sorted(data);
    quantile_sorted(&s, 0.75) - quantile_sorted(&s, 0.25)
}

/// Z-score with sample standard deviation. `None` for constant or too-short input.
pub fn zscore(data: &[f64]) -> Option<Vec<f64>> {
    let sd = sample_sd(data);
    if !(sd.is_finite() && sd > 0.0) {
        return None;
    }
    let m = mean(data);
    Some(data.iter().map(|x| (x - m) / sd).collect())
}

/// Pearson correlation of two equal-length slices; NaN when either is constant.
pub fn correlation(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n < 2 {
        return f64::NAN;
    }
    let (x, y) = (&x[..n], &y[..n]);
    let mx = mean(x);
    let my = mean(y);
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (a, b) in x.iter().zip(y) {
        sxy += (a - mx) * (b - my);
        sxx += (a - mx).powi(2);
        syy += (b - my).powi(2);
    }
    sxy / (sxx * syy).sqrt()
}

/// Sample covariance of two equal-length slices.
pub fn covariance(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n < 2 {
        return f64::NAN;
    }
    let mx = mean(&x[..n]);
    let my = mean(&y[..n]);
    x[..n]
        .iter()
        .zip(&y[..n])
        .map(|(a, b)| (a - mx) * (b - my))
        .sum::<f64>()
        / (n as f64 - 1.0)
}
