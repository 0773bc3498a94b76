use crate::error::FeatureComputationError;

const FEATURE: &str = "dfa_alpha1";

/// Short-term DFA scaling exponent.
///
/// The mean-centred profile is cut into non-overlapping segments for each
/// of `n_points` log-spaced window sizes in `window_range`; each segment is
/// linearly detrended and alpha is the slope of log F(n) against log n.
pub fn detrended_fluctuation_alpha(
    series: &[f64],
    window_range: (usize, usize),
    n_points: usize,
) -> Result<f64, FeatureComputationError> {
    let (min_window, max_window) = window_range;
    if min_window < 2 || max_window < min_window || n_points < 2 {
        return Err(FeatureComputationError::undefined(
            FEATURE,
            format!("bad window range {min_window}..{max_window} with {n_points} points"),
        ));
    }
    if series.len() < min_window * 2 {
        return Err(FeatureComputationError::TooShort {
            feature: FEATURE,
            needed: min_window * 2,
            found: series.len(),
        });
    }
    let mean = series.iter().copied().sum::<f64>() / series.len() as f64;
    let mut profile = Vec::with_capacity(series.len());
    let mut acc = 0.0;
    for &value in series {
        acc += value - mean;
        profile.push(acc);
    }
    let max_window = series.len().min(max_window);

    let mut samples = Vec::new();
    for window in log_spaced_windows(min_window, max_window, n_points) {
        let mut total = 0.0;
        let mut segments = 0;
        for segment in profile.chunks_exact(window) {
            let (slope, intercept) = linear_fit(segment);
            let err: f64 = segment
                .iter()
                .enumerate()
                .map(|(i, &y)| (y - (slope * i as f64 + intercept)).powi(2))
                .sum();
            total += err / window as f64;
            segments += 1;
        }
        if segments == 0 {
            continue;
        }
        let rms = (total / segments as f64).sqrt();
        if rms.is_finite() && rms > 0.0 {
            samples.push((window as f64, rms));
        }
    }
    if samples.len() < 2 {
        return Err(FeatureComputationError::undefined(
            FEATURE,
            format!("only {} usable scales", samples.len()),
        ));
    }
    log_log_slope(&samples)
        .ok_or_else(|| FeatureComputationError::undefined(FEATURE, "degenerate log-log fit"))
}

/// Distinct integer window sizes, log-spaced from `lo` to `hi` inclusive.
pub(crate) fn log_spaced_windows(lo: usize, hi: usize, n_points: usize) -> Vec<usize> {
    if n_points < 2 || hi <= lo {
        return vec![lo];
    }
    let (a, b) = ((lo as f64).ln(), (hi as f64).ln());
    let step = (b - a) / (n_points - 1) as f64;
    let mut out: Vec<usize> = (0..n_points)
        .map(|i| (a + i as f64 * step).exp().round() as usize)
        .collect();
    out.dedup();
    out
}

/// Least-squares line through `segment` indexed `0..n`. Returns `(slope, intercept)`.
pub(crate) fn linear_fit(segment: &[f64]) -> (f64, f64) {
    let n = segment.len();
    if n < 2 {
        let mean = segment.iter().copied().next().unwrap_or(0.0);
        return (0.0, mean);
    }
    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut sum_xx = 0.0;
    let mut sum_xy = 0.0;
    for (i, &y) in segment.iter().enumerate() {
        let x = i as f64;
        sum_x += x;
        sum_y += y;
        sum_xx += x * x;
        sum_xy += x * y;
    }
    let n_f = n as f64;
    let denom = n_f * sum_xx - sum_x * sum_x;
    if denom.abs() < f64::EPSILON {
        let mean = sum_y / n_f;
        return (0.0, mean);
    }
    let slope = (n_f * sum_xy - sum_x * sum_y) / denom;
    let intercept = (sum_y - slope * sum_x) / n_f;
    (slope, intercept)
}

fn log_log_slope(points: &[(f64, f64)]) -> Option<f64> {
    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut sum_xx = 0.0;
    let mut sum_xy = 0.0;
    let mut n = 0.0;
    for &(scale, rms) in points {
        if scale <= 0.0 || rms <= 0.0 {
            continue;
        }
        let x = scale.ln();
        let y = rms.ln();
        sum_x += x;
        sum_y += y;
        sum_xx += x * x;
        sum_xy += x * y;
        n += 1.0;
    }
    if n < 2.0 {
        return None;
    }
    let denom = n * sum_xx - sum_x * sum_x;
    if denom.abs() < f64::EPSILON {
        return None;
    }
    Some((n * sum_xy - sum_x * sum_y) / denom)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lcg_noise(n: usize, seed: u64) -> Vec<f64> {
        let mut state = seed;
        (0..n)
            .map(|_| {
                state = state
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                ((state >> 11) as f64 / (1u64 << 53) as f64) - 0.5
            })
            .collect()
    }

    #[test]
    fn white_noise_is_near_half() {
        let noise = lcg_noise(4096, 42);
        let alpha = detrended_fluctuation_alpha(&noise, (4, 16), 10).unwrap();
        assert!((alpha - 0.5).abs() < 0.2, "alpha {alpha}");
    }

    #[test]
    fn random_walk_is_steeper_than_noise() {
        let noise = lcg_noise(4096, 7);
        let walk: Vec<f64> = noise
            .iter()
            .scan(0.0, |acc, x| {
                *acc += x;
                Some(*acc)
            })
            .collect();
        let a_noise = detrended_fluctuation_alpha(&noise, (4, 16), 10).unwrap();
        let a_walk = detrended_fluctuation_alpha(&walk, (4, 16), 10).unwrap();
        assert!(a_walk > a_noise + 0.5, "{a_walk} vs {a_noise}");
    }

    #[test]
    fn short_series_errors() {
        assert!(matches!(
            detrended_fluctuation_alpha(&[1.0, 2.0, 3.0], (4, 16), 10),
            Err(FeatureComputationError::TooShort { .. })
        ));
    }

    #[test]
    fn constant_series_has_no_scales() {
        assert!(detrended_fluctuation_alpha(&[5.0; 64], (4, 16), 10).is_err());
    }

    #[test]
    fn window_sizes_are_distinct() {
        let w = log_spaced_windows(4, 16, 10);
        assert_eq!(w.first(), Some(&4));
        assert_eq!(w.last(), Some(&16));
        assert!(w.windows(2).all(|p| p[0] < p[1]));
    }
}
