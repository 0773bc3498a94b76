//! Regularity estimators: approximate, sample and permutation entropy.

use crate::error::FeatureComputationError;

/// Approximate entropy (Pincus) with embedding dimension `m` and tolerance `r`.
///
/// Templates match when their Chebyshev distance is `<= r`; self-matches
/// are counted, so every log argument is positive.
pub fn approx_entropy(data: &[f64], m: usize, r: f64) -> Result<f64, FeatureComputationError> {
    const FEATURE: &str = "apen";
    check_tolerance(FEATURE, r)?;
    if m == 0 || data.len() < m + 2 {
        return Err(FeatureComputationError::TooShort {
            feature: FEATURE,
            needed: m + 2,
            found: data.len(),
        });
    }
    Ok(apen_phi(data, m, r) - apen_phi(data, m + 1, r))
}

fn apen_phi(data: &[f64], m: usize, r: f64) -> f64 {
    let count = data.len() - m + 1;
    let mut acc = 0.0;
    for i in 0..count {
        let matches = (0..count)
            .filter(|&j| max_diff(data, i, j, m) <= r)
            .count();
        acc += (matches as f64 / count as f64).ln();
    }
    acc / count as f64
}

/// Sample entropy (Richman & Moorman): `-ln(A / B)` over the first `N - m`
/// templates, self-matches excluded.
pub fn sample_entropy(data: &[f64], m: usize, r: f64) -> Result<f64, FeatureComputationError> {
    const FEATURE: &str = "sampen";
    check_tolerance(FEATURE, r)?;
    if m == 0 || data.len() <= m + 1 {
        return Err(FeatureComputationError::TooShort {
            feature: FEATURE,
            needed: m + 2,
            found: data.len(),
        });
    }
    let mut count_m = 0f64;
    let mut count_m1 = 0f64;
    for i in 0..data.len() - m {
        for j in (i + 1)..data.len() - m {
            if max_diff(data, i, j, m) <= r {
                count_m += 1.0;
                if max_diff(data, i, j, m + 1) <= r {
                    count_m1 += 1.0;
                }
            }
        }
    }
    if count_m == 0.0 || count_m1 == 0.0 {
        return Err(FeatureComputationError::undefined(
            FEATURE,
            format!("no template matches (B = {count_m}, A = {count_m1})"),
        ));
    }
    Ok(-(count_m1 / count_m).ln())
}

fn check_tolerance(feature: &'static str, r: f64) -> Result<(), FeatureComputationError> {
    if r.is_finite() && r > 0.0 {
        Ok(())
    } else {
        Err(FeatureComputationError::undefined(
            feature,
            format!("tolerance must be positive, got {r}"),
        ))
    }
}

fn max_diff(data: &[f64], i: usize, j: usize, length: usize) -> f64 {
    data[i..i + length]
        .iter()
        .zip(data[j..j + length].iter())
        .map(|(a, b)| (a - b).abs())
        .fold(0.0, f64::max)
}

/// Shannon entropy (bits) of ordinal patterns of length `order` sampled
/// every `delay` points. Ties keep their original order.
pub fn permutation_entropy(
    data: &[f64],
    order: usize,
    delay: usize,
    normalize: bool,
) -> Result<f64, FeatureComputationError> {
    const FEATURE: &str = "permen";
    if order < 2 || delay == 0 {
        return Err(FeatureComputationError::undefined(
            FEATURE,
            format!("order {order} / delay {delay} out of range"),
        ));
    }
    let span = (order - 1) * delay;
    if data.len() <= span {
        return Err(FeatureComputationError::TooShort {
            feature: FEATURE,
            needed: span + 1,
            found: data.len(),
        });
    }
    let mut counts: std::collections::HashMap<Vec<usize>, usize> = std::collections::HashMap::new();
    let total = data.len() - span;
    for start in 0..total {
        let mut pattern: Vec<usize> = (0..order).collect();
        pattern.sort_by(|&a, &b| data[start + a * delay].total_cmp(&data[start + b * delay]));
        *counts.entry(pattern).or_insert(0) += 1;
    }
    let entropy = counts
        .values()
        .map(|&c| {
            let p = c as f64 / total as f64;
            -p * p.log2()
        })
        .sum::<f64>();
    if normalize {
        let factorial: f64 = (1..=order).map(|k| k as f64).product();
        Ok(entropy / factorial.log2())
    } else {
        Ok(entropy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn monotonic_series_has_zero_permutation_entropy() {
        let data: Vec<f64> = (0..20).map(|i| i as f64).collect();
        assert_close(permutation_entropy(&data, 3, 1, false).unwrap(), 0.0, 1e-12);
    }

    #[test]
    fn alternating_series_has_one_bit() {
        let data: Vec<f64> = (0..22).map(|i| (i % 2) as f64).collect();
        // patterns alternate between up-down and down-up
        assert_close(permutation_entropy(&data, 3, 1, false).unwrap(), 1.0, 1e-12);
        let norm = permutation_entropy(&data, 3, 1, true).unwrap();
        assert_close(norm, 1.0 / 6f64.log2(), 1e-12);
    }

    #[test]
    fn periodic_series_is_regular() {
        let data: Vec<f64> = (0..60).map(|i| [1.0, 2.0, 3.0][i % 3]).collect();
        let sampen = sample_entropy(&data, 2, 0.2).unwrap();
        assert_close(sampen, 0.0, 1e-12);
        let apen = approx_entropy(&data, 2, 0.2).unwrap();
        assert!(apen.abs() < 0.05, "apen {apen}");
    }

    #[test]
    fn irregular_series_scores_higher() {
        let regular: Vec<f64> = (0..80).map(|i| [1.0, 2.0][i % 2]).collect();
        let irregular: Vec<f64> = (0..80)
            .map(|i| ((i as f64 * 137.5).sin() * 10_000.0).fract())
            .collect();
        let a = approx_entropy(&regular, 2, 0.2).unwrap();
        let b = approx_entropy(&irregular, 2, 0.2).unwrap();
        assert!(b > a, "{b} <= {a}");
    }

    #[test]
    fn short_or_degenerate_input_errors() {
        assert!(matches!(
            sample_entropy(&[1.0, 2.0], 2, 0.2),
            Err(FeatureComputationError::TooShort { .. })
        ));
        assert!(approx_entropy(&[1.0, 2.0, 3.0], 2, 0.2).is_err());
        assert!(sample_entropy(&[1.0, 2.0, 3.0, 4.0, 5.0], 2, 0.0).is_err());
        assert!(permutation_entropy(&[1.0, 2.0], 3, 1, false).is_err());
        // strictly increasing: no m+1 matches within a tiny tolerance
        let ramp: Vec<f64> = (0..10).map(|i| i as f64).collect();
        assert!(matches!(
            sample_entropy(&ramp, 2, 0.5),
            Err(FeatureComputationError::Undefined { .. })
        ));
    }
}
