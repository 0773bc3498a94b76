//! Two- and k-sample hypothesis tests.
//!
//! Every test first checks that each sample has at least two observations.
//! When all observations across samples are identical there is nothing to
//! separate, so the test reports a statistic of 0 with p = 1.

use crate::error::ComparisonError;
use crate::metrics::descriptive::{mean, median, sample_variance};
use statrs::distribution::{ChiSquared, ContinuousCDF, FisherSnedecor, Normal, StudentsT};

/// One labelled group of observations.
#[derive(Debug, Clone, Copy)]
pub struct Sample<'a> {
    pub label: &'a str,
    pub values: &'a [f64],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestOutcome {
    pub statistic: f64,
    pub p_value: f64,
    /// Degrees of freedom (numerator for F tests)
    pub df1: Option<f64>,
    pub df2: Option<f64>,
    pub effect: f64,
}

impl TestOutcome {
    fn no_difference(df1: Option<f64>, df2: Option<f64>) -> Self {
        Self {
            statistic: 0.0,
            p_value: 1.0,
            df1,
            df2,
            effect: 0.0,
        }
    }
}

fn check_samples(samples: &[Sample<'_>], groups: usize) -> Result<(), ComparisonError> {
    if samples.len() < groups {
        return Err(ComparisonError::TooFewGroups {
            found: samples.len(),
        });
    }
    for sample in samples {
        if sample.values.len() < 2 {
            return Err(ComparisonError::InsufficientObservations {
                group: sample.label.to_string(),
                found: sample.values.len(),
            });
        }
    }
    Ok(())
}

fn all_identical(samples: &[Sample<'_>]) -> bool {
    let mut values = samples.iter().flat_map(|s| s.values.iter());
    match values.next() {
        Some(first) => values.all(|v| v == first),
        None => true,
    }
}

fn distribution_error(err: impl std::fmt::Display) -> ComparisonError {
    ComparisonError::Distribution(err.to_string())
}

/// Average ranks (1-based) of the pooled samples plus the tie term
/// `sum(t^3 - t)` over tie groups.
fn pooled_ranks(samples: &[Sample<'_>]) -> (Vec<Vec<f64>>, f64) {
    let mut pooled: Vec<(f64, usize, usize)> = samples
        .iter()
        .enumerate()
        .flat_map(|(g, s)| s.values.iter().enumerate().map(move |(i, &v)| (v, g, i)))
        .collect();
    pooled.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut ranks: Vec<Vec<f64>> = samples.iter().map(|s| vec![0.0; s.values.len()]).collect();
    let mut ties = 0.0;
    let mut start = 0;
    while start < pooled.len() {
        let mut end = start + 1;
        while end < pooled.len() && pooled[end].0 == pooled[start].0 {
            end += 1;
        }
        let rank = (start + end + 1) as f64 / 2.0;
        for &(_, g, i) in &pooled[start..end] {
            ranks[g][i] = rank;
        }
        let t = (end - start) as f64;
        ties += t * t * t - t;
        start = end;
    }
    (ranks, ties)
}

/// Welch's unequal-variance t-test. Effect is the difference of means.
pub fn welch_t_test(a: Sample<'_>, b: Sample<'_>) -> Result<TestOutcome, ComparisonError> {
    let samples = [a, b];
    check_samples(&samples, 2)?;
    if all_identical(&samples) {
        return Ok(TestOutcome::no_difference(None, None));
    }
    let (na, nb) = (a.values.len() as f64, b.values.len() as f64);
    let (sa, sb) = (
        sample_variance(a.values) / na,
        sample_variance(b.values) / nb,
    );
    let se2 = sa + sb;
    if se2 <= 0.0 {
        return Err(ComparisonError::ZeroVariance);
    }
    let diff = mean(a.values) - mean(b.values);
    let t = diff / se2.sqrt();
    let df = se2 * se2 / (sa * sa / (na - 1.0) + sb * sb / (nb - 1.0));
    let dist = StudentsT::new(0.0, 1.0, df).map_err(distribution_error)?;
    Ok(TestOutcome {
        statistic: t,
        p_value: (2.0 * dist.sf(t.abs())).min(1.0),
        df1: Some(df),
        df2: None,
        effect: diff,
    })
}

/// Mann–Whitney U with tie-corrected normal approximation and continuity
/// correction. Reports `U` of the first sample; effect is the difference of
/// medians.
pub fn mann_whitney_u(a: Sample<'_>, b: Sample<'_>) -> Result<TestOutcome, ComparisonError> {
    let samples = [a, b];
    check_samples(&samples, 2)?;
    if all_identical(&samples) {
        return Ok(TestOutcome::no_difference(None, None));
    }
    let (ranks, ties) = pooled_ranks(&samples);
    let (n1, n2) = (a.values.len() as f64, b.values.len() as f64);
    let n = n1 + n2;
    let r1: f64 = ranks[0].iter().sum();
    let u1 = r1 - n1 * (n1 + 1.0) / 2.0;
    let u = u1.max(n1 * n2 - u1);
    let mu = n1 * n2 / 2.0;
    let sigma = (n1 * n2 / 12.0 * ((n + 1.0) - ties / (n * (n - 1.0)))).sqrt();
    if !(sigma > 0.0) {
        return Err(ComparisonError::ZeroVariance);
    }
    let z = (u - mu - 0.5) / sigma;
    let normal = Normal::new(0.0, 1.0).map_err(distribution_error)?;
    Ok(TestOutcome {
        statistic: u1,
        p_value: (2.0 * normal.sf(z)).min(1.0),
        df1: None,
        df2: None,
        effect: median(a.values) - median(b.values),
    })
}

/// One-way ANOVA. Effect is eta squared (`SSB / SST`).
pub fn one_way_anova(samples: &[Sample<'_>]) -> Result<TestOutcome, ComparisonError> {
    check_samples(samples, 2)?;
    let k = samples.len() as f64;
    let n: f64 = samples.iter().map(|s| s.values.len() as f64).sum();
    let (df1, df2) = (k - 1.0, n - k);
    if all_identical(samples) {
        return Ok(TestOutcome::no_difference(Some(df1), Some(df2)));
    }
    let grand = samples.iter().flat_map(|s| s.values.iter()).sum::<f64>() / n;
    let mut ssb = 0.0;
    let mut ssw = 0.0;
    for sample in samples {
        let m = mean(sample.values);
        ssb += sample.values.len() as f64 * (m - grand).powi(2);
        ssw += sample.values.iter().map(|v| (v - m).powi(2)).sum::<f64>();
    }
    if ssw <= 0.0 {
        return Err(ComparisonError::ZeroVariance);
    }
    let f = (ssb / df1) / (ssw / df2);
    let dist = FisherSnedecor::new(df1, df2).map_err(distribution_error)?;
    Ok(TestOutcome {
        statistic: f,
        p_value: dist.sf(f),
        df1: Some(df1),
        df2: Some(df2),
        effect: ssb / (ssb + ssw),
    })
}

/// Kruskal–Wallis H with tie correction. Effect is epsilon squared
/// (`H / (n - 1)`).
pub fn kruskal_wallis(samples: &[Sample<'_>]) -> Result<TestOutcome, ComparisonError> {
    check_samples(samples, 2)?;
    let df = samples.len() as f64 - 1.0;
    if all_identical(samples) {
        return Ok(TestOutcome::no_difference(Some(df), None));
    }
    let (ranks, ties) = pooled_ranks(samples);
    let n: f64 = samples.iter().map(|s| s.values.len() as f64).sum();
    let rank_term: f64 = ranks
        .iter()
        .map(|r| r.iter().sum::<f64>().powi(2) / r.len() as f64)
        .sum();
    let correction = 1.0 - ties / (n * n * n - n);
    if correction <= 0.0 {
        return Err(ComparisonError::ZeroVariance);
    }
    let h = (12.0 / (n * (n + 1.0)) * rank_term - 3.0 * (n + 1.0)) / correction;
    let dist = ChiSquared::new(df).map_err(distribution_error)?;
    Ok(TestOutcome {
        statistic: h,
        p_value: dist.sf(h),
        df1: Some(df),
        df2: None,
        effect: h / (n - 1.0),
    })
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

    fn sample<'a>(label: &'a str, values: &'a [f64]) -> Sample<'a> {
        Sample { label, values }
    }

    #[test]
    fn welch_matches_reference() {
        let a = [1.0, 2.0, 3.0, 4.0, 5.0];
        let b = [2.0, 4.0, 6.0, 8.0, 10.0];
        let out = welch_t_test(sample("a", &a), sample("b", &b)).unwrap();
        // t = -3 / sqrt(2.5/5 + 10/5)
        assert_close(out.statistic, -1.8973665961010275, 1e-12);
        assert_close(out.df1.unwrap(), 5.882352941176471, 1e-9);
        assert!(out.p_value > 0.1 && out.p_value < 0.12, "p {}", out.p_value);
        assert_close(out.effect, -3.0, 1e-12);
    }

    #[test]
    fn identical_values_give_p_one() {
        let a = [5.0; 4];
        let b = [5.0; 3];
        let c = [5.0; 2];
        for out in [
            welch_t_test(sample("a", &a), sample("b", &b)).unwrap(),
            mann_whitney_u(sample("a", &a), sample("b", &b)).unwrap(),
            one_way_anova(&[sample("a", &a), sample("b", &b), sample("c", &c)]).unwrap(),
            kruskal_wallis(&[sample("a", &a), sample("b", &b), sample("c", &c)]).unwrap(),
        ] {
            assert_eq!(out.p_value, 1.0);
            assert_eq!(out.statistic, 0.0);
        }
    }

    #[test]
    fn constant_but_different_groups_is_zero_variance() {
        let a = [1.0, 1.0];
        let b = [2.0, 2.0];
        assert_eq!(
            welch_t_test(sample("a", &a), sample("b", &b)),
            Err(ComparisonError::ZeroVariance)
        );
        assert_eq!(
            one_way_anova(&[sample("a", &a), sample("b", &b)]),
            Err(ComparisonError::ZeroVariance)
        );
    }

    #[test]
    fn single_observation_is_rejected() {
        let err = mann_whitney_u(sample("healthy", &[1.0]), sample("chf", &[1.0, 2.0]));
        assert_eq!(
            err,
            Err(ComparisonError::InsufficientObservations {
                group: "healthy".into(),
                found: 1
            })
        );
        assert_eq!(
            kruskal_wallis(&[sample("normal", &[1.0, 2.0])]),
            Err(ComparisonError::TooFewGroups { found: 1 })
        );
    }

    #[test]
    fn mann_whitney_separated_samples() {
        let a = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let b = [7.0, 8.0, 9.0, 10.0, 11.0, 12.0];
        let out = mann_whitney_u(sample("a", &a), sample("b", &b)).unwrap();
        assert_close(out.statistic, 0.0, 1e-12);
        // z = 17.5 / sqrt(39)
        assert_close(out.p_value, 0.005074868097940257, 1e-9);
        assert_close(out.effect, -6.0, 1e-12);
    }

    #[test]
    fn anova_and_kruskal_reference() {
        let a = [1.0, 2.0, 3.0];
        let b = [4.0, 5.0, 6.0];
        let c = [7.0, 8.0, 9.0];
        let groups = [sample("a", &a), sample("b", &b), sample("c", &c)];
        let anova = one_way_anova(&groups).unwrap();
        // SSB = 54, SSW = 6
        assert_close(anova.statistic, 27.0, 1e-12);
        assert_close(anova.effect, 0.9, 1e-12);
        assert!(anova.p_value < 0.001);

        let kw = kruskal_wallis(&groups).unwrap();
        assert_close(kw.statistic, 7.2, 1e-12);
        assert_close(kw.p_value, (-3.6f64).exp(), 1e-9);
        assert_close(kw.effect, 0.9, 1e-12);
    }

    #[test]
    fn ranks_average_ties() {
        let a = [1.0, 2.0];
        let b = [2.0, 3.0];
        let (ranks, ties) = pooled_ranks(&[sample("a", &a), sample("b", &b)]);
        assert_eq!(ranks, vec![vec![1.0, 2.5], vec![2.5, 4.0]]);
        assert_close(ties, 6.0, 1e-12);
    }
}
