//! The catch22 canonical time-series features (and the two catch24 extras).
//!
//! The 22 core features are computed on the z-scored series so they
//! describe shape only; `DN_Mean` and `DN_Spread_Std` restore location and
//! scale when the extended set is requested. Every feature is evaluated
//! independently: a failure in one never prevents the others.

use crate::error::FeatureComputationError;
use crate::metrics::descriptive::{self, correlation, covariance, mean, median, sample_sd};
use crate::metrics::spectral::{autocorrelation, periodogram_rect};
use nalgebra::{DMatrix, DVector};
use std::f64::consts::{E, PI};

/// Shortest series the z-scored features are evaluated on.
pub const MIN_LENGTH: usize = 10;

type Feature = fn(&[f64]) -> Result<f64, FeatureComputationError>;

const CORE: [(&str, Feature); 22] = [
    ("DN_HistogramMode_5", dn_histogram_mode_5),
    ("DN_HistogramMode_10", dn_histogram_mode_10),
    ("CO_f1ecac", co_f1ecac),
    ("CO_FirstMin_ac", co_first_min_ac),
    ("CO_HistogramAMI_even_2_5", co_histogram_ami_even_2_5),
    ("CO_trev_1_num", co_trev_1_num),
    ("MD_hrv_classic_pnn40", md_hrv_classic_pnn40),
    ("SB_BinaryStats_mean_longstretch1", sb_binary_stats_mean_longstretch1),
    ("SB_TransitionMatrix_3ac_sumdiagcov", sb_transition_matrix_3ac_sumdiagcov),
    ("PD_PeriodicityWang_th0_01", pd_periodicity_wang_th0_01),
    ("CO_Embed2_Dist_tau_d_expfit_meandiff", co_embed2_dist_tau_d_expfit_meandiff),
    ("IN_AutoMutualInfoStats_40_gaussian_fmmi", in_auto_mutual_info_stats_40_gaussian_fmmi),
    ("FC_LocalSimple_mean1_tauresrat", fc_local_simple_mean1_tauresrat),
    ("DN_OutlierInclude_p_001_mdrmd", dn_outlier_include_p_001_mdrmd),
    ("DN_OutlierInclude_n_001_mdrmd", dn_outlier_include_n_001_mdrmd),
    ("SP_Summaries_welch_rect_area_5_1", sp_summaries_welch_rect_area_5_1),
    ("SB_BinaryStats_diff_longstretch0", sb_binary_stats_diff_longstretch0),
    ("SB_MotifThree_quantile_hh", sb_motif_three_quantile_hh),
    ("SC_FluctAnal_2_rsrangefit_50_1_logi_prop_r1", sc_fluct_anal_rsrangefit),
    ("SC_FluctAnal_2_dfa_50_1_2_logi_prop_r1", sc_fluct_anal_dfa),
    ("SP_Summaries_welch_rect_centroid", sp_summaries_welch_rect_centroid),
    ("FC_LocalSimple_mean3_stderr", fc_local_simple_mean3_stderr),
];

pub fn feature_names(extended: bool) -> Vec<&'static str> {
    let mut names: Vec<&'static str> = CORE.iter().map(|(name, _)| *name).collect();
    if extended {
        names.extend(["DN_Mean", "DN_Spread_Std"]);
    }
    names
}

/// Evaluate the catch22 set (catch24 when `extended`), in canonical order.
pub fn catch22_all(
    series: &[f64],
    extended: bool,
) -> Vec<(&'static str, Result<f64, FeatureComputationError>)> {
    let too_short = series.len() < MIN_LENGTH;
    let normalized = if too_short {
        None
    } else {
        descriptive::zscore(series)
    };

    let mut out: Vec<(&'static str, Result<f64, FeatureComputationError>)> = CORE
        .iter()
        .map(|&(name, feature)| {
            let value = match &normalized {
                Some(z) => feature(z).and_then(|v| finite(name, v)),
                None if too_short => Err(FeatureComputationError::TooShort {
                    feature: name,
                    needed: MIN_LENGTH,
                    found: series.len(),
                }),
                None => Err(FeatureComputationError::ConstantSeries { feature: name }),
            };
            (name, value)
        })
        .collect();

    if extended {
        out.push(("DN_Mean", require(series, "DN_Mean", 1).map(|_| mean(series))));
        out.push((
            "DN_Spread_Std",
            require(series, "DN_Spread_Std", 2).map(|_| sample_sd(series)),
        ));
    }
    out
}

fn finite(feature: &'static str, value: f64) -> Result<f64, FeatureComputationError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(FeatureComputationError::undefined(
            feature,
            format!("non-finite result {value}"),
        ))
    }
}

fn require(y: &[f64], feature: &'static str, needed: usize) -> Result<(), FeatureComputationError> {
    if y.len() < needed {
        Err(FeatureComputationError::TooShort {
            feature,
            needed,
            found: y.len(),
        })
    } else {
        Ok(())
    }
}

fn autocorrs(y: &[f64], feature: &'static str) -> Result<Vec<f64>, FeatureComputationError> {
    autocorrelation(y).ok_or(FeatureComputationError::ConstantSeries { feature })
}

/// First lag at which the autocorrelation stops being positive.
fn first_zero(ac: &[f64], max_tau: usize) -> usize {
    let limit = max_tau.min(ac.len());
    let mut tau = 0;
    while tau < limit && ac[tau] > 0.0 {
        tau += 1;
    }
    tau
}

fn histcounts(
    y: &[f64],
    n_bins: usize,
    feature: &'static str,
) -> Result<(Vec<usize>, Vec<f64>), FeatureComputationError> {
    let lo = descriptive::min(y);
    let hi = descriptive::max(y);
    let step = (hi - lo) / n_bins as f64;
    if n_bins == 0 || !(step > 0.0) {
        return Err(FeatureComputationError::ConstantSeries { feature });
    }
    let mut counts = vec![0usize; n_bins];
    for &v in y {
        let idx = ((v - lo) / step) as isize;
        counts[idx.clamp(0, n_bins as isize - 1) as usize] += 1;
    }
    let edges = (0..=n_bins).map(|i| lo + step * i as f64).collect();
    Ok((counts, edges))
}

fn histogram_mode(y: &[f64], n_bins: usize, feature: &'static str) -> Result<f64, FeatureComputationError> {
    let (counts, edges) = histcounts(y, n_bins, feature)?;
    let mut max_count = 0;
    let mut num_maxs = 1;
    let mut out = 0.0;
    for (i, &count) in counts.iter().enumerate() {
        let centre = (edges[i] + edges[i + 1]) * 0.5;
        if count > max_count {
            max_count = count;
            num_maxs = 1;
            out = centre;
        } else if count == max_count {
            num_maxs += 1;
            out += centre;
        }
    }
    Ok(out / num_maxs as f64)
}

fn dn_histogram_mode_5(y: &[f64]) -> Result<f64, FeatureComputationError> {
    histogram_mode(y, 5, "DN_HistogramMode_5")
}

fn dn_histogram_mode_10(y: &[f64]) -> Result<f64, FeatureComputationError> {
    histogram_mode(y, 10, "DN_HistogramMode_10")
}

fn co_f1ecac(y: &[f64]) -> Result<f64, FeatureComputationError> {
    let ac = autocorrs(y, "CO_f1ecac")?;
    let thresh = 1.0 / E;
    for i in 0..y.len().saturating_sub(2) {
        if ac[i + 1] < thresh {
            let m = ac[i + 1] - ac[i];
            let dy = thresh - ac[i];
            return Ok(i as f64 + dy / m);
        }
    }
    Ok(y.len() as f64)
}

fn co_first_min_ac(y: &[f64]) -> Result<f64, FeatureComputationError> {
    let ac = autocorrs(y, "CO_FirstMin_ac")?;
    for i in 1..y.len().saturating_sub(1) {
        if ac[i] < ac[i - 1] && ac[i] < ac[i + 1] {
            return Ok(i as f64);
        }
    }
    Ok(y.len() as f64)
}

fn co_histogram_ami_even_2_5(y: &[f64]) -> Result<f64, FeatureComputationError> {
    const TAU: usize = 2;
    const BINS: usize = 5;
    require(y, "CO_HistogramAMI_even_2_5", TAU + 2)?;
    let lo = descriptive::min(y);
    let hi = descriptive::max(y);
    let step = (hi - lo + 0.2) / BINS as f64;
    let edges: Vec<f64> = (0..=BINS).map(|i| lo + step * i as f64 - 0.1).collect();
    let bin = |v: f64| edges.iter().position(|&e| v < e).unwrap_or(0);

    let pairs = y.len() - TAU;
    let mut joint = [[0.0f64; BINS]; BINS];
    for i in 0..pairs {
        let (b1, b2) = (bin(y[i]), bin(y[i + TAU]));
        if b1 == 0 || b2 == 0 {
            continue;
        }
        joint[b1 - 1][b2 - 1] += 1.0;
    }
    let mut pi = [0.0f64; BINS];
    let mut pj = [0.0f64; BINS];
    for i in 0..BINS {
        for j in 0..BINS {
            joint[i][j] /= pairs as f64;
            pi[i] += joint[i][j];
            pj[j] += joint[i][j];
        }
    }
    let mut ami = 0.0;
    for i in 0..BINS {
        for j in 0..BINS {
            if joint[i][j] > 0.0 {
                ami += joint[i][j] * (joint[i][j] / (pi[i] * pj[j])).ln();
            }
        }
    }
    Ok(ami)
}

fn co_trev_1_num(y: &[f64]) -> Result<f64, FeatureComputationError> {
    require(y, "CO_trev_1_num", 2)?;
    let cubes: Vec<f64> = y.windows(2).map(|w| (w[1] - w[0]).powi(3)).collect();
    Ok(mean(&cubes))
}

fn md_hrv_classic_pnn40(y: &[f64]) -> Result<f64, FeatureComputationError> {
    require(y, "MD_hrv_classic_pnn40", 2)?;
    let over = y
        .windows(2)
        .filter(|w| (w[1] - w[0]).abs() * 1000.0 > 40.0)
        .count();
    Ok(over as f64 / (y.len() - 1) as f64)
}

fn longest_stretch(bits: &[bool], breaks_on: bool) -> usize {
    let n = bits.len();
    let mut longest = 0;
    let mut last = 0;
    for (i, &bit) in bits.iter().enumerate() {
        if bit == breaks_on || i + 1 == n {
            let stretch = i - last;
            if stretch > longest {
                longest = stretch;
            }
            last = i;
        }
    }
    longest
}

fn sb_binary_stats_mean_longstretch1(y: &[f64]) -> Result<f64, FeatureComputationError> {
    require(y, "SB_BinaryStats_mean_longstretch1", 3)?;
    let m = mean(y);
    let above: Vec<bool> = y[..y.len() - 1].iter().map(|v| v - m > 0.0).collect();
    Ok(longest_stretch(&above, false) as f64)
}

fn sb_binary_stats_diff_longstretch0(y: &[f64]) -> Result<f64, FeatureComputationError> {
    require(y, "SB_BinaryStats_diff_longstretch0", 3)?;
    let rising: Vec<bool> = y.windows(2).map(|w| w[1] - w[0] >= 0.0).collect();
    Ok(longest_stretch(&rising, true) as f64)
}

/// Quantile as used by the coarse-graining step: `n * q - 0.5` positioning,
/// clamped to the extreme order statistics.
fn quantile_centered(sorted: &[f64], q: f64) -> f64 {
    let n = sorted.len();
    let edge = 0.5 / n as f64;
    if q < edge {
        return sorted[0];
    }
    if q > 1.0 - edge {
        return sorted[n - 1];
    }
    let idx = n as f64 * q - 0.5;
    let lo = idx.floor() as usize;
    let hi = idx.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        sorted[lo] + (idx - lo as f64) * (sorted[hi] - sorted[lo])
    }
}

/// Label each point `1..=groups` by quantile band.
fn coarsegrain_quantile(y: &[f64], groups: usize) -> Vec<usize> {
    let sorted = descriptive::sorted(y);
    let mut th: Vec<f64> = (0..=groups)
        .map(|i| quantile_centered(&sorted, i as f64 / groups as f64))
        .collect();
    th[0] -= 1.0;
    let mut labels = vec![0usize; y.len()];
    for i in 0..groups {
        for (label, &v) in labels.iter_mut().zip(y) {
            if v > th[i] && v <= th[i + 1] {
                *label = i + 1;
            }
        }
    }
    labels
}

fn sb_transition_matrix_3ac_sumdiagcov(y: &[f64]) -> Result<f64, FeatureComputationError> {
    const FEATURE: &str = "SB_TransitionMatrix_3ac_sumdiagcov";
    const GROUPS: usize = 3;
    let ac = autocorrs(y, FEATURE)?;
    let tau = first_zero(&ac, y.len()).max(1);
    let down: Vec<f64> = y.iter().step_by(tau).copied().collect();
    if down.len() < 2 {
        return Err(FeatureComputationError::TooShort {
            feature: FEATURE,
            needed: 2,
            found: down.len(),
        });
    }
    let labels = coarsegrain_quantile(&down, GROUPS);
    if labels.contains(&0) {
        return Err(FeatureComputationError::undefined(FEATURE, "unlabelled point"));
    }
    let mut t = [[0.0f64; GROUPS]; GROUPS];
    for w in labels.windows(2) {
        t[w[0] - 1][w[1] - 1] += 1.0;
    }
    let transitions = (down.len() - 1) as f64;
    let mut sum = 0.0;
    for col in 0..GROUPS {
        let column: Vec<f64> = (0..GROUPS).map(|row| t[row][col] / transitions).collect();
        sum += covariance(&column, &column);
    }
    Ok(sum)
}

/// Least-squares cubic spline with one interior knot, evaluated at `0..n`.
fn spline_trend(y: &[f64]) -> Option<Vec<f64>> {
    let n = y.len();
    let span = (n - 1) as f64;
    let knot = ((n as f64 / 2.0).floor() - 1.0) / span;
    let basis = |t: f64| {
        let tail = (t - knot).max(0.0);
        [1.0, t, t * t, t * t * t, tail * tail * tail]
    };
    let design = DMatrix::from_fn(n, 5, |row, col| basis(row as f64 / span)[col]);
    let target = DVector::from_column_slice(y);
    let coef = design.clone().svd(true, true).solve(&target, 1e-12).ok()?;
    let fitted = design * coef;
    Some(fitted.iter().copied().collect())
}

fn pd_periodicity_wang_th0_01(y: &[f64]) -> Result<f64, FeatureComputationError> {
    const FEATURE: &str = "PD_PeriodicityWang_th0_01";
    const TH: f64 = 0.01;
    require(y, FEATURE, 6)?;
    let trend = spline_trend(y)
        .ok_or_else(|| FeatureComputationError::undefined(FEATURE, "spline fit failed"))?;
    let detrended: Vec<f64> = y.iter().zip(&trend).map(|(a, b)| a - b).collect();
    let n = y.len();
    let ac_max = n.div_ceil(3);
    let acf: Vec<f64> = (1..=ac_max)
        .map(|lag| covariance(&detrended[..n - lag], &detrended[lag..]))
        .collect();

    let mut troughs = Vec::new();
    let mut peaks = Vec::new();
    for i in 1..ac_max.saturating_sub(1) {
        let slope_in = acf[i] - acf[i - 1];
        let slope_out = acf[i + 1] - acf[i];
        if slope_in < 0.0 && slope_out > 0.0 {
            troughs.push(i);
        } else if slope_in > 0.0 && slope_out < 0.0 {
            peaks.push(i);
        }
    }
    for &peak in &peaks {
        let before = troughs.iter().take_while(|&&t| t < peak).count();
        if before == 0 {
            continue;
        }
        let trough = troughs[before - 1];
        if acf[peak] - acf[trough] < TH || acf[peak] < 0.0 {
            continue;
        }
        return Ok(peak as f64);
    }
    Ok(0.0)
}

fn co_embed2_dist_tau_d_expfit_meandiff(y: &[f64]) -> Result<f64, FeatureComputationError> {
    const FEATURE: &str = "CO_Embed2_Dist_tau_d_expfit_meandiff";
    let n = y.len();
    let ac = autocorrs(y, FEATURE)?;
    let mut tau = first_zero(&ac, n);
    if tau as f64 > n as f64 / 10.0 {
        tau = n / 10;
    }
    let tau = tau.max(1);
    if n < tau + 3 {
        return Err(FeatureComputationError::TooShort {
            feature: FEATURE,
            needed: tau + 3,
            found: n,
        });
    }
    let m = n - tau - 1;
    let d: Vec<f64> = (0..m)
        .map(|i| ((y[i + 1] - y[i]).powi(2) + (y[i + tau] - y[i + tau + 1]).powi(2)).sqrt())
        .collect();
    let l = mean(&d);
    let sd = sample_sd(&d);
    if !(sd >= 0.001) {
        return Err(FeatureComputationError::ConstantSeries { feature: FEATURE });
    }
    let range = descriptive::max(&d) - descriptive::min(&d);
    let n_bins = (range / (3.5 * sd * (m as f64).powf(-1.0 / 3.0))).ceil() as usize;
    let (counts, edges) = histcounts(&d, n_bins, FEATURE)?;
    let diffs: Vec<f64> = counts
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            let norm = c as f64 / m as f64;
            let expf = ((-(edges[i] + edges[i + 1]) * 0.5 / l).exp() / l).max(0.0);
            (norm - expf).abs()
        })
        .collect();
    Ok(mean(&diffs))
}

fn in_auto_mutual_info_stats_40_gaussian_fmmi(y: &[f64]) -> Result<f64, FeatureComputationError> {
    const FEATURE: &str = "IN_AutoMutualInfoStats_40_gaussian_fmmi";
    require(y, FEATURE, 4)?;
    let n = y.len();
    let tau = 40.min(n.div_ceil(2)).min(n - 2);
    let ami: Vec<f64> = (1..=tau)
        .map(|lag| {
            let r = correlation(&y[..n - lag], &y[lag..]);
            -0.5 * (1.0 - r * r).ln()
        })
        .collect();
    for i in 1..tau.saturating_sub(1) {
        if ami[i] < ami[i - 1] && ami[i] < ami[i + 1] {
            return Ok(i as f64);
        }
    }
    Ok(tau as f64)
}

fn fc_local_simple_mean1_tauresrat(y: &[f64]) -> Result<f64, FeatureComputationError> {
    const FEATURE: &str = "FC_LocalSimple_mean1_tauresrat";
    require(y, FEATURE, 3)?;
    let res: Vec<f64> = y.windows(2).map(|w| w[1] - w[0]).collect();
    let res_tau = first_zero(&autocorrs(&res, FEATURE)?, res.len());
    let y_tau = first_zero(&autocorrs(y, FEATURE)?, y.len());
    Ok(res_tau as f64 / y_tau as f64)
}

fn fc_local_simple_mean3_stderr(y: &[f64]) -> Result<f64, FeatureComputationError> {
    const FEATURE: &str = "FC_LocalSimple_mean3_stderr";
    require(y, FEATURE, 5)?;
    let res: Vec<f64> = y
        .windows(4)
        .map(|w| w[3] - (w[0] + w[1] + w[2]) / 3.0)
        .collect();
    Ok(sample_sd(&res))
}

fn outlier_include(y: &[f64], sign: f64) -> Result<f64, FeatureComputationError> {
    const INC: f64 = 0.01;
    const TRIM: f64 = 2.0;
    let n = y.len();
    let work: Vec<f64> = y.iter().map(|v| sign * v).collect();
    if work.iter().all(|&v| v == work[0]) {
        return Ok(0.0);
    }
    let tot = work.iter().filter(|&&v| v >= 0.0).count();
    let max_val = descriptive::max(&work);
    if max_val < INC {
        return Ok(0.0);
    }
    let n_thresh = (max_val / INC) as usize + 1;
    let mut mean_gap = Vec::with_capacity(n_thresh);
    let mut kept_pct = Vec::with_capacity(n_thresh);
    let mut median_pos = Vec::with_capacity(n_thresh);
    for i in 0..n_thresh {
        let threshold = i as f64 * INC;
        let positions: Vec<f64> = work
            .iter()
            .enumerate()
            .filter(|(_, &v)| v >= threshold)
            .map(|(j, _)| (j + 1) as f64)
            .collect();
        let gaps: Vec<f64> = positions.windows(2).map(|w| w[1] - w[0]).collect();
        mean_gap.push(mean(&gaps));
        kept_pct.push(positions.len().saturating_sub(1) as f64 * 100.0 / tot as f64);
        median_pos.push(median(&positions) / (n as f64 / 2.0) - 1.0);
    }
    let mut mj = 0;
    let mut fbi = n_thresh - 1;
    for i in 0..n_thresh {
        if kept_pct[i] > TRIM {
            mj = i;
        }
        if mean_gap[n_thresh - 1 - i].is_nan() {
            fbi = n_thresh - 1 - i;
        }
    }
    let limit = mj.min(fbi);
    Ok(median(&median_pos[..=limit]))
}

fn dn_outlier_include_p_001_mdrmd(y: &[f64]) -> Result<f64, FeatureComputationError> {
    outlier_include(y, 1.0)
}

fn dn_outlier_include_n_001_mdrmd(y: &[f64]) -> Result<f64, FeatureComputationError> {
    outlier_include(y, -1.0)
}

/// Angular-frequency spectrum `(w, S(w))` of the rectangular periodogram.
fn welch_rect(y: &[f64], feature: &'static str) -> Result<(Vec<f64>, Vec<f64>), FeatureComputationError> {
    let (freqs, power) = periodogram_rect(y).ok_or(FeatureComputationError::TooShort {
        feature,
        needed: 2,
        found: y.len(),
    })?;
    let w: Vec<f64> = freqs.iter().map(|f| 2.0 * PI * f).collect();
    let sw: Vec<f64> = power.iter().map(|p| p / (2.0 * PI)).collect();
    if w.len() < 2 {
        return Err(FeatureComputationError::TooShort {
            feature,
            needed: 4,
            found: y.len(),
        });
    }
    Ok((w, sw))
}

fn sp_summaries_welch_rect_area_5_1(y: &[f64]) -> Result<f64, FeatureComputationError> {
    let (w, sw) = welch_rect(y, "SP_Summaries_welch_rect_area_5_1")?;
    let dw = w[1] - w[0];
    Ok(sw[..sw.len() / 5].iter().sum::<f64>() * dw)
}

fn sp_summaries_welch_rect_centroid(y: &[f64]) -> Result<f64, FeatureComputationError> {
    let (w, sw) = welch_rect(y, "SP_Summaries_welch_rect_centroid")?;
    let cumulative: Vec<f64> = sw
        .iter()
        .scan(0.0, |acc, s| {
            *acc += s;
            Some(*acc)
        })
        .collect();
    let half = cumulative.last().copied().unwrap_or(0.0) * 0.5;
    Ok(cumulative
        .iter()
        .position(|&c| c > half)
        .map(|i| w[i])
        .unwrap_or(0.0))
}

fn sb_motif_three_quantile_hh(y: &[f64]) -> Result<f64, FeatureComputationError> {
    const FEATURE: &str = "SB_MotifThree_quantile_hh";
    require(y, FEATURE, 3)?;
    let labels = coarsegrain_quantile(y, 3);
    if labels.contains(&0) {
        return Err(FeatureComputationError::undefined(FEATURE, "unlabelled point"));
    }
    let mut counts = [[0usize; 3]; 3];
    for w in labels.windows(2) {
        counts[w[0] - 1][w[1] - 1] += 1;
    }
    let total = (y.len() - 1) as f64;
    Ok(counts
        .iter()
        .flatten()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / total;
            -p * p.ln()
        })
        .sum())
}

/// Least-squares line; `(0, 0)` when x has no spread.
fn linreg(x: &[f64], y: &[f64]) -> (f64, f64) {
    let n = x.len().min(y.len()) as f64;
    let (mut sx, mut sxx, mut sxy, mut sy) = (0.0, 0.0, 0.0, 0.0);
    for (a, b) in x.iter().zip(y) {
        sx += a;
        sxx += a * a;
        sxy += a * b;
        sy += b;
    }
    let denom = n * sxx - sx * sx;
    if denom == 0.0 {
        return (0.0, 0.0);
    }
    ((n * sxy - sx * sy) / denom, (sy * sxx - sx * sxy) / denom)
}

fn norm(values: impl Iterator<Item = f64>) -> f64 {
    values.map(|v| v * v).sum::<f64>().sqrt()
}

#[derive(Clone, Copy)]
enum Fluctuation {
    RangeFit,
    Dfa,
}

/// Proportion of scales before the best two-segment breakpoint of the
/// log-log fluctuation curve.
fn fluct_anal_prop_r1(
    y: &[f64],
    lag: usize,
    how: Fluctuation,
    feature: &'static str,
) -> Result<f64, FeatureComputationError> {
    const STEPS: usize = 50;
    const MIN_POINTS: usize = 6;
    let n = y.len();
    let lin_low = 5f64.ln();
    let lin_high = ((n / 2) as f64).ln();
    if !(lin_high > lin_low) {
        return Err(FeatureComputationError::TooShort {
            feature,
            needed: 12,
            found: n,
        });
    }
    let step = (lin_high - lin_low) / (STEPS - 1) as f64;
    let mut taus: Vec<usize> = (0..STEPS)
        .map(|i| (lin_low + i as f64 * step).exp().round() as usize)
        .collect();
    taus.dedup();
    if taus.len() < 12 {
        return Err(FeatureComputationError::undefined(
            feature,
            format!("only {} distinct scales", taus.len()),
        ));
    }

    let size_cs = n / lag;
    let mut cumsum = Vec::with_capacity(size_cs);
    let mut acc = 0.0;
    for i in 0..size_cs {
        acc += y[i * lag];
        cumsum.push(acc);
    }
    let tau_max = taus.last().copied().unwrap_or(0);
    let x_reg: Vec<f64> = (1..=tau_max).map(|i| i as f64).collect();

    let mut fluct = Vec::with_capacity(taus.len());
    for &tau in &taus {
        let buffers = size_cs / tau;
        if buffers == 0 {
            return Err(FeatureComputationError::TooShort {
                feature,
                needed: tau * lag,
                found: n,
            });
        }
        let mut f = 0.0;
        for segment in cumsum.chunks_exact(tau).take(buffers) {
            let (m, b) = linreg(&x_reg[..tau], segment);
            let residual = segment
                .iter()
                .enumerate()
                .map(|(k, v)| v - (m * (k + 1) as f64 + b));
            match how {
                Fluctuation::RangeFit => {
                    let (lo, hi) = residual.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), r| {
                        (lo.min(r), hi.max(r))
                    });
                    f += (hi - lo).powi(2);
                }
                Fluctuation::Dfa => f += residual.map(|r| r * r).sum::<f64>(),
            }
        }
        fluct.push(match how {
            Fluctuation::RangeFit => (f / buffers as f64).sqrt(),
            Fluctuation::Dfa => (f / (buffers * tau) as f64).sqrt(),
        });
    }

    let log_tt: Vec<f64> = taus.iter().map(|&t| (t as f64).ln()).collect();
    let log_ff: Vec<f64> = fluct.iter().map(|f| f.ln()).collect();
    if log_ff.iter().any(|v| !v.is_finite()) {
        return Err(FeatureComputationError::undefined(feature, "zero fluctuation"));
    }
    let ntt = taus.len();
    let mut sserr = Vec::with_capacity(ntt - 2 * MIN_POINTS + 1);
    for i in MIN_POINTS..=(ntt - MIN_POINTS) {
        let (m1, b1) = linreg(&log_tt[..i], &log_ff[..i]);
        let (m2, b2) = linreg(&log_tt[i - 1..], &log_ff[i - 1..]);
        let left = norm((0..i).map(|j| log_tt[j] * m1 + b1 - log_ff[j]));
        let right = norm((i - 1..ntt).map(|j| log_tt[j] * m2 + b2 - log_ff[j]));
        sserr.push(left + right);
    }
    let minimum = descriptive::min(&sserr);
    let first = sserr.iter().position(|&v| v == minimum).unwrap_or(0);
    let first_min_ind = (first + MIN_POINTS - 1) as f64;
    Ok((first_min_ind + 1.0) / ntt as f64)
}

fn sc_fluct_anal_rsrangefit(y: &[f64]) -> Result<f64, FeatureComputationError> {
    fluct_anal_prop_r1(
        y,
        1,
        Fluctuation::RangeFit,
        "SC_FluctAnal_2_rsrangefit_50_1_logi_prop_r1",
    )
}

fn sc_fluct_anal_dfa(y: &[f64]) -> Result<f64, FeatureComputationError> {
    fluct_anal_prop_r1(y, 2, Fluctuation::Dfa, "SC_FluctAnal_2_dfa_50_1_2_logi_prop_r1")
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

    fn sine(n: usize, period: f64) -> Vec<f64> {
        (0..n)
            .map(|i| (2.0 * PI * i as f64 / period).sin())
            .collect()
    }

    fn lookup(features: &[(&'static str, Result<f64, FeatureComputationError>)], name: &str) -> f64 {
        features
            .iter()
            .find(|(n, _)| *n == name)
            .and_then(|(_, v)| v.as_ref().ok().copied())
            .unwrap_or(f64::NAN)
    }

    #[test]
    fn names_are_canonical_and_unique() {
        let names = feature_names(true);
        assert_eq!(names.len(), 24);
        assert_eq!(feature_names(false).len(), 22);
        let mut dedup = names.clone();
        dedup.sort();
        dedup.dedup();
        assert_eq!(dedup.len(), 24);
    }

    #[test]
    fn sine_wave_features_are_finite() {
        let y = sine(300, 20.0);
        let features = catch22_all(&y, true);
        assert_eq!(features.len(), 24);
        for (name, value) in &features {
            assert!(value.is_ok(), "{name} failed: {value:?}");
        }
        assert_close(lookup(&features, "DN_Mean"), mean(&y), 1e-12);
    }

    #[test]
    fn periodicity_detects_sine_period() {
        let y = sine(400, 25.0);
        let features = catch22_all(&y, false);
        let period = lookup(&features, "PD_PeriodicityWang_th0_01");
        // peak index is one lag short of the period
        assert!((period - 24.0).abs() <= 1.0, "period {period}");
        let first_min = lookup(&features, "CO_FirstMin_ac");
        assert!((first_min - 12.5).abs() <= 1.0, "first min {first_min}");
    }

    #[test]
    fn constant_series_fails_core_but_keeps_moments() {
        let features = catch22_all(&[3.0; 40], true);
        for (name, value) in &features[..22] {
            assert!(
                matches!(value, Err(FeatureComputationError::ConstantSeries { .. })),
                "{name}: {value:?}"
            );
        }
        assert_close(lookup(&features, "DN_Mean"), 3.0, 1e-12);
        assert_close(lookup(&features, "DN_Spread_Std"), 0.0, 1e-12);
    }

    #[test]
    fn short_series_reports_too_short() {
        let features = catch22_all(&[1.0, 2.0, 3.0], true);
        assert!(matches!(
            features[0].1,
            Err(FeatureComputationError::TooShort { found: 3, .. })
        ));
        assert_close(lookup(&features, "DN_Mean"), 2.0, 1e-12);
    }

    #[test]
    fn histogram_mode_averages_tied_bins() {
        let y = [0.0, 0.0, 1.0, 1.0, 2.0, 2.0, 3.0, 3.0, 4.0, 4.0];
        // every bin holds two points, so the mode is the mean of all centres
        assert_close(histogram_mode(&y, 5, "t").unwrap(), 2.0, 1e-12);
    }

    #[test]
    fn binary_stretches() {
        let bits = [true, true, false, true, true, true, false];
        assert_eq!(longest_stretch(&bits, false), 4);
    }

    #[test]
    fn coarsegrain_balances_groups() {
        let y: Vec<f64> = (0..9).map(|i| i as f64).collect();
        let labels = coarsegrain_quantile(&y, 3);
        assert_eq!(labels, vec![1, 1, 1, 2, 2, 2, 3, 3, 3]);
    }

    #[test]
    fn motif_entropy_of_cycle() {
        // 30 transitions, ten of each kind
        let y: Vec<f64> = (0..31).map(|i| (i % 3) as f64).collect();
        let hh = sb_motif_three_quantile_hh(&y).unwrap();
        assert_close(hh, 3f64.ln(), 1e-12);

        // 29 transitions split 10/10/9
        let hh = sb_motif_three_quantile_hh(&y[..30]).unwrap();
        let expected: f64 = [10.0, 10.0, 9.0]
            .iter()
            .map(|c| {
                let p: f64 = c / 29.0;
                -p * p.ln()
            })
            .sum();
        assert_close(hh, expected, 1e-12);
    }
}
