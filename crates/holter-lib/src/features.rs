//! Per-subject feature vectors over the windowed HRV series.

use crate::error::FeatureComputationError;
use crate::metrics::catch22;
use crate::metrics::descriptive::{self, coefficient_of_variation, iqr, mean, median, sample_sd};
use crate::metrics::dfa::detrended_fluctuation_alpha;
use crate::metrics::entropy::{approx_entropy, permutation_entropy, sample_entropy};
use crate::metrics::window::Window;
use crate::signal::{Condition, Status, SubjectRecording};
use log::{debug, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const SUMMARY_NAMES: [&str; 11] = [
    "mean",
    "sd",
    "max",
    "min",
    "cv",
    "iqr",
    "median",
    "apen",
    "sampen",
    "permen",
    "dfa_alpha1",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Embedding dimension for approximate/sample entropy
    pub embedding_dimension: usize,
    /// Tolerance as a multiple of the series' sample sd
    pub tolerance_factor: f64,
    pub permutation_order: usize,
    pub permutation_delay: usize,
    pub dfa_window_range: (usize, usize),
    pub dfa_points: usize,
    /// Add `DN_Mean`/`DN_Spread_Std` to the catch22 set
    pub extended: bool,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            embedding_dimension: 2,
            tolerance_factor: 0.2,
            permutation_order: 3,
            permutation_delay: 1,
            dfa_window_range: (4, 16),
            dfa_points: 10,
            extended: true,
        }
    }
}

/// The three window-level signals features are extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeriesKind {
    Hr,
    Sdnn,
    Rmssd,
}

impl SeriesKind {
    pub const ALL: [SeriesKind; 3] = [SeriesKind::Hr, SeriesKind::Sdnn, SeriesKind::Rmssd];

    pub fn prefix(&self) -> &'static str {
        match self {
            SeriesKind::Hr => "hr",
            SeriesKind::Sdnn => "sdnn",
            SeriesKind::Rmssd => "rmssd",
        }
    }

    pub fn value(&self, window: &Window) -> f64 {
        match self {
            SeriesKind::Hr => window.mean_heart_rate,
            SeriesKind::Sdnn => window.sdnn,
            SeriesKind::Rmssd => window.rmssd,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureFailure {
    pub feature: String,
    pub reason: String,
}

/// Named features of one series, in extraction order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub entries: Vec<(String, f64)>,
    /// Features that came out NaN, with the reason
    pub failures: Vec<FeatureFailure>,
}

impl FeatureVector {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    fn push(&mut self, name: String, value: Result<f64, FeatureComputationError>) {
        match value {
            Ok(v) => self.entries.push((name, v)),
            Err(err) => {
                debug!("{name}: {err}");
                self.failures.push(FeatureFailure {
                    feature: name.clone(),
                    reason: err.to_string(),
                });
                self.entries.push((name, f64::NAN));
            }
        }
    }
}

/// Column names produced for one series, prefixed, in extraction order.
pub fn feature_names(prefix: &str, cfg: &FeatureConfig) -> Vec<String> {
    catch22::feature_names(cfg.extended)
        .into_iter()
        .chain(SUMMARY_NAMES)
        .map(|name| format!("{prefix}_{name}"))
        .collect()
}

fn not_nan(feature: &'static str, value: f64) -> Result<f64, FeatureComputationError> {
    if value.is_nan() {
        Err(FeatureComputationError::undefined(feature, "undefined for this series"))
    } else {
        Ok(value)
    }
}

/// Extract every feature of one named series.
///
/// Non-finite points are dropped first. Individual feature failures become
/// NaN entries; only an empty series fails as a whole.
pub fn extract_series_features(
    name: &str,
    values: &[f64],
    cfg: &FeatureConfig,
) -> Result<FeatureVector, FeatureComputationError> {
    let series: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if series.is_empty() {
        return Err(FeatureComputationError::EmptySeries {
            series: name.to_string(),
        });
    }

    let mut out = FeatureVector::default();
    for (feature, value) in catch22::catch22_all(&series, cfg.extended) {
        out.push(format!("{name}_{feature}"), value);
    }

    let sd = sample_sd(&series);
    let r = cfg.tolerance_factor * sd;
    let m = cfg.embedding_dimension;
    let summaries: [(&str, Result<f64, FeatureComputationError>); 11] = [
        ("mean", Ok(mean(&series))),
        ("sd", not_nan("sd", sd)),
        ("max", Ok(descriptive::max(&series))),
        ("min", Ok(descriptive::min(&series))),
        ("cv", not_nan("cv", coefficient_of_variation(&series))),
        ("iqr", Ok(iqr(&series))),
        ("median", Ok(median(&series))),
        ("apen", approx_entropy(&series, m, r)),
        ("sampen", sample_entropy(&series, m, r)),
        (
            "permen",
            permutation_entropy(&series, cfg.permutation_order, cfg.permutation_delay, false),
        ),
        (
            "dfa_alpha1",
            detrended_fluctuation_alpha(&series, cfg.dfa_window_range, cfg.dfa_points),
        ),
    ];
    for (feature, value) in summaries {
        out.push(format!("{name}_{feature}"), value);
    }
    Ok(out)
}

/// Feature vectors of one subject, one per series.
#[derive(Debug, Clone)]
pub struct SubjectFeatures {
    pub id: String,
    pub condition: Condition,
    pub status: Status,
    pub series: Vec<(SeriesKind, Result<FeatureVector, FeatureComputationError>)>,
}

/// Group windows by subject and extract the hr/sdnn/rmssd series features
/// for each, in parallel.
///
/// Subjects come from `recordings` (in their order), so a recording whose
/// windows were all downsampled away still gets a row; its three series fail
/// with `EmptySeries`. Windows of subjects missing from `recordings` are
/// appended in first-seen order.
pub fn extract_subject_features(
    recordings: &[SubjectRecording],
    windows: &[Window],
    cfg: &FeatureConfig,
) -> Vec<SubjectFeatures> {
    let mut order: Vec<(&str, Condition, Status)> = recordings
        .iter()
        .map(|r| (r.subject_id.as_str(), r.condition, r.status))
        .collect();
    let mut groups: HashMap<&str, Vec<&Window>> = order
        .iter()
        .map(|(id, _, _)| (*id, Vec::new()))
        .collect();
    for window in windows {
        groups
            .entry(window.subject_id.as_str())
            .or_insert_with(|| {
                order.push((window.subject_id.as_str(), window.condition, window.status));
                Vec::new()
            })
            .push(window);
    }

    order
        .par_iter()
        .map(|&(id, condition, status)| {
            let mut subject_windows = groups.get(id).cloned().unwrap_or_default();
            if subject_windows.is_empty() {
                warn!("{id}: no windows left after downsampling");
            }
            subject_windows.sort_by_key(|w| w.window_index);
            let series = SeriesKind::ALL
                .iter()
                .map(|kind| {
                    let values: Vec<f64> = subject_windows.iter().map(|w| kind.value(w)).collect();
                    (*kind, extract_series_features(kind.prefix(), &values, cfg))
                })
                .collect();
            SubjectFeatures {
                id: id.to_string(),
                condition,
                status,
                series,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub id: String,
    pub condition: Condition,
    pub status: Status,
    /// Aligned with `FeatureTable::columns`
    pub values: Vec<f64>,
}

/// Wide table: one row per subject, one column per prefixed feature.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureTable {
    pub columns: Vec<String>,
    pub rows: Vec<FeatureRow>,
}

impl FeatureTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|r| r.values[idx]).collect())
    }

    pub fn nan_fraction_by_column(&self) -> Vec<(String, f64)> {
        self.columns
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                let nan = self.rows.iter().filter(|r| r.values[idx].is_nan()).count();
                let frac = if self.rows.is_empty() {
                    0.0
                } else {
                    nan as f64 / self.rows.len() as f64
                };
                (name.clone(), frac)
            })
            .collect()
    }

    /// Columns whose NaN fraction exceeds `threshold`.
    pub fn nan_heavy_columns(&self, threshold: f64) -> Vec<String> {
        self.nan_fraction_by_column()
            .into_iter()
            .filter(|(_, frac)| *frac > threshold)
            .map(|(name, _)| name)
            .collect()
    }
}

/// Outer-join per-series vectors on the subject key.
///
/// Every subject yields a row. A failed series contributes NaN for the
/// columns it would have produced.
pub fn merge_feature_vectors(subjects: &[SubjectFeatures], cfg: &FeatureConfig) -> FeatureTable {
    let mut columns: Vec<String> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut register = |name: &str, columns: &mut Vec<String>| {
        if !index.contains_key(name) {
            index.insert(name.to_string(), columns.len());
            columns.push(name.to_string());
        }
    };
    for subject in subjects {
        for (kind, result) in &subject.series {
            match result {
                Ok(vector) => vector
                    .entries
                    .iter()
                    .for_each(|(name, _)| register(name, &mut columns)),
                Err(_) => feature_names(kind.prefix(), cfg)
                    .iter()
                    .for_each(|name| register(name, &mut columns)),
            }
        }
    }

    let rows = subjects
        .iter()
        .map(|subject| {
            let mut values = vec![f64::NAN; columns.len()];
            for vector in subject.series.iter().filter_map(|(_, r)| r.as_ref().ok()) {
                for (name, value) in &vector.entries {
                    if let Some(&pos) = index.get(name) {
                        values[pos] = *value;
                    }
                }
            }
            FeatureRow {
                id: subject.id.clone(),
                condition: subject.condition,
                status: subject.status,
                values,
            }
        })
        .collect();

    FeatureTable { columns, rows }
}
