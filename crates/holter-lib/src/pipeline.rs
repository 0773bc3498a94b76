//! Batch pipeline: ingestion, windowing, downsampling, feature extraction.

use crate::config::PipelineConfig;
use crate::features::{extract_subject_features, merge_feature_vectors, FeatureTable};
use crate::io::beats::{ingest_dir, IngestionReport, SkippedFile};
use crate::metrics::window::{downsample, window_all, Window};
use anyhow::{Context, Result};
use log::{info, warn};
use serde::Serialize;
use std::path::PathBuf;

/// A subject series whose features could not be extracted at all.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedSeries {
    pub subject_id: String,
    pub series: String,
    pub reason: String,
}

/// What a run did, for the user-facing report.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSummary {
    pub input_dir: PathBuf,
    pub subjects: usize,
    pub windows: usize,
    /// Windows left after downsampling
    pub windows_kept: usize,
    pub feature_columns: usize,
    pub skipped_files: Vec<SkippedFile>,
    pub dropped_rows: usize,
    pub nan_heavy_columns: Vec<String>,
    pub failed_series: Vec<FailedSeries>,
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub features: FeatureTable,
    /// Windows the features were computed from
    pub windows: Vec<Window>,
    pub summary: PipelineSummary,
}

pub fn ingest(config: &PipelineConfig) -> Result<IngestionReport> {
    ingest_dir(&config.input_dir, &config.suffix)
        .with_context(|| format!("ingesting {}", config.input_dir.display()))
}

/// Window every recording and apply the configured downsampling.
///
/// Returns `(all windows, kept windows)`.
pub fn build_windows(
    report: &IngestionReport,
    config: &PipelineConfig,
) -> Result<(Vec<Window>, Vec<Window>)> {
    let windows = window_all(&report.recordings, config.window_seconds)?;
    let kept = match config.downsample {
        Some(plan) => downsample(&windows, plan)?,
        None => windows.clone(),
    };
    info!(
        "{} windows of {}s, {} kept after downsampling",
        windows.len(),
        config.window_seconds,
        kept.len()
    );
    Ok((windows, kept))
}

pub fn run(config: &PipelineConfig) -> Result<PipelineOutput> {
    config.validate()?;
    let report = ingest(config)?;
    let (all_windows, windows) = build_windows(&report, config)?;

    let subjects = extract_subject_features(&report.recordings, &windows, &config.features);
    let failed_series: Vec<FailedSeries> = subjects
        .iter()
        .flat_map(|s| {
            s.series.iter().filter_map(move |(kind, result)| {
                result.as_ref().err().map(|err| FailedSeries {
                    subject_id: s.id.clone(),
                    series: kind.prefix().to_string(),
                    reason: err.to_string(),
                })
            })
        })
        .collect();
    for failure in &failed_series {
        warn!(
            "{} {} series produced no features: {}",
            failure.subject_id, failure.series, failure.reason
        );
    }

    let subject_count = subjects.len();
    let features = merge_feature_vectors(&subjects, &config.features);
    let nan_heavy_columns = features.nan_heavy_columns(config.nan_heavy_threshold);
    if !nan_heavy_columns.is_empty() {
        warn!(
            "{} of {} feature columns are more than {:.0}% NaN",
            nan_heavy_columns.len(),
            features.columns.len(),
            config.nan_heavy_threshold * 100.0
        );
    }
    info!(
        "feature table: {} subjects x {} features",
        features.len(),
        features.columns.len()
    );

    let summary = PipelineSummary {
        input_dir: config.input_dir.clone(),
        subjects: subject_count,
        windows: all_windows.len(),
        windows_kept: windows.len(),
        feature_columns: features.columns.len(),
        skipped_files: report.skipped,
        dropped_rows: report.dropped_rows,
        nan_heavy_columns,
        failed_series,
    };
    Ok(PipelineOutput {
        features,
        windows,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::window::Downsample;
    use crate::signal::{Condition, Status};
    use std::fmt::Write as _;
    use std::fs;

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}"
        );
    }

    fn recording(intervals: impl Fn(usize) -> f64) -> String {
        let mut text = String::new();
        for i in 0..600 {
            writeln!(text, "{} 0 {}", intervals(i), i).unwrap();
        }
        text
    }

    fn fixture_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("n1nn.txt"), recording(|_| 0.857)).unwrap();
        fs::write(
            dir.path().join("a1nn.txt"),
            recording(|i| if i % 2 == 0 { 0.5 } else { 1.2 }),
        )
        .unwrap();
        fs::write(dir.path().join("c1nn.txt"), recording(|_| 1.0)).unwrap();
        dir
    }

    #[test]
    fn three_subjects_end_to_end() {
        let dir = fixture_dir();
        let config = PipelineConfig {
            input_dir: dir.path().to_path_buf(),
            ..PipelineConfig::default()
        };
        let out = run(&config).unwrap();

        assert_eq!(out.summary.windows, 30);
        assert_eq!(out.summary.windows_kept, 6);
        for id in ["a1nn", "c1nn", "n1nn"] {
            let indices: Vec<i64> = out
                .windows
                .iter()
                .filter(|w| w.subject_id == id)
                .map(|w| w.window_index)
                .collect();
            assert_eq!(indices, vec![1, 6], "{id}");
        }

        assert_eq!(out.features.len(), 3);
        let ids: Vec<&str> = out.features.rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a1nn", "c1nn", "n1nn"]);
        let af = &out.features.rows[0];
        assert_eq!(af.condition, Condition::AtrialFibrillation);
        assert_eq!(af.status, Status::Healthy);
        assert_eq!(out.features.rows[1].status, Status::Chf);

        let hr_mean = out.features.column("hr_mean").unwrap();
        assert_close(hr_mean[0], 85.0, 1e-9);
        assert_close(hr_mean[1], 60.0, 1e-9);
        assert_close(hr_mean[2], 60.0 / 0.857, 1e-9);
        assert!(out.summary.skipped_files.is_empty());
        assert!(out.summary.failed_series.is_empty());
    }

    #[test]
    fn without_downsampling_every_window_is_used() {
        let dir = fixture_dir();
        let config = PipelineConfig {
            input_dir: dir.path().to_path_buf(),
            downsample: None,
            ..PipelineConfig::default()
        };
        let out = run(&config).unwrap();
        assert_eq!(out.windows.len(), 30);
        assert_eq!(out.features.len(), 3);
    }

    #[test]
    fn bad_file_is_reported_not_fatal() {
        let dir = fixture_dir();
        fs::write(dir.path().join("x9nn.txt"), "not a beat file\n").unwrap();
        let config = PipelineConfig {
            input_dir: dir.path().to_path_buf(),
            downsample: Some(Downsample { modulus: 5, phase: 0 }),
            ..PipelineConfig::default()
        };
        let out = run(&config).unwrap();
        assert_eq!(out.summary.skipped_files.len(), 1);
        assert_eq!(out.features.len(), 3);
        assert!(out.windows.iter().all(|w| w.window_index % 5 == 0));
    }

    #[test]
    fn subject_without_kept_windows_keeps_a_nan_row() {
        let dir = fixture_dir();
        let mut short = String::new();
        for i in 0..50 {
            writeln!(short, "1.0 0 {i}").unwrap();
        }
        fs::write(dir.path().join("a2nn.txt"), short).unwrap();
        let config = PipelineConfig {
            input_dir: dir.path().to_path_buf(),
            ..PipelineConfig::default()
        };
        let out = run(&config).unwrap();

        assert_eq!(out.summary.subjects, 4);
        assert_eq!(out.features.len(), 4);
        let row = out
            .features
            .rows
            .iter()
            .find(|r| r.id == "a2nn")
            .expect("a2nn row");
        assert_eq!(row.condition, Condition::AtrialFibrillation);
        assert!(row.values.iter().all(|v| v.is_nan()));
        assert!(!out.windows.iter().any(|w| w.subject_id == "a2nn"));

        let failed: Vec<&str> = out
            .summary
            .failed_series
            .iter()
            .filter(|f| f.subject_id == "a2nn")
            .map(|f| f.series.as_str())
            .collect();
        assert_eq!(failed, vec!["hr", "sdnn", "rmssd"]);
    }

    #[test]
    fn empty_directory_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            input_dir: dir.path().to_path_buf(),
            ..PipelineConfig::default()
        };
        let err = run(&config).unwrap_err();
        assert!(format!("{err:#}").contains("no files ending in"));
    }
}
