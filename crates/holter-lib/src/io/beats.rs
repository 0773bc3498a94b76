use crate::error::IngestionError;
use crate::signal::SubjectRecording;
use log::{info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// File-name suffix of the beat-interval exports.
pub const DEFAULT_SUFFIX: &str = "nn.txt";

/// Rows parsed from one recording.
#[derive(Debug, Clone, Default)]
pub struct ParsedBeats {
    /// `(interval_seconds, elapsed_seconds)` in file order
    pub pairs: Vec<(f64, f64)>,
    /// Rows discarded because the interval was not finite and positive
    pub dropped: usize,
}

/// A recording that could not be ingested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct IngestionReport {
    pub recordings: Vec<SubjectRecording>,
    pub skipped: Vec<SkippedFile>,
    pub dropped_rows: usize,
}

/// Parse `interval marker elapsed` rows, ignoring blank/comment lines.
///
/// `path` only labels errors.
pub fn parse_beat_text(path: &Path, text: &str) -> Result<ParsedBeats, IngestionError> {
    let mut out = ParsedBeats::default();
    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        if fields.len() != 3 {
            return Err(IngestionError::ColumnCount {
                path: path.to_path_buf(),
                line: idx + 1,
                found: fields.len(),
            });
        }
        let mut values = [0.0f64; 3];
        for (column, (slot, field)) in values.iter_mut().zip(&fields).enumerate() {
            *slot = field.parse().map_err(|_| IngestionError::NotNumeric {
                path: path.to_path_buf(),
                line: idx + 1,
                column: column + 1,
                value: field.to_string(),
            })?;
        }
        let [interval, _marker, elapsed] = values;
        if !(interval.is_finite() && interval > 0.0 && elapsed.is_finite()) {
            out.dropped += 1;
            continue;
        }
        out.pairs.push((interval, elapsed));
    }
    if out.pairs.is_empty() {
        return Err(IngestionError::NoRecords {
            path: path.to_path_buf(),
        });
    }
    Ok(out)
}

/// Subject id of a recording: the file name without its extension.
pub fn subject_id_for(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Read one recording from disk. Returns the recording and its dropped-row count.
pub fn read_subject_file(path: &Path) -> Result<(SubjectRecording, usize), IngestionError> {
    let text = fs::read_to_string(path).map_err(|source| IngestionError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let parsed = parse_beat_text(path, &text)?;
    if parsed.dropped > 0 {
        warn!(
            "{}: dropped {} rows with non-positive intervals",
            path.display(),
            parsed.dropped
        );
    }
    let subject_id = subject_id_for(path);
    Ok((
        SubjectRecording::from_pairs(&subject_id, parsed.pairs),
        parsed.dropped,
    ))
}

/// Ingest every file in `dir` whose name ends with `suffix`.
///
/// A bad file is reported and skipped. The call only fails when the
/// directory is unreadable, holds no matching files, or none of them parse.
pub fn ingest_dir(dir: &Path, suffix: &str) -> Result<IngestionReport, IngestionError> {
    let entries = fs::read_dir(dir).map_err(|source| IngestionError::DirectoryUnreadable {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.ends_with(suffix))
                .unwrap_or(false)
        })
        .collect();
    paths.sort();
    if paths.is_empty() {
        return Err(IngestionError::NoMatchingFiles {
            path: dir.to_path_buf(),
            suffix: suffix.to_string(),
        });
    }

    let parsed: Vec<_> = paths
        .par_iter()
        .map(|path| (path, read_subject_file(path)))
        .collect();

    let mut report = IngestionReport::default();
    for (path, result) in parsed {
        match result {
            Ok((recording, dropped)) => {
                report.dropped_rows += dropped;
                report.recordings.push(recording);
            }
            Err(err) => {
                warn!("skipping {}: {}", path.display(), err);
                report.skipped.push(SkippedFile {
                    path: path.clone(),
                    reason: err.to_string(),
                });
            }
        }
    }
    if report.recordings.is_empty() {
        return Err(IngestionError::AllFilesFailed {
            path: dir.to_path_buf(),
            count: report.skipped.len(),
        });
    }
    info!(
        "ingested {} recordings from {} ({} skipped)",
        report.recordings.len(),
        dir.display(),
        report.skipped.len()
    );
    Ok(report)
}
