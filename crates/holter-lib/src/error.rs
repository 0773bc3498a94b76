use std::path::PathBuf;
use thiserror::Error;

/// A condition or status label that is none of the known spellings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} label {label:?}")]
pub struct LabelError {
    pub kind: &'static str,
    pub label: String,
}

/// Problems reading beat-interval recordings.
///
/// Per-file variants are recorded in the ingestion report and the file is
/// skipped; the directory-level variants abort the run.
#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}: line {line} has {found} columns, expected 3", path.display())]
    ColumnCount {
        path: PathBuf,
        line: usize,
        found: usize,
    },
    #[error("{}: line {line} column {column} is not numeric: {value:?}", path.display())]
    NotNumeric {
        path: PathBuf,
        line: usize,
        column: usize,
        value: String,
    },
    #[error("{}: no usable beat records", path.display())]
    NoRecords { path: PathBuf },
    #[error("input directory {} is unreadable: {source}", path.display())]
    DirectoryUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no files ending in {suffix:?} under {}", path.display())]
    NoMatchingFiles { path: PathBuf, suffix: String },
    #[error("all {count} recordings under {} failed to parse", path.display())]
    AllFilesFailed { path: PathBuf, count: usize },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WindowComputationError {
    #[error("{statistic} needs at least {needed} beats, window has {found}")]
    InsufficientBeats {
        statistic: &'static str,
        needed: usize,
        found: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeatureComputationError {
    #[error("{feature}: series of length {found} is shorter than {needed}")]
    TooShort {
        feature: &'static str,
        needed: usize,
        found: usize,
    },
    #[error("{feature}: series is constant")]
    ConstantSeries { feature: &'static str },
    #[error("{feature}: {reason}")]
    Undefined {
        feature: &'static str,
        reason: String,
    },
    #[error("series {series:?} has no finite values")]
    EmptySeries { series: String },
}

impl FeatureComputationError {
    pub(crate) fn undefined(feature: &'static str, reason: impl Into<String>) -> Self {
        Self::Undefined {
            feature,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ComparisonError {
    #[error("group {group:?} has {found} observations, need at least 2")]
    InsufficientObservations { group: String, found: usize },
    #[error("need at least 2 groups, found {found}")]
    TooFewGroups { found: usize },
    #[error("zero within-group variance")]
    ZeroVariance,
    #[error("invalid reference distribution: {0}")]
    Distribution(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PcaError {
    #[error("PCA needs at least 2 complete rows, found {0}")]
    TooFewRows(usize),
    #[error("no feature columns with nonzero variance")]
    NoUsableColumns,
    #[error("unknown feature column {0:?}")]
    UnknownColumn(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("window duration must be positive, got {0}")]
    WindowDuration(f64),
    #[error("downsample phase {phase} must be below modulus {modulus}")]
    DownsamplePhase { modulus: usize, phase: usize },
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
