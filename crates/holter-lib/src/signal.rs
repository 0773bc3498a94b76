use crate::error::LabelError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Clinical group of a recording, derived from the first letter of its subject id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    Normal,
    #[serde(rename = "af")]
    AtrialFibrillation,
    Chf,
    Unknown,
}

impl Condition {
    /// Total prefix table: `a` atrial fibrillation, `n` normal sinus rhythm,
    /// `c` congestive heart failure, anything else unknown.
    pub fn from_subject_id(subject_id: &str) -> Self {
        match subject_id.chars().next() {
            Some('a') => Condition::AtrialFibrillation,
            Some('n') => Condition::Normal,
            Some('c') => Condition::Chf,
            _ => Condition::Unknown,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Condition::Normal => "normal",
            Condition::AtrialFibrillation => "af",
            Condition::Chf => "chf",
            Condition::Unknown => "unknown",
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Condition::Unknown)
    }
}

/// Coarse status used for two-group comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Healthy,
    Chf,
    Unknown,
}

impl Status {
    pub fn from_condition(condition: Condition) -> Self {
        match condition {
            Condition::AtrialFibrillation | Condition::Normal => Status::Healthy,
            Condition::Chf => Status::Chf,
            Condition::Unknown => Status::Unknown,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Status::Healthy => "healthy",
            Status::Chf => "chf",
            Status::Unknown => "unknown",
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Status::Unknown)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Condition {
    type Err = LabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(Condition::Normal),
            "af" | "atrialfibrillation" | "atrial_fibrillation" => {
                Ok(Condition::AtrialFibrillation)
            }
            "chf" => Ok(Condition::Chf),
            "unknown" => Ok(Condition::Unknown),
            other => Err(LabelError {
                kind: "condition",
                label: other.to_string(),
            }),
        }
    }
}

impl FromStr for Status {
    type Err = LabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "healthy" => Ok(Status::Healthy),
            "chf" => Ok(Status::Chf),
            "unknown" => Ok(Status::Unknown),
            other => Err(LabelError {
                kind: "status",
                label: other.to_string(),
            }),
        }
    }
}

/// One inter-beat interval observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeatRecord {
    pub subject_id: String,
    /// Time since recording start (seconds)
    pub elapsed_seconds: f64,
    /// Interval to the previous beat (seconds)
    pub interval_seconds: f64,
    pub condition: Condition,
    pub status: Status,
}

/// All beats ingested from one subject file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectRecording {
    pub subject_id: String,
    pub condition: Condition,
    pub status: Status,
    pub beats: Vec<BeatRecord>,
}

impl SubjectRecording {
    /// Tag raw `(interval, elapsed)` pairs with the subject's identity.
    pub fn from_pairs(subject_id: &str, pairs: impl IntoIterator<Item = (f64, f64)>) -> Self {
        let condition = Condition::from_subject_id(subject_id);
        let status = Status::from_condition(condition);
        let beats = pairs
            .into_iter()
            .map(|(interval_seconds, elapsed_seconds)| BeatRecord {
                subject_id: subject_id.to_string(),
                elapsed_seconds,
                interval_seconds,
                condition,
                status,
            })
            .collect();
        Self {
            subject_id: subject_id.to_string(),
            condition,
            status,
            beats,
        }
    }

    pub fn len(&self) -> usize {
        self.beats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beats.is_empty()
    }

    /// Span between first and last beat (seconds).
    pub fn duration(&self) -> f64 {
        let (lo, hi) = self
            .beats
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), b| {
                (lo.min(b.elapsed_seconds), hi.max(b.elapsed_seconds))
            });
        if lo.is_finite() {
            hi - lo
        } else {
            0.0
        }
    }
}
