//! Fixed-duration windowing of a subject's beat stream.

use crate::error::{ConfigError, WindowComputationError};
use crate::signal::{BeatRecord, Condition, Status, SubjectRecording};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Window durations offered on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowLength {
    OneMinute,
    FiveMinutes,
}

impl WindowLength {
    pub fn seconds(&self) -> f64 {
        match self {
            WindowLength::OneMinute => 60.0,
            WindowLength::FiveMinutes => 300.0,
        }
    }
}

/// Keep only windows whose `index % modulus == phase`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Downsample {
    pub modulus: usize,
    pub phase: usize,
}

impl Default for Downsample {
    fn default() -> Self {
        // Phase 1 lines the 1-minute grid up with the companion wearable
        // dataset's 5-minute sampling.
        Self {
            modulus: 5,
            phase: 1,
        }
    }
}

impl Downsample {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.phase >= self.modulus {
            return Err(ConfigError::DownsamplePhase {
                modulus: self.modulus,
                phase: self.phase,
            });
        }
        Ok(())
    }

    pub fn keeps(&self, window_index: i64) -> bool {
        self.modulus > 0 && window_index.rem_euclid(self.modulus as i64) == self.phase as i64
    }
}

/// HRV summary of the beats falling in one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub subject_id: String,
    pub condition: Condition,
    pub status: Status,
    pub window_index: i64,
    /// beats/min, `mean(60 / interval)`
    pub mean_heart_rate: f64,
    pub sdnn: f64,
    pub rmssd: f64,
    pub beat_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowStats {
    pub mean_heart_rate: f64,
    pub sdnn: f64,
    pub rmssd: f64,
    pub beat_count: usize,
}

/// Beats sharing one window index, in elapsed-time order.
#[derive(Debug, Clone)]
pub struct BeatGroup<'a> {
    pub index: i64,
    pub beats: Vec<&'a BeatRecord>,
}

impl BeatGroup<'_> {
    pub fn intervals(&self) -> Vec<f64> {
        self.beats.iter().map(|b| b.interval_seconds).collect()
    }
}

pub fn mean_heart_rate(intervals: &[f64]) -> Result<f64, WindowComputationError> {
    if intervals.is_empty() {
        return Err(WindowComputationError::InsufficientBeats {
            statistic: "mean_heart_rate",
            needed: 1,
            found: 0,
        });
    }
    Ok(intervals.iter().map(|rr| 60.0 / rr).sum::<f64>() / intervals.len() as f64)
}

pub fn sdnn(intervals: &[f64]) -> Result<f64, WindowComputationError> {
    let n = intervals.len();
    if n < 2 {
        return Err(WindowComputationError::InsufficientBeats {
            statistic: "sdnn",
            needed: 2,
            found: n,
        });
    }
    let mean = intervals.iter().sum::<f64>() / n as f64;
    Ok((intervals.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n as f64 - 1.0)).sqrt())
}

pub fn rmssd(intervals: &[f64]) -> Result<f64, WindowComputationError> {
    let n = intervals.len();
    if n < 2 {
        return Err(WindowComputationError::InsufficientBeats {
            statistic: "rmssd",
            needed: 2,
            found: n,
        });
    }
    let diffs = intervals.windows(2).map(|w| (w[1] - w[0]).powi(2));
    Ok((diffs.sum::<f64>() / (n as f64 - 1.0)).sqrt())
}

/// Summaries for one window; a statistic that needs more beats is NaN.
pub fn summarize_window(intervals: &[f64]) -> WindowStats {
    WindowStats {
        mean_heart_rate: mean_heart_rate(intervals).unwrap_or(f64::NAN),
        sdnn: sdnn(intervals).unwrap_or(f64::NAN),
        rmssd: rmssd(intervals).unwrap_or(f64::NAN),
        beat_count: intervals.len(),
    }
}

fn check_duration(duration: f64) -> Result<(), ConfigError> {
    if duration.is_finite() && duration > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::WindowDuration(duration))
    }
}

/// Sort beats by elapsed time and group them by `floor(elapsed / duration)`.
///
/// Only indices that contain beats are produced; gaps are not filled.
pub fn group_beats(beats: &[BeatRecord], duration: f64) -> Result<Vec<BeatGroup<'_>>, ConfigError> {
    check_duration(duration)?;
    let mut ordered: Vec<&BeatRecord> = beats.iter().collect();
    ordered.sort_by(|a, b| a.elapsed_seconds.total_cmp(&b.elapsed_seconds));

    let mut groups: Vec<BeatGroup<'_>> = Vec::new();
    for beat in ordered {
        let index = (beat.elapsed_seconds / duration).floor() as i64;
        match groups.last_mut() {
            Some(group) if group.index == index => group.beats.push(beat),
            _ => groups.push(BeatGroup {
                index,
                beats: vec![beat],
            }),
        }
    }
    Ok(groups)
}

pub fn window_subject(recording: &SubjectRecording, duration: f64) -> Result<Vec<Window>, ConfigError> {
    let groups = group_beats(&recording.beats, duration)?;
    Ok(groups
        .iter()
        .map(|group| {
            let stats = summarize_window(&group.intervals());
            Window {
                subject_id: recording.subject_id.clone(),
                condition: recording.condition,
                status: recording.status,
                window_index: group.index,
                mean_heart_rate: stats.mean_heart_rate,
                sdnn: stats.sdnn,
                rmssd: stats.rmssd,
                beat_count: stats.beat_count,
            }
        })
        .collect())
}

/// Window every recording; output keeps recording order.
pub fn window_all(recordings: &[SubjectRecording], duration: f64) -> Result<Vec<Window>, ConfigError> {
    check_duration(duration)?;
    let per_subject: Vec<Vec<Window>> = recordings
        .par_iter()
        .map(|rec| window_subject(rec, duration))
        .collect::<Result<_, _>>()?;
    Ok(per_subject.into_iter().flatten().collect())
}

pub fn downsample(windows: &[Window], plan: Downsample) -> Result<Vec<Window>, ConfigError> {
    plan.validate()?;
    Ok(windows
        .iter()
        .filter(|w| plan.keeps(w.window_index))
        .cloned()
        .collect())
}
