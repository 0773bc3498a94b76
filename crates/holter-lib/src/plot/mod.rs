use crate::metrics::window::Window;
use crate::pca::PcaResult;
use crate::signal::Condition;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Axis {
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Style {
    pub width: f32,
    pub dash: Option<[f32; 2]>,
    pub color: Color,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color(pub u32);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineSeries {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    pub style: Style,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScatterSeries {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    /// Marker radius in pixels
    pub size: u32,
    pub color: Color,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Series {
    Line(LineSeries),
    Scatter(ScatterSeries),
}

impl Series {
    pub fn name(&self) -> &str {
        match self {
            Series::Line(s) => &s.name,
            Series::Scatter(s) => &s.name,
        }
    }

    pub fn points(&self) -> &[[f64; 2]] {
        match self {
            Series::Line(s) => &s.points,
            Series::Scatter(s) => &s.points,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Figure {
    pub title: Option<String>,
    pub x: Axis,
    pub y: Axis,
    pub series: Vec<Series>,
}

impl Figure {
    pub fn new(title: impl Into<Option<String>>) -> Self {
        Self {
            title: title.into(),
            x: Axis { label: None },
            y: Axis { label: None },
            series: Vec::new(),
        }
    }

    pub fn add_series(&mut self, series: Series) {
        self.series.push(series);
    }

    /// `(x_min, x_max, y_min, y_max)` over all series, `None` when empty.
    pub fn bounds(&self) -> Option<(f64, f64, f64, f64)> {
        let mut points = self.series.iter().flat_map(|s| s.points().iter());
        let first = points.next()?;
        Some(points.fold(
            (first[0], first[0], first[1], first[1]),
            |(x0, x1, y0, y1), p| (x0.min(p[0]), x1.max(p[0]), y0.min(p[1]), y1.max(p[1])),
        ))
    }
}

pub trait PlotBackend {
    fn draw(&mut self, fig: &Figure) -> anyhow::Result<()>;
}

pub fn decimate_points(points: &[[f64; 2]], max_points: usize) -> Vec<[f64; 2]> {
    if points.len() <= max_points {
        return points.to_vec();
    }
    let bucket_size = points.len() as f64 / max_points as f64;
    let mut result = Vec::with_capacity(max_points);
    for i in 0..max_points {
        let start = (i as f64 * bucket_size).floor() as usize;
        if start >= points.len() {
            break;
        }
        result.push(points[start]);
    }
    result
}

pub fn condition_color(condition: Condition) -> Color {
    match condition {
        Condition::Normal => Color(0x1F77B4),
        Condition::AtrialFibrillation => Color(0xFF7F0E),
        Condition::Chf => Color(0xD62728),
        Condition::Unknown => Color(0x7F7F7F),
    }
}

/// Per-window mean heart rate, one line per subject.
pub fn figure_from_windows(windows: &[Window], max_points: usize) -> Figure {
    let mut fig = Figure::new(Some("Windowed heart rate".into()));
    fig.x.label = Some("window".into());
    fig.y.label = Some("beats/min".into());

    let mut start = 0;
    while start < windows.len() {
        let id = &windows[start].subject_id;
        let end = windows[start..]
            .iter()
            .position(|w| &w.subject_id != id)
            .map_or(windows.len(), |offset| start + offset);
        let points: Vec<[f64; 2]> = windows[start..end]
            .iter()
            .filter(|w| w.mean_heart_rate.is_finite())
            .map(|w| [w.window_index as f64, w.mean_heart_rate])
            .collect();
        fig.add_series(Series::Line(LineSeries {
            name: id.clone(),
            points: decimate_points(&points, max_points),
            style: Style {
                width: 1.4,
                dash: None,
                color: condition_color(windows[start].condition),
            },
        }));
        start = end;
    }
    fig
}

/// Scores on the first two components, one scatter series per condition.
pub fn figure_from_pca(result: &PcaResult, conditions: &[Condition]) -> Figure {
    let ratio = |i: usize| result.explained_variance_ratio.get(i).copied().unwrap_or(0.0) * 100.0;
    let mut fig = Figure::new(Some("PCA".into()));
    fig.x.label = Some(format!("PC1 ({:.1}%)", ratio(0)));
    fig.y.label = Some(format!("PC2 ({:.1}%)", ratio(1)));

    for condition in [
        Condition::Normal,
        Condition::AtrialFibrillation,
        Condition::Chf,
        Condition::Unknown,
    ] {
        let points: Vec<[f64; 2]> = result
            .scores
            .iter()
            .zip(conditions)
            .filter(|(_, c)| **c == condition)
            .map(|(s, _)| [s[0], s.get(1).copied().unwrap_or(0.0)])
            .collect();
        if points.is_empty() {
            continue;
        }
        fig.add_series(Series::Scatter(ScatterSeries {
            name: condition.label().into(),
            points,
            size: 5,
            color: condition_color(condition),
        }));
    }
    fig
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::Status;

    fn window(id: &str, index: i64, hr: f64) -> Window {
        let condition = Condition::from_subject_id(id);
        Window {
            subject_id: id.into(),
            condition,
            status: Status::from_condition(condition),
            window_index: index,
            mean_heart_rate: hr,
            sdnn: 0.0,
            rmssd: 0.0,
            beat_count: 2,
        }
    }

    #[test]
    fn decimation_caps_points() {
        let points: Vec<[f64; 2]> = (0..100).map(|i| [i as f64, 0.0]).collect();
        let out = decimate_points(&points, 10);
        assert_eq!(out.len(), 10);
        assert_eq!(out[1], [10.0, 0.0]);
    }

    #[test]
    fn one_line_per_subject() {
        let windows = vec![
            window("n1", 0, 60.0),
            window("n1", 1, f64::NAN),
            window("n1", 2, 62.0),
            window("c1", 0, 70.0),
        ];
        let fig = figure_from_windows(&windows, 1024);
        assert_eq!(fig.series.len(), 2);
        assert_eq!(fig.series[0].points(), &[[0.0, 60.0], [2.0, 62.0]]);
        assert_eq!(fig.series[1].name(), "c1");
        assert_eq!(fig.bounds(), Some((0.0, 2.0, 60.0, 70.0)));
    }

    #[test]
    fn pca_scatter_groups_by_condition() {
        let result = PcaResult {
            columns: vec!["a".into(), "b".into()],
            explained_variance: vec![1.5, 0.5],
            explained_variance_ratio: vec![0.75, 0.25],
            loadings: vec![vec![1.0, 0.0], vec![0.0, 1.0]],
            scores: vec![vec![1.0, 2.0], vec![-1.0, 0.5], vec![0.0, -2.0]],
        };
        let conditions = [Condition::Normal, Condition::Chf, Condition::Normal];
        let fig = figure_from_pca(&result, &conditions);
        assert_eq!(fig.series.len(), 2);
        assert_eq!(fig.series[0].name(), "normal");
        assert_eq!(fig.series[0].points(), &[[1.0, 2.0], [0.0, -2.0]]);
        assert_eq!(fig.x.label.as_deref(), Some("PC1 (75.0%)"));
    }
}
