//! Per-metric group comparison over the wide feature table.

pub mod stats;

use crate::error::ComparisonError;
use crate::features::FeatureTable;
use crate::signal::{Condition, Status};
use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use stats::{kruskal_wallis, mann_whitney_u, one_way_anova, welch_t_test, Sample, TestOutcome};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

/// One `(metric, subject)` observation of the long-form table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongRow {
    pub metric: String,
    pub id: String,
    pub condition: Condition,
    pub status: Status,
    pub value: f64,
}

pub fn to_long(table: &FeatureTable) -> Vec<LongRow> {
    table
        .columns
        .iter()
        .enumerate()
        .flat_map(|(idx, metric)| {
            table.rows.iter().map(move |row| LongRow {
                metric: metric.clone(),
                id: row.id.clone(),
                condition: row.condition,
                status: row.status,
                value: row.values[idx],
            })
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TestKind {
    /// Welch t-test across status
    TwoGroupParametric,
    /// Mann–Whitney U across status
    TwoGroupNonparametric,
    /// One-way ANOVA across condition
    ThreeGroupParametric,
    /// Kruskal–Wallis across condition
    ThreeGroupNonparametric,
}

impl TestKind {
    pub const ALL: [TestKind; 4] = [
        TestKind::TwoGroupParametric,
        TestKind::TwoGroupNonparametric,
        TestKind::ThreeGroupParametric,
        TestKind::ThreeGroupNonparametric,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            TestKind::TwoGroupParametric => "two-group-parametric",
            TestKind::TwoGroupNonparametric => "two-group-nonparametric",
            TestKind::ThreeGroupParametric => "three-group-parametric",
            TestKind::ThreeGroupNonparametric => "three-group-nonparametric",
        }
    }
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TestKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TestKind::ALL
            .into_iter()
            .find(|k| k.label() == s.trim())
            .ok_or_else(|| format!("unknown test kind {s:?}"))
    }
}

/// Outcome of one test on one metric; `error` is set and the numbers are
/// `None` when the test could not be run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub metric: String,
    pub kind: TestKind,
    pub statistic: Option<f64>,
    pub p_value: Option<f64>,
    pub df1: Option<f64>,
    pub df2: Option<f64>,
    pub effect: Option<f64>,
    pub error: Option<String>,
}

impl ComparisonResult {
    fn new(metric: &str, kind: TestKind, outcome: Result<TestOutcome, ComparisonError>) -> Self {
        match outcome {
            Ok(t) => Self {
                metric: metric.to_string(),
                kind,
                statistic: Some(t.statistic),
                p_value: Some(t.p_value),
                df1: t.df1,
                df2: t.df2,
                effect: Some(t.effect),
                error: None,
            },
            Err(err) => {
                debug!("{metric} {kind}: {err}");
                Self {
                    metric: metric.to_string(),
                    kind,
                    statistic: None,
                    p_value: None,
                    df1: None,
                    df2: None,
                    effect: None,
                    error: Some(err.to_string()),
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparisonConfig {
    pub alpha: f64,
    /// Test whose p-value selects metrics for PCA
    pub selection: TestKind,
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            alpha: 0.05,
            selection: TestKind::ThreeGroupNonparametric,
        }
    }
}

/// Split one metric's finite values by group level, keeping every level.
fn split_by<K: Ord + Copy>(
    rows: &[&LongRow],
    levels: &[K],
    key: impl Fn(&LongRow) -> K,
) -> Vec<(K, Vec<f64>)> {
    levels
        .iter()
        .map(|&level| {
            let values = rows
                .iter()
                .filter(|r| key(r) == level && !r.value.is_nan())
                .map(|r| r.value)
                .collect();
            (level, values)
        })
        .collect()
}

fn two_group(
    groups: &[(Status, Vec<f64>)],
    test: fn(Sample<'_>, Sample<'_>) -> Result<TestOutcome, ComparisonError>,
) -> Result<TestOutcome, ComparisonError> {
    match groups {
        [a, b] => test(
            Sample {
                label: a.0.label(),
                values: &a.1,
            },
            Sample {
                label: b.0.label(),
                values: &b.1,
            },
        ),
        _ => Err(ComparisonError::TooFewGroups {
            found: groups.len(),
        }),
    }
}

fn many_group(
    groups: &[(Condition, Vec<f64>)],
    test: fn(&[Sample<'_>]) -> Result<TestOutcome, ComparisonError>,
) -> Result<TestOutcome, ComparisonError> {
    let samples: Vec<Sample<'_>> = groups
        .iter()
        .map(|(c, v)| Sample {
            label: c.label(),
            values: v,
        })
        .collect();
    test(&samples)
}

/// Run all four tests on every metric.
///
/// Status and condition levels are taken from the whole table (Unknown
/// excluded) so a metric missing a level reports that level as
/// insufficient rather than silently testing fewer groups.
pub fn compare_metrics(rows: &[LongRow]) -> Vec<ComparisonResult> {
    let statuses: Vec<Status> = rows
        .iter()
        .map(|r| r.status)
        .filter(Status::is_known)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let conditions: Vec<Condition> = rows
        .iter()
        .map(|r| r.condition)
        .filter(Condition::is_known)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut order: Vec<&str> = Vec::new();
    let mut by_metric: HashMap<&str, Vec<&LongRow>> = HashMap::new();
    for row in rows {
        by_metric
            .entry(row.metric.as_str())
            .or_insert_with(|| {
                order.push(row.metric.as_str());
                Vec::new()
            })
            .push(row);
    }

    let results: Vec<ComparisonResult> = order
        .par_iter()
        .flat_map_iter(|metric| {
            let metric_rows = &by_metric[metric];
            let by_status = split_by(metric_rows, &statuses, |r| r.status);
            let by_condition = split_by(metric_rows, &conditions, |r| r.condition);
            [
                ComparisonResult::new(
                    metric,
                    TestKind::TwoGroupParametric,
                    two_group(&by_status, welch_t_test),
                ),
                ComparisonResult::new(
                    metric,
                    TestKind::TwoGroupNonparametric,
                    two_group(&by_status, mann_whitney_u),
                ),
                ComparisonResult::new(
                    metric,
                    TestKind::ThreeGroupParametric,
                    many_group(&by_condition, one_way_anova),
                ),
                ComparisonResult::new(
                    metric,
                    TestKind::ThreeGroupNonparametric,
                    many_group(&by_condition, kruskal_wallis),
                ),
            ]
        })
        .collect();

    let failed = results.iter().filter(|r| r.error.is_some()).count();
    info!(
        "compared {} metrics ({} tests, {} not available)",
        order.len(),
        results.len(),
        failed
    );
    results
}

/// Metrics whose `kind` p-value is below `alpha`, in result order.
pub fn promising_metrics(results: &[ComparisonResult], alpha: f64, kind: TestKind) -> Vec<String> {
    results
        .iter()
        .filter(|r| r.kind == kind && r.p_value.is_some_and(|p| p < alpha))
        .map(|r| r.metric.clone())
        .collect()
}
