//! CSV output (and read-back) of the pipeline's tables.

use crate::compare::ComparisonResult;
use crate::features::{FeatureRow, FeatureTable};
use crate::metrics::window::Window;
use crate::signal::{Condition, Status};
use anyhow::{bail, Context, Result};
use csv::{ReaderBuilder, Trim, WriterBuilder};
use std::io::{Read, Write};
use std::path::Path;

const KEY_COLUMNS: [&str; 3] = ["id", "condition", "status"];

fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else {
        value.to_string()
    }
}

fn parse_value(cell: &str) -> Result<f64> {
    if cell.is_empty() || cell.eq_ignore_ascii_case("nan") || cell.eq_ignore_ascii_case("na") {
        return Ok(f64::NAN);
    }
    cell.parse::<f64>()
        .with_context(|| format!("invalid numeric cell {cell:?}"))
}

/// Wide table: `id,condition,status,<feature columns…>`.
pub fn write_feature_table<W: Write>(table: &FeatureTable, out: W) -> Result<()> {
    let mut writer = WriterBuilder::new().from_writer(out);
    writer.write_record(KEY_COLUMNS.iter().copied().chain(table.columns.iter().map(String::as_str)))?;
    for row in &table.rows {
        let mut record = vec![
            row.id.clone(),
            row.condition.label().to_string(),
            row.status.label().to_string(),
        ];
        record.extend(row.values.iter().map(|v| format_value(*v)));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_feature_table<R: Read>(input: R) -> Result<FeatureTable> {
    let mut reader = ReaderBuilder::new().trim(Trim::All).from_reader(input);
    let headers = reader.headers()?.clone();
    if headers.len() < KEY_COLUMNS.len()
        || headers.iter().take(3).ne(KEY_COLUMNS.iter().copied())
    {
        bail!("feature table must start with columns id,condition,status");
    }
    let columns: Vec<String> = headers.iter().skip(3).map(str::to_string).collect();

    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let line = idx + 2;
        let record = record.with_context(|| format!("reading feature row {line}"))?;
        let condition = record[1]
            .parse::<Condition>()
            .with_context(|| format!("row {line}"))?;
        let status = record[2]
            .parse::<Status>()
            .with_context(|| format!("row {line}"))?;
        let values = record
            .iter()
            .skip(3)
            .map(parse_value)
            .collect::<Result<Vec<f64>>>()
            .with_context(|| format!("row {line}"))?;
        rows.push(FeatureRow {
            id: record[0].to_string(),
            condition,
            status,
            values,
        });
    }
    Ok(FeatureTable { columns, rows })
}

pub fn write_feature_csv(path: &Path, table: &FeatureTable) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    write_feature_table(table, file).with_context(|| format!("writing {}", path.display()))
}

pub fn read_feature_csv(path: &Path) -> Result<FeatureTable> {
    let file =
        std::fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    read_feature_table(file).with_context(|| format!("parsing {}", path.display()))
}

fn write_serialized<T: serde::Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut writer = WriterBuilder::new()
        .from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// One row per window; NaN statistics are written as `NaN`.
pub fn write_windows_csv(path: &Path, windows: &[Window]) -> Result<()> {
    write_serialized(path, windows)
}

/// One row per `(metric, test)`; unavailable numbers are empty cells.
pub fn write_comparisons_csv(path: &Path, results: &[ComparisonResult]) -> Result<()> {
    write_serialized(path, results)
}
