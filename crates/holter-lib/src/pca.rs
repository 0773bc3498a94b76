//! Principal component analysis of the wide feature table.

use crate::error::PcaError;
use crate::features::FeatureTable;
use crate::metrics::descriptive::{mean, sample_sd};
use crate::signal::{Condition, Status};
use log::info;
use nalgebra::{DMatrix, SymmetricEigen};
use serde::{Deserialize, Serialize};

/// Complete-case matrix ready for PCA.
#[derive(Debug, Clone)]
pub struct PcaInput {
    pub ids: Vec<String>,
    pub conditions: Vec<Condition>,
    pub statuses: Vec<Status>,
    pub columns: Vec<String>,
    /// rows x columns
    pub data: DMatrix<f64>,
    /// Rows removed because a chosen column was missing
    pub dropped_rows: usize,
    /// Columns removed for having no values or zero variance
    pub dropped_columns: Vec<String>,
}

/// Restrict `table` to `columns`, drop incomplete rows, then drop constant
/// columns. Columns with no value at all are removed before the row filter.
pub fn prepare_matrix(table: &FeatureTable, columns: &[String]) -> Result<PcaInput, PcaError> {
    let mut dropped_columns = Vec::new();
    let mut selected = Vec::new();
    for column in columns {
        let idx = table
            .column_index(column)
            .ok_or_else(|| PcaError::UnknownColumn(column.clone()))?;
        if table.rows.iter().any(|r| r.values[idx].is_finite()) {
            selected.push((column, idx));
        } else {
            dropped_columns.push(column.clone());
        }
    }
    let (columns, indices): (Vec<&String>, Vec<usize>) = selected.into_iter().unzip();

    let complete: Vec<_> = table
        .rows
        .iter()
        .filter(|row| indices.iter().all(|&i| row.values[i].is_finite()))
        .collect();
    let dropped_rows = table.rows.len() - complete.len();
    if complete.len() < 2 {
        return Err(PcaError::TooFewRows(complete.len()));
    }

    let mut kept = Vec::new();
    for (&name, &idx) in columns.iter().zip(&indices) {
        let values: Vec<f64> = complete.iter().map(|r| r.values[idx]).collect();
        let sd = sample_sd(&values);
        if sd.is_finite() && sd > 0.0 {
            kept.push((name.clone(), idx));
        } else {
            dropped_columns.push(name.clone());
        }
    }
    if kept.is_empty() {
        return Err(PcaError::NoUsableColumns);
    }

    let data = DMatrix::from_fn(complete.len(), kept.len(), |r, c| complete[r].values[kept[c].1]);
    Ok(PcaInput {
        ids: complete.iter().map(|r| r.id.clone()).collect(),
        conditions: complete.iter().map(|r| r.condition).collect(),
        statuses: complete.iter().map(|r| r.status).collect(),
        columns: kept.into_iter().map(|(name, _)| name).collect(),
        data,
        dropped_rows,
        dropped_columns,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PcaResult {
    pub columns: Vec<String>,
    /// Eigenvalues of the correlation matrix, descending
    pub explained_variance: Vec<f64>,
    pub explained_variance_ratio: Vec<f64>,
    /// One vector per component, aligned with `columns`
    pub loadings: Vec<Vec<f64>>,
    /// One vector per input row, one value per component
    pub scores: Vec<Vec<f64>>,
}

/// Standardise each column and eigendecompose the correlation matrix.
///
/// Component signs are fixed so the largest-magnitude loading is positive.
pub fn pca(input: &PcaInput) -> Result<PcaResult, PcaError> {
    let (n, k) = input.data.shape();
    if n < 2 {
        return Err(PcaError::TooFewRows(n));
    }
    if k == 0 {
        return Err(PcaError::NoUsableColumns);
    }

    let mut z = input.data.clone();
    for mut col in z.column_iter_mut() {
        let values: Vec<f64> = col.iter().copied().collect();
        let (m, sd) = (mean(&values), sample_sd(&values));
        col.apply(|v| *v = (*v - m) / sd);
    }
    let corr = (z.transpose() * &z) / (n as f64 - 1.0);

    let eigen = SymmetricEigen::new(corr);
    let mut order: Vec<usize> = (0..k).collect();
    order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));

    let total: f64 = eigen.eigenvalues.iter().map(|v| v.max(0.0)).sum();
    let mut explained_variance = Vec::with_capacity(k);
    let mut explained_variance_ratio = Vec::with_capacity(k);
    let mut loadings = Vec::with_capacity(k);
    for &idx in &order {
        let ev = eigen.eigenvalues[idx].max(0.0);
        explained_variance.push(ev);
        explained_variance_ratio.push(if total > 0.0 { ev / total } else { 0.0 });
        let mut vector: Vec<f64> = eigen.eigenvectors.column(idx).iter().copied().collect();
        let pivot = vector
            .iter()
            .copied()
            .fold(0.0f64, |best, v| if v.abs() > best.abs() { v } else { best });
        if pivot < 0.0 {
            vector.iter_mut().for_each(|v| *v = -*v);
        }
        loadings.push(vector);
    }

    let scores = (0..n)
        .map(|row| {
            loadings
                .iter()
                .map(|l| l.iter().enumerate().map(|(c, w)| z[(row, c)] * w).sum())
                .collect()
        })
        .collect();

    info!(
        "PCA over {n} rows x {k} columns, PC1 explains {:.1}%",
        explained_variance_ratio.first().copied().unwrap_or(0.0) * 100.0
    );
    Ok(PcaResult {
        columns: input.columns.clone(),
        explained_variance,
        explained_variance_ratio,
        loadings,
        scores,
    })
}
