#[cfg(feature = "polars")]
pub mod polars_io {
    use crate::features::FeatureTable;
    use anyhow::{Context, Result};
    use polars::prelude::*;
    use std::fs::File;
    use std::path::Path;

    /// Wide feature table as a DataFrame (`id`, `condition`, `status`, then
    /// one f64 column per feature; NaN stays NaN, not null).
    pub fn feature_frame(table: &FeatureTable) -> Result<DataFrame> {
        let mut columns = vec![
            Series::new(
                "id".into(),
                table.rows.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
            ),
            Series::new(
                "condition".into(),
                table
                    .rows
                    .iter()
                    .map(|r| r.condition.label())
                    .collect::<Vec<_>>(),
            ),
            Series::new(
                "status".into(),
                table.rows.iter().map(|r| r.status.label()).collect::<Vec<_>>(),
            ),
        ];
        for (idx, name) in table.columns.iter().enumerate() {
            let values: Vec<f64> = table.rows.iter().map(|r| r.values[idx]).collect();
            columns.push(Series::new(name.as_str().into(), values));
        }
        Ok(DataFrame::new(columns)?)
    }

    pub fn write_feature_parquet(path: &Path, table: &FeatureTable) -> Result<()> {
        let mut df = feature_frame(table)?;
        let file =
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
        ParquetWriter::new(file).finish(&mut df)?;
        Ok(())
    }

    /// Load a single numeric column of a CSV written by the pipeline.
    pub fn load_column(path: &str, col: &str) -> Result<Vec<f64>> {
        let df = CsvReadOptions::default()
            .try_into_reader_with_file_path(Some(path.into()))?
            .finish()?;
        let s = df.column(col)?;
        Ok(s.f64()?.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    }

}
