use std::path::PathBuf;

use polars::prelude::*;

/// Cleaned collision records, one polars column per output column.
///
/// Column order is the index column, the merged timestamp column, then every
/// other input column in input order. Rows keep input order.
#[derive(Debug, Clone)]
pub struct CollisionTable {
    pub df: DataFrame,
    pub index_column: String,
    pub timestamp_column: String,
}

impl CollisionTable {
    pub fn height(&self) -> usize {
        self.df.height()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.df
            .get_column_names()
            .iter()
            .map(|name| name.to_string())
            .collect()
    }

    pub fn null_count(&self, column: &str) -> PolarsResult<usize> {
        Ok(self.df.column(column)?.null_count())
    }
}

/// Cells substituted per column by the default-fill step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FillSummary {
    pub filled: Vec<(String, usize)>,
}

impl FillSummary {
    pub fn total(&self) -> usize {
        self.filled.iter().map(|(_, count)| count).sum()
    }

    pub fn for_column(&self, column: &str) -> Option<usize> {
        self.filled
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, count)| *count)
    }
}

#[derive(Debug, Clone)]
pub struct CleanReport {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub rows: usize,
    pub fill: FillSummary,
}
