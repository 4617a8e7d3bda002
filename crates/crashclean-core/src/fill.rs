use polars::prelude::*;
use tracing::{debug, info};

use crate::errors::Result;
use crate::model::{CollisionTable, FillSummary};
use crate::policy::{CleaningConfig, FillValue};

fn fill_literal(fill: &FillValue) -> Expr {
    match fill {
        FillValue::Int(value) => lit(*value),
        FillValue::Float(value) => lit(*value),
        FillValue::Text(value) => lit(value.clone()),
    }
}

/// Replace nulls in every column that carries a fill value. Other columns are untouched.
#[tracing::instrument(level = "info", skip_all)]
pub fn apply_defaults(table: &mut CollisionTable, config: &CleaningConfig) -> Result<FillSummary> {
    info!("Filling missing values");

    let fills: Vec<(&str, &FillValue)> = config.fill_values().collect();
    let mut before = Vec::with_capacity(fills.len());
    for (name, _) in &fills {
        before.push(table.null_count(name)?);
    }

    let exprs: Vec<Expr> = fills
        .iter()
        .map(|(name, fill)| col(*name).fill_null(fill_literal(fill)).alias(*name))
        .collect();
    table.df = table.df.clone().lazy().with_columns(exprs).collect()?;

    let mut summary = FillSummary::default();
    for ((name, _), missing_before) in fills.iter().zip(before) {
        let remaining = table.null_count(name)?;
        let filled = missing_before.saturating_sub(remaining);
        debug!(column = %name, filled, "filled column");
        info!("\t{name}");
        summary.filled.push((name.to_string(), filled));
    }

    info!(cells = summary.total(), "missing values filled");
    Ok(summary)
}
