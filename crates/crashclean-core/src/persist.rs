use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use polars::prelude::*;
use tempfile::NamedTempFile;
use tracing::info;

use crate::errors::{CleanError, Result, Step};
use crate::model::CollisionTable;

/// Sub-second digits appear only when the value has a fraction.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Write the table as CSV. The destination only appears once every row is on disk.
#[tracing::instrument(
    level = "info",
    skip(table),
    fields(path = %path.display(), rows = table.height())
)]
pub fn write_collisions(table: &CollisionTable, path: &Path) -> Result<()> {
    let label = path.display().to_string();
    info!("Saving cleaned file to {label}");

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::Builder::new()
        .prefix(".crashclean-")
        .suffix(".partial")
        .tempfile_in(dir)
        .map_err(|err| CleanError::io(Step::Persist, label.as_str(), err))?;

    write_csv(table, tmp.as_file_mut(), &label)?;
    finish(tmp, path, &label)?;

    info!("Cleaning complete");
    Ok(())
}

fn finish(tmp: NamedTempFile, path: &Path, label: &str) -> Result<()> {
    tmp.as_file()
        .sync_all()
        .map_err(|err| CleanError::io(Step::Persist, label, err))?;
    tmp.persist(path)
        .map_err(|err| CleanError::io(Step::Persist, label, err.error))?;
    Ok(())
}

/// Serialize the table to any writer: header row, then one record per row.
pub fn write_csv<W: Write>(table: &CollisionTable, out: W, label: &str) -> Result<()> {
    let names = table.column_names();
    let rendered = table
        .df
        .get_columns()
        .iter()
        .map(render_column)
        .collect::<Result<Vec<Vec<String>>>>()?;

    let mut writer = csv::Writer::from_writer(out);
    writer
        .write_record(&names)
        .map_err(|err| CleanError::csv(Step::Persist, label, err))?;
    for row in 0..table.height() {
        writer
            .write_record(rendered.iter().map(|column| column[row].as_str()))
            .map_err(|err| CleanError::csv(Step::Persist, label, err))?;
    }
    writer.flush().map_err(|err| CleanError::io(Step::Persist, label, err))?;
    Ok(())
}

fn render_column(column: &Column) -> Result<Vec<String>> {
    let series = column.as_materialized_series();
    let cells: Vec<String> = match series.dtype() {
        DataType::Int64 => series
            .i64()?
            .into_iter()
            .map(|value| value.map(|v| v.to_string()).unwrap_or_default())
            .collect(),
        DataType::Float64 => series
            .f64()?
            .into_iter()
            .map(|value| value.map(format_float).unwrap_or_default())
            .collect(),
        DataType::String => series
            .str()?
            .into_iter()
            .map(|value| value.unwrap_or_default().to_string())
            .collect(),
        DataType::Datetime(unit, _) => {
            let unit = *unit;
            let raw = series.cast(&DataType::Int64)?;
            raw.i64()?
                .into_iter()
                .map(|value| {
                    value
                        .and_then(|v| to_datetime(v, unit))
                        .map(|dt| dt.format(TIMESTAMP_FORMAT).to_string())
                        .unwrap_or_default()
                })
                .collect()
        }
        _ => {
            let text = series.cast(&DataType::String)?;
            text.str()?
                .into_iter()
                .map(|value| value.unwrap_or_default().to_string())
                .collect()
        }
    };
    Ok(cells)
}

fn to_datetime(value: i64, unit: TimeUnit) -> Option<DateTime<Utc>> {
    match unit {
        TimeUnit::Nanoseconds => Some(DateTime::from_timestamp_nanos(value)),
        TimeUnit::Microseconds => DateTime::from_timestamp_micros(value),
        TimeUnit::Milliseconds => DateTime::from_timestamp_millis(value),
    }
}

/// Floats always keep a decimal point so `0` reads back as numeric `0.0`.
fn format_float(value: f64) -> String {
    format!("{value:?}")
}
