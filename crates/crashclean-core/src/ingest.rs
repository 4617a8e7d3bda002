//! Typed CSV ingestion: header check, per-cell coercion, date/time merge.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, Read};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use polars::prelude::*;
use tracing::{debug, info, warn};

use crate::errors::{CleanError, Result, Step};
use crate::model::CollisionTable;
use crate::policy::{CleaningConfig, ColumnType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnRole {
    Index,
    Date,
    Time,
    Value(ColumnType),
    /// Present in the file but not in the policy; carried as text.
    Undeclared,
}

enum ColumnBuffer {
    Text(Vec<Option<String>>),
    Int(Vec<Option<i64>>),
    Float(Vec<Option<f64>>),
}

impl ColumnBuffer {
    fn for_kind(kind: ColumnType) -> Self {
        match kind {
            ColumnType::Int64 => ColumnBuffer::Int(Vec::new()),
            ColumnType::Float64 => ColumnBuffer::Float(Vec::new()),
            ColumnType::String | ColumnType::Object | ColumnType::Categorical => {
                ColumnBuffer::Text(Vec::new())
            }
        }
    }

    fn into_column(self, name: &str) -> Column {
        match self {
            ColumnBuffer::Text(values) => {
                let utf8: Vec<Option<&str>> = values.iter().map(|v| v.as_deref()).collect();
                Series::new(name.into(), utf8).into()
            }
            ColumnBuffer::Int(values) => Series::new(name.into(), values).into(),
            ColumnBuffer::Float(values) => Series::new(name.into(), values).into(),
        }
    }
}

/// Per-row coercion context, so every error names the file, line and column.
struct Cell<'a> {
    source: &'a str,
    line: usize,
    column: &'a str,
    value: &'a str,
}

impl Cell<'_> {
    fn coercion(&self, expected: &'static str) -> CleanError {
        CleanError::Coercion {
            path: self.source.to_string(),
            line: self.line,
            column: self.column.to_string(),
            value: self.value.to_string(),
            expected,
        }
    }
}

/// Read the configured input file into a typed table.
#[tracing::instrument(level = "info", skip(config), fields(path = %config.input_path.display()))]
pub fn read_collisions(config: &CleaningConfig) -> Result<CollisionTable> {
    let label = config.input_path.display().to_string();
    info!("Reading CSV file {label}");
    let file = File::open(&config.input_path)
        .map_err(|err| CleanError::io(Step::Ingest, label.as_str(), err))?;
    parse_collisions(BufReader::new(file), &label, config)
}

/// Parse CSV from any reader. `source` names the input in error messages.
pub fn parse_collisions<R: Read>(
    reader: R,
    source: &str,
    config: &CleaningConfig,
) -> Result<CollisionTable> {
    config.validate()?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(reader);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|err| CleanError::csv(Step::Ingest, source, err))?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let roles = classify_headers(&headers, source, config)?;

    let mut buffers: Vec<Option<ColumnBuffer>> = roles
        .iter()
        .map(|role| match role {
            ColumnRole::Value(kind) => Some(ColumnBuffer::for_kind(*kind)),
            ColumnRole::Undeclared => Some(ColumnBuffer::Text(Vec::new())),
            _ => None,
        })
        .collect();
    let mut ids: Vec<i64> = Vec::new();
    let mut timestamps: Vec<Option<i64>> = Vec::new();
    let mut first_seen: HashMap<i64, usize> = HashMap::new();

    let date_idx = position_of(&roles, ColumnRole::Date);
    let time_idx = position_of(&roles, ColumnRole::Time);

    for (row_idx, record) in reader.records().enumerate() {
        let record = record.map_err(|err| CleanError::csv(Step::Ingest, source, err))?;
        let line = record
            .position()
            .map(|pos| pos.line() as usize)
            .unwrap_or(row_idx + 2);

        for (idx, role) in roles.iter().enumerate() {
            let cell = Cell {
                source,
                line,
                column: &headers[idx],
                value: record.get(idx).unwrap_or(""),
            };
            match role {
                ColumnRole::Index => {
                    let id = parse_required_i64(&cell, config)?;
                    if let Some(first_line) = first_seen.insert(id, line) {
                        return Err(CleanError::DuplicateIdentifier {
                            path: source.to_string(),
                            column: config.index_column.clone(),
                            value: id,
                            first_line,
                            line,
                        });
                    }
                    ids.push(id);
                }
                ColumnRole::Date | ColumnRole::Time => {}
                ColumnRole::Value(_) | ColumnRole::Undeclared => {
                    match buffers[idx].as_mut() {
                        Some(ColumnBuffer::Text(values)) => {
                            values.push(parse_optional_text(&cell, config))
                        }
                        Some(ColumnBuffer::Int(values)) => {
                            values.push(parse_optional_i64(&cell, config)?)
                        }
                        Some(ColumnBuffer::Float(values)) => {
                            values.push(parse_optional_f64(&cell, config)?)
                        }
                        None => {}
                    }
                }
            }
        }

        let date = Cell {
            source,
            line,
            column: &headers[date_idx],
            value: record.get(date_idx).unwrap_or(""),
        };
        let time = Cell {
            source,
            line,
            column: &headers[time_idx],
            value: record.get(time_idx).unwrap_or(""),
        };
        timestamps.push(merge_date_time(&date, &time, config)?);
    }

    debug!(rows = ids.len(), columns = headers.len(), "parsed records");

    let mut columns: Vec<Column> = Vec::with_capacity(headers.len());
    columns.push(Series::new(config.index_column.as_str().into(), ids).into());
    let ts_series = Series::new(config.datetime.output_column.as_str().into(), timestamps)
        .cast(&DataType::Datetime(TimeUnit::Microseconds, None))?;
    columns.push(ts_series.into());
    for (idx, buffer) in buffers.into_iter().enumerate() {
        if let Some(buffer) = buffer {
            columns.push(buffer.into_column(&headers[idx]));
        }
    }

    let df = DataFrame::new(columns)?;
    info!(rows = df.height(), "ingested {source}");

    Ok(CollisionTable {
        df,
        index_column: config.index_column.clone(),
        timestamp_column: config.datetime.output_column.clone(),
    })
}

fn classify_headers(
    headers: &[String],
    source: &str,
    config: &CleaningConfig,
) -> Result<Vec<ColumnRole>> {
    let mut seen = HashSet::with_capacity(headers.len());
    for header in headers {
        // the merged timestamp column is created here, so the file cannot already carry it
        if !seen.insert(header.as_str()) || *header == config.datetime.output_column {
            return Err(CleanError::DuplicateHeader {
                path: source.to_string(),
                column: header.clone(),
            });
        }
    }

    let missing: Vec<String> = config
        .columns
        .iter()
        .filter(|spec| !seen.contains(spec.name.as_str()))
        .map(|spec| spec.name.clone())
        .collect();
    if !missing.is_empty() {
        return Err(CleanError::SchemaMismatch {
            path: source.to_string(),
            missing,
        });
    }

    Ok(headers
        .iter()
        .map(|header| {
            if *header == config.index_column {
                ColumnRole::Index
            } else if *header == config.datetime.date_column {
                ColumnRole::Date
            } else if *header == config.datetime.time_column {
                ColumnRole::Time
            } else if let Some(kind) = config.kind_of(header) {
                ColumnRole::Value(kind)
            } else {
                warn!(column = %header, "column not in policy table; carrying it as text");
                ColumnRole::Undeclared
            }
        })
        .collect())
}

fn position_of(roles: &[ColumnRole], wanted: ColumnRole) -> usize {
    // classify_headers guarantees every reserved role is present exactly once
    roles.iter().position(|role| *role == wanted).unwrap_or(0)
}

fn parse_required_i64(cell: &Cell<'_>, config: &CleaningConfig) -> Result<i64> {
    parse_optional_i64(cell, config)?.ok_or_else(|| cell.coercion("integer identifier"))
}

fn parse_optional_i64(cell: &Cell<'_>, config: &CleaningConfig) -> Result<Option<i64>> {
    if config.is_missing(cell.value) {
        return Ok(None);
    }
    cell.value
        .trim()
        .parse::<i64>()
        .map(Some)
        .map_err(|_| cell.coercion("int64"))
}

fn parse_optional_f64(cell: &Cell<'_>, config: &CleaningConfig) -> Result<Option<f64>> {
    if config.is_missing(cell.value) {
        return Ok(None);
    }
    cell.value
        .trim()
        .parse::<f64>()
        .map(Some)
        .map_err(|_| cell.coercion("float64"))
}

fn parse_optional_text(cell: &Cell<'_>, config: &CleaningConfig) -> Option<String> {
    if config.is_missing(cell.value) {
        None
    } else {
        Some(cell.value.to_string())
    }
}

/// Combine a date cell and a time cell into naive-local microseconds.
fn merge_date_time(
    date: &Cell<'_>,
    time: &Cell<'_>,
    config: &CleaningConfig,
) -> Result<Option<i64>> {
    match (config.is_missing(date.value), config.is_missing(time.value)) {
        (true, true) => return Ok(None),
        (true, false) => return Err(date.coercion("date")),
        (false, true) => return Err(time.coercion("time")),
        (false, false) => {}
    }

    let merge = &config.datetime;
    let parsed_date = parse_date(date.value.trim(), &merge.date_formats)
        .ok_or_else(|| date.coercion("date"))?;
    let parsed_time = parse_time(time.value.trim(), &merge.time_formats)
        .ok_or_else(|| time.coercion("time"))?;

    let combined = NaiveDateTime::new(parsed_date, parsed_time);
    Ok(Some(combined.and_utc().timestamp_micros()))
}

pub(crate) fn parse_date(value: &str, formats: &[String]) -> Option<NaiveDate> {
    formats
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
}

pub(crate) fn parse_time(value: &str, formats: &[String]) -> Option<NaiveTime> {
    formats
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(value, fmt).ok())
}
