use std::fmt;
use std::path::PathBuf;

use polars::prelude::PolarsError;
use thiserror::Error;

use crate::policy::ColumnType;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("column '{0}' is declared more than once")]
    DuplicateColumn(String),

    #[error("column '{0}' is not declared in the policy table")]
    UnknownColumn(String),

    #[error("index column '{column}' must be declared as int64, found {found}")]
    IndexColumnType { column: String, found: ColumnType },

    #[error("date/time column '{column}' invalid: {message}")]
    DateTimeColumn { column: String, message: String },

    #[error("column '{0}' is merged or used as index and cannot carry a fill value")]
    FillOnReservedColumn(String),

    #[error("fill value for column '{column}' is {fill}, but the column is declared as {kind}")]
    FillTypeMismatch {
        column: String,
        kind: ColumnType,
        fill: &'static str,
    },

    #[error("no {0} formats configured")]
    NoFormats(&'static str),

    #[error("policy file {path} could not be read: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("policy TOML invalid: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("policy could not be rendered as TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Pipeline stage that touched the file when an I/O or CSV error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Ingest,
    Persist,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Ingest => f.write_str("ingest"),
            Step::Persist => f.write_str("persist"),
        }
    }
}

#[derive(Debug, Error)]
pub enum CleanError {
    #[error("ingest of {path} failed: schema mismatch, missing columns {missing:?}")]
    SchemaMismatch { path: String, missing: Vec<String> },

    #[error("ingest of {path} failed: header names column '{column}' more than once")]
    DuplicateHeader { path: String, column: String },

    #[error("ingest of {path} failed: line {line} column '{column}' value '{value}' is not a valid {expected}")]
    Coercion {
        path: String,
        line: usize,
        column: String,
        value: String,
        expected: &'static str,
    },

    #[error("ingest of {path} failed: {column} {value} on line {line} duplicates line {first_line}")]
    DuplicateIdentifier {
        path: String,
        column: String,
        value: i64,
        first_line: usize,
        line: usize,
    },

    #[error("{step} of {path} failed: I/O error: {source}")]
    Io {
        step: Step,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{step} of {path} failed: CSV error: {source}")]
    Csv {
        step: Step,
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("Polars operation failed: {0}")]
    Polars(#[from] PolarsError),

    #[error("invalid cleaning policy: {0}")]
    Policy(#[from] PolicyError),
}

impl CleanError {
    pub(crate) fn io(step: Step, path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            step,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn csv(step: Step, path: impl Into<String>, source: csv::Error) -> Self {
        Self::Csv {
            step,
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, CleanError>;
