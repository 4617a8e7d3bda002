//! The cleaning policy: which columns exist, how each is typed, and what
//! replaces a missing value.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::PolicyError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    Int64,
    Float64,
    /// Free-form text kept verbatim, e.g. the `(lat, lon)` location pair.
    Object,
    /// Text drawn from a finite value set. Categories are whatever the data holds.
    Categorical,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::String => "string",
            ColumnType::Int64 => "int64",
            ColumnType::Float64 => "float64",
            ColumnType::Object => "object",
            ColumnType::Categorical => "categorical",
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(
            self,
            ColumnType::String | ColumnType::Object | ColumnType::Categorical
        )
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value substituted for a missing cell. One variant per storage type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FillValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl FillValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            FillValue::Int(_) => "an integer",
            FillValue::Float(_) => "a float",
            FillValue::Text(_) => "text",
        }
    }

    pub fn fits(&self, kind: ColumnType) -> bool {
        match self {
            FillValue::Int(_) => kind == ColumnType::Int64,
            FillValue::Float(_) => kind == ColumnType::Float64,
            FillValue::Text(_) => kind.is_text(),
        }
    }
}

impl From<&str> for FillValue {
    fn from(value: &str) -> Self {
        FillValue::Text(value.to_string())
    }
}

impl From<f64> for FillValue {
    fn from(value: f64) -> Self {
        FillValue::Float(value)
    }
}

impl From<i64> for FillValue {
    fn from(value: i64) -> Self {
        FillValue::Int(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ColumnType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<FillValue>,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, kind: ColumnType) -> Self {
        Self {
            name: name.into(),
            kind,
            fill: None,
        }
    }

    pub fn with_fill(mut self, fill: impl Into<FillValue>) -> Self {
        self.fill = Some(fill.into());
        self
    }
}

/// The two source columns merged into one timestamp column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateTimeMerge {
    pub date_column: String,
    pub time_column: String,
    pub output_column: String,
    #[serde(default = "default_date_formats")]
    pub date_formats: Vec<String>,
    #[serde(default = "default_time_formats")]
    pub time_formats: Vec<String>,
}

fn default_date_formats() -> Vec<String> {
    ["%m/%d/%Y", "%Y-%m-%d", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_time_formats() -> Vec<String> {
    ["%H:%M", "%H:%M:%S", "%H:%M:%S%.f"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_na_values() -> Vec<String> {
    [
        "", "NA", "N/A", "n/a", "NaN", "nan", "-NaN", "-nan", "NULL", "null", "None", "#N/A",
        "<NA>",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleaningConfig {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub index_column: String,
    #[serde(default = "default_na_values")]
    pub na_values: Vec<String>,
    pub datetime: DateTimeMerge,
    pub columns: Vec<ColumnSpec>,
}

const NYC_STREET_COLUMNS: [&str; 3] = ["ON STREET NAME", "CROSS STREET NAME", "OFF STREET NAME"];

const NYC_CASUALTY_COLUMNS: [&str; 8] = [
    "NUMBER OF PERSONS INJURED",
    "NUMBER OF PERSONS KILLED",
    "NUMBER OF PEDESTRIANS INJURED",
    "NUMBER OF PEDESTRIANS KILLED",
    "NUMBER OF CYCLIST INJURED",
    "NUMBER OF CYCLIST KILLED",
    "NUMBER OF MOTORIST INJURED",
    "NUMBER OF MOTORIST KILLED",
];

impl CleaningConfig {
    /// Policy for the NYC "Motor Vehicle Collisions - Crashes" export.
    pub fn nyc_collisions() -> Self {
        use ColumnType::{Categorical, Float64, Int64, Object};

        let mut columns = vec![
            ColumnSpec::new("CRASH DATE", ColumnType::String),
            ColumnSpec::new("CRASH TIME", ColumnType::String),
            ColumnSpec::new("BOROUGH", ColumnType::String).with_fill("UNKNOWN"),
            ColumnSpec::new("ZIP CODE", ColumnType::String).with_fill("UNKNOWN"),
            ColumnSpec::new("LATITUDE", Float64).with_fill(0.0),
            ColumnSpec::new("LONGITUDE", Float64).with_fill(0.0),
            ColumnSpec::new("LOCATION", Object).with_fill("(0.0, 0.0)"),
        ];
        columns.extend(
            NYC_STREET_COLUMNS
                .iter()
                .map(|name| ColumnSpec::new(*name, ColumnType::String).with_fill("")),
        );
        columns.extend(
            NYC_CASUALTY_COLUMNS
                .iter()
                .map(|name| ColumnSpec::new(*name, Float64).with_fill(0.0)),
        );
        columns.extend((1..=5).map(|n| {
            ColumnSpec::new(
                format!("CONTRIBUTING FACTOR VEHICLE {n}"),
                ColumnType::String,
            )
            .with_fill("")
        }));
        columns.push(ColumnSpec::new("COLLISION_ID", Int64));
        columns.extend((1..=5).map(|n| {
            ColumnSpec::new(format!("VEHICLE TYPE CODE {n}"), Categorical).with_fill("")
        }));

        Self {
            input_path: PathBuf::from("Motor_Vehicle_Collisions_-_Crashes.csv"),
            output_path: PathBuf::from("Motor_Vehicle_Collisions_-_Crashes_Cleaned.csv"),
            index_column: "COLLISION_ID".to_string(),
            na_values: default_na_values(),
            datetime: DateTimeMerge {
                date_column: "CRASH DATE".to_string(),
                time_column: "CRASH TIME".to_string(),
                output_column: "CRASH DATETIME".to_string(),
                date_formats: default_date_formats(),
                time_formats: default_time_formats(),
            },
            columns,
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, PolicyError> {
        let config: CleaningConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| PolicyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String, PolicyError> {
        Ok(toml::to_string(self)?)
    }

    pub fn with_paths(mut self, input: Option<PathBuf>, output: Option<PathBuf>) -> Self {
        if let Some(input) = input {
            self.input_path = input;
        }
        if let Some(output) = output {
            self.output_path = output;
        }
        self
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        let mut seen = HashSet::with_capacity(self.columns.len());
        for spec in &self.columns {
            if !seen.insert(spec.name.as_str()) {
                return Err(PolicyError::DuplicateColumn(spec.name.clone()));
            }
        }

        let index_kind = self
            .kind_of(&self.index_column)
            .ok_or_else(|| PolicyError::UnknownColumn(self.index_column.clone()))?;
        if index_kind != ColumnType::Int64 {
            return Err(PolicyError::IndexColumnType {
                column: self.index_column.clone(),
                found: index_kind,
            });
        }

        let merge = &self.datetime;
        for source in [&merge.date_column, &merge.time_column] {
            match self.kind_of(source) {
                None => return Err(PolicyError::UnknownColumn(source.clone())),
                Some(ColumnType::String) => {}
                Some(other) => {
                    return Err(PolicyError::DateTimeColumn {
                        column: source.clone(),
                        message: format!("must be declared as string, found {other}"),
                    })
                }
            }
            if *source == self.index_column {
                return Err(PolicyError::DateTimeColumn {
                    column: source.clone(),
                    message: "cannot also be the index column".to_string(),
                });
            }
        }
        if merge.date_column == merge.time_column {
            return Err(PolicyError::DateTimeColumn {
                column: merge.date_column.clone(),
                message: "date and time columns must differ".to_string(),
            });
        }
        if self.column(&merge.output_column).is_some() || merge.output_column == self.index_column {
            return Err(PolicyError::DateTimeColumn {
                column: merge.output_column.clone(),
                message: "output column collides with a declared column".to_string(),
            });
        }
        if merge.date_formats.is_empty() {
            return Err(PolicyError::NoFormats("date"));
        }
        if merge.time_formats.is_empty() {
            return Err(PolicyError::NoFormats("time"));
        }

        for spec in &self.columns {
            let Some(fill) = &spec.fill else { continue };
            if self.is_reserved(&spec.name) {
                return Err(PolicyError::FillOnReservedColumn(spec.name.clone()));
            }
            if !fill.fits(spec.kind) {
                return Err(PolicyError::FillTypeMismatch {
                    column: spec.name.clone(),
                    kind: spec.kind,
                    fill: fill.kind_name(),
                });
            }
        }

        Ok(())
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|spec| spec.name == name)
    }

    pub fn kind_of(&self, name: &str) -> Option<ColumnType> {
        self.column(name).map(|spec| spec.kind)
    }

    /// Columns with a fill value, in declaration order.
    pub fn fill_values(&self) -> impl Iterator<Item = (&str, &FillValue)> {
        self.columns
            .iter()
            .filter_map(|spec| spec.fill.as_ref().map(|fill| (spec.name.as_str(), fill)))
    }

    /// Index, date and time columns: consumed by ingestion rather than carried through.
    pub fn is_reserved(&self, name: &str) -> bool {
        name == self.index_column
            || name == self.datetime.date_column
            || name == self.datetime.time_column
    }

    /// Exact token match. Whitespace-only cells are values.
    pub fn is_missing(&self, raw: &str) -> bool {
        self.na_values.iter().any(|token| token == raw)
    }
}
