use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use polars::prelude::*;
use tempfile::tempdir;

use crate::errors::{CleanError, Step};
use crate::fill::apply_defaults;
use crate::ingest::parse_collisions;
use crate::persist::TIMESTAMP_FORMAT;
use crate::policy::CleaningConfig;
use crate::run;

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/data")
        .join(name)
}

fn fixture(name: &str) -> String {
    let full_path = fixture_path(name);
    fs::read_to_string(&full_path)
        .unwrap_or_else(|err| panic!("failed to read fixture {}: {}", full_path.display(), err))
}

fn config_for(input: &Path, output: &Path) -> CleaningConfig {
    CleaningConfig::nyc_collisions()
        .with_paths(Some(input.to_path_buf()), Some(output.to_path_buf()))
}

fn parse_str(content: &str) -> std::result::Result<crate::CollisionTable, CleanError> {
    parse_collisions(
        content.as_bytes(),
        "inline.csv",
        &CleaningConfig::nyc_collisions(),
    )
}

struct CsvOutput {
    headers: Vec<String>,
    rows: Vec<HashMap<String, String>>,
}

fn read_output(path: &Path) -> CsvOutput {
    let mut reader = csv::Reader::from_path(path).expect("open output");
    let headers: Vec<String> = reader
        .headers()
        .expect("output header")
        .iter()
        .map(|h| h.to_string())
        .collect();
    let rows = reader
        .records()
        .map(|record| {
            let record = record.expect("output record");
            headers
                .iter()
                .cloned()
                .zip(record.iter().map(|v| v.to_string()))
                .collect()
        })
        .collect();
    CsvOutput { headers, rows }
}

#[test]
fn cleans_sample_file_end_to_end() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("cleaned.csv");
    let config = config_for(&fixture_path("collisions_sample.csv"), &output);

    let report = run(&config).expect("pipeline should succeed");
    assert_eq!(report.rows, 4);
    assert_eq!(report.output_path, output);

    let cleaned = read_output(&output);
    assert_eq!(cleaned.rows.len(), 4);
    assert_eq!(cleaned.headers.len(), 28);
    assert_eq!(cleaned.headers[0], "COLLISION_ID");
    assert_eq!(cleaned.headers[1], "CRASH DATETIME");
    assert_eq!(cleaned.headers[2], "BOROUGH");
    assert_eq!(cleaned.headers[27], "VEHICLE TYPE CODE 5");
    assert!(!cleaned.headers.iter().any(|h| h == "CRASH DATE"));
    assert!(!cleaned.headers.iter().any(|h| h == "CRASH TIME"));

    let ids: Vec<&str> = cleaned
        .rows
        .iter()
        .map(|row| row["COLLISION_ID"].as_str())
        .collect();
    assert_eq!(ids, vec!["4296113", "4455765", "4486609", "4407458"]);
}

#[test]
fn merges_crash_date_and_time() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("cleaned.csv");
    run(&config_for(&fixture_path("collisions_sample.csv"), &output)).unwrap();

    let cleaned = read_output(&output);
    assert_eq!(cleaned.rows[0]["CRASH DATETIME"], "2020-03-04 14:05:00");
    assert_eq!(cleaned.rows[1]["CRASH DATETIME"], "2021-09-11 02:39:00");
    assert_eq!(cleaned.rows[3]["CRASH DATETIME"], "2021-04-14 12:47:00");
}

#[test]
fn missing_values_take_policy_defaults() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("cleaned.csv");
    run(&config_for(&fixture_path("collisions_sample.csv"), &output)).unwrap();

    let cleaned = read_output(&output);
    let second = &cleaned.rows[1];
    assert_eq!(second["ZIP CODE"], "UNKNOWN");
    assert_eq!(second["BOROUGH"], "UNKNOWN");
    assert_eq!(second["LATITUDE"], "0.0");
    assert_eq!(second["LONGITUDE"], "0.0");
    assert_eq!(second["LOCATION"], "(0.0, 0.0)");
    assert_eq!(second["OFF STREET NAME"], "");

    let fourth = &cleaned.rows[3];
    assert_eq!(fourth["NUMBER OF PERSONS INJURED"], "0.0");
    assert_eq!(fourth["NUMBER OF PERSONS KILLED"], "0.0");

    let first = &cleaned.rows[0];
    assert_eq!(first["ZIP CODE"], "11201");
    assert_eq!(first["LATITUDE"], "40.6943");
    assert_eq!(first["NUMBER OF PERSONS INJURED"], "1.0");
    assert_eq!(
        cleaned.rows[2]["OFF STREET NAME"],
        "344       BAYCHESTER AVENUE"
    );
}

#[test]
fn ingest_types_each_column() {
    let table = parse_str(&fixture("collisions_sample.csv")).expect("ingest");

    assert_eq!(table.height(), 4);
    assert_eq!(table.df.width(), 28);
    assert_eq!(
        table.df.column("COLLISION_ID").unwrap().dtype(),
        &DataType::Int64
    );
    assert_eq!(
        table.df.column("CRASH DATETIME").unwrap().dtype(),
        &DataType::Datetime(TimeUnit::Microseconds, None)
    );
    assert_eq!(
        table.df.column("LATITUDE").unwrap().dtype(),
        &DataType::Float64
    );
    assert_eq!(
        table.df.column("VEHICLE TYPE CODE 1").unwrap().dtype(),
        &DataType::String
    );

    assert_eq!(table.null_count("ZIP CODE").unwrap(), 2);
    assert_eq!(table.null_count("LATITUDE").unwrap(), 2);
    assert_eq!(table.null_count("VEHICLE TYPE CODE 1").unwrap(), 1);
}

#[test]
fn fill_leaves_no_missing_values_in_policy_columns() {
    let config = CleaningConfig::nyc_collisions();
    let mut table = parse_str(&fixture("collisions_sample.csv")).unwrap();
    let height = table.height();

    let summary = apply_defaults(&mut table, &config).expect("fill");

    assert_eq!(table.height(), height);
    for (column, _) in config.fill_values() {
        assert_eq!(
            table.null_count(column).unwrap(),
            0,
            "column {column} still has missing values"
        );
    }
    assert_eq!(summary.for_column("ZIP CODE"), Some(2));
    assert_eq!(summary.for_column("VEHICLE TYPE CODE 5"), Some(4));
}

#[test]
fn undeclared_columns_keep_missing_values() {
    let content = fixture("collisions_sample.csv");
    let mut lines = content.lines();
    let header = lines.next().unwrap();
    let mut mutated = format!("{header},NOTES\n");
    for (idx, line) in lines.enumerate() {
        let note = if idx == 0 { "checked" } else { "" };
        mutated.push_str(&format!("{line},{note}\n"));
    }

    let config = CleaningConfig::nyc_collisions();
    let mut table = parse_str(&mutated).expect("ingest with extra column");
    apply_defaults(&mut table, &config).unwrap();

    let notes = table.df.column("NOTES").unwrap().str().unwrap();
    let notes: Vec<Option<&str>> = notes.into_iter().collect();
    assert_eq!(notes, vec![Some("checked"), None, None, None]);
}

#[test]
fn missing_declared_column_is_a_schema_mismatch() {
    let content = fixture("collisions_sample.csv").replacen("BOROUGH,", "BOROUGH_NAME,", 1);

    match parse_str(&content) {
        Err(CleanError::SchemaMismatch { missing, .. }) => {
            assert_eq!(missing, vec!["BOROUGH".to_string()]);
        }
        other => panic!("expected SchemaMismatch, got {other:?}"),
    }
}

#[test]
fn duplicate_identifier_is_rejected() {
    let content = fixture("collisions_sample.csv").replacen(",4455765,", ",4296113,", 1);

    match parse_str(&content) {
        Err(CleanError::DuplicateIdentifier {
            value,
            first_line,
            line,
            ..
        }) => {
            assert_eq!(value, 4296113);
            assert_eq!(first_line, 2);
            assert_eq!(line, 3);
        }
        other => panic!("expected DuplicateIdentifier, got {other:?}"),
    }
}

#[test]
fn uncoercible_float_names_line_and_column() {
    let content = fixture("collisions_sample.csv").replacen("40.86816", "north", 1);

    match parse_str(&content) {
        Err(CleanError::Coercion {
            line,
            column,
            value,
            expected,
            ..
        }) => {
            assert_eq!(line, 4);
            assert_eq!(column, "LATITUDE");
            assert_eq!(value, "north");
            assert_eq!(expected, "float64");
        }
        other => panic!("expected Coercion error, got {other:?}"),
    }
}

#[test]
fn unparsable_crash_date_is_rejected() {
    let content = fixture("collisions_sample.csv").replacen("03/04/2020", "2020.03.04", 1);

    match parse_str(&content) {
        Err(CleanError::Coercion { column, .. }) => assert_eq!(column, "CRASH DATE"),
        other => panic!("expected Coercion error, got {other:?}"),
    }
}

#[test]
fn short_record_is_a_csv_error() {
    let content = fixture("collisions_sample.csv").replacen(",4486609,,,,,", ",4486609,,,,", 1);

    assert!(matches!(parse_str(&content), Err(CleanError::Csv { .. })));
}

#[test]
fn missing_input_reports_the_path() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("does-not-exist.csv");
    let output = dir.path().join("cleaned.csv");

    match run(&config_for(&input, &output)) {
        Err(CleanError::Io { step, path, .. }) => {
            assert_eq!(step, Step::Ingest);
            assert!(path.ends_with("does-not-exist.csv"));
        }
        other => panic!("expected Io error, got {other:?}"),
    }
    assert!(!output.exists());
}

#[test]
fn failed_run_leaves_no_output() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("bad.csv");
    let output = dir.path().join("cleaned.csv");
    fs::write(
        &input,
        fixture("collisions_sample.csv").replacen("40.86816", "north", 1),
    )
    .unwrap();

    assert!(run(&config_for(&input, &output)).is_err());
    assert!(!output.exists());
    let leftovers = fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(leftovers, 1, "only the input file should remain");
}

#[test]
fn rerun_on_own_output_changes_nothing() {
    let dir = tempdir().unwrap();
    let first = dir.path().join("first.csv");
    run(&config_for(&fixture_path("collisions_sample.csv"), &first)).unwrap();

    // split CRASH DATETIME back into CRASH DATE / CRASH TIME
    let cleaned = read_output(&first);
    let rest: Vec<&String> = cleaned
        .headers
        .iter()
        .filter(|h| h.as_str() != "CRASH DATETIME")
        .collect();
    let rederived = dir.path().join("rederived.csv");
    {
        let mut writer = csv::Writer::from_path(&rederived).unwrap();
        let mut header = vec!["CRASH DATE".to_string(), "CRASH TIME".to_string()];
        header.extend(rest.iter().map(|h| h.to_string()));
        writer.write_record(&header).unwrap();
        for row in &cleaned.rows {
            let stamp =
                NaiveDateTime::parse_from_str(&row["CRASH DATETIME"], TIMESTAMP_FORMAT).unwrap();
            let mut record = vec![
                stamp.format("%m/%d/%Y").to_string(),
                stamp.format("%H:%M:%S").to_string(),
            ];
            record.extend(rest.iter().map(|h| row[h.as_str()].clone()));
            writer.write_record(&record).unwrap();
        }
        writer.flush().unwrap();
    }

    let second = dir.path().join("second.csv");
    let report = run(&config_for(&rederived, &second)).unwrap();

    assert_eq!(report.rows, 4);
    assert_eq!(
        fs::read_to_string(&first).unwrap(),
        fs::read_to_string(&second).unwrap()
    );
    assert_eq!(report.fill.for_column("ZIP CODE"), Some(0));
    assert_eq!(report.fill.for_column("LATITUDE"), Some(0));
}

#[test]
fn output_identifiers_are_unique() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("cleaned.csv");
    run(&config_for(&fixture_path("collisions_sample.csv"), &output)).unwrap();

    let cleaned = read_output(&output);
    let mut ids: Vec<&str> = cleaned
        .rows
        .iter()
        .map(|row| row["COLLISION_ID"].as_str())
        .collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), cleaned.rows.len());
}

#[test]
fn header_already_holding_merged_column_is_rejected() {
    let content = fixture("collisions_sample.csv");
    let mut lines = content.lines();
    let header = lines.next().unwrap();
    let mut mutated = format!("{header},CRASH DATETIME\n");
    for line in lines {
        mutated.push_str(&format!("{line},\n"));
    }

    match parse_str(&mutated) {
        Err(CleanError::DuplicateHeader { column, .. }) => assert_eq!(column, "CRASH DATETIME"),
        other => panic!("expected DuplicateHeader, got {other:?}"),
    }
}

#[test]
fn fractional_crash_time_is_kept() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("fractional.csv");
    let output = dir.path().join("cleaned.csv");
    fs::write(
        &input,
        fixture("collisions_sample.csv").replacen(
            "03/04/2020,14:05,",
            "03/04/2020,14:05:30.500,",
            1,
        ),
    )
    .unwrap();

    run(&config_for(&input, &output)).unwrap();

    let cleaned = read_output(&output);
    assert_eq!(cleaned.rows[0]["CRASH DATETIME"], "2020-03-04 14:05:30.500");
    assert_eq!(cleaned.rows[1]["CRASH DATETIME"], "2021-09-11 02:39:00");
}

#[test]
fn whitespace_only_cells_are_values_not_missing() {
    let content = fixture("collisions_sample.csv").replacen("14:05,BROOKLYN,", "14:05,  ,", 1);
    let mut lines = content.lines();
    let header = lines.next().unwrap();
    let mut mutated = format!("{header},NOTES\n");
    for line in lines {
        mutated.push_str(&format!("{line},   \n"));
    }

    let dir = tempdir().unwrap();
    let input = dir.path().join("spaces.csv");
    let output = dir.path().join("cleaned.csv");
    fs::write(&input, mutated).unwrap();

    let report = run(&config_for(&input, &output)).unwrap();

    let cleaned = read_output(&output);
    assert_eq!(cleaned.rows[0]["BOROUGH"], "  ");
    assert_eq!(cleaned.rows[1]["BOROUGH"], "UNKNOWN");
    for row in &cleaned.rows {
        assert_eq!(row["NOTES"], "   ");
    }
    assert_eq!(report.fill.for_column("BOROUGH"), Some(2));
}

#[test]
fn missing_identifier_is_a_coercion_error() {
    let content = fixture("collisions_sample.csv").replacen(",4296113,", ",,", 1);

    match parse_str(&content) {
        Err(CleanError::Coercion {
            line,
            column,
            expected,
            ..
        }) => {
            assert_eq!(line, 2);
            assert_eq!(column, "COLLISION_ID");
            assert_eq!(expected, "integer identifier");
        }
        other => panic!("expected Coercion error, got {other:?}"),
    }
}

#[test]
fn non_integer_identifier_is_a_coercion_error() {
    let content = fixture("collisions_sample.csv").replacen(",4486609,", ",44866.09,", 1);

    match parse_str(&content) {
        Err(CleanError::Coercion {
            line,
            column,
            value,
            expected,
            ..
        }) => {
            assert_eq!(line, 4);
            assert_eq!(column, "COLLISION_ID");
            assert_eq!(value, "44866.09");
            assert_eq!(expected, "int64");
        }
        other => panic!("expected Coercion error, got {other:?}"),
    }
}

#[test]
fn row_without_date_or_time_gets_an_empty_timestamp() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("undated.csv");
    let output = dir.path().join("cleaned.csv");
    fs::write(
        &input,
        fixture("collisions_sample.csv").replacen("\n09/11/2021,2:39,", "\n,,", 1),
    )
    .unwrap();

    let report = run(&config_for(&input, &output)).unwrap();
    assert_eq!(report.rows, 4);

    let cleaned = read_output(&output);
    assert_eq!(cleaned.rows[1]["COLLISION_ID"], "4455765");
    assert_eq!(cleaned.rows[1]["CRASH DATETIME"], "");
    assert_eq!(cleaned.rows[0]["CRASH DATETIME"], "2020-03-04 14:05:00");
}

#[test]
fn unwritable_destination_is_an_io_error() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("no-such-dir").join("cleaned.csv");

    let err = run(&config_for(&fixture_path("collisions_sample.csv"), &output)).unwrap_err();
    assert!(err.to_string().starts_with("persist of "), "{err}");
    match err {
        CleanError::Io { step, path, .. } => {
            assert_eq!(step, Step::Persist);
            assert!(path.ends_with("cleaned.csv"));
        }
        other => panic!("expected Io error, got {other:?}"),
    }
    assert!(!output.exists());
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}
