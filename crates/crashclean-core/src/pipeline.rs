use tracing::info;

use crate::errors::Result;
use crate::fill::apply_defaults;
use crate::ingest::read_collisions;
use crate::model::CleanReport;
use crate::persist::write_collisions;
use crate::policy::CleaningConfig;

/// Ingest, fill and persist in one pass. Any failure aborts before the output
/// path is written.
#[tracing::instrument(level = "info", skip_all)]
pub fn run(config: &CleaningConfig) -> Result<CleanReport> {
    config.validate()?;

    let mut table = read_collisions(config)?;
    let fill = apply_defaults(&mut table, config)?;
    write_collisions(&table, &config.output_path)?;

    info!(
        rows = table.height(),
        filled = fill.total(),
        output = %config.output_path.display(),
        "pipeline finished"
    );

    Ok(CleanReport {
        input_path: config.input_path.clone(),
        output_path: config.output_path.clone(),
        rows: table.height(),
        fill,
    })
}
