pub mod errors;
pub mod fill;
pub mod ingest;
pub mod model;
pub mod persist;
pub mod pipeline;
pub mod policy;

pub use errors::{CleanError, PolicyError, Step};
pub use model::{CleanReport, CollisionTable, FillSummary};
pub use pipeline::run;
pub use policy::{CleaningConfig, ColumnSpec, ColumnType, DateTimeMerge, FillValue};

#[cfg(test)]
mod tests;
