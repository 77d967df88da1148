pub mod changes;
pub mod config;
pub mod coverage;
mod error;
mod outcome;

pub use changes::ChangeSet;
pub use coverage::{CoverageReportPointer, ProjectCoverageSummary, TargetCoverageReport};
pub use error::*;
pub use outcome::*;
