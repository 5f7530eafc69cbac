//! Schema reconciliation and load engine
//!
//! Pure steps (column resolution, row normalization, statement synthesis)
//! feed the orchestrator, which is the only part that touches the database.

pub mod loader;
pub mod normalize;
pub mod orchestrator;
pub mod resolver;
pub mod statement;

pub use loader::Loader;
pub use normalize::normalize;
pub use orchestrator::{LoadOptions, LoadReport, LoadState, Orchestrator};
pub use resolver::{ResolvedColumn, quote_identifier, resolve, resolve_columns};
pub use statement::{DateColumnMappings, InsertStatement, ValueSlot, synthesize};
