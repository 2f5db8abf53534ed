//! Data models for ndm-coordinator

pub mod batch;
pub mod catalog_item;
pub mod migration_record;

pub use batch::{
    ActiveBatch, BatchOutcome, BatchStatus, ItemFailure, LastError, ProgressSnapshot,
    SelectionRequest,
};
pub use catalog_item::{CatalogFilter, CatalogItem, EpisodeSelector, Manager, MediaType};
pub use migration_record::{MigrationRecord, MigrationState};
