pub mod event_log;
pub mod export;
pub mod redb_store;
pub mod schema;
pub mod store;

pub use event_log::EventLog;
pub use export::{ExportSummary, dataset_lines, export_dataset};
pub use redb_store::RedbOutcomeStore;
pub use schema::{Feedback, Memory, StoredEvent, ToolStats};
pub use store::{InMemoryOutcomeStore, OutcomeStore, StoreError, StoreResult};
