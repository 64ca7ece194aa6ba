pub mod catalog;
pub mod engine;
pub mod pattern;
pub mod record;

pub use catalog::{Profile, RuleSet};
pub use engine::Engine;
pub use record::{ExtractedRecord, RecordBatch};
