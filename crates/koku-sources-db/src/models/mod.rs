//! Database models.

pub mod source;

pub use source::{SourceRecord, SourceType};
