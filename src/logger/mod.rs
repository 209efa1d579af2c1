//! Dual-write activity logging: human-readable stderr lines plus an
//! append-only JSONL file with graceful degradation.

pub mod dual;
pub mod jsonl;

pub use dual::{ActivityEvent, ActivityLog, Level};
