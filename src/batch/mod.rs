//! Batch module
//!
//! Scheduled housekeeping jobs.

mod processor;

pub use processor::{delay_until_aligned, BatchConfig, BatchProcessor, JobKind, JobRunRecord};
