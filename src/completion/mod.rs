//! Completion primitives
//!
//! Provides [`CompletionCell`], the one-shot outcome holder handed back by
//! asynchronous dispatch operations.

mod cell;

pub use cell::CompletionCell;
