//! Deterministic, pure logic shared by the installer pipeline.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data and return deterministic outputs suitable for tests.

pub mod backoff;
pub mod catalog;
pub mod events;
pub mod fence;
pub mod programs;
pub mod prompt;
pub mod types;
