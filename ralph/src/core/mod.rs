//! Deterministic, pure logic shared by the loop.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! text and return deterministic outputs suitable for tests.

pub mod path;
pub mod protocol;
pub mod transition;
pub mod truncation;
pub mod types;
