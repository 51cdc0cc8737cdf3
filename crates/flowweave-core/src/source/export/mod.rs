//! Capture field-export source implementation.
//!
//! This module provides a `RecordSource` backed by the comma-separated
//! field export of a capture tool. It handles file I/O and row-level
//! normalization, emitting packet records for the analysis pipeline.

pub mod error;
pub mod layout;
pub mod parser;
pub mod reader;

pub use parser::ExportFileSource;
