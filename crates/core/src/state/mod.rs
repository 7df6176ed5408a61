//! State management for supervised processes.
//!
//! This module provides:
//! - [`StatusRecord`], the synchronized status of one process
//! - [`ProcessTable`] for coordinating multiple processes

pub mod error;
pub mod manager;
pub mod process;

pub use error::{RecordError, RecordResult};
pub use manager::ProcessTable;
pub use process::StatusRecord;
