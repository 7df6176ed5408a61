//! # paws-core
//!
//! Process supervision core for instrument-control jobs.
//!
//! This crate provides:
//! - Decoding of the line-oriented status protocol children write on a
//!   dedicated descriptor
//! - A synchronized status record per supervised process
//! - A heartbeat watchdog that kills children which stop reporting
//! - The supervisor that launches children and finalizes their record
//!   exactly once
//!
//! ## Modules
//!
//! - [`status`]: Status line parsing and timestamp conversion
//! - [`state`]: Status records and the process table
//! - [`supervisor`]: Launch, reader, watchdog and supervision task
//! - [`config`]: `paws.toml` loading

pub mod config;
pub mod state;
pub mod status;
pub mod supervisor;
