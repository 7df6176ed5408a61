//! # paws-protocol
//!
//! Data models shared between the supervision core and its clients.
//!
//! This crate defines:
//! - The line-oriented status report that instrument-control processes
//!   write on their status descriptor
//! - Decoded status events
//! - The process status snapshot served to pollers
//! - Supervisor configuration
//!
//! ## Modules
//!
//! - [`status_models`]: Wire report, tags, and decoded status events
//! - [`process_models`]: Process status snapshot, lifecycle enums, progress metrics
//! - [`config_models`]: Supervisor settings from `paws.toml`
//!
//! ## Design Principles
//!
//! - Minimal dependencies: Only serde, ts-rs, and uuid
//! - TypeScript generation: Client-facing types derive `TS` for dashboards
//! - Independent compilation: No dependencies on other paws crates

pub mod config_models;
pub mod process_models;
pub mod status_models;

// Re-export all public types for convenience
pub use config_models::*;
pub use process_models::*;
pub use status_models::*;
