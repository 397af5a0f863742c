//! skiff-types: pure data types for the skiff submission engine.
//!
//! This crate provides:
//!
//! - **Identifiers**: work and task id minting and parsing
//! - **Manifest**: the declarative submission tree (spec, io, batch options)
//! - **PlanItem**: one planned task — its inputs, basenames, and arguments
//! - **TaskDescriptor**: the JSON payload a worker reads to execute
//! - **Keys**: the store-key schema shared with workers
//! - **Template**: `{in}` / `{inN}` argument substitution
//!
//! This crate is a leaf dependency with no async runtime and no I/O. It
//! exists so that consumers (workers, tooling) can speak skiff's wire
//! formats without pulling the client's connector stack.

pub mod descriptor;
pub mod ids;
pub mod keys;
pub mod manifest;
pub mod plan;
pub mod template;

// Flat re-exports for convenience
pub use descriptor::*;
pub use ids::*;
pub use keys::*;
pub use manifest::*;
pub use plan::*;
pub use template::*;
