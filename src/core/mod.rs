// LogWeave - core/mod.rs
//
// Core business logic layer: the record model, change descriptions, the
// source contract, predicates and the scheduling abstraction.
// Must NOT depend on: sources, platform, app, or any I/O crate directly.

pub mod buffer;
pub mod column;
pub mod filter;
pub mod model;
pub mod modification;
pub mod scheduler;
pub mod source;
