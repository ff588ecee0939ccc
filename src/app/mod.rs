// LogWeave - app/mod.rs
//
// Application layer: file import and pipeline assembly.
// Dependencies: core, sources, platform::config.

pub mod import;
pub mod pipeline;
