// LogWeave - platform/mod.rs
//
// Platform abstraction layer: config directories, config.toml, threads.
// Dependencies: core (scheduler contract), util, directories, rayon.
// Must NOT depend on: sources, app.

pub mod config;
pub mod scheduler;
