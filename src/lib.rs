// LogWeave - lib.rs
//
// Library entry point. The `logweave` binary in `main.rs` is a thin CLI over
// these modules; integration tests drive them directly.
//
// Layering:
//   util     - errors, constants, logging (no internal dependencies)
//   core     - row model, columns, modifications, filters, scheduler contract
//   sources  - producers and transforms built on core
//   platform - config.toml loading, thread-pool scheduler
//   app      - file import and pipeline wiring

pub mod app;
pub mod core;
pub mod platform;
pub mod sources;
pub mod util;

#[cfg(test)]
mod test_support;
