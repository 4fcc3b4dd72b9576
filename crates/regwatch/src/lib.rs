//! `regwatch` facade crate.
//!
//! The primary entrypoint for end users is the `regwatch` binary. This
//! library exists to support embedding and to provide a stable way to reuse
//! core types without depending on internal crate layout.

pub use regwatch_core as core;
