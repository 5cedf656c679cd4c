//! # Profiling Module
//!
//! Feature-gated Chrome-trace profiling. With the `profiling` cargo feature
//! the [`profiler`] records RAII spans and writes a trace JSON viewable in
//! Perfetto or `chrome://tracing`; without it every entry point compiles to
//! a no-op.

pub mod profiler;
