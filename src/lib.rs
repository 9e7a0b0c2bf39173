//! kvmlat: kernel-trace correlation and latency decomposition for KVM
//! network benchmarks.
//!
//! Given two raw ftrace logs (one captured on the host clock, one on the
//! guest clock, with a benchmark run embedded between two trace markers),
//! the library aligns the guest timestamps to the host TSC, merges the
//! streams into one timeline, trims the benchmark window, fans the events
//! out to a set of stateful latency classifiers, and reduces their
//! intervals to per-category statistics in cycles and microseconds.
//!
//! Capturing the traces, driving the benchmark, and rendering reports are
//! the caller's business; the library consumes trace text and produces
//! structured statistics.

pub mod classify;
pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod parse;
pub mod pipeline;
pub mod report;
pub mod stats;
pub mod timeline;
pub mod window;
