//! Repeatedly runs a benchmark, scans its text reports for per-phase metrics,
//! and keeps a running average of every phase across iterations.

pub mod average;
pub mod cli;
pub mod driver;
pub mod metrics;
pub mod output;
pub mod report;
