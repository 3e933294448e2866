//! Prometheus exporter serving samples of `dba-scrape` checks over HTTP.
//!
//! Each HTTP request to the exporter runs a scrape pass against the database, bounded by
//! a configurable timeout, and renders the produced samples together with exporter metrics
//! (`mysql_up`, per-collector latency and success) in the Prometheus or OpenMetrics text format.
//!
//! The `dba-exporter` binary reads [`ExporterConfig`] from command-line args (falling back
//! to environment variables) and serves metrics until it receives a termination signal.

// Linter settings.
#![warn(missing_debug_implementations, missing_docs, bare_trait_objects)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::must_use_candidate, clippy::module_name_repetitions)]

mod config;
mod exporter;
mod exposition;
mod format;
mod metrics;

pub use crate::{
    config::ExporterConfig,
    exporter::{MetricsExporter, MetricsServer},
    format::{Format, FormatParseError},
};
