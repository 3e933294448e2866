//! Typed scrapers turning MySQL introspection queries into metric samples.
//!
//! # Overview
//!
//! - A [`Check`] is one of the built-in introspection checks. Each check knows its SQL query,
//!   the shape of the metric it produces and how a result [`Row`] maps onto that metric.
//! - A [`Scraper`] binds a check to its [`MetricDescriptor`], which is built once at startup and
//!   shared by all scrape passes. Scrapers implement the object-safe [`Scrape`] trait, so custom
//!   scrapers can run side by side with the built-in ones.
//! - Row shapes are plain structs deriving [`ScanRow`]. Fields become labels (in declaration order)
//!   unless marked with `#[scan(value)]` (the sample value) or `#[scan(skip)]` (a column that is read,
//!   but not reported).
//! - A [`ScrapeRunner`] executes one pass over all version-eligible scrapers concurrently, bounded
//!   by the deadline of a [`ScrapeContext`]. Samples are streamed into a [`SampleSink`]; a failure
//!   of one scraper never affects the others and is reported in the [`PassReport`].
//! - The database is accessed via the [`Connection`] trait, which is implemented for
//!   [`MySqlPool`](sqlx::MySqlPool).
//!
//! # Examples
//!
//! ```no_run
//! use dba_scrape::{sink, Check, ScrapeContext, ScrapeRunner};
//! use std::{sync::Arc, time::Duration};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = sqlx::MySqlPool::connect("mysql://exporter@localhost/").await?;
//! let runner = ScrapeRunner::for_checks(Check::ALL.iter().copied())?;
//!
//! let ctx = ScrapeContext::with_timeout(Duration::from_secs(10));
//! let (sink, stream) = sink::channel(128);
//! // The stream must be drained concurrently with the pass, since the sink applies backpressure.
//! let (report, samples) = tokio::join!(
//!     runner.run_pass(&ctx, Arc::new(pool), sink),
//!     stream.collect_all()
//! );
//! let report = report?;
//! for sample in &samples {
//!     println!("{sample}");
//! }
//! println!("degraded: {}", report.is_degraded());
//! # Ok(())
//! # }
//! ```

// Linter settings.
#![warn(missing_debug_implementations, missing_docs, bare_trait_objects)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::must_use_candidate, clippy::module_name_repetitions)]

pub use prometheus_client::metrics::MetricType;

/// Derives the [`ScanRow`] trait for a struct with named fields, which describes a result row
/// of an introspection query.
///
/// Fields are scanned from the row columns in declaration order; the number of columns
/// in a row must match the number of fields exactly. The macro can be configured using
/// `#[scan()]` attributes.
///
/// # Container attributes
///
/// ## `crate`
///
/// **Type:** path
///
/// Path to the `dba_scrape` crate. Only necessary if the crate is renamed.
///
/// # Field attributes
///
/// ## `value`
///
/// Marks the field as the sample value. The field type must implement [`SampleValue`].
/// At most one field can be marked. If no field is marked, samples have value `0`.
///
/// ## `skip`
///
/// The column is scanned (so it counts towards the expected number of columns), but is not
/// reported as a label.
///
/// ## `rename`
///
/// **Type:** string
///
/// Label name to use instead of the field name.
///
/// # Examples
///
/// ```
/// use dba_scrape::{Ignored, ScanRow};
///
/// #[derive(Debug, ScanRow)]
/// struct OpenTableRow {
///     schema: String,
///     table: String,
///     #[scan(value)]
///     in_use: u64,
///     #[scan(skip)]
///     _name_locked: Ignored,
/// }
///
/// assert_eq!(OpenTableRow::LABELS, ["schema", "table"]);
/// assert_eq!(OpenTableRow::COLUMNS, 4);
/// ```
pub use dba_scrape_macros::ScanRow;

mod checks;
mod connection;
mod context;
pub mod descriptors;
mod error;
mod row;
mod runner;
mod sample;
mod scraper;
pub mod sink;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
mod validation;
mod version;

pub use crate::{
    checks::Check,
    connection::{Connection, RowStream},
    context::{CancelHandle, ScrapeContext},
    descriptors::{build_fq_name, MetricDescriptor},
    error::{DescriptorError, PassError, QueryError, ScanError, ScrapeError},
    row::{FromValue, Ignored, LabelValue, Observation, Row, SampleValue, ScanRow, Value},
    runner::{PassReport, ScrapeOutcome, ScrapeRunner},
    sample::{write_label_value, Sample},
    scraper::{Scrape, ScrapeStats, Scraper},
    sink::{SampleSink, SampleStream},
    version::{ServerVersion, VersionParseError},
};

#[cfg(test)]
mod tests;
