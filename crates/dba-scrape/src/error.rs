//! Error types.

use derive_more::{Display, Error};

use std::{error, fmt};

use crate::version::VersionParseError;

/// Error executing a query or fetching its rows. Wraps the underlying driver error.
#[derive(Debug)]
pub struct QueryError(Box<dyn error::Error + Send + Sync>);

impl QueryError {
    /// Wraps the provided driver error.
    pub fn new(err: impl Into<Box<dyn error::Error + Send + Sync>>) -> Self {
        Self(err.into())
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, formatter)
    }
}

impl error::Error for QueryError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        Some(self.0.as_ref())
    }
}

impl From<sqlx::Error> for QueryError {
    fn from(err: sqlx::Error) -> Self {
        Self::new(err)
    }
}

/// Error mapping a result row onto the expected row shape.
#[derive(Debug, Display, Error)]
#[non_exhaustive]
pub enum ScanError {
    /// Row has an unexpected number of columns.
    #[display("expected {expected} columns, got {actual}")]
    ColumnCount {
        /// Number of columns expected by the row shape.
        expected: usize,
        /// Number of columns in the row.
        actual: usize,
    },
    /// Column is `NULL`, but the row shape doesn't allow it.
    #[display("unexpected NULL in column #{column}")]
    UnexpectedNull {
        /// Zero-based column index.
        column: usize,
    },
    /// Column value cannot be converted to the expected type.
    #[display("column #{column} has type {actual}, which cannot be converted to {expected}")]
    TypeMismatch {
        /// Zero-based column index.
        column: usize,
        /// Expected type.
        expected: &'static str,
        /// Actual type of the column value.
        actual: &'static str,
    },
    /// Number of label values doesn't match the number of labels in the metric descriptor.
    #[display("metric `{metric}` has {expected} labels, got {actual} label values")]
    LabelArity {
        /// Full metric name.
        metric: String,
        /// Number of labels declared by the descriptor.
        expected: usize,
        /// Number of supplied label values.
        actual: usize,
    },
}

/// Error running a single scraper.
#[derive(Debug, Display, Error)]
#[non_exhaustive]
pub enum ScrapeError {
    /// Query failed to execute, or fetching a row failed.
    #[display("query failed: {_0}")]
    Query(QueryError),
    /// Row didn't match the expected shape.
    #[display("cannot scan row: {_0}")]
    Scan(ScanError),
    /// Scrape deadline has passed or the pass was cancelled explicitly.
    #[display("scrape was cancelled")]
    Cancelled,
    /// Consumer of the samples has gone away.
    #[display("sample sink is closed")]
    SinkClosed,
    /// Scraper panicked.
    #[display("scraper panicked")]
    Panicked,
}

impl ScrapeError {
    /// Checks whether this error is caused by cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<QueryError> for ScrapeError {
    fn from(err: QueryError) -> Self {
        Self::Query(err)
    }
}

impl From<ScanError> for ScrapeError {
    fn from(err: ScanError) -> Self {
        Self::Scan(err)
    }
}

/// Error that prevents a scrape pass from starting.
#[derive(Debug, Display, Error)]
#[non_exhaustive]
pub enum PassError {
    /// Pass deadline has already passed.
    #[display("scrape deadline has expired before the pass started")]
    DeadlineExpired,
    /// Pass was cancelled before any scraper has started.
    #[display("scrape pass was cancelled before it started")]
    Cancelled,
    /// Querying the server version failed.
    #[display("cannot query server version: {_0}")]
    ServerVersion(QueryError),
    /// Server version cannot be parsed.
    #[display("cannot parse server version `{raw}`: {source}")]
    InvalidVersion {
        /// Version string reported by the server.
        raw: String,
        /// Parsing error.
        source: VersionParseError,
    },
}

/// Error constructing a [`MetricDescriptor`](crate::MetricDescriptor).
#[derive(Debug, Display, Error)]
#[non_exhaustive]
pub enum DescriptorError {
    /// Metric name is invalid.
    #[display("invalid metric name `{name}`: {reason}")]
    MetricName {
        /// Full metric name.
        name: String,
        /// Reason the name is invalid.
        reason: &'static str,
    },
    /// Label name is invalid.
    #[display("invalid label name `{name}`: {reason}")]
    LabelName {
        /// Label name.
        name: String,
        /// Reason the name is invalid.
        reason: &'static str,
    },
    /// Label name is specified more than once.
    #[display("label `{name}` is specified more than once")]
    DuplicateLabel {
        /// Label name.
        name: String,
    },
}
