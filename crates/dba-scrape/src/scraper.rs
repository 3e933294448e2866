//! Scraper abstraction and its implementation for built-in checks.

use std::{fmt, sync::Arc};

use futures_util::{future::BoxFuture, FutureExt, StreamExt};

use crate::{
    checks::Check,
    connection::Connection,
    context::ScrapeContext,
    descriptors::MetricDescriptor,
    error::{DescriptorError, ScrapeError},
    sample::Sample,
    sink::SampleSink,
    version::ServerVersion,
};

/// Statistics of a successful scrape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrapeStats {
    /// Number of result rows read.
    pub rows: usize,
    /// Number of samples sent to the sink.
    pub samples: usize,
}

/// Unit of work binding a query to a metric shape.
///
/// Implementations must be stateless between passes; all per-pass state should live
/// in the future returned by [`Self::scrape()`].
pub trait Scrape: fmt::Debug + Send + Sync + 'static {
    /// Returns the name of this scraper. Should be unique among scrapers run together.
    fn name(&self) -> &str;

    /// Returns a short description of this scraper.
    fn help(&self) -> &str;

    /// Returns the minimum server version supported by this scraper.
    fn min_version(&self) -> ServerVersion;

    /// Executes the scraper query and sends a sample for each result row to the `sink`.
    ///
    /// Samples are sent before the next row is fetched. Samples that were already sent are
    /// not retracted if the scraper fails afterward.
    ///
    /// # Errors
    ///
    /// Returns an error if the query or scanning a row fails, the `ctx` is cancelled,
    /// or the sink is closed.
    fn scrape<'a>(
        &'a self,
        ctx: &'a ScrapeContext,
        connection: &'a dyn Connection,
        sink: &'a SampleSink,
    ) -> BoxFuture<'a, Result<ScrapeStats, ScrapeError>>;
}

/// Scraper for a built-in [`Check`].
#[derive(Debug, Clone)]
pub struct Scraper {
    check: Check,
    descriptor: Arc<MetricDescriptor>,
}

impl Scraper {
    /// Creates a scraper for the specified check, building its metric descriptor.
    ///
    /// # Errors
    ///
    /// Returns an error if the descriptor is invalid.
    pub fn new(check: Check) -> Result<Self, DescriptorError> {
        Ok(Self {
            check,
            descriptor: Arc::new(check.descriptor()?),
        })
    }

    /// Returns the check performed by this scraper.
    pub fn check(&self) -> Check {
        self.check
    }

    /// Returns the descriptor of the emitted metric.
    pub fn descriptor(&self) -> &Arc<MetricDescriptor> {
        &self.descriptor
    }

    /// Returns the executed SQL query.
    pub fn query(&self) -> &'static str {
        self.check.query()
    }

    async fn scrape_rows(
        &self,
        ctx: &ScrapeContext,
        connection: &dyn Connection,
        sink: &SampleSink,
    ) -> Result<ScrapeStats, ScrapeError> {
        let mut stats = ScrapeStats::default();
        // The stream is dropped on every return path, which releases the cursor.
        let mut rows = connection.query(self.query());
        while let Some(row) = ctx.guard(rows.next()).await? {
            let row = row?;
            stats.rows += 1;

            let observation = self.check.map_row(&row)?;
            let sample = Sample::new(
                self.descriptor.clone(),
                observation.label_values,
                observation.value,
            )?;
            ctx.guard(sink.send(sample)).await??;
            stats.samples += 1;
        }
        Ok(stats)
    }
}

impl Scrape for Scraper {
    fn name(&self) -> &str {
        self.check.name()
    }

    fn help(&self) -> &str {
        self.check.help()
    }

    fn min_version(&self) -> ServerVersion {
        self.check.min_version()
    }

    fn scrape<'a>(
        &'a self,
        ctx: &'a ScrapeContext,
        connection: &'a dyn Connection,
        sink: &'a SampleSink,
    ) -> BoxFuture<'a, Result<ScrapeStats, ScrapeError>> {
        self.scrape_rows(ctx, connection, sink).boxed()
    }
}
