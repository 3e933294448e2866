//! Scrape runner executing a pass over multiple scrapers.

use std::{collections::HashMap, fmt, panic::AssertUnwindSafe, sync::Arc, time::Duration};

use futures_util::FutureExt;
use tokio::{
    task::{self, JoinError, JoinSet},
    time::Instant,
};
use tracing::Instrument;

use crate::{
    checks::Check,
    connection::Connection,
    context::ScrapeContext,
    error::{DescriptorError, PassError, ScrapeError},
    scraper::{Scrape, ScrapeStats, Scraper},
    sink::SampleSink,
    version::ServerVersion,
};

type ScrapeResult = Result<ScrapeStats, ScrapeError>;
type TaskResult = (Duration, ScrapeResult);

/// Outcome of a single scraper in a pass.
#[derive(Debug)]
pub struct ScrapeOutcome {
    /// Scraper name.
    pub name: String,
    /// Time spent by the scraper.
    pub latency: Duration,
    /// Scraper result.
    pub result: Result<ScrapeStats, ScrapeError>,
}

impl ScrapeOutcome {
    /// Checks whether the scraper has succeeded.
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Report of a scrape pass.
#[derive(Debug)]
pub struct PassReport {
    /// Version of the database server.
    pub server_version: ServerVersion,
    /// Outcomes of all eligible scrapers, in the order the scrapers were supplied to the runner.
    pub outcomes: Vec<ScrapeOutcome>,
    /// Total pass duration.
    pub duration: Duration,
}

impl PassReport {
    /// Checks whether at least one scraper has failed.
    pub fn is_degraded(&self) -> bool {
        self.outcomes.iter().any(|outcome| !outcome.is_success())
    }

    /// Iterates over the outcomes of failed scrapers.
    pub fn failures(&self) -> impl Iterator<Item = &ScrapeOutcome> + '_ {
        self.outcomes.iter().filter(|outcome| !outcome.is_success())
    }

    /// Returns the outcome of the scraper with the specified name, if it has run.
    pub fn outcome(&self, name: &str) -> Option<&ScrapeOutcome> {
        self.outcomes.iter().find(|outcome| outcome.name == name)
    }
}

/// Runs scrape passes over a fixed set of scrapers.
///
/// Each pass queries the server version, skips scrapers not supporting it, and runs the remaining
/// scrapers concurrently as separate Tokio tasks. A failure of a scraper doesn't influence
/// other scrapers; it's recorded in the [`PassReport`].
#[derive(Clone)]
pub struct ScrapeRunner {
    scrapers: Vec<Arc<dyn Scrape>>,
    grace_period: Duration,
}

impl fmt::Debug for ScrapeRunner {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.scrapers.iter().map(|scraper| scraper.name()).collect();
        formatter
            .debug_struct("ScrapeRunner")
            .field("scrapers", &names)
            .field("grace_period", &self.grace_period)
            .finish()
    }
}

impl ScrapeRunner {
    /// Default time given to scrapers to finish after the pass deadline.
    pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(1);

    /// Creates a runner for the specified scrapers.
    pub fn new(scrapers: impl IntoIterator<Item = Arc<dyn Scrape>>) -> Self {
        Self {
            scrapers: scrapers.into_iter().collect(),
            grace_period: Self::DEFAULT_GRACE_PERIOD,
        }
    }

    /// Creates a runner for the specified built-in checks.
    ///
    /// # Errors
    ///
    /// Returns an error if a check descriptor is invalid.
    pub fn for_checks(checks: impl IntoIterator<Item = Check>) -> Result<Self, DescriptorError> {
        let scrapers = checks
            .into_iter()
            .map(|check| Ok(Arc::new(Scraper::new(check)?) as Arc<dyn Scrape>))
            .collect::<Result<Vec<_>, DescriptorError>>()?;
        Ok(Self::new(scrapers))
    }

    /// Sets the time given to scrapers to finish after the pass deadline. Scrapers still running
    /// after the grace period are aborted.
    #[must_use]
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Returns all scrapers of this runner.
    pub fn scrapers(&self) -> &[Arc<dyn Scrape>] {
        &self.scrapers
    }

    /// Iterates over scrapers supporting the specified server version.
    pub fn eligible(&self, version: ServerVersion) -> impl Iterator<Item = &Arc<dyn Scrape>> + '_ {
        self.scrapers
            .iter()
            .filter(move |scraper| scraper.min_version() <= version)
    }

    /// Records the result of a finished scrape task. A task that has failed to complete is reported
    /// as panicked or cancelled, depending on the cause.
    fn record_result(
        task_indices: &HashMap<task::Id, usize>,
        results: &mut [Option<TaskResult>],
        joined: Result<(usize, Duration, ScrapeResult), JoinError>,
        started_at: Instant,
    ) {
        match joined {
            Ok((index, latency, result)) => {
                results[index] = Some((latency, result));
            }
            Err(err) => {
                let Some(&index) = task_indices.get(&err.id()) else {
                    tracing::error!(%err, "Unknown scrape task terminated");
                    return;
                };
                let result = if err.is_panic() {
                    Err(ScrapeError::Panicked)
                } else {
                    Err(ScrapeError::Cancelled)
                };
                results[index] = Some((started_at.elapsed(), result));
            }
        }
    }

    fn interruption_error(ctx: &ScrapeContext) -> PassError {
        if Instant::now() >= ctx.deadline() {
            PassError::DeadlineExpired
        } else {
            PassError::Cancelled
        }
    }

    /// Runs a single scrape pass. Samples are sent to the `sink`; the sink handle is dropped
    /// once all scrapers have finished or were aborted.
    ///
    /// # Errors
    ///
    /// Returns an error if the pass cannot start: the `ctx` is already cancelled, or the server
    /// version cannot be determined. Errors of individual scrapers are reported in [`PassReport`].
    pub async fn run_pass(
        &self,
        ctx: &ScrapeContext,
        connection: Arc<dyn Connection>,
        sink: SampleSink,
    ) -> Result<PassReport, PassError> {
        let started_at = Instant::now();
        if ctx.is_cancelled() {
            return Err(Self::interruption_error(ctx));
        }

        let raw_version = ctx
            .guard(connection.server_version())
            .await
            .map_err(|_| Self::interruption_error(ctx))?
            .map_err(PassError::ServerVersion)?;
        let server_version = raw_version
            .parse::<ServerVersion>()
            .map_err(|source| PassError::InvalidVersion {
                raw: raw_version.clone(),
                source,
            })?;
        tracing::debug!(%server_version, "Starting scrape pass");

        let mut names = vec![];
        let mut task_indices = HashMap::new();
        let mut tasks = JoinSet::new();
        for scraper in &self.scrapers {
            let min_version = scraper.min_version();
            if min_version > server_version {
                tracing::debug!(
                    scraper = scraper.name(),
                    %min_version,
                    %server_version,
                    "Skipping scraper not supported by the server"
                );
                continue;
            }

            let index = names.len();
            names.push(scraper.name().to_owned());
            let span = tracing::info_span!("scrape", scraper = scraper.name());
            let scraper = scraper.clone();
            let ctx = ctx.clone();
            let connection = connection.clone();
            let sink = sink.clone();
            let task = async move {
                let started_at = Instant::now();
                let scrape = async { scraper.scrape(&ctx, connection.as_ref(), &sink).await };
                let result = AssertUnwindSafe(scrape)
                    .catch_unwind()
                    .await
                    .unwrap_or(Err(ScrapeError::Panicked));
                (index, started_at.elapsed(), result)
            };
            let handle = tasks.spawn(task.instrument(span));
            task_indices.insert(handle.id(), index);
        }
        drop(sink);

        let mut results: Vec<_> = names.iter().map(|_| None).collect();
        // Set once the context is cancelled; scrapers still running after it are aborted.
        let mut hard_deadline = None::<Instant>;
        loop {
            let joined = if let Some(hard_deadline) = hard_deadline {
                if let Ok(joined) = tokio::time::timeout_at(hard_deadline, tasks.join_next()).await {
                    joined
                } else {
                    tracing::warn!(
                        unfinished = tasks.len(),
                        grace_period = ?self.grace_period,
                        "Scrapers haven't finished in time; aborting them"
                    );
                    tasks.abort_all();
                    // Wait for aborted tasks to be dropped, so that their sinks and cursors are released.
                    while let Some(joined) = tasks.join_next().await {
                        Self::record_result(&task_indices, &mut results, joined, started_at);
                    }
                    break;
                }
            } else {
                tokio::select! {
                    joined = tasks.join_next() => joined,
                    () = ctx.cancelled() => {
                        hard_deadline = Some(Instant::now() + self.grace_period);
                        continue;
                    }
                }
            };

            let Some(joined) = joined else {
                break;
            };
            Self::record_result(&task_indices, &mut results, joined, started_at);
        }

        let outcomes: Vec<_> = names
            .into_iter()
            .zip(results)
            .map(|(name, result)| {
                let (latency, result) =
                    result.unwrap_or_else(|| (started_at.elapsed(), Err(ScrapeError::Cancelled)));
                if let Err(err) = &result {
                    tracing::warn!(scraper = %name, %err, "Scraper failed");
                }
                ScrapeOutcome {
                    name,
                    latency,
                    result,
                }
            })
            .collect();

        let report = PassReport {
            server_version,
            outcomes,
            duration: started_at.elapsed(),
        };
        tracing::info!(
            %server_version,
            scrapers = report.outcomes.len(),
            failed = report.failures().count(),
            duration = ?report.duration,
            "Finished scrape pass"
        );
        Ok(report)
    }
}
