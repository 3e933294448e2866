//! `MetricsExporter` and closely related types.

use std::{
    convert::Infallible,
    fmt,
    future::{self, Future},
    net::SocketAddr,
    pin::Pin,
    sync::Arc,
    time::{Duration, Instant},
};

use hyper::{
    header::{self, HeaderValue},
    server::conn::http1,
    service::service_fn,
    Response, StatusCode,
};
use hyper_util::rt::TokioIo;
use tokio::{io, net::TcpListener, sync::watch};

use dba_scrape::{sink, Connection, DescriptorError, ScrapeContext, ScrapeRunner};

use crate::{exposition::SampleCollector, format::Format, metrics::ExporterMetrics};

#[cfg(test)]
mod tests;

/// Capacity of the sample channel used during a scrape pass.
const SINK_CAPACITY: usize = 256;

#[derive(Clone)]
struct MetricsExporterInner {
    runner: Arc<ScrapeRunner>,
    connection: Arc<dyn Connection>,
    metrics: Arc<ExporterMetrics>,
    format: Format,
    timeout: Duration,
}

impl MetricsExporterInner {
    async fn render_body(&self) -> Result<String, fmt::Error> {
        let started_at = Instant::now();
        let ctx = ScrapeContext::with_timeout(self.timeout);
        let (sink, stream) = sink::channel(SINK_CAPACITY);
        let (pass, samples) = tokio::join!(
            self.runner.run_pass(&ctx, self.connection.clone(), sink),
            stream.collect_all()
        );
        if let Err(err) = &pass {
            tracing::warn!(%err, "Scrape pass failed");
        }

        let mut collector: SampleCollector = samples.into_iter().collect();
        match self.metrics.samples(&pass) {
            Ok(exporter_samples) => {
                for sample in &exporter_samples {
                    collector.push(sample);
                }
            }
            Err(err) => tracing::error!(%err, "Failed producing exporter metrics"),
        }

        let mut buffer = String::with_capacity(1_024);
        collector.encode_text(&mut buffer, self.format)?;

        let latency = started_at.elapsed();
        let scraped_size = buffer.len();
        tracing::debug!(
            latency_sec = latency.as_secs_f64(),
            scraped_size,
            "Scraped metrics in {latency:?} (scraped size: {scraped_size}B)"
        );
        Ok(buffer)
    }

    async fn render(&self) -> Response<String> {
        let (status, content_type, body) = match self.render_body().await {
            Ok(body) => (StatusCode::OK, self.format.content_type(), body),
            Err(err) => {
                tracing::error!(%err, "Failed encoding metrics");
                let body = "failed encoding metrics".to_owned();
                (StatusCode::INTERNAL_SERVER_ERROR, "text/plain; charset=utf-8", body)
            }
        };

        let mut response = Response::new(body);
        *response.status_mut() = status;
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        response
    }
}

/// Prometheus exporter serving samples of a [`ScrapeRunner`] over HTTP.
///
/// Each HTTP request triggers a separate scrape pass bounded by the configured timeout.
/// Besides samples produced by scrapers, the response contains the following exporter metrics:
///
/// - `mysql_up`: whether the server version could be queried
/// - `mysql_exporter_collector_duration_seconds{collector}`: latency of each scraper
/// - `mysql_exporter_collector_success{collector}`: whether each scraper succeeded
/// - `mysql_exporter_last_scrape_error`: whether the pass failed or was degraded
///
/// # Examples
///
/// ```no_run
/// use dba_scrape::{Check, ScrapeRunner};
/// use dba_scrape_exporter::MetricsExporter;
/// use std::sync::Arc;
///
/// # async fn run() -> anyhow::Result<()> {
/// let pool = sqlx::MySqlPool::connect_lazy("mysql://exporter@localhost/")?;
/// let runner = ScrapeRunner::for_checks(Check::ALL)?;
/// let exporter = MetricsExporter::new(Arc::new(runner), Arc::new(pool))?
///     .with_graceful_shutdown(async {
///         tokio::signal::ctrl_c().await.ok();
///     });
/// exporter.start("0.0.0.0:9104".parse()?).await?;
/// # Ok(())
/// # }
/// ```
pub struct MetricsExporter<'a> {
    inner: MetricsExporterInner,
    shutdown_future: Pin<Box<dyn Future<Output = ()> + Send + 'a>>,
}

impl fmt::Debug for MetricsExporter<'_> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("MetricsExporter")
            .field("runner", &self.inner.runner)
            .field("format", &self.inner.format)
            .field("timeout", &self.inner.timeout)
            .finish_non_exhaustive()
    }
}

impl<'a> MetricsExporter<'a> {
    /// Default timeout of a scrape pass.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Creates an exporter running scrape passes of the `runner` against the `connection`.
    ///
    /// # Errors
    ///
    /// Returns an error if descriptors of exporter metrics are invalid.
    pub fn new(
        runner: Arc<ScrapeRunner>,
        connection: Arc<dyn Connection>,
    ) -> Result<Self, DescriptorError> {
        let scraper_count = runner.scrapers().len();
        tracing::info!("Created metrics exporter with {scraper_count} scrapers: {runner:?}");
        Ok(Self {
            inner: MetricsExporterInner {
                runner,
                connection,
                metrics: Arc::new(ExporterMetrics::new()?),
                format: Format::default(),
                timeout: Self::DEFAULT_TIMEOUT,
            },
            shutdown_future: Box::pin(future::pending()),
        })
    }

    /// Sets the export [`Format`]. By default, [`Format::Prometheus`] is used.
    #[must_use]
    pub fn with_format(mut self, format: Format) -> Self {
        self.inner.format = format;
        self
    }

    /// Sets the timeout of a single scrape pass. By default, [`Self::DEFAULT_TIMEOUT`] is used.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.inner.timeout = timeout;
        self
    }

    /// Configures graceful shutdown for the exporter server.
    #[must_use]
    pub fn with_graceful_shutdown<F>(mut self, shutdown: F) -> Self
    where
        F: Future<Output = ()> + Send + 'a,
    {
        self.shutdown_future = Box::pin(shutdown);
        self
    }

    /// Starts the server on the specified address. This future resolves when the server is shut down.
    ///
    /// The server will expose the following endpoints:
    ///
    /// - `GET` on any path: runs a scrape pass and serves its samples in the text format
    ///   configured using [`Self::with_format()`]
    ///
    /// # Errors
    ///
    /// Returns an error if binding to the specified address fails.
    pub async fn start(self, bind_address: SocketAddr) -> io::Result<()> {
        tracing::info!("Starting Prometheus exporter web server on {bind_address}");
        self.bind(bind_address).await?.start().await?;
        tracing::info!("Prometheus metrics exporter server shut down");
        Ok(())
    }

    /// Creates an HTTP exporter server and binds it to the specified address.
    ///
    /// # Errors
    ///
    /// Returns an error if binding to the specified address fails.
    pub async fn bind(mut self, bind_address: SocketAddr) -> io::Result<MetricsServer<'a>> {
        let listener = TcpListener::bind(bind_address).await?;
        let local_addr = listener.local_addr()?;
        let server = async move {
            let (started_shutdown_sender, started_shutdown) = watch::channel(());
            loop {
                let stream = tokio::select! {
                    res = listener.accept() => res?.0,
                    () = &mut self.shutdown_future => break,
                };

                let io = TokioIo::new(stream);
                let inner = self.inner.clone();
                let mut started_shutdown = started_shutdown.clone();
                tokio::spawn(async move {
                    let conn = http1::Builder::new().serve_connection(
                        io,
                        service_fn(|_| async { Ok::<_, Infallible>(inner.render().await) }),
                    );
                    tokio::pin!(conn);

                    let res = tokio::select! {
                        _ = started_shutdown.changed() => {
                            conn.as_mut().graceful_shutdown();
                            conn.await
                        }
                        res = conn.as_mut() => res,
                    };
                    if let Err(err) = res {
                        tracing::warn!(%err, "Error serving connection");
                    }
                });
            }

            tracing::info!("Stop signal received, Prometheus metrics exporter is shutting down");
            // Send the graceful shutdown signal to all alive connections.
            drop(started_shutdown);
            started_shutdown_sender.send_replace(());
            // Wait until all connections are dropped.
            started_shutdown_sender.closed().await;

            Ok(())
        };

        Ok(MetricsServer {
            server: Box::pin(server),
            local_addr,
        })
    }
}

/// Metrics server bound to a certain local address returned by [`MetricsExporter::bind()`].
///
/// Useful e.g. if you need to find out which port the server was bound to if the 0th port was specified.
#[must_use = "Server should be `start()`ed"]
pub struct MetricsServer<'a> {
    server: Pin<Box<dyn Future<Output = io::Result<()>> + Send + 'a>>,
    local_addr: SocketAddr,
}

impl fmt::Debug for MetricsServer<'_> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("MetricsServer")
            .field("local_addr", &self.local_addr)
            .finish_non_exhaustive()
    }
}

impl MetricsServer<'_> {
    /// Returns the local address this server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Starts this server. Resolves once the server is shut down.
    ///
    /// # Errors
    ///
    /// Returns an error if starting the server operation fails.
    pub async fn start(self) -> io::Result<()> {
        self.server.await
    }
}
