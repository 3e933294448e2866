//! Internal metrics for the exporter itself.

use std::sync::Arc;

use dba_scrape::{DescriptorError, MetricDescriptor, PassError, PassReport, Sample, ScanError};

const NAMESPACE: &str = "mysql";
const EXPORTER_SUBSYSTEM: &str = "exporter";

/// Descriptors of metrics reporting the outcome of a scrape pass.
#[derive(Debug)]
pub(crate) struct ExporterMetrics {
    up: Arc<MetricDescriptor>,
    collector_duration: Arc<MetricDescriptor>,
    collector_success: Arc<MetricDescriptor>,
    last_scrape_error: Arc<MetricDescriptor>,
}

impl ExporterMetrics {
    pub(crate) fn new() -> Result<Self, DescriptorError> {
        Ok(Self {
            up: Arc::new(MetricDescriptor::new(
                NAMESPACE,
                "",
                "up",
                "Whether the MySQL server is up.",
                &[],
            )?),
            collector_duration: Arc::new(MetricDescriptor::new(
                NAMESPACE,
                EXPORTER_SUBSYSTEM,
                "collector_duration_seconds",
                "Collector time duration.",
                &["collector"],
            )?),
            collector_success: Arc::new(MetricDescriptor::new(
                NAMESPACE,
                EXPORTER_SUBSYSTEM,
                "collector_success",
                "Whether a collector succeeded.",
                &["collector"],
            )?),
            last_scrape_error: Arc::new(MetricDescriptor::new(
                NAMESPACE,
                EXPORTER_SUBSYSTEM,
                "last_scrape_error",
                "Whether the last scrape of metrics from MySQL resulted in an error (1 for error, 0 for success).",
                &[],
            )?),
        })
    }

    /// Produces samples describing the outcome of a scrape pass.
    pub(crate) fn samples(
        &self,
        pass: &Result<PassReport, PassError>,
    ) -> Result<Vec<Sample>, ScanError> {
        let Ok(report) = pass else {
            return Ok(vec![
                Sample::new(self.up.clone(), vec![], 0.0)?,
                Sample::new(self.last_scrape_error.clone(), vec![], 1.0)?,
            ]);
        };

        let mut samples = Vec::with_capacity(2 + 2 * report.outcomes.len());
        samples.push(Sample::new(self.up.clone(), vec![], 1.0)?);
        let error_value = if report.is_degraded() { 1.0 } else { 0.0 };
        samples.push(Sample::new(
            self.last_scrape_error.clone(),
            vec![],
            error_value,
        )?);

        for outcome in &report.outcomes {
            let labels = vec![outcome.name.clone()];
            let latency = outcome.latency.as_secs_f64();
            samples.push(Sample::new(
                self.collector_duration.clone(),
                labels.clone(),
                latency,
            )?);
            let success = if outcome.is_success() { 1.0 } else { 0.0 };
            samples.push(Sample::new(self.collector_success.clone(), labels, success)?);
        }
        Ok(samples)
    }
}
