//! Metric descriptors.

use prometheus_client::metrics::MetricType;

use std::collections::HashSet;

use crate::{
    error::DescriptorError,
    validation::{validate_label_name, validate_name},
};

/// Joins non-empty name parts with `_`, e.g. `("mysql", "dba", "open_tables")`
/// is transformed to `mysql_dba_open_tables`.
pub fn build_fq_name(namespace: &str, subsystem: &str, name: &str) -> String {
    let parts = [namespace, subsystem, name];
    let mut full_name = String::with_capacity(parts.iter().map(|part| part.len() + 1).sum());
    for part in parts.into_iter().filter(|part| !part.is_empty()) {
        if !full_name.is_empty() {
            full_name.push('_');
        }
        full_name.push_str(part);
    }
    full_name
}

/// Immutable descriptor of a metric family: its full name, help, type and ordered label names.
///
/// Descriptors are created once on startup and are shared (via `Arc`) by all samples
/// referencing them.
#[derive(Debug, Clone)]
pub struct MetricDescriptor {
    name: String,
    help: String,
    metric_type: MetricType,
    label_names: Vec<String>,
}

impl MetricDescriptor {
    /// Creates a gauge descriptor.
    ///
    /// # Errors
    ///
    /// Returns an error if the full metric name or any of the label names are invalid,
    /// or if label names contain duplicates.
    pub fn new(
        namespace: &str,
        subsystem: &str,
        name: &str,
        help: &str,
        label_names: &[&str],
    ) -> Result<Self, DescriptorError> {
        let name = build_fq_name(namespace, subsystem, name);
        validate_name(&name).map_err(|reason| DescriptorError::MetricName {
            name: name.clone(),
            reason,
        })?;

        let mut unique_names = HashSet::with_capacity(label_names.len());
        for &label in label_names {
            validate_label_name(label).map_err(|reason| DescriptorError::LabelName {
                name: label.to_owned(),
                reason,
            })?;
            if !unique_names.insert(label) {
                return Err(DescriptorError::DuplicateLabel {
                    name: label.to_owned(),
                });
            }
        }

        Ok(Self {
            name,
            help: help.to_owned(),
            metric_type: MetricType::Gauge,
            label_names: label_names.iter().map(|&label| label.to_owned()).collect(),
        })
    }

    /// Sets the metric type. Only gauges and counters are supported by the exposition layer.
    #[must_use]
    pub fn with_type(mut self, metric_type: MetricType) -> Self {
        self.metric_type = metric_type;
        self
    }

    /// Returns the fully qualified name of the metric.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns help for the metric.
    pub fn help(&self) -> &str {
        &self.help
    }

    /// Returns the type of the metric.
    pub fn metric_type(&self) -> MetricType {
        self.metric_type
    }

    /// Returns ordered label names. Every sample referencing this descriptor has exactly
    /// this many label values.
    pub fn label_names(&self) -> &[String] {
        &self.label_names
    }
}
