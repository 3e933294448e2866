//! Encoding of samples in text exposition formats.

use std::{collections::BTreeMap, fmt, sync::Arc};

use prometheus_client::{
    collector::Collector,
    encoding::{
        text, DescriptorEncoder, EncodeLabelValue, EncodeMetric, LabelValueEncoder, MetricEncoder,
    },
    metrics::{counter::ConstCounter, gauge::ConstGauge, MetricType},
    registry::Registry,
};

use dba_scrape::{write_label_value, MetricDescriptor, Sample};

use crate::format::{Format, PrometheusWrapper};

/// Label value escaped on encoding; `prometheus-client` writes label values verbatim.
#[derive(Debug)]
struct EscapedLabelValue(String);

impl EncodeLabelValue for EscapedLabelValue {
    fn encode(&self, encoder: &mut LabelValueEncoder<'_>) -> fmt::Result {
        write_label_value(encoder, &self.0)
    }
}

type Labels = Vec<(String, EscapedLabelValue)>;

#[derive(Debug)]
struct MetricGroup {
    descriptor: Arc<MetricDescriptor>,
    samples: Vec<(Labels, f64)>,
}

/// Collector grouping samples by metric, so that each metric is described once.
///
/// Metrics are encoded in the lexicographic order of their names; samples of a metric keep
/// the order in which they were pushed.
#[derive(Debug, Default)]
pub(crate) struct SampleCollector {
    groups: BTreeMap<String, MetricGroup>,
}

impl SampleCollector {
    pub(crate) fn push(&mut self, sample: &Sample) {
        let descriptor = sample.descriptor();
        let group = self
            .groups
            .entry(descriptor.name().to_owned())
            .or_insert_with(|| MetricGroup {
                descriptor: descriptor.clone(),
                samples: vec![],
            });

        let labels = sample
            .labels()
            .map(|(name, value)| (name.to_owned(), EscapedLabelValue(value.to_owned())))
            .collect::<Labels>();
        if labels.is_empty() {
            // A metric without labels has a single value; the last reported one wins.
            group.samples.clear();
        }
        group.samples.push((labels, sample.value()));
    }

    /// Encodes all collected samples in the specified format.
    pub(crate) fn encode_text<W: fmt::Write>(self, writer: &mut W, format: Format) -> fmt::Result {
        let mut registry = Registry::default();
        registry.register_collector(Box::new(self));

        match format {
            Format::OpenMetrics => text::encode(writer, &registry),
            Format::Prometheus | Format::OpenMetricsForPrometheus => {
                let remove_eof_terminator = matches!(format, Format::Prometheus);
                let mut wrapper = PrometheusWrapper::new(writer, remove_eof_terminator);
                text::encode(&mut wrapper, &registry)?;
                wrapper.flush()
            }
        }
    }
}

impl FromIterator<Sample> for SampleCollector {
    fn from_iter<I: IntoIterator<Item = Sample>>(iter: I) -> Self {
        let mut collector = Self::default();
        for sample in iter {
            collector.push(&sample);
        }
        collector
    }
}

fn encode_value(metric_type: MetricType, value: f64, encoder: MetricEncoder<'_>) -> fmt::Result {
    match metric_type {
        MetricType::Counter => ConstCounter::new(value).encode(encoder),
        _ => ConstGauge::new(value).encode(encoder),
    }
}

impl Collector for SampleCollector {
    fn encode(&self, mut encoder: DescriptorEncoder<'_>) -> fmt::Result {
        for group in self.groups.values() {
            let descriptor = &group.descriptor;
            let metric_type = descriptor.metric_type();
            let mut metric_encoder = encoder.encode_descriptor(
                descriptor.name(),
                descriptor.help(),
                None,
                metric_type,
            )?;

            if descriptor.label_names().is_empty() {
                if let Some((_, value)) = group.samples.last() {
                    encode_value(metric_type, *value, metric_encoder)?;
                }
            } else {
                for (labels, value) in &group.samples {
                    let family_encoder = metric_encoder.encode_family(labels)?;
                    encode_value(metric_type, *value, family_encoder)?;
                }
            }
        }
        Ok(())
    }
}
