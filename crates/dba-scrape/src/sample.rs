//! Metric samples.

use std::{fmt, sync::Arc};

use crate::{descriptors::MetricDescriptor, error::ScanError};

/// Single observation for a metric: label values and a numeric value.
///
/// The number of label values always matches the number of labels in the referenced descriptor.
#[derive(Debug, Clone)]
pub struct Sample {
    descriptor: Arc<MetricDescriptor>,
    label_values: Vec<String>,
    value: f64,
}

impl Sample {
    /// Creates a sample.
    ///
    /// # Errors
    ///
    /// Returns an error if the number of label values differs from the number of labels
    /// in the `descriptor`.
    pub fn new(
        descriptor: Arc<MetricDescriptor>,
        label_values: Vec<String>,
        value: f64,
    ) -> Result<Self, ScanError> {
        let expected = descriptor.label_names().len();
        if label_values.len() != expected {
            return Err(ScanError::LabelArity {
                metric: descriptor.name().to_owned(),
                expected,
                actual: label_values.len(),
            });
        }
        Ok(Self {
            descriptor,
            label_values,
            value,
        })
    }

    /// Returns the descriptor of the metric this sample belongs to.
    pub fn descriptor(&self) -> &Arc<MetricDescriptor> {
        &self.descriptor
    }

    /// Returns label values in the order of the descriptor labels.
    pub fn label_values(&self) -> &[String] {
        &self.label_values
    }

    /// Returns label name / value pairs in the order of the descriptor labels.
    pub fn labels(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.descriptor
            .label_names()
            .iter()
            .zip(&self.label_values)
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Returns the sample value.
    pub fn value(&self) -> f64 {
        self.value
    }
}

/// Writes a label value escaped as required by the Prometheus and OpenMetrics text formats:
/// backslashes, double quotes and line feeds are escaped.
///
/// # Errors
///
/// Propagates errors of the `writer`.
pub fn write_label_value<W: fmt::Write + ?Sized>(writer: &mut W, value: &str) -> fmt::Result {
    for ch in value.chars() {
        match ch {
            '\\' => writer.write_str(r"\\")?,
            '"' => writer.write_str("\\\"")?,
            '\n' => writer.write_str(r"\n")?,
            _ => writer.write_char(ch)?,
        }
    }
    Ok(())
}

/// Formats the sample as a line of the Prometheus text format, e.g. `metric{label="value"} 1`.
impl fmt::Display for Sample {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.descriptor.name())?;
        if !self.label_values.is_empty() {
            formatter.write_str("{")?;
            for (i, (name, value)) in self.labels().enumerate() {
                if i > 0 {
                    formatter.write_str(",")?;
                }
                write!(formatter, "{name}=\"")?;
                write_label_value(formatter, value)?;
                formatter.write_str("\"")?;
            }
            formatter.write_str("}")?;
        }
        write!(formatter, " {}", self.value)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn partitions_descriptor() -> Arc<MetricDescriptor> {
        let descriptor = MetricDescriptor::new(
            "mysql",
            "dba",
            "partitions_to_remove",
            "Partitions older than the retention window.",
            &["schema", "table", "partition", "size"],
        );
        Arc::new(descriptor.unwrap())
    }

    #[test]
    fn creating_sample() {
        let label_values = ["s1", "t1", "p20240101", "128.5"].map(String::from).to_vec();
        let sample = Sample::new(partitions_descriptor(), label_values, 1_704_067_200.0).unwrap();

        let labels: Vec<_> = sample.labels().collect();
        assert_eq!(
            labels,
            [
                ("schema", "s1"),
                ("table", "t1"),
                ("partition", "p20240101"),
                ("size", "128.5")
            ]
        );
        assert_eq!(
            sample.to_string(),
            r#"mysql_dba_partitions_to_remove{schema="s1",table="t1",partition="p20240101",size="128.5"} 1704067200"#
        );
    }

    #[test]
    fn label_arity_is_checked() {
        let label_values = vec!["app".to_owned()];
        let err = Sample::new(partitions_descriptor(), label_values, 0.0).unwrap_err();
        assert_matches!(
            err,
            ScanError::LabelArity {
                expected: 4,
                actual: 1,
                ..
            }
        );
    }

    #[test]
    fn formatting_escapes_label_values() {
        let descriptor = MetricDescriptor::new("", "", "test", "", &["name"]).unwrap();
        let label_values = vec!["a \"quoted\"\\path\n".to_owned()];
        let sample = Sample::new(Arc::new(descriptor), label_values, 0.5).unwrap();
        assert_eq!(sample.to_string(), r#"test{name="a \"quoted\"\\path\n"} 0.5"#);

        let descriptor = MetricDescriptor::new("mysql", "", "up", "", &[]).unwrap();
        let sample = Sample::new(Arc::new(descriptor), vec![], 1.0).unwrap();
        assert_eq!(sample.to_string(), "mysql_up 1");
    }
}
