//! Text exposition formats.

use std::{fmt, mem, str::FromStr};

use derive_more::{Display, Error};

/// Metrics export format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Format {
    /// [OpenMetrics text format][om], as produced by [`prometheus-client`].
    ///
    /// [om]: https://github.com/OpenObservability/OpenMetrics/blob/main/specification/OpenMetrics.md
    /// [`prometheus-client`]: https://docs.rs/prometheus-client/
    OpenMetrics,
    /// [Prometheus text format][prom]. Since it's quite similar to the OpenMetrics format, it's obtained by
    /// a streaming transform of OpenMetrics-encoded metrics that removes `_total` suffixes from
    /// reported counter values and removes the `# EOF` terminator.
    ///
    /// [prom]: https://prometheus.io/docs/instrumenting/exposition_formats/
    #[default]
    Prometheus,
    /// OpenMetrics text format as understood by Prometheus: counter values don't have
    /// the `_total` suffix, but the `# EOF` terminator is retained.
    ///
    /// See also: [issue in `prometheus-client`](https://github.com/prometheus/client_rust/issues/111)
    OpenMetricsForPrometheus,
}

impl Format {
    /// Content type for the OpenMetrics text format.
    pub const OPEN_METRICS_CONTENT_TYPE: &'static str =
        "application/openmetrics-text; version=1.0.0; charset=utf-8";
    /// Content type for the Prometheus text format.
    pub const PROMETHEUS_CONTENT_TYPE: &'static str = "text/plain; version=0.0.4; charset=utf-8";

    /// Returns the HTTP content type for this format.
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Prometheus => Self::PROMETHEUS_CONTENT_TYPE,
            Self::OpenMetrics | Self::OpenMetricsForPrometheus => Self::OPEN_METRICS_CONTENT_TYPE,
        }
    }
}

/// Error parsing a [`Format`].
#[derive(Debug, Display, Error)]
#[display(
    "unknown format; expected one of `openmetrics`, `prometheus`, `openmetrics-for-prometheus`"
)]
pub struct FormatParseError(#[error(not(source))] ());

/// Parses a lowercase format name: `openmetrics`, `prometheus` or `openmetrics-for-prometheus`.
impl FromStr for Format {
    type Err = FormatParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "openmetrics" => Ok(Self::OpenMetrics),
            "prometheus" => Ok(Self::Prometheus),
            "openmetrics-for-prometheus" => Ok(Self::OpenMetricsForPrometheus),
            _ => Err(FormatParseError(())),
        }
    }
}

#[derive(Debug)]
struct MetricTypeDefinition {
    name: String,
    is_counter: bool,
}

impl MetricTypeDefinition {
    fn parse(line: &str) -> Result<Self, fmt::Error> {
        let (name, ty) = line
            .trim()
            .split_once(|ch: char| ch.is_ascii_whitespace())
            .ok_or(fmt::Error)?;
        Ok(Self {
            name: name.to_owned(),
            is_counter: ty == "counter",
        })
    }
}

/// Writer transforming the OpenMetrics text format into the Prometheus one line by line.
#[must_use = "Must be `flush()`ed to not lose the last line"]
#[derive(Debug)]
pub(crate) struct PrometheusWrapper<'a, W> {
    writer: &'a mut W,
    remove_eof_terminator: bool,
    last_metric_definition: Option<MetricTypeDefinition>,
    last_line: String,
}

impl<'a, W: fmt::Write> PrometheusWrapper<'a, W> {
    pub(crate) fn new(writer: &'a mut W, remove_eof_terminator: bool) -> Self {
        Self {
            writer,
            remove_eof_terminator,
            last_metric_definition: None,
            last_line: String::new(),
        }
    }

    fn handle_line(&mut self) -> fmt::Result {
        let line = mem::take(&mut self.last_line);
        if line == "# EOF" && self.remove_eof_terminator {
            return Ok(());
        }
        let mut transformed_line = None;

        if let Some(type_def) = line.strip_prefix("# TYPE ") {
            self.last_metric_definition = Some(MetricTypeDefinition::parse(type_def)?);
        } else if !line.starts_with('#') {
            let name_end_pos = line
                .find(|ch: char| ch == '{' || ch.is_ascii_whitespace())
                .ok_or(fmt::Error)?;
            let (name, rest) = line.split_at(name_end_pos);

            if let Some(metric_type) = &self.last_metric_definition {
                let truncated_name = name.strip_suffix("_total");
                if truncated_name == Some(&metric_type.name) && metric_type.is_counter {
                    transformed_line = Some(format!("{}{rest}", metric_type.name));
                }
            }
        }

        let transformed_line = transformed_line.unwrap_or(line);
        writeln!(self.writer, "{transformed_line}")
    }

    pub(crate) fn flush(mut self) -> fmt::Result {
        if self.last_line.is_empty() {
            Ok(())
        } else {
            self.handle_line()
        }
    }
}

impl<W: fmt::Write> fmt::Write for PrometheusWrapper<'_, W> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let lines: Vec<_> = s.lines().collect();
        for (i, line) in lines.iter().enumerate() {
            self.last_line.push_str(line);
            if i + 1 < lines.len() || s.ends_with('\n') {
                self.handle_line()?;
            }
        }
        Ok(())
    }
}
