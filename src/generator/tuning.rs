//! Output tuning, applied to generated sinks through a visitor.

use snafu::ResultExt;

use super::{
    GeneratorError, InvalidMaxWriteSnafu,
    elements::{Acknowledgements, Batch, Buffer, Request, Sink},
};
use crate::{
    api::{DeliveryMode, OutputSpec},
    quantity,
};

/// Smallest disk buffer the collector accepts.
pub const MIN_DISK_BUFFER_BYTES: i64 = 268_435_488;

/// Mutates the tunable blocks of a generated sink in place.
pub trait Strategy {
    fn visit_sink(&self, sink: &mut Sink);
    fn visit_batch(&self, batch: &mut Batch);
    fn visit_request(&self, request: &mut Request);
    fn visit_buffer(&self, buffer: &mut Buffer);
    fn visit_acknowledgements(&self) -> Option<Acknowledgements>;

    /// Visits `sink` and every block it opened.
    fn apply(&self, sink: &mut Sink) {
        self.visit_sink(sink);
        if let Some(batch) = sink.batch.as_mut() {
            self.visit_batch(batch);
        }
        if let Some(buffer) = sink.buffer.as_mut() {
            self.visit_buffer(buffer);
        }
        if let Some(request) = sink.request.as_mut() {
            self.visit_request(request);
        }
        sink.acknowledgements = self.visit_acknowledgements();
    }
}

/// The tuning an output asked for, resolved to concrete values.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OutputTuning {
    pub delivery: Option<DeliveryMode>,
    pub compression: Option<String>,
    pub max_write: Option<u64>,
    pub min_retry_duration: Option<u64>,
    pub max_retry_duration: Option<u64>,
}

impl OutputTuning {
    pub fn new(output: &OutputSpec) -> Result<Self, GeneratorError> {
        let Some(spec) = output.tuning() else {
            return Ok(Self::default());
        };
        let max_write = spec
            .max_write
            .as_ref()
            .map(quantity::to_bytes)
            .transpose()
            .context(InvalidMaxWriteSnafu {
                output: output.name.as_str(),
            })?;
        Ok(Self {
            delivery: spec.delivery,
            compression: spec.compression.clone(),
            max_write,
            min_retry_duration: spec.min_retry_duration,
            max_retry_duration: spec.max_retry_duration,
        })
    }
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl Strategy for OutputTuning {
    fn visit_sink(&self, sink: &mut Sink) {
        if let Some(compression) = self.compression.as_deref().filter(|c| *c != "none") {
            sink.compression = Some(compression.to_string());
        }
    }

    fn visit_batch(&self, batch: &mut Batch) {
        if let Some(max) = self.max_write.filter(|max| *max > 0) {
            batch.max_bytes = Some(saturating_i64(max));
        }
    }

    fn visit_request(&self, request: &mut Request) {
        if let Some(min) = self.min_retry_duration.filter(|d| *d > 0) {
            request.retry_initial_backoff_secs = Some(saturating_i64(min));
        }
        if let Some(max) = self.max_retry_duration.filter(|d| *d > 0) {
            request.retry_max_duration_secs = Some(saturating_i64(max));
        }
    }

    fn visit_buffer(&self, buffer: &mut Buffer) {
        match self.delivery {
            Some(DeliveryMode::AtLeastOnce) => {
                buffer.type_ = Some("disk".into());
                buffer.when_full = Some("block".into());
                buffer.max_size = Some(MIN_DISK_BUFFER_BYTES);
            }
            Some(DeliveryMode::AtMostOnce) => {
                buffer.when_full = Some("drop_newest".into());
            }
            None => {}
        }
    }

    fn visit_acknowledgements(&self) -> Option<Acknowledgements> {
        (self.delivery == Some(DeliveryMode::AtLeastOnce)).then_some(Acknowledgements { enabled: true })
    }
}

#[cfg(test)]
mod tests {
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

    use super::*;
    use crate::api::{Http, OutputTuningSpec, OutputType};

    fn http_output(tuning: OutputTuningSpec) -> OutputSpec {
        let mut output = OutputSpec::new("web", OutputType::Http);
        output.http = Some(Http {
            url: "https://logs.example.com".into(),
            method: None,
            headers: Default::default(),
            timeout: None,
            proxy_url: None,
            authentication: None,
            tuning: Some(tuning),
        });
        output
    }

    #[test]
    fn at_least_once() {
        let tuning = OutputTuning::new(&http_output(OutputTuningSpec {
            delivery: Some(DeliveryMode::AtLeastOnce),
            compression: Some("gzip".into()),
            max_write: Some(Quantity("10Mi".into())),
            min_retry_duration: Some(5),
            max_retry_duration: Some(30),
        }))
        .unwrap();
        let mut sink = Sink::new("output_web", "http", vec![]).tunable();
        tuning.apply(&mut sink);

        assert_eq!(sink.compression.as_deref(), Some("gzip"));
        assert_eq!(sink.acknowledgements, Some(Acknowledgements { enabled: true }));
        let buffer = sink.buffer.unwrap();
        assert_eq!(buffer.when_full.as_deref(), Some("block"));
        assert_eq!(buffer.type_.as_deref(), Some("disk"));
        assert_eq!(sink.batch.unwrap().max_bytes, Some(10 * 1024 * 1024));
        let request = sink.request.unwrap();
        assert_eq!(request.retry_initial_backoff_secs, Some(5));
        assert_eq!(request.retry_max_duration_secs, Some(30));
    }

    #[test]
    fn at_most_once() {
        let tuning = OutputTuning::new(&http_output(OutputTuningSpec {
            delivery: Some(DeliveryMode::AtMostOnce),
            compression: Some("none".into()),
            ..Default::default()
        }))
        .unwrap();
        let mut sink = Sink::new("output_web", "http", vec![]).tunable();
        tuning.apply(&mut sink);

        assert_eq!(sink.compression, None);
        assert_eq!(sink.acknowledgements, None);
        assert_eq!(sink.buffer.unwrap().when_full.as_deref(), Some("drop_newest"));
    }

    #[test]
    fn closed_blocks_stay_closed() {
        let tuning = OutputTuning {
            max_write: Some(1024),
            ..Default::default()
        };
        let mut sink = Sink::new("output_syslog", "socket", vec![]);
        tuning.apply(&mut sink);
        assert_eq!(sink.batch, None);
    }
}
