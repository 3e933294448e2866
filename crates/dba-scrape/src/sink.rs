//! Bounded channel transporting samples from scrapers to the consumer.
//!
//! The channel applies backpressure: a scraper waits in [`SampleSink::send()`] until the consumer
//! catches up. Thus, the [`SampleStream`] must be drained concurrently with the scrape pass.

use tokio::sync::mpsc;

use crate::{error::ScrapeError, sample::Sample};

/// Creates a sample channel with the specified capacity. Zero capacity is treated as 1.
pub fn channel(capacity: usize) -> (SampleSink, SampleStream) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (SampleSink { sender }, SampleStream { receiver })
}

/// Sending half of a sample channel. Can be cloned and shared among scrapers.
#[derive(Debug, Clone)]
pub struct SampleSink {
    sender: mpsc::Sender<Sample>,
}

impl SampleSink {
    /// Sends a sample, waiting for channel capacity if necessary.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::SinkClosed`] if the [`SampleStream`] was dropped.
    pub async fn send(&self, sample: Sample) -> Result<(), ScrapeError> {
        self.sender
            .send(sample)
            .await
            .map_err(|_| ScrapeError::SinkClosed)
    }

    /// Checks whether the receiving half was dropped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Receiving half of a sample channel. Terminates once all [`SampleSink`]s are dropped.
#[derive(Debug)]
pub struct SampleStream {
    receiver: mpsc::Receiver<Sample>,
}

impl SampleStream {
    /// Receives the next sample. Returns `None` once all sinks are dropped and buffered samples
    /// are consumed.
    pub async fn recv(&mut self) -> Option<Sample> {
        self.receiver.recv().await
    }

    /// Receives all samples until the channel is closed.
    pub async fn collect_all(mut self) -> Vec<Sample> {
        let mut samples = vec![];
        while let Some(sample) = self.receiver.recv().await {
            samples.push(sample);
        }
        samples
    }
}
