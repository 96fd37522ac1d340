//! Bounded batch emission shared by the playlist parsers

use async_trait::async_trait;
use tracing::trace;

use crate::errors::AppResult;
use crate::models::Channel;

pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Receiver of parsed channel batches
///
/// Returning an error stops the parse; the error is handed back to whoever
/// started it. Cancellation is reported this way.
#[async_trait]
pub trait ChannelSink: Send {
    async fn accept(&mut self, batch: Vec<Channel>) -> AppResult<()>;
}

/// Counts reported by a finished parse
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseSummary {
    pub channels: usize,
    pub batches: usize,
}

/// Accumulates channels and hands them to a sink in groups of `batch_size`
pub struct ChannelBatcher<'a, S: ChannelSink + ?Sized> {
    sink: &'a mut S,
    buffer: Vec<Channel>,
    batch_size: usize,
    summary: ParseSummary,
}

impl<'a, S: ChannelSink + ?Sized> ChannelBatcher<'a, S> {
    pub fn new(sink: &'a mut S, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            sink,
            buffer: Vec::with_capacity(batch_size),
            batch_size,
            summary: ParseSummary::default(),
        }
    }

    pub async fn push(&mut self, channel: Channel) -> AppResult<()> {
        self.buffer.push(channel);
        if self.buffer.len() >= self.batch_size {
            self.flush().await?;
        }
        Ok(())
    }

    /// Emit the remainder, if any, and report totals
    pub async fn finish(mut self) -> AppResult<ParseSummary> {
        if !self.buffer.is_empty() {
            self.flush().await?;
        }
        Ok(self.summary)
    }

    async fn flush(&mut self) -> AppResult<()> {
        let batch = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.batch_size));
        let size = batch.len();
        self.sink.accept(batch).await?;
        self.summary.channels += size;
        self.summary.batches += 1;
        trace!("Emitted batch {} ({} channels)", self.summary.batches, size);
        Ok(())
    }
}

/// Sink keeping every batch in memory
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub batches: Vec<Vec<Channel>>,
}

impl CollectingSink {
    pub fn channels(&self) -> Vec<&Channel> {
        self.batches.iter().flatten().collect()
    }
}

#[async_trait]
impl ChannelSink for CollectingSink {
    async fn accept(&mut self, batch: Vec<Channel>) -> AppResult<()> {
        self.batches.push(batch);
        Ok(())
    }
}
