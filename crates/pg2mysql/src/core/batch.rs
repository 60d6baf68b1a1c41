//! Batched delivery of result rows from a reading adapter to an engine.
//!
//! The reader fills batches of at most `batch_size` rows and sends them over
//! a bounded channel, so at most a few batches of a table are buffered at
//! any time.

use tokio::sync::mpsc;

use crate::core::value::SqlValue;
use crate::error::{MigrateError, Result};

/// Batches in flight between reader and writer.
pub const BATCH_CHANNEL_CAPACITY: usize = 2;

pub type RowBatchSender = mpsc::Sender<Vec<Vec<SqlValue>>>;
pub type RowBatchReceiver = mpsc::Receiver<Vec<Vec<SqlValue>>>;

/// Bounded channel for row batches.
pub fn row_batch_channel() -> (RowBatchSender, RowBatchReceiver) {
    mpsc::channel(BATCH_CHANNEL_CAPACITY)
}

/// Collects rows and sends them in fixed-size batches.
pub struct RowBatcher {
    tx: RowBatchSender,
    batch: Vec<Vec<SqlValue>>,
    batch_size: usize,
    total: u64,
}

impl RowBatcher {
    pub fn new(tx: RowBatchSender, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            tx,
            batch: Vec::with_capacity(batch_size),
            batch_size,
            total: 0,
        }
    }

    /// Add a row, sending the batch once it is full.
    pub async fn push(&mut self, row: Vec<SqlValue>) -> Result<()> {
        self.batch.push(row);
        self.total += 1;
        if self.batch.len() >= self.batch_size {
            self.flush().await?;
        }
        Ok(())
    }

    /// Send the last partial batch and return the number of rows sent.
    pub async fn finish(mut self) -> Result<u64> {
        self.flush().await?;
        Ok(self.total)
    }

    async fn flush(&mut self) -> Result<()> {
        if self.batch.is_empty() {
            return Ok(());
        }
        let batch = std::mem::replace(&mut self.batch, Vec::with_capacity(self.batch_size));
        self.tx
            .send(batch)
            .await
            .map_err(|_| MigrateError::StreamClosed)
    }
}
