//! Upload progress reporting.
//!
//! Progress is advisory observability output, decoupled from the copy loop's
//! correctness: observations are emitted as tracing events and never block
//! the transfer.

use tracing::{debug, info};

/// Aggregates bytes written for one file transfer and emits progress
/// observations.
///
/// Bytes-read is monotonically non-decreasing. When the expected total is
/// known and reached, a terminal "complete" event is emitted exactly once;
/// for streams of unknown length, [`ProgressTracker::finish`] emits it at
/// end of part.
#[derive(Debug)]
pub struct ProgressTracker {
    file_name: String,
    total_size: Option<u64>,
    bytes_read: u64,
    completed: bool,
}

impl ProgressTracker {
    pub fn new(file_name: &str, total_size: Option<u64>) -> Self {
        Self {
            file_name: file_name.to_string(),
            total_size,
            bytes_read: 0,
            completed: false,
        }
    }

    /// Record `n` more bytes written and emit an observation.
    pub fn observe(&mut self, n: usize) {
        self.bytes_read += n as u64;

        match self.total_size {
            Some(total) if total > 0 => {
                debug!(
                    file_name = %self.file_name,
                    bytes_read = self.bytes_read,
                    total_size = total,
                    percent = self.bytes_read * 100 / total,
                    "upload progress"
                );
                if self.bytes_read >= total {
                    self.emit_complete();
                }
            }
            _ => {
                debug!(
                    file_name = %self.file_name,
                    bytes_read = self.bytes_read,
                    "upload progress (total size unknown)"
                );
            }
        }
    }

    /// Mark the transfer finished. Emits the terminal event if the total was
    /// unknown or never reached.
    pub fn finish(&mut self) {
        self.emit_complete();
    }

    fn emit_complete(&mut self) {
        if self.completed {
            return;
        }
        self.completed = true;
        info!(
            file_name = %self.file_name,
            bytes_read = self.bytes_read,
            "upload complete"
        );
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    pub fn is_complete(&self) -> bool {
        self.completed
    }
}
