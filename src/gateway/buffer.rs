// Upload buffer - retains points until the backend has acknowledged them

use std::collections::VecDeque;

use tracing::{debug, warn};

use super::PersistenceGateway;
use crate::error::TrackingError;
use crate::track::TrackPoint;

/// FIFO of points awaiting upload.
///
/// A failed batch stays at the head of the queue; nothing is dropped until
/// the gateway has accepted it.
#[derive(Debug, Clone)]
pub struct UploadBuffer {
    pending: VecDeque<TrackPoint>,
    batch_size: usize,
    /// Consecutive failed flushes, for logging
    failed_flushes: u32,
}

impl UploadBuffer {
    pub fn new(batch_size: usize) -> Self {
        UploadBuffer {
            pending: VecDeque::new(),
            batch_size: batch_size.max(1),
            failed_flushes: 0,
        }
    }

    pub fn push(&mut self, point: TrackPoint) {
        self.pending.push_back(point);
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// A full batch is waiting
    pub fn batch_ready(&self) -> bool {
        self.pending.len() >= self.batch_size
    }

    /// Drop everything (session discarded)
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Upload all pending points in batches.
    ///
    /// Returns the number of points uploaded. On failure the unsent points
    /// (including the failed batch) are kept and `UploadFailed` is returned.
    pub async fn flush<G: PersistenceGateway>(
        &mut self,
        gateway: &G,
        session_id: &str,
    ) -> Result<usize, TrackingError> {
        let mut sent = 0;
        while !self.pending.is_empty() {
            let n = self.batch_size.min(self.pending.len());
            let batch: Vec<TrackPoint> = self.pending.iter().take(n).copied().collect();

            match gateway.upload_points(session_id, &batch).await {
                Ok(()) => {
                    self.pending.drain(..n);
                    self.failed_flushes = 0;
                    sent += n;
                    debug!(session = session_id, points = n, "Uploaded point batch");
                }
                Err(e) => {
                    self.failed_flushes += 1;
                    warn!(
                        session = session_id,
                        pending = self.pending.len(),
                        attempts = self.failed_flushes,
                        error = %e,
                        "Point upload failed, keeping points for retry"
                    );
                    return Err(TrackingError::UploadFailed {
                        pending: self.pending.len(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        Ok(sent)
    }
}
