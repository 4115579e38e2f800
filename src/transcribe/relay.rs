//! Audio relay: client connection → transcription input channel.

use crate::error::{Result, StockhandError};
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;

/// Forwards inbound audio frames into the session's bounded transcription
/// channel, preserving arrival order.
///
/// The channel is bounded: when the recognition backend cannot keep up,
/// `submit` waits for capacity instead of dropping frames. After
/// [`AudioRelay::close`] (or after the receiving side is gone) `submit`
/// fails with `ChannelClosed`.
pub struct AudioRelay {
    tx: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
}

impl AudioRelay {
    /// Create a relay and the receiver for its forwarding channel.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                tx: Mutex::new(Some(tx)),
            },
            rx,
        )
    }

    /// Forward one audio frame, awaiting channel capacity if the backend
    /// is behind.
    pub async fn submit(&self, frame: Vec<u8>) -> Result<()> {
        // Clone the sender out of the lock; the await must not hold it.
        let tx = {
            let guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
            guard.clone()
        };
        let Some(tx) = tx else {
            return Err(StockhandError::ChannelClosed);
        };
        if tx.send(frame).await.is_err() {
            // Receiver gone: the transcription session ended underneath us.
            self.close();
            return Err(StockhandError::ChannelClosed);
        }
        Ok(())
    }

    /// Close the forwarding channel, signalling end-of-audio. Idempotent.
    pub fn close(&self) {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// True once the relay has been closed.
    pub fn is_closed(&self) -> bool {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}
