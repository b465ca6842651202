//! Producer side of a streaming session.

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// The session has ended; nothing more will be written.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("streaming session closed")]
pub struct SessionClosed;

/// A value in transit, acknowledged once the writer has taken it.
pub(crate) struct Handoff<T> {
    pub(crate) value: T,
    pub(crate) ack: oneshot::Sender<()>,
}

/// Sends values to one streaming session.
///
/// The session ends its drain phase once every clone has been dropped.
pub struct Publisher<T> {
    tx: mpsc::Sender<Handoff<T>>,
}

impl<T> Clone for Publisher<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T: Send> Publisher<T> {
    pub(crate) fn new(tx: mpsc::Sender<Handoff<T>>) -> Self {
        Self { tx }
    }

    /// Hand a value to the writer.
    ///
    /// Resolves once the writer has taken the value, so a producer never runs
    /// ahead of the client. Fails if the session is over.
    pub async fn send(&self, value: T) -> Result<(), SessionClosed> {
        let (ack, acked) = oneshot::channel();
        self.tx
            .send(Handoff { value, ack })
            .await
            .map_err(|_| SessionClosed)?;
        acked.await.map_err(|_| SessionClosed)
    }

    /// True once the session has ended.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves when the session ends.
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}
