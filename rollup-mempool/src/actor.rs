//! Background recorder of rejected submissions
//!
//! Submission paths never wait on the audit write. They hand a
//! [`FailedTransaction`] to [`FailRecorderHandle::record`], which does a
//! non-blocking send into a bounded mailbox; the recorder task drains it
//! into the ledger store.
//!
//! ```text
//! submit() ──try_send──▶ mpsc (bounded) ──▶ FailRecorder task ──▶ LedgerStore::insert_fail_tx
//! ```
//!
//! A full mailbox, a closed mailbox, or a store error is logged and
//! dropped; none of them reaches the submitter.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};
use crate::storage::LedgerStore;
use crate::types::FailedTransaction;

/// Message sent to the recorder
#[derive(Debug)]
pub enum FailMessage {
    /// Persist a failure record
    Record(Box<FailedTransaction>),

    /// Reply once every earlier record is written
    Flush {
        /// Completion signal
        response: oneshot::Sender<()>,
    },

    /// Stop after draining the mailbox
    Shutdown,
}

/// Task writing failure records
pub struct FailRecorder {
    store: Arc<dyn LedgerStore>,
    mailbox: mpsc::Receiver<FailMessage>,
}

impl std::fmt::Debug for FailRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailRecorder").finish_non_exhaustive()
    }
}

impl FailRecorder {
    /// Create over a store and mailbox
    pub fn new(store: Arc<dyn LedgerStore>, mailbox: mpsc::Receiver<FailMessage>) -> Self {
        Self { store, mailbox }
    }

    /// Run until shutdown or until every handle is dropped
    pub async fn run(mut self) {
        while let Some(msg) = self.mailbox.recv().await {
            match msg {
                FailMessage::Record(fail_tx) => self.write(&fail_tx),
                FailMessage::Flush { response } => {
                    let _ = response.send(());
                }
                FailMessage::Shutdown => {
                    self.mailbox.close();
                    while let Ok(FailMessage::Record(fail_tx)) = self.mailbox.try_recv() {
                        self.write(&fail_tx);
                    }
                    break;
                }
            }
        }
        tracing::debug!("Fail recorder stopped");
    }

    fn write(&self, fail_tx: &FailedTransaction) {
        if let Err(e) = self.store.insert_fail_tx(fail_tx) {
            tracing::error!(
                tx_hash = %fail_tx.tx_hash,
                tx_type = fail_tx.tx_type,
                error = %e,
                "Failed to persist failure record"
            );
        }
    }
}

/// Handle for sending records to the recorder
#[derive(Debug, Clone)]
pub struct FailRecorderHandle {
    sender: mpsc::Sender<FailMessage>,
}

impl FailRecorderHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<FailMessage>) -> Self {
        Self { sender }
    }

    /// Queue a failure record without waiting
    pub fn record(&self, fail_tx: FailedTransaction) {
        match self.sender.try_send(FailMessage::Record(Box::new(fail_tx))) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(FailMessage::Record(fail_tx))) => {
                tracing::warn!(tx_hash = %fail_tx.tx_hash, "Fail recorder mailbox full, record dropped");
            }
            Err(mpsc::error::TrySendError::Closed(FailMessage::Record(fail_tx))) => {
                tracing::warn!(tx_hash = %fail_tx.tx_hash, "Fail recorder stopped, record dropped");
            }
            Err(_) => {}
        }
    }

    /// Wait until every record queued so far is written
    pub async fn flush(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(FailMessage::Flush { response: tx })
            .await
            .map_err(|_| Error::Concurrency("Fail recorder mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))
    }

    /// Stop the recorder after it drains the mailbox
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(FailMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Fail recorder mailbox closed".to_string()))
    }
}

/// Spawn the recorder task
pub fn spawn_fail_recorder(store: Arc<dyn LedgerStore>, mailbox_capacity: usize) -> FailRecorderHandle {
    let (tx, rx) = mpsc::channel(mailbox_capacity.max(1));
    let recorder = FailRecorder::new(store, rx);

    tokio::spawn(async move {
        recorder.run().await;
    });

    FailRecorderHandle::new(tx)
}
