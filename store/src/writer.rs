use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time;

use crate::backend::Backend;
use crate::error::StoreError;
use crate::queries;
use crate::types::RequestRecord;

const CHANNEL_CAPACITY: usize = 256;
const MAX_BATCH: usize = 50;
const IDLE_FLUSH: Duration = Duration::from_secs(1);

enum Msg {
    Record(RequestRecord),
    Close(oneshot::Sender<()>),
}

/// Handle to the background batched writer.
///
/// Cloning is cheap; every clone shares the same channel and background task.
#[derive(Clone)]
pub struct WriteHandle {
    tx: mpsc::Sender<Msg>,
}

impl WriteHandle {
    pub fn spawn(backend: Arc<Backend>) -> Self {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(run(backend, rx));
        Self { tx }
    }

    /// Enqueues a record for the background writer. If the channel is full the
    /// record is inserted synchronously instead of being dropped or blocking
    /// indefinitely — back-pressure must be visible to the caller as latency,
    /// never as silent data loss.
    pub async fn enqueue(&self, record: RequestRecord, backend: &Backend) -> Result<(), StoreError> {
        match self.tx.try_send(Msg::Record(record)) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(Msg::Record(record))) => {
                tracing::warn!("accounting writer channel full, inserting synchronously");
                queries::insert_request(backend, &record).await
            }
            Err(mpsc::error::TrySendError::Full(Msg::Close(_))) => unreachable!(),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(StoreError::WriterGone),
        }
    }

    /// Flushes any buffered records and waits for the writer task to exit.
    pub async fn close(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Msg::Close(done_tx)).await.is_ok() {
            let _ = done_rx.await;
        }
    }
}

async fn run(backend: Arc<Backend>, mut rx: mpsc::Receiver<Msg>) {
    let mut batch = Vec::with_capacity(MAX_BATCH);
    loop {
        let first = time::timeout(IDLE_FLUSH, rx.recv()).await;
        let msg = match first {
            Ok(Some(msg)) => msg,
            Ok(None) => break,
            Err(_) => {
                flush(&backend, &mut batch).await;
                continue;
            }
        };
        match msg {
            Msg::Record(r) => {
                batch.push(r);
                if batch.len() >= MAX_BATCH {
                    flush(&backend, &mut batch).await;
                }
            }
            Msg::Close(done) => {
                flush(&backend, &mut batch).await;
                let _ = done.send(());
                break;
            }
        }
    }
    flush(&backend, &mut batch).await;
}

async fn flush(backend: &Backend, batch: &mut Vec<RequestRecord>) {
    if batch.is_empty() {
        return;
    }
    if let Err(e) = queries::insert_requests_batch(backend, batch).await {
        tracing::error!(error = %e, count = batch.len(), "failed to flush accounting batch");
    }
    batch.clear();
}
