use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use shoelink_frame::ChannelName;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::{PeerError, Result};

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

#[derive(Debug, Default)]
struct QueueState {
    busy: AtomicBool,
    pending: AtomicUsize,
}

/// FIFO executor for one channel's operations.
///
/// At most one operation runs at a time, in submission order. An operation
/// is submitted when [`OperationQueue::enqueue`] is called, not when its
/// result is awaited; dropping the returned future does not cancel it.
/// A failing or panicking operation does not stall the ones behind it.
///
/// Must be created inside a Tokio runtime.
#[derive(Debug)]
pub struct OperationQueue {
    channel: ChannelName,
    tx: mpsc::UnboundedSender<Job>,
    state: Arc<QueueState>,
}

impl OperationQueue {
    pub fn new(channel: ChannelName) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(QueueState::default());
        tokio::spawn(drain(channel.clone(), rx, Arc::clone(&state)));
        Self { channel, tx, state }
    }

    /// Submit `op` and get a future resolving to its outcome.
    pub fn enqueue<T, F>(&self, op: F) -> impl Future<Output = Result<T>> + Send + 'static
    where
        T: Send + 'static,
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            // Caller may have stopped waiting; the operation still ran.
            let _ = done_tx.send(op.await);
        });

        self.state.pending.fetch_add(1, Ordering::SeqCst);
        let accepted = self.tx.send(job).is_ok();
        if !accepted {
            self.state.pending.fetch_sub(1, Ordering::SeqCst);
        }

        let channel = self.channel.clone();
        async move {
            if !accepted {
                return Err(PeerError::Internal(format!(
                    "operation queue for {channel} is closed"
                )));
            }
            done_rx.await.unwrap_or_else(|_| {
                Err(PeerError::Internal(format!(
                    "operation on {channel} aborted"
                )))
            })
        }
    }

    /// Whether an operation is executing right now.
    pub fn is_busy(&self) -> bool {
        self.state.busy.load(Ordering::SeqCst)
    }

    /// Operations submitted but not yet started.
    pub fn pending(&self) -> usize {
        self.state.pending.load(Ordering::SeqCst)
    }
}

async fn drain(channel: ChannelName, mut rx: mpsc::UnboundedReceiver<Job>, state: Arc<QueueState>) {
    while let Some(job) = rx.recv().await {
        state.pending.fetch_sub(1, Ordering::SeqCst);
        state.busy.store(true, Ordering::SeqCst);
        // Own task so a panic surfaces as a JoinError instead of killing the loop.
        if let Err(err) = tokio::spawn(job).await {
            warn!(channel = %channel, error = %err, "operation aborted");
        }
        state.busy.store(false, Ordering::SeqCst);
    }
    debug!(channel = %channel, "operation queue closed");
}
