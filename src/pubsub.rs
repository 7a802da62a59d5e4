//! Pub/sub plumbing: subscription handles and dispatch loops.
//!
//! Two delivery modes:
//!
//! - **Broadcast** (`subscribe`): every subscriber receives every message
//!   published while it is connected. No persistence; messages published with
//!   no subscriber are lost.
//! - **List broadcast** (`subscribe_list_broadcast`): competing-consumer
//!   fanout per client id. Each registered client id gets its own list;
//!   publishing pushes the message onto every registered list, and processes
//!   sharing a client id compete on blocking pops of the same list, so
//!   exactly one of the duplicates receives each message while distinct ids
//!   each receive every message.

use std::sync::Arc;
use std::time::Duration;

use redstash_store::RemoteStore;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// How long each blocking pop waits before re-arming. Short enough that a
/// dropped subscription stops promptly.
const LIST_POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Delay before retrying after a store error in a consumer loop.
const CONSUMER_RETRY_DELAY: Duration = Duration::from_secs(1);

/// A live subscription. Delivery stops when the handle is dropped.
pub struct Subscription {
    task: JoinHandle<()>,
}

impl Subscription {
    /// Stops delivery explicitly. Equivalent to dropping the handle.
    pub fn stop(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

/// Drives a broadcast subscription: forwards each received payload to the
/// callback until the store-side stream ends or the handle drops.
pub(crate) fn spawn_dispatch<F>(
    channel: String,
    mut rx: mpsc::Receiver<String>,
    on_message: F,
) -> Subscription
where
    F: Fn(String) + Send + Sync + 'static,
{
    let task = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            on_message(payload);
        }
        debug!(pubsub.channel = %channel, "Broadcast subscription ended");
    });
    Subscription { task }
}

/// Drives a competing consumer: blocking-pops the client's list and feeds the
/// callback. Store errors are logged and retried; the loop only ends when the
/// handle drops.
pub(crate) fn spawn_list_consumer<F>(
    store: Arc<dyn RemoteStore>,
    consumer_key: String,
    on_message: F,
) -> Subscription
where
    F: Fn(String) + Send + Sync + 'static,
{
    let task = tokio::spawn(async move {
        loop {
            match store.blpop(&consumer_key, LIST_POLL_TIMEOUT).await {
                Ok(Some(payload)) => on_message(payload),
                Ok(None) => {}
                Err(e) => {
                    error!(pubsub.list = %consumer_key, error = %e, "List consumer pop failed");
                    tokio::time::sleep(CONSUMER_RETRY_DELAY).await;
                }
            }
        }
    });
    Subscription { task }
}
