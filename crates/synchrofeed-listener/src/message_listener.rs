// MessageListener: the polling loop run on the dedicated listener thread.
//
// Long-polls the queue, hands each message to the MessageProcessor, then
// deletes it whatever the outcome. Exits when the stop token is observed.

use crate::message_processor::MessageProcessor;
use crate::queue_client::{QueueAddress, QueueClient, QueueMessage};

use std::sync::Arc;
use std::time::Duration;
use synchrofeed_common::constants::RECEIVE_WAIT_TIME;
use synchrofeed_common::SyncBridge;
use synchrofeed_sdk::TraceWriter;
use tokio_util::sync::CancellationToken;

/// What happens to a message once it has been processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletePolicy {
    Delete,
    /// Leave every message on the queue (`retain-messages` builds).
    Retain,
}

impl Default for DeletePolicy {
    fn default() -> Self {
        if cfg!(feature = "retain-messages") {
            DeletePolicy::Retain
        } else {
            DeletePolicy::Delete
        }
    }
}

/// Counters kept across the life of one polling loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerStats {
    pub polls: u64,
    pub receive_failures: u64,
    pub received: u64,
    pub processed: u64,
    pub deleted: u64,
    pub delete_failures: u64,
    /// Messages received after stop was requested and left on the queue.
    pub abandoned: u64,
}

impl std::fmt::Display for ListenerStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "polls={} receive_failures={} received={} processed={} deleted={} delete_failures={} abandoned={}",
            self.polls,
            self.receive_failures,
            self.received,
            self.processed,
            self.deleted,
            self.delete_failures,
            self.abandoned
        )
    }
}

pub struct MessageListener {
    bridge: SyncBridge,
    client: Arc<dyn QueueClient>,
    queue: QueueAddress,
    processor: MessageProcessor,
    delete_policy: DeletePolicy,
    wait: Duration,
    max_messages: Option<i32>,
    trace: Arc<dyn TraceWriter>,
}

impl MessageListener {
    pub fn new(
        bridge: SyncBridge,
        client: Arc<dyn QueueClient>,
        queue: QueueAddress,
        processor: MessageProcessor,
        trace: Arc<dyn TraceWriter>,
    ) -> Self {
        Self {
            bridge,
            client,
            queue,
            processor,
            delete_policy: DeletePolicy::default(),
            wait: RECEIVE_WAIT_TIME,
            max_messages: None,
            trace,
        }
    }

    pub fn with_delete_policy(mut self, policy: DeletePolicy) -> Self {
        self.delete_policy = policy;
        self
    }

    pub fn with_max_messages(mut self, max_messages: Option<i32>) -> Self {
        self.max_messages = max_messages;
        self
    }

    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    pub fn queue(&self) -> &QueueAddress {
        &self.queue
    }

    /// Poll until `stop` is cancelled. An in-flight receive is not
    /// interrupted; its batch is left on the queue.
    pub fn run(&self, stop: &CancellationToken) -> ListenerStats {
        let mut stats = ListenerStats::default();
        // Log "waiting" on the first poll and after any poll that got work.
        let mut received_last = true;

        while !stop.is_cancelled() {
            if received_last {
                self.trace.info("Waiting for messages from queue");
            }
            received_last = false;
            stats.polls += 1;

            let batch = match self.bridge.run_sync(self.client.receive_messages(
                &self.queue,
                self.wait,
                self.max_messages,
            )) {
                Ok(batch) => batch,
                Err(e) => {
                    stats.receive_failures += 1;
                    self.trace
                        .error(&format!("Error receiving messages from {}: {}", self.queue, e));
                    continue;
                }
            };

            if batch.is_empty() {
                continue;
            }

            if stop.is_cancelled() {
                stats.abandoned += batch.len() as u64;
                self.trace.info(&format!(
                    "Stop requested; leaving {} message(s) on the queue",
                    batch.len()
                ));
                break;
            }

            received_last = true;
            stats.received += batch.len() as u64;
            self.trace
                .verbose(&format!("Received {} message(s)", batch.len()));

            for message in &batch {
                self.processor.process(&self.bridge, message);
                stats.processed += 1;
                if self.delete_policy == DeletePolicy::Delete {
                    self.delete(message, &mut stats);
                }
            }
        }

        stats
    }

    fn delete(&self, message: &QueueMessage, stats: &mut ListenerStats) {
        self.trace
            .verbose(&format!("Deleting message: {}", message.receipt_handle));
        match self
            .bridge
            .run_sync(self.client.delete_message(&self.queue, &message.receipt_handle))
        {
            Ok(()) => {
                stats.deleted += 1;
                self.trace
                    .verbose(&format!("Deleted message: {}", message.id));
            }
            Err(e) => {
                stats.delete_failures += 1;
                self.trace.warning(&format!(
                    "Unable to delete message {}: {}. Ignoring.",
                    message.receipt_handle, e
                ));
            }
        }
    }
}
