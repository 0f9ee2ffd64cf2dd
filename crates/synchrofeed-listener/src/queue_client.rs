// Queue access: the QueueClient seam, its SQS implementation, and the
// one-shot queue resolver used at startup.

use async_trait::async_trait;
use aws_sdk_sqs::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_sqs::error::DisplayErrorContext;
use std::fmt;
use std::time::Duration;
use synchrofeed_common::{AwsSettings, AwsSqs, SyncBridge};
use synchrofeed_sdk::TraceWriter;
use thiserror::Error;

/// Provider name recorded on the static credentials.
const CREDENTIALS_PROVIDER: &str = "synchrofeed-settings";

/// One message as received from the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub id: String,
    pub body: String,
    /// Token required to delete this receipt of the message.
    pub receipt_handle: String,
}

/// The resolved queue URL. Produced once by [`QueueResolver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueAddress(String);

impl QueueAddress {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueueAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue '{name}' in region '{region}' is unavailable: {reason}")]
    QueueUnavailable {
        name: String,
        region: String,
        reason: String,
    },

    #[error("{operation} failed: {reason}")]
    Service {
        operation: &'static str,
        reason: String,
    },
}

impl QueueError {
    pub fn service(operation: &'static str, reason: impl Into<String>) -> Self {
        QueueError::Service {
            operation,
            reason: reason.into(),
        }
    }
}

/// The three queue operations the listener needs.
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Look up a queue URL by name. `Ok(None)` means the call succeeded but
    /// returned no URL.
    async fn get_queue_url(&self, name: &str) -> Result<Option<String>, QueueError>;

    /// Long-poll for up to `wait` and return whatever arrived.
    async fn receive_messages(
        &self,
        queue: &QueueAddress,
        wait: Duration,
        max_messages: Option<i32>,
    ) -> Result<Vec<QueueMessage>, QueueError>;

    async fn delete_message(&self, queue: &QueueAddress, receipt_handle: &str)
        -> Result<(), QueueError>;
}

// ---------------------------------------------------------------------------
// SQS
// ---------------------------------------------------------------------------

/// [`QueueClient`] backed by Amazon SQS with static credentials.
#[derive(Debug, Clone)]
pub struct SqsQueueClient {
    client: aws_sdk_sqs::Client,
}

impl SqsQueueClient {
    pub fn new(settings: &AwsSettings) -> Self {
        let credentials = Credentials::new(
            settings.credentials.access_key.clone(),
            settings.credentials.secret_key.clone(),
            None,
            None,
            CREDENTIALS_PROVIDER,
        );
        let config = aws_sdk_sqs::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(settings.sqs.region.clone()))
            .credentials_provider(credentials)
            .build();

        Self {
            client: aws_sdk_sqs::Client::from_conf(config),
        }
    }
}

#[async_trait]
impl QueueClient for SqsQueueClient {
    async fn get_queue_url(&self, name: &str) -> Result<Option<String>, QueueError> {
        let output = self
            .client
            .get_queue_url()
            .queue_name(name)
            .send()
            .await
            .map_err(|e| QueueError::service("GetQueueUrl", DisplayErrorContext(&e).to_string()))?;
        Ok(output.queue_url)
    }

    async fn receive_messages(
        &self,
        queue: &QueueAddress,
        wait: Duration,
        max_messages: Option<i32>,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        let wait_seconds = i32::try_from(wait.as_secs()).unwrap_or(i32::MAX);
        let output = self
            .client
            .receive_message()
            .queue_url(queue.as_str())
            .wait_time_seconds(wait_seconds)
            .set_max_number_of_messages(max_messages)
            .send()
            .await
            .map_err(|e| {
                QueueError::service("ReceiveMessage", DisplayErrorContext(&e).to_string())
            })?;

        Ok(output
            .messages
            .unwrap_or_default()
            .into_iter()
            .map(|m| QueueMessage {
                id: m.message_id.unwrap_or_default(),
                body: m.body.unwrap_or_default(),
                receipt_handle: m.receipt_handle.unwrap_or_default(),
            })
            .collect())
    }

    async fn delete_message(
        &self,
        queue: &QueueAddress,
        receipt_handle: &str,
    ) -> Result<(), QueueError> {
        self.client
            .delete_message()
            .queue_url(queue.as_str())
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| {
                QueueError::service("DeleteMessage", DisplayErrorContext(&e).to_string())
            })?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Turns the configured queue name into a [`QueueAddress`].
pub struct QueueResolver;

impl QueueResolver {
    /// One lookup, no retries. Every failure is [`QueueError::QueueUnavailable`].
    pub fn resolve(
        bridge: &SyncBridge,
        client: &dyn QueueClient,
        sqs: &AwsSqs,
        trace: &dyn TraceWriter,
    ) -> Result<QueueAddress, QueueError> {
        trace.verbose(&format!("Getting SQS queue: {}", sqs.name));
        trace.verbose(&format!("Using AWS region: {}", sqs.region));

        let unavailable = |reason: String| QueueError::QueueUnavailable {
            name: sqs.name.clone(),
            region: sqs.region.clone(),
            reason,
        };

        match bridge.run_sync(client.get_queue_url(&sqs.name)) {
            Ok(Some(url)) if !url.trim().is_empty() => {
                trace.verbose(&format!("Resolved queue URL: {url}"));
                Ok(QueueAddress::new(url))
            }
            Ok(_) => Err(unavailable("the service returned no queue URL".to_string())),
            Err(e) => Err(unavailable(e.to_string())),
        }
    }
}
