//! Queue message payloads: the SNS notification envelope and the feed event
//! it carries.

use serde::{Deserialize, Serialize};
use std::fmt;
use synchrofeed_sdk::VersionUtil;
use thiserror::Error;

/// Kind of change a feed reported.
///
/// Kinds are matched exactly against the lower-case vocabulary; any other
/// spelling (including `"Added"`) is kept verbatim in [`EventType::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    Added,
    Deleted,
    Deployed,
    Promoted,
    Purged,
    Process,
    Other(String),
}

impl EventType {
    pub fn as_str(&self) -> &str {
        match self {
            EventType::Added => "added",
            EventType::Deleted => "deleted",
            EventType::Deployed => "deployed",
            EventType::Promoted => "promoted",
            EventType::Purged => "purged",
            EventType::Process => "process",
            EventType::Other(raw) => raw,
        }
    }
}

impl From<String> for EventType {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "added" => EventType::Added,
            "deleted" => EventType::Deleted,
            "deployed" => EventType::Deployed,
            "promoted" => EventType::Promoted,
            "purged" => EventType::Purged,
            "process" => EventType::Process,
            _ => EventType::Other(raw),
        }
    }
}

impl From<EventType> for String {
    fn from(event: EventType) -> Self {
        event.as_str().to_string()
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A change notification raised by a package feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedEvent {
    #[serde(alias = "Event")]
    pub event: EventType,

    #[serde(alias = "Feed")]
    pub feed: String,

    #[serde(alias = "Package")]
    pub package: String,

    #[serde(alias = "Version")]
    pub version: String,

    #[serde(default, alias = "PackageType", skip_serializing_if = "Option::is_none")]
    pub package_type: Option<String>,

    #[serde(default, alias = "PackageUrl", skip_serializing_if = "Option::is_none")]
    pub package_url: Option<String>,

    #[serde(default, alias = "Hash", skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,

    #[serde(default, alias = "User", skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl FeedEvent {
    pub fn is_prerelease(&self) -> bool {
        VersionUtil::is_prerelease(&self.version)
    }

    /// Parse a raw queue message body: SNS envelope first, then the event.
    pub fn from_message_body(body: &str) -> Result<Self, MessageFormatError> {
        let envelope = SnsEnvelope::parse(body)?;
        let payload = envelope.payload()?;
        serde_json::from_str(payload).map_err(MessageFormatError::InvalidFeedEvent)
    }
}

/// The SNS notification wrapper around every queue message.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SnsEnvelope {
    #[serde(default, rename = "Type")]
    pub message_type: Option<String>,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub topic_arn: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub signature_version: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default, rename = "SigningCertURL")]
    pub signing_cert_url: Option<String>,
    #[serde(default, rename = "UnsubscribeURL")]
    pub unsubscribe_url: Option<String>,
}

const NOTIFICATION: &str = "Notification";

impl SnsEnvelope {
    pub fn parse(body: &str) -> Result<Self, MessageFormatError> {
        let envelope: SnsEnvelope =
            serde_json::from_str(body).map_err(MessageFormatError::InvalidEnvelope)?;
        match envelope.message_type.as_deref() {
            Some(NOTIFICATION) => Ok(envelope),
            other => Err(MessageFormatError::UnsupportedEnvelopeType(
                other.unwrap_or("<missing>").to_string(),
            )),
        }
    }

    /// The notification text.
    pub fn payload(&self) -> Result<&str, MessageFormatError> {
        self.message.as_deref().ok_or(MessageFormatError::MissingPayload)
    }
}

/// Why a queue message body could not be turned into a [`FeedEvent`].
#[derive(Debug, Error)]
pub enum MessageFormatError {
    #[error("message body is not a JSON notification envelope")]
    InvalidEnvelope(#[source] serde_json::Error),

    #[error("unsupported envelope type '{0}'")]
    UnsupportedEnvelopeType(String),

    #[error("notification envelope has no Message")]
    MissingPayload,

    #[error("notification Message is not a valid feed event")]
    InvalidFeedEvent(#[source] serde_json::Error),
}

#[cfg(test)]
pub(crate) fn sns_body(event_json: &str) -> String {
    serde_json::json!({
        "Type": "Notification",
        "MessageId": "5a0e1f3c-0000-4000-8000-000000000001",
        "TopicArn": "arn:aws:sns:us-east-1:123456789012:feed-events",
        "Message": event_json,
        "Timestamp": "2024-05-01T12:00:00.000Z",
        "SignatureVersion": "1",
        "Signature": "c2lnbmF0dXJl",
        "SigningCertURL": "https://sns.us-east-1.amazonaws.com/cert.pem",
        "UnsubscribeURL": "https://sns.us-east-1.amazonaws.com/?Action=Unsubscribe"
    })
    .to_string()
}
