// SettingsStore: loads and validates the listener's JSON settings file.

use crate::constants::{variables, DEFAULT_AWS_REGION};

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use synchrofeed_sdk::{ActionConfig, FeedConfig};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Settings model
// ---------------------------------------------------------------------------

/// The whole settings document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListenerSettings {
    #[serde(default, alias = "feedSettings")]
    pub feed_settings: ApplicationSettings,

    #[serde(default, alias = "awsSettings")]
    pub aws_settings: AwsSettings,
}

/// Feeds and the actions bound to them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ApplicationSettings {
    #[serde(default, alias = "feeds")]
    pub feeds: Vec<FeedConfig>,

    #[serde(default, alias = "actions")]
    pub actions: Vec<ActionConfig>,
}

impl ApplicationSettings {
    /// Find a feed by name (case-insensitive).
    pub fn feed(&self, name: &str) -> Option<&FeedConfig> {
        self.feeds.iter().find(|f| f.name.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AwsSettings {
    #[serde(default, alias = "credentials")]
    pub credentials: AwsCredentials,

    #[serde(default, alias = "sqs")]
    pub sqs: AwsSqs,
}

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AwsCredentials {
    #[serde(default, alias = "accessKey")]
    pub access_key: String,

    #[serde(default, alias = "secretKey")]
    pub secret_key: String,
}

impl std::fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"***")
            .finish()
    }
}

fn default_region() -> String {
    DEFAULT_AWS_REGION.to_string()
}

/// The queue to listen on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AwsSqs {
    /// Logical queue name, resolved to a URL at startup.
    #[serde(default, alias = "name")]
    pub name: String,

    #[serde(default = "default_region", alias = "region")]
    pub region: String,

    /// Upper bound on messages per receive call (1..=10).
    #[serde(default, alias = "maxMessages", skip_serializing_if = "Option::is_none")]
    pub max_messages: Option<i32>,
}

impl Default for AwsSqs {
    fn default() -> Self {
        Self {
            name: String::new(),
            region: default_region(),
            max_messages: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings file '{}' was not found", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read settings file '{}'", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("settings file '{}' is not valid JSON", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid settings: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// SettingsStore
// ---------------------------------------------------------------------------

/// Reads [`ListenerSettings`] from one file on disk.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Load, apply environment fallbacks and validate.
    pub fn load(&self) -> Result<ListenerSettings, SettingsError> {
        self.load_with(|name| std::env::var(name).ok())
    }

    /// Like [`SettingsStore::load`], reading fallbacks through `lookup`.
    pub fn load_with<F>(&self, lookup: F) -> Result<ListenerSettings, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if !self.exists() {
            return Err(SettingsError::NotFound(self.path.clone()));
        }

        let content = fs::read_to_string(&self.path).map_err(|source| SettingsError::Read {
            path: self.path.clone(),
            source,
        })?;
        // Tolerate a UTF-8 BOM written by some editors.
        let content = content.trim_start_matches('\u{feff}');

        let mut settings: ListenerSettings =
            serde_json::from_str(content).map_err(|source| SettingsError::Parse {
                path: self.path.clone(),
                source,
            })?;

        apply_credential_fallback(&mut settings.aws_settings.credentials, &lookup);
        validate(&settings)?;
        Ok(settings)
    }
}

fn apply_credential_fallback<F>(credentials: &mut AwsCredentials, lookup: &F)
where
    F: Fn(&str) -> Option<String>,
{
    let env_value = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    if credentials.access_key.trim().is_empty() {
        if let Some(value) = env_value(variables::AWS_ACCESS_KEY_ID) {
            credentials.access_key = value;
        }
    }
    if credentials.secret_key.trim().is_empty() {
        if let Some(value) = env_value(variables::AWS_SECRET_ACCESS_KEY) {
            credentials.secret_key = value;
        }
    }
}

/// Check the settings the listener cannot run without.
pub fn validate(settings: &ListenerSettings) -> Result<(), SettingsError> {
    let aws = &settings.aws_settings;
    if aws.sqs.name.trim().is_empty() {
        return Err(SettingsError::Invalid("AwsSettings.Sqs.Name is required".into()));
    }
    if aws.sqs.region.trim().is_empty() {
        return Err(SettingsError::Invalid("AwsSettings.Sqs.Region must not be empty".into()));
    }
    if let Some(max) = aws.sqs.max_messages {
        if !(1..=10).contains(&max) {
            return Err(SettingsError::Invalid(format!(
                "AwsSettings.Sqs.MaxMessages must be between 1 and 10, got {max}"
            )));
        }
    }
    if aws.credentials.access_key.trim().is_empty() {
        return Err(SettingsError::Invalid(
            "AwsSettings.Credentials.AccessKey is required".into(),
        ));
    }
    if aws.credentials.secret_key.trim().is_empty() {
        return Err(SettingsError::Invalid(
            "AwsSettings.Credentials.SecretKey is required".into(),
        ));
    }

    let mut seen = HashSet::new();
    for action in &settings.feed_settings.actions {
        if action.name.trim().is_empty() {
            return Err(SettingsError::Invalid("every action needs a Name".into()));
        }
        if !seen.insert(action.name.to_ascii_lowercase()) {
            return Err(SettingsError::Invalid(format!(
                "duplicate action name '{}'",
                action.name
            )));
        }
    }
    Ok(())
}
