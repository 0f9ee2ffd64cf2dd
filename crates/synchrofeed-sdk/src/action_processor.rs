//! The contract between the listener and the components that actually act on
//! packages.
//!
//! The listener only decides *which* configured actions see an event and
//! *what* they see; everything else (talking to feeds, copying or publishing
//! packages) sits behind [`ActionProcessor`], [`Action`] and
//! [`SourceRepository`].

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

// ---------------------------------------------------------------------------
// Package
// ---------------------------------------------------------------------------

/// The semantic an action is asked to apply to a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PackageEvent {
    Added,
    Deleted,
}

impl fmt::Display for PackageEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageEvent::Added => write!(f, "Added"),
            PackageEvent::Deleted => write!(f, "Deleted"),
        }
    }
}

/// A package as seen by an action.
///
/// For additions this is whatever the source repository returned. For
/// deletions the package no longer exists in the feed, so only `id` and
/// `version` are populated (see [`Package::new`]).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    pub id: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<String>,
}

impl Package {
    /// A package carrying only its identity.
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
            ..Self::default()
        }
    }

    /// Whether nothing beyond `id` and `version` is populated.
    pub fn is_identity_only(&self) -> bool {
        self.description.is_none()
            && self.content_url.is_none()
            && self.listed.is_none()
            && self.published.is_none()
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.id, self.version)
    }
}

// ---------------------------------------------------------------------------
// Configuration consumed by action processors
// ---------------------------------------------------------------------------

fn default_enabled() -> bool {
    true
}

/// A configured action bound to one source feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ActionConfig {
    #[serde(alias = "name")]
    pub name: String,

    /// Which action implementation handles this entry.
    #[serde(default, rename = "Type", alias = "type")]
    pub action_type: String,

    #[serde(alias = "sourceFeed")]
    pub source_feed: String,

    #[serde(default, alias = "targetFeed", skip_serializing_if = "Option::is_none")]
    pub target_feed: Option<String>,

    #[serde(default = "default_enabled", alias = "enabled")]
    pub enabled: bool,

    #[serde(default, alias = "includePrerelease")]
    pub include_prerelease: bool,

    /// Action-specific settings, opaque to the listener.
    #[serde(default, alias = "settings")]
    pub settings: Map<String, Value>,
}

impl ActionConfig {
    /// An enabled action that ignores prereleases.
    pub fn new(
        name: impl Into<String>,
        action_type: impl Into<String>,
        source_feed: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            action_type: action_type.into(),
            source_feed: source_feed.into(),
            target_feed: None,
            enabled: true,
            include_prerelease: false,
            settings: Map::new(),
        }
    }

    /// Look up a string setting by name (case-insensitive).
    pub fn setting_str(&self, key: &str) -> Option<&str> {
        lookup_str(&self.settings, key)
    }
}

/// A configured package feed that actions can read from or publish to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FeedConfig {
    #[serde(alias = "name")]
    pub name: String,

    #[serde(default, rename = "Type", alias = "type")]
    pub feed_type: String,

    #[serde(default, alias = "settings")]
    pub settings: Map<String, Value>,
}

impl FeedConfig {
    /// Look up a string setting by name (case-insensitive).
    pub fn setting_str(&self, key: &str) -> Option<&str> {
        lookup_str(&self.settings, key)
    }
}

fn lookup_str<'a>(settings: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    settings
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .and_then(|(_, v)| v.as_str())
}

// ---------------------------------------------------------------------------
// ActionScope
// ---------------------------------------------------------------------------

type ReleaseFn = Box<dyn FnOnce() + Send>;

/// Resources owned by one action for the handling of one message.
///
/// A fresh scope is opened before an action is created and dropped as soon
/// as that action is done with the message. Processors attach clean-up work
/// with [`ActionScope::on_release`]; it runs in reverse registration order
/// when the scope drops, on every exit path including errors and panics.
pub struct ActionScope {
    action_name: String,
    release: Mutex<Vec<ReleaseFn>>,
}

impl ActionScope {
    pub fn new(action_name: impl Into<String>) -> Self {
        Self {
            action_name: action_name.into(),
            release: Mutex::new(Vec::new()),
        }
    }

    /// Name of the action this scope was opened for.
    pub fn action_name(&self) -> &str {
        &self.action_name
    }

    /// Register clean-up work to run when the scope is released.
    pub fn on_release<F>(&self, release: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.release.lock().push(Box::new(release));
    }
}

impl Drop for ActionScope {
    fn drop(&mut self) {
        let callbacks = std::mem::take(self.release.get_mut());
        for callback in callbacks.into_iter().rev() {
            callback();
        }
    }
}

impl fmt::Debug for ActionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionScope")
            .field("action_name", &self.action_name)
            .field("pending_releases", &self.release.lock().len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Where an action reads packages from.
#[async_trait]
pub trait SourceRepository: Send + Sync {
    /// Fetch a package by id and version. `Ok(None)` means the feed no longer
    /// has it.
    async fn fetch(&self, package_id: &str, version: &str) -> anyhow::Result<Option<Package>>;
}

/// One configured action, materialised for a single message.
#[async_trait]
pub trait Action: Send + Sync {
    /// The configured action name.
    fn name(&self) -> &str;

    /// The repository backing this action's source feed.
    fn source_repository(&self) -> &dyn SourceRepository;

    /// Apply `event` to `package`.
    async fn process_package(&self, package: &Package, event: PackageEvent) -> anyhow::Result<()>;
}

/// Builds actions from configuration.
pub trait ActionProcessor: Send + Sync {
    /// Create the action described by `config`. Anything the action needs
    /// released afterwards must be registered on `scope`.
    fn create_action(
        &self,
        scope: &ActionScope,
        config: &ActionConfig,
    ) -> anyhow::Result<Box<dyn Action>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn scope_releases_in_reverse_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        {
            let scope = ActionScope::new("copy");
            for i in 0..3 {
                let order = order.clone();
                scope.on_release(move || order.lock().push(i));
            }
            assert_eq!(scope.action_name(), "copy");
        }
        assert_eq!(*order.lock(), vec![2, 1, 0]);
    }

    #[test]
    fn scope_releases_while_unwinding() {
        let released = Arc::new(Mutex::new(false));
        let flag = released.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let scope = ActionScope::new("panicky");
            scope.on_release(move || *flag.lock() = true);
            panic!("action blew up");
        }));
        assert!(result.is_err());
        assert!(*released.lock());
    }

    #[test]
    fn action_config_pascal_case_with_defaults() {
        let json = r#"{ "Name": "copy", "Type": "log", "SourceFeed": "public" }"#;
        let config: ActionConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.name, "copy");
        assert_eq!(config.action_type, "log");
        assert_eq!(config.source_feed, "public");
        assert!(config.enabled);
        assert!(!config.include_prerelease);
        assert!(config.settings.is_empty());
    }

    #[test]
    fn action_config_camel_case_aliases() {
        let json = r#"{
            "name": "copy",
            "type": "log",
            "sourceFeed": "Public",
            "enabled": false,
            "includePrerelease": true,
            "settings": { "TargetUri": "https://example.test" }
        }"#;
        let config: ActionConfig = serde_json::from_str(json).unwrap();
        assert!(!config.enabled);
        assert!(config.include_prerelease);
        assert_eq!(config.setting_str("targeturi"), Some("https://example.test"));
        assert_eq!(config.setting_str("missing"), None);
    }

    #[test]
    fn feed_config_settings_lookup() {
        let json = r#"{ "Name": "public", "Type": "nuget", "Settings": { "Uri": "https://feed.test/v3/index.json" } }"#;
        let feed: FeedConfig = serde_json::from_str(json).unwrap();
        assert_eq!(feed.feed_type, "nuget");
        assert_eq!(feed.setting_str("uri"), Some("https://feed.test/v3/index.json"));
    }

    struct StaticRepository(Vec<Package>);

    #[async_trait]
    impl SourceRepository for StaticRepository {
        async fn fetch(&self, package_id: &str, version: &str) -> anyhow::Result<Option<Package>> {
            Ok(self
                .0
                .iter()
                .find(|p| p.id.eq_ignore_ascii_case(package_id) && p.version == version)
                .cloned())
        }
    }

    #[tokio::test]
    async fn repository_through_trait_object() {
        let repository: Box<dyn SourceRepository> = Box::new(StaticRepository(vec![Package {
            listed: Some(false),
            ..Package::new("Foo", "1.0.0")
        }]));

        let found = repository.fetch("foo", "1.0.0").await.unwrap().unwrap();
        assert_eq!(found.listed, Some(false));
        assert!(repository.fetch("foo", "2.0.0").await.unwrap().is_none());
    }

    #[test]
    fn identity_only_package() {
        let package = Package::new("Foo", "1.0.0");
        assert!(package.is_identity_only());
        assert_eq!(package.to_string(), "Foo.1.0.0");

        let fetched = Package {
            listed: Some(true),
            ..Package::new("Foo", "1.0.0")
        };
        assert!(!fetched.is_identity_only());
    }
}
