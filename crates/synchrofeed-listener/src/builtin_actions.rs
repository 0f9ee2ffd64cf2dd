// Built-in action processor: a "log" action over NuGet v3 feeds.

use anyhow::{bail, Context};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use synchrofeed_sdk::{
    Action, ActionConfig, ActionProcessor, ActionScope, FeedConfig, Package, PackageEvent,
    SourceRepository, TraceWriter,
};
use tokio::sync::OnceCell;
use url::Url;

pub const LOG_ACTION_TYPE: &str = "log";
pub const NUGET_FEED_TYPE: &str = "nuget";

/// Resource type prefix naming the registration endpoint in a service index.
const REGISTRATIONS_RESOURCE: &str = "RegistrationsBaseUrl";

/// Builds the actions the listener ships with.
///
/// Repositories are created once per configured feed and shared by every
/// action bound to that feed.
pub struct BuiltinActionProcessor {
    feeds: Vec<FeedConfig>,
    repositories: HashMap<String, Arc<NuGetV3Repository>>,
    trace: Arc<dyn TraceWriter>,
}

impl BuiltinActionProcessor {
    pub fn new(
        feeds: Vec<FeedConfig>,
        http: reqwest::Client,
        trace: Arc<dyn TraceWriter>,
    ) -> anyhow::Result<Self> {
        let mut repositories = HashMap::new();
        for feed in feeds.iter().filter(|f| f.feed_type.eq_ignore_ascii_case(NUGET_FEED_TYPE)) {
            let uri = feed
                .setting_str("Uri")
                .with_context(|| format!("feed '{}' has no Settings.Uri", feed.name))?;
            let index = Url::parse(uri)
                .with_context(|| format!("feed '{}' has an invalid Uri '{}'", feed.name, uri))?;
            repositories.insert(
                feed.name.to_ascii_lowercase(),
                Arc::new(NuGetV3Repository::new(index, http.clone())),
            );
        }

        Ok(Self {
            feeds,
            repositories,
            trace,
        })
    }

    fn repository_for(&self, feed_name: &str) -> anyhow::Result<Arc<NuGetV3Repository>> {
        if let Some(repository) = self.repositories.get(&feed_name.to_ascii_lowercase()) {
            return Ok(repository.clone());
        }
        match self.feeds.iter().find(|f| f.name.eq_ignore_ascii_case(feed_name)) {
            Some(feed) => bail!(
                "feed '{}' has unsupported type '{}'",
                feed.name,
                feed.feed_type
            ),
            None => bail!("feed '{feed_name}' is not configured"),
        }
    }
}

impl ActionProcessor for BuiltinActionProcessor {
    fn create_action(
        &self,
        scope: &ActionScope,
        config: &ActionConfig,
    ) -> anyhow::Result<Box<dyn Action>> {
        if !config.action_type.eq_ignore_ascii_case(LOG_ACTION_TYPE) {
            bail!(
                "action '{}' has unknown type '{}'",
                config.name,
                config.action_type
            );
        }

        let repository = self.repository_for(&config.source_feed)?;

        let trace = self.trace.clone();
        let name = config.name.clone();
        scope.on_release(move || trace.verbose(&format!("Released action {name}")));

        Ok(Box::new(LogAction {
            name: config.name.clone(),
            target_feed: config.target_feed.clone(),
            repository,
            trace: self.trace.clone(),
        }))
    }
}

/// Logs every packaging event it is handed.
pub struct LogAction {
    name: String,
    target_feed: Option<String>,
    repository: Arc<NuGetV3Repository>,
    trace: Arc<dyn TraceWriter>,
}

#[async_trait]
impl Action for LogAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_repository(&self) -> &dyn SourceRepository {
        self.repository.as_ref()
    }

    async fn process_package(&self, package: &Package, event: PackageEvent) -> anyhow::Result<()> {
        let target = self
            .target_feed
            .as_deref()
            .map(|t| format!(" -> {t}"))
            .unwrap_or_default();
        let content = package
            .content_url
            .as_deref()
            .map(|u| format!(" ({u})"))
            .unwrap_or_default();
        self.trace
            .info(&format!("[{}] {} {}{}{}", self.name, event, package, content, target));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// NuGet v3
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ServiceIndex {
    #[serde(default)]
    resources: Vec<ServiceResource>,
}

#[derive(Debug, Deserialize)]
struct ServiceResource {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@type")]
    resource_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistrationLeaf {
    #[serde(default)]
    listed: Option<bool>,
    #[serde(default)]
    package_content: Option<String>,
    #[serde(default)]
    published: Option<String>,
}

/// Reads package metadata through the NuGet v3 registration resource.
pub struct NuGetV3Repository {
    service_index: Url,
    http: reqwest::Client,
    registrations_base: OnceCell<String>,
}

impl NuGetV3Repository {
    pub fn new(service_index: Url, http: reqwest::Client) -> Self {
        Self {
            service_index,
            http,
            registrations_base: OnceCell::new(),
        }
    }

    async fn registrations_base(&self) -> anyhow::Result<&str> {
        let base = self
            .registrations_base
            .get_or_try_init(|| async {
                let index: ServiceIndex = self
                    .http
                    .get(self.service_index.clone())
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await
                    .with_context(|| format!("reading service index {}", self.service_index))?;
                registrations_base_from(&index).with_context(|| {
                    format!("{} has no {REGISTRATIONS_RESOURCE} resource", self.service_index)
                })
            })
            .await?;
        Ok(base.as_str())
    }
}

fn registrations_base_from(index: &ServiceIndex) -> Option<String> {
    index
        .resources
        .iter()
        .find(|r| r.resource_type.starts_with(REGISTRATIONS_RESOURCE))
        .map(|r| r.id.trim_end_matches('/').to_string())
}

/// `{base}/{id-lower}/{version-lower}.json`
fn registration_leaf_url(base: &str, package_id: &str, version: &str) -> String {
    format!(
        "{}/{}/{}.json",
        base.trim_end_matches('/'),
        package_id.to_lowercase(),
        version.to_lowercase()
    )
}

#[async_trait]
impl SourceRepository for NuGetV3Repository {
    async fn fetch(&self, package_id: &str, version: &str) -> anyhow::Result<Option<Package>> {
        let base = self.registrations_base().await?;
        let url = registration_leaf_url(base, package_id, version);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let leaf: RegistrationLeaf = response
            .error_for_status()
            .with_context(|| format!("GET {url}"))?
            .json()
            .await
            .with_context(|| format!("reading registration leaf {url}"))?;

        Ok(Some(Package {
            listed: leaf.listed,
            content_url: leaf.package_content,
            published: leaf.published,
            ..Package::new(package_id, version)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use synchrofeed_common::SyncBridge;
    use synchrofeed_sdk::trace::{CollectingTraceWriter, TraceLevel};

    fn feed(name: &str, feed_type: &str, uri: &str) -> FeedConfig {
        serde_json::from_value(serde_json::json!({
            "Name": name, "Type": feed_type, "Settings": { "Uri": uri }
        }))
        .unwrap()
    }

    fn processor(feeds: Vec<FeedConfig>) -> (BuiltinActionProcessor, Arc<CollectingTraceWriter>) {
        let trace = Arc::new(CollectingTraceWriter::new());
        let processor =
            BuiltinActionProcessor::new(feeds, reqwest::Client::new(), trace.clone()).unwrap();
        (processor, trace)
    }

    #[test]
    fn leaf_url_is_lower_cased() {
        assert_eq!(
            registration_leaf_url("https://api.test/v3/registration5/", "Newtonsoft.Json", "13.0.3-Beta1"),
            "https://api.test/v3/registration5/newtonsoft.json/13.0.3-beta1.json"
        );
    }

    #[test]
    fn picks_registrations_resource() {
        let index: ServiceIndex = serde_json::from_str(
            r#"{ "version": "3.0.0", "resources": [
                { "@id": "https://api.test/query", "@type": "SearchQueryService" },
                { "@id": "https://api.test/reg/", "@type": "RegistrationsBaseUrl/3.6.0" }
            ] }"#,
        )
        .unwrap();
        assert_eq!(registrations_base_from(&index).as_deref(), Some("https://api.test/reg"));
    }

    #[test]
    fn unknown_action_type_fails() {
        let (processor, _) = processor(vec![feed("public", "nuget", "https://api.test/v3/index.json")]);
        let scope = ActionScope::new("copy");
        let err = processor
            .create_action(&scope, &ActionConfig::new("copy", "copy-to-s3", "public"))
            .err()
            .unwrap();
        assert!(err.to_string().contains("unknown type 'copy-to-s3'"));
    }

    #[test]
    fn unknown_feed_and_unsupported_feed_type_fail() {
        let (processor, _) = processor(vec![feed("npm", "npm", "https://registry.test")]);
        let scope = ActionScope::new("a");
        let missing = processor
            .create_action(&scope, &ActionConfig::new("a", "log", "public"))
            .err()
            .unwrap();
        assert!(missing.to_string().contains("not configured"));
        let unsupported = processor
            .create_action(&scope, &ActionConfig::new("a", "LOG", "NPM"))
            .err()
            .unwrap();
        assert!(unsupported.to_string().contains("unsupported type 'npm'"));
    }

    #[test]
    fn nuget_feed_without_uri_is_rejected() {
        let feed: FeedConfig =
            serde_json::from_str(r#"{ "Name": "public", "Type": "nuget" }"#).unwrap();
        let result = BuiltinActionProcessor::new(
            vec![feed],
            reqwest::Client::new(),
            Arc::new(CollectingTraceWriter::new()),
        );
        assert!(result.is_err());
    }

    #[test]
    fn log_action_logs_and_releases_scope() {
        let (processor, trace) = processor(vec![feed("Public", "NuGet", "https://api.test/v3/index.json")]);
        let bridge = SyncBridge::new().unwrap();
        {
            let scope = ActionScope::new("log-public");
            let mut config = ActionConfig::new("log-public", "log", "public");
            config.target_feed = Some("mirror".into());
            let action = processor.create_action(&scope, &config).unwrap();
            assert_eq!(action.name(), "log-public");
            bridge
                .run_sync(action.process_package(&Package::new("Foo", "1.0.0"), PackageEvent::Deleted))
                .unwrap();
        }
        assert_eq!(
            trace.count_containing(TraceLevel::Info, "[log-public] Deleted Foo.1.0.0 -> mirror"),
            1
        );
        assert_eq!(trace.count_containing(TraceLevel::Verbose, "Released action log-public"), 1);
    }

    #[test]
    fn nuget_fetch_found_and_not_found() {
        let mut server = mockito::Server::new();
        let base = server.url();
        let _index = server
            .mock("GET", "/v3/index.json")
            .with_header("content-type", "application/json")
            .with_body(format!(
                r#"{{ "resources": [ {{ "@id": "{base}/v3/registration5-gz-semver2/", "@type": "RegistrationsBaseUrl/3.6.0" }} ] }}"#
            ))
            .expect(1)
            .create();
        let _leaf = server
            .mock("GET", "/v3/registration5-gz-semver2/foo/1.0.0.json")
            .with_header("content-type", "application/json")
            .with_body(r#"{ "listed": true, "packageContent": "https://cdn.test/foo.1.0.0.nupkg", "published": "2024-05-01T12:00:00+00:00" }"#)
            .create();
        let _missing = server
            .mock("GET", "/v3/registration5-gz-semver2/foo/9.9.9.json")
            .with_status(404)
            .create();

        let index = Url::parse(&format!("{base}/v3/index.json")).unwrap();
        let repository = NuGetV3Repository::new(index, reqwest::Client::new());
        let bridge = SyncBridge::new().unwrap();

        let found = bridge.run_sync(repository.fetch("Foo", "1.0.0")).unwrap().unwrap();
        assert_eq!(found.id, "Foo");
        assert_eq!(found.listed, Some(true));
        assert_eq!(found.content_url.as_deref(), Some("https://cdn.test/foo.1.0.0.nupkg"));

        let missing = bridge.run_sync(repository.fetch("Foo", "9.9.9")).unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn nuget_fetch_server_error_is_an_error() {
        let mut server = mockito::Server::new();
        let _index = server.mock("GET", "/v3/index.json").with_status(503).create();

        let index = Url::parse(&format!("{}/v3/index.json", server.url())).unwrap();
        let repository = NuGetV3Repository::new(index, reqwest::Client::new());
        let bridge = SyncBridge::new().unwrap();
        assert!(bridge.run_sync(repository.fetch("Foo", "1.0.0")).is_err());
    }
}
