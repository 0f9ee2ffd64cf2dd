// MessageProcessor: turns one queue message into action invocations.
//
// Envelope -> FeedEvent -> matching actions -> fetch/process per event kind.
// Never fails; every problem is logged and the caller deletes the message
// regardless.

use crate::feed_event::{EventType, FeedEvent};
use crate::queue_client::QueueMessage;

use anyhow::Context;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use synchrofeed_common::SyncBridge;
use synchrofeed_sdk::{
    ActionConfig, ActionProcessor, ActionScope, Package, PackageEvent, StringUtil, TraceWriter,
};

/// Longest message body echoed into verbose logs.
const MAX_LOGGED_BODY: usize = 2048;

/// How handling one message went. Informational only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessSummary {
    /// The body could not be parsed; no action ran.
    pub malformed: bool,
    /// Enabled actions bound to the event's feed.
    pub matched: usize,
    /// Actions skipped because the version is a prerelease.
    pub skipped_prerelease: usize,
    /// Actions whose `process_package` completed.
    pub processed: usize,
    /// Actions that found nothing to do (package not found, unhandled kind).
    pub ignored: usize,
    /// Actions that errored or panicked.
    pub failed: usize,
    /// Source repository fetches issued.
    pub fetches: usize,
}

enum ActionOutcome {
    Processed,
    Ignored,
}

/// Outcome of the one source fetch allowed per message, failures included.
/// `None` until the first "added" action fetches.
type FetchCache = Option<Result<Option<Package>, String>>;

pub struct MessageProcessor {
    actions: Vec<ActionConfig>,
    action_processor: Arc<dyn ActionProcessor>,
    trace: Arc<dyn TraceWriter>,
}

impl MessageProcessor {
    pub fn new(
        actions: Vec<ActionConfig>,
        action_processor: Arc<dyn ActionProcessor>,
        trace: Arc<dyn TraceWriter>,
    ) -> Self {
        Self {
            actions,
            action_processor,
            trace,
        }
    }

    /// Enabled actions whose source feed is `feed` (case-insensitive), in
    /// configuration order.
    pub fn matching_actions<'a>(&'a self, feed: &'a str) -> impl Iterator<Item = &'a ActionConfig> {
        self.actions
            .iter()
            .filter(move |a| a.enabled && StringUtil::equals_ignore_case(&a.source_feed, feed))
    }

    pub fn process(&self, bridge: &SyncBridge, message: &QueueMessage) -> ProcessSummary {
        let mut summary = ProcessSummary::default();
        self.trace.verbose(&format!(
            "Received message ({}): {}",
            message.id,
            StringUtil::truncate_for_log(&message.body, MAX_LOGGED_BODY)
        ));

        let event = match FeedEvent::from_message_body(&message.body) {
            Ok(event) => event,
            Err(e) => {
                let err = anyhow::Error::new(e);
                self.trace
                    .error(&format!("Error parsing message {}: {:#}", message.id, err));
                summary.malformed = true;
                return summary;
            }
        };

        self.trace.info(&format!(
            "Feed: {}, Event: {}, Package: {}, Version: {}",
            event.feed, event.event, event.package, event.version
        ));
        if let Some(ref url) = event.package_url {
            self.trace.verbose(&format!("Package URL: {url}"));
        }

        let mut cache: FetchCache = None;
        for config in self.matching_actions(&event.feed) {
            summary.matched += 1;
            self.trace
                .verbose(&format!("Found action ({}) for {}", config.name, event.feed));

            if event.is_prerelease() && !config.include_prerelease {
                self.trace.verbose(&format!(
                    "{} is ignoring pre-release package ({}.{})",
                    config.name, event.package, event.version
                ));
                summary.skipped_prerelease += 1;
                continue;
            }

            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                self.run_action(bridge, config, &event, &mut cache, &mut summary.fetches)
            }));

            match result {
                Ok(Ok(ActionOutcome::Processed)) => summary.processed += 1,
                Ok(Ok(ActionOutcome::Ignored)) => summary.ignored += 1,
                Ok(Err(e)) => {
                    summary.failed += 1;
                    self.trace.error(&format!(
                        "Action '{}' failed for {}.{}: {:#}",
                        config.name, event.package, event.version, e
                    ));
                }
                Err(payload) => {
                    summary.failed += 1;
                    self.trace.error(&format!(
                        "Action '{}' panicked for {}.{}: {}",
                        config.name,
                        event.package,
                        event.version,
                        panic_message(payload.as_ref())
                    ));
                }
            }
        }

        if summary.matched == 0 {
            self.trace
                .verbose(&format!("No enabled actions for feed {}", event.feed));
        }
        summary
    }

    fn run_action(
        &self,
        bridge: &SyncBridge,
        config: &ActionConfig,
        event: &FeedEvent,
        cache: &mut FetchCache,
        fetches: &mut usize,
    ) -> anyhow::Result<ActionOutcome> {
        // Declared before the action so it is released after the action drops.
        let scope = ActionScope::new(config.name.as_str());
        let action = self
            .action_processor
            .create_action(&scope, config)
            .with_context(|| format!("unable to create action '{}'", config.name))?;

        match event.event {
            EventType::Added => {
                let fetched = cache.get_or_insert_with(|| {
                    *fetches += 1;
                    bridge
                        .run_sync(
                            action
                                .source_repository()
                                .fetch(&event.package, &event.version),
                        )
                        .map_err(|e| format!("{e:#}"))
                });

                match fetched {
                    Ok(Some(package)) => {
                        bridge.run_sync(action.process_package(package, PackageEvent::Added))?;
                        Ok(ActionOutcome::Processed)
                    }
                    Ok(None) => {
                        self.trace.warning(&format!(
                            "{}.{} not found in feed {}. Ignoring.",
                            event.package, event.version, event.feed
                        ));
                        Ok(ActionOutcome::Ignored)
                    }
                    Err(reason) => Err(anyhow::anyhow!(
                        "fetching {}.{} from {}: {}",
                        event.package,
                        event.version,
                        event.feed,
                        reason
                    )),
                }
            }
            EventType::Deleted | EventType::Purged => {
                // Already gone from the feed; identity is all there is.
                let package = Package::new(event.package.as_str(), event.version.as_str());
                bridge.run_sync(action.process_package(&package, PackageEvent::Deleted))?;
                Ok(ActionOutcome::Processed)
            }
            ref other => {
                self.trace.verbose(&format!(
                    "Action '{}' has no handler for '{}' events",
                    action.name(),
                    other
                ));
                Ok(ActionOutcome::Ignored)
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
