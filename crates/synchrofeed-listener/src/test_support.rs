// In-memory QueueClient and ActionProcessor fakes used by the unit tests.

use crate::queue_client::{QueueAddress, QueueClient, QueueError, QueueMessage};

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use synchrofeed_sdk::{
    Action, ActionConfig, ActionProcessor, ActionScope, Package, PackageEvent, SourceRepository,
};

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

type ReceiveHook = Box<dyn Fn(usize) + Send + Sync>;

/// Scripted queue. Each receive pops the next batch; once the script runs
/// out, receives return empty after a short sleep.
#[derive(Default)]
pub struct FakeQueueClient {
    queue_url: Mutex<Option<Result<Option<String>, QueueError>>>,
    batches: Mutex<VecDeque<Result<Vec<QueueMessage>, QueueError>>>,
    failing_deletes: Mutex<Vec<String>>,
    deleted: Mutex<Vec<String>>,
    lookups: Mutex<usize>,
    receives: Mutex<usize>,
    on_receive: Mutex<Option<ReceiveHook>>,
}

impl FakeQueueClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_queue_url(self, result: Result<Option<String>, QueueError>) -> Self {
        *self.queue_url.lock() = Some(result);
        self
    }

    pub fn with_batch(self, messages: Vec<QueueMessage>) -> Self {
        self.batches.lock().push_back(Ok(messages));
        self
    }

    pub fn with_receive_error(self, reason: &str) -> Self {
        self.batches
            .lock()
            .push_back(Err(QueueError::service("ReceiveMessage", reason)));
        self
    }

    pub fn failing_delete(self, receipt_handle: &str) -> Self {
        self.failing_deletes.lock().push(receipt_handle.to_string());
        self
    }

    /// Called with the 1-based receive number before the batch is returned.
    pub fn on_receive<F>(self, hook: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        *self.on_receive.lock() = Some(Box::new(hook));
        self
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().clone()
    }

    pub fn lookups(&self) -> usize {
        *self.lookups.lock()
    }

    pub fn receives(&self) -> usize {
        *self.receives.lock()
    }
}

#[async_trait]
impl QueueClient for FakeQueueClient {
    async fn get_queue_url(&self, name: &str) -> Result<Option<String>, QueueError> {
        *self.lookups.lock() += 1;
        self.queue_url
            .lock()
            .take()
            .unwrap_or_else(|| Ok(Some(format!("https://sqs.test/000000000000/{name}"))))
    }

    async fn receive_messages(
        &self,
        _queue: &QueueAddress,
        _wait: Duration,
        _max_messages: Option<i32>,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        let count = {
            let mut receives = self.receives.lock();
            *receives += 1;
            *receives
        };
        if let Some(ref hook) = *self.on_receive.lock() {
            hook(count);
        }

        let next = self.batches.lock().pop_front();
        match next {
            Some(batch) => batch,
            None => {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok(Vec::new())
            }
        }
    }

    async fn delete_message(
        &self,
        _queue: &QueueAddress,
        receipt_handle: &str,
    ) -> Result<(), QueueError> {
        if self.failing_deletes.lock().iter().any(|h| h == receipt_handle) {
            return Err(QueueError::service("DeleteMessage", "access denied"));
        }
        self.deleted.lock().push(receipt_handle.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// Everything the recording processor observed, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Created(String),
    Fetched(String),
    Processed(String, Package, PackageEvent),
    Released(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchBehavior {
    Found,
    NotFound,
    /// First fetch errors, later ones find the package.
    FailOnce,
}

#[derive(Default)]
struct Script {
    fail_create: Vec<String>,
    fail_process: Vec<String>,
    panic_process: Vec<String>,
}

pub struct RecordingActionProcessor {
    calls: Arc<Mutex<Vec<Call>>>,
    fetch: FetchBehavior,
    fetch_failures_left: Arc<Mutex<usize>>,
    script: Arc<Script>,
}

impl RecordingActionProcessor {
    pub fn new() -> Self {
        Self {
            calls: Arc::default(),
            fetch: FetchBehavior::Found,
            fetch_failures_left: Arc::default(),
            script: Arc::default(),
        }
    }

    pub fn with_fetch(mut self, fetch: FetchBehavior) -> Self {
        self.fetch = fetch;
        *self.fetch_failures_left.lock() = usize::from(fetch == FetchBehavior::FailOnce);
        self
    }

    pub fn fail_create_for(self, name: &str) -> Self {
        self.edit_script(|s| s.fail_create.push(name.to_string()))
    }

    pub fn fail_process_for(self, name: &str) -> Self {
        self.edit_script(|s| s.fail_process.push(name.to_string()))
    }

    pub fn panic_process_for(self, name: &str) -> Self {
        self.edit_script(|s| s.panic_process.push(name.to_string()))
    }

    fn edit_script(mut self, edit: impl FnOnce(&mut Script)) -> Self {
        let mut script = Script {
            fail_create: self.script.fail_create.clone(),
            fail_process: self.script.fail_process.clone(),
            panic_process: self.script.panic_process.clone(),
        };
        edit(&mut script);
        self.script = Arc::new(script);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn created(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Created(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    pub fn processed(&self) -> Vec<(String, Package, PackageEvent)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Processed(name, package, event) => Some((name, package, event)),
                _ => None,
            })
            .collect()
    }

    pub fn fetch_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Fetched(_)))
            .count()
    }
}

impl ActionProcessor for RecordingActionProcessor {
    fn create_action(
        &self,
        scope: &ActionScope,
        config: &ActionConfig,
    ) -> anyhow::Result<Box<dyn Action>> {
        if self.script.fail_create.contains(&config.name) {
            anyhow::bail!("no such action type '{}'", config.action_type);
        }

        self.calls.lock().push(Call::Created(config.name.clone()));
        let calls = self.calls.clone();
        let name = config.name.clone();
        scope.on_release(move || calls.lock().push(Call::Released(name)));

        Ok(Box::new(RecordingAction {
            name: config.name.clone(),
            calls: self.calls.clone(),
            script: self.script.clone(),
            repository: RecordingRepository {
                action: config.name.clone(),
                calls: self.calls.clone(),
                behavior: self.fetch,
                failures_left: self.fetch_failures_left.clone(),
            },
        }))
    }
}

struct RecordingAction {
    name: String,
    calls: Arc<Mutex<Vec<Call>>>,
    script: Arc<Script>,
    repository: RecordingRepository,
}

#[async_trait]
impl Action for RecordingAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_repository(&self) -> &dyn SourceRepository {
        &self.repository
    }

    async fn process_package(&self, package: &Package, event: PackageEvent) -> anyhow::Result<()> {
        if self.script.panic_process.contains(&self.name) {
            panic!("{} exploded", self.name);
        }
        if self.script.fail_process.contains(&self.name) {
            anyhow::bail!("target feed rejected {package}");
        }
        self.calls
            .lock()
            .push(Call::Processed(self.name.clone(), package.clone(), event));
        Ok(())
    }
}

struct RecordingRepository {
    action: String,
    calls: Arc<Mutex<Vec<Call>>>,
    behavior: FetchBehavior,
    failures_left: Arc<Mutex<usize>>,
}

#[async_trait]
impl SourceRepository for RecordingRepository {
    async fn fetch(&self, package_id: &str, version: &str) -> anyhow::Result<Option<Package>> {
        self.calls.lock().push(Call::Fetched(self.action.clone()));
        {
            let mut left = self.failures_left.lock();
            if *left > 0 {
                *left -= 1;
                anyhow::bail!("feed timed out");
            }
        }
        Ok(match self.behavior {
            FetchBehavior::NotFound => None,
            FetchBehavior::Found | FetchBehavior::FailOnce => Some(Package {
                listed: Some(true),
                content_url: Some(format!("https://feed.test/{package_id}/{version}.nupkg")),
                ..Package::new(package_id, version)
            }),
        })
    }
}
