// ListenerService: starts the polling loop on its own thread and stops it
// with a bounded wait.

use crate::message_listener::{DeletePolicy, ListenerStats, MessageListener};
use crate::message_processor::MessageProcessor;
use crate::queue_client::{QueueAddress, QueueClient, QueueResolver};

use anyhow::{bail, Context, Result};
use crossbeam_channel::RecvTimeoutError;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use synchrofeed_common::constants::{LISTENER_STOP_TIMEOUT, LISTENER_THREAD_NAME, RECEIVE_WAIT_TIME};
use synchrofeed_common::{HostContext, ListenerSettings, SyncBridge};
use synchrofeed_sdk::{ActionProcessor, TraceWriter};
use tokio_util::sync::CancellationToken;

/// Knobs that are not part of the settings file.
#[derive(Debug, Clone)]
pub struct ListenerOptions {
    /// Overrides the compile-time delete policy when set.
    pub delete_policy: Option<DeletePolicy>,
    /// How long `stop` waits for the listener thread.
    pub stop_timeout: Duration,
    /// Long-poll wait per receive.
    pub receive_wait: Duration,
}

impl Default for ListenerOptions {
    fn default() -> Self {
        Self {
            delete_policy: None,
            stop_timeout: LISTENER_STOP_TIMEOUT,
            receive_wait: RECEIVE_WAIT_TIME,
        }
    }
}

struct RunningListener {
    stop: CancellationToken,
    /// Disconnects when the listener thread returns.
    exited: crossbeam_channel::Receiver<()>,
    handle: JoinHandle<ListenerStats>,
}

pub struct ListenerService {
    context: Arc<HostContext>,
    settings: ListenerSettings,
    client: Arc<dyn QueueClient>,
    action_processor: Arc<dyn ActionProcessor>,
    options: ListenerOptions,
    trace: Arc<dyn TraceWriter>,
    running: Mutex<Option<RunningListener>>,
}

impl ListenerService {
    pub fn new(
        context: Arc<HostContext>,
        settings: ListenerSettings,
        client: Arc<dyn QueueClient>,
        action_processor: Arc<dyn ActionProcessor>,
        options: ListenerOptions,
    ) -> Self {
        let trace: Arc<dyn TraceWriter> = Arc::new(context.get_trace("ListenerService"));
        Self {
            context,
            settings,
            client,
            action_processor,
            options,
            trace,
            running: Mutex::new(None),
        }
    }

    /// Route this service's logs (and the listener thread's) to `trace`.
    pub fn with_trace(mut self, trace: Arc<dyn TraceWriter>) -> Self {
        self.trace = trace;
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Resolve the queue without starting anything.
    pub fn check(&self) -> Result<QueueAddress> {
        let bridge = SyncBridge::new()?;
        let queue = QueueResolver::resolve(
            &bridge,
            self.client.as_ref(),
            &self.settings.aws_settings.sqs,
            self.trace.as_ref(),
        )?;
        Ok(queue)
    }

    /// A receiver that disconnects when the listener thread returns, for
    /// whatever reason. `None` when not running.
    pub fn exit_signal(&self) -> Option<crossbeam_channel::Receiver<()>> {
        self.running.lock().as_ref().map(|r| r.exited.clone())
    }

    /// Resolve the queue, then start the listener thread.
    ///
    /// Fails without spawning anything when the queue cannot be resolved.
    pub fn start(&self) -> Result<QueueAddress> {
        let mut running = self.running.lock();
        if running.is_some() {
            bail!("listener is already running");
        }

        self.trace.info("Queue listener starting...");
        let bridge = SyncBridge::new().context("unable to create the async bridge")?;
        let queue = match QueueResolver::resolve(
            &bridge,
            self.client.as_ref(),
            &self.settings.aws_settings.sqs,
            self.trace.as_ref(),
        ) {
            Ok(queue) => queue,
            Err(e) => {
                self.trace.error(&format!("{e}. Aborting."));
                return Err(e.into());
            }
        };

        let delete_policy = self.options.delete_policy.unwrap_or_default();
        if delete_policy == DeletePolicy::Retain {
            self.trace
                .warning("Message deletion is disabled; processed messages stay on the queue");
        }

        let processor = MessageProcessor::new(
            self.settings.feed_settings.actions.clone(),
            self.action_processor.clone(),
            self.trace.clone(),
        );
        let listener = MessageListener::new(
            bridge,
            self.client.clone(),
            queue.clone(),
            processor,
            self.trace.clone(),
        )
        .with_delete_policy(delete_policy)
        .with_max_messages(self.settings.aws_settings.sqs.max_messages)
        .with_wait(self.options.receive_wait);

        let stop = self.context.shutdown_token().child_token();
        let (exit_tx, exited) = crossbeam_channel::bounded::<()>(0);
        let thread_stop = stop.clone();
        let thread_trace = self.trace.clone();

        let handle = thread::Builder::new()
            .name(LISTENER_THREAD_NAME.to_string())
            .spawn(move || {
                let _exit = exit_tx;
                let stats = listener.run(&thread_stop);
                thread_trace.info(&format!("Queue listener exited ({stats})"));
                stats
            })
            .context("unable to spawn the listener thread")?;

        self.trace
            .info(&format!("Queue listener started on {queue}"));
        *running = Some(RunningListener {
            stop,
            exited,
            handle,
        });
        Ok(queue)
    }

    /// Signal the listener and wait (bounded) for it to exit.
    ///
    /// Returns the loop counters if the thread exited in time. A thread that
    /// does not exit is left running.
    pub fn stop(&self) -> Option<ListenerStats> {
        let running = self.running.lock().take()?;

        self.trace.info("Stopping service");
        running.stop.cancel();

        let stats = match running.exited.recv_timeout(self.options.stop_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => match running.handle.join() {
                Ok(stats) => Some(stats),
                Err(_) => {
                    self.trace.error("Queue listener thread panicked");
                    None
                }
            },
            Err(RecvTimeoutError::Timeout) => {
                self.trace.warning(&format!(
                    "Queue listener did not exit within {}s; leaving it running",
                    self.options.stop_timeout.as_secs()
                ));
                None
            }
        };

        self.trace.info("Service stopped");
        stats
    }
}

impl Drop for ListenerService {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().as_ref() {
            running.stop.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed_event::sns_body;
    use crate::queue_client::{QueueError, QueueMessage};
    use crate::test_support::{FakeQueueClient, RecordingActionProcessor};
    use std::time::Instant;
    use synchrofeed_common::TraceSetting;
    use synchrofeed_sdk::trace::{CollectingTraceWriter, TraceLevel};
    use synchrofeed_sdk::ActionConfig;

    fn settings() -> ListenerSettings {
        let mut settings = ListenerSettings::default();
        settings.aws_settings.sqs.name = "feed-events".into();
        settings
            .feed_settings
            .actions
            .push(ActionConfig::new("copy", "record", "public"));
        settings
    }

    fn options() -> ListenerOptions {
        ListenerOptions {
            delete_policy: Some(DeletePolicy::Delete),
            stop_timeout: Duration::from_secs(5),
            receive_wait: Duration::from_millis(1),
        }
    }

    fn service(
        client: Arc<FakeQueueClient>,
        options: ListenerOptions,
    ) -> (ListenerService, Arc<CollectingTraceWriter>, Arc<HostContext>) {
        let context = HostContext::with_setting("Listener", TraceSetting::default());
        let trace = Arc::new(CollectingTraceWriter::new());
        let service = ListenerService::new(
            context.clone(),
            settings(),
            client,
            Arc::new(RecordingActionProcessor::new()),
            options,
        )
        .with_trace(trace.clone());
        (service, trace, context)
    }

    fn wait_until(condition: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn start_processes_and_stop_returns_stats() {
        let message = QueueMessage {
            id: "m-1".into(),
            body: sns_body(r#"{"event":"deleted","feed":"public","package":"Foo","version":"1.0.0"}"#),
            receipt_handle: "rh-1".into(),
        };
        let client = Arc::new(FakeQueueClient::new().with_batch(vec![message]));
        let (service, trace, _) = service(client.clone(), options());

        let queue = service.start().unwrap();
        assert_eq!(queue.as_str(), "https://sqs.test/000000000000/feed-events");
        assert!(service.is_running());

        wait_until(|| !client.deleted().is_empty());
        let stats = service.stop().unwrap();

        assert!(!service.is_running());
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.deleted, 1);
        assert_eq!(client.lookups(), 1);
        assert_eq!(trace.count_containing(TraceLevel::Info, "Service stopped"), 1);
    }

    #[test]
    fn resolution_failure_aborts_start() {
        let client = Arc::new(
            FakeQueueClient::new()
                .with_queue_url(Err(QueueError::service("GetQueueUrl", "AccessDenied"))),
        );
        let (service, trace, _) = service(client.clone(), options());

        let err = service.start().unwrap_err();
        assert!(err.to_string().contains("feed-events"));
        assert!(!service.is_running());
        thread::sleep(Duration::from_millis(20));
        assert_eq!(client.receives(), 0);
        assert_eq!(trace.count_containing(TraceLevel::Error, "AccessDenied"), 1);
    }

    #[test]
    fn stop_is_bounded_when_thread_hangs() {
        let client = Arc::new(
            FakeQueueClient::new().on_receive(|_| thread::sleep(Duration::from_millis(800))),
        );
        let options = ListenerOptions {
            stop_timeout: Duration::from_millis(50),
            ..options()
        };
        let (service, trace, _) = service(client.clone(), options);

        service.start().unwrap();
        wait_until(|| client.receives() > 0);

        let started = Instant::now();
        assert!(service.stop().is_none());
        assert!(started.elapsed() < Duration::from_millis(600));
        assert_eq!(trace.count_containing(TraceLevel::Warning, "did not exit"), 1);
    }

    #[test]
    fn host_shutdown_stops_the_loop() {
        let client = Arc::new(FakeQueueClient::new());
        let (service, _, context) = service(client.clone(), options());

        service.start().unwrap();
        wait_until(|| client.receives() > 0);
        context.shutdown(synchrofeed_common::ShutdownReason::UserCancelled);

        let stats = service.stop().unwrap();
        assert!(stats.polls >= 1);
    }

    #[test]
    fn second_start_is_rejected() {
        let client = Arc::new(FakeQueueClient::new());
        let (service, _, _) = service(client, options());
        service.start().unwrap();
        assert!(service.start().is_err());
        service.stop();
    }

    #[test]
    fn exit_signal_fires_when_listener_thread_dies() {
        let client = Arc::new(FakeQueueClient::new().on_receive(|_| panic!("receive blew up")));
        let (service, trace, _) = service(client, options());
        assert!(service.exit_signal().is_none());

        service.start().unwrap();
        let exited = service.exit_signal().unwrap();
        assert_eq!(
            exited.recv_timeout(Duration::from_secs(5)),
            Err(RecvTimeoutError::Disconnected)
        );

        assert!(service.stop().is_none());
        assert_eq!(trace.count_containing(TraceLevel::Error, "panicked"), 1);
    }

    #[test]
    fn stop_without_start_is_a_no_op() {
        let (service, _, _) = service(Arc::new(FakeQueueClient::new()), options());
        assert!(service.stop().is_none());
    }

    #[test]
    fn check_resolves_without_spawning() {
        let client = Arc::new(FakeQueueClient::new());
        let (service, _, _) = service(client.clone(), options());
        assert!(service.check().is_ok());
        assert!(!service.is_running());
        assert_eq!(client.receives(), 0);
    }
}
