// Application: dispatches the parsed command and owns the process lifecycle
// for `run` (load settings, start the service, wait for a shutdown signal,
// stop the service).

use crate::builtin_actions::BuiltinActionProcessor;
use crate::command_settings::{Command, CommandSettings};
use crate::listener_service::{ListenerOptions, ListenerService};
use crate::queue_client::{QueueClient, SqsQueueClient};

use anyhow::{Context, Result};
use crossbeam_channel::Receiver;
use std::sync::Arc;
use synchrofeed_common::constants::return_code;
use synchrofeed_common::{
    HostContext, HttpClientFactory, ListenerSettings, SettingsStore, ShutdownReason, Tracing,
};
use synchrofeed_sdk::{ActionProcessor, ListenerPackage, Source, TraceWriter};

pub struct Application {
    context: Arc<HostContext>,
    trace: Tracing,
}

impl Application {
    pub fn new(context: Arc<HostContext>) -> Self {
        let trace = context.get_trace("Application");
        Self { context, trace }
    }

    /// Run the command and return the process exit code.
    pub fn execute_command(&self, settings: &CommandSettings) -> i32 {
        for arg in settings.unknown_args() {
            self.trace.warning(&format!("Ignoring unknown argument '{arg}'"));
        }

        match settings.command() {
            Command::Help => {
                print!("{}", CommandSettings::usage());
                return_code::SUCCESS
            }
            Command::Version => {
                println!("{}", ListenerPackage::VERSION);
                return_code::SUCCESS
            }
            Command::Check => self.with_settings(settings, |s| self.check(s)),
            Command::Run => self.with_settings(settings, |s| self.run(s)),
        }
    }

    fn with_settings<F>(&self, command: &CommandSettings, f: F) -> i32
    where
        F: FnOnce(ListenerSettings) -> Result<i32>,
    {
        let path = self.context.resolve_config_file(&command.config_file());
        self.trace
            .info(&format!("Loading settings from {}", path.display()));

        let settings = match SettingsStore::new(&path).load() {
            Ok(settings) => settings,
            Err(e) => {
                self.trace.error_chain(&anyhow::Error::new(e));
                return return_code::CONFIGURATION_ERROR;
            }
        };
        self.context
            .add_secret(&settings.aws_settings.credentials.secret_key);

        match f(settings) {
            Ok(code) => code,
            Err(e) => {
                self.trace.error_chain(&e);
                return_code::TERMINATED_ERROR
            }
        }
    }

    fn build_service(&self, settings: ListenerSettings) -> Result<ListenerService> {
        let http = HttpClientFactory::create_client(self.context.web_proxy())?;
        let action_processor: Arc<dyn ActionProcessor> = Arc::new(
            BuiltinActionProcessor::new(
                settings.feed_settings.feeds.clone(),
                http,
                Arc::new(self.context.get_trace("Actions")),
            )
            .context("invalid feed configuration")?,
        );
        let client: Arc<dyn QueueClient> = Arc::new(SqsQueueClient::new(&settings.aws_settings));

        Ok(ListenerService::new(
            self.context.clone(),
            settings,
            client,
            action_processor,
            ListenerOptions::default(),
        ))
    }

    fn check(&self, settings: ListenerSettings) -> Result<i32> {
        let action_count = settings.feed_settings.actions.len();
        let service = self.build_service(settings)?;
        let queue = service.check()?;
        println!("Settings OK: {action_count} action(s), queue {queue}");
        Ok(return_code::SUCCESS)
    }

    fn run(&self, settings: ListenerSettings) -> Result<i32> {
        self.trace.info(&format!(
            "{} {} ({}) starting",
            ListenerPackage::PRODUCT_NAME,
            ListenerPackage::VERSION,
            Source::COMMIT_HASH
        ));

        let service = self.build_service(settings)?;

        let (signal_tx, signal_rx) = crossbeam_channel::bounded::<()>(1);
        let context = self.context.clone();
        ctrlc::set_handler(move || {
            context.shutdown(ShutdownReason::UserCancelled);
            let _ = signal_tx.try_send(());
        })
        .context("unable to install the shutdown signal handler")?;

        service.start()?;
        let listener_exit = service
            .exit_signal()
            .context("listener thread is not running")?;

        let mut wake = wait_for_shutdown(&signal_rx, &listener_exit);
        // A signal also stops the listener, so both channels may be ready.
        if self.context.shutdown_reason().is_some() {
            wake = Wake::Signal;
        }
        if wake == Wake::ListenerExited {
            self.trace.error("Queue listener exited unexpectedly");
        }

        if let Some(stats) = service.stop() {
            self.trace.info(&format!("Listener totals: {stats}"));
        }
        Ok(match wake {
            Wake::Signal => return_code::SUCCESS,
            Wake::ListenerExited => return_code::TERMINATED_ERROR,
        })
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Wake {
    Signal,
    ListenerExited,
}

/// Block until a shutdown signal arrives or the listener thread returns.
/// A dropped signal handler counts as a signal.
fn wait_for_shutdown(signal: &Receiver<()>, listener_exit: &Receiver<()>) -> Wake {
    crossbeam_channel::select! {
        recv(signal) -> _ => Wake::Signal,
        recv(listener_exit) -> _ => Wake::ListenerExited,
    }
}
