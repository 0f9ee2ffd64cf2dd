// Entry point for the SynchroFeed listener process.
//
// Parses CLI args, initialises logging, creates the HostContext and hands
// off to the Application. Everything here is synchronous; async work runs on
// the SyncBridge owned by the listener.

use synchrofeed_common::constants::return_code;
use synchrofeed_common::{HostContext, TraceEventType, TraceSetting};
use synchrofeed_listener::application::Application;
use synchrofeed_listener::command_settings::CommandSettings;
use synchrofeed_sdk::{ListenerPackage, Source};
use tracing_subscriber::EnvFilter;

fn init_logging(setting: &TraceSetting) {
    let default_level = match setting.level {
        TraceEventType::Verbose => "debug",
        TraceEventType::Information => "info",
        TraceEventType::Warning => "warn",
        TraceEventType::Error => "error",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // stdout is reserved for command output and the optional trace mirror.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let settings = CommandSettings::parse();
    let trace_setting = TraceSetting::from_env();
    init_logging(&trace_setting);

    tracing::info!("SynchroFeed listener process starting.");
    tracing::info!("  Version = {}", ListenerPackage::VERSION);
    tracing::info!("  Commit  = {}", Source::COMMIT_HASH);

    let context = HostContext::with_setting("Listener", trace_setting);
    let application = Application::new(context);

    let exit_code = application.execute_command(&settings);
    if exit_code != return_code::SUCCESS {
        tracing::error!("Listener exiting with code {}", exit_code);
    }
    std::process::exit(exit_code);
}
