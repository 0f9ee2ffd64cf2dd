// synchrofeed-common: Shared services and infrastructure for the SynchroFeed listener.
// Depends on `synchrofeed-sdk`; knows nothing about queues or feed events.

pub mod constants;
pub mod host_context;
pub mod http_client_factory;
pub mod secret_masker;
pub mod settings_store;
pub mod sync_bridge;
pub mod tracing;

// ---------------------------------------------------------------------------
// Re-exports for convenient access
// ---------------------------------------------------------------------------

pub use host_context::{HostContext, ShutdownReason};
pub use http_client_factory::HttpClientFactory;
pub use secret_masker::SecretMasker;
pub use settings_store::{
    ApplicationSettings, AwsCredentials, AwsSettings, AwsSqs, ListenerSettings, SettingsError,
    SettingsStore,
};
pub use sync_bridge::SyncBridge;
pub use tracing::{TraceEventType, TraceManager, TraceSetting, Tracing};
