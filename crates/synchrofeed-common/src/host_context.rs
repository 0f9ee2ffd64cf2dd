// HostContext: the application context shared by every component of the
// listener process. Owns trace creation, the secret masker, path resolution
// and coordinated shutdown.

use crate::secret_masker::SecretMasker;
use crate::tracing::{TraceManager, TraceSetting, Tracing};

use parking_lot::Mutex;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use synchrofeed_sdk::{TraceWriter, WebProxy};
use tokio_util::sync::CancellationToken;

/// Why the process is shutting down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    UserCancelled,
    OperatingSystemShutdown,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::UserCancelled => write!(f, "UserCancelled"),
            ShutdownReason::OperatingSystemShutdown => write!(f, "OperatingSystemShutdown"),
        }
    }
}

/// The central application context.
///
/// Created once in `main` and shared as `Arc<HostContext>`.
pub struct HostContext {
    /// The host type string (e.g. "Listener").
    host_type: String,

    /// Triggered once when the process begins shutting down.
    shutdown_token: CancellationToken,

    /// Set once by [`HostContext::shutdown`].
    shutdown_reason: Mutex<Option<ShutdownReason>>,

    /// Secret masker shared across the whole process.
    secret_masker: SecretMasker,

    /// Proxy configuration read from the environment.
    web_proxy: WebProxy,

    trace_manager: TraceManager,

    /// Override for the binary directory (used in tests).
    bin_override: Mutex<Option<PathBuf>>,
}

impl HostContext {
    /// Create a context with trace settings read from the environment.
    pub fn new(host_type: impl Into<String>) -> Arc<Self> {
        Self::with_setting(host_type, TraceSetting::from_env())
    }

    pub fn with_setting(host_type: impl Into<String>, setting: TraceSetting) -> Arc<Self> {
        let secret_masker = SecretMasker::new();
        let web_proxy = WebProxy::from_env();
        for password in web_proxy.secrets() {
            secret_masker.add_value(&password);
        }

        Arc::new(Self {
            host_type: host_type.into(),
            shutdown_token: CancellationToken::new(),
            shutdown_reason: Mutex::new(None),
            trace_manager: TraceManager::new(secret_masker.clone(), setting),
            secret_masker,
            web_proxy,
            bin_override: Mutex::new(None),
        })
    }

    pub fn host_type(&self) -> &str {
        &self.host_type
    }

    // -----------------------------------------------------------------------
    // Tracing and secrets
    // -----------------------------------------------------------------------

    /// Get a trace source for the given component name.
    pub fn get_trace(&self, name: &str) -> Tracing {
        self.trace_manager.get(name)
    }

    /// Mask `secret` in every trace line from now on.
    pub fn add_secret(&self, secret: &str) {
        self.secret_masker.add_value(secret);
    }

    pub fn secret_masker(&self) -> &SecretMasker {
        &self.secret_masker
    }

    pub fn web_proxy(&self) -> &WebProxy {
        &self.web_proxy
    }

    // -----------------------------------------------------------------------
    // Paths
    // -----------------------------------------------------------------------

    /// Override the binary directory (used primarily for testing).
    pub fn set_bin_override(&self, path: PathBuf) {
        *self.bin_override.lock() = Some(path);
    }

    /// Directory containing the running executable.
    pub fn bin_directory(&self) -> PathBuf {
        if let Some(ref bin) = *self.bin_override.lock() {
            return bin.clone();
        }
        env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Resolve a settings file argument to an absolute path.
    ///
    /// A bare file name is looked up next to the executable; any other
    /// relative path is taken relative to the working directory.
    pub fn resolve_config_file(&self, file: &str) -> PathBuf {
        let path = Path::new(file);
        if path.is_absolute() {
            return path.to_path_buf();
        }

        let is_bare_name = path.parent().map_or(true, |p| p.as_os_str().is_empty());
        if is_bare_name {
            return self.bin_directory().join(path);
        }

        env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }

    // -----------------------------------------------------------------------
    // Shutdown
    // -----------------------------------------------------------------------

    /// Token cancelled when the process shuts down.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn shutdown_reason(&self) -> Option<ShutdownReason> {
        *self.shutdown_reason.lock()
    }

    /// Begin shutdown. Only the first reason is kept.
    pub fn shutdown(&self, reason: ShutdownReason) {
        {
            let mut current = self.shutdown_reason.lock();
            if current.is_some() {
                return;
            }
            *current = Some(reason);
        }
        self.get_trace("HostContext")
            .info(&format!("Listener will be shut down for {}", reason));
        self.shutdown_token.cancel();
    }
}

impl fmt::Debug for HostContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostContext")
            .field("host_type", &self.host_type)
            .field("shutdown_reason", &self.shutdown_reason())
            .finish_non_exhaustive()
    }
}
