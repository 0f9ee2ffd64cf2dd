// Per-component trace sources. Every line is secret-masked before it reaches
// the `tracing` subscriber (and stdout, when mirroring is on).

use crate::constants::variables;
use crate::secret_masker::SecretMasker;
use chrono::Utc;
use synchrofeed_sdk::{StringUtil, TraceWriter};

/// Trace event severity, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TraceEventType {
    Verbose,
    Information,
    Warning,
    Error,
}

impl TraceEventType {
    /// Parse a level name as accepted in `SYNCHROFEED_TRACE_LEVEL`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "verbose" | "debug" | "trace" => Some(Self::Verbose),
            "info" | "information" => Some(Self::Information),
            "warn" | "warning" => Some(Self::Warning),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for TraceEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TraceEventType::Verbose => write!(f, "VERB"),
            TraceEventType::Information => write!(f, "INFO"),
            TraceEventType::Warning => write!(f, "WARN"),
            TraceEventType::Error => write!(f, "ERR "),
        }
    }
}

/// Configuration for trace output.
#[derive(Debug, Clone)]
pub struct TraceSetting {
    /// Minimum severity level to emit.
    pub level: TraceEventType,
    /// Whether to also print to stdout.
    pub print_to_stdout: bool,
}

impl Default for TraceSetting {
    fn default() -> Self {
        Self {
            level: TraceEventType::Information,
            print_to_stdout: false,
        }
    }
}

impl TraceSetting {
    /// Read the setting from `SYNCHROFEED_TRACE_LEVEL` and
    /// `SYNCHROFEED_PRINT_LOG_TO_STDOUT`.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            level: lookup(variables::TRACE_LEVEL)
                .and_then(|v| TraceEventType::parse(&v))
                .unwrap_or(defaults.level),
            print_to_stdout: lookup(variables::PRINT_LOG_TO_STDOUT)
                .and_then(|v| StringUtil::convert_to_bool(&v))
                .unwrap_or(defaults.print_to_stdout),
        }
    }
}

/// A named trace source that masks secrets before emitting log lines.
///
/// Each component gets its own `Tracing`; all of them share one
/// [`SecretMasker`].
#[derive(Debug, Clone)]
pub struct Tracing {
    name: String,
    secret_masker: SecretMasker,
    setting: TraceSetting,
}

impl Tracing {
    pub fn new(name: impl Into<String>, secret_masker: SecretMasker, setting: TraceSetting) -> Self {
        Self {
            name: name.into(),
            secret_masker,
            setting,
        }
    }

    /// Name of this trace source.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether lines of `event_type` pass the configured level.
    pub fn is_enabled(&self, event_type: TraceEventType) -> bool {
        event_type >= self.setting.level
    }

    fn trace(&self, event_type: TraceEventType, message: &str) {
        if !self.is_enabled(event_type) {
            return;
        }

        let masked = self.secret_masker.mask_secrets(message);
        match event_type {
            TraceEventType::Error => tracing::error!(component = %self.name, "{}", masked),
            TraceEventType::Warning => tracing::warn!(component = %self.name, "{}", masked),
            TraceEventType::Information => tracing::info!(component = %self.name, "{}", masked),
            TraceEventType::Verbose => tracing::debug!(component = %self.name, "{}", masked),
        }

        if self.setting.print_to_stdout {
            let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%SZ");
            println!("[{} {} {}] {}", timestamp, event_type, self.name, masked);
        }
    }

    /// Log an error and its whole source chain.
    pub fn error_chain(&self, err: &anyhow::Error) {
        self.error(&format!("{:#}", err));
    }
}

impl TraceWriter for Tracing {
    fn info(&self, message: &str) {
        self.trace(TraceEventType::Information, message);
    }

    fn verbose(&self, message: &str) {
        self.trace(TraceEventType::Verbose, message);
    }

    fn warning(&self, message: &str) {
        self.trace(TraceEventType::Warning, message);
    }

    fn error(&self, message: &str) {
        self.trace(TraceEventType::Error, message);
    }
}

/// Hands out trace sources that share one masker and one setting.
#[derive(Debug)]
pub struct TraceManager {
    secret_masker: SecretMasker,
    setting: TraceSetting,
}

impl TraceManager {
    pub fn new(secret_masker: SecretMasker, setting: TraceSetting) -> Self {
        Self {
            secret_masker,
            setting,
        }
    }

    /// Get (create) a named trace source.
    pub fn get(&self, name: &str) -> Tracing {
        Tracing::new(name, self.secret_masker.clone(), self.setting.clone())
    }

    pub fn setting(&self) -> &TraceSetting {
        &self.setting
    }

    pub fn secret_masker(&self) -> &SecretMasker {
        &self.secret_masker
    }
}
