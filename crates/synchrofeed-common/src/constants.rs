// Process-wide constants: exit codes, well-known file names, environment variables.

use std::time::Duration;

/// Settings file used when none is given on the command line.
pub const DEFAULT_CONFIG_FILE: &str = "app.json";

/// How long a stop request waits for the listener thread to exit.
pub const LISTENER_STOP_TIMEOUT: Duration = Duration::from_secs(120);

/// Long-poll wait for a single receive call against the queue.
pub const RECEIVE_WAIT_TIME: Duration = Duration::from_secs(10);

/// AWS region used when the settings do not name one.
pub const DEFAULT_AWS_REGION: &str = "us-east-1";

/// Name of the dedicated listener thread.
pub const LISTENER_THREAD_NAME: &str = "queue-listener";

/// Process exit codes.
pub mod return_code {
    pub const SUCCESS: i32 = 0;
    /// Startup failed (queue unavailable, runtime could not be built, ...).
    pub const TERMINATED_ERROR: i32 = 1;
    /// The settings file is missing or invalid.
    pub const CONFIGURATION_ERROR: i32 = 2;
}

/// Environment variables read by the listener.
pub mod variables {
    /// Settings file path when `-config:` is not given.
    pub const CONFIG: &str = "SYNCHROFEED_CONFIG";
    /// Minimum trace level (`verbose`, `info`, `warning`, `error`).
    pub const TRACE_LEVEL: &str = "SYNCHROFEED_TRACE_LEVEL";
    /// Mirror every trace line to stdout.
    pub const PRINT_LOG_TO_STDOUT: &str = "SYNCHROFEED_PRINT_LOG_TO_STDOUT";
    /// Disable TLS certificate validation for feed HTTP calls.
    pub const TLS_NO_VERIFY: &str = "SYNCHROFEED_TLS_NO_VERIFY";
    /// Credential fallbacks when the settings file leaves them empty.
    pub const AWS_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
    pub const AWS_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
}
