//! Build constants for the listener package, taken from compile-time
//! environment variables with sensible defaults.

/// Source control information.
pub struct Source;

impl Source {
    /// The commit hash from which this binary was built.
    /// Set via the `SYNCHROFEED_COMMIT_HASH` env var at compile time, or "N/A".
    pub const COMMIT_HASH: &'static str = match option_env!("SYNCHROFEED_COMMIT_HASH") {
        Some(h) => h,
        None => "N/A",
    };
}

/// Listener package metadata.
#[derive(Debug, Clone)]
pub struct ListenerPackage;

impl ListenerPackage {
    /// The semantic version of the listener, from `Cargo.toml`.
    pub const VERSION: &'static str = env!("CARGO_PKG_VERSION");

    /// Product name used in the user agent and the service banner.
    pub const PRODUCT_NAME: &'static str = "SynchroFeedListener";
}
