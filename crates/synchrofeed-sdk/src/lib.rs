// synchrofeed-sdk: Foundation layer for the SynchroFeed listener.
// This crate has ZERO dependencies on other workspace crates and provides the
// tracing abstraction, the action processor contract, and small helpers.

pub mod action_processor;
pub mod build_constants;
pub mod string_util;
pub mod trace;
pub mod version_util;
pub mod web_proxy;

// Re-export commonly used items at crate root
pub use action_processor::{
    Action, ActionConfig, ActionProcessor, ActionScope, FeedConfig, Package, PackageEvent,
    SourceRepository,
};
pub use build_constants::{ListenerPackage, Source};
pub use string_util::StringUtil;
pub use trace::TraceWriter;
pub use version_util::VersionUtil;
pub use web_proxy::WebProxy;
