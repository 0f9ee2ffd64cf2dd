use std::future::Future;

/// Runs async operations to completion from synchronous code.
///
/// Owns a single-threaded tokio runtime. The listener thread is a plain
/// `std::thread`, so every queue and action call it makes goes through
/// [`SyncBridge::run_sync`].
#[derive(Debug)]
pub struct SyncBridge {
    runtime: tokio::runtime::Runtime,
}

impl SyncBridge {
    pub fn new() -> anyhow::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .thread_name("synchrofeed-bridge")
            .build()?;
        Ok(Self { runtime })
    }

    /// Block the calling thread until `future` completes.
    ///
    /// Must not be called from inside another tokio runtime.
    pub fn run_sync<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }
}
