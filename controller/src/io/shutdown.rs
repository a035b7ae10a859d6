//! Out-of-band shutdown request shared between the Ctrl-C handler and the loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use tracing::warn;

/// Cloneable flag; once requested it stays requested.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    requested: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Route SIGINT/SIGTERM to this flag. Can be installed once per process.
    pub fn install_ctrlc_handler(&self) -> Result<()> {
        let requested = Arc::clone(&self.requested);
        ctrlc::set_handler(move || {
            if !requested.swap(true, Ordering::SeqCst) {
                warn!("shutdown requested, terminating in-flight command");
            }
        })
        .context("install ctrl-c handler")
    }
}
