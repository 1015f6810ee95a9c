mod barrier;
mod process;

pub use barrier::CompletionBarrier;
pub use process::ProcessEngine;

use crate::domain::GudrunResult;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Captured output of one finished engine invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineRun {
    pub stdout: String,
    pub stderr: String,
}

/// Runs the correction engine against a serialized configuration.
///
/// Implementations must block until the engine has exited, and should stop
/// it early once `cancel` fires.
pub trait EngineInvoker {
    fn invoke(
        &self,
        config_path: &Path,
        working_dir: &Path,
        cancel: &CancellationToken,
    ) -> GudrunResult<EngineRun>;
}

impl<E: EngineInvoker + ?Sized> EngineInvoker for &E {
    fn invoke(
        &self,
        config_path: &Path,
        working_dir: &Path,
        cancel: &CancellationToken,
    ) -> GudrunResult<EngineRun> {
        (**self).invoke(config_path, working_dir, cancel)
    }
}

/// Shared interruption flag; clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
