use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Waits, after the engine has exited, until every expected result file is
/// present and was modified during the current invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionBarrier {
    pub timeout: Duration,
    pub poll: Duration,
}

impl Default for CompletionBarrier {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            poll: Duration::from_millis(25),
        }
    }
}

impl CompletionBarrier {
    pub fn new(timeout: Duration, poll: Duration) -> Self {
        Self { timeout, poll }
    }

    /// Returns the files still missing or stale when the timeout elapsed;
    /// an empty list means the barrier was passed.
    pub fn wait(&self, expected: &[PathBuf], started: SystemTime) -> Vec<PathBuf> {
        let deadline = Instant::now() + self.timeout;
        loop {
            let pending = expected
                .iter()
                .filter(|path| !is_fresh(path, started))
                .cloned()
                .collect::<Vec<_>>();
            if pending.is_empty() {
                return pending;
            }
            if Instant::now() >= deadline {
                for path in &pending {
                    tracing::warn!(path = %path.display(), "result file not ready before timeout");
                }
                return pending;
            }
            thread::sleep(self.poll);
        }
    }
}

/// Modification times are compared at whole-second resolution, since some
/// filesystems truncate them.
fn is_fresh(path: &Path, started: SystemTime) -> bool {
    let Ok(modified) = fs::metadata(path).and_then(|metadata| metadata.modified()) else {
        return false;
    };
    seconds(modified) >= seconds(started)
}

fn seconds(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}
