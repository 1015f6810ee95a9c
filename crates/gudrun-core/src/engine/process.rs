use super::{CancellationToken, EngineInvoker, EngineRun};
use crate::common::constants::PROGRESS_MARKER;
use crate::domain::{GudrunError, GudrunResult};
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;

const EXIT_POLL: Duration = Duration::from_millis(10);

/// Spawns `program [leading_args...] <config path>` in the working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEngine {
    program: PathBuf,
    leading_args: Vec<String>,
}

impl ProcessEngine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl EngineInvoker for ProcessEngine {
    fn invoke(
        &self,
        config_path: &Path,
        working_dir: &Path,
        cancel: &CancellationToken,
    ) -> GudrunResult<EngineRun> {
        if cancel.is_cancelled() {
            return Err(GudrunError::Cancelled);
        }

        tracing::info!(
            program = %self.program.display(),
            config = %config_path.display(),
            "invoking engine"
        );
        let mut child = Command::new(&self.program)
            .args(&self.leading_args)
            .arg(config_path)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|error| {
                GudrunError::engine(
                    format!("`{}` could not be started: {error}", self.program.display()),
                    "",
                    "",
                )
            })?;

        let stdout_reader = child.stdout.take().map(|stdout| {
            thread::spawn(move || {
                let mut captured = String::new();
                for line in BufReader::new(stdout).lines().map_while(Result::ok) {
                    if line.contains(PROGRESS_MARKER) {
                        tracing::debug!(progress = %line.trim(), "engine progress");
                    }
                    captured.push_str(&line);
                    captured.push('\n');
                }
                captured
            })
        });
        let stderr_reader = child.stderr.take().map(|mut stderr| {
            thread::spawn(move || {
                let mut captured = String::new();
                let _ = stderr.read_to_string(&mut captured);
                captured
            })
        });

        let outcome = wait_or_cancel(&mut child, cancel);
        let stdout = stdout_reader
            .and_then(|reader| reader.join().ok())
            .unwrap_or_default();
        let stderr = stderr_reader
            .and_then(|reader| reader.join().ok())
            .unwrap_or_default();

        match outcome? {
            Some(status) if status.success() => Ok(EngineRun { stdout, stderr }),
            Some(status) => Err(GudrunError::engine(
                format!("`{}` failed with {status}", self.program.display()),
                &stdout,
                &stderr,
            )),
            None => Err(GudrunError::Cancelled),
        }
    }
}

/// `None` when the child was killed after cancellation.
fn wait_or_cancel(
    child: &mut Child,
    cancel: &CancellationToken,
) -> GudrunResult<Option<std::process::ExitStatus>> {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(Some(status)),
            Ok(None) if cancel.is_cancelled() => {
                tracing::warn!("cancellation requested; terminating engine");
                let _ = child.kill();
                let _ = child.wait();
                return Ok(None);
            }
            Ok(None) => thread::sleep(EXIT_POLL),
            Err(error) => {
                return Err(GudrunError::engine(
                    format!("could not be awaited: {error}"),
                    "",
                    "",
                ));
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::ProcessEngine;
    use crate::domain::GudrunError;
    use crate::engine::{CancellationToken, EngineInvoker};
    use std::fs;
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    fn script(body: &str) -> ProcessEngine {
        ProcessEngine::new("sh").with_args(["-c", body, "engine"])
    }

    #[test]
    fn captures_output_and_runs_in_working_dir() {
        let temp = TempDir::new().expect("tempdir should be created");
        let config = temp.path().join("gudpy.txt");
        fs::write(&config, "INSTRUMENT {").expect("config should be written");

        let engine = script("echo 'Got to: INSTRUMENT'; head -c 10 \"$1\"; touch produced.gud");
        let run = engine
            .invoke(&config, temp.path(), &CancellationToken::new())
            .expect("engine should succeed");

        assert!(run.stdout.starts_with("Got to: INSTRUMENT\n"));
        assert!(run.stdout.contains("INSTRUMENT"));
        assert!(temp.path().join("produced.gud").is_file());
    }

    #[test]
    fn non_zero_exit_surfaces_captured_streams() {
        let temp = TempDir::new().expect("tempdir should be created");
        let config = temp.path().join("gudpy.txt");
        fs::write(&config, "").expect("config should be written");

        let error = script("echo partial; echo broken >&2; exit 3")
            .invoke(&config, temp.path(), &CancellationToken::new())
            .expect_err("engine should fail");

        assert_eq!(error.engine_output(), Some(("partial\n", "broken\n")));
        assert_eq!(error.exit_code(), 4);
    }

    #[test]
    fn cancellation_kills_a_running_engine() {
        let temp = TempDir::new().expect("tempdir should be created");
        let config = temp.path().join("gudpy.txt");
        fs::write(&config, "").expect("config should be written");

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            trigger.cancel();
        });

        let error = script("exec sleep 30")
            .invoke(&config, temp.path(), &cancel)
            .expect_err("engine should be cancelled");
        canceller.join().expect("canceller should finish");
        assert!(matches!(error, GudrunError::Cancelled));
    }

    #[test]
    fn missing_program_is_an_engine_error() {
        let temp = TempDir::new().expect("tempdir should be created");
        let error = ProcessEngine::new(temp.path().join("no-such-engine"))
            .invoke(&temp.path().join("gudpy.txt"), temp.path(), &CancellationToken::new())
            .expect_err("spawn should fail");
        assert!(matches!(error, GudrunError::Engine { .. }));
    }
}
