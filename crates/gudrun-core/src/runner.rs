use crate::common::RunSettings;
use crate::config::{GudrunFile, SampleLocator};
use crate::domain::{GudrunError, GudrunResult};
use crate::engine::{CancellationToken, CompletionBarrier, EngineInvoker};
use crate::output::{GudrunOutput, OutputOrganizer, result_file_name};
use crate::report::GudFile;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Drives single engine invocations: serialize, invoke, wait for results,
/// organise.
///
/// Every invocation gets its own temporary working directory, which is
/// emptied into the output tree and removed afterwards.
#[derive(Debug)]
pub struct GudrunRunner<E> {
    engine: E,
    settings: RunSettings,
    cancel: CancellationToken,
}

impl<E: EngineInvoker> GudrunRunner<E> {
    pub fn new(engine: E, settings: RunSettings) -> Self {
        Self {
            engine,
            settings,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    fn barrier(&self) -> CompletionBarrier {
        CompletionBarrier::new(self.settings.barrier_timeout(), self.settings.barrier_poll())
    }

    /// One whole-document pass into the configured output directory.
    pub fn run(&self, document: &GudrunFile) -> GudrunResult<GudrunOutput> {
        self.run_into(document, &self.settings.output_dir())
    }

    pub fn run_into(&self, document: &GudrunFile, output_dir: &Path) -> GudrunResult<GudrunOutput> {
        if self.cancel.is_cancelled() {
            return Err(GudrunError::Cancelled);
        }

        document.check_sample_names()?;

        let working = tempfile::Builder::new()
            .prefix("gudrun-run-")
            .tempdir()
            .map_err(|source| GudrunError::io(std::env::temp_dir(), source))?;
        let config_path = working.path().join(&self.settings.input_file_name);
        fs::write(&config_path, document.to_text())
            .map_err(|source| GudrunError::io(&config_path, source))?;

        let started = SystemTime::now();
        let run = self.engine.invoke(&config_path, working.path(), &self.cancel)?;
        tracing::debug!(stdout_bytes = run.stdout.len(), "engine finished");

        let expected = document
            .running_samples()
            .filter_map(|sample| sample.data_files.files.first())
            .map(|data_file| working.path().join(result_file_name(data_file)))
            .collect::<Vec<PathBuf>>();
        self.barrier().wait(&expected, started);

        let output = OutputOrganizer::new(
            document,
            working.path(),
            &self.settings.input_file_name,
            output_dir,
        )
        .overwrite(self.settings.overwrite)
        .organise()?;
        tracing::info!(
            output = %output.output_dir.display(),
            samples = output.samples.len(),
            "run complete"
        );
        Ok(output)
    }

    /// Runs the single sample at `locator` on its own, sharing the
    /// instrument, beam and normalisation sections with `document`.
    pub fn run_isolated(
        &self,
        document: &GudrunFile,
        locator: SampleLocator,
        output_dir: &Path,
    ) -> GudrunResult<GudrunOutput> {
        let isolated = document.isolate(locator).ok_or_else(|| {
            GudrunError::InvalidState(format!(
                "no sample at background {} index {}",
                locator.background, locator.sample
            ))
        })?;
        self.run_into(&isolated, output_dir)
    }
}

/// Parses the result report the manifest recorded for `sample`.
pub fn sample_report(output: &GudrunOutput, sample: &str) -> GudrunResult<GudFile> {
    let path = output.gud_file(sample).ok_or_else(|| {
        GudrunError::path(
            output.output_dir.join(sample),
            format!("no result report was produced for sample '{sample}'"),
        )
    })?;
    GudFile::from_path(path)
}

#[cfg(test)]
mod tests {
    use super::{GudrunRunner, sample_report};
    use crate::common::RunSettings;
    use crate::config::{DataFiles, GudrunFile, Sample, SampleBackground};
    use crate::domain::{GudrunError, GudrunResult};
    use crate::engine::{CancellationToken, EngineInvoker, EngineRun};
    use std::cell::RefCell;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    struct RecordingEngine {
        configs: RefCell<Vec<String>>,
    }

    impl EngineInvoker for RecordingEngine {
        fn invoke(
            &self,
            config_path: &Path,
            working_dir: &Path,
            _cancel: &CancellationToken,
        ) -> GudrunResult<EngineRun> {
            let text = fs::read_to_string(config_path).expect("config should be readable");
            self.configs.borrow_mut().push(text);
            fs::write(working_dir.join("W1.gud"), "report").expect("report should be written");
            fs::write(working_dir.join("W1.dcs01"), "dcs").expect("dcs should be written");
            Ok(EngineRun {
                stdout: "Got to: END\n".to_string(),
                stderr: String::new(),
            })
        }
    }

    fn settings(root: &Path) -> RunSettings {
        RunSettings {
            output_root: root.to_path_buf(),
            barrier_timeout_ms: 200,
            barrier_poll_ms: 5,
            ..RunSettings::default()
        }
    }

    fn document() -> GudrunFile {
        let mut water = Sample::default();
        water.name = "Water".to_string();
        water.data_files = DataFiles::new(vec!["W1.raw".to_string()], 1);
        let mut ice = Sample::default();
        ice.name = "Ice".to_string();
        ice.data_files = DataFiles::new(vec!["I1.raw".to_string()], 1);
        GudrunFile {
            sample_backgrounds: vec![SampleBackground {
                data_files: DataFiles::default(),
                samples: vec![water, ice],
            }],
            ..GudrunFile::default()
        }
    }

    #[test]
    fn run_writes_config_and_organises_outputs() {
        let root = TempDir::new().expect("tempdir should be created");
        let runner = GudrunRunner::new(
            RecordingEngine {
                configs: RefCell::new(Vec::new()),
            },
            settings(root.path()),
        );

        let output = runner.run(&document()).expect("run should succeed");
        assert_eq!(output.output_dir, root.path().join("Gudrun"));
        assert_eq!(
            output.gud_file("Water").map(Path::to_path_buf),
            Some(root.path().join("Gudrun/Water/Outputs/W1.gud"))
        );
        assert!(output.input_file_path.ends_with("gudpy.txt"));
        assert!(output.input_file_path.is_file());

        let missing = sample_report(&output, "Ice").expect_err("ice produced no report");
        assert!(matches!(missing, GudrunError::Path { .. }));
    }

    #[test]
    fn isolated_run_only_serializes_the_selected_sample() {
        let root = TempDir::new().expect("tempdir should be created");
        let runner = GudrunRunner::new(
            RecordingEngine {
                configs: RefCell::new(Vec::new()),
            },
            settings(root.path()),
        );
        let document = document();
        let locator = document.locate_sample("Water").expect("sample should exist");

        let output = runner
            .run_isolated(&document, locator, &root.path().join("isolated"))
            .expect("isolated run should succeed");
        assert_eq!(output.samples.keys().collect::<Vec<_>>(), vec!["Water"]);

        let configs = runner.engine.configs.borrow();
        assert!(configs[0].contains("SAMPLE Water"));
        assert!(!configs[0].contains("SAMPLE Ice"));
    }

    #[test]
    fn cancelled_runner_never_invokes() {
        let root = TempDir::new().expect("tempdir should be created");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let runner = GudrunRunner::new(
            RecordingEngine {
                configs: RefCell::new(Vec::new()),
            },
            settings(root.path()),
        )
        .with_cancellation(cancel);

        let error = runner.run(&document()).expect_err("run should be cancelled");
        assert!(matches!(error, GudrunError::Cancelled));
        assert!(runner.engine.configs.borrow().is_empty());
        assert!(!PathBuf::from(root.path()).join("Gudrun").exists());
    }
}
