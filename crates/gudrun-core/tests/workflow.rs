use gudrun_core::common::RunSettings;
use gudrun_core::config::GudrunFile;
use gudrun_core::domain::{GudrunError, GudrunResult};
use gudrun_core::engine::{CancellationToken, EngineInvoker, EngineRun};
use gudrun_core::iterate::{IterationController, IterationMode};
use gudrun_core::output::{data_file_stem, result_file_name};
use gudrun_core::report::GudFile;
use gudrun_core::runner::sample_report;
use gudrun_core::GudrunRunner;
use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Writes a report whose merged level tracks the sample's tweak factor, plus
/// a few artifacts the organiser has to sort.
struct TweakEngine {
    calls: Cell<usize>,
}

impl EngineInvoker for TweakEngine {
    fn invoke(
        &self,
        config_path: &Path,
        working_dir: &Path,
        _cancel: &CancellationToken,
    ) -> GudrunResult<EngineRun> {
        self.calls.set(self.calls.get() + 1);
        let document = GudrunFile::from_path(config_path)?;
        for sample in document.running_samples() {
            let first = &sample.data_files.files[0];
            GudFile::new(
                working_dir.join(result_file_name(first)),
                &sample.name,
                5.48904,
                5.0 * sample.tweak_factor,
                5.48904 / 5.0,
            )
            .write_out(true)?;
            let stem = data_file_stem(first);
            for extension in ["mint01", "dcs01", "foo"] {
                let path = working_dir.join(format!("{stem}.{extension}"));
                fs::write(&path, "0 0\n").map_err(|source| GudrunError::io(&path, source))?;
            }
        }
        let stray = working_dir.join("fort.7");
        fs::write(&stray, "scratch").map_err(|source| GudrunError::io(&stray, source))?;
        Ok(EngineRun {
            stdout: "Got to: SAMPLE BACKGROUND\nGot to: END\n".to_string(),
            stderr: String::new(),
        })
    }
}

fn fixture() -> GudrunFile {
    GudrunFile::from_path(
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/nimrod_water.txt"),
    )
    .expect("fixture should parse")
}

fn runner(root: &Path, overwrite: bool) -> GudrunRunner<TweakEngine> {
    GudrunRunner::new(
        TweakEngine {
            calls: Cell::new(0),
        },
        RunSettings {
            output_root: root.to_path_buf(),
            overwrite,
            barrier_timeout_ms: 2_000,
            barrier_poll_ms: 5,
            ..RunSettings::default()
        },
    )
}

#[test]
fn run_sorts_artifacts_into_the_output_tree() {
    let root = TempDir::new().expect("tempdir should be created");
    let output = runner(root.path(), true)
        .run(&fixture())
        .expect("run should succeed");

    let tree = root.path().join("Gudrun");
    assert_eq!(output.output_dir, tree);
    assert_eq!(output.input_file_path, tree.join("gudpy.txt"));
    assert!(output.input_file_path.is_file());

    let sample = output.sample("H2O").expect("sample should be organised");
    let outputs = tree.join("H2O/Outputs");
    assert_eq!(
        sample.gud_file.as_deref(),
        Some(outputs.join("NIMROD00016609_H2O_in_N9.gud").as_path())
    );
    assert_eq!(
        sample.output("mint01"),
        Some(outputs.join("NIMROD00016609_H2O_in_N9.mint01").as_path())
    );
    assert_eq!(
        sample.diagnostic("foo"),
        Some(
            tree.join("H2O/Diagnostics/NIMROD00016609_H2O_in_N9.foo")
                .as_path()
        )
    );
    assert!(output
        .additional_outputs
        .iter()
        .any(|path| path.ends_with("AdditionalOutputs/fort.7")));

    let report = sample_report(&output, "H2O").expect("report should parse");
    assert_eq!(report.expected_dcs.value, 5.48904);
    assert_eq!(report.average_level_merged_dcs.value, 5.0);
}

#[test]
fn overwrite_archives_and_no_overwrite_writes_a_sibling() {
    let root = TempDir::new().expect("tempdir should be created");
    let document = fixture();

    let first = runner(root.path(), true)
        .run(&document)
        .expect("first run should succeed");
    assert_eq!(first.archived_to, None);

    let second = runner(root.path(), true)
        .run(&document)
        .expect("second run should succeed");
    let archive = second.archived_to.expect("previous tree should be archived");
    assert_eq!(archive, root.path().join("Gudrun.archive-1"));
    assert!(archive.join("H2O/Outputs/NIMROD00016609_H2O_in_N9.gud").is_file());
    assert!(second.output_dir.join("H2O/Outputs").is_dir());

    let third = runner(root.path(), false)
        .run(&document)
        .expect("third run should succeed");
    assert_eq!(third.output_dir, root.path().join("Gudrun_1"));
    assert_eq!(third.archived_to, None);
    assert!(root.path().join("Gudrun/gudpy.txt").is_file());
}

#[test]
fn tweak_factor_iteration_converges_on_the_expected_level() {
    let root = TempDir::new().expect("tempdir should be created");
    let runner = runner(root.path(), true);
    let mut controller =
        IterationController::new(&runner, fixture(), IterationMode::TweakFactor, 2);

    let output = controller
        .run_to_completion()
        .expect("iteration should succeed")
        .expect("passes should have run");
    assert_eq!(runner_calls(&runner), 3);

    let sample = controller
        .document()
        .samples()
        .next()
        .expect("sample should remain");
    assert!((sample.tweak_factor - 5.48904 / 5.0).abs() < 1e-12);

    let report = sample_report(&output, "H2O").expect("report should parse");
    assert!((report.average_level_merged_dcs.value - 5.48904).abs() < 1e-9);
}

#[test]
fn cancelled_iteration_stops_before_the_next_pass() {
    let root = TempDir::new().expect("tempdir should be created");
    let cancel = CancellationToken::new();
    let runner = runner(root.path(), true).with_cancellation(cancel.clone());
    let mut controller =
        IterationController::new(&runner, fixture(), IterationMode::Density, 3);

    assert!(controller.step().expect("baseline should run").is_some());
    cancel.cancel();
    let error = controller.step().expect_err("cancelled pass should fail");
    assert!(matches!(error, GudrunError::Cancelled));
    assert_eq!(runner_calls(&runner), 1);
}

fn runner_calls(runner: &GudrunRunner<TweakEngine>) -> usize {
    runner.engine().calls.get()
}
