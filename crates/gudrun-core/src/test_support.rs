use crate::common::RunSettings;
use crate::config::{DataFiles, GudrunFile, Sample, SampleBackground};
use crate::domain::{Geometry, GudrunError, GudrunResult};
use crate::engine::{CancellationToken, EngineInvoker, EngineRun};
use crate::output::{data_file_stem, result_file_name};
use crate::report::GudFile;
use std::cell::{Cell, RefCell};
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Levels reported for a sample: `(expected, achieved, suggested tweak)`.
pub type Levels = (f64, f64, f64);

/// Engine stand-in that records every configuration it receives and writes
/// a result report for each running sample.
pub struct ReportingEngine<F> {
    levels: F,
    pub configs: RefCell<Vec<GudrunFile>>,
    fail_from: Option<usize>,
    silent: Option<&'static str>,
    calls: Cell<usize>,
}

impl<F: Fn(&Sample) -> Levels> ReportingEngine<F> {
    pub fn new(levels: F) -> Self {
        Self {
            levels,
            configs: RefCell::new(Vec::new()),
            fail_from: None,
            silent: None,
            calls: Cell::new(0),
        }
    }

    /// Invocations numbered `call` and later fail.
    pub fn failing_from(mut self, call: usize) -> Self {
        self.fail_from = Some(call);
        self
    }

    /// Writes nothing for the sample called `name`.
    pub fn without_report_for(mut self, name: &'static str) -> Self {
        self.silent = Some(name);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl<F: Fn(&Sample) -> Levels> EngineInvoker for ReportingEngine<F> {
    fn invoke(
        &self,
        config_path: &Path,
        working_dir: &Path,
        _cancel: &CancellationToken,
    ) -> GudrunResult<EngineRun> {
        let call = self.calls.get();
        self.calls.set(call + 1);
        if self.fail_from.is_some_and(|first| call >= first) {
            return Err(GudrunError::engine(
                "engine exited with status 1",
                "Got to: SAMPLE BACKGROUND\n",
                "segmentation fault\n",
            ));
        }

        let document = GudrunFile::from_path(config_path).expect("config should parse");
        for sample in document.running_samples() {
            if self.silent == Some(sample.name.as_str()) {
                continue;
            }
            let first = &sample.data_files.files[0];
            let (expected, achieved, tweak) = (self.levels)(sample);
            GudFile::new(
                working_dir.join(result_file_name(first)),
                &sample.name,
                expected,
                achieved,
                tweak,
            )
            .write_out(true)
            .expect("report should be written");
            let stem = data_file_stem(first);
            for extension in ["mint01", "msubw01"] {
                fs::write(working_dir.join(format!("{stem}.{extension}")), "0 0\n")
                    .expect("artifact should be written");
            }
        }
        self.configs.borrow_mut().push(document);
        Ok(EngineRun {
            stdout: "Got to: END\n".to_string(),
            stderr: String::new(),
        })
    }
}

pub fn settings(root: &Path) -> RunSettings {
    RunSettings {
        output_root: root.to_path_buf(),
        barrier_timeout_ms: 500,
        barrier_poll_ms: 5,
        ..RunSettings::default()
    }
}

pub fn sample(name: &str, files: &[&str]) -> Sample {
    let mut sample = Sample::default();
    sample.name = name.to_string();
    sample.data_files = DataFiles::new(files.iter().map(|file| file.to_string()).collect(), 1);
    sample
}

/// Document that survives a serialize/parse cycle, holding `samples` in a
/// single background.
pub fn document(samples: Vec<Sample>) -> GudrunFile {
    let mut document = GudrunFile::default();
    let instrument = Arc::make_mut(&mut document.instrument);
    instrument.incident_monitor_spectra = vec![1];
    instrument.transmission_monitor_spectra = vec![2];
    instrument.wavelength_min = 0.05;
    instrument.wavelength_max = 3.5;
    instrument.wavelength_step = 0.01;
    instrument.x_min = 0.1;
    instrument.x_max = 50.0;
    instrument.x_step = 0.05;
    Arc::make_mut(&mut document.beam).sample_geometry = Geometry::FlatPlate;
    document.sample_backgrounds.push(SampleBackground {
        data_files: DataFiles::new(vec!["BG1.raw".to_string()], 1),
        samples,
    });
    document
}
