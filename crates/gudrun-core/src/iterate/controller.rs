use super::{IterationMode, RadiusKind};
use crate::common::constants::{SELF_SCATTERING_Q_EXTENSION, SELF_SCATTERING_WAVELENGTH_EXTENSION};
use crate::config::{GudrunFile, Sample};
use crate::domain::{GudrunError, GudrunResult};
use crate::engine::EngineInvoker;
use crate::output::{GudrunOutput, data_file_stem};
use crate::report::GudFile;
use crate::runner::{GudrunRunner, sample_report};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IterationState {
    NotStarted,
    /// Number of engine passes completed so far.
    Running(usize),
    Finished,
}

/// Values the first wavelength pass of an inelasticity subtraction
/// overwrites and every Q pass restores.
#[derive(Debug, Clone, PartialEq)]
struct QRangeCapture {
    x_range: (f64, f64, f64),
    top_hat_widths: HashMap<String, f64>,
}

/// Runs a document through the engine pass by pass, feeding each sample's
/// result report back into the configuration before the next pass.
///
/// Coefficient modes run an unmodified baseline pass followed by one pass per
/// iteration. Inelasticity subtraction runs a wavelength pass and a Q pass per
/// iteration.
pub struct IterationController<'r, E> {
    runner: &'r GudrunRunner<E>,
    document: GudrunFile,
    mode: IterationMode,
    iterations: usize,
    output_dir: PathBuf,
    state: IterationState,
    last_output: Option<GudrunOutput>,
    capture: Option<QRangeCapture>,
}

impl<'r, E: EngineInvoker> IterationController<'r, E> {
    pub fn new(
        runner: &'r GudrunRunner<E>,
        document: GudrunFile,
        mode: IterationMode,
        iterations: usize,
    ) -> Self {
        Self {
            output_dir: runner.settings().output_dir(),
            runner,
            document,
            mode,
            iterations,
            state: IterationState::NotStarted,
            last_output: None,
            capture: None,
        }
    }

    pub fn output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    pub fn mode(&self) -> IterationMode {
        self.mode
    }

    pub fn state(&self) -> IterationState {
        self.state
    }

    pub fn document(&self) -> &GudrunFile {
        &self.document
    }

    pub fn into_document(self) -> GudrunFile {
        self.document
    }

    pub fn last_output(&self) -> Option<&GudrunOutput> {
        self.last_output.as_ref()
    }

    pub fn completed_passes(&self) -> usize {
        match self.state {
            IterationState::NotStarted => 0,
            IterationState::Running(completed) => completed,
            IterationState::Finished => self.total_passes(),
        }
    }

    /// Whole iterations finished; the baseline pass of the coefficient
    /// modes is not one.
    pub fn iterations_completed(&self) -> usize {
        let completed = self.completed_passes();
        match self.mode {
            IterationMode::InelasticitySubtraction => completed / 2,
            _ => completed.saturating_sub(1),
        }
    }

    pub fn total_passes(&self) -> usize {
        match self.mode {
            IterationMode::InelasticitySubtraction => 2 * self.iterations,
            _ => self.iterations + 1,
        }
    }

    /// Prepares and runs the next pass. Returns `None` once every pass has
    /// run.
    pub fn step(&mut self) -> GudrunResult<Option<&GudrunOutput>> {
        let completed = match self.state {
            IterationState::Finished => return Ok(None),
            IterationState::NotStarted => 0,
            IterationState::Running(completed) => completed,
        };
        if completed >= self.total_passes() {
            self.state = IterationState::Finished;
            tracing::info!(mode = %self.mode, passes = completed, "iteration finished");
            return Ok(None);
        }

        self.prepare_pass(completed)?;
        tracing::info!(
            mode = %self.mode,
            pass = completed + 1,
            total = self.total_passes(),
            "starting pass"
        );
        let output = self.runner.run_into(&self.document, &self.output_dir)?;
        self.state = IterationState::Running(completed + 1);
        let output = &*self.last_output.insert(output);
        Ok(Some(output))
    }

    /// Runs every remaining pass and returns the manifest of the last one.
    pub fn run_to_completion(&mut self) -> GudrunResult<Option<GudrunOutput>> {
        while self.step()?.is_some() {}
        Ok(self.last_output.clone())
    }

    fn prepare_pass(&mut self, completed: usize) -> GudrunResult<()> {
        match self.mode {
            IterationMode::InelasticitySubtraction if completed % 2 == 0 => {
                self.wavelength_pass(completed == 0);
                Ok(())
            }
            IterationMode::InelasticitySubtraction => self.q_pass(),
            _ if completed == 0 => Ok(()),
            _ => self.apply_coefficients(),
        }
    }

    fn apply_coefficients(&mut self) -> GudrunResult<()> {
        let output = self.last_output.as_ref().ok_or_else(|| {
            GudrunError::InvalidState("no previous pass to read results from".to_string())
        })?;
        let mut reports = HashMap::new();
        for sample in self.document.running_samples() {
            reports.insert(sample.name.clone(), sample_report(output, &sample.name)?);
        }

        let mode = self.mode;
        for sample in self.document.running_samples_mut() {
            if let Some(report) = reports.get(&sample.name) {
                apply_report(mode, sample, report);
            }
        }
        Ok(())
    }

    fn wavelength_pass(&mut self, first: bool) {
        if self.capture.is_none() {
            let instrument = &self.document.instrument;
            self.capture = Some(QRangeCapture {
                x_range: (instrument.x_min, instrument.x_max, instrument.x_step),
                top_hat_widths: self
                    .document
                    .running_samples()
                    .map(|sample| (sample.name.clone(), sample.top_hat_width))
                    .collect(),
            });
        }

        let instrument = Arc::make_mut(&mut self.document.instrument);
        instrument.subtract_wavelength_binned_data = !first;
        instrument.x_min = instrument.wavelength_min;
        instrument.x_max = instrument.wavelength_max;
        instrument.x_step = instrument.wavelength_step;
        instrument.use_log_binning = true;

        let previous = self.last_output.as_ref();
        for sample in self.document.running_samples_mut() {
            sample.top_hat_width = 0.0;
            sample.self_scattering_file =
                self_scattering_file(previous, sample, SELF_SCATTERING_WAVELENGTH_EXTENSION);
        }
        tracing::debug!(first, "prepared wavelength pass");
    }

    fn q_pass(&mut self) -> GudrunResult<()> {
        let capture = self.capture.clone().ok_or_else(|| {
            GudrunError::InvalidState("Q pass requested before a wavelength pass".to_string())
        })?;

        let instrument = Arc::make_mut(&mut self.document.instrument);
        instrument.subtract_wavelength_binned_data = true;
        (instrument.x_min, instrument.x_max, instrument.x_step) = capture.x_range;
        instrument.use_log_binning = false;

        let previous = self.last_output.as_ref();
        for sample in self.document.running_samples_mut() {
            if let Some(width) = capture.top_hat_widths.get(&sample.name) {
                sample.top_hat_width = *width;
            }
            sample.self_scattering_file =
                self_scattering_file(previous, sample, SELF_SCATTERING_Q_EXTENSION);
        }
        tracing::debug!("prepared Q pass");
        Ok(())
    }
}

fn apply_report(mode: IterationMode, sample: &mut Sample, report: &GudFile) {
    if mode == IterationMode::TweakFactor {
        sample.tweak_factor = report.suggested_tweak_factor.value;
        tracing::debug!(sample = %sample.name, tweak_factor = sample.tweak_factor, "applied tweak factor");
        return;
    }

    let Some(coefficient) = report.coefficient() else {
        tracing::warn!(sample = %sample.name, "expected DCS level is zero, leaving sample unchanged");
        return;
    };
    let dimensions = &mut sample.dimensions;
    match mode {
        IterationMode::Density => sample.density.magnitude *= coefficient,
        IterationMode::Thickness => {
            let total =
                (dimensions.upstream_thickness + dimensions.downstream_thickness) * coefficient;
            dimensions.upstream_thickness = total / 2.0;
            dimensions.downstream_thickness = total / 2.0;
        }
        IterationMode::Radius(RadiusKind::Inner) => dimensions.inner_radius *= coefficient,
        IterationMode::Radius(RadiusKind::Outer) => dimensions.outer_radius *= coefficient,
        IterationMode::TweakFactor | IterationMode::InelasticitySubtraction => {}
    }
    tracing::debug!(sample = %sample.name, coefficient, mode = %mode, "applied coefficient");
}

/// Artifact with `extension` from the previous pass, or the bare file name
/// the engine derives from the sample's first data file.
fn self_scattering_file(previous: Option<&GudrunOutput>, sample: &Sample, extension: &str) -> String {
    let recorded = previous
        .and_then(|output| output.sample(&sample.name))
        .and_then(|output| output.output(extension).or_else(|| output.diagnostic(extension)));
    match recorded {
        Some(path) => path.display().to_string(),
        None => {
            let stem = sample
                .data_files
                .files
                .first()
                .map(|file| data_file_stem(file))
                .unwrap_or_else(|| sample.name.clone());
            format!("{stem}.{extension}")
        }
    }
}
