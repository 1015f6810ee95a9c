//! Configuration document for the Gudrun correction engine.
//!
//! The document mirrors the engine's block-structured input file: one
//! INSTRUMENT, BEAM and NORMALISATION block, then any number of SAMPLE
//! BACKGROUND blocks each owning samples, which own containers. Bulky shared
//! sections sit behind [`Arc`] so per-sample working copies only clone what
//! they mutate.

mod parser;
mod writer;

pub use parser::parse_document;
pub use writer::{render_document, timestamp_now};

use crate::composition::{Component, Composition};
use crate::domain::{
    CrossSectionSource, DataFileType, Density, Geometry, GudrunError, GudrunResult,
    InstrumentName, MergeWeights, NormalisationType, OutputUnits, Scales,
};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataFiles {
    pub files: Vec<String>,
    pub period_number: u32,
}

impl DataFiles {
    pub fn new(files: Vec<String>, period_number: u32) -> Self {
        Self {
            files,
            period_number,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Both geometry branches are stored; only the branch selected by the
/// resolved geometry is written to or read from the engine input.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Dimensions {
    pub upstream_thickness: f64,
    pub downstream_thickness: f64,
    pub angle_of_rotation: f64,
    pub sample_width: f64,
    pub inner_radius: f64,
    pub outer_radius: f64,
    pub sample_height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GroupingParameters {
    pub group: u32,
    pub x_min: f64,
    pub x_max: f64,
    pub background_factor: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Instrument {
    pub name: InstrumentName,
    pub gudrun_input_file_dir: String,
    pub data_file_dir: String,
    pub data_file_type: DataFileType,
    pub detector_calibration_file: String,
    pub column_no_phi_values: u32,
    pub groups_file: String,
    pub deadtime_constants_file: String,
    pub incident_monitor_spectra: Vec<u32>,
    pub monitor_normalisation_wavelength_range: (f64, f64),
    pub transmission_monitor_spectra: Vec<u32>,
    pub incident_monitor_quiet_count_const: f64,
    pub transmission_monitor_quiet_count_const: f64,
    pub spike_analysis_channels: (u32, u32),
    pub spike_analysis_acceptance_factor: f64,
    pub wavelength_min: f64,
    pub wavelength_max: f64,
    pub wavelength_step: f64,
    pub no_smooths_on_monitor: u32,
    pub x_min: f64,
    pub x_max: f64,
    pub x_step: f64,
    pub use_log_binning: bool,
    pub grouping_parameters: Vec<GroupingParameters>,
    pub groups_acceptance_factor: f64,
    pub merge_power: u32,
    pub subtract_single_atom_scattering: bool,
    pub merge_weights: MergeWeights,
    pub incident_flight_path: f64,
    pub diagnostic_spectrum: u32,
    pub neutron_scattering_parameters_file: String,
    pub scale_selection: Scales,
    pub subtract_wavelength_binned_data: bool,
    pub gudrun_start_folder: String,
    pub startup_file_folder: String,
    pub logarithmic_step_size: f64,
    pub hard_group_edges: bool,
    /// Only carried for NeXus data.
    pub nexus_definition_file: String,
    pub good_detector_threshold: u32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Beam {
    pub sample_geometry: Geometry,
    pub beam_profile_values: Vec<f64>,
    pub step_size_absorption: f64,
    pub step_size_ms: f64,
    pub no_slices: u32,
    pub angular_step_for_corrections: u32,
    pub incident_beam_edges: [f64; 4],
    pub scattered_beam_edges: [f64; 4],
    pub incident_spectrum_file: String,
    pub overall_background_factor: f64,
    pub sample_dependent_background_factor: f64,
    pub shielding_attenuation_coefficient: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Normalisation {
    pub data_files: DataFiles,
    pub background_files: DataFiles,
    pub force_corrections: bool,
    pub composition: Composition,
    pub geometry: Geometry,
    pub dimensions: Dimensions,
    pub density: Density,
    pub placzek_temperature: f64,
    pub total_cross_section_source: CrossSectionSource,
    pub cross_section_file: String,
    pub differential_cross_section_file: String,
    pub lower_limit_smoothed_normalisation: f64,
    pub degree_of_smoothing: f64,
    pub min_signal_to_background: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ExponentialTerm {
    pub amplitude: f64,
    pub decay: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Container {
    pub name: String,
    pub data_files: DataFiles,
    pub composition: Composition,
    pub geometry: Geometry,
    pub dimensions: Dimensions,
    pub density: Density,
    pub total_cross_section_source: CrossSectionSource,
    pub cross_section_file: String,
    pub tweak_factor: f64,
    pub scattering_fraction: f64,
    pub attenuation_coefficient: f64,
}

impl Default for Container {
    fn default() -> Self {
        Self {
            name: "CONTAINER".to_string(),
            data_files: DataFiles::default(),
            composition: Composition::default(),
            geometry: Geometry::SameAsBeam,
            dimensions: Dimensions::default(),
            density: Density::default(),
            total_cross_section_source: CrossSectionSource::Tables,
            cross_section_file: String::new(),
            tweak_factor: 1.0,
            scattering_fraction: 1.0,
            attenuation_coefficient: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: String,
    pub data_files: DataFiles,
    pub force_corrections: bool,
    pub composition: Composition,
    pub geometry: Geometry,
    pub dimensions: Dimensions,
    pub density: Density,
    pub placzek_temperature: f64,
    pub total_cross_section_source: CrossSectionSource,
    pub cross_section_file: String,
    pub tweak_factor: f64,
    pub top_hat_width: f64,
    pub min_radius_ft: f64,
    pub gor_broadening: f64,
    pub resonance_values: Vec<(f64, f64)>,
    pub exponential_values: Vec<ExponentialTerm>,
    pub normalisation_correction_factor: f64,
    pub self_scattering_file: String,
    pub normalise_to: NormalisationType,
    pub max_radius_ft: f64,
    pub output_units: OutputUnits,
    pub power_for_broadening: f64,
    pub step_size: f64,
    pub run_this_sample: bool,
    pub scattering_fraction: f64,
    pub attenuation_coefficient: f64,
    pub containers: Vec<Container>,
}

impl Default for Sample {
    fn default() -> Self {
        Self {
            name: "SAMPLE".to_string(),
            data_files: DataFiles::default(),
            force_corrections: false,
            composition: Composition::default(),
            geometry: Geometry::SameAsBeam,
            dimensions: Dimensions::default(),
            density: Density::default(),
            placzek_temperature: 0.0,
            total_cross_section_source: CrossSectionSource::Tables,
            cross_section_file: String::new(),
            tweak_factor: 1.0,
            top_hat_width: 0.0,
            min_radius_ft: 0.0,
            gor_broadening: 0.0,
            resonance_values: Vec::new(),
            exponential_values: Vec::new(),
            normalisation_correction_factor: 1.0,
            self_scattering_file: String::new(),
            normalise_to: NormalisationType::Nothing,
            max_radius_ft: 0.0,
            output_units: OutputUnits::BarnsAtomSr,
            power_for_broadening: 0.0,
            step_size: 0.0,
            run_this_sample: true,
            scattering_fraction: 1.0,
            attenuation_coefficient: 0.0,
            containers: Vec::new(),
        }
    }
}

impl Sample {
    /// A sample takes part in a run only when flagged and backed by data.
    pub fn is_running(&self) -> bool {
        self.run_this_sample && !self.data_files.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SampleBackground {
    pub data_files: DataFiles,
    pub samples: Vec<Sample>,
}

/// Position of a sample inside the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SampleLocator {
    pub background: usize,
    pub sample: usize,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct GudrunFile {
    pub instrument: Arc<Instrument>,
    pub beam: Arc<Beam>,
    pub normalisation: Arc<Normalisation>,
    pub sample_backgrounds: Vec<SampleBackground>,
    pub components: Vec<Arc<Component>>,
}

impl GudrunFile {
    pub fn parse(source: &str) -> GudrunResult<Self> {
        parse_document(source)
    }

    pub fn from_path(path: impl AsRef<Path>) -> GudrunResult<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(GudrunError::path(path, "configuration file does not exist"));
        }
        let source = fs::read_to_string(path).map_err(|source| GudrunError::io(path, source))?;
        parse_document(&source)
    }

    /// Engine input text stamped with the current time.
    pub fn to_text(&self) -> String {
        render_document(self, &timestamp_now())
    }

    pub fn write_to(&self, path: impl AsRef<Path>) -> GudrunResult<()> {
        let path = path.as_ref();
        self.check_sample_names()?;
        fs::write(path, self.to_text()).map_err(|source| GudrunError::io(path, source))
    }

    /// Sample names key the output tree and must read back as samples:
    /// unique, and never `BACKGROUND`, which would render as a
    /// `SAMPLE BACKGROUND` header.
    pub fn check_sample_names(&self) -> GudrunResult<()> {
        let mut seen = HashSet::new();
        for sample in self.samples() {
            let name = sample.name.trim();
            if name == "BACKGROUND" {
                return Err(GudrunError::Selection(
                    "a sample cannot be named 'BACKGROUND'".to_string(),
                ));
            }
            if !seen.insert(name) {
                return Err(GudrunError::Selection(format!(
                    "more than one sample is named '{name}'"
                )));
            }
        }
        Ok(())
    }

    pub fn samples(&self) -> impl Iterator<Item = &Sample> {
        self.sample_backgrounds
            .iter()
            .flat_map(|background| background.samples.iter())
    }

    pub fn samples_mut(&mut self) -> impl Iterator<Item = &mut Sample> {
        self.sample_backgrounds
            .iter_mut()
            .flat_map(|background| background.samples.iter_mut())
    }

    pub fn running_samples(&self) -> impl Iterator<Item = &Sample> {
        self.samples().filter(|sample| sample.is_running())
    }

    pub fn running_samples_mut(&mut self) -> impl Iterator<Item = &mut Sample> {
        self.samples_mut().filter(|sample| sample.is_running())
    }

    pub fn locate_sample(&self, name: &str) -> Option<SampleLocator> {
        self.sample_backgrounds
            .iter()
            .enumerate()
            .find_map(|(background, entry)| {
                entry
                    .samples
                    .iter()
                    .position(|sample| sample.name == name)
                    .map(|sample| SampleLocator { background, sample })
            })
    }

    pub fn sample(&self, locator: SampleLocator) -> Option<&Sample> {
        self.sample_backgrounds
            .get(locator.background)
            .and_then(|background| background.samples.get(locator.sample))
    }

    pub fn sample_mut(&mut self, locator: SampleLocator) -> Option<&mut Sample> {
        self.sample_backgrounds
            .get_mut(locator.background)
            .and_then(|background| background.samples.get_mut(locator.sample))
    }

    pub fn component(&self, name: &str) -> Option<Arc<Component>> {
        self.components
            .iter()
            .find(|component| component.name == name)
            .cloned()
    }

    /// Single-sample working copy sharing the instrument, beam and
    /// normalisation sections with `self`.
    pub fn isolate(&self, locator: SampleLocator) -> Option<Self> {
        let background = self.sample_backgrounds.get(locator.background)?;
        let mut sample = background.samples.get(locator.sample)?.clone();
        sample.run_this_sample = true;
        Some(Self {
            instrument: Arc::clone(&self.instrument),
            beam: Arc::clone(&self.beam),
            normalisation: Arc::clone(&self.normalisation),
            sample_backgrounds: vec![SampleBackground {
                data_files: background.data_files.clone(),
                samples: vec![sample],
            }],
            components: self.components.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{DataFiles, GudrunFile, Sample, SampleBackground, SampleLocator};
    use crate::domain::GudrunError;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn document() -> GudrunFile {
        let mut running = Sample::default();
        running.name = "H2O".to_string();
        running.data_files = DataFiles::new(vec!["NIMROD001.raw".to_string()], 1);

        let mut idle = Sample::default();
        idle.name = "D2O".to_string();
        idle.data_files = DataFiles::new(vec!["NIMROD002.raw".to_string()], 1);
        idle.run_this_sample = false;

        let mut empty = Sample::default();
        empty.name = "Empty".to_string();

        GudrunFile {
            sample_backgrounds: vec![
                SampleBackground {
                    data_files: DataFiles::default(),
                    samples: vec![running, idle],
                },
                SampleBackground {
                    data_files: DataFiles::default(),
                    samples: vec![empty],
                },
            ],
            ..GudrunFile::default()
        }
    }

    #[test]
    fn running_samples_require_flag_and_data() {
        let names = document()
            .running_samples()
            .map(|sample| sample.name.clone())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["H2O"]);
    }

    #[test]
    fn locate_sample_spans_backgrounds() {
        let document = document();
        assert_eq!(
            document.locate_sample("Empty"),
            Some(SampleLocator {
                background: 1,
                sample: 0
            })
        );
        assert_eq!(document.locate_sample("missing"), None);
    }

    #[test]
    fn isolate_shares_sections_and_keeps_one_sample() {
        let document = document();
        let locator = document.locate_sample("D2O").expect("sample should exist");
        let isolated = document.isolate(locator).expect("isolation should succeed");

        assert!(Arc::ptr_eq(&document.instrument, &isolated.instrument));
        assert!(Arc::ptr_eq(&document.normalisation, &isolated.normalisation));
        assert_eq!(isolated.samples().count(), 1);
        let sample = isolated.samples().next().unwrap();
        assert_eq!(sample.name, "D2O");
        assert!(sample.run_this_sample);
        assert!(!document.sample(locator).unwrap().run_this_sample);
    }

    #[test]
    fn repeated_sample_names_are_rejected() {
        let mut document = document();
        document.sample_backgrounds[1].samples[0].name = "H2O".to_string();
        let error = document
            .check_sample_names()
            .expect_err("duplicate names should fail");
        assert!(matches!(error, GudrunError::Selection(_)));
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn background_is_not_a_writable_sample_name() {
        let temp = TempDir::new().expect("tempdir should be created");
        let path = temp.path().join("gudpy.txt");
        let mut document = document();
        document.sample_backgrounds[0].samples[0].name = "BACKGROUND".to_string();

        let error = document
            .write_to(&path)
            .expect_err("reserved name should not be written");
        assert!(matches!(error, GudrunError::Selection(_)));
        assert!(!path.exists());
        assert!(GudrunFile::default().check_sample_names().is_ok());
    }
}
