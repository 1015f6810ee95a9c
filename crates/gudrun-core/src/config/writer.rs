use super::{
    Beam, Container, DataFiles, Dimensions, GudrunFile, Instrument, Normalisation, Sample,
    SampleBackground,
};
use crate::common::constants::{
    END_OF_COMPOSITION, END_OF_EXPONENTIAL, END_OF_GROUPING, END_OF_RESONANCE, LABEL_SEPARATOR,
};
use crate::composition::Element;
use crate::domain::{CrossSectionSource, DataFileType, Density, Geometry};
use std::fmt::Write as _;
use std::time::{SystemTime, UNIX_EPOCH};

const HEADER: &str = "'  '  '        '  '/'";

pub fn timestamp_now() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

/// Renders the engine input text; `stamp` fills the "last written" line.
pub fn render_document(document: &GudrunFile, stamp: &str) -> String {
    let mut out = BlockWriter::default();
    out.raw(HEADER);
    out.blank();

    write_instrument(&mut out, &document.instrument);
    write_beam(&mut out, &document.beam);
    let beam_geometry = document.beam.sample_geometry;
    write_normalisation(&mut out, &document.normalisation, beam_geometry);

    for background in &document.sample_backgrounds {
        write_sample_background(&mut out, background, beam_geometry);
    }

    out.raw("END");
    out.raw("1");
    out.raw(&format!("Date and time last written:  {stamp}"));
    out.raw("N");

    if !document.components.is_empty() {
        out.blank();
        out.raw("COMPONENTS:");
        for component in &document.components {
            out.raw(&component.name);
            write_elements(&mut out, &component.elements, "Component atomic composition");
        }
    }

    out.finish()
}

#[derive(Default)]
struct BlockWriter {
    text: String,
}

impl BlockWriter {
    fn raw(&mut self, line: &str) {
        self.text.push_str(line);
        self.text.push('\n');
    }

    fn blank(&mut self) {
        self.text.push('\n');
    }

    fn field(&mut self, data: impl std::fmt::Display, label: &str) {
        let _ = writeln!(self.text, "{data}{LABEL_SEPARATOR}{label}");
    }

    fn file(&mut self, name: &str, label: &str) {
        self.field(file_token(name), label);
    }

    fn open(&mut self, header: &str) {
        self.raw(&format!("{header}{LABEL_SEPARATOR}{{"));
        self.blank();
    }

    fn close(&mut self) {
        self.blank();
        self.raw("}");
        self.blank();
    }

    fn finish(self) -> String {
        self.text
    }
}

fn file_token(name: &str) -> &str {
    if name.is_empty() { "*" } else { name }
}

fn join<T: std::fmt::Display>(values: &[T]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

fn flag(value: bool) -> u8 {
    u8::from(value)
}

fn write_instrument(out: &mut BlockWriter, instrument: &Instrument) {
    out.open("INSTRUMENT");
    out.field(instrument.name.as_str(), "Instrument name");
    out.file(
        &instrument.gudrun_input_file_dir,
        "Gudrun input file directory:",
    );
    out.file(&instrument.data_file_dir, "Data file directory");
    out.field(instrument.data_file_type.as_str(), "Data file type");
    out.file(
        &instrument.detector_calibration_file,
        "Detector calibration file name",
    );
    out.field(
        instrument.column_no_phi_values,
        "User table column number for phi values",
    );
    out.file(&instrument.groups_file, "Groups file name");
    out.file(
        &instrument.deadtime_constants_file,
        "Deadtime constants file name",
    );
    out.field(
        join(&instrument.incident_monitor_spectra),
        "Spectrum number(s) for incident beam monitor",
    );
    let (low, high) = instrument.monitor_normalisation_wavelength_range;
    out.field(
        format!("{low} {high}"),
        "Wavelength range [\u{c5}] for monitor normalisation",
    );
    out.field(
        join(&instrument.transmission_monitor_spectra),
        "Spectrum number(s) for transmission monitor",
    );
    out.field(
        instrument.incident_monitor_quiet_count_const,
        "Incident monitor quiet count constant",
    );
    out.field(
        instrument.transmission_monitor_quiet_count_const,
        "Transmission monitor quiet count constant",
    );
    let (first, last) = instrument.spike_analysis_channels;
    out.field(format!("{first} {last}"), "Channel numbers for spike analysis");
    out.field(
        instrument.spike_analysis_acceptance_factor,
        "Spike analysis acceptance factor",
    );
    out.field(
        format!(
            "{} {} {}",
            instrument.wavelength_min, instrument.wavelength_max, instrument.wavelength_step
        ),
        "Wavelength range to use [\u{c5}] and step size",
    );
    out.field(instrument.no_smooths_on_monitor, "No. of smooths on monitor");
    let x_step = if instrument.use_log_binning {
        -instrument.x_step
    } else {
        instrument.x_step
    };
    out.field(
        format!("{} {} {x_step}", instrument.x_min, instrument.x_max),
        "Min, Max and step in x-scale (-ve for logarithmic binning)",
    );
    for grouping in &instrument.grouping_parameters {
        out.field(
            format!(
                "{} {} {} {}",
                grouping.group, grouping.x_min, grouping.x_max, grouping.background_factor
            ),
            "Group, Xmin, Xmax, Background factor",
        );
    }
    out.field("0 0 0 0", &format!("0 0 0 0 {END_OF_GROUPING}"));
    out.field(
        instrument.groups_acceptance_factor,
        "Groups acceptance factor",
    );
    out.field(instrument.merge_power, "Merge power");
    out.field(
        flag(instrument.subtract_single_atom_scattering),
        "Subtract single atom scattering?",
    );
    out.field(
        instrument.merge_weights.value(),
        "Merge weights: None? 0, By detector? 1, By channel? 2",
    );
    out.field(instrument.incident_flight_path, "Incident flight path [m]");
    out.field(
        instrument.diagnostic_spectrum,
        "Spectrum number to output diagnostic files",
    );
    out.file(
        &instrument.neutron_scattering_parameters_file,
        "Neutron scattering parameters file",
    );
    out.field(
        instrument.scale_selection.value(),
        "Scale selection: 1 = Q, 2 = d-space, 3 = wavelength, 4 = energy, 5 = TOF",
    );
    out.field(
        flag(instrument.subtract_wavelength_binned_data),
        "Subtract wavelength-binned data?",
    );
    out.file(&instrument.gudrun_start_folder, "Folder where Gudrun started");
    out.file(
        &instrument.startup_file_folder,
        "Folder containing the startup file",
    );
    out.field(instrument.logarithmic_step_size, "Logarithmic step size");
    out.field(flag(instrument.hard_group_edges), "Hard group edges?");
    if instrument.data_file_type == DataFileType::Nxs {
        out.file(
            &instrument.nexus_definition_file,
            "NeXus definition file",
        );
    }
    out.field(
        instrument.good_detector_threshold,
        "Number of good detectors threshold",
    );
    out.close();
}

fn write_beam(out: &mut BlockWriter, beam: &Beam) {
    out.open("BEAM");
    out.field(beam.sample_geometry, "Sample geometry");
    out.field(beam.beam_profile_values.len(), "Number of beam profile values");
    if !beam.beam_profile_values.is_empty() {
        out.field(
            join(&beam.beam_profile_values),
            "Beam profile values (Maximum of 50 allowed currently)",
        );
    }
    out.field(
        format!(
            "{} {} {}",
            beam.step_size_absorption, beam.step_size_ms, beam.no_slices
        ),
        "Step size for absorption and m.s. calculation and no. of slices",
    );
    out.field(
        beam.angular_step_for_corrections,
        "Step in scattering angle to calculate corrections at: [deg.]",
    );
    out.field(
        join(&beam.incident_beam_edges),
        "Incident beam edges relative to centre of sample [cm]",
    );
    out.field(
        join(&beam.scattered_beam_edges),
        "Scattered beam edges relative to centre of sample [cm]",
    );
    out.file(
        &beam.incident_spectrum_file,
        "Filename containing incident beam spectrum parameters",
    );
    out.field(beam.overall_background_factor, "Overall background factor");
    out.field(
        beam.sample_dependent_background_factor,
        "Sample dependent background factor",
    );
    out.field(
        beam.shielding_attenuation_coefficient,
        "Shielding attenuation coefficient [per m per A]",
    );
    out.close();
}

fn write_data_files(out: &mut BlockWriter, data_files: &DataFiles, label: &str) {
    out.field(
        format!("{}  {}", data_files.files.len(), data_files.period_number),
        "Number of files and period number",
    );
    for file in &data_files.files {
        out.field(file, label);
    }
}

fn write_elements(out: &mut BlockWriter, elements: &[Element], label: &str) {
    for element in elements {
        out.field(
            format!(
                "{}  {}  {}",
                element.symbol, element.mass_number, element.abundance
            ),
            label,
        );
    }
    out.field("*  0  0", &format!("* 0 0 to specify {END_OF_COMPOSITION}"));
}

fn write_geometry(
    out: &mut BlockWriter,
    geometry: Geometry,
    dimensions: &Dimensions,
    beam_geometry: Geometry,
) {
    out.field(geometry, "Geometry");
    if geometry.is_flat_plate(beam_geometry) {
        out.field(
            format!(
                "{}  {}",
                dimensions.upstream_thickness, dimensions.downstream_thickness
            ),
            "Upstream and downstream thickness [cm]",
        );
        out.field(
            format!(
                "{}  {}",
                dimensions.angle_of_rotation, dimensions.sample_width
            ),
            "Angle of rotation and sample width (cm)",
        );
    } else {
        out.field(
            format!("{}  {}", dimensions.inner_radius, dimensions.outer_radius),
            "Inner and outer radii (cm)",
        );
        out.field(dimensions.sample_height, "Sample height (cm)");
    }
}

fn write_density(out: &mut BlockWriter, density: &Density) {
    out.field(
        density.signed(),
        "Density atoms/\u{c5}^3 (negative) or g/cm^3 (positive)",
    );
}

fn write_cross_section_source(out: &mut BlockWriter, source: CrossSectionSource, file: &str) {
    let token = match source {
        CrossSectionSource::Tables => "TABLES",
        CrossSectionSource::Transmission => "TRANSMISSION",
        CrossSectionSource::File => file_token(file),
    };
    out.field(token, "Total cross section source");
}

fn write_normalisation(out: &mut BlockWriter, normalisation: &Normalisation, beam: Geometry) {
    out.open("NORMALISATION");
    write_data_files(out, &normalisation.data_files, "NORMALISATION data files");
    write_data_files(
        out,
        &normalisation.background_files,
        "NORMALISATION BACKGROUND data files",
    );
    out.field(
        flag(normalisation.force_corrections),
        "Force calculation of corrections?",
    );
    write_elements(
        out,
        &normalisation.composition.elements,
        "Normalisation atomic composition",
    );
    write_geometry(out, normalisation.geometry, &normalisation.dimensions, beam);
    write_density(out, &normalisation.density);
    out.field(
        normalisation.placzek_temperature,
        "Temperature for normalisation Placzek correction [K]",
    );
    write_cross_section_source(
        out,
        normalisation.total_cross_section_source,
        &normalisation.cross_section_file,
    );
    out.file(
        &normalisation.differential_cross_section_file,
        "Normalisation differential cross section filename",
    );
    out.field(
        normalisation.lower_limit_smoothed_normalisation,
        "Lower limit on smoothed normalisation",
    );
    out.field(
        normalisation.degree_of_smoothing,
        "Normalisation degree of smoothing",
    );
    out.field(
        normalisation.min_signal_to_background,
        "Minimum normalisation signal to background ratio",
    );
    out.close();
}

fn write_sample_background(out: &mut BlockWriter, background: &SampleBackground, beam: Geometry) {
    out.open("SAMPLE BACKGROUND");
    write_data_files(out, &background.data_files, "SAMPLE BACKGROUND data files");
    out.close();

    for sample in &background.samples {
        write_sample(out, sample, beam);
        for container in &sample.containers {
            write_container(out, container, beam);
        }
    }

    out.raw("GO");
    out.blank();
}

fn write_sample(out: &mut BlockWriter, sample: &Sample, beam: Geometry) {
    out.open(&format!("SAMPLE {}", sample.name));
    write_data_files(
        out,
        &sample.data_files,
        &format!("SAMPLE {} data files", sample.name),
    );
    out.field(
        flag(sample.force_corrections),
        "Force calculation of sample corrections?",
    );
    write_elements(out, &sample.composition.elements, "Sample atomic composition");
    write_geometry(out, sample.geometry, &sample.dimensions, beam);
    write_density(out, &sample.density);
    out.field(
        sample.placzek_temperature,
        "Temperature for sample Placzek correction",
    );
    write_cross_section_source(
        out,
        sample.total_cross_section_source,
        &sample.cross_section_file,
    );
    out.field(sample.tweak_factor, "Sample tweak factor");
    out.field(
        sample.top_hat_width,
        "Top hat width (1/\u{c5}) for cleaning up Fourier Transform",
    );
    out.field(sample.min_radius_ft, "Minimum radius for FT  [\u{c5}]");
    out.field(sample.gor_broadening, "g(r) broadening at r = 1\u{c5} [\u{c5}]");
    for (low, high) in &sample.resonance_values {
        out.field(
            format!("{low}  {high}"),
            "Min and max wavelength range [\u{c5}] for resonance",
        );
    }
    out.field("0  0", &format!("0   0{LABEL_SEPARATOR}{END_OF_RESONANCE}"));
    for term in &sample.exponential_values {
        out.field(
            format!("{}  {}  0", term.amplitude, term.decay),
            "Exponential amplitude and decay [1/\u{c5}]",
        );
    }
    out.field("*  0  0", &format!("* 0 0 {END_OF_EXPONENTIAL}"));
    out.field(
        sample.normalisation_correction_factor,
        "Normalisation correction factor",
    );
    out.file(
        &sample.self_scattering_file,
        "Name of file containing self scattering as a function of wavelength [\u{c5}]",
    );
    out.field(sample.normalise_to.value(), "Normalise to: 0 nothing, 1 <b>^2, 2 <b^2>");
    out.field(sample.max_radius_ft, "Maximum radius for FT [\u{c5}]");
    out.field(
        sample.output_units.value(),
        "Output units: 0 b/atom/sr, 1 cm**-1/sr",
    );
    out.field(
        sample.power_for_broadening,
        "Power for broadening function e.g. 0.5",
    );
    out.field(sample.step_size, "Step size [\u{c5}]");
    out.field(flag(sample.run_this_sample), "Analyse this sample?");
    out.field(
        format!(
            "{}  {}",
            sample.scattering_fraction, sample.attenuation_coefficient
        ),
        "Sample environment scattering fraction and attenuation coefficient [per A]",
    );
    out.close();
}

fn write_container(out: &mut BlockWriter, container: &Container, beam: Geometry) {
    out.open(&format!("CONTAINER {}", container.name));
    write_data_files(
        out,
        &container.data_files,
        &format!("CONTAINER {} data files", container.name),
    );
    write_elements(
        out,
        &container.composition.elements,
        "Container atomic composition",
    );
    write_geometry(out, container.geometry, &container.dimensions, beam);
    write_density(out, &container.density);
    write_cross_section_source(
        out,
        container.total_cross_section_source,
        &container.cross_section_file,
    );
    out.field(container.tweak_factor, "Tweak factor");
    out.field(
        format!(
            "{}  {}",
            container.scattering_fraction, container.attenuation_coefficient
        ),
        "Sample environment scattering fraction and attenuation coefficient [per A]",
    );
    out.close();
}
