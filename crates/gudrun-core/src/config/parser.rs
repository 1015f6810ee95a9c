use super::{
    Beam, Container, DataFiles, Dimensions, ExponentialTerm, GroupingParameters, GudrunFile,
    Instrument, Normalisation, Sample, SampleBackground,
};
use crate::common::constants::{
    END_OF_COMPOSITION, END_OF_EXPONENTIAL, END_OF_GROUPING, END_OF_RESONANCE,
};
use crate::composition::{Component, Composition, Element};
use crate::domain::{
    CrossSectionSource, DataFileType, Density, Geometry, GudrunError, GudrunResult,
    InstrumentName, MergeWeights, NormalisationType, OutputUnits, Scales, Section, TokenError,
};
use crate::parser::{LineCursor, TokenLine};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

type TokenResult<T> = Result<T, TokenError>;

/// State shared by every section parse after BEAM has been read.
#[derive(Debug)]
struct ParseContext {
    beam_geometry: Geometry,
    used_names: HashMap<&'static str, HashSet<String>>,
}

impl ParseContext {
    fn new(beam: &Beam) -> Self {
        Self {
            beam_geometry: beam.sample_geometry,
            used_names: HashMap::new(),
        }
    }

    /// Names each block uniquely: unnamed blocks become `BASE`, repeated
    /// names gain a `_1`, `_2`, ... suffix.
    fn claim_name(&mut self, name: &str, base: &'static str) -> String {
        let used = self.used_names.entry(base).or_default();
        let stem = if name.is_empty() { base } else { name };
        let mut candidate = stem.to_string();
        let mut suffix = 1;
        while used.contains(&candidate) {
            candidate = format!("{stem}_{suffix}");
            suffix += 1;
        }
        used.insert(candidate.clone());
        candidate
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NextBlock {
    SampleBackground,
    Sample,
    Container,
    Go,
    End,
    Other,
}

fn classify(raw: &str) -> NextBlock {
    let trimmed = raw.trim();
    let keyword = trimmed.trim_end_matches('{').trim();
    if keyword == "SAMPLE BACKGROUND" {
        NextBlock::SampleBackground
    } else if trimmed == "GO" {
        NextBlock::Go
    } else if trimmed == "END" {
        NextBlock::End
    } else if trimmed.ends_with('{') && has_keyword(keyword, "SAMPLE") {
        NextBlock::Sample
    } else if trimmed.ends_with('{') && has_keyword(keyword, "CONTAINER") {
        NextBlock::Container
    } else {
        NextBlock::Other
    }
}

fn has_keyword(header: &str, keyword: &str) -> bool {
    header
        .strip_prefix(keyword)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
}

pub fn parse_document(source: &str) -> GudrunResult<GudrunFile> {
    let mut cursor = LineCursor::new(source);

    skip_to_instrument(&mut cursor).map_err(|e| GudrunError::parse(Section::Instrument, e))?;
    let instrument =
        parse_instrument(&mut cursor).map_err(|e| GudrunError::parse(Section::Instrument, e))?;
    let beam = parse_beam(&mut cursor).map_err(|e| GudrunError::parse(Section::Beam, e))?;
    let mut context = ParseContext::new(&beam);
    let normalisation = parse_normalisation(&mut cursor, &context)
        .map_err(|e| GudrunError::parse(Section::Normalisation, e))?;

    let mut sample_backgrounds = Vec::new();
    while let Some((number, raw)) = cursor.peek_data() {
        match classify(raw) {
            NextBlock::SampleBackground => {
                sample_backgrounds.push(parse_sample_background(&mut cursor, &mut context)?);
            }
            NextBlock::Go => {
                cursor.next_data().map_err(|e| GudrunError::parse(Section::Document, e))?;
            }
            NextBlock::End => break,
            NextBlock::Sample | NextBlock::Container => {
                return Err(GudrunError::parse(
                    Section::Document,
                    TokenError::new(number, "block appears outside a SAMPLE BACKGROUND"),
                ));
            }
            NextBlock::Other => {
                return Err(GudrunError::parse(
                    Section::Document,
                    TokenError::new(number, format!("unexpected line '{}'", raw.trim())),
                ));
            }
        }
    }

    let components =
        parse_trailer(&mut cursor).map_err(|e| GudrunError::parse(Section::Components, e))?;

    Ok(GudrunFile {
        instrument: Arc::new(instrument),
        beam: Arc::new(beam),
        normalisation: Arc::new(normalisation),
        sample_backgrounds,
        components,
    })
}

fn skip_to_instrument(cursor: &mut LineCursor<'_>) -> TokenResult<()> {
    while let Some((_, raw)) = cursor.peek_data() {
        if classify_header(raw, "INSTRUMENT").is_some() {
            return Ok(());
        }
        cursor.next_data()?;
    }
    Err(TokenError::new(
        cursor.line_number(),
        "missing INSTRUMENT block",
    ))
}

/// Text after `keyword` on a `KEYWORD ... {` header line.
fn classify_header<'a>(raw: &'a str, keyword: &str) -> Option<&'a str> {
    let header = raw.trim().strip_suffix('{')?.trim_end();
    if !has_keyword(header, keyword) {
        return None;
    }
    Some(header[keyword.len()..].trim())
}

fn expect_header(cursor: &mut LineCursor<'_>, keyword: &str) -> TokenResult<String> {
    let line = cursor.next_data()?;
    classify_header(line.raw, keyword)
        .map(str::to_string)
        .ok_or_else(|| {
            TokenError::new(
                line.number,
                format!("expected '{keyword} {{', found '{}'", line.raw.trim()),
            )
        })
}

fn by_name<T>(
    line: &TokenLine<'_>,
    resolve: impl Fn(&str) -> Option<T>,
    what: &str,
) -> TokenResult<T> {
    let token = line.token(0)?;
    resolve(token).ok_or_else(|| TokenError::new(line.number, format!("unknown {what} '{token}'")))
}

fn by_value<T>(line: &TokenLine<'_>, resolve: fn(i64) -> Option<T>, what: &str) -> TokenResult<T> {
    let value = line.i64(0)?;
    resolve(value).ok_or_else(|| TokenError::new(line.number, format!("unknown {what} {value}")))
}

fn non_empty_spectra(line: &TokenLine<'_>) -> TokenResult<Vec<u32>> {
    let spectra = line.leading_u32s();
    if spectra.is_empty() {
        return Err(TokenError::new(
            line.number,
            "expected at least one spectrum number",
        ));
    }
    Ok(spectra)
}

fn parse_instrument(cursor: &mut LineCursor<'_>) -> TokenResult<Instrument> {
    expect_header(cursor, "INSTRUMENT")?;
    let mut instrument = Instrument {
        name: by_name(&cursor.next_data()?, InstrumentName::from_name, "instrument")?,
        gudrun_input_file_dir: cursor.next_data()?.file_name(0)?,
        data_file_dir: cursor.next_data()?.file_name(0)?,
        data_file_type: by_name(&cursor.next_data()?, DataFileType::from_name, "data file type")?,
        detector_calibration_file: cursor.next_data()?.file_name(0)?,
        column_no_phi_values: cursor.next_data()?.u32(0)?,
        groups_file: cursor.next_data()?.file_name(0)?,
        deadtime_constants_file: cursor.next_data()?.file_name(0)?,
        incident_monitor_spectra: non_empty_spectra(&cursor.next_data()?)?,
        ..Instrument::default()
    };

    let [low, high] = cursor.next_data()?.f64_array::<2>()?;
    instrument.monitor_normalisation_wavelength_range = (low, high);
    instrument.transmission_monitor_spectra = non_empty_spectra(&cursor.next_data()?)?;
    instrument.incident_monitor_quiet_count_const = cursor.next_data()?.f64(0)?;
    instrument.transmission_monitor_quiet_count_const = cursor.next_data()?.f64(0)?;
    let line = cursor.next_data()?;
    instrument.spike_analysis_channels = (line.u32(0)?, line.u32(1)?);
    instrument.spike_analysis_acceptance_factor = cursor.next_data()?.f64(0)?;
    let [min, max, step] = cursor.next_data()?.f64_array::<3>()?;
    instrument.wavelength_min = min;
    instrument.wavelength_max = max;
    instrument.wavelength_step = step;
    instrument.no_smooths_on_monitor = cursor.next_data()?.u32(0)?;

    let [x_min, x_max, x_step] = cursor.next_data()?.f64_array::<3>()?;
    instrument.x_min = x_min;
    instrument.x_max = x_max;
    instrument.use_log_binning = x_step.is_sign_negative();
    instrument.x_step = x_step.abs();

    loop {
        let line = cursor.next_data()?;
        if line.contains(END_OF_GROUPING) || line.u32(0)? == 0 {
            break;
        }
        let [_, x_min, x_max, background_factor] = line.f64_array::<4>()?;
        instrument.grouping_parameters.push(GroupingParameters {
            group: line.u32(0)?,
            x_min,
            x_max,
            background_factor,
        });
    }

    instrument.groups_acceptance_factor = cursor.next_data()?.f64(0)?;
    instrument.merge_power = cursor.next_data()?.u32(0)?;
    instrument.subtract_single_atom_scattering = cursor.next_data()?.flag(0)?;
    instrument.merge_weights = by_value(
        &cursor.next_data()?,
        MergeWeights::from_value,
        "merge weights",
    )?;
    instrument.incident_flight_path = cursor.next_data()?.f64(0)?;
    instrument.diagnostic_spectrum = cursor.next_data()?.u32(0)?;
    instrument.neutron_scattering_parameters_file = cursor.next_data()?.file_name(0)?;
    instrument.scale_selection =
        by_value(&cursor.next_data()?, Scales::from_value, "scale selection")?;
    instrument.subtract_wavelength_binned_data = cursor.next_data()?.flag(0)?;
    instrument.gudrun_start_folder = cursor.next_data()?.file_name(0)?;
    instrument.startup_file_folder = cursor.next_data()?.file_name(0)?;
    instrument.logarithmic_step_size = cursor.next_data()?.f64(0)?;
    instrument.hard_group_edges = cursor.next_data()?.flag(0)?;
    if instrument.data_file_type == DataFileType::Nxs {
        instrument.nexus_definition_file = cursor.next_data()?.file_name(0)?;
    }
    instrument.good_detector_threshold = cursor.next_data()?.u32(0)?;
    cursor.expect_closing_brace()?;
    Ok(instrument)
}

fn parse_beam(cursor: &mut LineCursor<'_>) -> TokenResult<Beam> {
    expect_header(cursor, "BEAM")?;
    let line = cursor.next_data()?;
    let sample_geometry = by_name(&line, Geometry::from_name, "geometry")?;
    if sample_geometry == Geometry::SameAsBeam {
        return Err(TokenError::new(
            line.number,
            "beam geometry must be FLATPLATE or CYLINDRICAL",
        ));
    }

    let profile_count = cursor.next_data()?.u32(0)? as usize;
    let beam_profile_values = if profile_count == 0 {
        Vec::new()
    } else {
        cursor.next_data()?.f64_values(profile_count)?
    };

    let line = cursor.next_data()?;
    let mut beam = Beam {
        sample_geometry,
        beam_profile_values,
        step_size_absorption: line.f64(0)?,
        step_size_ms: line.f64(1)?,
        no_slices: line.u32(2)?,
        ..Beam::default()
    };
    beam.angular_step_for_corrections = cursor.next_data()?.u32(0)?;
    beam.incident_beam_edges = cursor.next_data()?.f64_array::<4>()?;
    beam.scattered_beam_edges = cursor.next_data()?.f64_array::<4>()?;
    beam.incident_spectrum_file = cursor.next_data()?.file_name(0)?;
    beam.overall_background_factor = cursor.next_data()?.f64(0)?;
    beam.sample_dependent_background_factor = cursor.next_data()?.f64(0)?;
    beam.shielding_attenuation_coefficient = cursor.next_data()?.f64(0)?;
    cursor.expect_closing_brace()?;
    Ok(beam)
}

fn parse_data_files(cursor: &mut LineCursor<'_>) -> TokenResult<DataFiles> {
    let line = cursor.next_data()?;
    let count = line.u32(0)?;
    let period_number = line.u32(1)?;
    let files = (0..count)
        .map(|_| cursor.next_data().and_then(|line| line.token(0).map(str::to_string)))
        .collect::<TokenResult<Vec<_>>>()?;
    Ok(DataFiles::new(files, period_number))
}

fn parse_composition(cursor: &mut LineCursor<'_>) -> TokenResult<Composition> {
    let mut elements = Vec::new();
    loop {
        let line = cursor.next_data()?;
        if line.contains(END_OF_COMPOSITION) {
            break;
        }
        elements.push(parse_element(&line)?);
    }
    Ok(Composition::from_elements(elements))
}

fn parse_element(line: &TokenLine<'_>) -> TokenResult<Element> {
    let symbol = line.token(0)?;
    let mass = line.f64(1)?;
    if !mass.is_finite() || mass < 0.0 || mass.fract() != 0.0 || mass > f64::from(u32::MAX) {
        return Err(TokenError::new(
            line.number,
            format!("mass number must be a non-negative integer, found '{}'", line.token(1)?),
        ));
    }
    Ok(Element::new(symbol, mass as u32, line.f64(2)?))
}

fn parse_dimensions(
    cursor: &mut LineCursor<'_>,
    context: &ParseContext,
    geometry: Geometry,
) -> TokenResult<Dimensions> {
    let mut dimensions = Dimensions::default();
    if geometry.is_flat_plate(context.beam_geometry) {
        let [upstream, downstream] = cursor.next_data()?.f64_array::<2>()?;
        let [angle, width] = cursor.next_data()?.f64_array::<2>()?;
        dimensions.upstream_thickness = upstream;
        dimensions.downstream_thickness = downstream;
        dimensions.angle_of_rotation = angle;
        dimensions.sample_width = width;
    } else {
        let [inner, outer] = cursor.next_data()?.f64_array::<2>()?;
        dimensions.inner_radius = inner;
        dimensions.outer_radius = outer;
        dimensions.sample_height = cursor.next_data()?.f64(0)?;
    }
    Ok(dimensions)
}

fn parse_cross_section_source(line: &TokenLine<'_>) -> TokenResult<(CrossSectionSource, String)> {
    Ok(match line.token(0)? {
        "TABLES" => (CrossSectionSource::Tables, String::new()),
        "TRANSMISSION" => (CrossSectionSource::Transmission, String::new()),
        _ => (CrossSectionSource::File, line.file_name(0)?),
    })
}

fn parse_normalisation(
    cursor: &mut LineCursor<'_>,
    context: &ParseContext,
) -> TokenResult<Normalisation> {
    expect_header(cursor, "NORMALISATION")?;
    let mut data_files = parse_data_files(cursor)?;
    let mut background_files = parse_data_files(cursor)?;
    data_files.files.sort();
    background_files.files.sort();

    let force_corrections = cursor.next_data()?.flag(0)?;
    let composition = parse_composition(cursor)?;
    let geometry = by_name(&cursor.next_data()?, Geometry::from_name, "geometry")?;
    let dimensions = parse_dimensions(cursor, context, geometry)?;
    let density = Density::from_signed(cursor.next_data()?.f64(0)?);
    let placzek_temperature = cursor.next_data()?.f64(0)?;
    let (total_cross_section_source, cross_section_file) =
        parse_cross_section_source(&cursor.next_data()?)?;

    let normalisation = Normalisation {
        data_files,
        background_files,
        force_corrections,
        composition,
        geometry,
        dimensions,
        density,
        placzek_temperature,
        total_cross_section_source,
        cross_section_file,
        differential_cross_section_file: cursor.next_data()?.file_name(0)?,
        lower_limit_smoothed_normalisation: cursor.next_data()?.f64(0)?,
        degree_of_smoothing: cursor.next_data()?.f64(0)?,
        min_signal_to_background: cursor.next_data()?.f64(0)?,
    };
    cursor.expect_closing_brace()?;
    Ok(normalisation)
}

fn parse_sample_background(
    cursor: &mut LineCursor<'_>,
    context: &mut ParseContext,
) -> GudrunResult<SampleBackground> {
    let data_files = parse_background_files(cursor)
        .map_err(|e| GudrunError::parse(Section::SampleBackground, e))?;

    let mut background = SampleBackground {
        data_files,
        samples: Vec::new(),
    };

    while let Some((number, raw)) = cursor.peek_data() {
        match classify(raw) {
            NextBlock::Sample => {
                let sample = parse_sample(cursor, context)
                    .map_err(|e| GudrunError::parse(Section::Sample, e))?;
                background.samples.push(sample);
            }
            NextBlock::Container => {
                let container = parse_container(cursor, context)
                    .map_err(|e| GudrunError::parse(Section::Container, e))?;
                let owner = background.samples.last_mut().ok_or_else(|| {
                    GudrunError::parse(
                        Section::SampleBackground,
                        TokenError::new(number, "CONTAINER block precedes any SAMPLE"),
                    )
                })?;
                owner.containers.push(container);
            }
            NextBlock::Go => {
                cursor
                    .next_data()
                    .map_err(|e| GudrunError::parse(Section::SampleBackground, e))?;
            }
            NextBlock::SampleBackground | NextBlock::End => break,
            NextBlock::Other => {
                return Err(GudrunError::parse(
                    Section::SampleBackground,
                    TokenError::new(number, format!("unexpected line '{}'", raw.trim())),
                ));
            }
        }
    }

    Ok(background)
}

fn parse_background_files(cursor: &mut LineCursor<'_>) -> TokenResult<DataFiles> {
    expect_header(cursor, "SAMPLE BACKGROUND")?;
    let data_files = parse_data_files(cursor)?;
    cursor.expect_closing_brace()?;
    Ok(data_files)
}

fn parse_sample(cursor: &mut LineCursor<'_>, context: &mut ParseContext) -> TokenResult<Sample> {
    let name = expect_header(cursor, "SAMPLE")?;
    let name = context.claim_name(&name, "SAMPLE");

    let data_files = parse_data_files(cursor)?;
    let force_corrections = cursor.next_data()?.flag(0)?;
    let composition = parse_composition(cursor)?;
    let geometry = by_name(&cursor.next_data()?, Geometry::from_name, "geometry")?;
    let dimensions = parse_dimensions(cursor, context, geometry)?;
    let density = Density::from_signed(cursor.next_data()?.f64(0)?);
    let placzek_temperature = cursor.next_data()?.f64(0)?;
    let (total_cross_section_source, cross_section_file) =
        parse_cross_section_source(&cursor.next_data()?)?;

    let mut sample = Sample {
        name,
        data_files,
        force_corrections,
        composition,
        geometry,
        dimensions,
        density,
        placzek_temperature,
        total_cross_section_source,
        cross_section_file,
        tweak_factor: cursor.next_data()?.f64(0)?,
        top_hat_width: cursor.next_data()?.f64(0)?,
        min_radius_ft: cursor.next_data()?.f64(0)?,
        gor_broadening: cursor.next_data()?.f64(0)?,
        ..Sample::default()
    };

    loop {
        let line = cursor.next_data()?;
        if line.contains(END_OF_RESONANCE) {
            break;
        }
        let [low, high] = line.f64_array::<2>()?;
        if low == 0.0 && high == 0.0 {
            break;
        }
        sample.resonance_values.push((low, high));
    }

    loop {
        let line = cursor.next_data()?;
        if line.token(0)? == "*" || line.contains(END_OF_EXPONENTIAL) {
            break;
        }
        let [amplitude, decay] = line.f64_array::<2>()?;
        sample
            .exponential_values
            .push(ExponentialTerm { amplitude, decay });
    }

    sample.normalisation_correction_factor = cursor.next_data()?.f64(0)?;
    sample.self_scattering_file = cursor.next_data()?.file_name(0)?;
    sample.normalise_to = by_value(
        &cursor.next_data()?,
        NormalisationType::from_value,
        "normalisation type",
    )?;
    sample.max_radius_ft = cursor.next_data()?.f64(0)?;
    sample.output_units = by_value(&cursor.next_data()?, OutputUnits::from_value, "output units")?;
    sample.power_for_broadening = cursor.next_data()?.f64(0)?;
    sample.step_size = cursor.next_data()?.f64(0)?;
    sample.run_this_sample = cursor.next_data()?.flag(0)?;
    let [fraction, attenuation] = cursor.next_data()?.f64_array::<2>()?;
    sample.scattering_fraction = fraction;
    sample.attenuation_coefficient = attenuation;
    cursor.expect_closing_brace()?;
    Ok(sample)
}

fn parse_container(
    cursor: &mut LineCursor<'_>,
    context: &mut ParseContext,
) -> TokenResult<Container> {
    let name = expect_header(cursor, "CONTAINER")?;
    let name = context.claim_name(&name, "CONTAINER");

    let data_files = parse_data_files(cursor)?;
    let composition = parse_composition(cursor)?;
    let geometry = by_name(&cursor.next_data()?, Geometry::from_name, "geometry")?;
    let dimensions = parse_dimensions(cursor, context, geometry)?;
    let density = Density::from_signed(cursor.next_data()?.f64(0)?);
    let (total_cross_section_source, cross_section_file) =
        parse_cross_section_source(&cursor.next_data()?)?;
    let tweak_factor = cursor.next_data()?.f64(0)?;
    let [scattering_fraction, attenuation_coefficient] = cursor.next_data()?.f64_array::<2>()?;
    cursor.expect_closing_brace()?;

    Ok(Container {
        name,
        data_files,
        composition,
        geometry,
        dimensions,
        density,
        total_cross_section_source,
        cross_section_file,
        tweak_factor,
        scattering_fraction,
        attenuation_coefficient,
    })
}

/// Everything after `END` is engine bookkeeping except an optional
/// `COMPONENTS:` block of named compositions.
fn parse_trailer(cursor: &mut LineCursor<'_>) -> TokenResult<Vec<Arc<Component>>> {
    while let Some((_, raw)) = cursor.peek_data() {
        cursor.next_data()?;
        if raw.trim() == "COMPONENTS:" {
            let mut components = Vec::new();
            while cursor.peek_data().is_some() {
                let name = cursor.next_data()?.raw.trim().to_string();
                let composition = parse_composition(cursor)?;
                components.push(Arc::new(Component::new(name, composition.elements)));
            }
            return Ok(components);
        }
    }
    Ok(Vec::new())
}
