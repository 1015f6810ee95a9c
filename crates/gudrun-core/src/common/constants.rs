/// Artifact extensions routed into a sample's `Outputs/` folder; every other
/// sibling of a sample data file is a diagnostic.
pub const OUTPUT_EXTENSIONS: [&str; 14] = [
    "dcs01", "dcsd01", "dcse01", "dcst01", "dscw01", "mdcs01", "mdcsd01", "mdcse01", "mdcsw01",
    "mint01", "mgor01", "mdor01", "gud", "sample",
];

pub const NORMALISATION_DIR: &str = "Normalisation";
pub const NORMALISATION_BACKGROUND_DIR: &str = "NormalisationBackground";
pub const SAMPLE_BACKGROUNDS_DIR: &str = "SampleBackgrounds";
pub const SAMPLE_BACKGROUND_PREFIX: &str = "SampleBackground";
pub const OUTPUTS_DIR: &str = "Outputs";
pub const DIAGNOSTICS_DIR: &str = "Diagnostics";
pub const ADDITIONAL_OUTPUTS_DIR: &str = "AdditionalOutputs";

pub const RESULT_EXTENSION: &str = "gud";
pub const SELF_SCATTERING_WAVELENGTH_EXTENSION: &str = "mint01";
pub const SELF_SCATTERING_Q_EXTENSION: &str = "msubw01";

/// Column padding between data tokens and their free-text label.
pub const LABEL_SEPARATOR: &str = "          ";

pub const END_OF_COMPOSITION: &str = "end of composition input";
pub const END_OF_GROUPING: &str = "to end input of specified values";
pub const END_OF_RESONANCE: &str = "to finish specifying wavelength range of resonance";
pub const END_OF_EXPONENTIAL: &str = "to specify end of exponential parameter input";
pub const PROGRESS_MARKER: &str = "Got to:";

pub fn is_output_extension(extension: &str) -> bool {
    OUTPUT_EXTENSIONS
        .iter()
        .any(|candidate| candidate.eq_ignore_ascii_case(extension))
}
