//! Relocation of engine artifacts into the persistent output tree, and the
//! manifest describing where everything ended up.

mod organizer;

pub use organizer::OutputOrganizer;

use crate::common::constants::RESULT_EXTENSION;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Extension-keyed artifacts, grouped by the data file they derive from.
pub type ArtifactMap = BTreeMap<String, BTreeMap<String, PathBuf>>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleOutput {
    pub sample_file: Option<PathBuf>,
    pub gud_file: Option<PathBuf>,
    pub outputs: ArtifactMap,
    pub diagnostics: ArtifactMap,
}

impl SampleOutput {
    /// First output with `extension`, scanning data files by name.
    pub fn output(&self, extension: &str) -> Option<&Path> {
        lookup(&self.outputs, extension)
    }

    pub fn diagnostic(&self, extension: &str) -> Option<&Path> {
        lookup(&self.diagnostics, extension)
    }
}

fn lookup<'a>(artifacts: &'a ArtifactMap, extension: &str) -> Option<&'a Path> {
    artifacts
        .values()
        .find_map(|by_extension| by_extension.get(extension))
        .map(PathBuf::as_path)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GudrunOutput {
    pub output_dir: PathBuf,
    pub input_file_path: PathBuf,
    pub samples: BTreeMap<String, SampleOutput>,
    pub additional_outputs: Vec<PathBuf>,
    /// Where a previous tree at the destination was moved to.
    pub archived_to: Option<PathBuf>,
}

impl GudrunOutput {
    pub fn sample(&self, name: &str) -> Option<&SampleOutput> {
        self.samples.get(name)
    }

    pub fn gud_file(&self, sample: &str) -> Option<&Path> {
        self.samples
            .get(sample)
            .and_then(|output| output.gud_file.as_deref())
    }
}

/// Base name shared by a data file and every artifact the engine derives
/// from it.
pub fn data_file_stem(data_file: &str) -> String {
    let name = Path::new(data_file)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| data_file.to_string());
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => name,
    }
}

/// Result report the engine writes for a sample whose first data file is
/// `data_file`.
pub fn result_file_name(data_file: &str) -> String {
    format!("{}.{RESULT_EXTENSION}", data_file_stem(data_file))
}
