use super::{ArtifactMap, GudrunOutput, SampleOutput, data_file_stem};
use crate::common::constants::{
    ADDITIONAL_OUTPUTS_DIR, DIAGNOSTICS_DIR, NORMALISATION_BACKGROUND_DIR, NORMALISATION_DIR,
    OUTPUTS_DIR, RESULT_EXTENSION, SAMPLE_BACKGROUND_PREFIX, SAMPLE_BACKGROUNDS_DIR,
    is_output_extension,
};
use crate::config::{DataFiles, GudrunFile};
use crate::domain::{GudrunError, GudrunResult};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Moves the artifacts of one finished invocation out of its working
/// directory into `<output_dir>`.
///
/// The tree is assembled in a staging directory next to the destination and
/// promoted with a single rename, so readers never see a partial tree.
#[derive(Debug)]
pub struct OutputOrganizer<'a> {
    document: &'a GudrunFile,
    working_dir: &'a Path,
    input_file_name: &'a str,
    output_dir: PathBuf,
    overwrite: bool,
}

impl<'a> OutputOrganizer<'a> {
    pub fn new(
        document: &'a GudrunFile,
        working_dir: &'a Path,
        input_file_name: &'a str,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            document,
            working_dir,
            input_file_name,
            output_dir: output_dir.into(),
            overwrite: true,
        }
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn organise(self) -> GudrunResult<GudrunOutput> {
        self.document.check_sample_names()?;

        let parent = self
            .output_dir
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let name = self
            .output_dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| GudrunError::path(&self.output_dir, "output directory has no name"))?;
        fs::create_dir_all(&parent).map_err(|source| GudrunError::io(&parent, source))?;

        let staging = tempfile::Builder::new()
            .prefix(&format!(".{name}.staging-"))
            .tempdir_in(&parent)
            .map_err(|source| GudrunError::io(&parent, source))?;

        let promoted = StagingPass::new(self.working_dir, staging.path())
            .and_then(|mut pass| pass.stage(self.document, self.input_file_name))
            .and_then(|manifest| {
                let (destination, archived_to) = self.promote(staging.path(), &parent, &name)?;
                Ok(manifest.resolve(&destination, archived_to))
            });

        match promoted {
            Ok(output) => {
                let _ = staging.keep();
                tracing::info!(output = %output.output_dir.display(), "promoted output tree");
                Ok(output)
            }
            Err(source) => {
                let staging = staging.keep();
                tracing::error!(
                    staging = %staging.display(),
                    error = %source,
                    "output tree not promoted"
                );
                Err(GudrunError::Promotion {
                    staging,
                    source: Box::new(source),
                })
            }
        }
    }

    /// Renames the staged tree to its destination, archiving or sidestepping
    /// an existing tree first.
    fn promote(
        &self,
        staging: &Path,
        parent: &Path,
        name: &str,
    ) -> GudrunResult<(PathBuf, Option<PathBuf>)> {
        if !self.output_dir.exists() {
            rename_dir(staging, &self.output_dir)?;
            return Ok((self.output_dir.clone(), None));
        }
        if !self.overwrite {
            let sibling = free_sibling(parent, name, "_");
            rename_dir(staging, &sibling)?;
            return Ok((sibling, None));
        }

        let archive = free_sibling(parent, name, ".archive-");
        rename_dir(&self.output_dir, &archive)?;
        tracing::info!(
            from = %self.output_dir.display(),
            to = %archive.display(),
            "archived previous output tree"
        );
        if let Err(error) = rename_dir(staging, &self.output_dir) {
            if fs::rename(&archive, &self.output_dir).is_err() {
                tracing::warn!(archive = %archive.display(), "previous output tree left in its archive");
            }
            return Err(error);
        }
        Ok((self.output_dir.clone(), Some(archive)))
    }
}

fn rename_dir(from: &Path, to: &Path) -> GudrunResult<()> {
    fs::rename(from, to).map_err(|source| GudrunError::io(to, source))
}

/// First `<name><separator><n>` sibling that does not exist yet.
fn free_sibling(parent: &Path, name: &str, separator: &str) -> PathBuf {
    (1..)
        .map(|index| parent.join(format!("{name}{separator}{index}")))
        .find(|candidate| !candidate.exists())
        .unwrap_or_else(|| parent.join(name))
}

/// Keeps a directory name to a single path component.
fn folder_name(name: &str) -> String {
    let cleaned = name
        .chars()
        .map(|ch| if matches!(ch, '/' | '\\' | ':') { '_' } else { ch })
        .collect::<String>();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        "_".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Manifest with paths relative to the tree root, resolved after promotion.
#[derive(Debug, Default)]
struct StagedManifest {
    input_file: PathBuf,
    samples: BTreeMap<String, StagedSample>,
    additional_outputs: Vec<PathBuf>,
}

#[derive(Debug, Default)]
struct StagedSample {
    sample_file: Option<PathBuf>,
    gud_file: Option<PathBuf>,
    outputs: ArtifactMap,
    diagnostics: ArtifactMap,
}

fn resolve_map(root: &Path, map: ArtifactMap) -> ArtifactMap {
    map.into_iter()
        .map(|(data_file, by_extension)| {
            let resolved = by_extension
                .into_iter()
                .map(|(extension, relative)| (extension, root.join(relative)))
                .collect();
            (data_file, resolved)
        })
        .collect()
}

impl StagedManifest {
    fn resolve(self, root: &Path, archived_to: Option<PathBuf>) -> GudrunOutput {
        GudrunOutput {
            output_dir: root.to_path_buf(),
            input_file_path: root.join(self.input_file),
            samples: self
                .samples
                .into_iter()
                .map(|(name, staged)| {
                    let output = SampleOutput {
                        sample_file: staged.sample_file.map(|path| root.join(path)),
                        gud_file: staged.gud_file.map(|path| root.join(path)),
                        outputs: resolve_map(root, staged.outputs),
                        diagnostics: resolve_map(root, staged.diagnostics),
                    };
                    (name, output)
                })
                .collect(),
            additional_outputs: self
                .additional_outputs
                .into_iter()
                .map(|path| root.join(path))
                .collect(),
            archived_to,
        }
    }
}

struct StagingPass<'a> {
    staging: &'a Path,
    files: Vec<PathBuf>,
    claimed: HashSet<PathBuf>,
}

impl<'a> StagingPass<'a> {
    fn new(working_dir: &Path, staging: &'a Path) -> GudrunResult<Self> {
        let entries =
            fs::read_dir(working_dir).map_err(|source| GudrunError::io(working_dir, source))?;
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| GudrunError::io(working_dir, source))?;
            let path = entry.path();
            if path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(Self {
            staging,
            files,
            claimed: HashSet::new(),
        })
    }

    fn stage(&mut self, document: &GudrunFile, input_file_name: &str) -> GudrunResult<StagedManifest> {
        let mut manifest = StagedManifest::default();

        let normalisation = &document.normalisation;
        self.relocate_all(&normalisation.data_files, Path::new(NORMALISATION_DIR))?;
        self.relocate_all(
            &normalisation.background_files,
            Path::new(NORMALISATION_BACKGROUND_DIR),
        )?;

        for (index, background) in document.sample_backgrounds.iter().enumerate() {
            let folder = Path::new(SAMPLE_BACKGROUNDS_DIR)
                .join(format!("{SAMPLE_BACKGROUND_PREFIX}{}", index + 1));
            self.relocate_all(&background.data_files, &folder)?;
        }

        for sample in document.running_samples() {
            let folder = PathBuf::from(folder_name(&sample.name));
            let mut staged = StagedSample::default();
            for data_file in &sample.data_files.files {
                self.split(data_file, &folder, &mut staged.outputs, &mut staged.diagnostics)?;
            }
            if let Some(first) = sample.data_files.files.first() {
                let produced = staged.outputs.get(first);
                staged.gud_file = produced
                    .and_then(|by_extension| by_extension.get(RESULT_EXTENSION))
                    .cloned();
                staged.sample_file = produced
                    .and_then(|by_extension| by_extension.get("sample"))
                    .cloned();
            }
            if staged.gud_file.is_none() {
                tracing::warn!(sample = %sample.name, "no result report was produced");
            }
            for container in &sample.containers {
                let container_folder = folder.join(folder_name(&container.name));
                let mut outputs = ArtifactMap::new();
                let mut diagnostics = ArtifactMap::new();
                for data_file in &container.data_files.files {
                    self.split(data_file, &container_folder, &mut outputs, &mut diagnostics)?;
                }
            }
            manifest.samples.insert(sample.name.clone(), staged);
        }

        let input_path = self
            .files
            .iter()
            .find(|path| path.file_name().is_some_and(|name| name == input_file_name))
            .cloned();
        manifest.input_file = PathBuf::from(input_file_name);
        if let Some(input_path) = input_path {
            self.claimed.insert(input_path.clone());
            self.move_into(&input_path, Path::new(""))?;
        }

        let leftovers = self
            .files
            .iter()
            .filter(|path| !self.claimed.contains(*path))
            .cloned()
            .collect::<Vec<_>>();
        for path in leftovers {
            let relative = self.move_into(&path, Path::new(ADDITIONAL_OUTPUTS_DIR))?;
            self.claimed.insert(path);
            manifest.additional_outputs.push(relative);
        }

        Ok(manifest)
    }

    /// Unclaimed working-directory files sharing the data file's stem.
    fn siblings(&mut self, data_file: &str) -> Vec<PathBuf> {
        let stem = data_file_stem(data_file);
        let matched = self
            .files
            .iter()
            .filter(|path| !self.claimed.contains(*path))
            .filter(|path| {
                path.file_stem()
                    .is_some_and(|candidate| candidate.to_string_lossy() == stem)
            })
            .cloned()
            .collect::<Vec<_>>();
        self.claimed.extend(matched.iter().cloned());
        matched
    }

    fn relocate_all(&mut self, data_files: &DataFiles, folder: &Path) -> GudrunResult<()> {
        fs::create_dir_all(self.staging.join(folder))
            .map_err(|source| GudrunError::io(self.staging.join(folder), source))?;
        for data_file in &data_files.files {
            for path in self.siblings(data_file) {
                self.move_into(&path, folder)?;
            }
        }
        Ok(())
    }

    fn split(
        &mut self,
        data_file: &str,
        folder: &Path,
        outputs: &mut ArtifactMap,
        diagnostics: &mut ArtifactMap,
    ) -> GudrunResult<()> {
        let outputs_dir = folder.join(OUTPUTS_DIR);
        let diagnostics_dir = folder.join(DIAGNOSTICS_DIR);
        for dir in [&outputs_dir, &diagnostics_dir] {
            fs::create_dir_all(self.staging.join(dir))
                .map_err(|source| GudrunError::io(self.staging.join(dir), source))?;
        }

        for path in self.siblings(data_file) {
            let extension = path
                .extension()
                .map(|extension| extension.to_string_lossy().into_owned())
                .unwrap_or_default();
            let (dir, target) = if is_output_extension(&extension) {
                (&outputs_dir, &mut *outputs)
            } else {
                (&diagnostics_dir, &mut *diagnostics)
            };
            let relative = self.move_into(&path, dir)?;
            target
                .entry(data_file.to_string())
                .or_default()
                .insert(extension, relative);
        }
        Ok(())
    }

    /// Returns the new path relative to the tree root.
    fn move_into(&self, path: &Path, folder: &Path) -> GudrunResult<PathBuf> {
        let file_name = path
            .file_name()
            .ok_or_else(|| GudrunError::path(path, "artifact has no file name"))?;
        let relative = folder.join(file_name);
        let target = self.staging.join(&relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|source| GudrunError::io(parent, source))?;
        }
        if fs::rename(path, &target).is_err() {
            fs::copy(path, &target).map_err(|source| GudrunError::io(path, source))?;
            fs::remove_file(path).map_err(|source| GudrunError::io(path, source))?;
        }
        tracing::debug!(artifact = %relative.display(), "relocated artifact");
        Ok(relative)
    }
}
