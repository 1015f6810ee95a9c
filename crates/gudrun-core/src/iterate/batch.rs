use super::{IterationController, IterationMode};
use crate::config::GudrunFile;
use crate::domain::{GudrunError, GudrunResult};
use crate::engine::EngineInvoker;
use crate::numerics::within_percent;
use crate::output::GudrunOutput;
use crate::runner::{GudrunRunner, sample_report};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub index: usize,
    pub iterations: usize,
    pub converged: bool,
    pub output: Option<GudrunOutput>,
}

/// Splits every running sample's data files into consecutive batches and
/// iterates each batch until the merged DCS levels settle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchProcessor {
    pub batch_size: usize,
    pub max_iterations: usize,
    /// Largest percentage change of a merged level still counted as settled.
    pub rtol: f64,
    pub mode: IterationMode,
    /// Give each sample's first data file a batch of its own.
    pub separate_first_batch: bool,
}

impl BatchProcessor {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size,
            max_iterations: 5,
            rtol: 1.0,
            mode: IterationMode::TweakFactor,
            separate_first_batch: false,
        }
    }

    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn rtol(mut self, rtol: f64) -> Self {
        self.rtol = rtol;
        self
    }

    pub fn mode(mut self, mode: IterationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn separate_first_batch(mut self, separate: bool) -> Self {
        self.separate_first_batch = separate;
        self
    }

    fn chunk(&self, files: &[String]) -> Vec<Vec<String>> {
        let (first, rest) = match files.split_first() {
            Some((first, rest)) if self.separate_first_batch => (Some(first), rest),
            _ => (None, files),
        };
        first
            .map(|file| vec![file.clone()])
            .into_iter()
            .chain(rest.chunks(self.batch_size).map(<[String]>::to_vec))
            .collect()
    }

    /// One document per batch index. A sample without files at an index is
    /// switched off in that batch's document.
    pub fn batches(&self, document: &GudrunFile) -> GudrunResult<Vec<GudrunFile>> {
        if self.batch_size == 0 {
            return Err(GudrunError::Selection(
                "batch size must be at least 1".to_string(),
            ));
        }
        let chunks = document
            .samples()
            .map(|sample| {
                sample
                    .is_running()
                    .then(|| self.chunk(&sample.data_files.files))
            })
            .collect::<Vec<_>>();
        let count = chunks.iter().flatten().map(Vec::len).max().unwrap_or(0);

        let batches = (0..count)
            .map(|index| {
                let mut batch = document.clone();
                for (sample, chunks) in batch.samples_mut().zip(&chunks) {
                    let Some(chunks) = chunks else { continue };
                    match chunks.get(index) {
                        Some(files) => sample.data_files.files = files.clone(),
                        None => sample.run_this_sample = false,
                    }
                }
                batch
            })
            .collect::<Vec<_>>();
        tracing::debug!(batches = batches.len(), "partitioned data files");
        Ok(batches)
    }

    /// Iterates every batch in turn, each into its own
    /// `<output_name>-batch-<n>` tree.
    pub fn process<E: EngineInvoker>(
        &self,
        runner: &GudrunRunner<E>,
        document: &GudrunFile,
    ) -> GudrunResult<Vec<BatchOutcome>> {
        let settings = runner.settings();
        let mut outcomes = Vec::new();
        for (index, batch) in self.batches(document)?.into_iter().enumerate() {
            let output_dir: PathBuf = settings
                .output_root
                .join(format!("{}-batch-{}", settings.output_name, index + 1));
            let outcome = self.process_batch(runner, batch, index, output_dir)?;
            tracing::info!(
                batch = index + 1,
                iterations = outcome.iterations,
                converged = outcome.converged,
                "batch finished"
            );
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    fn process_batch<E: EngineInvoker>(
        &self,
        runner: &GudrunRunner<E>,
        batch: GudrunFile,
        index: usize,
        output_dir: PathBuf,
    ) -> GudrunResult<BatchOutcome> {
        let names = batch
            .running_samples()
            .map(|sample| sample.name.clone())
            .collect::<Vec<_>>();
        let passes_per_iteration = self.mode.passes_per_iteration();
        let mut controller = IterationController::new(runner, batch, self.mode, self.max_iterations)
            .output_dir(output_dir);

        let mut previous: Option<BTreeMap<String, f64>> = None;
        let mut converged = false;
        loop {
            let levels = match controller.step()? {
                Some(output) => merged_levels(output, &names)?,
                None => break,
            };
            if controller.completed_passes() % passes_per_iteration != 0 {
                continue;
            }
            if let Some(previous) = &previous {
                converged = levels.iter().all(|(name, level)| {
                    previous
                        .get(name)
                        .is_some_and(|before| within_percent(*before, *level, self.rtol))
                });
            }
            if converged {
                break;
            }
            previous = Some(levels);
        }

        Ok(BatchOutcome {
            index,
            iterations: controller.iterations_completed(),
            converged,
            output: controller.last_output().cloned(),
        })
    }
}

fn merged_levels(output: &GudrunOutput, names: &[String]) -> GudrunResult<BTreeMap<String, f64>> {
    names
        .iter()
        .map(|name| {
            sample_report(output, name)
                .map(|report| (name.clone(), report.average_level_merged_dcs.value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::BatchProcessor;
    use crate::config::Sample;
    use crate::domain::GudrunError;
    use crate::runner::GudrunRunner;
    use crate::test_support::{ReportingEngine, document, sample, settings};
    use tempfile::TempDir;

    fn files(document: &crate::config::GudrunFile) -> Vec<(String, bool, Vec<String>)> {
        document
            .samples()
            .map(|sample| {
                (
                    sample.name.clone(),
                    sample.is_running(),
                    sample.data_files.files.clone(),
                )
            })
            .collect()
    }

    fn names(files: &[&str]) -> Vec<String> {
        files.iter().map(|file| file.to_string()).collect()
    }

    #[test]
    fn batches_chunk_files_and_disable_exhausted_samples() {
        let mut idle = sample("Idle", &["I1.raw"]);
        idle.run_this_sample = false;
        let document = document(vec![
            sample("A", &["a1.raw", "a2.raw", "a3.raw", "a4.raw", "a5.raw"]),
            sample("B", &["b1.raw", "b2.raw"]),
            idle,
        ]);

        let batches = BatchProcessor::new(2)
            .batches(&document)
            .expect("batches should build");
        assert_eq!(batches.len(), 3);
        assert_eq!(
            files(&batches[0]),
            vec![
                ("A".to_string(), true, names(&["a1.raw", "a2.raw"])),
                ("B".to_string(), true, names(&["b1.raw", "b2.raw"])),
                ("Idle".to_string(), false, names(&["I1.raw"])),
            ]
        );
        assert_eq!(
            files(&batches[2]),
            vec![
                ("A".to_string(), true, names(&["a5.raw"])),
                ("B".to_string(), false, names(&["b1.raw", "b2.raw"])),
                ("Idle".to_string(), false, names(&["I1.raw"])),
            ]
        );
    }

    #[test]
    fn first_file_can_form_its_own_batch() {
        let document = document(vec![sample("A", &["a1.raw", "a2.raw", "a3.raw"])]);
        let batches = BatchProcessor::new(2)
            .separate_first_batch(true)
            .batches(&document)
            .expect("batches should build");
        let chunks = batches
            .iter()
            .map(|batch| files(batch)[0].2.clone())
            .collect::<Vec<_>>();
        assert_eq!(chunks, vec![names(&["a1.raw"]), names(&["a2.raw", "a3.raw"])]);
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let document = document(vec![sample("A", &["a1.raw"])]);
        let error = BatchProcessor::new(0)
            .batches(&document)
            .expect_err("zero batch size should fail");
        assert!(matches!(error, GudrunError::Selection(_)));
    }

    #[test]
    fn batches_stop_once_merged_levels_settle() {
        let root = TempDir::new().expect("tempdir should be created");
        let engine =
            ReportingEngine::new(|sample: &Sample| (2.0, 2.4 / sample.tweak_factor, 1.2));
        let runner = GudrunRunner::new(&engine, settings(root.path()));
        let document = document(vec![sample("A", &["a1.raw", "a2.raw", "a3.raw"])]);

        let outcomes = BatchProcessor::new(2)
            .max_iterations(5)
            .process(&runner, &document)
            .expect("batches should run");
        assert_eq!(outcomes.len(), 2);
        for outcome in &outcomes {
            assert!(outcome.converged);
            assert_eq!(outcome.iterations, 2);
        }
        assert_eq!(engine.calls(), 6);

        let second = outcomes[1].output.as_ref().expect("second batch has output");
        assert_eq!(second.output_dir, root.path().join("Gudrun-batch-2"));
        assert!(second.gud_file("A").is_some_and(|path| path.ends_with("a3.gud")));
    }

    #[test]
    fn unsettled_batches_report_the_iteration_limit() {
        let root = TempDir::new().expect("tempdir should be created");
        let engine =
            ReportingEngine::new(|sample: &Sample| (2.0, 2.4 / sample.tweak_factor, 1.2));
        let runner = GudrunRunner::new(&engine, settings(root.path()));
        let document = document(vec![sample("A", &["a1.raw"])]);

        let outcomes = BatchProcessor::new(1)
            .max_iterations(1)
            .process(&runner, &document)
            .expect("batch should run");
        assert_eq!(outcomes.len(), 1);
        assert!(!outcomes[0].converged);
        assert_eq!(outcomes[0].iterations, 1);
        assert_eq!(engine.calls(), 2);
    }
}
