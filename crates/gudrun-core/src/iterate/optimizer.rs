use crate::composition::Composition;
use crate::config::GudrunFile;
use crate::domain::{GudrunError, GudrunResult};
use crate::engine::EngineInvoker;
use crate::numerics::golden_section_search;
use crate::runner::{GudrunRunner, sample_report};
use serde::Serialize;
use std::path::Path;

const LOWER_BRACKET: f64 = 1e-2;
const UPPER_BRACKET: f64 = 10.0;

/// Weighted component ratios the search is allowed to move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptimisationTarget {
    /// The named component's ratio is the search variable.
    Single(String),
    /// The first ratio is the search variable; the second takes whatever
    /// keeps the pair's total unchanged.
    Pair(String, String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimisationOutcome {
    pub ratio: f64,
    pub second_ratio: Option<f64>,
    pub evaluations: usize,
}

/// Search variable resolved against one sample's weighted components.
#[derive(Debug, Clone, Copy)]
struct Variable {
    first: usize,
    /// Index of the compensating component and the conserved total.
    second: Option<(usize, f64)>,
}

impl Variable {
    fn apply(self, composition: &mut Composition, x: f64) {
        composition.weighted_components[self.first].ratio = x.abs();
        if let Some((index, total)) = self.second {
            composition.weighted_components[index].ratio = (total - x).abs();
        }
        composition.translate();
    }

    fn cost(self, expected: f64, achieved: f64) -> f64 {
        if expected == achieved {
            return 0.0;
        }
        match self.second {
            None => (expected - achieved).powi(2),
            Some(_) => (expected - achieved).abs() / achieved.abs().min(expected.abs()),
        }
    }
}

/// Golden-section search over weighted-component ratios, minimising the
/// distance between a sample's expected and achieved DCS levels.
///
/// Every cost evaluation runs the engine on the target sample alone.
pub struct CompositionOptimizer<'r, E> {
    runner: &'r GudrunRunner<E>,
    max_iterations: usize,
    rtol: f64,
}

impl<'r, E: EngineInvoker> CompositionOptimizer<'r, E> {
    pub fn new(runner: &'r GudrunRunner<E>, max_iterations: usize, rtol: f64) -> Self {
        Self {
            runner,
            max_iterations,
            rtol,
        }
    }

    /// Searches for the best ratio and writes it into `document`. The
    /// document is left untouched when an evaluation fails.
    pub fn optimise(
        &self,
        document: &mut GudrunFile,
        sample: &str,
        target: &OptimisationTarget,
    ) -> GudrunResult<OptimisationOutcome> {
        let locator = document
            .locate_sample(sample)
            .ok_or_else(|| GudrunError::Selection(format!("no sample named '{sample}'")))?;
        let base = document.isolate(locator).ok_or_else(|| {
            GudrunError::InvalidState(format!("sample '{sample}' could not be isolated"))
        })?;
        let composition = base
            .samples()
            .next()
            .map(|isolated| &isolated.composition)
            .ok_or_else(|| GudrunError::InvalidState("isolated document is empty".to_string()))?;
        let variable = resolve(composition, sample, target)?;
        let start = composition.weighted_components[variable.first].ratio;

        let scratch = tempfile::Builder::new()
            .prefix("gudrun-optimise-")
            .tempdir()
            .map_err(|source| GudrunError::io(std::env::temp_dir(), source))?;
        tracing::info!(sample, ?target, start, "starting composition search");

        let mut evaluations = 0;
        let mut failure = None;
        let found = golden_section_search(
            |x| {
                evaluations += 1;
                let output_dir = scratch.path().join(format!("evaluation-{evaluations}"));
                match self.evaluate(&base, sample, variable, x, &output_dir) {
                    Ok((expected, achieved)) => {
                        let cost = variable.cost(expected, achieved);
                        tracing::debug!(x, expected, achieved, cost, "evaluated ratio");
                        Some(cost)
                    }
                    Err(error) => {
                        tracing::warn!(x, error = %error, "evaluation failed, aborting search");
                        failure = Some(error);
                        None
                    }
                }
            },
            [LOWER_BRACKET, start, UPPER_BRACKET],
            0,
            self.max_iterations,
            self.rtol,
        );

        let Some(x) = found else {
            let source = failure.unwrap_or_else(|| {
                GudrunError::InvalidState("search ended without a result".to_string())
            });
            return Err(GudrunError::EvaluationAbort {
                source: Box::new(source),
            });
        };

        let target_sample = document.sample_mut(locator).ok_or_else(|| {
            GudrunError::InvalidState(format!("sample '{sample}' disappeared"))
        })?;
        variable.apply(&mut target_sample.composition, x);
        let outcome = OptimisationOutcome {
            ratio: x.abs(),
            second_ratio: variable.second.map(|(_, total)| (total - x).abs()),
            evaluations,
        };
        tracing::info!(sample, ratio = outcome.ratio, evaluations, "composition search finished");
        Ok(outcome)
    }

    fn evaluate(
        &self,
        base: &GudrunFile,
        sample: &str,
        variable: Variable,
        x: f64,
        output_dir: &Path,
    ) -> GudrunResult<(f64, f64)> {
        let mut candidate = base.clone();
        if let Some(isolated) = candidate.samples_mut().next() {
            variable.apply(&mut isolated.composition, x);
        }
        let output = self.runner.run_into(&candidate, output_dir)?;
        let report = sample_report(&output, sample)?;
        Ok((
            report.expected_dcs.value,
            report.average_level_merged_dcs.value,
        ))
    }
}

fn resolve(
    composition: &Composition,
    sample: &str,
    target: &OptimisationTarget,
) -> GudrunResult<Variable> {
    let index = |name: &str| {
        composition.component_index(name).ok_or_else(|| {
            GudrunError::Selection(format!("sample '{sample}' has no component '{name}'"))
        })
    };
    match target {
        OptimisationTarget::Single(name) => Ok(Variable {
            first: index(name)?,
            second: None,
        }),
        OptimisationTarget::Pair(first, second) => {
            let (first, second) = (index(first)?, index(second)?);
            if first == second {
                return Err(GudrunError::Selection(
                    "a component pair needs two distinct components".to_string(),
                ));
            }
            let components = &composition.weighted_components;
            let total = components[first].ratio + components[second].ratio;
            Ok(Variable {
                first,
                second: Some((second, total)),
            })
        }
    }
}
