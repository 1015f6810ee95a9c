use super::helpers::*;
use super::{CliError, GlobalArgs};
use gudrun_core::composition::{Composition, WeightedComponent};
use gudrun_core::config::{parse_document, render_document};
use gudrun_core::domain::GudrunError;
use gudrun_core::iterate::{
    BatchProcessor, CompositionOptimizer, IterationController, IterationMode, OptimisationTarget,
};
use gudrun_core::report::GudFile;
use std::path::PathBuf;

#[derive(clap::Args)]
pub(super) struct CheckArgs {
    /// Engine input file
    input: PathBuf,
}

#[derive(clap::Args)]
pub(super) struct RunArgs {
    /// Engine input file
    input: PathBuf,
}

#[derive(clap::Args)]
pub(super) struct IterateArgs {
    /// Engine input file
    input: PathBuf,

    /// Attribute adjusted between passes
    #[arg(long, value_parser = parse_mode, default_value = "tweak-factor")]
    mode: IterationMode,

    /// Number of iterations after the baseline pass
    #[arg(long, default_value_t = 1)]
    iterations: usize,

    /// Write the adjusted configuration here once iterating finishes
    #[arg(long)]
    save: Option<PathBuf>,
}

#[derive(clap::Args)]
pub(super) struct OptimizeArgs {
    /// Engine input file
    input: PathBuf,

    /// Sample whose composition is searched
    #[arg(long)]
    sample: String,

    /// Weighted component as NAME=RATIO; give one, or two to conserve their total
    #[arg(long = "component", value_parser = parse_component, required = true)]
    components: Vec<(String, f64)>,

    /// Golden-section steps before giving up on convergence
    #[arg(long, default_value_t = 10)]
    max_iterations: usize,

    /// Relative tolerance in percent
    #[arg(long, default_value_t = 1.0)]
    rtol: f64,

    /// Write the optimised configuration here
    #[arg(long)]
    save: Option<PathBuf>,
}

#[derive(clap::Args)]
pub(super) struct BatchArgs {
    /// Engine input file
    input: PathBuf,

    /// Data files per batch
    #[arg(long)]
    batch_size: usize,

    /// Iterations per batch before giving up on convergence
    #[arg(long, default_value_t = 5)]
    max_iterations: usize,

    /// Largest percentage change of merged levels counted as converged
    #[arg(long, default_value_t = 1.0)]
    rtol: f64,

    /// Attribute adjusted between passes
    #[arg(long, value_parser = parse_mode, default_value = "tweak-factor")]
    mode: IterationMode,

    /// Put each sample's first data file in a batch of its own
    #[arg(long)]
    separate_first_batch: bool,
}

#[derive(clap::Args)]
pub(super) struct ReportArgs {
    /// Result report (.gud)
    input: PathBuf,
}

pub(super) fn run_check_command(args: CheckArgs) -> Result<i32, CliError> {
    let document = load_document(&args.input)?;
    let reparsed = parse_document(&render_document(&document, "0"))?;

    let samples = document.samples().count();
    let running = document.running_samples().count();
    let containers = document
        .samples()
        .map(|sample| sample.containers.len())
        .sum::<usize>();
    println!(
        "Parsed '{}': {} sample backgrounds, {} samples ({} running), {} containers, {} components.",
        args.input.display(),
        document.sample_backgrounds.len(),
        samples,
        running,
        containers,
        document.components.len()
    );

    if reparsed != document {
        return Err(CliError::Core(GudrunError::InvalidState(
            "configuration does not serialize back to itself".to_string(),
        )));
    }
    println!("Round trip: OK");
    Ok(0)
}

pub(super) fn run_run_command(args: RunArgs, global: &GlobalArgs) -> Result<i32, CliError> {
    let document = load_document(&args.input)?;
    let runner = build_runner(global)?;
    let output = runner.run(&document)?;
    print_json(&output)?;
    Ok(0)
}

pub(super) fn run_iterate_command(args: IterateArgs, global: &GlobalArgs) -> Result<i32, CliError> {
    if args.iterations == 0 {
        return Err(CliError::Usage(
            "Invalid iteration count '0'; expected a positive integer.".to_string(),
        ));
    }
    let document = load_document(&args.input)?;
    let runner = build_runner(global)?;
    let mut controller = IterationController::new(&runner, document, args.mode, args.iterations);
    let output = controller.run_to_completion()?;
    eprintln!(
        "Completed {} {} iteration(s) in {} engine passes.",
        controller.iterations_completed(),
        args.mode,
        controller.completed_passes()
    );
    print_json(&output)?;
    save_document(controller.document(), args.save.as_deref())?;
    Ok(0)
}

pub(super) fn run_optimize_command(args: OptimizeArgs, global: &GlobalArgs) -> Result<i32, CliError> {
    let target = match args.components.as_slice() {
        [(single, _)] => OptimisationTarget::Single(single.clone()),
        [(first, _), (second, _)] => OptimisationTarget::Pair(first.clone(), second.clone()),
        _ => {
            return Err(CliError::Usage(
                "--component must be given once or twice".to_string(),
            ));
        }
    };

    let mut document = load_document(&args.input)?;
    let weighted = args
        .components
        .iter()
        .map(|(name, ratio)| {
            document
                .component(name)
                .map(|component| WeightedComponent::new(component, *ratio))
                .ok_or_else(|| {
                    GudrunError::Selection(format!(
                        "no component named '{name}' in the COMPONENTS section"
                    ))
                })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let locator = document
        .locate_sample(&args.sample)
        .ok_or_else(|| GudrunError::Selection(format!("no sample named '{}'", args.sample)))?;
    if let Some(sample) = document.sample_mut(locator) {
        sample.composition = Composition::from_components(weighted);
    }

    let runner = build_runner(global)?;
    let outcome = CompositionOptimizer::new(&runner, args.max_iterations, args.rtol)
        .optimise(&mut document, &args.sample, &target)?;
    print_json(&outcome)?;
    save_document(&document, args.save.as_deref())?;
    Ok(0)
}

pub(super) fn run_batch_command(args: BatchArgs, global: &GlobalArgs) -> Result<i32, CliError> {
    let document = load_document(&args.input)?;
    let runner = build_runner(global)?;
    let outcomes = BatchProcessor::new(args.batch_size)
        .max_iterations(args.max_iterations)
        .rtol(args.rtol)
        .mode(args.mode)
        .separate_first_batch(args.separate_first_batch)
        .process(&runner, &document)?;
    print_json(&outcomes)?;

    if outcomes.iter().all(|outcome| outcome.converged) {
        Ok(0)
    } else {
        Ok(1)
    }
}

pub(super) fn run_report_command(args: ReportArgs) -> Result<i32, CliError> {
    let report = GudFile::from_path(&args.input)?;
    print_json(&report)?;
    Ok(0)
}
