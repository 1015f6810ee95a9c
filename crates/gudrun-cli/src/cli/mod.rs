mod commands;
mod helpers;

use clap::Parser;
use gudrun_core::domain::GudrunError;
use std::path::PathBuf;

pub fn run_from_env() -> i32 {
    match run(std::env::args().skip(1)) {
        Ok(code) => code,
        Err(error) => {
            eprintln!("{}", error.diagnostic_line());
            error.exit_code()
        }
    }
}

pub fn run<I, S>(args: I) -> Result<i32, CliError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let full_args = std::iter::once("gudrun-rs".to_string())
        .chain(args.into_iter().map(Into::into))
        .collect::<Vec<_>>();
    match Cli::try_parse_from(&full_args) {
        Ok(cli) => {
            helpers::init_logging(cli.global.verbose);
            dispatch_parsed(cli.command, &cli.global)
        }
        Err(err) => match err.kind() {
            clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                print!("{}", err);
                Ok(0)
            }
            _ => Err(CliError::Usage(err.to_string())),
        },
    }
}

#[derive(Parser)]
#[command(
    name = "gudrun-rs",
    version,
    about = "Drive the Gudrun correction engine: configure, run, iterate and organise outputs"
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(clap::Args, Debug, Default)]
pub(crate) struct GlobalArgs {
    /// JSON run settings file
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Engine executable, overriding the settings file
    #[arg(long, global = true)]
    engine: Option<PathBuf>,

    /// Directory that receives the output tree
    #[arg(long, global = true)]
    output_root: Option<PathBuf>,

    /// Keep an existing output tree and write beside it instead
    #[arg(long, global = true)]
    no_overwrite: bool,

    /// Log debug detail to stderr
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(clap::Subcommand)]
enum CliCommand {
    /// Parse a configuration and check that it serializes back unchanged
    Check(commands::CheckArgs),
    /// Run the engine once and organise its outputs
    Run(commands::RunArgs),
    /// Iterate a sample attribute against the engine's results
    Iterate(commands::IterateArgs),
    /// Search weighted-component ratios for one sample
    Optimize(commands::OptimizeArgs),
    /// Iterate batches of data files until merged levels settle
    Batch(commands::BatchArgs),
    /// Print a result report as JSON
    Report(commands::ReportArgs),
}

fn dispatch_parsed(command: CliCommand, global: &GlobalArgs) -> Result<i32, CliError> {
    match command {
        CliCommand::Check(args) => commands::run_check_command(args),
        CliCommand::Run(args) => commands::run_run_command(args, global),
        CliCommand::Iterate(args) => commands::run_iterate_command(args, global),
        CliCommand::Optimize(args) => commands::run_optimize_command(args, global),
        CliCommand::Batch(args) => commands::run_batch_command(args, global),
        CliCommand::Report(args) => commands::run_report_command(args),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error("{0}")]
    Core(#[from] GudrunError),
    #[error(transparent)]
    Internal(anyhow::Error),
}

impl CliError {
    pub fn diagnostic_line(&self) -> String {
        match self {
            Self::Usage(message) => format!("ERROR: [INPUT.CLI_USAGE] {}", message.trim_end()),
            Self::Core(error) => error.diagnostic_line(),
            Self::Internal(error) => format!("ERROR: [IO.CLI] {error:#}"),
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Usage(_) => 2,
            Self::Core(error) => error.exit_code(),
            Self::Internal(_) => 3,
        }
    }
}
