use super::{CliError, GlobalArgs};
use anyhow::Context;
use gudrun_core::common::{RunSettings, load_run_settings};
use gudrun_core::engine::ProcessEngine;
use gudrun_core::iterate::IterationMode;
use gudrun_core::{GudrunFile, GudrunRunner};
use serde::Serialize;
use std::path::Path;
use tracing_subscriber::EnvFilter;

pub(super) fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

pub(super) fn resolve_settings(global: &GlobalArgs) -> Result<RunSettings, CliError> {
    let mut settings = match &global.settings {
        Some(path) => load_run_settings(path)?,
        None => RunSettings::default(),
    };
    if let Some(engine) = &global.engine {
        settings.engine = engine.clone();
    }
    if let Some(root) = &global.output_root {
        settings.output_root = root.clone();
    }
    if global.no_overwrite {
        settings.overwrite = false;
    }
    Ok(settings)
}

pub(super) fn build_runner(global: &GlobalArgs) -> Result<GudrunRunner<ProcessEngine>, CliError> {
    let settings = resolve_settings(global)?;
    let engine = ProcessEngine::new(settings.engine.clone()).with_args(settings.engine_args.clone());
    Ok(GudrunRunner::new(engine, settings))
}

pub(super) fn load_document(path: &Path) -> Result<GudrunFile, CliError> {
    Ok(GudrunFile::from_path(path)?)
}

pub(super) fn save_document(document: &GudrunFile, path: Option<&Path>) -> Result<(), CliError> {
    if let Some(path) = path {
        document.write_to(path)?;
        println!("Updated configuration written to {}", path.display());
    }
    Ok(())
}

pub(super) fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)
        .context("failed to render JSON output")
        .map_err(CliError::Internal)?;
    println!("{rendered}");
    Ok(())
}

pub(super) fn parse_mode(value: &str) -> Result<IterationMode, String> {
    IterationMode::from_name(value).ok_or_else(|| {
        format!(
            "unknown mode '{value}'; expected one of tweak-factor, density, thickness, inner-radius, outer-radius, inelasticity"
        )
    })
}

/// `NAME=RATIO` pairs naming a weighted component.
pub(super) fn parse_component(value: &str) -> Result<(String, f64), String> {
    let (name, ratio) = value
        .rsplit_once('=')
        .ok_or_else(|| format!("expected NAME=RATIO, found '{value}'"))?;
    let ratio = ratio
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("invalid ratio '{ratio}' for component '{name}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing component name in '{value}'"));
    }
    Ok((name.to_string(), ratio))
}

#[cfg(test)]
mod tests {
    use super::{parse_component, parse_mode};
    use gudrun_core::iterate::{IterationMode, RadiusKind};

    #[test]
    fn component_pairs_split_on_the_last_equals_sign() {
        assert_eq!(parse_component("H2O=0.5"), Ok(("H2O".to_string(), 0.5)));
        assert_eq!(parse_component("a=b=2"), Ok(("a=b".to_string(), 2.0)));
        assert!(parse_component("H2O").is_err());
        assert!(parse_component("=1").is_err());
        assert!(parse_component("H2O=lots").is_err());
    }

    #[test]
    fn modes_accept_their_names() {
        assert_eq!(
            parse_mode("outer-radius"),
            Ok(IterationMode::Radius(RadiusKind::Outer))
        );
        assert!(parse_mode("wavelength").is_err());
    }
}
