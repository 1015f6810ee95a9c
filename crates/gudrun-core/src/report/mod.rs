//! Per-sample result report (`.gud`) written by the engine.

mod parser;

use crate::common::constants::RESULT_EXTENSION;
use crate::domain::{GudrunError, GudrunResult};
use serde::{Serialize, Serializer};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

const DENSITY_LABEL: &str = "Number density of this sample (atoms/A**3) =";
const SCATTERING_LENGTH_LABEL: &str =
    "Average scattering length of the sample (10**-12cm) =";
const SCATTERING_LENGTH_SQUARED_LABEL: &str =
    "Average scattering length squared (barns) =";
const SQUARE_OF_SCATTERING_LENGTH_LABEL: &str =
    "Average square of the scattering length (barns) =";
const COHERENT_RATIO_LABEL: &str = "Coherent scattering ratio =";
const EXPECTED_DCS_LABEL: &str = "Expected level of DCS [b/sr/atom] =";
const GROUPS_TABLE_HEADER: &str =
    "  Group   No. of points   Mean level of dcs   Gradient of dcs (% of mean)";
const GROUP_COUNT_LABEL: &str = "Number of groups accepted for merge =";
const MERGED_LEVEL_LABEL: &str = "Gradient and average level of merged dcs:";
const WARNING_MARKER: &str = "WARNING!";
const TWEAK_FACTOR_MARKER: &str = "Suggested tweak factor";

/// Number read from the report together with its literal spelling, so the
/// report can be rewritten without reformatting.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportValue {
    pub value: f64,
    pub literal: String,
}

impl ReportValue {
    pub fn new(value: f64) -> Self {
        Self {
            value,
            literal: value.to_string(),
        }
    }
}

impl Serialize for ReportValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GudFile {
    pub path: PathBuf,
    pub name: String,
    pub title: String,
    pub author: String,
    pub stamp: String,
    pub density: ReportValue,
    pub average_scattering_length: ReportValue,
    pub average_scattering_length_squared: ReportValue,
    pub average_square_of_scattering_length: ReportValue,
    pub coherent_ratio: ReportValue,
    pub expected_dcs: ReportValue,
    pub groups_table: Vec<String>,
    pub group_count: u32,
    pub average_level_merged_dcs: ReportValue,
    pub gradient: ReportValue,
    pub error_lines: Vec<String>,
    pub result: String,
    /// Signed deviation from the expected level in percent.
    pub percentage: Option<f64>,
    pub suggested_tweak_factor: ReportValue,
}

impl GudFile {
    /// Minimal report carrying the levels the iteration loops read, with
    /// the remaining metrics zeroed. The sample name doubles as the title.
    pub fn new(
        path: impl Into<PathBuf>,
        name: impl Into<String>,
        expected_dcs: f64,
        average_level_merged_dcs: f64,
        suggested_tweak_factor: f64,
    ) -> Self {
        let deviation = if expected_dcs == 0.0 {
            0.0
        } else {
            (average_level_merged_dcs / expected_dcs - 1.0) * 100.0
        };
        let direction = if deviation < 0.0 { "BELOW" } else { "ABOVE" };
        let result = format!(
            " Average level of merged dcs is   {:.1}% {direction} the expected level",
            deviation.abs()
        );
        let name = name.into();
        Self {
            path: path.into(),
            title: name.clone(),
            name,
            author: env!("CARGO_PKG_NAME").to_string(),
            stamp: crate::config::timestamp_now(),
            density: ReportValue::new(0.0),
            average_scattering_length: ReportValue::new(0.0),
            average_scattering_length_squared: ReportValue::new(0.0),
            average_square_of_scattering_length: ReportValue::new(0.0),
            coherent_ratio: ReportValue::new(0.0),
            expected_dcs: ReportValue::new(expected_dcs),
            groups_table: Vec::new(),
            group_count: 0,
            average_level_merged_dcs: ReportValue::new(average_level_merged_dcs),
            gradient: ReportValue::new(0.0),
            error_lines: Vec::new(),
            percentage: percentage_from_block(&result),
            result,
            suggested_tweak_factor: ReportValue::new(suggested_tweak_factor),
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> GudrunResult<Self> {
        let path = path.as_ref();
        let has_extension = path
            .extension()
            .is_some_and(|extension| extension.eq_ignore_ascii_case(RESULT_EXTENSION));
        if !has_extension {
            return Err(GudrunError::path(
                path,
                "result report must have a .gud extension",
            ));
        }
        if !path.is_file() {
            return Err(GudrunError::path(path, "result report does not exist"));
        }
        let source = fs::read_to_string(path).map_err(|source| GudrunError::io(path, source))?;
        parser::parse_gud_file(path, &source).map_err(|source| GudrunError::Report {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn is_warning(&self) -> bool {
        !self.error_lines.is_empty()
    }

    /// Achieved over expected level; `None` when nothing is expected.
    pub fn coefficient(&self) -> Option<f64> {
        (self.expected_dcs.value != 0.0)
            .then(|| self.average_level_merged_dcs.value / self.expected_dcs.value)
    }

    pub fn to_text(&self) -> String {
        let mut text = String::new();
        for header in [&self.name, &self.title, &self.author, &self.stamp] {
            let _ = writeln!(text, " {header}");
            text.push_str(" \n");
        }
        for (label, value) in [
            (DENSITY_LABEL, &self.density),
            (SCATTERING_LENGTH_LABEL, &self.average_scattering_length),
            (
                SCATTERING_LENGTH_SQUARED_LABEL,
                &self.average_scattering_length_squared,
            ),
            (
                SQUARE_OF_SCATTERING_LENGTH_LABEL,
                &self.average_square_of_scattering_length,
            ),
            (COHERENT_RATIO_LABEL, &self.coherent_ratio),
            (EXPECTED_DCS_LABEL, &self.expected_dcs),
        ] {
            let _ = writeln!(text, " {label}   {}", value.literal);
        }
        text.push_str(" \n");
        let _ = writeln!(text, "{GROUPS_TABLE_HEADER}");
        text.push_str(" \n");
        for row in &self.groups_table {
            let _ = writeln!(text, "{row}");
        }
        text.push_str(" \n");
        let _ = writeln!(text, " {GROUP_COUNT_LABEL}   {}", self.group_count);
        let _ = writeln!(
            text,
            " {MERGED_LEVEL_LABEL}   {}%   of   {} b/sr/atom",
            self.gradient.literal, self.average_level_merged_dcs.literal
        );
        text.push_str(" \n");
        if self.is_warning() {
            for line in &self.error_lines {
                let _ = writeln!(text, "{line}");
            }
        } else {
            let _ = writeln!(text, "{}", self.result);
            text.push_str(" \n");
        }
        let _ = writeln!(
            text,
            " {TWEAK_FACTOR_MARKER}:   {}",
            self.suggested_tweak_factor.literal
        );
        text
    }

    /// Writes the report back to its own path, or beside it as
    /// `<stem>_out.gud`, and returns the written path.
    pub fn write_out(&self, overwrite: bool) -> GudrunResult<PathBuf> {
        let target = if overwrite {
            self.path.clone()
        } else {
            let stem = self
                .path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default();
            self.path
                .with_file_name(format!("{stem}_out.{RESULT_EXTENSION}"))
        };
        fs::write(&target, self.to_text()).map_err(|source| GudrunError::io(&target, source))?;
        Ok(target)
    }
}

/// Signed percentage carried by a result or warning block.
///
/// `BELOW` negates the first percentage, `ABOVE` keeps it; otherwise the raw
/// percentage is read as a level relative to 100.
pub fn percentage_from_block(block: &str) -> Option<f64> {
    let first = first_percentage(block)?;
    if block.contains("BELOW") {
        Some(-first)
    } else if block.contains("ABOVE") {
        Some(first)
    } else {
        Some(first - 100.0)
    }
}

fn first_percentage(block: &str) -> Option<f64> {
    let tokens = block.split_whitespace().collect::<Vec<_>>();
    tokens.iter().enumerate().find_map(|(index, token)| {
        if let Some(number) = token.strip_suffix('%') {
            return number.parse::<f64>().ok();
        }
        if tokens.get(index + 1) == Some(&"%") {
            return token.parse::<f64>().ok();
        }
        None
    })
}
