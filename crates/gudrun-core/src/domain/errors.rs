use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub type GudrunResult<T> = Result<T, GudrunError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    InputValidationError,
    IoSystemError,
    ComputationError,
    InternalError,
}

impl ErrorCategory {
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::InputValidationError => 2,
            Self::IoSystemError => 3,
            Self::ComputationError => 4,
            Self::InternalError => 5,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InputValidationError => "InputValidationError",
            Self::IoSystemError => "IoSystemError",
            Self::ComputationError => "ComputationError",
            Self::InternalError => "InternalError",
        }
    }
}

/// Top-level block of a configuration document, used to scope parse failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    Instrument,
    Beam,
    Normalisation,
    SampleBackground,
    Sample,
    Container,
    Components,
    Document,
}

impl Section {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Instrument => "Instrument",
            Self::Beam => "Beam",
            Self::Normalisation => "Normalisation",
            Self::SampleBackground => "Sample Background",
            Self::Sample => "Sample",
            Self::Container => "Container",
            Self::Components => "Components",
            Self::Document => "Document",
        }
    }
}

impl Display for Section {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

/// Positional failure inside a line-oriented text file.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line}: {message}")]
pub struct TokenError {
    pub line: usize,
    pub message: String,
}

impl TokenError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GudrunError {
    #[error("failed to parse {section}: {source}")]
    Parse {
        section: Section,
        #[source]
        source: TokenError,
    },
    #[error("failed to parse result file '{}': {source}", path.display())]
    Report {
        path: PathBuf,
        #[source]
        source: TokenError,
    },
    #[error("{message}: '{}'", path.display())]
    Path { path: PathBuf, message: String },
    #[error("'{formula}' is not a valid chemical formula")]
    Formula { formula: String },
    #[error(
        "unknown isotope {symbol}[{mass_number}]; valid isotopes are: {}",
        render_isotopes(valid)
    )]
    Isotope {
        symbol: String,
        mass_number: u32,
        valid: Vec<(String, u32)>,
    },
    #[error("engine {message}\nstdout:\n{stdout}\nstderr:\n{stderr}")]
    Engine {
        message: String,
        stdout: String,
        stderr: String,
    },
    #[error("composition evaluation aborted: {source}")]
    EvaluationAbort {
        #[source]
        source: Box<GudrunError>,
    },
    #[error("I/O failure at '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(
        "output tree was not promoted, artifacts kept in '{}': {source}",
        staging.display()
    )]
    Promotion {
        staging: PathBuf,
        #[source]
        source: Box<GudrunError>,
    },
    #[error("failed to read run settings '{}': {message}", path.display())]
    Settings { path: PathBuf, message: String },
    #[error("{0}")]
    Selection(String),
    #[error("run was cancelled")]
    Cancelled,
    #[error("{0}")]
    InvalidState(String),
}

fn render_isotopes(valid: &[(String, u32)]) -> String {
    valid
        .iter()
        .map(|(name, mass_number)| format!("{name} ({mass_number})"))
        .collect::<Vec<_>>()
        .join(", ")
}

impl GudrunError {
    pub fn parse(section: Section, source: TokenError) -> Self {
        Self::Parse { section, source }
    }

    pub fn path(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Path {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn engine(message: impl Into<String>, stdout: &str, stderr: &str) -> Self {
        Self::Engine {
            message: message.into(),
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Parse { .. }
            | Self::Report { .. }
            | Self::Path { .. }
            | Self::Formula { .. }
            | Self::Isotope { .. }
            | Self::Settings { .. }
            | Self::Selection(_) => ErrorCategory::InputValidationError,
            Self::Io { .. } | Self::Promotion { .. } => ErrorCategory::IoSystemError,
            Self::Engine { .. } | Self::EvaluationAbort { .. } | Self::Cancelled => {
                ErrorCategory::ComputationError
            }
            Self::InvalidState(_) => ErrorCategory::InternalError,
        }
    }

    pub const fn placeholder(&self) -> &'static str {
        match self {
            Self::Parse { .. } => "INPUT.CONFIG_PARSE",
            Self::Report { .. } => "INPUT.REPORT_PARSE",
            Self::Path { .. } => "INPUT.PATH",
            Self::Formula { .. } => "INPUT.FORMULA",
            Self::Isotope { .. } => "INPUT.ISOTOPE",
            Self::Settings { .. } => "INPUT.SETTINGS",
            Self::Selection(_) => "INPUT.SELECTION",
            Self::Io { .. } => "IO.FILESYSTEM",
            Self::Promotion { .. } => "IO.PROMOTION",
            Self::Engine { .. } => "RUN.ENGINE",
            Self::EvaluationAbort { .. } => "RUN.EVALUATION_ABORT",
            Self::Cancelled => "RUN.CANCELLED",
            Self::InvalidState(_) => "SYS.STATE",
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.category().exit_code()
    }

    pub fn diagnostic_line(&self) -> String {
        format!("ERROR: [{}] {}", self.placeholder(), self)
    }

    /// Last captured engine output, looking through evaluation aborts.
    pub fn engine_output(&self) -> Option<(&str, &str)> {
        match self {
            Self::Engine { stdout, stderr, .. } => Some((stdout.as_str(), stderr.as_str())),
            Self::EvaluationAbort { source } => source.engine_output(),
            _ => None,
        }
    }
}
