pub mod errors;

pub use errors::{ErrorCategory, GudrunError, GudrunResult, Section, TokenError};

use serde::Serialize;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum InstrumentName {
    Sandals,
    Gem,
    #[default]
    Nimrod,
    D4c,
    Polaris,
    Hipd,
    Osiris,
}

impl InstrumentName {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sandals => "SANDALS",
            Self::Gem => "GEM",
            Self::Nimrod => "NIMROD",
            Self::D4c => "D4C",
            Self::Polaris => "POLARIS",
            Self::Hipd => "HIPD",
            Self::Osiris => "OSIRIS",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "SANDALS" => Some(Self::Sandals),
            "GEM" => Some(Self::Gem),
            "NIMROD" => Some(Self::Nimrod),
            "D4C" => Some(Self::D4c),
            "POLARIS" => Some(Self::Polaris),
            "HIPD" => Some(Self::Hipd),
            "OSIRIS" => Some(Self::Osiris),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum DataFileType {
    #[default]
    Raw,
    Sav,
    Txt,
    Msrd,
    Mint,
    Nxs,
}

impl DataFileType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Sav => "sav",
            Self::Txt => "txt",
            Self::Msrd => "msrd",
            Self::Mint => "mint",
            Self::Nxs => "nxs",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "raw" => Some(Self::Raw),
            "sav" => Some(Self::Sav),
            "txt" => Some(Self::Txt),
            "msrd" => Some(Self::Msrd),
            "mint" => Some(Self::Mint),
            "nxs" => Some(Self::Nxs),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum Geometry {
    #[default]
    FlatPlate,
    Cylindrical,
    SameAsBeam,
}

impl Geometry {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FlatPlate => "FLATPLATE",
            Self::Cylindrical => "CYLINDRICAL",
            Self::SameAsBeam => "SameAsBeam",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "FLATPLATE" => Some(Self::FlatPlate),
            "CYLINDRICAL" => Some(Self::Cylindrical),
            "SameAsBeam" => Some(Self::SameAsBeam),
            _ => None,
        }
    }

    /// Whether this geometry lays out as a flat plate once `SameAsBeam` is
    /// resolved against the beam geometry.
    pub fn is_flat_plate(self, beam_geometry: Geometry) -> bool {
        match self {
            Self::FlatPlate => true,
            Self::Cylindrical => false,
            Self::SameAsBeam => beam_geometry == Self::FlatPlate,
        }
    }
}

impl Display for Geometry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum CrossSectionSource {
    #[default]
    Tables,
    Transmission,
    File,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum UnitsOfDensity {
    #[default]
    Atomic,
    Chemical,
}

/// Density magnitude with the unit carried by the sign of the raw token.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Density {
    pub magnitude: f64,
    pub units: UnitsOfDensity,
}

impl Density {
    pub const fn new(magnitude: f64, units: UnitsOfDensity) -> Self {
        Self { magnitude, units }
    }

    pub fn from_signed(value: f64) -> Self {
        let units = if value.is_sign_negative() {
            UnitsOfDensity::Atomic
        } else {
            UnitsOfDensity::Chemical
        };
        Self {
            magnitude: value.abs(),
            units,
        }
    }

    pub fn signed(&self) -> f64 {
        match self.units {
            UnitsOfDensity::Atomic => -self.magnitude,
            UnitsOfDensity::Chemical => self.magnitude,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum MergeWeights {
    None,
    Detector,
    #[default]
    Channel,
}

impl MergeWeights {
    pub const fn value(self) -> i64 {
        match self {
            Self::None => 0,
            Self::Detector => 1,
            Self::Channel => 2,
        }
    }

    pub const fn from_value(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::Detector),
            2 => Some(Self::Channel),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum Scales {
    #[default]
    Q,
    DSpacing,
    Wavelength,
    Energy,
    Tof,
}

impl Scales {
    pub const fn value(self) -> i64 {
        match self {
            Self::Q => 1,
            Self::DSpacing => 2,
            Self::Wavelength => 3,
            Self::Energy => 4,
            Self::Tof => 5,
        }
    }

    pub const fn from_value(value: i64) -> Option<Self> {
        match value {
            1 => Some(Self::Q),
            2 => Some(Self::DSpacing),
            3 => Some(Self::Wavelength),
            4 => Some(Self::Energy),
            5 => Some(Self::Tof),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum NormalisationType {
    #[default]
    Nothing,
    AverageSquared,
    AverageOfSquares,
}

impl NormalisationType {
    pub const fn value(self) -> i64 {
        match self {
            Self::Nothing => 0,
            Self::AverageSquared => 1,
            Self::AverageOfSquares => 2,
        }
    }

    pub const fn from_value(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::Nothing),
            1 => Some(Self::AverageSquared),
            2 => Some(Self::AverageOfSquares),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum OutputUnits {
    #[default]
    BarnsAtomSr,
    InvCmSr,
}

impl OutputUnits {
    pub const fn value(self) -> i64 {
        match self {
            Self::BarnsAtomSr => 0,
            Self::InvCmSr => 1,
        }
    }

    pub const fn from_value(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::BarnsAtomSr),
            1 => Some(Self::InvCmSr),
            _ => None,
        }
    }
}
