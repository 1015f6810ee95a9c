//! Repeated engine invocations that feed each pass's results back into the
//! configuration.

mod batch;
mod controller;
mod optimizer;

pub use batch::{BatchOutcome, BatchProcessor};
pub use controller::{IterationController, IterationState};
pub use optimizer::{CompositionOptimizer, OptimisationOutcome, OptimisationTarget};

use serde::Serialize;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RadiusKind {
    Inner,
    Outer,
}

/// Attribute perturbed between passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum IterationMode {
    #[default]
    TweakFactor,
    Density,
    Thickness,
    Radius(RadiusKind),
    InelasticitySubtraction,
}

impl IterationMode {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "tweak-factor" => Some(Self::TweakFactor),
            "density" => Some(Self::Density),
            "thickness" => Some(Self::Thickness),
            "inner-radius" => Some(Self::Radius(RadiusKind::Inner)),
            "outer-radius" => Some(Self::Radius(RadiusKind::Outer)),
            "inelasticity" => Some(Self::InelasticitySubtraction),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TweakFactor => "tweak-factor",
            Self::Density => "density",
            Self::Thickness => "thickness",
            Self::Radius(RadiusKind::Inner) => "inner-radius",
            Self::Radius(RadiusKind::Outer) => "outer-radius",
            Self::InelasticitySubtraction => "inelasticity",
        }
    }

    /// Engine passes making up one iteration.
    pub const fn passes_per_iteration(self) -> usize {
        match self {
            Self::InelasticitySubtraction => 2,
            _ => 1,
        }
    }
}

impl Display for IterationMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::{IterationMode, RadiusKind};

    #[test]
    fn modes_round_trip_through_names() {
        for mode in [
            IterationMode::TweakFactor,
            IterationMode::Density,
            IterationMode::Thickness,
            IterationMode::Radius(RadiusKind::Inner),
            IterationMode::Radius(RadiusKind::Outer),
            IterationMode::InelasticitySubtraction,
        ] {
            assert_eq!(IterationMode::from_name(mode.as_str()), Some(mode));
        }
        assert_eq!(IterationMode::from_name("wavelength"), None);
    }
}
