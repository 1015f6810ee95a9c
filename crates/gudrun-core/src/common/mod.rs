pub mod constants;
pub mod isotopes;
pub mod settings;

pub use isotopes::{BuiltinIsotopes, Isotope, IsotopeReference};
pub use settings::{RunSettings, load_run_settings};
