//! Neutron isotope reference data.
//!
//! Bound total scattering cross sections (barns) from Sears, Neutron News 3
//! (1992). Mass number 0 denotes the natural isotopic mixture. Only the light
//! elements and common container/vanadium-standard elements are tabulated;
//! hosts needing wider coverage supply their own [`IsotopeReference`].

#[derive(Debug, Clone, PartialEq)]
pub struct Isotope {
    pub symbol: String,
    pub mass_number: u32,
    pub total_cross_section: f64,
}

pub trait IsotopeReference {
    /// Every tracked isotope of `symbol`; empty when the element is untracked.
    fn isotopes(&self, symbol: &str) -> Vec<Isotope>;

    fn total_cross_section(&self, symbol: &str, mass_number: u32) -> Option<f64> {
        self.isotopes(symbol)
            .into_iter()
            .find(|isotope| isotope.mass_number == mass_number)
            .map(|isotope| isotope.total_cross_section)
    }
}

const ISOTOPE_TABLE: [(&str, u32, f64); 49] = [
    ("H", 0, 82.02),
    ("H", 1, 82.03),
    ("H", 2, 7.64),
    ("H", 3, 3.03),
    ("He", 0, 1.34),
    ("Li", 0, 1.37),
    ("Li", 6, 0.97),
    ("Li", 7, 1.4),
    ("B", 0, 5.24),
    ("B", 10, 3.1),
    ("B", 11, 5.77),
    ("C", 0, 5.551),
    ("C", 12, 5.559),
    ("C", 13, 4.84),
    ("N", 0, 11.51),
    ("N", 14, 11.53),
    ("N", 15, 5.21),
    ("O", 0, 4.232),
    ("O", 16, 4.232),
    ("O", 17, 4.2),
    ("O", 18, 4.29),
    ("F", 0, 4.018),
    ("F", 19, 4.018),
    ("Ne", 0, 2.628),
    ("Na", 0, 3.28),
    ("Na", 23, 3.28),
    ("Mg", 0, 3.71),
    ("Al", 0, 1.503),
    ("Al", 27, 1.503),
    ("Si", 0, 2.167),
    ("P", 0, 3.312),
    ("S", 0, 1.026),
    ("Cl", 0, 16.8),
    ("Cl", 35, 21.8),
    ("Cl", 37, 1.19),
    ("Ar", 0, 0.683),
    ("K", 0, 1.96),
    ("Ca", 0, 2.83),
    ("Ti", 0, 4.35),
    ("V", 0, 5.1),
    ("Cr", 0, 3.49),
    ("Mn", 0, 2.15),
    ("Fe", 0, 11.62),
    ("Ni", 0, 18.5),
    ("Ni", 58, 26.1),
    ("Ni", 60, 0.99),
    ("Cu", 0, 8.03),
    ("Zr", 0, 6.46),
    ("Nb", 0, 6.255),
];

#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinIsotopes;

impl IsotopeReference for BuiltinIsotopes {
    fn isotopes(&self, symbol: &str) -> Vec<Isotope> {
        ISOTOPE_TABLE
            .iter()
            .filter(|(candidate, _, _)| *candidate == symbol)
            .map(|(candidate, mass_number, total_cross_section)| Isotope {
                symbol: (*candidate).to_string(),
                mass_number: *mass_number,
                total_cross_section: *total_cross_section,
            })
            .collect()
    }
}
