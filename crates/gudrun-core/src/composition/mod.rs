mod formula;

pub use formula::parse_formula;

use crate::common::IsotopeReference;
use crate::domain::{GudrunError, GudrunResult};
use serde::Serialize;
use std::f64::consts::PI;
use std::sync::Arc;

const EXPECTED_DCS_DECIMALS: i32 = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Element {
    pub symbol: String,
    /// 0 selects the natural isotopic mixture.
    pub mass_number: u32,
    pub abundance: f64,
}

impl Element {
    pub fn new(symbol: impl Into<String>, mass_number: u32, abundance: f64) -> Self {
        Self {
            symbol: symbol.into(),
            mass_number,
            abundance,
        }
    }

    pub fn same_isotope(&self, other: &Element) -> bool {
        self.symbol == other.symbol && self.mass_number == other.mass_number
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Component {
    pub name: String,
    pub elements: Vec<Element>,
}

impl Component {
    pub fn new(name: impl Into<String>, elements: Vec<Element>) -> Self {
        Self {
            name: name.into(),
            elements,
        }
    }

    /// Builds a component whose elements come from parsing its own name.
    pub fn from_formula(
        formula: impl Into<String>,
        isotopes: &dyn IsotopeReference,
    ) -> GudrunResult<Self> {
        let name = formula.into();
        let elements = parse_formula(&name, isotopes)?;
        Ok(Self { name, elements })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeightedComponent {
    pub component: Arc<Component>,
    pub ratio: f64,
}

impl WeightedComponent {
    pub fn new(component: Arc<Component>, ratio: f64) -> Self {
        Self { component, ratio }
    }

    pub fn translate(&self) -> Vec<Element> {
        self.component
            .elements
            .iter()
            .map(|element| {
                Element::new(
                    element.symbol.clone(),
                    element.mass_number,
                    element.abundance * self.ratio,
                )
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Composition {
    pub elements: Vec<Element>,
    pub weighted_components: Vec<WeightedComponent>,
}

impl Composition {
    pub fn from_elements(elements: Vec<Element>) -> Self {
        Self {
            elements,
            weighted_components: Vec::new(),
        }
    }

    pub fn from_components(weighted_components: Vec<WeightedComponent>) -> Self {
        let mut composition = Self {
            elements: Vec::new(),
            weighted_components,
        };
        composition.translate();
        composition
    }

    /// Replaces the owned element list with the summed weighted components.
    pub fn translate(&mut self) {
        self.elements = self.shallow_translate();
    }

    pub fn shallow_translate(&self) -> Vec<Element> {
        let mut translated = Vec::new();
        for weighted in &self.weighted_components {
            sum_and_mutate(&weighted.translate(), &mut translated);
        }
        translated
    }

    pub fn component_index(&self, name: &str) -> Option<usize> {
        self.weighted_components
            .iter()
            .position(|weighted| weighted.component.name == name)
    }
}

/// Folds `elements` into `target`, summing abundances of matching isotopes
/// in place and appending unseen ones.
pub fn sum_and_mutate(elements: &[Element], target: &mut Vec<Element>) {
    for element in elements {
        match target
            .iter_mut()
            .find(|existing| existing.same_isotope(element))
        {
            Some(existing) => existing.abundance += element.abundance,
            None => target.push(element.clone()),
        }
    }
}

/// Expected differential cross section level in b/sr/atom.
pub fn expected_dcs_level(
    elements: &[Element],
    isotopes: &dyn IsotopeReference,
) -> GudrunResult<f64> {
    let total_abundance = elements
        .iter()
        .map(|element| element.abundance)
        .sum::<f64>();
    if elements.is_empty() || total_abundance <= 0.0 {
        return Ok(0.0);
    }

    let mut weighted_sum = 0.0;
    for element in elements {
        let cross_section = isotopes
            .total_cross_section(&element.symbol, element.mass_number)
            .ok_or_else(|| GudrunError::Isotope {
                symbol: element.symbol.clone(),
                mass_number: element.mass_number,
                valid: isotopes
                    .isotopes(&element.symbol)
                    .into_iter()
                    .map(|isotope| (isotope.symbol, isotope.mass_number))
                    .collect(),
            })?;
        weighted_sum += cross_section * element.abundance / total_abundance;
    }

    let scale = 10_f64.powi(EXPECTED_DCS_DECIMALS);
    Ok((weighted_sum / (4.0 * PI) * scale).round() / scale)
}

#[cfg(test)]
mod tests {
    use super::{
        Component, Composition, Element, WeightedComponent, expected_dcs_level, sum_and_mutate,
    };
    use crate::common::BuiltinIsotopes;
    use std::sync::Arc;

    fn water() -> Arc<Component> {
        Arc::new(Component::from_formula("H2O", &BuiltinIsotopes).expect("H2O should parse"))
    }

    fn heavy_water() -> Arc<Component> {
        Arc::new(Component::from_formula("D2O", &BuiltinIsotopes).expect("D2O should parse"))
    }

    #[test]
    fn duplicates_collapse_in_first_occurrence_order() {
        let mut target = Vec::new();
        sum_and_mutate(
            &[
                Element::new("O", 0, 1.0),
                Element::new("H", 2, 2.0),
                Element::new("O", 0, 0.5),
                Element::new("H", 0, 1.0),
                Element::new("H", 2, 1.0),
            ],
            &mut target,
        );

        assert_eq!(
            target,
            vec![
                Element::new("O", 0, 1.5),
                Element::new("H", 2, 3.0),
                Element::new("H", 0, 1.0),
            ]
        );
    }

    #[test]
    fn translate_scales_without_touching_component() {
        let component = water();
        let weighted = WeightedComponent::new(component.clone(), 0.25);
        let translated = weighted.translate();
        assert_eq!(
            translated,
            vec![Element::new("H", 0, 0.5), Element::new("O", 0, 0.25)]
        );
        assert_eq!(component.elements[0].abundance, 2.0);
    }

    #[test]
    fn translate_is_idempotent_and_replaces_elements() {
        let mut composition = Composition::from_components(vec![
            WeightedComponent::new(water(), 0.5),
            WeightedComponent::new(heavy_water(), 0.5),
        ]);
        let first = composition.elements.clone();
        composition.translate();
        assert_eq!(composition.elements, first);
        assert_eq!(
            first,
            vec![
                Element::new("H", 0, 1.0),
                Element::new("O", 0, 1.0),
                Element::new("H", 2, 1.0),
            ]
        );
    }

    #[test]
    fn shallow_translate_leaves_elements_untouched() {
        let mut composition = Composition::from_elements(vec![Element::new("V", 0, 1.0)]);
        composition
            .weighted_components
            .push(WeightedComponent::new(water(), 1.0));
        let summed = composition.shallow_translate();
        assert_eq!(summed.len(), 2);
        assert_eq!(composition.elements, vec![Element::new("V", 0, 1.0)]);
    }

    #[test]
    fn expected_dcs_of_water() {
        let level = expected_dcs_level(&water().elements, &BuiltinIsotopes)
            .expect("water cross sections are tabulated");
        let expected = ((2.0 * 82.02 + 4.232) / 3.0) / (4.0 * std::f64::consts::PI);
        assert!((level - expected).abs() < 5e-4, "level {level} vs {expected}");
    }

    #[test]
    fn expected_dcs_is_zero_without_abundance() {
        assert_eq!(expected_dcs_level(&[], &BuiltinIsotopes).unwrap(), 0.0);
        assert_eq!(
            expected_dcs_level(&[Element::new("H", 0, 0.0)], &BuiltinIsotopes).unwrap(),
            0.0
        );
    }

    #[test]
    fn expected_dcs_fails_for_untabulated_isotope() {
        let error = expected_dcs_level(&[Element::new("Xe", 0, 1.0)], &BuiltinIsotopes)
            .expect_err("xenon is not tabulated");
        assert_eq!(error.exit_code(), 2);
    }
}
