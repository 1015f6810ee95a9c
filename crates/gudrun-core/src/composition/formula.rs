use super::Element;
use crate::common::IsotopeReference;
use crate::domain::{GudrunError, GudrunResult};

/// Parses compact isotope formulas such as `H[2]2O` or `D2O`.
///
/// Each term is an atomic symbol, an optional bracketed mass number (0, the
/// natural isotope, when absent) and an optional abundance (1 when absent).
/// `D` is rewritten to `H` with mass number 2.
pub fn parse_formula(formula: &str, isotopes: &dyn IsotopeReference) -> GudrunResult<Vec<Element>> {
    let malformed = || GudrunError::Formula {
        formula: formula.to_string(),
    };

    let chars = formula.chars().collect::<Vec<_>>();
    if chars.is_empty() {
        return Err(malformed());
    }

    let mut elements = Vec::new();
    let mut index = 0;
    while index < chars.len() {
        let mut symbol = String::new();
        match chars[index] {
            ch if ch.is_ascii_uppercase() => symbol.push(ch),
            _ => return Err(malformed()),
        }
        index += 1;
        if index < chars.len() && chars[index].is_ascii_lowercase() {
            symbol.push(chars[index]);
            index += 1;
        }

        let mut mass_number = 0;
        if index < chars.len() && chars[index] == '[' {
            let start = index + 1;
            let end = chars[start..]
                .iter()
                .position(|ch| *ch == ']')
                .map(|offset| start + offset)
                .ok_or_else(malformed)?;
            let digits = chars[start..end].iter().collect::<String>();
            if digits.is_empty() || !digits.chars().all(|ch| ch.is_ascii_digit()) {
                return Err(malformed());
            }
            mass_number = digits.parse::<u32>().map_err(|_| malformed())?;
            index = end + 1;
        }

        let start = index;
        while index < chars.len() && (chars[index].is_ascii_digit() || chars[index] == '.') {
            index += 1;
        }
        let abundance = if start == index {
            1.0
        } else {
            chars[start..index]
                .iter()
                .collect::<String>()
                .parse::<f64>()
                .map_err(|_| malformed())?
        };

        if symbol == "D" {
            symbol = "H".to_string();
            mass_number = 2;
        }

        validate_isotope(&symbol, mass_number, isotopes)?;
        elements.push(Element::new(symbol, mass_number, abundance));
    }

    Ok(elements)
}

fn validate_isotope(
    symbol: &str,
    mass_number: u32,
    isotopes: &dyn IsotopeReference,
) -> GudrunResult<()> {
    let known = isotopes.isotopes(symbol);
    if known.is_empty() || known.iter().any(|isotope| isotope.mass_number == mass_number) {
        return Ok(());
    }

    Err(GudrunError::Isotope {
        symbol: symbol.to_string(),
        mass_number,
        valid: known
            .into_iter()
            .map(|isotope| (isotope.symbol, isotope.mass_number))
            .collect(),
    })
}
