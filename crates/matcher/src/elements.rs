//! Element symbols and molecular-formula parsing used by query validation.

use std::collections::BTreeMap;

const ELEMENT_SYMBOLS: [&str; 118] = [
    "H", "He", "Li", "Be", "B", "C", "N", "O", "F", "Ne", "Na", "Mg", "Al", "Si", "P", "S", "Cl",
    "Ar", "K", "Ca", "Sc", "Ti", "V", "Cr", "Mn", "Fe", "Co", "Ni", "Cu", "Zn", "Ga", "Ge", "As",
    "Se", "Br", "Kr", "Rb", "Sr", "Y", "Zr", "Nb", "Mo", "Tc", "Ru", "Rh", "Pd", "Ag", "Cd", "In",
    "Sn", "Sb", "Te", "I", "Xe", "Cs", "Ba", "La", "Ce", "Pr", "Nd", "Pm", "Sm", "Eu", "Gd", "Tb",
    "Dy", "Ho", "Er", "Tm", "Yb", "Lu", "Hf", "Ta", "W", "Re", "Os", "Ir", "Pt", "Au", "Hg", "Tl",
    "Pb", "Bi", "Po", "At", "Rn", "Fr", "Ra", "Ac", "Th", "Pa", "U", "Np", "Pu", "Am", "Cm", "Bk",
    "Cf", "Es", "Fm", "Md", "No", "Lr", "Rf", "Db", "Sg", "Bh", "Hs", "Mt", "Ds", "Rg", "Cn", "Nh",
    "Fl", "Mc", "Lv", "Ts", "Og",
];

/// Case-sensitive check against the periodic table. Deuterium (`D`) is
/// accepted since component definitions use it.
pub fn is_element_symbol(symbol: &str) -> bool {
    symbol == "D" || ELEMENT_SYMBOLS.contains(&symbol)
}

/// Parse a formula such as `C8H9NO2` or `C8 H9 N O2` into element counts.
///
/// Counts default to 1; repeated elements are summed.
pub fn parse_formula(formula: &str) -> Result<BTreeMap<String, u32>, String> {
    let mut counts = BTreeMap::new();
    let mut chars = formula.trim().chars().peekable();
    if chars.peek().is_none() {
        return Err("formula must not be empty".to_string());
    }

    while let Some(c) = chars.next() {
        if c.is_whitespace() {
            continue;
        }
        if !c.is_ascii_uppercase() {
            return Err(format!("unexpected character '{c}' in formula"));
        }
        let mut symbol = c.to_string();
        while let Some(&next) = chars.peek() {
            if next.is_ascii_lowercase() {
                symbol.push(next);
                chars.next();
            } else {
                break;
            }
        }
        if !is_element_symbol(&symbol) {
            return Err(format!("unknown element symbol '{symbol}'"));
        }

        let mut digits = String::new();
        while let Some(&next) = chars.peek() {
            if next.is_ascii_digit() {
                digits.push(next);
                chars.next();
            } else {
                break;
            }
        }
        let count = if digits.is_empty() {
            1
        } else {
            digits
                .parse::<u32>()
                .map_err(|_| format!("element count '{digits}' is out of range"))?
        };
        *counts.entry(symbol).or_insert(0u32) += count;
    }

    Ok(counts)
}
