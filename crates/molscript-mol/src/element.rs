//! Chemical elements addressed by atomic number
//!
//! Element names double as predefined atom sets in scripts (`carbon`,
//! `oxygen`, ...), so both symbol and name lookups are provided.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// A chemical element, stored as its atomic number (0 = unknown)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Element(pub u8);

/// (symbol, lower-case name, vdW radius)
static ELEMENTS: [(&str, &str, f32); 119] = [
    ("Xx", "unknown", 1.80),
    ("H", "hydrogen", 1.20), ("He", "helium", 1.40), ("Li", "lithium", 1.82),
    ("Be", "beryllium", 1.53), ("B", "boron", 1.92), ("C", "carbon", 1.70),
    ("N", "nitrogen", 1.55), ("O", "oxygen", 1.52), ("F", "fluorine", 1.47),
    ("Ne", "neon", 1.54), ("Na", "sodium", 2.27), ("Mg", "magnesium", 1.73),
    ("Al", "aluminum", 1.84), ("Si", "silicon", 2.10), ("P", "phosphorus", 1.80),
    ("S", "sulfur", 1.80), ("Cl", "chlorine", 1.75), ("Ar", "argon", 1.88),
    ("K", "potassium", 2.75), ("Ca", "calcium", 2.31), ("Sc", "scandium", 2.11),
    ("Ti", "titanium", 2.00), ("V", "vanadium", 2.00), ("Cr", "chromium", 2.00),
    ("Mn", "manganese", 2.00), ("Fe", "iron", 2.00), ("Co", "cobalt", 2.00),
    ("Ni", "nickel", 1.63), ("Cu", "copper", 1.40), ("Zn", "zinc", 1.39),
    ("Ga", "gallium", 1.87), ("Ge", "germanium", 2.11), ("As", "arsenic", 1.85),
    ("Se", "selenium", 1.90), ("Br", "bromine", 1.85), ("Kr", "krypton", 2.02),
    ("Rb", "rubidium", 3.03), ("Sr", "strontium", 2.49), ("Y", "yttrium", 2.00),
    ("Zr", "zirconium", 2.00), ("Nb", "niobium", 2.00), ("Mo", "molybdenum", 2.00),
    ("Tc", "technetium", 2.00), ("Ru", "ruthenium", 2.00), ("Rh", "rhodium", 2.00),
    ("Pd", "palladium", 1.63), ("Ag", "silver", 1.72), ("Cd", "cadmium", 1.58),
    ("In", "indium", 1.93), ("Sn", "tin", 2.17), ("Sb", "antimony", 2.06),
    ("Te", "tellurium", 2.06), ("I", "iodine", 1.98), ("Xe", "xenon", 2.16),
    ("Cs", "cesium", 3.43), ("Ba", "barium", 2.68), ("La", "lanthanum", 2.00),
    ("Ce", "cerium", 2.00), ("Pr", "praseodymium", 2.00), ("Nd", "neodymium", 2.00),
    ("Pm", "promethium", 2.00), ("Sm", "samarium", 2.00), ("Eu", "europium", 2.00),
    ("Gd", "gadolinium", 2.00), ("Tb", "terbium", 2.00), ("Dy", "dysprosium", 2.00),
    ("Ho", "holmium", 2.00), ("Er", "erbium", 2.00), ("Tm", "thulium", 2.00),
    ("Yb", "ytterbium", 2.00), ("Lu", "lutetium", 2.00), ("Hf", "hafnium", 2.00),
    ("Ta", "tantalum", 2.00), ("W", "tungsten", 2.00), ("Re", "rhenium", 2.00),
    ("Os", "osmium", 2.00), ("Ir", "iridium", 2.00), ("Pt", "platinum", 1.72),
    ("Au", "gold", 1.66), ("Hg", "mercury", 1.55), ("Tl", "thallium", 1.96),
    ("Pb", "lead", 2.02), ("Bi", "bismuth", 2.07), ("Po", "polonium", 1.97),
    ("At", "astatine", 2.02), ("Rn", "radon", 2.20), ("Fr", "francium", 3.48),
    ("Ra", "radium", 2.83), ("Ac", "actinium", 2.00), ("Th", "thorium", 2.00),
    ("Pa", "protactinium", 2.00), ("U", "uranium", 1.86), ("Np", "neptunium", 2.00),
    ("Pu", "plutonium", 2.00), ("Am", "americium", 2.00), ("Cm", "curium", 2.00),
    ("Bk", "berkelium", 2.00), ("Cf", "californium", 2.00), ("Es", "einsteinium", 2.00),
    ("Fm", "fermium", 2.00), ("Md", "mendelevium", 2.00), ("No", "nobelium", 2.00),
    ("Lr", "lawrencium", 2.00), ("Rf", "rutherfordium", 2.00), ("Db", "dubnium", 2.00),
    ("Sg", "seaborgium", 2.00), ("Bh", "bohrium", 2.00), ("Hs", "hassium", 2.00),
    ("Mt", "meitnerium", 2.00), ("Ds", "darmstadtium", 2.00), ("Rg", "roentgenium", 2.00),
    ("Cn", "copernicium", 2.00), ("Nh", "nihonium", 2.00), ("Fl", "flerovium", 2.00),
    ("Mc", "moscovium", 2.00), ("Lv", "livermorium", 2.00), ("Ts", "tennessine", 2.00),
    ("Og", "oganesson", 2.00),
];

/// Lower-cased symbols, names and common aliases to atomic number
static LOOKUP: OnceLock<AHashMap<String, u8>> = OnceLock::new();

fn lookup_table() -> &'static AHashMap<String, u8> {
    LOOKUP.get_or_init(|| {
        let mut map = AHashMap::with_capacity(ELEMENTS.len() * 2 + 8);
        for (n, (symbol, name, _)) in ELEMENTS.iter().enumerate().skip(1) {
            map.insert(symbol.to_ascii_lowercase(), n as u8);
            map.insert((*name).to_string(), n as u8);
        }
        // Deuterium and British spellings
        map.insert("d".to_string(), 1);
        map.insert("deuterium".to_string(), 1);
        map.insert("aluminium".to_string(), 13);
        map.insert("sulphur".to_string(), 16);
        map.insert("caesium".to_string(), 55);
        map
    })
}

impl Element {
    pub const UNKNOWN: Element = Element(0);
    pub const HYDROGEN: Element = Element(1);
    pub const CARBON: Element = Element(6);
    pub const NITROGEN: Element = Element(7);
    pub const OXYGEN: Element = Element(8);
    pub const PHOSPHORUS: Element = Element(15);
    pub const SULFUR: Element = Element(16);

    /// Element from atomic number; out-of-range numbers give `None`
    pub fn from_atomic_number(n: u8) -> Option<Self> {
        ((n as usize) < ELEMENTS.len()).then_some(Element(n))
    }

    /// Element from a symbol, case-insensitive (`"CA"` is calcium)
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        let key = symbol.trim().to_ascii_lowercase();
        if key.is_empty() {
            return None;
        }
        ELEMENTS
            .iter()
            .position(|(s, _, _)| s.eq_ignore_ascii_case(&key))
            .filter(|&n| n > 0)
            .map(|n| Element(n as u8))
            .or_else(|| (key == "d").then_some(Element::HYDROGEN))
    }

    /// Element from a full name or symbol, as used by predefined sets
    pub fn from_name(name: &str) -> Option<Self> {
        lookup_table()
            .get(name.trim().to_ascii_lowercase().as_str())
            .map(|&n| Element(n))
    }

    /// Element from a full name only (`carbon`, `sulphur`), not a bare symbol
    pub fn from_full_name(name: &str) -> Option<Self> {
        let key = name.trim().to_ascii_lowercase();
        if key.len() <= 2 {
            return None;
        }
        lookup_table().get(key.as_str()).map(|&n| Element(n))
    }

    #[inline]
    pub const fn atomic_number(&self) -> u8 {
        self.0
    }

    pub fn symbol(&self) -> &'static str {
        ELEMENTS.get(self.0 as usize).map(|e| e.0).unwrap_or("Xx")
    }

    pub fn name(&self) -> &'static str {
        ELEMENTS.get(self.0 as usize).map(|e| e.1).unwrap_or("unknown")
    }

    pub fn vdw_radius(&self) -> f32 {
        ELEMENTS.get(self.0 as usize).map(|e| e.2).unwrap_or(1.80)
    }

    #[inline]
    pub fn is_hydrogen(&self) -> bool {
        self.0 == 1
    }

    /// Alkali, alkaline earth, transition, lanthanide, actinide and post-transition metals
    pub fn is_metal(&self) -> bool {
        let n = self.0;
        matches!(n, 3 | 4 | 11 | 12 | 13 | 19 | 20 | 31 | 37 | 38 | 49 | 50 | 55 | 56)
            || (21..=30).contains(&n)
            || (39..=48).contains(&n)
            || (57..=84).contains(&n)
            || (87..=116).contains(&n)
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_symbol_is_case_insensitive() {
        assert_eq!(Element::from_symbol("C"), Some(Element::CARBON));
        assert_eq!(Element::from_symbol("ca"), Some(Element(20)));
        assert_eq!(Element::from_symbol("CA"), Some(Element(20)));
        assert_eq!(Element::from_symbol("D"), Some(Element::HYDROGEN));
        assert_eq!(Element::from_symbol("Qq"), None);
        assert_eq!(Element::from_symbol(""), None);
    }

    #[test]
    fn test_from_name_accepts_aliases() {
        assert_eq!(Element::from_name("Carbon"), Some(Element::CARBON));
        assert_eq!(Element::from_name("sulphur"), Some(Element::SULFUR));
        assert_eq!(Element::from_full_name("o"), None);
        assert_eq!(Element::from_full_name("oxygen"), Some(Element::OXYGEN));
    }

    #[test]
    fn test_element_data() {
        assert_eq!(Element(26).symbol(), "Fe");
        assert_eq!(Element(26).name(), "iron");
        assert!(Element(26).is_metal());
        assert!(!Element::CARBON.is_metal());
        assert_eq!(Element::from_atomic_number(118).map(|e| e.symbol()), Some("Og"));
        assert_eq!(Element::from_atomic_number(119), None);
        assert_eq!(format!("{}", Element::NITROGEN), "N");
    }
}
