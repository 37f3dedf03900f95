//! Keyword registry
//!
//! Maps script words to canonical tokens. The table is a compile-time
//! perfect hash, so a duplicated key is a build error rather than a silent
//! overwrite. [`KeywordRegistry`] wraps it together with one canonical
//! [`Token`] per kind; the process-wide instance is built once on first use
//! and is immutable afterwards.

use ahash::AHashMap;
use phf::phf_map;
use std::sync::OnceLock;

use crate::token::{Token, TokenKind};

/// Lower-case keyword to token kind, aliases included
static KEYWORDS: phf::Map<&'static str, TokenKind> = phf_map! {
    // Atom-expression commands
    "select" => TokenKind::SELECT,
    "hide" => TokenKind::HIDE,
    "display" => TokenKind::DISPLAY,
    "restrict" => TokenKind::RESTRICT,
    "delete" => TokenKind::DELETE,
    "subset" => TokenKind::SUBSET,
    "define" => TokenKind::DEFINE,

    // Math-expression commands
    "print" => TokenKind::PRINT,
    "var" => TokenKind::VAR,
    "set" => TokenKind::SET,
    "delay" => TokenKind::DELAY,

    // Implicit-string commands
    "echo" => TokenKind::ECHO,
    "message" => TokenKind::MESSAGE,

    // Flow
    "if" => TokenKind::IF,
    "elseif" => TokenKind::ELSEIF,
    "else" => TokenKind::ELSE,
    "endif" => TokenKind::ENDIF,
    "while" => TokenKind::WHILE,
    "for" => TokenKind::FOR,
    "break" => TokenKind::BREAK,
    "continue" => TokenKind::CONTINUE,
    "function" => TokenKind::FUNCTION,
    "return" => TokenKind::RETURN,
    "end" => TokenKind::END,

    // Other commands
    "zap" => TokenKind::ZAP,
    "refresh" => TokenKind::REFRESH,
    "exit" => TokenKind::EXIT,
    "quit" => TokenKind::EXIT,
    "invertselection" => TokenKind::INVERT_SELECTION,

    // Logical operators
    "and" => TokenKind::AND,
    "or" => TokenKind::OR,
    "xor" => TokenKind::XOR,
    "tog" => TokenKind::TOGGLE,
    "toggle" => TokenKind::TOGGLE,
    "not" => TokenKind::NOT,

    // Boolean literals
    "true" => TokenKind::TRUE,
    "on" => TokenKind::TRUE,
    "yes" => TokenKind::TRUE,
    "false" => TokenKind::FALSE,
    "off" => TokenKind::FALSE,
    "no" => TokenKind::FALSE,

    // Predefined sets
    "all" => TokenKind::ALL,
    "none" => TokenKind::NONE,
    "selected" => TokenKind::SELECTED,
    "hidden" => TokenKind::HIDDEN,
    "displayed" => TokenKind::DISPLAYED,
    "visible" => TokenKind::DISPLAYED,
    "hydrogen" => TokenKind::HYDROGEN,
    "hydrogens" => TokenKind::HYDROGEN,
    "protein" => TokenKind::PROTEIN,
    "amino" => TokenKind::PROTEIN,
    "nucleic" => TokenKind::NUCLEIC,
    "dna" => TokenKind::DNA,
    "rna" => TokenKind::RNA,
    "solvent" => TokenKind::SOLVENT,
    "water" => TokenKind::WATER,
    "waters" => TokenKind::WATER,
    "ions" => TokenKind::IONS,
    "ion" => TokenKind::IONS,
    "hetero" => TokenKind::HETERO,
    "ligand" => TokenKind::LIGAND,
    "ligands" => TokenKind::LIGAND,
    "backbone" => TokenKind::BACKBONE,
    "sidechain" => TokenKind::SIDECHAIN,
    "sidechains" => TokenKind::SIDECHAIN,
    "helix" => TokenKind::HELIX,
    "helices" => TokenKind::HELIX,
    "sheet" => TokenKind::SHEET,
    "sheets" => TokenKind::SHEET,
    "bonded" => TokenKind::BONDED,

    // Atom properties
    "atomno" => TokenKind::ATOMNO,
    "atomindex" => TokenKind::ATOM_INDEX,
    "elemno" => TokenKind::ELEMNO,
    "resno" => TokenKind::RESNO,
    "model" => TokenKind::MODEL,
    "formalcharge" => TokenKind::FORMAL_CHARGE,
    "charge" => TokenKind::FORMAL_CHARGE,
    "molecule" => TokenKind::MOLECULE,
    "site" => TokenKind::SITE,
    "bondcount" => TokenKind::BOND_COUNT,
    "x" => TokenKind::X,
    "y" => TokenKind::Y,
    "z" => TokenKind::Z,
    "temperature" => TokenKind::TEMPERATURE,
    "bfactor" => TokenKind::TEMPERATURE,
    "occupancy" => TokenKind::OCCUPANCY,
    "partialcharge" => TokenKind::PARTIAL_CHARGE,
    "radius" => TokenKind::RADIUS,
    "element" => TokenKind::ELEMENT,
    "atomname" => TokenKind::ATOM_NAME,
    "name" => TokenKind::ATOM_NAME,
    "group" => TokenKind::GROUP,
    "resname" => TokenKind::GROUP,
    "chain" => TokenKind::CHAIN,
    "altloc" => TokenKind::ALTLOC,
    "insertion" => TokenKind::INSERTION,
    "structure" => TokenKind::STRUCTURE,
    "cell" => TokenKind::CELL,

    // Functions
    "within" => TokenKind::WITHIN,
    "connected" => TokenKind::CONNECTED,
    "substructure" => TokenKind::SUBSTRUCTURE,
    "sprintf" => TokenKind::SPRINTF,
    "format" => TokenKind::SPRINTF,
    "abs" => TokenKind::ABS,
    "sqrt" => TokenKind::SQRT,
    "sin" => TokenKind::SIN,
    "cos" => TokenKind::COS,
    "point" => TokenKind::POINT,
    "plane" => TokenKind::PLANE,
    "distance" => TokenKind::DISTANCE,
};

/// Words valid after a `.` property selector
static PROPERTY_SELECTORS: phf::Map<&'static str, TokenKind> = phf_map! {
    "size" => TokenKind::SIZE,
    "length" => TokenKind::LENGTH,
    "type" => TokenKind::TYPE,
    "x" => TokenKind::PROP_X,
    "y" => TokenKind::PROP_Y,
    "z" => TokenKind::PROP_Z,
    "xyz" => TokenKind::XYZ,
    "lines" => TokenKind::LINES,
    "min" => TokenKind::MIN,
    "max" => TokenKind::MAX,
};

static GLOBAL: OnceLock<KeywordRegistry> = OnceLock::new();

/// Immutable keyword table with one canonical token per kind
#[derive(Debug)]
pub struct KeywordRegistry {
    canonical: AHashMap<TokenKind, Token>,
}

impl KeywordRegistry {
    fn build() -> Self {
        let mut canonical = AHashMap::with_capacity(KEYWORDS.len());
        for kind in KEYWORDS.values().chain(PROPERTY_SELECTORS.values()) {
            canonical.entry(*kind).or_insert_with(|| Token::keyword(*kind));
        }
        log::debug!("keyword registry built with {} keywords", KEYWORDS.len());
        KeywordRegistry { canonical }
    }

    /// The process-wide registry, built on first use
    pub fn global() -> &'static KeywordRegistry {
        GLOBAL.get_or_init(KeywordRegistry::build)
    }

    /// Case-insensitive lookup; aliases give the same canonical token
    pub fn lookup(&self, name: &str) -> Option<&Token> {
        let kind = match KEYWORDS.get(name) {
            Some(kind) => *kind,
            None => *KEYWORDS.get(name.to_lowercase().as_str())?,
        };
        self.canonical.get(&kind)
    }

    pub fn lookup_kind(&self, name: &str) -> Option<TokenKind> {
        self.lookup(name).map(|t| t.kind)
    }

    /// Property applied with `.`, e.g. `.size`
    pub fn property_selector(&self, name: &str) -> Option<TokenKind> {
        PROPERTY_SELECTORS
            .get(name.to_lowercase().as_str())
            .copied()
    }

    pub fn is_keyword(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    pub fn len(&self) -> usize {
        KEYWORDS.len()
    }

    pub fn is_empty(&self) -> bool {
        KEYWORDS.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let registry = KeywordRegistry::global();
        assert_eq!(registry.lookup_kind("select"), Some(TokenKind::SELECT));
        assert_eq!(registry.lookup_kind("SELECT"), Some(TokenKind::SELECT));
        assert_eq!(registry.lookup_kind("AtomName"), Some(TokenKind::ATOM_NAME));
        assert_eq!(registry.lookup_kind("frobnicate"), None);
    }

    #[test]
    fn test_aliases_share_canonical_token() {
        let registry = KeywordRegistry::global();
        let a = registry.lookup("hydrogen").unwrap();
        let b = registry.lookup("Hydrogens").unwrap();
        assert!(std::ptr::eq(a, b));
        assert_eq!(registry.lookup_kind("off"), Some(TokenKind::FALSE));
        assert_eq!(registry.lookup_kind("quit"), Some(TokenKind::EXIT));
    }

    #[test]
    fn test_keys_are_lower_case() {
        for key in KEYWORDS.keys() {
            assert_eq!(*key, key.to_lowercase());
        }
    }

    #[test]
    fn test_property_selectors() {
        let registry = KeywordRegistry::global();
        assert_eq!(registry.property_selector("SIZE"), Some(TokenKind::SIZE));
        assert_eq!(registry.property_selector("x"), Some(TokenKind::PROP_X));
        assert_eq!(registry.property_selector("atomno"), None);
    }
}
