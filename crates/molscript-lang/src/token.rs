//! Token model
//!
//! A [`TokenKind`] is one packed `u64`: a 12-bit ordinal, a 4-bit operator
//! precedence, a 4-bit maximum operand count and the [`TokenFlags`]
//! category bits. Every attribute question the compiler asks ("is this a
//! command", "does it take an atom expression", "how tightly does it bind")
//! is answered by masking, never by a table lookup.

use bitflags::bitflags;
use lin_alg::f32::Vec3;
use molscript_mol::AtomSet;
use std::fmt;

bitflags! {
    /// Category bits carried in the upper part of every token kind
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TokenFlags: u64 {
        /// Literal or identifier
        const VALUE = 1 << 0;
        /// May appear inside a compiled expression
        const EXPRESSION = 1 << 1;
        const COMMAND = 1 << 2;
        /// Command whose argument is an atom expression
        const ATOM_EXPRESSION_COMMAND = (1 << 3) | Self::COMMAND.bits();
        /// Command whose argument is the raw rest of the line
        const IMPLICIT_STRING_COMMAND = (1 << 4) | Self::COMMAND.bits();
        /// Command whose argument is a math expression
        const MATH_EXPRESSION_COMMAND = (1 << 5) | Self::COMMAND.bits();
        /// Command that moves the program counter
        const FLOW_COMMAND = (1 << 6) | Self::COMMAND.bits();
        const COMPARATOR = (1 << 7) | Self::EXPRESSION.bits();
        const LOGICAL = (1 << 8) | Self::EXPRESSION.bits();
        const PREDEFINED_SET = (1 << 9) | Self::EXPRESSION.bits();
        const ATOM_PROPERTY = (1 << 10) | Self::EXPRESSION.bits();
        const STRING_PROPERTY = (1 << 11) | Self::ATOM_PROPERTY.bits();
        const INT_PROPERTY = (1 << 12) | Self::ATOM_PROPERTY.bits();
        const FLOAT_PROPERTY = (1 << 13) | Self::ATOM_PROPERTY.bits();
        const MATH_OPERATOR = (1 << 14) | Self::EXPRESSION.bits();
        const MATH_FUNCTION = (1 << 15) | Self::EXPRESSION.bits();
        const MATH_PROPERTY = (1 << 16) | Self::EXPRESSION.bits();
        /// Prefix operator taking a single operand
        const UNARY = 1 << 17;
        /// Atom-set filter produced by a residue specification
        const RESIDUE_SPEC = (1 << 18) | Self::EXPRESSION.bits();
        /// Command that only parses when the math expression ends the statement
        const NO_ARGUMENT = 1 << 19;
    }
}

const ID_MASK: u64 = 0xFFF;
const PRECEDENCE_SHIFT: u64 = 12;
const ARITY_SHIFT: u64 = 16;
const FLAG_SHIFT: u64 = 24;

/// Packed token kind
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenKind(u64);

impl TokenKind {
    pub const fn pack(id: u16, precedence: u8, arity: u8, flags: TokenFlags) -> Self {
        TokenKind(
            (id as u64 & ID_MASK)
                | ((precedence as u64 & 0xF) << PRECEDENCE_SHIFT)
                | ((arity as u64 & 0xF) << ARITY_SHIFT)
                | (flags.bits() << FLAG_SHIFT),
        )
    }

    #[inline]
    pub const fn bits(&self) -> u64 {
        self.0
    }

    /// Ordinal distinguishing kinds that share flags
    #[inline]
    pub const fn id(&self) -> u16 {
        (self.0 & ID_MASK) as u16
    }

    #[inline]
    pub fn flags(&self) -> TokenFlags {
        TokenFlags::from_bits_truncate(self.0 >> FLAG_SHIFT)
    }

    /// `(kind & flag) == flag` on the category bits
    #[inline]
    pub fn has(&self, flag: TokenFlags) -> bool {
        let bits = flag.bits() << FLAG_SHIFT;
        self.0 & bits == bits
    }

    /// Operator binding strength; 0 for non-operators, higher binds tighter
    #[inline]
    pub const fn precedence(&self) -> u8 {
        ((self.0 >> PRECEDENCE_SHIFT) & 0xF) as u8
    }

    /// Maximum operand count for math functions
    #[inline]
    pub const fn arity(&self) -> u8 {
        ((self.0 >> ARITY_SHIFT) & 0xF) as u8
    }

    #[inline]
    pub fn is_command(&self) -> bool {
        self.has(TokenFlags::COMMAND)
    }

    /// Canonical spelling, used in error messages and decompiled output
    pub fn name(&self) -> &'static str {
        CANONICAL_NAMES
            .iter()
            .find(|(kind, _)| kind == self)
            .map(|(_, name)| *name)
            .unwrap_or("?")
    }
}

impl fmt::Debug for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenKind({})", self.name())
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Binding strengths, low to high
pub mod precedence {
    pub const OR: u8 = 1;
    pub const AND: u8 = 2;
    pub const NOT: u8 = 3;
    pub const COMPARATOR: u8 = 4;
    pub const ADDITIVE: u8 = 5;
    pub const MULTIPLICATIVE: u8 = 6;
    pub const UNARY: u8 = 7;
    pub const SELECTOR: u8 = 8;
    pub const GROUPING: u8 = 9;
}

macro_rules! define_tokens {
    ($( $(#[$meta:meta])* $name:ident = ($id:literal, $text:literal, $prec:expr, $arity:literal, $flags:expr); )*) => {
        impl TokenKind {
            $( $(#[$meta])* pub const $name: TokenKind = TokenKind::pack($id, $prec, $arity, $flags); )*
        }

        static CANONICAL_NAMES: &[(TokenKind, &str)] = &[ $( (TokenKind::$name, $text), )* ];
    };
}

use precedence as p;
use TokenFlags as F;

define_tokens! {
    // Values
    IDENTIFIER = (1, "identifier", 0, 0, F::VALUE);
    INTEGER = (2, "integer", 0, 0, F::VALUE);
    DECIMAL = (3, "decimal", 0, 0, F::VALUE);
    STRING = (4, "string", 0, 0, F::VALUE);
    SEQCODE = (5, "seqcode", 0, 0, F::VALUE);
    LIST = (6, "list", 0, 0, F::VALUE);
    POINT3 = (7, "point3", 0, 0, F::VALUE);
    POINT4 = (8, "point4", 0, 0, F::VALUE);
    BITSET = (9, "bitset", 0, 0, F::VALUE);
    TRUE = (10, "true", 0, 0, F::VALUE);
    FALSE = (11, "false", 0, 0, F::VALUE);

    // Expression structure
    /// `int_value` records whether the span is an atom, math or coordinate expression
    EXPRESSION_BEGIN = (20, "expressionBegin", 0, 0, F::EXPRESSION);
    EXPRESSION_END = (21, "expressionEnd", 0, 0, F::EXPRESSION);
    /// `{`, opens a coordinate or a nested expression
    LEFT_BRACE = (22, "{", p::GROUPING, 0, F::EXPRESSION);
    RIGHT_BRACE = (23, "}", p::GROUPING, 0, F::EXPRESSION);
    LEFT_PAREN = (24, "(", p::GROUPING, 0, F::EXPRESSION);
    RIGHT_PAREN = (25, ")", p::GROUPING, 0, F::EXPRESSION);
    LEFT_SQUARE = (26, "[", p::SELECTOR, 0, F::EXPRESSION);
    RIGHT_SQUARE = (27, "]", p::SELECTOR, 0, F::EXPRESSION);
    COMMA = (28, ",", p::OR, 0, F::EXPRESSION);
    COLON = (29, ":", 0, 0, F::EXPRESSION);
    SEMICOLON = (30, ";", 0, 0, F::EXPRESSION);
    PERIOD = (31, ".", p::SELECTOR, 0, F::EXPRESSION);
    AT = (32, "@", 0, 0, F::EXPRESSION);
    CARET = (33, "^", 0, 0, F::EXPRESSION);
    QUESTION = (34, "?", 0, 0, F::EXPRESSION);
    /// `@name` inside an atom expression, resolved at run time
    VARIABLE_REF = (35, "variable", 0, 0, F::EXPRESSION);
    /// Name in an atom expression: a defined set, a set variable or a group name
    DEFINED_SET = (36, "definedSet", 0, 0, F::EXPRESSION);
    /// Element name used as a set; `int_value` is the atomic number
    ELEMENT_SET = (37, "elementSet", 0, 0, F::PREDEFINED_SET);

    // Logical operators
    OR = (40, "or", p::OR, 2, F::LOGICAL);
    XOR = (41, "xor", p::OR, 2, F::LOGICAL);
    TOGGLE = (42, "tog", p::OR, 2, F::LOGICAL);
    AND = (43, "and", p::AND, 2, F::LOGICAL);
    NOT = (44, "not", p::NOT, 1, F::LOGICAL.union(F::UNARY));

    // Comparators
    OP_EQ = (50, "==", p::COMPARATOR, 2, F::COMPARATOR);
    OP_NE = (51, "!=", p::COMPARATOR, 2, F::COMPARATOR);
    OP_LT = (52, "<", p::COMPARATOR, 2, F::COMPARATOR);
    OP_LE = (53, "<=", p::COMPARATOR, 2, F::COMPARATOR);
    OP_GT = (54, ">", p::COMPARATOR, 2, F::COMPARATOR);
    OP_GE = (55, ">=", p::COMPARATOR, 2, F::COMPARATOR);

    // Arithmetic
    PLUS = (60, "+", p::ADDITIVE, 2, F::MATH_OPERATOR);
    MINUS = (61, "-", p::ADDITIVE, 2, F::MATH_OPERATOR);
    TIMES = (62, "*", p::MULTIPLICATIVE, 2, F::MATH_OPERATOR);
    DIVIDE = (63, "/", p::MULTIPLICATIVE, 2, F::MATH_OPERATOR);
    PERCENT = (64, "%", p::MULTIPLICATIVE, 2, F::MATH_OPERATOR);
    UNARY_MINUS = (65, "-", p::UNARY, 1, F::MATH_OPERATOR.union(F::UNARY));
    /// `int_value` 1 for prefix, 0 for postfix; value holds the variable name
    PLUS_PLUS = (66, "++", p::UNARY, 1, F::MATH_OPERATOR.union(F::UNARY));
    MINUS_MINUS = (67, "--", p::UNARY, 1, F::MATH_OPERATOR.union(F::UNARY));
    /// `x[i]` (`int_value` 1) or `x[i:j]` (`int_value` 2)
    INDEX = (68, "[]", p::SELECTOR, 3, F::MATH_OPERATOR);
    /// Builds a list from the top `int_value` operands
    ARRAY = (69, "array", p::GROUPING, 15, F::MATH_OPERATOR);

    // Predefined sets
    ALL = (100, "all", 0, 0, F::PREDEFINED_SET);
    NONE = (101, "none", 0, 0, F::PREDEFINED_SET);
    SELECTED = (102, "selected", 0, 0, F::PREDEFINED_SET);
    HIDDEN = (103, "hidden", 0, 0, F::PREDEFINED_SET);
    DISPLAYED = (104, "displayed", 0, 0, F::PREDEFINED_SET);
    HYDROGEN = (105, "hydrogen", 0, 0, F::PREDEFINED_SET);
    PROTEIN = (106, "protein", 0, 0, F::PREDEFINED_SET);
    NUCLEIC = (107, "nucleic", 0, 0, F::PREDEFINED_SET);
    DNA = (108, "dna", 0, 0, F::PREDEFINED_SET);
    RNA = (109, "rna", 0, 0, F::PREDEFINED_SET);
    SOLVENT = (110, "solvent", 0, 0, F::PREDEFINED_SET);
    WATER = (111, "water", 0, 0, F::PREDEFINED_SET);
    IONS = (112, "ions", 0, 0, F::PREDEFINED_SET);
    HETERO = (113, "hetero", 0, 0, F::PREDEFINED_SET);
    LIGAND = (114, "ligand", 0, 0, F::PREDEFINED_SET);
    BACKBONE = (115, "backbone", 0, 0, F::PREDEFINED_SET);
    SIDECHAIN = (116, "sidechain", 0, 0, F::PREDEFINED_SET);
    HELIX = (117, "helix", 0, 0, F::PREDEFINED_SET);
    SHEET = (118, "sheet", 0, 0, F::PREDEFINED_SET);
    BONDED = (119, "bonded", 0, 0, F::PREDEFINED_SET);

    // Atom properties
    ATOMNO = (200, "atomno", 0, 0, F::INT_PROPERTY);
    ATOM_INDEX = (201, "atomIndex", 0, 0, F::INT_PROPERTY);
    ELEMNO = (202, "elemno", 0, 0, F::INT_PROPERTY);
    RESNO = (203, "resno", 0, 0, F::INT_PROPERTY);
    MODEL = (204, "model", 0, 0, F::INT_PROPERTY);
    FORMAL_CHARGE = (205, "formalCharge", 0, 0, F::INT_PROPERTY);
    MOLECULE = (206, "molecule", 0, 0, F::INT_PROPERTY);
    SITE = (207, "site", 0, 0, F::INT_PROPERTY);
    BOND_COUNT = (208, "bondCount", 0, 0, F::INT_PROPERTY);
    X = (210, "x", 0, 0, F::FLOAT_PROPERTY);
    Y = (211, "y", 0, 0, F::FLOAT_PROPERTY);
    Z = (212, "z", 0, 0, F::FLOAT_PROPERTY);
    TEMPERATURE = (213, "temperature", 0, 0, F::FLOAT_PROPERTY);
    OCCUPANCY = (214, "occupancy", 0, 0, F::FLOAT_PROPERTY);
    PARTIAL_CHARGE = (215, "partialCharge", 0, 0, F::FLOAT_PROPERTY);
    RADIUS = (216, "radius", 0, 0, F::FLOAT_PROPERTY);
    ELEMENT = (220, "element", 0, 0, F::STRING_PROPERTY);
    ATOM_NAME = (221, "atomName", 0, 0, F::STRING_PROPERTY);
    GROUP = (222, "group", 0, 0, F::STRING_PROPERTY);
    CHAIN = (223, "chain", 0, 0, F::STRING_PROPERTY);
    ALTLOC = (224, "altloc", 0, 0, F::STRING_PROPERTY);
    INSERTION = (225, "insertion", 0, 0, F::STRING_PROPERTY);
    STRUCTURE = (226, "structure", 0, 0, F::STRING_PROPERTY);
    /// Unit-cell membership, compared against a cell triple
    CELL = (230, "cell", 0, 0, F::ATOM_PROPERTY);

    // Residue specification filters
    SPEC_RESNAME = (250, "specResname", 0, 0, F::RESIDUE_SPEC);
    SPEC_SEQCODE = (251, "specSeqcode", 0, 0, F::RESIDUE_SPEC);
    SPEC_SEQCODE_RANGE = (252, "specSeqcodeRange", 0, 0, F::RESIDUE_SPEC);
    SPEC_CHAIN = (253, "specChain", 0, 0, F::RESIDUE_SPEC);
    SPEC_ATOM_NAME = (254, "specAtomName", 0, 0, F::RESIDUE_SPEC);
    SPEC_ALTERNATE = (255, "specAlternate", 0, 0, F::RESIDUE_SPEC);
    SPEC_MODEL = (256, "specModel", 0, 0, F::RESIDUE_SPEC);

    // Math functions; arity is the maximum argument count
    WITHIN = (300, "within", p::SELECTOR, 3, F::MATH_FUNCTION);
    CONNECTED = (301, "connected", p::SELECTOR, 4, F::MATH_FUNCTION);
    SUBSTRUCTURE = (302, "substructure", p::SELECTOR, 1, F::MATH_FUNCTION);
    SPRINTF = (303, "sprintf", p::SELECTOR, 15, F::MATH_FUNCTION);
    ABS = (304, "abs", p::SELECTOR, 1, F::MATH_FUNCTION);
    SQRT = (305, "sqrt", p::SELECTOR, 1, F::MATH_FUNCTION);
    SIN = (306, "sin", p::SELECTOR, 1, F::MATH_FUNCTION);
    COS = (307, "cos", p::SELECTOR, 1, F::MATH_FUNCTION);
    POINT = (308, "point", p::SELECTOR, 3, F::MATH_FUNCTION);
    PLANE = (309, "plane", p::SELECTOR, 4, F::MATH_FUNCTION);
    DISTANCE = (310, "distance", p::SELECTOR, 2, F::MATH_FUNCTION);
    /// User-defined function; value holds the name, `int_value` the argument count
    FUNCTION_CALL = (311, "call", p::SELECTOR, 15, F::MATH_FUNCTION);

    // Math properties, applied with `.`
    SIZE = (350, "size", p::SELECTOR, 1, F::MATH_PROPERTY);
    LENGTH = (351, "length", p::SELECTOR, 1, F::MATH_PROPERTY);
    TYPE = (352, "type", p::SELECTOR, 1, F::MATH_PROPERTY);
    PROP_X = (353, "x", p::SELECTOR, 1, F::MATH_PROPERTY);
    PROP_Y = (354, "y", p::SELECTOR, 1, F::MATH_PROPERTY);
    PROP_Z = (355, "z", p::SELECTOR, 1, F::MATH_PROPERTY);
    XYZ = (356, "xyz", p::SELECTOR, 1, F::MATH_PROPERTY);
    LINES = (357, "lines", p::SELECTOR, 1, F::MATH_PROPERTY);
    MIN = (358, "min", p::SELECTOR, 1, F::MATH_PROPERTY);
    MAX = (359, "max", p::SELECTOR, 1, F::MATH_PROPERTY);

    // Atom-expression commands
    SELECT = (400, "select", 0, 0, F::ATOM_EXPRESSION_COMMAND);
    HIDE = (401, "hide", 0, 0, F::ATOM_EXPRESSION_COMMAND);
    DISPLAY = (402, "display", 0, 0, F::ATOM_EXPRESSION_COMMAND);
    RESTRICT = (403, "restrict", 0, 0, F::ATOM_EXPRESSION_COMMAND);
    DELETE = (404, "delete", 0, 0, F::ATOM_EXPRESSION_COMMAND);
    SUBSET = (405, "subset", 0, 0, F::ATOM_EXPRESSION_COMMAND);
    DEFINE = (406, "define", 0, 0, F::ATOM_EXPRESSION_COMMAND);

    // Math-expression commands
    PRINT = (420, "print", 0, 0, F::MATH_EXPRESSION_COMMAND);
    VAR = (421, "var", 0, 0, F::MATH_EXPRESSION_COMMAND);
    SET = (422, "set", 0, 0, F::MATH_EXPRESSION_COMMAND);
    DELAY = (423, "delay", 0, 0, F::MATH_EXPRESSION_COMMAND);
    /// `name = expr`
    ASSIGN = (424, "assign", 0, 0, F::MATH_EXPRESSION_COMMAND);
    /// Bare expression statement such as `f(1)` or `i++`
    EVALUATE = (425, "evaluate", 0, 0, F::MATH_EXPRESSION_COMMAND);

    // Implicit-string commands
    ECHO = (440, "echo", 0, 0, F::IMPLICIT_STRING_COMMAND);
    MESSAGE = (441, "message", 0, 0, F::IMPLICIT_STRING_COMMAND);

    // Flow commands; `int_value` holds the resolved jump target
    IF = (460, "if", 0, 0, F::FLOW_COMMAND);
    ELSEIF = (461, "elseif", 0, 0, F::FLOW_COMMAND);
    ELSE = (462, "else", 0, 0, F::FLOW_COMMAND);
    ENDIF = (463, "endif", 0, 0, F::FLOW_COMMAND);
    WHILE = (464, "while", 0, 0, F::FLOW_COMMAND);
    FOR = (465, "for", 0, 0, F::FLOW_COMMAND);
    BREAK = (466, "break", 0, 0, F::FLOW_COMMAND);
    CONTINUE = (467, "continue", 0, 0, F::FLOW_COMMAND);
    FUNCTION = (468, "function", 0, 0, F::FLOW_COMMAND);
    RETURN = (469, "return", 0, 0, F::FLOW_COMMAND);
    /// `end while`, `end for`, `end function`; value names the block
    END = (470, "end", 0, 0, F::FLOW_COMMAND);

    // Commands without arguments
    ZAP = (480, "zap", 0, 0, F::COMMAND.union(F::NO_ARGUMENT));
    REFRESH = (481, "refresh", 0, 0, F::COMMAND.union(F::NO_ARGUMENT));
    EXIT = (482, "exit", 0, 0, F::COMMAND.union(F::NO_ARGUMENT));
    INVERT_SELECTION = (483, "invertSelection", 0, 0, F::COMMAND.union(F::NO_ARGUMENT));
}

/// Sentinel for an unset `int_value`
pub const INT_UNSET: i32 = i32::MAX;

/// `int_value` of an `EXPRESSION_BEGIN` opening an atom expression
pub const EXPRESSION_ATOM: i32 = 1;
/// `int_value` of an `EXPRESSION_BEGIN` opening a math expression
pub const EXPRESSION_MATH: i32 = 2;

/// Residue number plus insertion code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeqCode {
    pub number: i32,
    /// `None` matches any insertion code
    pub insertion: Option<char>,
}

impl fmt::Display for SeqCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.insertion {
            Some(c) => write!(f, "{}^{}", self.number, c),
            None => write!(f, "{}", self.number),
        }
    }
}

/// Right-hand side of an atom-property comparison
#[derive(Debug, Clone)]
pub enum Operand {
    Integer(i32),
    Decimal(f32),
    Text(String),
    Point3(Vec3),
    /// `@name`, looked up when the expression runs
    Variable(String),
}

/// `property op operand`, compiled into a single postfix token
#[derive(Debug, Clone)]
pub struct Comparison {
    pub property: TokenKind,
    pub operand: Operand,
}

/// What the first argument of `within(...)` selected
#[derive(Debug, Clone, PartialEq)]
pub enum WithinMode {
    /// Distance in Angstrom; `negative` records a leading minus sign
    Distance { distance: f32, negative: bool },
    Key(WithinKey),
}

#[derive(Debug, Clone, PartialEq)]
pub enum WithinKey {
    AtomType,
    AtomName,
    BoundBox,
    Chain,
    Coord,
    Element,
    Group,
    Helix,
    Hkl,
    Model,
    Molecule,
    Plane,
    Site,
    Structure,
    /// String literal first argument: a one-letter residue sequence
    Sequence(String),
    /// Any other bare word, lower-cased
    Other(String),
}

impl WithinKey {
    pub fn from_word(word: &str) -> Self {
        match word.to_ascii_lowercase().as_str() {
            "atomtype" => WithinKey::AtomType,
            "atomname" => WithinKey::AtomName,
            "boundbox" => WithinKey::BoundBox,
            "chain" => WithinKey::Chain,
            "coord" => WithinKey::Coord,
            "element" => WithinKey::Element,
            "group" => WithinKey::Group,
            "helix" => WithinKey::Helix,
            "hkl" => WithinKey::Hkl,
            "model" => WithinKey::Model,
            "molecule" => WithinKey::Molecule,
            "plane" => WithinKey::Plane,
            "site" => WithinKey::Site,
            "structure" => WithinKey::Structure,
            other => WithinKey::Other(other.to_string()),
        }
    }
}

/// Kind of operand `within(...)` consumes from the evaluation stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WithinTarget {
    Atoms,
    Point,
    Plane,
    /// Miller indices, turned into a plane with the model's unit cell
    Hkl,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WithinSpec {
    pub mode: WithinMode,
    /// Explicit `on`/`off` second argument: search all models
    pub all_models: Option<bool>,
    pub target: WithinTarget,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectedSpec {
    pub min: i32,
    pub max: i32,
    pub bond_type: Option<String>,
}

/// Literal payload of a token
#[derive(Debug, Clone, Default)]
pub enum TokenValue {
    #[default]
    None,
    Integer(i32),
    Decimal(f32),
    Text(String),
    Point3(Vec3),
    Point4([f32; 4]),
    Bitset(AtomSet),
    SeqCode(SeqCode),
    SeqRange(SeqCode, SeqCode),
    Comparison(Box<Comparison>),
    Within(Box<WithinSpec>),
    Connected(Box<ConnectedSpec>),
}

/// A compiled token: kind, integer slot and literal payload
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub int_value: i32,
    pub value: TokenValue,
}

impl Token {
    /// Keyword or operator with no payload
    pub const fn keyword(kind: TokenKind) -> Self {
        Token {
            kind,
            int_value: INT_UNSET,
            value: TokenValue::None,
        }
    }

    pub fn new(kind: TokenKind, value: TokenValue) -> Self {
        Token {
            kind,
            int_value: INT_UNSET,
            value,
        }
    }

    pub fn with_int(kind: TokenKind, int_value: i32) -> Self {
        Token {
            kind,
            int_value,
            value: TokenValue::None,
        }
    }

    pub fn integer(n: i32) -> Self {
        Token {
            kind: TokenKind::INTEGER,
            int_value: n,
            value: TokenValue::Integer(n),
        }
    }

    pub fn decimal(x: f32) -> Self {
        Token::new(TokenKind::DECIMAL, TokenValue::Decimal(x))
    }

    pub fn string(s: impl Into<String>) -> Self {
        Token::new(TokenKind::STRING, TokenValue::Text(s.into()))
    }

    pub fn identifier(s: impl Into<String>) -> Self {
        Token::new(TokenKind::IDENTIFIER, TokenValue::Text(s.into()))
    }

    #[inline]
    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }

    pub fn text(&self) -> Option<&str> {
        match &self.value {
            TokenValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric payload of an integer or decimal literal
    pub fn number(&self) -> Option<f32> {
        match self.value {
            TokenValue::Integer(n) => Some(n as f32),
            TokenValue::Decimal(x) => Some(x),
            _ => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            TokenValue::None => f.write_str(self.kind.name()),
            TokenValue::Integer(n) => write!(f, "{}", n),
            TokenValue::Decimal(x) => write!(f, "{}", x),
            TokenValue::Text(s) if self.kind == TokenKind::STRING => write!(f, "\"{}\"", s),
            TokenValue::Text(s) => write!(f, "{}:{}", self.kind.name(), s),
            TokenValue::Point3(v) => write!(f, "{{{} {} {}}}", v.x, v.y, v.z),
            TokenValue::Point4(p) => write!(f, "{{{} {} {} {}}}", p[0], p[1], p[2], p[3]),
            TokenValue::Bitset(bs) => write!(f, "{}", bs),
            TokenValue::SeqCode(sc) => write!(f, "{}:{}", self.kind.name(), sc),
            TokenValue::SeqRange(a, b) => write!(f, "{}:{}-{}", self.kind.name(), a, b),
            TokenValue::Comparison(c) => write!(f, "{}{}", c.property.name(), self.kind.name()),
            TokenValue::Within(_) => f.write_str("within"),
            TokenValue::Connected(_) => f.write_str("connected"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_tests_by_mask() {
        assert!(TokenKind::SELECT.has(TokenFlags::COMMAND));
        assert!(TokenKind::SELECT.has(TokenFlags::ATOM_EXPRESSION_COMMAND));
        assert!(!TokenKind::SELECT.has(TokenFlags::MATH_EXPRESSION_COMMAND));
        assert!(TokenKind::OP_LE.has(TokenFlags::COMPARATOR));
        assert!(TokenKind::OP_LE.has(TokenFlags::EXPRESSION));
        assert!(TokenKind::ATOM_NAME.has(TokenFlags::STRING_PROPERTY));
        assert!(TokenKind::ATOM_NAME.has(TokenFlags::ATOM_PROPERTY));
        assert!(!TokenKind::ATOMNO.has(TokenFlags::STRING_PROPERTY));
        assert!(TokenKind::WHILE.is_command());
    }

    #[test]
    fn test_precedence_order() {
        let order = [
            TokenKind::OR,
            TokenKind::AND,
            TokenKind::NOT,
            TokenKind::OP_EQ,
            TokenKind::PLUS,
            TokenKind::TIMES,
            TokenKind::UNARY_MINUS,
            TokenKind::PERIOD,
            TokenKind::LEFT_PAREN,
        ];
        for pair in order.windows(2) {
            assert!(pair[0].precedence() < pair[1].precedence(), "{} < {}", pair[0], pair[1]);
        }
        assert_eq!(TokenKind::XOR.precedence(), TokenKind::OR.precedence());
        assert_eq!(TokenKind::COMMA.precedence(), TokenKind::OR.precedence());
    }

    #[test]
    fn test_kinds_are_distinct() {
        for (i, (a, _)) in CANONICAL_NAMES.iter().enumerate() {
            for (b, _) in &CANONICAL_NAMES[i + 1..] {
                assert_ne!(a.id(), b.id());
            }
        }
    }

    #[test]
    fn test_arity_and_names() {
        assert_eq!(TokenKind::DISTANCE.arity(), 2);
        assert_eq!(TokenKind::AND.name(), "and");
        assert_eq!(Token::keyword(TokenKind::OR).to_string(), "or");
        assert_eq!(Token::integer(5).to_string(), "5");
    }
}
