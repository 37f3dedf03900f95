//! Runtime values
//!
//! [`Value`] is the tagged union every expression evaluates to. It is a
//! separate type from [`Token`]: the compiler produces tokens, the
//! evaluator produces values, and [`Value::from_token`] is the only bridge.
//!
//! Coercions (`as_boolean`, `as_int`, `as_float`, `as_string`) are total.
//! Arithmetic that can fail returns a [`ValueError`].

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use lin_alg::f32::Vec3;
use molscript_mol::AtomSet;

use crate::error::{ValueError, ValueResult};
use crate::token::{Token, TokenKind, TokenValue};

/// Host-defined value carried through scripts unchanged
pub trait UserValue: fmt::Debug + Send + Sync {
    fn type_name(&self) -> &'static str;

    fn to_script_string(&self) -> String;
}

#[derive(Debug, Clone)]
pub enum Value {
    Boolean(bool),
    Integer(i32),
    Decimal(f32),
    Text(String),
    /// Items are kept as text and re-parsed on access
    List(Vec<String>),
    Point3(Vec3),
    /// Plane `ax + by + cz + d = 0`
    Point4([f32; 4]),
    Bitset {
        atoms: AtomSet,
        /// Endpoint atoms of an associated bond set
        bonds: Option<AtomSet>,
    },
    User(Arc<dyn UserValue>),
}

impl Default for Value {
    fn default() -> Self {
        Value::Text(String::new())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(n)
    }
}

impl From<f32> for Value {
    fn from(x: f32) -> Self {
        Value::Decimal(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<AtomSet> for Value {
    fn from(atoms: AtomSet) -> Self {
        Value::Bitset { atoms, bonds: None }
    }
}

/// Shortest float text; integral values keep one decimal
pub fn format_float(x: f32) -> String {
    if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e9 {
        format!("{:.1}", x)
    } else {
        format!("{}", x)
    }
}

fn plane_distance(p: &[f32; 4]) -> f32 {
    let n = (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt();
    if n == 0.0 {
        f32::NAN
    } else {
        p[3] / n
    }
}

fn parse_point(s: &str) -> Option<Value> {
    let inner = s.strip_prefix('{')?.strip_suffix('}')?;
    let parts: Vec<f32> = inner
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|p| !p.is_empty())
        .map(str::parse)
        .collect::<Result<_, _>>()
        .ok()?;
    match parts.as_slice() {
        [x, y, z] => Some(Value::Point3(Vec3::new(*x, *y, *z))),
        [a, b, c, d] => Some(Value::Point4([*a, *b, *c, *d])),
        _ => None,
    }
}

impl Value {
    /// Literal value of a compiled token
    pub fn from_token(token: &Token) -> Option<Value> {
        Some(match (&token.value, token.kind) {
            (_, TokenKind::TRUE) => Value::Boolean(true),
            (_, TokenKind::FALSE) => Value::Boolean(false),
            (TokenValue::Integer(n), _) => Value::Integer(*n),
            (TokenValue::Decimal(x), _) => Value::Decimal(*x),
            (TokenValue::Text(s), TokenKind::STRING) => Value::Text(s.clone()),
            (TokenValue::Point3(p), _) => Value::Point3(*p),
            (TokenValue::Point4(p), _) => Value::Point4(*p),
            (TokenValue::Bitset(bs), _) => Value::from(bs.clone()),
            _ => return None,
        })
    }

    /// Typed reading of a list item or other stored text
    pub fn parse_item(s: &str) -> Value {
        let t = s.trim();
        if t.eq_ignore_ascii_case("true") {
            return Value::Boolean(true);
        }
        if t.eq_ignore_ascii_case("false") {
            return Value::Boolean(false);
        }
        if let Ok(n) = t.parse::<i32>() {
            return Value::Integer(n);
        }
        if let Ok(x) = t.parse::<f32>() {
            return Value::Decimal(x);
        }
        parse_point(t).unwrap_or_else(|| Value::Text(s.to_string()))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Decimal(_) => "decimal",
            Value::Text(_) => "string",
            Value::List(_) => "array",
            Value::Point3(_) => "point",
            Value::Point4(_) => "point4",
            Value::Bitset { .. } => "bitset",
            Value::User(u) => u.type_name(),
        }
    }

    pub fn as_bitset(&self) -> Option<&AtomSet> {
        match self {
            Value::Bitset { atoms, .. } => Some(atoms),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> bool {
        match self {
            Value::Boolean(b) => *b,
            Value::Integer(n) => *n != 0,
            Value::Decimal(x) => *x != 0.0 && !x.is_nan(),
            Value::Text(s) => {
                let t = s.trim();
                !(t.is_empty() || t == "0" || t.eq_ignore_ascii_case("false"))
            }
            Value::List(items) => !items.is_empty(),
            Value::Point3(_) | Value::Point4(_) => self.as_float().abs() > 1e-4,
            Value::Bitset { atoms, .. } => !atoms.is_empty(),
            Value::User(_) => true,
        }
    }

    pub fn as_int(&self) -> i32 {
        match self {
            Value::Boolean(b) => i32::from(*b),
            Value::Integer(n) => *n,
            Value::Text(s) => {
                let t = s.trim();
                t.parse::<i32>().unwrap_or_else(|_| {
                    let x = Value::Text(t.to_string()).as_float();
                    if x.is_nan() {
                        0
                    } else {
                        x as i32
                    }
                })
            }
            other => {
                let x = other.as_float();
                if x.is_nan() {
                    0
                } else {
                    x as i32
                }
            }
        }
    }

    pub fn as_float(&self) -> f32 {
        match self {
            Value::Boolean(b) => f32::from(u8::from(*b)),
            Value::Integer(n) => *n as f32,
            Value::Decimal(x) => *x,
            Value::Text(s) => {
                let t = s.trim();
                if t.eq_ignore_ascii_case("true") {
                    1.0
                } else if t.eq_ignore_ascii_case("false") {
                    0.0
                } else {
                    t.parse::<f32>().unwrap_or(f32::NAN)
                }
            }
            Value::List(items) => items.len() as f32,
            Value::Point3(p) => p.magnitude(),
            Value::Point4(p) => plane_distance(p),
            Value::Bitset { atoms, .. } => atoms.count() as f32,
            Value::User(_) => f32::NAN,
        }
    }

    pub fn as_string(&self) -> String {
        match self {
            Value::Boolean(b) => b.to_string(),
            Value::Integer(n) => n.to_string(),
            Value::Decimal(x) => format_float(*x),
            Value::Text(s) => s.clone(),
            Value::List(items) => items.join("\n"),
            Value::Point3(p) => format!(
                "{{{} {} {}}}",
                format_float(p.x),
                format_float(p.y),
                format_float(p.z)
            ),
            Value::Point4(p) => format!(
                "{{{} {} {} {}}}",
                format_float(p[0]),
                format_float(p[1]),
                format_float(p[2]),
                format_float(p[3])
            ),
            Value::Bitset { atoms, .. } => atoms.to_escaped(),
            Value::User(u) => u.to_script_string(),
        }
    }

    /// Text form used when the value is stored as a list item
    fn as_item(&self) -> String {
        match self {
            Value::List(items) => items.join(","),
            other => other.as_string(),
        }
    }

    /// List literal built from evaluated items
    pub fn list(items: impl IntoIterator<Item = Value>) -> Value {
        Value::List(items.into_iter().map(|v| v.as_item()).collect())
    }

    /// Comparator semantics: lexicographic when both sides are strings,
    /// numeric otherwise
    pub fn compare(op: TokenKind, a: &Value, b: &Value) -> bool {
        let ordering = match (a, b) {
            (Value::Text(x), Value::Text(y)) => Some(x.cmp(y)),
            (Value::Integer(x), Value::Integer(y)) => Some(x.cmp(y)),
            _ => a.as_float().partial_cmp(&b.as_float()),
        };
        match ordering {
            Some(o) => match op {
                TokenKind::OP_EQ => o == Ordering::Equal,
                TokenKind::OP_NE => o != Ordering::Equal,
                TokenKind::OP_LT => o == Ordering::Less,
                TokenKind::OP_LE => o != Ordering::Greater,
                TokenKind::OP_GT => o == Ordering::Greater,
                TokenKind::OP_GE => o != Ordering::Less,
                _ => false,
            },
            None => op == TokenKind::OP_NE,
        }
    }

    fn incompatible(op: &'static str, a: &Value, b: &Value) -> ValueError {
        ValueError::IncompatibleOperands {
            op,
            left: a.type_name(),
            right: b.type_name(),
        }
    }

    pub fn add(&self, other: &Value) -> ValueResult<Value> {
        Ok(match (self, other) {
            (Value::Text(s), b) => Value::Text(format!("{}{}", s, b.as_string())),
            (Value::List(items), Value::List(more)) => {
                Value::List(items.iter().chain(more).cloned().collect())
            }
            (Value::List(items), b) => {
                let mut items = items.clone();
                items.push(b.as_item());
                Value::List(items)
            }
            (Value::Point3(p), Value::Point3(q)) => Value::Point3(Vec3::new(p.x + q.x, p.y + q.y, p.z + q.z)),
            (Value::Point3(p), b) if is_scalar(b) => {
                let d = b.as_float();
                Value::Point3(Vec3::new(p.x + d, p.y + d, p.z + d))
            }
            (Value::Bitset { atoms: x, .. }, Value::Bitset { atoms: y, .. }) => Value::from(x.union(y)),
            (Value::Integer(x), Value::Integer(y)) => Value::Integer(x.wrapping_add(*y)),
            (a, b) if is_scalar(a) && is_scalar(b) => Value::Decimal(a.as_float() + b.as_float()),
            (a, b) => return Err(Value::incompatible("+", a, b)),
        })
    }

    pub fn sub(&self, other: &Value) -> ValueResult<Value> {
        Ok(match (self, other) {
            (Value::Point3(p), Value::Point3(q)) => Value::Point3(Vec3::new(p.x - q.x, p.y - q.y, p.z - q.z)),
            (Value::Point3(p), b) if is_scalar(b) => {
                let d = b.as_float();
                Value::Point3(Vec3::new(p.x - d, p.y - d, p.z - d))
            }
            (Value::Bitset { atoms: x, .. }, Value::Bitset { atoms: y, .. }) => {
                Value::from(x.difference(y))
            }
            (Value::Integer(x), Value::Integer(y)) => Value::Integer(x.wrapping_sub(*y)),
            (a, b) if is_scalar(a) && is_scalar(b) => Value::Decimal(a.as_float() - b.as_float()),
            (a, b) => return Err(Value::incompatible("-", a, b)),
        })
    }

    pub fn mul(&self, other: &Value) -> ValueResult<Value> {
        Ok(match (self, other) {
            (Value::Point3(p), Value::Point3(q)) => Value::Decimal(p.dot(*q)),
            (Value::Point3(p), b) | (b, Value::Point3(p)) if is_scalar(b) => {
                let k = b.as_float();
                Value::Point3(Vec3::new(p.x * k, p.y * k, p.z * k))
            }
            (Value::Integer(x), Value::Integer(y)) => Value::Integer(x.wrapping_mul(*y)),
            (a, b) if is_scalar(a) && is_scalar(b) => Value::Decimal(a.as_float() * b.as_float()),
            (a, b) => return Err(Value::incompatible("*", a, b)),
        })
    }

    /// Integer division stays integral only when exact
    pub fn div(&self, other: &Value) -> ValueResult<Value> {
        Ok(match (self, other) {
            (Value::Point3(p), b) if is_scalar(b) => {
                let k = b.as_float();
                if k == 0.0 {
                    return Err(ValueError::DivisionByZero);
                }
                Value::Point3(Vec3::new(p.x / k, p.y / k, p.z / k))
            }
            (Value::Integer(x), Value::Integer(y)) => {
                if *y == 0 {
                    return Err(ValueError::DivisionByZero);
                }
                if x % y == 0 {
                    Value::Integer(x / y)
                } else {
                    Value::Decimal(*x as f32 / *y as f32)
                }
            }
            (a, b) if is_scalar(a) && is_scalar(b) => {
                let d = b.as_float();
                if d == 0.0 {
                    return Err(ValueError::DivisionByZero);
                }
                Value::Decimal(a.as_float() / d)
            }
            (a, b) => return Err(Value::incompatible("/", a, b)),
        })
    }

    pub fn rem(&self, other: &Value) -> ValueResult<Value> {
        Ok(match (self, other) {
            (Value::Integer(x), Value::Integer(y)) => {
                if *y == 0 {
                    return Err(ValueError::DivisionByZero);
                }
                Value::Integer(x.wrapping_rem(*y))
            }
            (a, b) if is_scalar(a) && is_scalar(b) => {
                let d = b.as_float();
                if d == 0.0 {
                    return Err(ValueError::DivisionByZero);
                }
                Value::Decimal(a.as_float() % d)
            }
            (a, b) => return Err(Value::incompatible("%", a, b)),
        })
    }

    pub fn negate(&self) -> ValueResult<Value> {
        Ok(match self {
            Value::Integer(n) => Value::Integer(n.wrapping_neg()),
            Value::Point3(p) => Value::Point3(Vec3::new(-p.x, -p.y, -p.z)),
            Value::Point4(p) => Value::Point4([-p[0], -p[1], -p[2], -p[3]]),
            v if is_scalar(v) => Value::Decimal(-v.as_float()),
            v => {
                return Err(ValueError::IncompatibleOperand {
                    op: "-",
                    operand: v.type_name(),
                })
            }
        })
    }

    /// `.size`, `.length`, `.type`, `.x` ... for values that do not need a model
    pub fn property(&self, kind: TokenKind) -> Option<Value> {
        Some(match (kind, self) {
            (TokenKind::TYPE, v) => Value::Text(v.type_name().to_string()),
            (TokenKind::SIZE | TokenKind::LENGTH, Value::Text(s)) => Value::Integer(s.chars().count() as i32),
            (TokenKind::SIZE | TokenKind::LENGTH, Value::List(items)) => Value::Integer(items.len() as i32),
            (TokenKind::SIZE | TokenKind::LENGTH, Value::Bitset { atoms, .. }) => {
                Value::Integer(atoms.count() as i32)
            }
            (TokenKind::SIZE, Value::Point3(_)) => Value::Integer(3),
            (TokenKind::SIZE, Value::Point4(_)) => Value::Integer(4),
            (TokenKind::LENGTH, Value::Point3(p)) => Value::Decimal(p.magnitude()),
            (TokenKind::SIZE | TokenKind::LENGTH, _) => Value::Integer(1),
            (TokenKind::PROP_X, Value::Point3(p)) => Value::Decimal(p.x),
            (TokenKind::PROP_Y, Value::Point3(p)) => Value::Decimal(p.y),
            (TokenKind::PROP_Z, Value::Point3(p)) => Value::Decimal(p.z),
            (TokenKind::PROP_X, Value::Point4(p)) => Value::Decimal(p[0]),
            (TokenKind::PROP_Y, Value::Point4(p)) => Value::Decimal(p[1]),
            (TokenKind::PROP_Z, Value::Point4(p)) => Value::Decimal(p[2]),
            (TokenKind::XYZ, Value::Point3(p)) => Value::Point3(*p),
            (TokenKind::LINES, v) => Value::List(v.as_string().lines().map(str::to_string).collect()),
            (TokenKind::MIN | TokenKind::MAX, Value::List(items)) => {
                let numbers = items
                    .iter()
                    .map(|s| Value::parse_item(s).as_float())
                    .filter(|x| !x.is_nan());
                let folded = if kind == TokenKind::MIN {
                    numbers.fold(f32::INFINITY, f32::min)
                } else {
                    numbers.fold(f32::NEG_INFINITY, f32::max)
                };
                if folded.is_finite() {
                    Value::Decimal(folded)
                } else {
                    Value::Decimal(f32::NAN)
                }
            }
            (TokenKind::MIN | TokenKind::MAX, v) if is_scalar(v) => Value::Decimal(v.as_float()),
            _ => return None,
        })
    }
}

/// Operand that arithmetic treats as a plain number
fn is_scalar(v: &Value) -> bool {
    matches!(
        v,
        Value::Boolean(_) | Value::Integer(_) | Value::Decimal(_) | Value::Text(_)
    )
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_string())
    }
}

/// Which part of a value a variable currently refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Selection {
    /// The whole value
    #[default]
    Whole,
    /// A bitset tagged for position-based addressing; the next index picks
    /// the nth set bit
    Addressable,
}

/// Index requested by `[i]` or `[i:j]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector {
    Unset,
    Item(i32),
    Range(i32, i32),
}

/// A value plus its selection state
#[derive(Debug, Clone, Default)]
pub struct Variable {
    pub value: Value,
    pub selection: Selection,
}

impl From<Value> for Variable {
    fn from(value: Value) -> Self {
        Variable {
            value,
            selection: Selection::Whole,
        }
    }
}

/// 1-based inclusive bounds within `len`; `None` when empty
fn resolve(len: usize, selector: Selector) -> Option<(usize, usize)> {
    let len = len as i64;
    let (mut start, mut end) = match selector {
        Selector::Unset => (1, len),
        Selector::Item(i) => (i as i64, i as i64),
        Selector::Range(i, j) => (i as i64, j as i64),
    };
    if start <= 0 {
        start += len;
    }
    if start < 1 && matches!(selector, Selector::Item(_)) {
        return None;
    }
    start = start.max(1);
    match selector {
        Selector::Item(_) => end = start,
        _ => {
            if end == 0 {
                end = len;
            } else if end < 0 {
                end += len;
            }
            end = end.min(len).max(start);
        }
    }
    (start <= len && len > 0).then_some((start as usize, end as usize))
}

impl Variable {
    pub fn new(value: Value) -> Self {
        Variable::from(value)
    }

    /// Restrict to an item or range of a string, list or bitset.
    ///
    /// A bitset not yet selected is only tagged [`Selection::Addressable`];
    /// the following selection then counts set bits, so `{3 7 9}` tagged
    /// and then indexed with `2` gives `{7}`.
    pub fn select_item(&self, selector: Selector) -> Variable {
        match (&self.value, self.selection) {
            (Value::Bitset { .. }, Selection::Whole) => Variable {
                value: self.value.clone(),
                selection: Selection::Addressable,
            },
            (_, _) if selector == Selector::Unset => self.clone(),
            (Value::Bitset { atoms, bonds }, Selection::Addressable) => {
                let picked = match resolve(atoms.count(), selector) {
                    Some((start, end)) => AtomSet::from_indices(
                        atoms.len(),
                        atoms.iter().skip(start - 1).take(end + 1 - start),
                    ),
                    None => AtomSet::new(atoms.len()),
                };
                Variable::new(Value::Bitset {
                    atoms: picked,
                    bonds: bonds.clone(),
                })
            }
            (Value::Text(s), _) => {
                let chars: Vec<char> = s.chars().collect();
                let text = match resolve(chars.len(), selector) {
                    Some((start, end)) => chars[start - 1..end].iter().collect(),
                    None => String::new(),
                };
                Variable::new(Value::Text(text))
            }
            (Value::List(items), _) => match (resolve(items.len(), selector), selector) {
                (Some((start, _)), Selector::Item(_)) => {
                    Variable::new(Value::parse_item(&items[start - 1]))
                }
                (Some((start, end)), _) => Variable::new(Value::List(items[start - 1..end].to_vec())),
                (None, Selector::Item(_)) => Variable::new(Value::Text(String::new())),
                (None, _) => Variable::new(Value::List(Vec::new())),
            },
            _ => self.clone(),
        }
    }

    /// `x[i]` / `x[i:j]`: tag, then select
    pub fn index(&self, selector: Selector) -> Variable {
        self.select_item(Selector::Unset).select_item(selector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bits(indices: &[usize]) -> Value {
        Value::from(AtomSet::from_indices(10, indices.iter().copied()))
    }

    #[test]
    fn test_two_step_bitset_indexing() {
        let v = Variable::new(bits(&[3, 7, 9]));
        let tagged = v.select_item(Selector::Unset);
        assert_eq!(tagged.selection, Selection::Addressable);
        assert_eq!(tagged.value.as_bitset(), v.value.as_bitset());

        let picked = tagged.select_item(Selector::Item(2));
        assert_eq!(picked.value.as_bitset().unwrap().iter().collect::<Vec<_>>(), vec![7]);
        assert_eq!(picked.selection, Selection::Whole);

        // A first selection never restricts by position
        let untagged = v.select_item(Selector::Item(2));
        assert_eq!(untagged.value.as_bitset(), v.value.as_bitset());
    }

    #[test]
    fn test_bitset_ranges() {
        let v = Variable::new(bits(&[1, 2, 4, 8]));
        let r = v.index(Selector::Range(2, 3));
        assert_eq!(r.value.as_bitset().unwrap().iter().collect::<Vec<_>>(), vec![2, 4]);
        let last = v.index(Selector::Item(0));
        assert_eq!(last.value.as_bitset().unwrap().iter().collect::<Vec<_>>(), vec![8]);
        let none = v.index(Selector::Item(9));
        assert!(none.value.as_bitset().unwrap().is_empty());
    }

    #[test]
    fn test_string_and_list_indexing() {
        let s = Variable::new(Value::from("testing"));
        assert_eq!(s.index(Selector::Item(1)).value.as_string(), "t");
        assert_eq!(s.index(Selector::Item(0)).value.as_string(), "g");
        assert_eq!(s.index(Selector::Item(-1)).value.as_string(), "n");
        assert_eq!(s.index(Selector::Range(4, 0)).value.as_string(), "ting");
        assert_eq!(s.index(Selector::Range(2, -2)).value.as_string(), "esti");

        let list = Variable::new(Value::List(vec!["1".into(), "2.5".into(), "x".into()]));
        assert!(matches!(list.index(Selector::Item(1)).value, Value::Integer(1)));
        assert!(matches!(list.index(Selector::Item(2)).value, Value::Decimal(_)));
        match list.index(Selector::Range(2, 3)).value {
            Value::List(items) => assert_eq!(items, ["2.5", "x"]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_negative_index_past_start_is_empty() {
        let list = Variable::new(Value::List(vec!["a".into(), "b".into(), "c".into()]));
        assert_eq!(list.index(Selector::Item(-2)).value.as_string(), "a");
        assert_eq!(list.index(Selector::Item(-10)).value.as_string(), "");

        let s = Variable::new(Value::from("abc"));
        assert_eq!(s.index(Selector::Item(-3)).value.as_string(), "");

        let atoms = Variable::new(bits(&[3, 7, 9]));
        match atoms.index(Selector::Item(-10)).value {
            Value::Bitset { atoms, .. } => assert!(atoms.is_empty()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_comparator_asymmetry() {
        let ten = Value::from("10");
        let nine = Value::from("9");
        assert!(!Value::compare(TokenKind::OP_EQ, &ten, &nine));
        assert!(Value::compare(TokenKind::OP_LT, &ten, &nine));
        assert!(!Value::compare(TokenKind::OP_EQ, &ten, &Value::Decimal(9.0)));
        assert!(Value::compare(TokenKind::OP_EQ, &nine, &Value::Integer(9)));
        assert!(Value::compare(TokenKind::OP_GT, &ten, &Value::Integer(9)));
    }

    #[test]
    fn test_integers_compare_exactly() {
        let a = Value::Integer(16_777_216);
        let b = Value::Integer(16_777_217);
        assert!(!Value::compare(TokenKind::OP_EQ, &a, &b));
        assert!(Value::compare(TokenKind::OP_LT, &a, &b));
        assert!(Value::compare(TokenKind::OP_NE, &b, &a));
    }

    #[test]
    fn test_coercions() {
        assert!(!Value::from("false").as_boolean());
        assert!(!Value::from("0").as_boolean());
        assert!(!Value::from("").as_boolean());
        assert!(Value::from("no").as_boolean());
        assert_eq!(Value::from("42").as_int(), 42);
        assert_eq!(Value::from("abc").as_int(), 0);
        assert!(Value::from("abc").as_float().is_nan());
        assert_eq!(Value::from("true").as_int(), 1);
        assert_eq!(bits(&[1, 2, 3]).as_int(), 3);
        assert_eq!(Value::Point3(Vec3::new(3.0, 4.0, 0.0)).as_float(), 5.0);
        assert_eq!(Value::Point4([0.0, 0.0, 2.0, 4.0]).as_float(), 2.0);
        assert_eq!(Value::Decimal(2.0).as_string(), "2.0");
        assert_eq!(Value::Decimal(2.5).as_string(), "2.5");
        assert_eq!(bits(&[0, 2, 3, 4]).as_string(), "({0 2:4})");
    }

    #[test]
    fn test_arithmetic() {
        assert!(matches!(Value::Integer(6).div(&Value::Integer(3)), Ok(Value::Integer(2))));
        assert!(matches!(Value::Integer(7).div(&Value::Integer(2)), Ok(Value::Decimal(x)) if x == 3.5));
        assert_eq!(
            Value::Integer(1).div(&Value::Integer(0)).unwrap_err(),
            ValueError::DivisionByZero
        );
        assert_eq!(
            Value::from("a").add(&Value::Integer(1)).unwrap().as_string(),
            "a1"
        );
        assert!(matches!(Value::from("10").sub(&Value::Integer(3)), Ok(Value::Decimal(x)) if x == 7.0));
        assert!(Value::from(AtomSet::new(2)).mul(&Value::Integer(2)).is_err());
        let p = Value::Point3(Vec3::new(1.0, 2.0, 3.0)).mul(&Value::Integer(2)).unwrap();
        assert_eq!(p.as_string(), "{2.0 4.0 6.0}");
    }

    #[test]
    fn test_properties() {
        let list = Value::List(vec!["3".into(), "1".into(), "2".into()]);
        assert_eq!(list.property(TokenKind::SIZE).unwrap().as_int(), 3);
        assert_eq!(list.property(TokenKind::MAX).unwrap().as_float(), 3.0);
        assert_eq!(Value::from("abc").property(TokenKind::TYPE).unwrap().as_string(), "string");
        assert!(bits(&[1]).property(TokenKind::PROP_X).is_none());
    }

    #[test]
    fn test_from_token_and_parse_item() {
        assert!(matches!(Value::from_token(&Token::integer(3)), Some(Value::Integer(3))));
        assert!(Value::from_token(&Token::keyword(TokenKind::AND)).is_none());
        assert!(matches!(Value::parse_item("{1 2 3}"), Value::Point3(_)));
        assert!(matches!(Value::parse_item("TRUE"), Value::Boolean(true)));
    }
}
