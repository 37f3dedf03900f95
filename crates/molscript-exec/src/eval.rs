//! Postfix evaluator
//!
//! Runs one compiled expression span on a value stack. Atom-expression
//! tokens push bitsets and math tokens push values; both share the logical
//! operators, which act on sets when both operands are bitsets and on
//! booleans otherwise. Everything the evaluator needs from the running
//! script (variables, defined sets, user functions, the model and the
//! current selection) comes through [`Environment`].

use std::hash::Hash;
use std::sync::Arc;

use ahash::AHashSet;
use lin_alg::f32::Vec3;
use molscript_lang::token::{
    Comparison, ConnectedSpec, Operand, SeqCode, WithinKey, WithinMode, WithinSpec, WithinTarget,
};
use molscript_lang::{
    sprintf, Compiler, KeywordRegistry, Mode, Selector, Token, TokenFlags, TokenKind, TokenValue,
    Value, Variable,
};
use molscript_mol::{residue, Atom, AtomModel, AtomSet, BondOrder, SecondaryStructure, SpatialGrid};

use crate::error::{RuntimeError, RuntimeResult};
use crate::selection::SelectionSnapshot;

/// Distance tolerance for `within` a point or plane given without a distance
const ON_TARGET_TOLERANCE: f32 = 0.01;

/// What the evaluator reads from and writes to while running
pub trait Environment {
    fn model(&self) -> Arc<dyn AtomModel>;

    fn selection(&self) -> SelectionSnapshot;

    fn variable(&self, name: &str) -> Option<Value>;

    /// Store into the innermost scope that already has `name`, else globally
    fn assign(&mut self, name: &str, value: Value) -> RuntimeResult<()>;

    /// Postfix of a `define`d set
    fn defined_set(&self, name: &str) -> Option<Arc<[Token]>>;

    fn call(&mut self, name: &str, args: Vec<Value>) -> RuntimeResult<Value>;

    /// Keywords for selection text held in variables (`@name`)
    fn registry(&self) -> &KeywordRegistry {
        KeywordRegistry::global()
    }
}

/// Evaluate a postfix span to a value
pub fn evaluate(env: &mut dyn Environment, tokens: &[Token]) -> RuntimeResult<Value> {
    Evaluator::new(env).evaluate(tokens)
}

/// Evaluate a postfix span that must produce an atom set
pub fn evaluate_atoms(env: &mut dyn Environment, tokens: &[Token]) -> RuntimeResult<AtomSet> {
    Evaluator::new(env).evaluate_atoms(tokens)
}

/// Case-insensitive glob with `*` (any run) and `?` (any one character)
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().map(|c| c.to_ascii_uppercase()).collect();
    let t: Vec<char> = text.chars().map(|c| c.to_ascii_uppercase()).collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|&c| c == '*')
}

fn malformed(token: &Token) -> RuntimeError {
    RuntimeError::Malformed(token.to_string())
}

fn pop(stack: &mut Vec<Value>, token: &Token) -> RuntimeResult<Value> {
    stack.pop().ok_or_else(|| malformed(token))
}

fn token_text(token: &Token) -> RuntimeResult<&str> {
    token.text().ok_or_else(|| malformed(token))
}

/// Signed distance from a point to the plane `ax + by + cz + d = 0`
fn plane_distance(plane: &[f32; 4], p: Vec3) -> f32 {
    let n = (plane[0] * plane[0] + plane[1] * plane[1] + plane[2] * plane[2]).sqrt();
    if n == 0.0 {
        return f32::NAN;
    }
    (plane[0] * p.x + plane[1] * p.y + plane[2] * p.z + plane[3]) / n
}

fn blank(c: char) -> bool {
    c == '\0' || c == ' '
}

fn seqcode_matches(atom: &Atom, code: &SeqCode) -> bool {
    atom.resv == code.number
        && code
            .insertion
            .map_or(true, |c| atom.inscode.eq_ignore_ascii_case(&c))
}

/// Inclusive residue range; insertion codes refine only the end points
fn seqrange_matches(atom: &Atom, first: &SeqCode, last: &SeqCode) -> bool {
    if atom.resv < first.number || atom.resv > last.number {
        return false;
    }
    let ins = if blank(atom.inscode) {
        ' '
    } else {
        atom.inscode.to_ascii_uppercase()
    };
    if atom.resv == first.number {
        if let Some(c) = first.insertion {
            if ins < c.to_ascii_uppercase() {
                return false;
            }
        }
    }
    if atom.resv == last.number {
        if let Some(c) = last.insertion {
            if ins > c.to_ascii_uppercase() {
                return false;
            }
        }
    }
    true
}

fn string_property(atom: &Atom, kind: TokenKind) -> String {
    match kind {
        TokenKind::ELEMENT => atom.element.symbol().to_string(),
        TokenKind::ATOM_NAME => atom.name.clone(),
        TokenKind::GROUP => atom.resn.clone(),
        TokenKind::CHAIN => atom.chain.clone(),
        TokenKind::ALTLOC if !blank(atom.altloc) => atom.altloc.to_string(),
        TokenKind::INSERTION if !blank(atom.inscode) => atom.inscode.to_string(),
        TokenKind::STRUCTURE => atom.ss.name().to_string(),
        _ => String::new(),
    }
}

fn numeric_property(
    model: &dyn AtomModel,
    index: usize,
    atom: &Atom,
    kind: TokenKind,
    molecule_ids: Option<&[usize]>,
) -> Value {
    match kind {
        TokenKind::ATOMNO => Value::Integer(atom.serial),
        TokenKind::ATOM_INDEX => Value::Integer(index as i32),
        TokenKind::ELEMNO => Value::Integer(i32::from(atom.element.atomic_number())),
        TokenKind::RESNO => Value::Integer(atom.resv),
        TokenKind::MODEL => Value::Integer(atom.model),
        TokenKind::FORMAL_CHARGE => Value::Integer(i32::from(atom.formal_charge)),
        TokenKind::MOLECULE => molecule_ids
            .and_then(|ids| ids.get(index))
            .map_or(Value::Integer(0), |id| Value::Integer(*id as i32 + 1)),
        TokenKind::SITE => Value::Integer(atom.site),
        TokenKind::BOND_COUNT => Value::Integer(model.neighbors(index).len() as i32),
        TokenKind::X => Value::Decimal(atom.coord.x),
        TokenKind::Y => Value::Decimal(atom.coord.y),
        TokenKind::Z => Value::Decimal(atom.coord.z),
        TokenKind::TEMPERATURE => Value::Decimal(atom.b_factor),
        TokenKind::OCCUPANCY => Value::Decimal(atom.occupancy),
        TokenKind::PARTIAL_CHARGE => Value::Decimal(atom.partial_charge),
        TokenKind::RADIUS => Value::Decimal(atom.element.vdw_radius()),
        _ => Value::Decimal(f32::NAN),
    }
}

/// Postfix stack machine bound to one environment
pub struct Evaluator<'e> {
    env: &'e mut dyn Environment,
    model: Arc<dyn AtomModel>,
    selection: SelectionSnapshot,
    /// Every atom not deleted
    universe: AtomSet,
    /// Defined sets being expanded, innermost last
    expanding: Vec<String>,
}

impl<'e> Evaluator<'e> {
    pub fn new(env: &'e mut dyn Environment) -> Self {
        let model = env.model();
        let selection = env.selection();
        let universe = selection.live().resized(model.atom_count());
        Evaluator {
            env,
            model,
            selection,
            universe,
            expanding: Vec::new(),
        }
    }

    /// Re-read model and selection after a user function may have changed them
    fn refresh(&mut self) {
        self.model = self.env.model();
        self.selection = self.env.selection();
        self.universe = self.selection.live().resized(self.model.atom_count());
    }

    fn atom_count(&self) -> usize {
        self.model.atom_count()
    }

    pub fn evaluate(&mut self, tokens: &[Token]) -> RuntimeResult<Value> {
        let mut stack: Vec<Value> = Vec::new();
        for token in tokens {
            self.step(token, &mut stack)?;
        }
        match (stack.pop(), stack.is_empty()) {
            (Some(value), true) => Ok(value),
            _ => Err(RuntimeError::Malformed(
                tokens.first().map(|t| t.to_string()).unwrap_or_default(),
            )),
        }
    }

    pub fn evaluate_atoms(&mut self, tokens: &[Token]) -> RuntimeResult<AtomSet> {
        match self.evaluate(tokens)? {
            Value::Bitset { atoms, .. } => Ok(atoms.resized(self.atom_count())),
            other => Err(RuntimeError::TypeMismatch("bitset", other.type_name())),
        }
    }

    fn step(&mut self, token: &Token, stack: &mut Vec<Value>) -> RuntimeResult<()> {
        let kind = token.kind;
        let value = match kind {
            TokenKind::EXPRESSION_BEGIN | TokenKind::EXPRESSION_END => return Ok(()),
            TokenKind::IDENTIFIER => self.identifier(token_text(token)?)?,
            TokenKind::VARIABLE_REF => Value::from(self.variable_ref(token_text(token)?)?),
            TokenKind::DEFINED_SET => Value::from(self.named_set(token_text(token)?)?),
            TokenKind::ELEMENT_SET => {
                let number = token.int_value;
                Value::from(self.filter(|_, a| i32::from(a.element.atomic_number()) == number))
            }
            TokenKind::WITHIN => match &token.value {
                TokenValue::Within(spec) => {
                    let target = pop(stack, token)?;
                    Value::from(self.within(spec, target)?)
                }
                _ => return Err(malformed(token)),
            },
            TokenKind::CONNECTED => match &token.value {
                TokenValue::Connected(spec) => {
                    let target = pop(stack, token)?;
                    Value::from(self.connected(spec, target)?)
                }
                _ => return Err(malformed(token)),
            },
            TokenKind::SUBSTRUCTURE => {
                let hits = self.model.substructure(token_text(token)?)?;
                Value::from(hits.intersection(&self.universe))
            }
            TokenKind::AND | TokenKind::OR | TokenKind::XOR | TokenKind::TOGGLE => {
                let b = pop(stack, token)?;
                let a = pop(stack, token)?;
                logical(kind, a, b)
            }
            TokenKind::NOT => match pop(stack, token)? {
                Value::Bitset { atoms, .. } => Value::from(self.universe.difference(&atoms)),
                other => Value::Boolean(!other.as_boolean()),
            },
            TokenKind::UNARY_MINUS => pop(stack, token)?.negate()?,
            TokenKind::PLUS
            | TokenKind::MINUS
            | TokenKind::TIMES
            | TokenKind::DIVIDE
            | TokenKind::PERCENT => {
                let b = pop(stack, token)?;
                let a = pop(stack, token)?;
                match kind {
                    TokenKind::PLUS => a.add(&b)?,
                    TokenKind::MINUS => a.sub(&b)?,
                    TokenKind::TIMES => a.mul(&b)?,
                    TokenKind::DIVIDE => a.div(&b)?,
                    _ => a.rem(&b)?,
                }
            }
            TokenKind::PLUS_PLUS | TokenKind::MINUS_MINUS => self.increment(token)?,
            TokenKind::INDEX => {
                let selector = if token.int_value == 2 {
                    let end = pop(stack, token)?;
                    let start = pop(stack, token)?;
                    Selector::Range(start.as_int(), end.as_int())
                } else {
                    Selector::Item(pop(stack, token)?.as_int())
                };
                let target = pop(stack, token)?;
                Variable::new(target).index(selector).value
            }
            TokenKind::ARRAY => {
                let items = split_args(stack, token)?;
                Value::list(items)
            }
            _ if kind.has(TokenFlags::COMPARATOR) => match &token.value {
                TokenValue::Comparison(c) => Value::from(self.compare_atoms(kind, c)?),
                _ => {
                    let b = pop(stack, token)?;
                    let a = pop(stack, token)?;
                    Value::Boolean(Value::compare(kind, &a, &b))
                }
            },
            _ if kind.has(TokenFlags::PREDEFINED_SET) => Value::from(self.predefined(kind)),
            _ if kind.has(TokenFlags::RESIDUE_SPEC) => Value::from(self.residue_filter(token)?),
            _ if kind.has(TokenFlags::MATH_PROPERTY) => {
                let target = pop(stack, token)?;
                self.property(kind, target)?
            }
            _ if kind.has(TokenFlags::MATH_FUNCTION) => {
                let args = split_args(stack, token)?;
                self.function(token, args)?
            }
            _ => Value::from_token(token).ok_or_else(|| malformed(token))?,
        };
        stack.push(value);
        Ok(())
    }

    fn filter(&self, mut pred: impl FnMut(usize, &Atom) -> bool) -> AtomSet {
        let atoms = self.model.atoms();
        AtomSet::from_fn(atoms.len(), |i| self.universe.contains(i) && pred(i, &atoms[i]))
    }

    // ----- names ----------------------------------------------------------

    /// Math-mode name: a variable, else a defined set
    fn identifier(&mut self, name: &str) -> RuntimeResult<Value> {
        if let Some(value) = self.env.variable(name) {
            return Ok(value);
        }
        if let Some(tokens) = self.env.defined_set(name) {
            return Ok(Value::from(self.expand(name, &tokens)?));
        }
        Err(RuntimeError::UndefinedVariable(name.to_string()))
    }

    /// `@name` in an atom expression
    fn variable_ref(&mut self, name: &str) -> RuntimeResult<AtomSet> {
        match self.env.variable(name) {
            Some(Value::Bitset { atoms, .. }) => Ok(atoms),
            Some(Value::Text(source)) => {
                let tokens = Compiler::new(self.env.registry())
                    .compile_expression(&source, Mode::Atom)
                    .map_err(|e| RuntimeError::bad_argument(format!("@{}", name), e.untranslated()))?;
                self.expand(name, &tokens)
            }
            Some(other) => Err(RuntimeError::TypeMismatch("bitset", other.type_name())),
            None => match self.env.defined_set(name) {
                Some(tokens) => self.expand(name, &tokens),
                None => Err(RuntimeError::UndefinedVariable(name.to_string())),
            },
        }
    }

    /// Bare word in an atom expression: defined set, set variable or group name
    fn named_set(&mut self, name: &str) -> RuntimeResult<AtomSet> {
        if let Some(tokens) = self.env.defined_set(name) {
            return self.expand(name, &tokens);
        }
        if let Some(Value::Bitset { atoms, .. }) = self.env.variable(name) {
            return Ok(atoms);
        }
        Ok(self.filter(|_, a| wildcard_match(name, &a.resn)))
    }

    fn expand(&mut self, name: &str, tokens: &[Token]) -> RuntimeResult<AtomSet> {
        if self.expanding.iter().any(|n| n.eq_ignore_ascii_case(name)) {
            return Err(RuntimeError::RecursiveDefinition(name.to_string()));
        }
        self.expanding.push(name.to_string());
        let result = self.evaluate_atoms(tokens);
        self.expanding.pop();
        result
    }

    fn increment(&mut self, token: &Token) -> RuntimeResult<Value> {
        let name = token_text(token)?;
        let old = self
            .env
            .variable(name)
            .ok_or_else(|| RuntimeError::UndefinedVariable(name.to_string()))?;
        let step = Value::Integer(1);
        let new = if token.kind == TokenKind::PLUS_PLUS {
            old.add(&step)?
        } else {
            old.sub(&step)?
        };
        self.env.assign(name, new.clone())?;
        Ok(if token.int_value == 1 { new } else { old })
    }

    // ----- atom sets ------------------------------------------------------

    fn predefined(&self, kind: TokenKind) -> AtomSet {
        let n = self.atom_count();
        match kind {
            TokenKind::ALL => self.universe.clone(),
            TokenKind::NONE => AtomSet::new(n),
            TokenKind::SELECTED => self.selection.selected.resized(n),
            TokenKind::HIDDEN => self.selection.hidden.resized(n),
            TokenKind::DISPLAYED => self.selection.displayed().resized(n),
            TokenKind::HYDROGEN => self.filter(|_, a| a.is_hydrogen()),
            TokenKind::PROTEIN => self.filter(|_, a| a.is_protein()),
            TokenKind::NUCLEIC => self.filter(|_, a| a.is_nucleic()),
            TokenKind::DNA => self.filter(|_, a| residue::is_dna(&a.resn)),
            TokenKind::RNA => self.filter(|_, a| residue::is_rna(&a.resn)),
            TokenKind::SOLVENT => self.filter(|_, a| a.is_solvent()),
            TokenKind::WATER => self.filter(|_, a| a.is_water()),
            TokenKind::IONS => self.filter(|_, a| residue::is_ion(&a.resn)),
            TokenKind::HETERO => self.filter(|_, a| a.hetatm),
            TokenKind::LIGAND => self.filter(|_, a| a.is_ligand()),
            TokenKind::BACKBONE => self.filter(|_, a| a.is_backbone()),
            TokenKind::SIDECHAIN => self.filter(|_, a| a.is_protein() && !a.is_backbone()),
            TokenKind::HELIX => self.filter(|_, a| a.ss == SecondaryStructure::Helix),
            TokenKind::SHEET => self.filter(|_, a| a.ss == SecondaryStructure::Sheet),
            TokenKind::BONDED => {
                let model = Arc::clone(&self.model);
                self.filter(|i, _| !model.neighbors(i).is_empty())
            }
            _ => AtomSet::new(n),
        }
    }

    fn compare_atoms(&mut self, op: TokenKind, c: &Comparison) -> RuntimeResult<AtomSet> {
        let operand = match &c.operand {
            Operand::Integer(n) => Value::Integer(*n),
            Operand::Decimal(x) => Value::Decimal(*x),
            Operand::Text(s) => Value::Text(s.clone()),
            Operand::Point3(p) => Value::Point3(*p),
            Operand::Variable(name) => self
                .env
                .variable(name)
                .ok_or_else(|| RuntimeError::UndefinedVariable(name.clone()))?,
        };

        if c.property == TokenKind::CELL {
            let p = match operand {
                Value::Point3(p) => p,
                other => return Err(RuntimeError::TypeMismatch("point", other.type_name())),
            };
            let Some(cell) = self.model.unit_cell() else {
                return Ok(AtomSet::new(self.atom_count()));
            };
            let wanted = [p.x.round() as i32, p.y.round() as i32, p.z.round() as i32];
            return Ok(self.filter(|_, a| cell.cell_of(a.coord) == wanted));
        }

        if c.property.has(TokenFlags::STRING_PROPERTY) {
            let pattern = operand.as_string();
            let negate = op == TokenKind::OP_NE;
            let property = c.property;
            return Ok(self.filter(|_, a| {
                let hit = wildcard_match(&pattern, &string_property(a, property))
                    || (property == TokenKind::ELEMENT
                        && pattern.eq_ignore_ascii_case(a.element.name()));
                hit != negate
            }));
        }

        let ids = (c.property == TokenKind::MOLECULE).then(|| self.model.molecule_ids());
        let model = Arc::clone(&self.model);
        Ok(self.filter(|i, a| {
            let value = numeric_property(model.as_ref(), i, a, c.property, ids.as_deref());
            Value::compare(op, &value, &operand)
        }))
    }

    fn residue_filter(&self, token: &Token) -> RuntimeResult<AtomSet> {
        Ok(match (token.kind, &token.value) {
            (TokenKind::SPEC_RESNAME, TokenValue::Text(p)) => {
                self.filter(|_, a| wildcard_match(p, &a.resn))
            }
            (TokenKind::SPEC_CHAIN, TokenValue::Text(p)) => {
                self.filter(|_, a| wildcard_match(p, &a.chain))
            }
            (TokenKind::SPEC_ATOM_NAME, TokenValue::Text(p)) => {
                self.filter(|_, a| wildcard_match(p, &a.name))
            }
            (TokenKind::SPEC_ALTERNATE, TokenValue::Text(p)) => self.filter(|_, a| {
                let alt = if blank(a.altloc) {
                    String::new()
                } else {
                    a.altloc.to_string()
                };
                wildcard_match(p, &alt)
            }),
            (TokenKind::SPEC_SEQCODE, TokenValue::SeqCode(code)) => {
                self.filter(|_, a| seqcode_matches(a, code))
            }
            (TokenKind::SPEC_SEQCODE_RANGE, TokenValue::SeqRange(first, last)) => {
                self.filter(|_, a| seqrange_matches(a, first, last))
            }
            (TokenKind::SPEC_MODEL, _) => {
                let model = token.int_value;
                self.filter(|_, a| a.model == model)
            }
            _ => return Err(malformed(token)),
        })
    }

    fn within(&mut self, spec: &WithinSpec, target: Value) -> RuntimeResult<AtomSet> {
        match spec.target {
            WithinTarget::Atoms => {
                let target = match target {
                    Value::Bitset { atoms, .. } => atoms,
                    other => return Err(RuntimeError::TypeMismatch("bitset", other.type_name())),
                };
                self.within_atoms(spec, &target)
            }
            WithinTarget::Point => {
                let p = self.to_point(&target)?;
                let d = self.within_tolerance(spec);
                Ok(self.filter(|_, a| (a.coord - p).magnitude() <= d))
            }
            WithinTarget::Plane => {
                let plane = match target {
                    Value::Point4(plane) => plane,
                    other => return Err(RuntimeError::TypeMismatch("plane", other.type_name())),
                };
                let d = self.within_tolerance(spec);
                Ok(self.filter(|_, a| plane_distance(&plane, a.coord).abs() <= d))
            }
            WithinTarget::Hkl => {
                let hkl = self.to_point(&target)?;
                let plane = self
                    .model
                    .unit_cell()
                    .ok_or_else(|| RuntimeError::unsupported("hkl plane without a unit cell"))?
                    .hkl_plane(hkl.x, hkl.y, hkl.z)
                    .ok_or_else(|| RuntimeError::bad_argument("hkl", "degenerate Miller indices"))?;
                let d = self.within_tolerance(spec);
                Ok(self.filter(|_, a| plane_distance(&plane, a.coord).abs() <= d))
            }
        }
    }

    fn within_tolerance(&self, spec: &WithinSpec) -> f32 {
        match spec.mode {
            WithinMode::Distance { distance, .. } => distance,
            WithinMode::Key(_) => ON_TARGET_TOLERANCE,
        }
    }

    fn within_atoms(&mut self, spec: &WithinSpec, target: &AtomSet) -> RuntimeResult<AtomSet> {
        let key = match &spec.mode {
            WithinMode::Distance { distance, negative } => {
                let all_models = spec.all_models == Some(true);
                return Ok(self.within_distance(*distance, *negative, all_models, target));
            }
            WithinMode::Key(key) => key,
        };
        Ok(match key {
            WithinKey::Group => self.within_key(target, |_, a| {
                (a.model, a.chain.clone(), a.resv, a.inscode)
            }),
            WithinKey::Chain => self.within_key(target, |_, a| (a.model, a.chain.clone())),
            WithinKey::Model => self.within_key(target, |_, a| a.model),
            WithinKey::Molecule => {
                let ids = self.model.molecule_ids();
                self.within_key(target, |i, _| ids.get(i).copied())
            }
            WithinKey::Element => self.within_key(target, |_, a| a.element),
            WithinKey::AtomName | WithinKey::AtomType => {
                self.within_key(target, |_, a| a.name.to_ascii_uppercase())
            }
            WithinKey::Site => self.within_key(target, |_, a| a.site),
            WithinKey::Structure => {
                let segments = self.structure_segments(|ss| ss != SecondaryStructure::None);
                self.within_key(target, |i, _| segments[i])
                    .difference(&self.filter(|i, _| segments[i].is_none()))
            }
            WithinKey::Helix => {
                let segments = self.structure_segments(|ss| ss == SecondaryStructure::Helix);
                self.within_key(target, |i, _| segments[i])
                    .difference(&self.filter(|i, _| segments[i].is_none()))
            }
            WithinKey::BoundBox => self.within_bound_box(target),
            WithinKey::Sequence(seq) => self.within_sequence(seq, target),
            WithinKey::Coord | WithinKey::Plane | WithinKey::Hkl => {
                return Err(RuntimeError::TypeMismatch("coordinate", "bitset"))
            }
            WithinKey::Other(word) => {
                return Err(RuntimeError::unsupported(format!("within({}, ...)", word)))
            }
        })
    }

    /// Atoms within `distance` of any target atom; a negative distance
    /// leaves the target atoms themselves out
    fn within_distance(
        &self,
        distance: f32,
        negative: bool,
        all_models: bool,
        target: &AtomSet,
    ) -> AtomSet {
        let atoms = self.model.atoms();
        let grid = SpatialGrid::build(
            distance,
            target
                .iter()
                .filter(|&i| i < atoms.len())
                .map(|i| (i, atoms[i].coord)),
        );
        let limit = distance * distance;
        let mut near = Vec::new();
        let found = self.filter(|_, a| {
            grid.candidates(a.coord, &mut near);
            near.iter().any(|&j| {
                let b = &atoms[j];
                (all_models || a.model == b.model) && (a.coord - b.coord).magnitude_squared() <= limit
            })
        });
        if negative {
            found.difference(target)
        } else {
            found
        }
    }

    /// Atoms sharing `key` with at least one target atom
    fn within_key<K, F>(&self, target: &AtomSet, key: F) -> AtomSet
    where
        K: Eq + Hash,
        F: Fn(usize, &Atom) -> K,
    {
        let atoms = self.model.atoms();
        let keys: AHashSet<K> = target
            .iter()
            .filter_map(|i| atoms.get(i).map(|a| key(i, a)))
            .collect();
        self.filter(|i, a| keys.contains(&key(i, a)))
    }

    /// Segment id per atom for runs of residues whose structure passes `keep`
    fn structure_segments(&self, keep: impl Fn(SecondaryStructure) -> bool) -> Vec<Option<usize>> {
        let mut segments = Vec::with_capacity(self.atom_count());
        let mut current: Option<(i32, &str, SecondaryStructure)> = None;
        let mut next = 0usize;
        for atom in self.model.atoms() {
            if !keep(atom.ss) {
                current = None;
                segments.push(None);
                continue;
            }
            let run = (atom.model, atom.chain.as_str(), atom.ss);
            if current != Some(run) {
                current = Some(run);
                next += 1;
            }
            segments.push(Some(next));
        }
        segments
    }

    fn within_bound_box(&self, target: &AtomSet) -> AtomSet {
        let atoms = self.model.atoms();
        let mut lo = Vec3::new(f32::INFINITY, f32::INFINITY, f32::INFINITY);
        let mut hi = Vec3::new(f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY);
        for p in target.iter().filter_map(|i| atoms.get(i)).map(|a| a.coord) {
            lo = Vec3::new(lo.x.min(p.x), lo.y.min(p.y), lo.z.min(p.z));
            hi = Vec3::new(hi.x.max(p.x), hi.y.max(p.y), hi.z.max(p.z));
        }
        self.filter(|_, a| {
            let p = a.coord;
            (lo.x..=hi.x).contains(&p.x) && (lo.y..=hi.y).contains(&p.y) && (lo.z..=hi.z).contains(&p.z)
        })
    }

    /// Target atoms in residues spelling `sequence` in one-letter codes
    fn within_sequence(&self, sequence: &str, target: &AtomSet) -> AtomSet {
        let atoms = self.model.atoms();
        let wanted: Vec<char> = sequence.chars().map(|c| c.to_ascii_uppercase()).collect();
        let mut found = AtomSet::new(atoms.len());
        if wanted.is_empty() {
            return found;
        }

        // Residues in atom order, split into chains
        let mut chains: Vec<Vec<(char, Vec<usize>)>> = Vec::new();
        let mut last_chain: Option<(i32, &str)> = None;
        let mut last_residue = None;
        for i in self.universe.iter().filter(|&i| i < atoms.len()) {
            let atom = &atoms[i];
            let chain = (atom.model, atom.chain.as_str());
            if last_chain != Some(chain) {
                last_chain = Some(chain);
                last_residue = None;
                chains.push(Vec::new());
            }
            let key = atom.residue_key();
            let Some(residues) = chains.last_mut() else {
                continue;
            };
            if last_residue != Some(key) {
                last_residue = Some(key);
                let code = residue::one_letter_code(&atom.resn).unwrap_or('?');
                residues.push((code, Vec::new()));
            }
            if let Some((_, members)) = residues.last_mut() {
                members.push(i);
            }
        }

        for residues in &chains {
            if residues.len() < wanted.len() {
                continue;
            }
            for start in 0..=residues.len() - wanted.len() {
                let window = &residues[start..start + wanted.len()];
                if window.iter().zip(&wanted).all(|((code, _), w)| code == w) {
                    for (_, members) in window {
                        for &i in members {
                            found.insert(i);
                        }
                    }
                }
            }
        }
        found.intersection(target)
    }

    fn connected(&self, spec: &ConnectedSpec, target: Value) -> RuntimeResult<AtomSet> {
        let target = match target {
            Value::Bitset { atoms, .. } => atoms,
            other => return Err(RuntimeError::TypeMismatch("bitset", other.type_name())),
        };
        let order = match &spec.bond_type {
            Some(name) => Some(BondOrder::from_name(name).ok_or_else(|| {
                RuntimeError::bad_argument("connected", format!("unknown bond type {}", name))
            })?),
            None => None,
        };
        let model = Arc::clone(&self.model);
        let (min, max) = (spec.min.max(0) as usize, spec.max.max(0) as usize);
        Ok(self.filter(|i, _| {
            let count = model
                .neighbors(i)
                .iter()
                .filter(|(j, o)| target.contains(*j) && order.map_or(true, |want| *o == want))
                .count();
            (min..=max).contains(&count)
        }))
    }

    // ----- math -----------------------------------------------------------

    fn centroid(&self, atoms: &AtomSet) -> Option<Vec3> {
        let model = self.model.atoms();
        let mut sum = Vec3::new(0.0, 0.0, 0.0);
        let mut n = 0usize;
        for a in atoms.iter().filter_map(|i| model.get(i)) {
            sum = sum + a.coord;
            n += 1;
        }
        (n > 0).then(|| sum / n as f32)
    }

    fn to_point(&self, value: &Value) -> RuntimeResult<Vec3> {
        match value {
            Value::Point3(p) => Ok(*p),
            Value::Bitset { atoms, .. } => self
                .centroid(atoms)
                .ok_or_else(|| RuntimeError::bad_argument("point", "empty atom set")),
            Value::Text(s) => match Value::parse_item(s) {
                Value::Point3(p) => Ok(p),
                _ => Err(RuntimeError::TypeMismatch("point", "string")),
            },
            other => Err(RuntimeError::TypeMismatch("point", other.type_name())),
        }
    }

    fn property(&self, kind: TokenKind, target: Value) -> RuntimeResult<Value> {
        if let Value::Bitset { atoms, .. } = &target {
            if matches!(
                kind,
                TokenKind::PROP_X | TokenKind::PROP_Y | TokenKind::PROP_Z | TokenKind::XYZ
            ) {
                let c = self
                    .centroid(atoms)
                    .unwrap_or_else(|| Vec3::new(f32::NAN, f32::NAN, f32::NAN));
                return Ok(match kind {
                    TokenKind::PROP_X => Value::Decimal(c.x),
                    TokenKind::PROP_Y => Value::Decimal(c.y),
                    TokenKind::PROP_Z => Value::Decimal(c.z),
                    _ => Value::Point3(c),
                });
            }
        }
        target.property(kind).ok_or_else(|| {
            RuntimeError::unsupported(format!(".{} of {}", kind.name(), target.type_name()))
        })
    }

    fn function(&mut self, token: &Token, args: Vec<Value>) -> RuntimeResult<Value> {
        let name = token.kind.name();
        let arity = || RuntimeError::bad_argument(name, format!("{} arguments", args.len()));
        Ok(match token.kind {
            TokenKind::SPRINTF => match args.split_first() {
                Some((format, rest)) => sprintf(&format.as_string(), rest),
                None => return Err(arity()),
            },
            TokenKind::ABS => match args.as_slice() {
                [Value::Integer(n)] => Value::Integer(n.wrapping_abs()),
                [v] => Value::Decimal(v.as_float().abs()),
                _ => return Err(arity()),
            },
            TokenKind::SQRT => match args.as_slice() {
                [v] => Value::Decimal(v.as_float().sqrt()),
                _ => return Err(arity()),
            },
            TokenKind::SIN | TokenKind::COS => match args.as_slice() {
                [v] => {
                    let radians = v.as_float().to_radians();
                    Value::Decimal(if token.kind == TokenKind::SIN {
                        radians.sin()
                    } else {
                        radians.cos()
                    })
                }
                _ => return Err(arity()),
            },
            TokenKind::POINT => match args.as_slice() {
                [x, y, z] => Value::Point3(Vec3::new(x.as_float(), y.as_float(), z.as_float())),
                [v] => Value::Point3(self.to_point(v)?),
                _ => return Err(arity()),
            },
            TokenKind::PLANE => match args.as_slice() {
                [a, b, c, d] => Value::Point4([a.as_float(), b.as_float(), c.as_float(), d.as_float()]),
                [Value::Point4(p)] => Value::Point4(*p),
                [Value::Text(s)] => match Value::parse_item(s) {
                    p @ Value::Point4(_) => p,
                    _ => return Err(RuntimeError::TypeMismatch("plane", "string")),
                },
                _ => return Err(arity()),
            },
            TokenKind::DISTANCE => match args.as_slice() {
                [Value::Point4(plane), p] | [p, Value::Point4(plane)] => {
                    Value::Decimal(plane_distance(plane, self.to_point(p)?))
                }
                [a, b] => Value::Decimal((self.to_point(a)? - self.to_point(b)?).magnitude()),
                _ => return Err(arity()),
            },
            TokenKind::FUNCTION_CALL => {
                let function = token_text(token)?.to_string();
                let value = self.env.call(&function, args)?;
                self.refresh();
                value
            }
            _ => return Err(RuntimeError::unsupported(format!("{}()", name))),
        })
    }
}

/// Pop the top `int_value` operands, in push order
fn split_args(stack: &mut Vec<Value>, token: &Token) -> RuntimeResult<Vec<Value>> {
    let argc = usize::try_from(token.int_value)
        .ok()
        .filter(|&n| n <= stack.len())
        .ok_or_else(|| malformed(token))?;
    Ok(stack.split_off(stack.len() - argc))
}

fn logical(op: TokenKind, a: Value, b: Value) -> Value {
    if let (Some(x), Some(y)) = (a.as_bitset(), b.as_bitset()) {
        return Value::from(match op {
            TokenKind::AND => x.intersection(y),
            TokenKind::XOR => x.symmetric_difference(y),
            TokenKind::TOGGLE if y.is_subset(x) => x.difference(y),
            _ => x.union(y),
        });
    }
    let (p, q) = (a.as_boolean(), b.as_boolean());
    Value::Boolean(match op {
        TokenKind::AND => p && q,
        TokenKind::XOR => p != q,
        _ => p || q,
    })
}
