//! Linear element-path matching for `substructure("...")`
//!
//! Patterns are chains of atoms with optional bond symbols between them:
//! `CCO`, `C=O`, `C-[Fe]`, `c:c`, `*N`. Branches and ring closures are not
//! supported and are reported as pattern errors.

use crate::atom::BondOrder;
use crate::atomset::AtomSet;
use crate::element::Element;
use crate::error::{ModelError, ModelResult};
use crate::model::AtomModel;

#[derive(Debug, Clone, Copy, PartialEq)]
enum AtomPattern {
    Any,
    Element(Element),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BondPattern {
    Any,
    Order(BondOrder),
}

#[derive(Debug)]
struct Path {
    atoms: Vec<AtomPattern>,
    /// `bonds[i]` joins `atoms[i]` and `atoms[i + 1]`
    bonds: Vec<BondPattern>,
}

fn parse(pattern: &str) -> ModelResult<Path> {
    let chars: Vec<char> = pattern.trim().chars().collect();
    let mut atoms = Vec::new();
    let mut bonds = Vec::new();
    let mut pending_bond: Option<BondPattern> = None;
    let mut i = 0;
    let bad = |what: &str| ModelError::Pattern(format!("{} in \"{}\"", what, pattern));

    while i < chars.len() {
        let c = chars[i];
        let atom = match c {
            '-' | '=' | '#' | ':' => {
                if atoms.is_empty() || pending_bond.is_some() {
                    return Err(bad("misplaced bond"));
                }
                pending_bond = Some(BondPattern::Order(match c {
                    '-' => BondOrder::Single,
                    '=' => BondOrder::Double,
                    '#' => BondOrder::Triple,
                    _ => BondOrder::Aromatic,
                }));
                i += 1;
                continue;
            }
            '*' => {
                i += 1;
                AtomPattern::Any
            }
            '[' => {
                let close = chars[i..]
                    .iter()
                    .position(|&ch| ch == ']')
                    .ok_or_else(|| bad("unclosed bracket"))?;
                let symbol: String = chars[i + 1..i + close].iter().collect();
                i += close + 1;
                AtomPattern::Element(
                    Element::from_symbol(&symbol).ok_or_else(|| ModelError::UnknownElement(symbol))?,
                )
            }
            '(' | ')' => return Err(bad("branches are not supported")),
            c if c.is_ascii_digit() => return Err(bad("ring closures are not supported")),
            c if c.is_ascii_alphabetic() => {
                // Two-letter organic-subset symbols first
                let two: String = chars[i..(i + 2).min(chars.len())].iter().collect();
                if two == "Cl" || two == "Br" {
                    i += 2;
                    AtomPattern::Element(Element::from_symbol(&two).unwrap_or_default())
                } else {
                    i += 1;
                    let symbol = c.to_ascii_uppercase().to_string();
                    AtomPattern::Element(
                        Element::from_symbol(&symbol)
                            .ok_or_else(|| ModelError::UnknownElement(symbol))?,
                    )
                }
            }
            _ => return Err(bad("unexpected character")),
        };
        if !atoms.is_empty() {
            bonds.push(pending_bond.take().unwrap_or(BondPattern::Any));
        }
        atoms.push(atom);
    }
    if atoms.is_empty() || pending_bond.is_some() {
        return Err(bad("incomplete pattern"));
    }
    Ok(Path { atoms, bonds })
}

fn atom_matches<M: AtomModel + ?Sized>(model: &M, index: usize, pattern: AtomPattern) -> bool {
    match pattern {
        AtomPattern::Any => true,
        AtomPattern::Element(e) => model.atom(index).map(|a| a.element == e).unwrap_or(false),
    }
}

fn extend<M: AtomModel + ?Sized>(
    model: &M,
    path: &Path,
    trail: &mut Vec<usize>,
    hits: &mut AtomSet,
) {
    let depth = trail.len();
    if depth == path.atoms.len() {
        for &i in trail.iter() {
            hits.insert(i);
        }
        return;
    }
    let Some(&last) = trail.last() else {
        return;
    };
    for (next, order) in model.neighbors(last) {
        if trail.contains(&next) || !order.is_covalent() {
            continue;
        }
        let bond_ok = match path.bonds[depth - 1] {
            BondPattern::Any => true,
            BondPattern::Order(o) => o == order,
        };
        if bond_ok && atom_matches(model, next, path.atoms[depth]) {
            trail.push(next);
            extend(model, path, trail, hits);
            trail.pop();
        }
    }
}

/// Union of every atom taking part in a match of `pattern`
pub fn find_matches<M: AtomModel + ?Sized>(model: &M, pattern: &str) -> ModelResult<AtomSet> {
    let path = parse(pattern)?;
    let mut hits = AtomSet::new(model.atom_count());
    let mut trail = Vec::with_capacity(path.atoms.len());
    for start in 0..model.atom_count() {
        if atom_matches(model, start, path.atoms[0]) {
            trail.push(start);
            extend(model, &path, &mut trail, &mut hits);
            trail.clear();
        }
    }
    Ok(hits)
}
