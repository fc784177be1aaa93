//! Minimal CSS selector support for non-browser DOMs.
//!
//! Covers what comment-pragma field selectors use in practice: type, `#id`,
//! `.class`, `[attr]`, `[attr=value]`, descendant and child combinators, and
//! comma-separated lists. Browsers use their native engine instead.

use thiserror::Error;

use super::{DomTree, NodeKind};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unsupported selector {selector:?}: {reason}")]
pub struct SelectorError {
    pub selector: String,
    pub reason: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrCondition {
    name: String,
    value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrCondition>,
}

/// Compound selectors right-to-left, each with the combinator linking it to
/// the next compound on its left.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Complex {
    parts: Vec<(Compound, Combinator)>,
}

/// A parsed selector list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    alternatives: Vec<Complex>,
}

impl Selector {
    pub fn parse(input: &str) -> Result<Self, SelectorError> {
        let err = |reason| SelectorError {
            selector: input.to_string(),
            reason,
        };
        let mut alternatives = Vec::new();
        for alt in input.split(',') {
            let alt = alt.trim();
            if alt.is_empty() {
                return Err(err("empty selector"));
            }
            alternatives.push(parse_complex(alt).map_err(err)?);
        }
        Ok(Self { alternatives })
    }

    /// Whether `node` matches any alternative.
    pub fn matches<D: DomTree + ?Sized>(&self, dom: &D, node: &D::Node) -> bool {
        dom.kind(node) == NodeKind::Element
            && self
                .alternatives
                .iter()
                .any(|complex| match_complex(dom, node, &complex.parts))
    }
}

fn parse_complex(input: &str) -> Result<Complex, &'static str> {
    let mut parts: Vec<(Compound, Combinator)> = Vec::new();
    let mut pending = Combinator::Descendant;
    let normalized = input.replace('>', " > ");
    for token in normalized.split_whitespace() {
        if token == ">" {
            if parts.is_empty() {
                return Err("leading child combinator");
            }
            pending = Combinator::Child;
            continue;
        }
        let compound = parse_compound(token)?;
        parts.push((compound, pending));
        pending = Combinator::Descendant;
    }
    if parts.is_empty() {
        return Err("empty selector");
    }
    // Matching runs right-to-left; each compound already carries the combinator
    // linking it to the compound on its left.
    parts.reverse();
    Ok(Complex { parts })
}

fn parse_compound(token: &str) -> Result<Compound, &'static str> {
    let mut compound = Compound::default();
    let chars: Vec<char> = token.chars().collect();
    let mut i = 0;

    let read_ident = |i: &mut usize| -> String {
        let start = *i;
        while *i < chars.len() && (chars[*i].is_alphanumeric() || chars[*i] == '-' || chars[*i] == '_') {
            *i += 1;
        }
        chars[start..*i].iter().collect()
    };

    if i < chars.len() && chars[i] == '*' {
        i += 1;
    } else if i < chars.len() && chars[i].is_alphabetic() {
        compound.tag = Some(read_ident(&mut i).to_ascii_lowercase());
    }

    while i < chars.len() {
        match chars[i] {
            '.' => {
                i += 1;
                let class = read_ident(&mut i);
                if class.is_empty() {
                    return Err("empty class name");
                }
                compound.classes.push(class);
            }
            '#' => {
                i += 1;
                let id = read_ident(&mut i);
                if id.is_empty() {
                    return Err("empty id");
                }
                compound.id = Some(id);
            }
            '[' => {
                i += 1;
                let name = read_ident(&mut i);
                if name.is_empty() {
                    return Err("empty attribute name");
                }
                let mut value = None;
                if i < chars.len() && chars[i] == '=' {
                    i += 1;
                    let quote = chars.get(i).copied().filter(|c| *c == '"' || *c == '\'');
                    if quote.is_some() {
                        i += 1;
                    }
                    let start = i;
                    while i < chars.len() && Some(chars[i]) != quote && chars[i] != ']' {
                        i += 1;
                    }
                    value = Some(chars[start..i].iter().collect());
                    if quote.is_some() {
                        i += 1;
                    }
                }
                if chars.get(i) != Some(&']') {
                    return Err("unterminated attribute selector");
                }
                i += 1;
                compound.attrs.push(AttrCondition { name, value });
            }
            _ => return Err("unsupported selector syntax"),
        }
    }
    Ok(compound)
}

fn match_compound<D: DomTree + ?Sized>(dom: &D, node: &D::Node, compound: &Compound) -> bool {
    if let Some(tag) = &compound.tag {
        if dom.tag_name(node).as_deref() != Some(tag.as_str()) {
            return false;
        }
    }
    if let Some(id) = &compound.id {
        if dom.attribute(node, "id").as_deref() != Some(id.as_str()) {
            return false;
        }
    }
    if !compound.classes.is_empty() {
        let class_attr = dom.attribute(node, "class").unwrap_or_default();
        let classes: Vec<&str> = class_attr.split_whitespace().collect();
        if !compound.classes.iter().all(|c| classes.contains(&c.as_str())) {
            return false;
        }
    }
    compound.attrs.iter().all(|cond| match (&cond.value, dom.attribute(node, &cond.name)) {
        (_, None) => false,
        (None, Some(_)) => true,
        (Some(expected), Some(actual)) => *expected == actual,
    })
}

fn match_complex<D: DomTree + ?Sized>(
    dom: &D,
    node: &D::Node,
    parts: &[(Compound, Combinator)],
) -> bool {
    let Some(((compound, link), rest)) = parts.split_first() else {
        return true;
    };
    if !match_compound(dom, node, compound) {
        return false;
    }
    if rest.is_empty() {
        return true;
    }
    match link {
        Combinator::Child => dom
            .parent(node)
            .filter(|p| dom.kind(p) == NodeKind::Element)
            .map(|p| match_complex(dom, &p, rest))
            .unwrap_or(false),
        Combinator::Descendant => {
            let mut current = dom.parent(node);
            while let Some(p) = current {
                if dom.kind(&p) == NodeKind::Element && match_complex(dom, &p, rest) {
                    return true;
                }
                current = dom.parent(&p);
            }
            false
        }
    }
}
