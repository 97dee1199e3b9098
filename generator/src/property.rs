// property.rs — Annotation property micro-parser
//
// Parses the payload of an annotation attribute attached to a reflected
// entity. The payload has a fixed positional format that maps to simple
// string operations, so this is a hand-rolled scanner rather than a grammar:
//
//     <EntityKindTag>:<Prop>[, <Prop>...]
//     <Prop> = <name> | <name>(<arg>[, <arg>...])
//
// Arguments may contain nested parentheses and double-quoted strings;
// commas split arguments only at depth zero outside quotes.

use std::fmt;

use serde::{Deserialize, Serialize};

// ── Data types ──────────────────────────────────────────────────────────────

/// A single user-supplied property, e.g. `Serializable` or `Range(0, 10)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub arguments: Vec<String>,
}

impl Property {
    pub fn simple(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: Vec::new(),
        }
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.arguments.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}({})", self.name, self.arguments.join(", "))
        }
    }
}

/// Failure while scanning an annotation payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyError {
    /// The payload's kind tag does not match the entity kind being parsed.
    KindMismatch { expected: String, found: String },
    /// The payload has no `:` separator at all.
    MissingKindTag,
    /// Unbalanced parentheses or an unterminated string in an argument list.
    Malformed { at: usize, message: String },
}

impl fmt::Display for PropertyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyError::KindMismatch { expected, found } => {
                write!(
                    f,
                    "annotation kind tag '{}' does not match entity kind '{}'",
                    found, expected
                )
            }
            PropertyError::MissingKindTag => {
                write!(f, "annotation payload has no kind tag")
            }
            PropertyError::Malformed { at, message } => {
                write!(f, "malformed property list at offset {}: {}", at, message)
            }
        }
    }
}

impl std::error::Error for PropertyError {}

// ── Scanner ─────────────────────────────────────────────────────────────────

/// Parse an annotation payload for an entity of kind `expected_tag`.
///
/// Returns the property list, or an error when the tag mismatches or the
/// list is malformed. A `KindMismatch` is not fatal to the caller: it means
/// the annotation targets a different entity kind and should be skipped.
pub fn parse_properties(
    payload: &str,
    expected_tag: &str,
) -> Result<Vec<Property>, PropertyError> {
    let colon = payload.find(':').ok_or(PropertyError::MissingKindTag)?;
    let tag = payload[..colon].trim();
    if tag != expected_tag {
        return Err(PropertyError::KindMismatch {
            expected: expected_tag.to_string(),
            found: tag.to_string(),
        });
    }

    let body = &payload[colon + 1..];
    let mut properties = Vec::new();

    for (offset, item) in split_top_level(body, colon + 1)? {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        properties.push(parse_one_property(item, offset)?);
    }

    Ok(properties)
}

/// Split `body` on commas at parenthesis depth zero, outside strings.
/// Returns each piece with its byte offset into the original payload.
fn split_top_level(
    body: &str,
    base_offset: usize,
) -> Result<Vec<(usize, String)>, PropertyError> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut current_start = 0usize;
    let mut depth = 0i32;
    let mut in_string = false;
    let bytes = body.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i] as char;
        match c {
            '"' if !in_string => {
                in_string = true;
                current.push(c);
            }
            '"' if in_string => {
                in_string = false;
                current.push(c);
            }
            '\\' if in_string && i + 1 < bytes.len() => {
                current.push(c);
                current.push(bytes[i + 1] as char);
                i += 1;
            }
            '(' if !in_string => {
                depth += 1;
                current.push(c);
            }
            ')' if !in_string => {
                depth -= 1;
                if depth < 0 {
                    return Err(PropertyError::Malformed {
                        at: base_offset + i,
                        message: "unmatched ')'".to_string(),
                    });
                }
                current.push(c);
            }
            ',' if !in_string && depth == 0 => {
                pieces.push((base_offset + current_start, std::mem::take(&mut current)));
                current_start = i + 1;
            }
            _ => current.push(c),
        }
        i += 1;
    }

    if in_string {
        return Err(PropertyError::Malformed {
            at: base_offset + bytes.len(),
            message: "unterminated string literal".to_string(),
        });
    }
    if depth != 0 {
        return Err(PropertyError::Malformed {
            at: base_offset + bytes.len(),
            message: "unbalanced parentheses".to_string(),
        });
    }

    pieces.push((base_offset + current_start, current));
    Ok(pieces)
}

fn parse_one_property(item: &str, offset: usize) -> Result<Property, PropertyError> {
    match item.find('(') {
        None => Ok(Property::simple(item)),
        Some(open) => {
            if !item.ends_with(')') {
                return Err(PropertyError::Malformed {
                    at: offset,
                    message: format!("property '{}' has an unclosed argument list", item),
                });
            }
            let name = item[..open].trim().to_string();
            let inner = &item[open + 1..item.len() - 1];
            let arguments = split_top_level(inner, offset + open + 1)?
                .into_iter()
                .map(|(_, a)| a.trim().to_string())
                .filter(|a| !a.is_empty())
                .collect();
            Ok(Property { name, arguments })
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
