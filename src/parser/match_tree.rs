//! Flat path -> value view produced after a Parser Model tree has matched
//! a byte slice. See `model.rs` for the tree that produces these.

use std::collections::HashMap;

/// A decoded value held by a Match Element.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedValue {
    Bytes(Vec<u8>),
    Integer(i64),
    Float(f64),
    /// Seconds since the Unix epoch, fractional part preserved.
    Timestamp(f64),
    /// Children produced by a composite parser node, in match order.
    List(Vec<MatchElement>),
    /// Produced only by an Optional node whose child did not match.
    Absent,
}

impl DecodedValue {
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            DecodedValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            DecodedValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            DecodedValue::Float(f) => Some(*f),
            DecodedValue::Timestamp(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<f64> {
        match self {
            DecodedValue::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    /// A loose numeric coercion used by detectors that compare across
    /// integer, float and timestamp paths alike.
    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            DecodedValue::Integer(i) => Some(*i as f64),
            DecodedValue::Float(f) => Some(*f),
            DecodedValue::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    /// Render as the original Python bindings would for display/allowlist
    /// purposes: bytes decode as UTF-8 lossily, everything else formats
    /// with its natural Display.
    pub fn display_string(&self) -> String {
        match self {
            DecodedValue::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
            DecodedValue::Integer(i) => i.to_string(),
            DecodedValue::Float(f) => f.to_string(),
            DecodedValue::Timestamp(t) => t.to_string(),
            DecodedValue::List(_) => String::new(),
            DecodedValue::Absent => String::new(),
        }
    }
}

/// One matched element: the slice of input a parser node consumed, the
/// path it was wired into the Match Tree under, and its decoded value.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchElement {
    /// Slash-separated, rooted at the root parser's element_id.
    pub path: String,
    /// The id of the parser node that produced this element.
    pub parser_element_id: String,
    /// The exact bytes this element consumed from the input.
    pub matched_bytes: Vec<u8>,
    pub value: DecodedValue,
}

impl MatchElement {
    pub fn new(path: String, parser_element_id: String, matched_bytes: Vec<u8>, value: DecodedValue) -> Self {
        MatchElement {
            path,
            parser_element_id,
            matched_bytes,
            value,
        }
    }
}

/// A path maps to a single element unless the parser that produced it is
/// repetition-capable (Repeated, or any node nested beneath one), in which
/// case every repetition lands under the same path and the entry upgrades
/// to a list.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchValue {
    Single(MatchElement),
    List(Vec<MatchElement>),
}

impl MatchValue {
    pub fn first(&self) -> &MatchElement {
        match self {
            MatchValue::Single(e) => e,
            MatchValue::List(v) => &v[0],
        }
    }

    pub fn iter(&self) -> Box<dyn Iterator<Item = &MatchElement> + '_> {
        match self {
            MatchValue::Single(e) => Box::new(std::iter::once(e)),
            MatchValue::List(v) => Box::new(v.iter()),
        }
    }
}

/// Flat path -> Match Element(s) view, insertion ordered so traversal
/// matches the order the parser visited paths in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchTree {
    order: Vec<String>,
    map: HashMap<String, MatchValue>,
}

impl MatchTree {
    pub fn new() -> Self {
        MatchTree::default()
    }

    /// Build a flat tree by walking a nested Match Element produced by a
    /// parser root, depth-first, in match order.
    pub fn from_root(root: &MatchElement) -> Self {
        let mut tree = MatchTree::new();
        tree.insert_recursive(root);
        tree
    }

    fn insert_recursive(&mut self, element: &MatchElement) {
        self.insert(element.path.clone(), element.clone());
        if let DecodedValue::List(children) = &element.value {
            for child in children {
                self.insert_recursive(child);
            }
        }
    }

    fn insert(&mut self, path: String, element: MatchElement) {
        match self.map.get_mut(&path) {
            None => {
                self.order.push(path.clone());
                self.map.insert(path, MatchValue::Single(element));
            }
            Some(MatchValue::Single(existing)) => {
                let existing = existing.clone();
                self.map.insert(path, MatchValue::List(vec![existing, element]));
            }
            Some(MatchValue::List(list)) => {
                list.push(element);
            }
        }
    }

    pub fn get(&self, path: &str) -> Option<&MatchValue> {
        self.map.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.map.contains_key(path)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
