//! The Parser Model: a tagged sum type tree of parser nodes. Each node
//! owns its children outright (the tree is built once at config-load time
//! and never mutated), and `parse` is the single entry point every
//! variant implements. A parser that does not match its input is not an
//! error, it is simply `None` — only malformed configuration is an error.

use std::cell::Cell;
use std::collections::{HashMap, HashSet};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::match_tree::{DecodedValue, MatchElement};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SignType {
    #[default]
    None,
    Optional,
    Mandatory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PadType {
    #[default]
    None,
    Zero,
    Blank,
}

/// Result of a successful parse: how many bytes were consumed from the
/// offset the caller passed in, and the Match Element produced.
pub struct ParseSuccess {
    pub consumed: usize,
    pub element: MatchElement,
}

fn own_path(parent_path: &str, element_id: &str) -> String {
    if parent_path.is_empty() {
        element_id.to_string()
    } else {
        format!("{}/{}", parent_path, element_id)
    }
}

#[derive(Debug, Clone)]
pub struct FixedNode {
    pub id: String,
    pub fixed_bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct VariableByteNode {
    pub id: String,
    pub alphabet: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct DecimalIntegerNode {
    pub id: String,
    pub value_sign_type: SignType,
    pub value_pad_type: PadType,
}

#[derive(Debug, Clone)]
pub struct FloatNode {
    pub id: String,
    pub value_sign_type: SignType,
    pub value_pad_type: PadType,
    pub exponent_type: SignType,
}

/// Tracks the last accepted timestamp per parser instance so
/// `max_time_jump_seconds` can be enforced without a shared clock.
#[derive(Debug)]
pub struct DateTimeNode {
    pub id: String,
    pub date_formats: Vec<String>,
    pub start_year: Option<i32>,
    pub max_time_jump_seconds: i64,
    pub timestamp_scale: i64,
    last_accepted: Cell<Option<f64>>,
}

#[derive(Debug, Clone)]
pub struct FixedWordlistNode {
    pub id: String,
    pub words: Vec<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct SequenceNode {
    pub id: String,
    pub children: Vec<ParserNode>,
}

#[derive(Debug, Clone)]
pub struct FirstMatchNode {
    pub id: String,
    pub children: Vec<ParserNode>,
}

#[derive(Debug, Clone)]
pub struct OptionalNode {
    pub id: String,
    pub child: Box<ParserNode>,
}

#[derive(Debug, Clone)]
pub struct RepeatedNode {
    pub id: String,
    pub child: Box<ParserNode>,
    pub min_repeat: usize,
    pub max_repeat: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct ElementValueBranchNode {
    pub id: String,
    pub value_node: Box<ParserNode>,
    pub branch_model_dict: HashMap<String, ParserNode>,
    pub default_branch: Option<Box<ParserNode>>,
}

#[derive(Debug, Clone)]
pub struct DelimitedNode {
    pub id: String,
    pub field_delimiter: u8,
    pub key_value_delimiter: u8,
    pub escape: Option<u8>,
    pub consume_delimiter: bool,
    pub key_parser_dict: HashMap<String, ParserNode>,
    pub optional_keys: std::collections::HashSet<String>,
    pub optional_key_prefix: String,
    pub nullable_key_prefix: String,
    pub allow_all_fields: bool,
}

#[derive(Debug, Clone)]
pub enum ParserNode {
    Fixed(FixedNode),
    VariableByte(VariableByteNode),
    DecimalInteger(DecimalIntegerNode),
    Float(FloatNode),
    DateTime(std::rc::Rc<DateTimeNode>),
    FixedWordlist(FixedWordlistNode),
    Sequence(SequenceNode),
    FirstMatch(FirstMatchNode),
    Optional(OptionalNode),
    Repeated(RepeatedNode),
    ElementValueBranch(ElementValueBranchNode),
    Delimited(DelimitedNode),
}

impl ParserNode {
    pub fn id(&self) -> &str {
        match self {
            ParserNode::Fixed(n) => &n.id,
            ParserNode::VariableByte(n) => &n.id,
            ParserNode::DecimalInteger(n) => &n.id,
            ParserNode::Float(n) => &n.id,
            ParserNode::DateTime(n) => &n.id,
            ParserNode::FixedWordlist(n) => &n.id,
            ParserNode::Sequence(n) => &n.id,
            ParserNode::FirstMatch(n) => &n.id,
            ParserNode::Optional(n) => &n.id,
            ParserNode::Repeated(n) => &n.id,
            ParserNode::ElementValueBranch(n) => &n.id,
            ParserNode::Delimited(n) => &n.id,
        }
    }

    pub fn new_date_time(
        id: String,
        date_formats: Vec<String>,
        start_year: Option<i32>,
        max_time_jump_seconds: i64,
        timestamp_scale: i64,
    ) -> ParserNode {
        ParserNode::DateTime(std::rc::Rc::new(DateTimeNode {
            id,
            date_formats,
            start_year,
            max_time_jump_seconds,
            timestamp_scale,
            last_accepted: Cell::new(None),
        }))
    }

    /// Attempt to match `data[offset..]`. `parent_path` is the path of the
    /// enclosing node (empty for the root). Returns `None` on a plain
    /// mismatch; this is normal control flow, not an error.
    pub fn parse(&self, data: &[u8], offset: usize, parent_path: &str) -> Option<ParseSuccess> {
        match self {
            ParserNode::Fixed(n) => parse_fixed(n, data, offset, parent_path),
            ParserNode::VariableByte(n) => parse_variable_byte(n, data, offset, parent_path),
            ParserNode::DecimalInteger(n) => parse_decimal_integer(n, data, offset, parent_path),
            ParserNode::Float(n) => parse_float(n, data, offset, parent_path),
            ParserNode::DateTime(n) => parse_date_time(n, data, offset, parent_path),
            ParserNode::FixedWordlist(n) => parse_fixed_wordlist(n, data, offset, parent_path),
            ParserNode::Sequence(n) => parse_sequence(n, data, offset, parent_path),
            ParserNode::FirstMatch(n) => parse_first_match(n, data, offset, parent_path),
            ParserNode::Optional(n) => parse_optional(n, data, offset, parent_path),
            ParserNode::Repeated(n) => parse_repeated(n, data, offset, parent_path),
            ParserNode::ElementValueBranch(n) => parse_element_value_branch(n, data, offset, parent_path),
            ParserNode::Delimited(n) => parse_delimited(n, data, offset, parent_path),
        }
    }
}

fn parse_fixed(n: &FixedNode, data: &[u8], offset: usize, parent_path: &str) -> Option<ParseSuccess> {
    let end = offset.checked_add(n.fixed_bytes.len())?;
    if end > data.len() || &data[offset..end] != n.fixed_bytes.as_slice() {
        return None;
    }
    let path = own_path(parent_path, &n.id);
    Some(ParseSuccess {
        consumed: n.fixed_bytes.len(),
        element: MatchElement::new(path, n.id.clone(), n.fixed_bytes.clone(), DecodedValue::Bytes(n.fixed_bytes.clone())),
    })
}

fn parse_variable_byte(n: &VariableByteNode, data: &[u8], offset: usize, parent_path: &str) -> Option<ParseSuccess> {
    let mut end = offset;
    while end < data.len() && n.alphabet.contains(&data[end]) {
        end += 1;
    }
    if end == offset {
        return None;
    }
    let bytes = data[offset..end].to_vec();
    let path = own_path(parent_path, &n.id);
    Some(ParseSuccess {
        consumed: end - offset,
        element: MatchElement::new(path, n.id.clone(), bytes.clone(), DecodedValue::Bytes(bytes)),
    })
}

fn scan_sign(data: &[u8], offset: usize, sign_type: SignType) -> (usize, i64) {
    match sign_type {
        SignType::None => (offset, 1),
        SignType::Optional | SignType::Mandatory => match data.get(offset) {
            Some(b'-') => (offset + 1, -1),
            Some(b'+') => (offset + 1, 1),
            _ => (offset, 1),
        },
    }
}

fn scan_padding(data: &[u8], mut offset: usize, pad_type: PadType) -> usize {
    let pad_byte = match pad_type {
        PadType::None => return offset,
        PadType::Zero => b'0',
        PadType::Blank => b' ',
    };
    while data.get(offset) == Some(&pad_byte) {
        offset += 1;
    }
    offset
}

fn parse_decimal_integer(n: &DecimalIntegerNode, data: &[u8], offset: usize, parent_path: &str) -> Option<ParseSuccess> {
    let start = offset;
    let (mut cur, sign) = scan_sign(data, offset, n.value_sign_type);
    if n.value_sign_type == SignType::Mandatory && cur == offset {
        return None;
    }
    cur = scan_padding(data, cur, n.value_pad_type);
    let digits_start = cur;
    while data.get(cur).is_some_and(u8::is_ascii_digit) {
        cur += 1;
    }
    if cur == digits_start {
        return None;
    }
    let digits = std::str::from_utf8(&data[digits_start..cur]).ok()?;
    let magnitude: i64 = digits.parse().ok()?;
    let value = magnitude * sign;
    let path = own_path(parent_path, &n.id);
    let matched = data[start..cur].to_vec();
    Some(ParseSuccess {
        consumed: cur - start,
        element: MatchElement::new(path, n.id.clone(), matched, DecodedValue::Integer(value)),
    })
}

fn parse_float(n: &FloatNode, data: &[u8], offset: usize, parent_path: &str) -> Option<ParseSuccess> {
    let start = offset;
    let (mut cur, _sign) = scan_sign(data, offset, n.value_sign_type);
    if n.value_sign_type == SignType::Mandatory && cur == offset {
        return None;
    }
    cur = scan_padding(data, cur, n.value_pad_type);
    let int_start = cur;
    while data.get(cur).is_some_and(u8::is_ascii_digit) {
        cur += 1;
    }
    if cur == int_start {
        return None;
    }
    if data.get(cur) == Some(&b'.') {
        cur += 1;
        let frac_start = cur;
        while data.get(cur).is_some_and(u8::is_ascii_digit) {
            cur += 1;
        }
        if cur == frac_start {
            return None;
        }
    }
    if matches!(n.exponent_type, SignType::Optional | SignType::Mandatory)
        && matches!(data.get(cur), Some(b'e') | Some(b'E'))
    {
        let mut exp_cur = cur + 1;
        let (after_sign, _) = scan_sign(data, exp_cur, SignType::Optional);
        exp_cur = after_sign;
        let exp_digits_start = exp_cur;
        while data.get(exp_cur).is_some_and(u8::is_ascii_digit) {
            exp_cur += 1;
        }
        if exp_cur > exp_digits_start {
            cur = exp_cur;
        }
    }
    let text = std::str::from_utf8(&data[start..cur]).ok()?;
    let value: f64 = text.parse().ok()?;
    let path = own_path(parent_path, &n.id);
    let matched = data[start..cur].to_vec();
    Some(ParseSuccess {
        consumed: cur - start,
        element: MatchElement::new(path, n.id.clone(), matched, DecodedValue::Float(value)),
    })
}

fn parse_date_time(n: &DateTimeNode, data: &[u8], offset: usize, parent_path: &str) -> Option<ParseSuccess> {
    let remainder = std::str::from_utf8(&data[offset..]).ok()?;
    for format in &n.date_formats {
        if let Ok((parsed, rest)) = NaiveDateTime::parse_and_remainder(remainder, format) {
            let consumed = remainder.len() - rest.len();
            let seconds = parsed.and_utc().timestamp() as f64
                + parsed.and_utc().timestamp_subsec_nanos() as f64 / 1e9;
            let seconds = seconds / n.timestamp_scale.max(1) as f64;

            if n.max_time_jump_seconds > 0 {
                if let Some(last) = n.last_accepted.get() {
                    if (seconds - last).abs() > n.max_time_jump_seconds as f64 {
                        continue;
                    }
                }
            }
            n.last_accepted.set(Some(seconds));

            let path = own_path(parent_path, &n.id);
            let matched = data[offset..offset + consumed].to_vec();
            return Some(ParseSuccess {
                consumed,
                element: MatchElement::new(path, n.id.clone(), matched, DecodedValue::Timestamp(seconds)),
            });
        }
    }
    None
}

fn parse_fixed_wordlist(n: &FixedWordlistNode, data: &[u8], offset: usize, parent_path: &str) -> Option<ParseSuccess> {
    let remaining = &data[offset..];
    let best = n
        .words
        .iter()
        .filter(|w| remaining.starts_with(w.as_slice()))
        .max_by_key(|w| w.len())?;
    let path = own_path(parent_path, &n.id);
    Some(ParseSuccess {
        consumed: best.len(),
        element: MatchElement::new(path, n.id.clone(), best.clone(), DecodedValue::Bytes(best.clone())),
    })
}

fn parse_sequence(n: &SequenceNode, data: &[u8], offset: usize, parent_path: &str) -> Option<ParseSuccess> {
    let path = own_path(parent_path, &n.id);
    let mut cur = offset;
    let mut children = Vec::with_capacity(n.children.len());
    for child in &n.children {
        let success = child.parse(data, cur, &path)?;
        cur += success.consumed;
        children.push(success.element);
    }
    let matched = data[offset..cur].to_vec();
    Some(ParseSuccess {
        consumed: cur - offset,
        element: MatchElement::new(path, n.id.clone(), matched, DecodedValue::List(children)),
    })
}

fn parse_first_match(n: &FirstMatchNode, data: &[u8], offset: usize, parent_path: &str) -> Option<ParseSuccess> {
    let path = own_path(parent_path, &n.id);
    for child in &n.children {
        if let Some(success) = child.parse(data, offset, &path) {
            let matched = data[offset..offset + success.consumed].to_vec();
            return Some(ParseSuccess {
                consumed: success.consumed,
                element: MatchElement::new(path, n.id.clone(), matched, DecodedValue::List(vec![success.element])),
            });
        }
    }
    None
}

fn parse_optional(n: &OptionalNode, data: &[u8], offset: usize, parent_path: &str) -> Option<ParseSuccess> {
    let path = own_path(parent_path, &n.id);
    match n.child.parse(data, offset, &path) {
        Some(success) => {
            let matched = data[offset..offset + success.consumed].to_vec();
            Some(ParseSuccess {
                consumed: success.consumed,
                element: MatchElement::new(path, n.id.clone(), matched, DecodedValue::List(vec![success.element])),
            })
        }
        None => Some(ParseSuccess {
            consumed: 0,
            element: MatchElement::new(path, n.id.clone(), Vec::new(), DecodedValue::Absent),
        }),
    }
}

fn parse_repeated(n: &RepeatedNode, data: &[u8], offset: usize, parent_path: &str) -> Option<ParseSuccess> {
    let path = own_path(parent_path, &n.id);
    let mut cur = offset;
    let mut children = Vec::new();
    loop {
        if let Some(max) = n.max_repeat {
            if children.len() >= max {
                break;
            }
        }
        match n.child.parse(data, cur, &path) {
            Some(success) if success.consumed > 0 || children.is_empty() => {
                cur += success.consumed;
                let zero_width = success.consumed == 0;
                children.push(success.element);
                if zero_width {
                    break;
                }
            }
            _ => break,
        }
    }
    if children.len() < n.min_repeat {
        return None;
    }
    let matched = data[offset..cur].to_vec();
    Some(ParseSuccess {
        consumed: cur - offset,
        element: MatchElement::new(path, n.id.clone(), matched, DecodedValue::List(children)),
    })
}

fn parse_element_value_branch(n: &ElementValueBranchNode, data: &[u8], offset: usize, parent_path: &str) -> Option<ParseSuccess> {
    let path = own_path(parent_path, &n.id);
    let value_success = n.value_node.parse(data, offset, &path)?;
    let branch_offset = offset + value_success.consumed;
    let key = value_success.element.value.display_string();

    let branch_node = n.branch_model_dict.get(&key).or(n.default_branch.as_deref());
    let branch_node = branch_node?;
    let branch_success = branch_node.parse(data, branch_offset, &path)?;

    let consumed = value_success.consumed + branch_success.consumed;
    let matched = data[offset..offset + consumed].to_vec();
    Some(ParseSuccess {
        consumed,
        element: MatchElement::new(
            path,
            n.id.clone(),
            matched,
            DecodedValue::List(vec![value_success.element, branch_success.element]),
        ),
    })
}

fn find_unescaped(data: &[u8], start: usize, delimiter: u8, escape: Option<u8>) -> Option<usize> {
    let mut i = start;
    while i < data.len() {
        if let Some(esc) = escape {
            if data[i] == esc {
                i += 2;
                continue;
            }
        }
        if data[i] == delimiter {
            return Some(i);
        }
        i += 1;
    }
    None
}

fn key_for(field_key: &str, n: &DelimitedNode) -> Option<(&str, bool, bool)> {
    let (stripped, nullable) = match field_key.strip_prefix(n.nullable_key_prefix.as_str()) {
        Some(s) => (s, true),
        None => (field_key, false),
    };
    let (stripped, optional) = match stripped.strip_prefix(n.optional_key_prefix.as_str()) {
        Some(s) => (s, true),
        None => (stripped, false),
    };
    n.key_parser_dict
        .keys()
        .find(|k| k.as_str() == stripped)
        .map(|k| (k.as_str(), optional, nullable))
}

fn parse_delimited(n: &DelimitedNode, data: &[u8], offset: usize, parent_path: &str) -> Option<ParseSuccess> {
    let path = own_path(parent_path, &n.id);
    let mut cur = offset;
    let mut children = Vec::new();
    let mut seen_keys: std::collections::HashSet<String> = std::collections::HashSet::new();

    loop {
        let field_end = find_unescaped(data, cur, n.field_delimiter, n.escape).unwrap_or(data.len());
        let field = &data[cur..field_end];
        if field.is_empty() && field_end == data.len() {
            break;
        }
        let kv_split = find_unescaped(field, 0, n.key_value_delimiter, n.escape);
        let (key_bytes, val_bytes) = match kv_split {
            Some(i) => (&field[..i], &field[i + 1..]),
            None => (field, &field[0..0]),
        };
        let key_str = String::from_utf8_lossy(key_bytes).into_owned();

        match key_for(&key_str, n) {
            Some((resolved_key, _optional, nullable)) => {
                seen_keys.insert(resolved_key.to_string());
                let sub_parser = &n.key_parser_dict[resolved_key];
                if val_bytes.is_empty() && nullable {
                    // nullable key present but empty: contributes no child element
                } else {
                    let sub_success = sub_parser.parse(val_bytes, 0, &path)?;
                    if sub_success.consumed != val_bytes.len() {
                        return None;
                    }
                    children.push(sub_success.element);
                }
            }
            None if n.allow_all_fields => {
                let value_path = format!("{}/{}", path, key_str);
                children.push(MatchElement::new(
                    value_path,
                    key_str.clone(),
                    val_bytes.to_vec(),
                    DecodedValue::Bytes(val_bytes.to_vec()),
                ));
            }
            None => return None,
        }

        cur = field_end;
        if cur >= data.len() {
            break;
        }
        cur += 1; // skip the field delimiter
    }

    for key in n.key_parser_dict.keys() {
        if !n.optional_keys.contains(key) && !seen_keys.contains(key) {
            return None;
        }
    }

    let consumed = if n.consume_delimiter {
        cur.saturating_sub(offset)
    } else {
        cur.saturating_sub(offset).min(data.len() - offset)
    };
    let matched = data[offset..offset + consumed].to_vec();
    Some(ParseSuccess {
        consumed,
        element: MatchElement::new(path, n.id.clone(), matched, DecodedValue::List(children)),
    })
}
