//! Resolves the YAML `Parser` list into a `ParserNode` tree. A `type`
//! string maps to a constructor via a lookup table built at config-load
//! time; no reflection at runtime. An `args` reference that does not
//! resolve to a declared `id` is a build error, never a runtime panic.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::config::types::{ArgItem, ParserElementConfig, PadTypeConfig, SignTypeConfig};

use super::model::{
    DecimalIntegerNode, DelimitedNode, ElementValueBranchNode, FirstMatchNode, FixedNode, FixedWordlistNode, FloatNode, OptionalNode,
    PadType, ParserNode, RepeatedNode, SequenceNode, SignType, VariableByteNode,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParserBuildError {
    #[error("no Parser element is marked start: true")]
    MissingStart,
    #[error("more than one Parser element is marked start: true")]
    DuplicateStart,
    #[error("parser '{0}' has unknown type '{1}'")]
    UnknownType(String, String),
    #[error("parser '{0}' references undeclared parser id '{1}'")]
    UnresolvedReference(String, String),
    #[error("parser '{0}' is missing a required argument: {1}")]
    MissingArgument(String, String),
    #[error("parser '{0}' field '{1}' is invalid: {2}")]
    InvalidField(String, String, String),
    #[error("parser id '{0}' is declared more than once")]
    DuplicateId(String),
}

fn map_sign(s: SignTypeConfig) -> SignType {
    match s {
        SignTypeConfig::None => SignType::None,
        SignTypeConfig::Optional => SignType::Optional,
        SignTypeConfig::Mandatory => SignType::Mandatory,
    }
}

fn map_pad(p: PadTypeConfig) -> PadType {
    match p {
        PadTypeConfig::None => PadType::None,
        PadTypeConfig::Zero => PadType::Zero,
        PadTypeConfig::Blank => PadType::Blank,
    }
}

fn first_byte(s: &str, field: &str, id: &str) -> Result<u8, ParserBuildError> {
    s.as_bytes()
        .first()
        .copied()
        .ok_or_else(|| ParserBuildError::InvalidField(id.to_string(), field.to_string(), "must be a single byte".to_string()))
}

/// Builds the full parser tree from the flat `Parser` list, starting at
/// the element flagged `start: true`.
pub fn build_parser_tree(elements: &[ParserElementConfig]) -> Result<ParserNode, ParserBuildError> {
    let mut by_id: HashMap<&str, &ParserElementConfig> = HashMap::new();
    for element in elements {
        if by_id.insert(&element.id, element).is_some() {
            return Err(ParserBuildError::DuplicateId(element.id.clone()));
        }
    }

    let mut start_ids = elements.iter().filter(|e| e.start);
    let start = match start_ids.next() {
        None => return Err(ParserBuildError::MissingStart),
        Some(e) => e,
    };
    if start_ids.next().is_some() {
        return Err(ParserBuildError::DuplicateStart);
    }

    build_node(start.id.as_str(), &by_id)
}

fn resolve<'a>(id: &str, referrer: &str, by_id: &HashMap<&str, &'a ParserElementConfig>) -> Result<&'a ParserElementConfig, ParserBuildError> {
    by_id
        .get(id)
        .copied()
        .ok_or_else(|| ParserBuildError::UnresolvedReference(referrer.to_string(), id.to_string()))
}

fn build_node(id: &str, by_id: &HashMap<&str, &ParserElementConfig>) -> Result<ParserNode, ParserBuildError> {
    let cfg = by_id
        .get(id)
        .copied()
        .ok_or_else(|| ParserBuildError::UnresolvedReference("<root>".to_string(), id.to_string()))?;

    match cfg.parser_type.as_str() {
        "fixed" => {
            let literal = cfg
                .args
                .as_single_str()
                .ok_or_else(|| ParserBuildError::MissingArgument(cfg.id.clone(), "args".to_string()))?;
            Ok(ParserNode::Fixed(FixedNode {
                id: cfg.id.clone(),
                fixed_bytes: literal.as_bytes().to_vec(),
            }))
        }
        "variable_byte" => {
            let alphabet = cfg
                .args
                .as_single_str()
                .ok_or_else(|| ParserBuildError::MissingArgument(cfg.id.clone(), "args".to_string()))?;
            Ok(ParserNode::VariableByte(VariableByteNode {
                id: cfg.id.clone(),
                alphabet: alphabet.as_bytes().to_vec(),
            }))
        }
        "decimal_integer" => Ok(ParserNode::DecimalInteger(DecimalIntegerNode {
            id: cfg.id.clone(),
            value_sign_type: map_sign(cfg.value_sign_type),
            value_pad_type: map_pad(cfg.value_pad_type),
        })),
        "float" => Ok(ParserNode::Float(FloatNode {
            id: cfg.id.clone(),
            value_sign_type: map_sign(cfg.value_sign_type),
            value_pad_type: map_pad(cfg.value_pad_type),
            exponent_type: map_sign(cfg.exponent_type),
        })),
        "datetime" => {
            if cfg.date_formats.is_empty() {
                return Err(ParserBuildError::MissingArgument(cfg.id.clone(), "date_formats".to_string()));
            }
            Ok(ParserNode::new_date_time(
                cfg.id.clone(),
                cfg.date_formats.clone(),
                cfg.start_year,
                cfg.max_time_jump_seconds,
                cfg.timestamp_scale,
            ))
        }
        "fixed_wordlist" => {
            let items = cfg.args.as_list();
            if items.is_empty() {
                return Err(ParserBuildError::MissingArgument(cfg.id.clone(), "args".to_string()));
            }
            let words = items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(|s| s.as_bytes().to_vec())
                        .ok_or_else(|| ParserBuildError::InvalidField(cfg.id.clone(), "args".to_string(), "expected strings".to_string()))
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ParserNode::FixedWordlist(FixedWordlistNode { id: cfg.id.clone(), words }))
        }
        "sequence" => {
            let child_ids = arg_ids(cfg)?;
            let children = child_ids
                .iter()
                .map(|child_id| build_node(child_id, by_id))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ParserNode::Sequence(SequenceNode { id: cfg.id.clone(), children }))
        }
        "first_match" => {
            let child_ids = arg_ids(cfg)?;
            let children = child_ids
                .iter()
                .map(|child_id| build_node(child_id, by_id))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ParserNode::FirstMatch(FirstMatchNode { id: cfg.id.clone(), children }))
        }
        "optional" => {
            let child_id = cfg
                .args
                .as_single_str()
                .ok_or_else(|| ParserBuildError::MissingArgument(cfg.id.clone(), "args".to_string()))?;
            resolve(child_id, &cfg.id, by_id)?;
            let child = build_node(child_id, by_id)?;
            Ok(ParserNode::Optional(OptionalNode { id: cfg.id.clone(), child: Box::new(child) }))
        }
        "repeated" => {
            let child_id = cfg
                .args
                .as_single_str()
                .ok_or_else(|| ParserBuildError::MissingArgument(cfg.id.clone(), "args".to_string()))?;
            resolve(child_id, &cfg.id, by_id)?;
            let child = build_node(child_id, by_id)?;
            Ok(ParserNode::Repeated(RepeatedNode {
                id: cfg.id.clone(),
                child: Box::new(child),
                min_repeat: cfg.min_repeat,
                max_repeat: cfg.max_repeat,
            }))
        }
        "element_value_branch" => {
            let value_id = cfg
                .args
                .as_single_str()
                .ok_or_else(|| ParserBuildError::MissingArgument(cfg.id.clone(), "args".to_string()))?;
            resolve(value_id, &cfg.id, by_id)?;
            let value_node = build_node(value_id, by_id)?;

            let mut branch_model_dict = HashMap::new();
            for (key, child_id) in &cfg.branch_model_dict {
                resolve(child_id, &cfg.id, by_id)?;
                branch_model_dict.insert(key.clone(), build_node(child_id, by_id)?);
            }
            let default_branch = match &cfg.default_branch {
                Some(child_id) => {
                    resolve(child_id, &cfg.id, by_id)?;
                    Some(Box::new(build_node(child_id, by_id)?))
                }
                None => None,
            };
            Ok(ParserNode::ElementValueBranch(ElementValueBranchNode {
                id: cfg.id.clone(),
                value_node: Box::new(value_node),
                branch_model_dict,
                default_branch,
            }))
        }
        "delimited" => {
            let delimiter_str = cfg
                .delimiter
                .as_deref()
                .ok_or_else(|| ParserBuildError::MissingArgument(cfg.id.clone(), "delimiter".to_string()))?;
            let field_delimiter = first_byte(delimiter_str, "delimiter", &cfg.id)?;
            let key_value_delimiter = match &cfg.key_value_delimiter {
                Some(s) => first_byte(s, "key_value_delimiter", &cfg.id)?,
                None => b'=',
            };
            let escape = match &cfg.escape {
                Some(s) if !s.is_empty() => Some(first_byte(s, "escape", &cfg.id)?),
                _ => None,
            };
            let mut key_parser_dict = HashMap::new();
            for (key, child_id) in &cfg.key_parser_dict {
                resolve(child_id, &cfg.id, by_id)?;
                key_parser_dict.insert(key.clone(), build_node(child_id, by_id)?);
            }
            Ok(ParserNode::Delimited(DelimitedNode {
                id: cfg.id.clone(),
                field_delimiter,
                key_value_delimiter,
                escape,
                consume_delimiter: cfg.consume_delimiter,
                key_parser_dict,
                optional_keys: cfg.optional_keys.iter().cloned().collect::<HashSet<_>>(),
                optional_key_prefix: cfg.optional_key_prefix.clone(),
                nullable_key_prefix: cfg.nullable_key_prefix.clone(),
                allow_all_fields: cfg.allow_all_fields,
            }))
        }
        other => Err(ParserBuildError::UnknownType(cfg.id.clone(), other.to_string())),
    }
}

fn arg_ids(cfg: &ParserElementConfig) -> Result<Vec<String>, ParserBuildError> {
    let items = cfg.args.as_list();
    if items.is_empty() {
        return Err(ParserBuildError::MissingArgument(cfg.id.clone(), "args".to_string()));
    }
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(|s| s.to_string())
                .ok_or_else(|| ParserBuildError::InvalidField(cfg.id.clone(), "args".to_string(), "expected parser id strings".to_string()))
        })
        .collect()
}

/// Validates that every `args`/`branch_model_dict`/`key_parser_dict`
/// reference resolves to a declared id, without building the tree (used by
/// `config::parse::validate_config` to collect *all* violations instead of
/// aborting at the first one).
pub fn collect_reference_errors(elements: &[ParserElementConfig], errors: &mut Vec<String>) {
    let declared: HashSet<&str> = elements.iter().map(|e| e.id.as_str()).collect();
    for element in elements {
        let mut check_ref = |referenced: &str| {
            if !declared.contains(referenced) {
                errors.push(format!("parser '{}' references undeclared parser id '{}'", element.id, referenced));
            }
        };
        match element.parser_type.as_str() {
            "sequence" | "first_match" => {
                for item in element.args.as_list() {
                    if let Some(s) = item.as_str() {
                        check_ref(s);
                    }
                }
            }
            "optional" | "repeated" => {
                if let Some(s) = element.args.as_single_str() {
                    check_ref(s);
                }
            }
            "element_value_branch" => {
                if let Some(s) = element.args.as_single_str() {
                    check_ref(s);
                }
                for child_id in element.branch_model_dict.values() {
                    check_ref(child_id);
                }
                if let Some(child_id) = &element.default_branch {
                    check_ref(child_id);
                }
            }
            "delimited" => {
                for child_id in element.key_parser_dict.values() {
                    check_ref(child_id);
                }
            }
            _ => {}
        }
        if !ALL_TYPES.contains(&element.parser_type.as_str()) {
            errors.push(format!("parser '{}' has unknown type '{}'", element.id, element.parser_type));
        }
    }
}

const ALL_TYPES: &[&str] = &[
    "fixed",
    "variable_byte",
    "decimal_integer",
    "float",
    "datetime",
    "fixed_wordlist",
    "sequence",
    "first_match",
    "optional",
    "repeated",
    "element_value_branch",
    "delimited",
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::ArgsValue;

    fn element(id: &str, parser_type: &str, args: ArgsValue) -> ParserElementConfig {
        ParserElementConfig {
            id: id.to_string(),
            start: false,
            parser_type: parser_type.to_string(),
            name: None,
            args,
            branch_model_dict: HashMap::new(),
            default_branch: None,
            date_formats: Vec::new(),
            value_sign_type: SignTypeConfig::None,
            value_pad_type: PadTypeConfig::None,
            exponent_type: SignTypeConfig::None,
            start_year: None,
            delimiter: None,
            key_value_delimiter: None,
            escape: None,
            consume_delimiter: false,
            key_parser_dict: HashMap::new(),
            optional_keys: Vec::new(),
            optional_key_prefix: "optional_key_".to_string(),
            nullable_key_prefix: "+".to_string(),
            strict: false,
            ignore_null: true,
            date_format: None,
            text_locale: None,
            max_time_jump_seconds: 86400,
            timestamp_scale: 1,
            allow_all_fields: false,
            min_repeat: 0,
            max_repeat: None,
        }
    }

    #[test]
    fn builds_sequence_from_start() {
        let mut a = element("a", "fixed", ArgsValue::Single("foo".to_string()));
        let mut root = element("root", "sequence", ArgsValue::List(vec![ArgItem::Str("a".to_string())]));
        root.start = true;
        a.start = false;
        let tree = build_parser_tree(&[root, a]).unwrap();
        let success = tree.parse(b"foo", 0, "").unwrap();
        assert_eq!(success.consumed, 3);
    }

    #[test]
    fn missing_start_is_an_error() {
        let a = element("a", "fixed", ArgsValue::Single("foo".to_string()));
        assert_eq!(build_parser_tree(&[a]), Err(ParserBuildError::MissingStart));
    }

    #[test]
    fn duplicate_start_is_an_error() {
        let mut a = element("a", "fixed", ArgsValue::Single("foo".to_string()));
        let mut b = element("b", "fixed", ArgsValue::Single("bar".to_string()));
        a.start = true;
        b.start = true;
        assert_eq!(build_parser_tree(&[a, b]), Err(ParserBuildError::DuplicateStart));
    }

    #[test]
    fn unresolved_reference_is_an_error() {
        let mut root = element("root", "sequence", ArgsValue::List(vec![ArgItem::Str("missing".to_string())]));
        root.start = true;
        assert_eq!(
            build_parser_tree(&[root]),
            Err(ParserBuildError::UnresolvedReference("root".to_string(), "missing".to_string()))
        );
    }

    #[test]
    fn unknown_type_is_an_error() {
        let mut root = element("root", "not_a_real_type", ArgsValue::None);
        root.start = true;
        assert_eq!(
            build_parser_tree(&[root]),
            Err(ParserBuildError::UnknownType("root".to_string(), "not_a_real_type".to_string()))
        );
    }
}
