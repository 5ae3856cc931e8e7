//! Builds a [`SyntaxDefinition`] from an already-decoded grammar document.
//!
//! The document shape mirrors `.sublime-syntax`: a top-level mapping with
//! `name`/`file_extensions`/`scope`/`variables`/`first_line_match`/`contexts`
//! keys, where each entry of `contexts` is a sequence of tagged items (see
//! the module docs on [`super::syntax_definition`] for the resulting model).
//! This module is the only place in the crate that knows about that raw
//! document shape; everything downstream works with [`Context`]/[`Pattern`]/
//! [`MatchOperation`] values. Loading the document itself (from YAML, JSON on
//! disk, or anywhere else) is the caller's job, not this crate's.

use std::collections::HashMap;

use serde_json::{Map, Value};

use super::errors::ParseSyntaxError;
use super::expand::expand_template;
use super::scope::Scope;
use super::syntax_definition::{
    CaptureMapping, ClearAmount, Context, ContextReference, MatchOperation, MatchPattern, Pattern,
    SyntaxDefinition,
};

impl SyntaxDefinition {
    /// Builds a grammar from an already-decoded document (e.g. the result of
    /// parsing a `.sublime-syntax` file's YAML, or an equivalent JSON
    /// document, with some other crate).
    pub fn load_from_value(value: &Value) -> Result<SyntaxDefinition, ParseSyntaxError> {
        let map = value.as_object().ok_or(ParseSyntaxError::TypeMismatch)?;

        let name = get_str(map, "name")?.to_owned();
        let file_extensions = match map.get("file_extensions") {
            Some(v) => string_seq(v)?,
            None => Vec::new(),
        };
        let scope = match map.get("scope") {
            Some(v) => Scope::new(as_str(v)?)?,
            None => Scope::new("")?,
        };
        let hidden = map.get("hidden").and_then(Value::as_bool).unwrap_or(false);
        let variables = match map.get("variables") {
            Some(v) => {
                let obj = v.as_object().ok_or(ParseSyntaxError::TypeMismatch)?;
                obj.iter()
                    .map(|(k, v)| Ok((k.clone(), as_str(v)?.to_owned())))
                    .collect::<Result<HashMap<_, _>, ParseSyntaxError>>()?
            }
            None => HashMap::new(),
        };
        let first_line_match = match map.get("first_line_match") {
            Some(Value::Null) | None => None,
            Some(v) => Some(expand_template(as_str(v)?, &variables)?),
        };

        let contexts_value = map
            .get("contexts")
            .ok_or(ParseSyntaxError::MissingMandatoryKey("contexts"))?
            .as_object()
            .ok_or(ParseSyntaxError::TypeMismatch)?;
        if contexts_value.is_empty() {
            return Err(ParseSyntaxError::EmptyGrammar);
        }

        let mut contexts = HashMap::with_capacity(contexts_value.len());
        for (ctx_name, items) in contexts_value.iter() {
            let items = items.as_array().ok_or(ParseSyntaxError::TypeMismatch)?;
            let mut context = build_context(items, &variables)?;
            if ctx_name == "prototype" {
                context.meta_include_prototype = false;
            }
            contexts.insert(ctx_name.clone(), context);
        }
        if !contexts.contains_key("main") {
            return Err(ParseSyntaxError::MainMissing);
        }

        Ok(SyntaxDefinition {
            name,
            file_extensions,
            scope,
            first_line_match,
            hidden,
            variables,
            contexts,
        })
    }
}

fn get_str<'a>(map: &'a Map<String, Value>, key: &'static str) -> Result<&'a str, ParseSyntaxError> {
    as_str(map.get(key).ok_or(ParseSyntaxError::MissingMandatoryKey(key))?)
}

fn as_str(value: &Value) -> Result<&str, ParseSyntaxError> {
    value.as_str().ok_or(ParseSyntaxError::TypeMismatch)
}

fn string_seq(value: &Value) -> Result<Vec<String>, ParseSyntaxError> {
    value
        .as_array()
        .ok_or(ParseSyntaxError::TypeMismatch)?
        .iter()
        .map(|x| as_str(x).map(str::to_owned))
        .collect()
}

/// Builds one [`Context`] from its list of raw items, dispatching on which
/// key each item carries: `meta_scope`/`meta_content_scope`/
/// `meta_include_prototype`/`clear_scopes` set a field on the context being
/// built, `include` appends an [`Pattern::Include`], and `match` appends a
/// [`Pattern::Match`]. An item shaped like none of these is a grammar error.
fn build_context(items: &[Value], variables: &HashMap<String, String>) -> Result<Context, ParseSyntaxError> {
    let mut context = Context::new(true);
    for item in items {
        let item = item.as_object().ok_or(ParseSyntaxError::TypeMismatch)?;
        if let Some(v) = item.get("meta_scope") {
            context.meta_scope = str_to_scopes(as_str(v)?)?;
        } else if let Some(v) = item.get("meta_content_scope") {
            context.meta_content_scope = str_to_scopes(as_str(v)?)?;
        } else if let Some(v) = item.get("meta_include_prototype") {
            context.meta_include_prototype = v.as_bool().ok_or(ParseSyntaxError::TypeMismatch)?;
        } else if let Some(v) = item.get("clear_scopes") {
            context.clear_scopes = Some(parse_clear_scopes(v)?);
        } else if let Some(v) = item.get("include") {
            let name = as_str(v)?.to_owned();
            context
                .patterns
                .push(Pattern::Include(ContextReference::Named(name)));
        } else if item.contains_key("match") {
            context
                .patterns
                .push(Pattern::Match(build_match_pattern(item, variables)?));
        } else {
            return Err(ParseSyntaxError::TypeMismatch);
        }
    }
    Ok(context)
}

/// Derives a [`MatchPattern`]'s action with the precedence `pop > set >
/// push`: a document that sets more than one of these keys on a single item
/// is ambiguous, so the first one checked here wins, matching observed
/// source behavior.
fn build_match_pattern(
    item: &Map<String, Value>,
    variables: &HashMap<String, String>,
) -> Result<MatchPattern, ParseSyntaxError> {
    let raw_regex = get_str(item, "match")?;
    let regex_str = expand_template(raw_regex, variables)?;

    let scope = match item.get("scope") {
        Some(v) => str_to_scopes(as_str(v)?)?,
        None => Vec::new(),
    };

    let captures: Option<CaptureMapping> = match item.get("captures") {
        Some(v) => {
            let obj = v.as_object().ok_or(ParseSyntaxError::TypeMismatch)?;
            let mut mapping = obj
                .iter()
                .map(|(k, v)| {
                    let index: usize = k.parse().map_err(|_| ParseSyntaxError::TypeMismatch)?;
                    Ok((index, str_to_scopes(as_str(v)?)?))
                })
                .collect::<Result<Vec<_>, ParseSyntaxError>>()?;
            mapping.sort_by_key(|&(i, _)| i);
            Some(mapping)
        }
        None => None,
    };

    let operation = if item.get("pop").and_then(Value::as_bool) == Some(true) {
        MatchOperation::Pop
    } else if let Some(v) = item.get("set") {
        MatchOperation::Set(build_target(v, variables)?)
    } else if let Some(v) = item.get("push") {
        MatchOperation::Push(build_target(v, variables)?)
    } else {
        MatchOperation::None
    };

    let has_captures = captures.is_some();
    Ok(MatchPattern::new(has_captures, regex_str, scope, captures, operation))
}

/// A `push`/`set` target is either a context name (late-bound) or a sequence
/// of items, which becomes one anonymous inline context built by the exact
/// same rules as a named one.
fn build_target(
    value: &Value,
    variables: &HashMap<String, String>,
) -> Result<ContextReference, ParseSyntaxError> {
    match value {
        Value::String(name) => Ok(ContextReference::Named(name.clone())),
        Value::Array(items) => Ok(ContextReference::Inline(Box::new(build_context(
            items, variables,
        )?))),
        _ => Err(ParseSyntaxError::TypeMismatch),
    }
}

fn parse_clear_scopes(value: &Value) -> Result<ClearAmount, ParseSyntaxError> {
    match value {
        Value::Bool(true) => Ok(ClearAmount::All),
        Value::Bool(false) => Ok(ClearAmount::TopN(0)),
        Value::Number(n) => {
            let i = n.as_u64().ok_or(ParseSyntaxError::TypeMismatch)?;
            Ok(ClearAmount::TopN(i as usize))
        }
        _ => Err(ParseSyntaxError::TypeMismatch),
    }
}

fn str_to_scopes(s: &str) -> Result<Vec<Scope>, ParseSyntaxError> {
    s.split_whitespace()
        .map(|atom| Scope::new(atom).map_err(ParseSyntaxError::from))
        .collect()
}
