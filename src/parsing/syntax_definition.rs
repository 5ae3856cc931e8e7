//! Data structures for representing a grammar: the tree of named [`Context`]s
//! and the ordered [`Pattern`]s inside each one.
//!
//! Everything here is public because a grammar model is meant to be walked by
//! callers who want to do their own things with it (editors, linters,
//! alternative tokenizers), not just by [`super::ParseState`].

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

use super::regex::Regex;
use super::scope::*;
use super::ParsingError;
use crate::parsing::syntax_set::SyntaxSet;
use serde::ser::{Serialize, Serializer};
use serde_derive::{Deserialize, Serialize};

pub type CaptureMapping = Vec<(usize, Vec<Scope>)>;

/// An opaque ID for a [`Context`], stable for the lifetime of the
/// [`SyntaxSet`] it was linked into.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ContextId {
    /// Index into [`SyntaxSet`]'s list of syntaxes.
    pub(crate) syntax_index: usize,
    /// Index into that syntax's list of contexts.
    pub(crate) context_index: usize,
}

/// A grammar: a named tree of [`Context`]s, each holding ordered [`Pattern`]s.
///
/// Constructed from an already-decoded document by
/// [`SyntaxDefinition::load_from_value`][crate::parsing::SyntaxDefinition::load_from_value];
/// this crate does not read `.sublime-syntax` files or parse YAML itself.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SyntaxDefinition {
    pub name: String,
    pub file_extensions: Vec<String>,
    pub scope: Scope,
    pub first_line_match: Option<String>,
    pub hidden: bool,
    #[serde(serialize_with = "ordered_map")]
    pub variables: HashMap<String, String>,
    #[serde(serialize_with = "ordered_map")]
    pub contexts: HashMap<String, Context>,
}

/// How many scopes `clear_scopes` should strip from the top of the current
/// scope stack before a pattern's own scopes are pushed.
///
/// Parsed and stored on [`Context`] but never consulted by the tokenizer;
/// see the construction pipeline notes for why this stays inert.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ClearAmount {
    TopN(usize),
    All,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Context {
    pub meta_scope: Vec<Scope>,
    pub meta_content_scope: Vec<Scope>,
    /// Defaults to true; set false by an explicit `meta_include_prototype:
    /// false` item in the document, or unconditionally for the `prototype`
    /// context itself (see [`super::document`]'s loader).
    pub meta_include_prototype: bool,
    pub clear_scopes: Option<ClearAmount>,
    /// Filled in by the linker for contexts that have
    /// `meta_include_prototype == true` and aren't themselves reached only
    /// through the prototype.
    pub prototype: Option<ContextId>,
    pub patterns: Vec<Pattern>,
}

impl Context {
    pub fn new(meta_include_prototype: bool) -> Context {
        Context {
            meta_scope: Vec::new(),
            meta_content_scope: Vec::new(),
            meta_include_prototype,
            clear_scopes: None,
            prototype: None,
            patterns: Vec::new(),
        }
    }

    /// Returns the match pattern at an index.
    pub fn match_at(&self, index: usize) -> Result<&MatchPattern, ParsingError> {
        match self.patterns.get(index) {
            Some(Pattern::Match(match_pat)) => Ok(match_pat),
            _ => Err(ParsingError::BadMatchIndex(index)),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Pattern {
    Match(MatchPattern),
    Include(ContextReference),
}

/// Iterates over all the match patterns reachable from a context, recursively
/// following `include` directives in order. Can only be run on contexts that
/// have already been linked (all `Include`s resolved to [`ContextReference::Direct`]).
#[derive(Debug)]
pub struct MatchIter<'a> {
    syntax_set: &'a SyntaxSet,
    ctx_stack: Vec<&'a Context>,
    index_stack: Vec<usize>,
}

impl<'a> Iterator for MatchIter<'a> {
    type Item = (&'a Context, usize);

    fn next(&mut self) -> Option<(&'a Context, usize)> {
        loop {
            if self.ctx_stack.is_empty() {
                return None;
            }
            let last_index = self.ctx_stack.len() - 1;
            let context = self.ctx_stack[last_index];
            let index = self.index_stack[last_index];
            self.index_stack[last_index] = index + 1;
            if index < context.patterns.len() {
                match context.patterns[index] {
                    Pattern::Match(_) => return Some((context, index)),
                    Pattern::Include(ref ctx_ref) => match *ctx_ref {
                        ContextReference::Direct(ref context_id) => {
                            let included = self.syntax_set.get_context(context_id).unwrap();
                            self.ctx_stack.push(included);
                            self.index_stack.push(0);
                        }
                        _ => continue, // unresolved reference, skip onto the next pattern
                    },
                }
            } else {
                self.ctx_stack.pop();
                self.index_stack.pop();
            }
        }
    }
}

/// Returns an iterator over all the match patterns in this context,
/// recursively following include directives in order.
pub fn context_iter<'a>(syntax_set: &'a SyntaxSet, context: &'a Context) -> MatchIter<'a> {
    MatchIter {
        syntax_set,
        ctx_stack: vec![context],
        index_stack: vec![0],
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MatchPattern {
    pub has_captures: bool,
    pub regex: Regex,
    pub scope: Vec<Scope>,
    pub captures: Option<CaptureMapping>,
    pub operation: MatchOperation,
}

impl MatchPattern {
    pub fn new(
        has_captures: bool,
        regex_str: String,
        scope: Vec<Scope>,
        captures: Option<CaptureMapping>,
        operation: MatchOperation,
    ) -> MatchPattern {
        MatchPattern {
            has_captures,
            regex: Regex::new(regex_str),
            scope,
            captures,
            operation,
        }
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }
}

/// What a matched pattern refers to: a named sibling context, an anonymous
/// inline one, or (after linking) a resolved [`ContextId`].
///
/// Cross-syntax references (`scope:other.lang`, `other.sublime-syntax`) are
/// out of scope for this crate, so unlike the grammar this is distilled from
/// there is no `ByScope`/`File` variant here.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ContextReference {
    #[non_exhaustive]
    Named(String),
    #[non_exhaustive]
    Inline(Box<Context>),
    #[non_exhaustive]
    Direct(ContextId),
}

impl ContextReference {
    /// Find the pointed-to context. Only works after linking.
    pub fn resolve<'a>(&self, syntax_set: &'a SyntaxSet) -> Result<&'a Context, ParsingError> {
        match *self {
            ContextReference::Direct(ref context_id) => syntax_set.get_context(context_id),
            _ => Err(ParsingError::UnresolvedContextReference(self.clone())),
        }
    }

    /// Get the context ID this reference points to. Only works after linking.
    pub fn id(&self) -> Result<ContextId, ParsingError> {
        match *self {
            ContextReference::Direct(ref context_id) => Ok(*context_id),
            _ => Err(ParsingError::UnresolvedContextReference(self.clone())),
        }
    }
}

/// What happens to the context stack when a [`MatchPattern`] matches.
///
/// `Push`/`Set` carry a single target, unlike Sublime's `with_prototype`-era
/// grammars which can name a sequence of contexts to push at once; a
/// sequence value in the source document becomes one anonymous
/// [`ContextReference::Inline`] context instead (see the construction
/// pipeline), so one target is always enough here.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum MatchOperation {
    Push(ContextReference),
    Set(ContextReference),
    Pop,
    None,
}

/// Serialize the provided map in natural key order, so that output is
/// deterministic regardless of the source `HashMap`'s iteration order.
pub(crate) fn ordered_map<K, V, S>(map: &HashMap<K, V>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    K: Eq + Hash + Ord + Serialize,
    V: Serialize,
{
    let ordered: BTreeMap<_, _> = map.iter().collect();
    ordered.serialize(serializer)
}
