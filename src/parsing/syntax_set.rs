//! Linking: turning one or more [`SyntaxDefinition`]s into a [`SyntaxSet`] of
//! [`SyntaxReference`]s with every context assigned a stable [`ContextId`]
//! and every `include`/push/set target resolved to one.
//!
//! Cross-syntax references (Sublime's `embed`/`scope:other.lang`/file
//! references) are out of scope here: linking only ever resolves a name
//! against contexts declared in the *same* grammar.

use std::collections::HashMap;

use super::errors::ParseSyntaxError;
use super::parser::ParsingError;
use super::regex::Regex;
use super::scope::Scope;
use super::syntax_definition::{
    Context, ContextId, ContextReference, MatchOperation, Pattern, SyntaxDefinition,
};

/// One linked grammar: a flat arena of [`Context`]s plus a name to id index.
///
/// Every `Pattern::Include` and every `Push`/`Set` target reachable from any
/// context here has already been resolved to a [`ContextReference::Direct`],
/// including anonymous contexts created inline at a push/set site, which are
/// assigned ids and appended to the arena just like named ones.
#[derive(Clone, Debug)]
pub struct SyntaxReference {
    pub name: String,
    pub file_extensions: Vec<String>,
    pub scope: Scope,
    /// The grammar's (already variable-expanded) first-line regex, if any.
    pub first_line_match: Option<Regex>,
    pub hidden: bool,
    pub variables: HashMap<String, String>,
    context_ids: HashMap<String, ContextId>,
    contexts: Vec<Context>,
}

impl SyntaxReference {
    /// Maps every context name declared in this grammar to its linked id,
    /// including `main` and, if present, `prototype`.
    pub fn context_ids(&self) -> &HashMap<String, ContextId> {
        &self.context_ids
    }

    /// The id of this grammar's `main` context. Every linked [`SyntaxReference`]
    /// has one; [`SyntaxSetBuilder::build`] rejects a grammar without it.
    pub fn main_context_id(&self) -> ContextId {
        self.context_ids["main"]
    }

    fn contexts(&self) -> &[Context] {
        &self.contexts
    }

    /// Indexes straight into this grammar's own context arena. Only called
    /// with ids this same `SyntaxReference` produced, so it never fails.
    pub(crate) fn get_context(&self, id: ContextId) -> &Context {
        &self.contexts[id.context_index]
    }
}

/// An immutable collection of linked grammars, safe to share read-only
/// across threads and across many independent [`ParseState`][super::ParseState]s.
#[derive(Clone, Debug, Default)]
pub struct SyntaxSet {
    syntaxes: Vec<SyntaxReference>,
}

impl SyntaxSet {
    pub fn syntaxes(&self) -> &[SyntaxReference] {
        &self.syntaxes
    }

    pub fn find_syntax_by_name(&self, name: &str) -> Option<&SyntaxReference> {
        self.syntaxes.iter().find(|s| s.name == name)
    }

    pub fn find_syntax_by_extension(&self, extension: &str) -> Option<&SyntaxReference> {
        self.syntaxes
            .iter()
            .find(|s| s.file_extensions.iter().any(|e| e == extension))
    }

    pub fn find_syntax_by_scope(&self, scope: Scope) -> Option<&SyntaxReference> {
        self.syntaxes.iter().find(|s| s.scope == scope)
    }

    /// Finds the first grammar whose (already variable-expanded)
    /// `first_line_match` matches `line`, if any.
    pub fn find_syntax_by_first_line(&self, line: &str) -> Option<&SyntaxReference> {
        self.syntaxes.iter().find(|s| {
            s.first_line_match
                .as_ref()
                .map(|r| r.search(line, 0, line.len(), None).unwrap_or(false))
                .unwrap_or(false)
        })
    }

    /// Looks a context up across the whole set by its absolute id. Used by
    /// introspection helpers ([`super::syntax_definition::context_iter`],
    /// [`ContextReference::resolve`]) that don't have a `SyntaxReference` in
    /// hand, only a bare [`ContextId`].
    pub(crate) fn get_context(&self, context_id: &ContextId) -> Result<&Context, ParsingError> {
        let syntax = self
            .syntaxes
            .get(context_id.syntax_index)
            .ok_or(ParsingError::MissingContext(*context_id))?;
        syntax
            .contexts()
            .get(context_id.context_index)
            .ok_or(ParsingError::MissingContext(*context_id))
    }
}

/// Accumulates [`SyntaxDefinition`]s, then [`build`][SyntaxSetBuilder::build]s
/// them all into one linked, immutable [`SyntaxSet`].
#[derive(Debug, Default)]
pub struct SyntaxSetBuilder {
    syntaxes: Vec<SyntaxDefinition>,
}

impl SyntaxSetBuilder {
    pub fn new() -> SyntaxSetBuilder {
        SyntaxSetBuilder { syntaxes: Vec::new() }
    }

    pub fn add(&mut self, syntax: SyntaxDefinition) {
        self.syntaxes.push(syntax);
    }

    pub fn syntaxes(&self) -> &[SyntaxDefinition] {
        &self.syntaxes
    }

    /// Links every added grammar: assigns every named and anonymous context
    /// a [`ContextId`], resolves every `include`/push/set name to one, and
    /// attaches the `prototype` context (if any) to every context whose
    /// `meta_include_prototype` is true.
    pub fn build(self) -> Result<SyntaxSet, ParseSyntaxError> {
        let mut syntaxes = Vec::with_capacity(self.syntaxes.len());
        for (syntax_index, definition) in self.syntaxes.into_iter().enumerate() {
            syntaxes.push(link_syntax(syntax_index, definition)?);
        }
        Ok(SyntaxSet { syntaxes })
    }
}

fn link_syntax(syntax_index: usize, def: SyntaxDefinition) -> Result<SyntaxReference, ParseSyntaxError> {
    let mut arena: Vec<Context> = Vec::with_capacity(def.contexts.len());
    let mut context_ids: HashMap<String, ContextId> = HashMap::with_capacity(def.contexts.len());

    // Reserve a stable id for every named context up front, in deterministic
    // (alphabetical) order, before any resolution happens: a context's
    // patterns may reference a sibling declared later in the document.
    let mut names: Vec<String> = def.contexts.keys().cloned().collect();
    names.sort();
    for name in &names {
        let id = ContextId {
            syntax_index,
            context_index: arena.len(),
        };
        context_ids.insert(name.clone(), id);
        arena.push(Context::new(true));
    }

    if !context_ids.contains_key("main") {
        return Err(ParseSyntaxError::MainMissing);
    }

    let mut contexts = def.contexts;
    for name in &names {
        let id = context_ids[name];
        let raw = contexts.remove(name).expect("name came from this map's own keys");
        let linked = link_context(raw, syntax_index, &context_ids, &mut arena)?;
        arena[id.context_index] = linked;
    }

    attach_prototype(&context_ids, &mut arena);
    validate_regexes(&arena)?;
    if let Some(pattern) = &def.first_line_match {
        if let Some(err) = Regex::try_compile(pattern) {
            return Err(ParseSyntaxError::RegexCompileError(pattern.clone(), err));
        }
    }

    Ok(SyntaxReference {
        name: def.name,
        file_extensions: def.file_extensions,
        scope: def.scope,
        first_line_match: def.first_line_match.map(Regex::new),
        hidden: def.hidden,
        variables: def.variables,
        context_ids,
        contexts: arena,
    })
}

/// Resolves every `Pattern::Include` and push/set target inside `context`,
/// linking (and assigning ids to) any anonymous inline contexts it finds
/// along the way by appending them to `arena`.
fn link_context(
    mut context: Context,
    syntax_index: usize,
    context_ids: &HashMap<String, ContextId>,
    arena: &mut Vec<Context>,
) -> Result<Context, ParseSyntaxError> {
    for pattern in &mut context.patterns {
        match pattern {
            Pattern::Include(context_ref) => {
                *context_ref = link_ref(context_ref.clone(), syntax_index, context_ids, arena)?;
            }
            Pattern::Match(match_pat) => match &mut match_pat.operation {
                MatchOperation::Push(target) | MatchOperation::Set(target) => {
                    *target = link_ref(target.clone(), syntax_index, context_ids, arena)?;
                }
                MatchOperation::Pop | MatchOperation::None => {}
            },
        }
    }
    Ok(context)
}

/// Resolves a single [`ContextReference`]: a `Named` reference is looked up
/// among this syntax's own contexts; an `Inline` one is linked recursively
/// and appended to the arena as a fresh context of its own.
fn link_ref(
    context_ref: ContextReference,
    syntax_index: usize,
    context_ids: &HashMap<String, ContextId>,
    arena: &mut Vec<Context>,
) -> Result<ContextReference, ParseSyntaxError> {
    match context_ref {
        ContextReference::Named(name) => {
            let id = context_ids
                .get(&name)
                .copied()
                .ok_or(ParseSyntaxError::UndefinedContextReference(name))?;
            Ok(ContextReference::Direct(id))
        }
        ContextReference::Inline(inner) => {
            let id = ContextId {
                syntax_index,
                context_index: arena.len(),
            };
            arena.push(Context::new(true));
            let linked = link_context(*inner, syntax_index, context_ids, arena)?;
            arena[id.context_index] = linked;
            Ok(ContextReference::Direct(id))
        }
        already_direct @ ContextReference::Direct(_) => Ok(already_direct),
    }
}

/// Eagerly compiles every match pattern's (already variable-expanded) regex
/// once, at link time, so a malformed pattern is a `build()` error rather
/// than a surprise the first time the tokenizer happens to reach it. This is
/// a cheap up-front check, not a replacement for `Regex`'s own lazy
/// compile-and-cache behavior during `parse_line`.
fn validate_regexes(arena: &[Context]) -> Result<(), ParseSyntaxError> {
    for context in arena {
        for pattern in &context.patterns {
            if let Pattern::Match(match_pattern) = pattern {
                let regex_str = match_pattern.regex().regex_str();
                if let Some(err) = Regex::try_compile(regex_str) {
                    return Err(ParseSyntaxError::RegexCompileError(regex_str.to_owned(), err));
                }
            }
        }
    }
    Ok(())
}

/// Every context (named or anonymous) whose `meta_include_prototype` is
/// true gets the grammar's `prototype` context attached, so
/// [`super::frame::Frame::build`] can prepend its patterns without a name
/// lookup on every push.
fn attach_prototype(context_ids: &HashMap<String, ContextId>, arena: &mut [Context]) {
    if let Some(&prototype_id) = context_ids.get("prototype") {
        for context in arena.iter_mut() {
            if context.meta_include_prototype {
                context.prototype = Some(prototype_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::SyntaxDefinition;
    use serde_json::json;

    fn def(doc: serde_json::Value) -> SyntaxDefinition {
        SyntaxDefinition::load_from_value(&doc).unwrap()
    }

    #[test]
    fn links_a_minimal_grammar() {
        let mut builder = SyntaxSetBuilder::new();
        builder.add(def(json!({
            "name": "Test",
            "scope": "source.test",
            "contexts": {"main": [{"match": "a", "scope": "a"}]}
        })));
        let set = builder.build().unwrap();
        assert_eq!(set.syntaxes().len(), 1);
        let syntax = &set.syntaxes()[0];
        assert!(syntax.context_ids().contains_key("main"));
    }

    #[test]
    fn missing_main_is_rejected_at_link_time() {
        let mut builder = SyntaxSetBuilder::new();
        builder.add(def(json!({
            "name": "Test",
            "contexts": {"helper": []}
        })));
        assert!(matches!(builder.build(), Err(ParseSyntaxError::MainMissing)));
    }

    #[test]
    fn malformed_regex_is_rejected_at_link_time() {
        let mut builder = SyntaxSetBuilder::new();
        builder.add(def(json!({
            "name": "Test",
            "contexts": {"main": [{"match": "(unclosed", "scope": "a"}]}
        })));
        assert!(matches!(
            builder.build(),
            Err(ParseSyntaxError::RegexCompileError(..))
        ));
    }

    #[test]
    fn undefined_include_is_rejected() {
        let mut builder = SyntaxSetBuilder::new();
        builder.add(def(json!({
            "name": "Test",
            "contexts": {"main": [{"include": "nope"}]}
        })));
        let err = builder.build().unwrap_err();
        assert!(matches!(err, ParseSyntaxError::UndefinedContextReference(name) if name == "nope"));
    }

    #[test]
    fn named_push_target_resolves_to_a_direct_reference() {
        let mut builder = SyntaxSetBuilder::new();
        builder.add(def(json!({
            "name": "Test",
            "contexts": {
                "main": [{"match": "a", "push": "helper"}],
                "helper": [{"match": "b", "pop": true}]
            }
        })));
        let set = builder.build().unwrap();
        let syntax = &set.syntaxes()[0];
        let main_id = syntax.main_context_id();
        let main = syntax.get_context(main_id);
        match main.match_at(0).unwrap().operation {
            MatchOperation::Push(ContextReference::Direct(_)) => {}
            _ => panic!("expected a resolved push target"),
        }
    }

    #[test]
    fn inline_push_target_is_linked_and_reachable() {
        let mut builder = SyntaxSetBuilder::new();
        builder.add(def(json!({
            "name": "Test",
            "contexts": {
                "main": [{"match": "a", "push": [
                    {"match": "b", "scope": "b", "pop": true}
                ]}]
            }
        })));
        let set = builder.build().unwrap();
        let syntax = &set.syntaxes()[0];
        let main = syntax.get_context(syntax.main_context_id());
        let target_id = match main.match_at(0).unwrap().operation {
            MatchOperation::Push(ContextReference::Direct(id)) => id,
            _ => panic!("expected a resolved inline push target"),
        };
        let inline = syntax.get_context(target_id);
        assert_eq!(inline.patterns.len(), 1);
    }

    #[test]
    fn find_by_extension_and_scope() {
        let mut builder = SyntaxSetBuilder::new();
        builder.add(def(json!({
            "name": "JSON",
            "scope": "source.json",
            "file_extensions": ["json"],
            "contexts": {"main": []}
        })));
        let set = builder.build().unwrap();
        assert!(set.find_syntax_by_extension("json").is_some());
        assert!(set.find_syntax_by_extension("xml").is_none());
        assert!(set.find_syntax_by_scope(Scope::new("source.json").unwrap()).is_some());
        assert!(set.find_syntax_by_name("JSON").is_some());
    }

    #[test]
    fn prototype_is_attached_to_contexts_that_include_it() {
        let mut builder = SyntaxSetBuilder::new();
        builder.add(def(json!({
            "name": "Test",
            "contexts": {
                "main": [{"match": "a", "scope": "a"}],
                "prototype": [{"match": "p", "scope": "p"}]
            }
        })));
        let set = builder.build().unwrap();
        let syntax = &set.syntaxes()[0];
        let main = syntax.get_context(syntax.main_context_id());
        assert!(main.prototype.is_some());
        let prototype_id = syntax.context_ids()["prototype"];
        let prototype = syntax.get_context(prototype_id);
        assert!(prototype.prototype.is_none());
    }
}
