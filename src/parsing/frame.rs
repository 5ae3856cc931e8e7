//! Flattens a [`Context`] into the ordered list of match patterns visible
//! once it becomes a stack frame: the `prototype` context's own patterns
//! prepended (when the context includes them), then the context's own
//! patterns with every `include` recursively expanded in place.
//!
//! This is pure grammar-model traversal and does not touch the parse state;
//! [`super::ParseState`] calls it once per push/set to build a [`Frame`].

use super::syntax_definition::{Context, ContextId, Pattern};
use super::syntax_set::SyntaxReference;

/// Identifies a single [`super::MatchPattern`] by the context that owns it
/// and its index within that context's pattern list. A flattened pattern
/// list is a sequence of these rather than of context-local indices alone,
/// because `include` can pull a pattern in from a different context.
pub(crate) type PatternId = (ContextId, usize);

/// A stack frame: the context it was built for, plus its flattened pattern
/// list. Built once per push/set and discarded on pop/set, per the grammar
/// model's `Frame` lifecycle.
#[derive(Clone, Debug)]
pub(crate) struct Frame {
    pub(crate) context_id: ContextId,
    pub(crate) patterns: Vec<PatternId>,
}

impl Frame {
    pub(crate) fn build(syntax: &SyntaxReference, context_id: ContextId) -> Frame {
        let context = syntax.get_context(context_id);
        let mut patterns = Vec::new();
        if context.meta_include_prototype {
            if let Some(prototype_id) = context.prototype {
                flatten_into(syntax, prototype_id, &mut patterns);
            }
        }
        flatten_into(syntax, context_id, &mut patterns);
        Frame { context_id, patterns }
    }
}

/// Appends `context`'s own patterns to `out`, replacing each `include` with
/// the flattened expansion of the referenced context's own patterns.
/// `prototype` is deliberately not re-prepended here: it is only prepended
/// once, at frame construction (see [`Frame::build`]).
fn flatten_into(syntax: &SyntaxReference, context_id: ContextId, out: &mut Vec<PatternId>) {
    let context: &Context = syntax.get_context(context_id);
    for (index, pattern) in context.patterns.iter().enumerate() {
        match pattern {
            Pattern::Match(_) => out.push((context_id, index)),
            Pattern::Include(context_ref) => {
                // Resolved to `Direct` by `SyntaxSetBuilder::build` before any
                // frame is ever built; an unresolved reference here would be
                // a linking bug, not a grammar error a caller can act on.
                let included_id = context_ref
                    .id()
                    .expect("include target resolved during linking");
                flatten_into(syntax, included_id, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::{SyntaxDefinition, SyntaxSetBuilder};
    use serde_json::json;

    fn build_syntax(doc: serde_json::Value) -> crate::parsing::SyntaxSet {
        let def = SyntaxDefinition::load_from_value(&doc).unwrap();
        let mut builder = SyntaxSetBuilder::new();
        builder.add(def);
        builder.build().unwrap()
    }

    #[test]
    fn flattens_includes_in_order() {
        let set = build_syntax(json!({
            "name": "Test",
            "contexts": {
                "main": [
                    {"include": "helper"},
                    {"match": "c", "scope": "c"}
                ],
                "helper": [
                    {"match": "a", "scope": "a"},
                    {"match": "b", "scope": "b"}
                ]
            }
        }));
        let syntax = &set.syntaxes()[0];
        let main_id = syntax.context_ids()["main"];
        let frame = Frame::build(syntax, main_id);
        assert_eq!(frame.patterns.len(), 3);
    }

    #[test]
    fn prepends_prototype_when_included() {
        let set = build_syntax(json!({
            "name": "Test",
            "contexts": {
                "main": [{"match": "a", "scope": "a"}],
                "prototype": [{"match": "p", "scope": "p"}]
            }
        }));
        let syntax = &set.syntaxes()[0];
        let main_id = syntax.context_ids()["main"];
        let frame = Frame::build(syntax, main_id);
        assert_eq!(frame.patterns.len(), 2);
        let (proto_ctx_id, proto_idx) = frame.patterns[0];
        let proto_pattern = syntax.get_context(proto_ctx_id).match_at(proto_idx).unwrap();
        assert_eq!(proto_pattern.regex().regex_str(), "p");
    }

    #[test]
    fn meta_include_prototype_false_suppresses_prototype() {
        let set = build_syntax(json!({
            "name": "Test",
            "contexts": {
                "main": [
                    {"meta_include_prototype": false},
                    {"match": "a", "scope": "a"}
                ],
                "prototype": [{"match": "p", "scope": "p"}]
            }
        }));
        let syntax = &set.syntaxes()[0];
        let main_id = syntax.context_ids()["main"];
        let frame = Frame::build(syntax, main_id);
        assert_eq!(frame.patterns.len(), 1);
    }
}
