//! The stateful line tokenizer: turns one line of text into an ordered list
//! of scope-tagged [`Token`]s, carrying a context stack between calls so a
//! multi-line construct (a block comment, a string) can span lines.

use std::collections::HashMap;
use std::hash::BuildHasherDefault;

use fnv::FnvHasher;

use super::errors::ParseSyntaxError;
use super::frame::{Frame, PatternId};
use super::regex::{Region, Regex};
use super::scope::Scope;
use super::syntax_definition::{ContextId, ContextReference, MatchOperation};
use super::syntax_set::SyntaxReference;

/// Errors that can occur while parsing a line.
///
/// Tokenization itself never fails on unmatched text (see the line
/// tokenizer's no-match case), so everything here is either a grammar that
/// was linked incorrectly or a regex that fails to compile lazily on first
/// use.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ParsingError {
    /// A context is missing. Usually caused by a bug in the linker, since a
    /// [`SyntaxReference`] is only ever built with already-resolved ids.
    #[error("missing context with id {0:?}")]
    MissingContext(ContextId),
    #[error("bad index to match_at: {0}")]
    BadMatchIndex(usize),
    #[error("tried to use a context reference that hasn't been resolved yet: {0:?}")]
    UnresolvedContextReference(ContextReference),
    #[error(transparent)]
    SyntaxRegexCompileError(#[from] ParseSyntaxError),
}

/// One scope-tagged, contiguous slice of a parsed line.
///
/// The text borrows straight from the line passed to
/// [`ParseState::parse_line`]; concatenating every token's `text` for a line
/// reproduces that line exactly.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Token<'l> {
    pub text: &'l str,
    pub scopes: Vec<Scope>,
}

/// Keeps the parser's context stack between calls to
/// [`parse_line`][ParseState::parse_line].
///
/// If you're parsing an entire file, create one of these before the first
/// line and keep reusing it, line by line, in order; a `ParseState` has no
/// way to jump to an arbitrary line without having parsed everything before
/// it first.
#[derive(Clone, Debug)]
pub struct ParseState {
    stack: Vec<Frame>,
}

impl ParseState {
    /// Starts a new parse at the grammar's `main` context.
    pub fn new(syntax: &SyntaxReference) -> ParseState {
        let main_frame = Frame::build(syntax, syntax.main_context_id());
        ParseState { stack: vec![main_frame] }
    }

    /// Tokenizes one line, mutating the context stack for pushes/pops/sets
    /// triggered along the way so the next call picks up where this one left
    /// off.
    ///
    /// `line` should not contain a trailing newline; this crate has no
    /// opinion on line endings, only on what's inside one.
    pub fn parse_line<'l>(
        &mut self,
        line: &'l str,
        syntax: &SyntaxReference,
    ) -> Result<Vec<Token<'l>>, ParsingError> {
        let mut tokens = Vec::new();
        let mut cache = SearchCache::new();
        let mut pos = 0;

        while pos < line.len() {
            let patterns = self
                .stack
                .last()
                .expect("the parse stack always has at least one frame")
                .patterns
                .clone();

            let chosen = find_best_match(syntax, &mut cache, &patterns, line, pos)?;

            let (pattern_id, start, end, region) = match chosen {
                Some(found) => found,
                None => {
                    tokens.push(Token {
                        text: &line[pos..],
                        scopes: self.current_scopes(syntax, true),
                    });
                    break;
                }
            };

            if start == pos && end == pos {
                // A zero-width match right at the cursor would never advance
                // `pos`; skip one character defensively so the line always
                // terminates. A zero-width match preceded by a gap doesn't
                // need this: the gap token itself already made progress.
                let next = next_char_boundary(line, pos);
                tokens.push(Token {
                    text: &line[pos..next],
                    scopes: self.current_scopes(syntax, true),
                });
                pos = next;
                continue;
            }

            if start > pos {
                tokens.push(Token {
                    text: &line[pos..start],
                    scopes: self.current_scopes(syntax, true),
                });
            }

            let (ctx_id, idx) = pattern_id;
            let pattern = syntax
                .get_context(ctx_id)
                .match_at(idx)
                .expect("frame pattern ids always index a match pattern");

            let mut scopes = match &pattern.operation {
                MatchOperation::Push(target) => {
                    let scopes = self.current_scopes(syntax, true);
                    let target_id = target.id().expect("push target resolved during linking");
                    self.stack.push(Frame::build(syntax, target_id));
                    let mut scopes = scopes;
                    scopes.extend(syntax.get_context(target_id).meta_scope.iter().copied());
                    scopes
                }
                MatchOperation::Set(target) => {
                    self.stack.pop();
                    let target_id = target.id().expect("set target resolved during linking");
                    self.stack.push(Frame::build(syntax, target_id));
                    self.current_scopes(syntax, true)
                }
                MatchOperation::Pop => {
                    let scopes = self.current_scopes(syntax, false);
                    // A pop with nothing left below it is a no-op: the stack
                    // never drops below the main context's frame.
                    if self.stack.len() > 1 {
                        self.stack.pop();
                    }
                    scopes
                }
                MatchOperation::None => self.current_scopes(syntax, true),
            };

            scopes.extend(pattern.scope.iter().copied());

            match &pattern.captures {
                None => tokens.push(Token {
                    text: &line[start..end],
                    scopes,
                }),
                Some(mapping) => {
                    let mut p = start;
                    for &(group, ref capture_scopes) in mapping {
                        let (gs, ge) = match region.pos(group) {
                            Some(span) => span,
                            None => continue,
                        };
                        if gs == ge {
                            continue;
                        }
                        if gs > p {
                            tokens.push(Token {
                                text: &line[p..gs],
                                scopes: scopes.clone(),
                            });
                        }
                        let mut token_scopes = scopes.clone();
                        token_scopes.extend(capture_scopes.iter().copied());
                        tokens.push(Token {
                            text: &line[gs..ge],
                            scopes: token_scopes,
                        });
                        p = ge;
                    }
                    if p < end {
                        tokens.push(Token {
                            text: &line[p..end],
                            scopes,
                        });
                    }
                }
            }

            pos = end;
        }

        Ok(tokens)
    }

    /// The outer-to-inner list of scopes active right now: the grammar's own
    /// scope (if set), then each stack frame's `meta_scope`/`meta_content_scope`
    /// from the bottom up. `include_innermost_meta_scope` controls whether the
    /// top frame's `meta_scope` is included, which differs by which action
    /// triggered the token being emitted (see [`MatchOperation`]'s handling
    /// in `parse_line`).
    fn current_scopes(&self, syntax: &SyntaxReference, include_innermost_meta_scope: bool) -> Vec<Scope> {
        let mut scopes = Vec::new();
        if !syntax.scope.is_empty() {
            scopes.push(syntax.scope);
        }
        let depth = self.stack.len();
        for (i, frame) in self.stack.iter().enumerate() {
            let context = syntax.get_context(frame.context_id);
            let is_top = i + 1 == depth;
            if !is_top || include_innermost_meta_scope {
                scopes.extend(context.meta_scope.iter().copied());
            }
            scopes.extend(context.meta_content_scope.iter().copied());
        }
        scopes
    }
}

fn next_char_boundary(line: &str, pos: usize) -> usize {
    match line[pos..].chars().next() {
        Some(c) => pos + c.len_utf8(),
        None => pos + 1,
    }
}

/// Searches every pattern in `patterns` (in priority order) for a match
/// starting at or after `pos`, applying the leftmost-best-match rule: a
/// match beginning exactly at `pos` wins immediately and stops the search;
/// otherwise the match with the smallest start offset wins, ties broken by
/// list order.
fn find_best_match(
    syntax: &SyntaxReference,
    cache: &mut SearchCache,
    patterns: &[PatternId],
    line: &str,
    pos: usize,
) -> Result<Option<(PatternId, usize, usize, Region)>, ParsingError> {
    let mut best: Option<(PatternId, usize, usize, Region)> = None;
    for &pattern_id in patterns {
        let (ctx_id, idx) = pattern_id;
        let pattern = syntax
            .get_context(ctx_id)
            .match_at(idx)
            .expect("frame pattern ids always index a match pattern");

        if let Some((start, end, region)) = cache.search(pattern_id, pattern.regex(), line, pos)? {
            if start == pos {
                return Ok(Some((pattern_id, start, end, region)));
            }
            let better = match &best {
                None => true,
                Some((_, best_start, ..)) => start < *best_start,
            };
            if better {
                best = Some((pattern_id, start, end, region));
            }
        }
    }
    Ok(best)
}

/// Remembers, for the duration of one [`ParseState::parse_line`] call, the
/// last search result for each pattern identity so that a pattern already
/// known not to match anywhere from an earlier cursor position isn't
/// searched again, and a pattern whose previously-found match is still ahead
/// of the cursor doesn't need a fresh search either.
struct SearchCache {
    entries: HashMap<PatternId, CacheEntry, BuildHasherDefault<FnvHasher>>,
}

enum CacheEntry {
    Found { start: usize, end: usize, region: Region },
    NotFound,
}

impl SearchCache {
    fn new() -> SearchCache {
        SearchCache {
            entries: HashMap::default(),
        }
    }

    fn search(
        &mut self,
        pattern_id: PatternId,
        regex: &Regex,
        line: &str,
        pos: usize,
    ) -> Result<Option<(usize, usize, Region)>, ParsingError> {
        if let Some(cached) = self.entries.get(&pattern_id) {
            match cached {
                CacheEntry::NotFound => return Ok(None),
                CacheEntry::Found { start, end, region } if *start >= pos => {
                    return Ok(Some((*start, *end, region.clone())));
                }
                _ => {}
            }
        }

        let mut region = Region::new();
        let found = regex.search(line, pos, line.len(), Some(&mut region))?;
        if found {
            let (start, end) = region
                .pos(0)
                .expect("a successful search always has a group 0 span");
            self.entries.insert(
                pattern_id,
                CacheEntry::Found {
                    start,
                    end,
                    region: region.clone(),
                },
            );
            Ok(Some((start, end, region)))
        } else {
            // No match anywhere from `pos` to the end of the line means no
            // match from any later position either, so this is final for
            // the rest of this `parse_line` call.
            self.entries.insert(pattern_id, CacheEntry::NotFound);
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::{SyntaxDefinition, SyntaxSetBuilder};
    use serde_json::json;

    fn parse_state_for(doc: serde_json::Value) -> (crate::parsing::SyntaxSet, usize) {
        let def = SyntaxDefinition::load_from_value(&doc).unwrap();
        let mut builder = SyntaxSetBuilder::new();
        builder.add(def);
        (builder.build().unwrap(), 0)
    }

    fn scope_strings(scopes: &[Scope]) -> Vec<String> {
        scopes.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn tokenizes_json_numbers_and_punctuation() {
        let (set, idx) = parse_state_for(json!({
            "name": "Test",
            "scope": "source.test",
            "contexts": {
                "main": [
                    {"match": r"[0-9]+", "scope": "constant.numeric.test"},
                    {"match": r",", "scope": "punctuation.separator.test"}
                ]
            }
        }));
        let syntax = &set.syntaxes()[idx];
        let mut state = ParseState::new(syntax);
        let tokens = state.parse_line("12,34", syntax).unwrap();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].text, "12");
        assert_eq!(tokens[1].text, ",");
        assert_eq!(tokens[2].text, "34");
        assert!(scope_strings(&tokens[0].scopes).contains(&"constant.numeric.test".to_string()));
    }

    #[test]
    fn unmatched_text_gets_a_default_scoped_token() {
        let (set, idx) = parse_state_for(json!({
            "name": "Test",
            "scope": "source.test",
            "contexts": {"main": [{"match": r"x", "scope": "a"}]}
        }));
        let syntax = &set.syntaxes()[idx];
        let mut state = ParseState::new(syntax);
        let tokens = state.parse_line("abc", syntax).unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].text, "abc");
        assert_eq!(scope_strings(&tokens[0].scopes), vec!["source.test"]);
    }

    #[test]
    fn push_then_pop_excludes_meta_scope_from_the_popping_token() {
        let (set, idx) = parse_state_for(json!({
            "name": "Test",
            "contexts": {
                "main": [{"match": "\"", "push": "string"}],
                "string": [
                    {"meta_scope": "string.quoted.test"},
                    {"match": "\"", "scope": "punctuation.definition.string.end.test", "pop": true}
                ]
            }
        }));
        let syntax = &set.syntaxes()[idx];
        let mut state = ParseState::new(syntax);
        let tokens = state.parse_line("\"\"", syntax).unwrap();
        assert_eq!(tokens.len(), 2);
        assert!(scope_strings(&tokens[1].scopes).contains(&"punctuation.definition.string.end.test".to_string()));
        assert!(!scope_strings(&tokens[1].scopes).contains(&"string.quoted.test".to_string()));
    }

    #[test]
    fn captures_decompose_into_sub_tokens() {
        let (set, idx) = parse_state_for(json!({
            "name": "Test",
            "contexts": {
                "main": [{
                    "match": r"(\\.)",
                    "scope": "string.quoted.test",
                    "captures": {"1": "constant.character.escape.test"}
                }]
            }
        }));
        let syntax = &set.syntaxes()[idx];
        let mut state = ParseState::new(syntax);
        let tokens = state.parse_line(r"\t", syntax).unwrap();
        assert_eq!(tokens.len(), 1);
        assert!(scope_strings(&tokens[0].scopes).contains(&"constant.character.escape.test".to_string()));
        assert!(scope_strings(&tokens[0].scopes).contains(&"string.quoted.test".to_string()));
    }

    #[test]
    fn meta_include_prototype_false_keeps_prototype_out_of_that_frame_only() {
        let (set, idx) = parse_state_for(json!({
            "name": "Test",
            "contexts": {
                "main": [{"match": "a", "push": "no_proto"}],
                "no_proto": [
                    {"meta_include_prototype": false},
                    {"match": "b", "pop": true}
                ],
                "prototype": [{"match": "z", "scope": "should.never.match"}]
            }
        }));
        let syntax = &set.syntaxes()[idx];
        let mut state = ParseState::new(syntax);
        let tokens = state.parse_line("azb", syntax).unwrap();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[1].text, "z");
        assert!(!scope_strings(&tokens[1].scopes).contains(&"should.never.match".to_string()));
    }

    #[test]
    fn inline_context_works_as_a_push_target() {
        let (set, idx) = parse_state_for(json!({
            "name": "Test",
            "contexts": {
                "main": [{"match": "a", "push": [
                    {"match": "b", "scope": "inner", "pop": true}
                ]}]
            }
        }));
        let syntax = &set.syntaxes()[idx];
        let mut state = ParseState::new(syntax);
        let tokens = state.parse_line("ab", syntax).unwrap();
        assert_eq!(tokens.len(), 2);
        assert!(scope_strings(&tokens[1].scopes).contains(&"inner".to_string()));
    }

    #[test]
    fn zero_width_match_at_cursor_still_terminates() {
        let (set, idx) = parse_state_for(json!({
            "name": "Test",
            "contexts": {"main": [{"match": r"(?=x)", "scope": "lookahead"}]}
        }));
        let syntax = &set.syntaxes()[idx];
        let mut state = ParseState::new(syntax);
        let tokens = state.parse_line("xx", syntax).unwrap();
        assert!(!tokens.is_empty());
        let total: String = tokens.iter().map(|t| t.text).collect();
        assert_eq!(total, "xx");
    }

    #[test]
    fn variables_expand_inside_match_regexes() {
        let (set, idx) = parse_state_for(json!({
            "name": "Test",
            "variables": {"digit": "[0-9]"},
            "contexts": {"main": [{"match": r"{{digit}}+", "scope": "constant.numeric.test"}]}
        }));
        let syntax = &set.syntaxes()[idx];
        let mut state = ParseState::new(syntax);
        let tokens = state.parse_line("42", syntax).unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].text, "42");
    }
}
