//! A grammar model and line tokenizer for Sublime Text style `.sublime-syntax`
//! syntax definitions.
//!
//! A grammar is a tree of named [`parsing::Context`]s containing ordered
//! patterns, loaded once into a [`parsing::SyntaxSet`] and then fed line by
//! line into a [`parsing::ParseState`] to produce scope-annotated
//! [`parsing::Token`]s.
//!
//! This crate consumes already-parsed grammar documents (e.g. `serde_json`
//! values or anything else that deserializes into [`parsing::SyntaxDefinition`]);
//! it does not read `.sublime-syntax` files from disk or parse YAML itself.

#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate serde_derive;
#[cfg(test)]
#[macro_use]
extern crate pretty_assertions;

pub mod parsing;
