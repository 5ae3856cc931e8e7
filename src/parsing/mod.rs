//! Everything about parsing text into text annotated with scopes.
//!
//! The most important structs here are [`SyntaxSet`] for the grammar model
//! and [`ParseState`] for the line tokenizer.

mod document;
mod errors;
mod expand;
mod frame;
mod parser;
mod regex;
mod scope;
pub mod syntax_definition;
mod syntax_set;

pub use self::errors::ParseSyntaxError;
pub use self::expand::ExpansionError;
pub use self::parser::*;
pub use self::regex::*;
pub use self::scope::*;
pub use self::syntax_definition::{
    CaptureMapping, ClearAmount, Context, ContextId, ContextReference, MatchOperation, MatchPattern,
    Pattern, SyntaxDefinition,
};
pub use self::syntax_set::*;
