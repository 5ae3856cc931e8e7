//! Construction/linking-time errors for the grammar model.
use std::error::Error;
use std::fmt;

use super::scope::ParseScopeError;

/// Errors that can occur while building a [`super::SyntaxDefinition`] from a
/// decoded document, or while linking one or more definitions into a
/// [`super::SyntaxSet`].
#[derive(Debug)]
pub enum ParseSyntaxError {
    /// Some part of the decoded document is the wrong shape (e.g. a string
    /// where a sequence was expected).
    TypeMismatch,
    /// A key that is required for something to be a valid grammar document
    /// is missing.
    MissingMandatoryKey(&'static str),
    /// The document contained no contexts at all.
    EmptyGrammar,
    /// Syntaxes must have a context named `main`.
    MainMissing,
    /// An `include` or a push/set target named a context that doesn't exist
    /// in this grammar.
    UndefinedContextReference(String),
    /// A `{{name}}` reference in a regex template named a variable that
    /// isn't defined in this grammar.
    UnknownVariable(String),
    /// Expanding a `{{name}}` variable recursed back into a variable already
    /// being expanded.
    VariableCycle(String),
    /// A pattern's regex failed to compile.
    RegexCompileError(String, Box<dyn Error + Send + Sync + 'static>),
    /// A scope string used somewhere in the grammar isn't a valid [`super::Scope`].
    InvalidScope(ParseScopeError),
}

impl fmt::Display for ParseSyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ParseSyntaxError::*;
        match self {
            TypeMismatch => write!(f, "a part of the grammar document had an unexpected shape"),
            MissingMandatoryKey(key) => write!(f, "missing mandatory key '{}'", key),
            EmptyGrammar => write!(f, "grammar document contained no contexts"),
            MainMissing => write!(f, "grammar document is missing a 'main' context"),
            UndefinedContextReference(name) => {
                write!(f, "reference to undefined context '{}'", name)
            }
            UnknownVariable(name) => write!(f, "reference to undefined variable '{{{{{}}}}}'", name),
            VariableCycle(name) => write!(f, "cyclic variable reference involving '{}'", name),
            RegexCompileError(pattern, err) => {
                write!(f, "failed to compile regex '{}': {}", pattern, err)
            }
            InvalidScope(err) => write!(f, "invalid scope: {}", err),
        }
    }
}

impl Error for ParseSyntaxError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ParseSyntaxError::RegexCompileError(_, err) => Some(err.as_ref()),
            ParseSyntaxError::InvalidScope(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ParseScopeError> for ParseSyntaxError {
    fn from(error: ParseScopeError) -> ParseSyntaxError {
        ParseSyntaxError::InvalidScope(error)
    }
}
