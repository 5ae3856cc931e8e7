//! Resolves `{{name}}` variable references inside regex templates.
//!
//! Expansion happens top-down from the point of use: each variable's own
//! (unexpanded) template is recursively expanded before being substituted
//! in, rather than pre-expanding the whole variables map up front.
use std::collections::{HashMap, HashSet};

use super::errors::ParseSyntaxError;

/// Alias kept for callers that want to talk about "expansion failed"
/// without naming the shared construction-time error enum directly.
pub type ExpansionError = ParseSyntaxError;

/// Expands every `{{name}}` reference in `template` against `variables`.
///
/// A name that isn't present in `variables` is [`ParseSyntaxError::UnknownVariable`].
/// A variable whose own template (transitively) refers back to itself is
/// [`ParseSyntaxError::VariableCycle`].
pub fn expand_template(
    template: &str,
    variables: &HashMap<String, String>,
) -> Result<String, ParseSyntaxError> {
    let mut visiting = HashSet::new();
    expand(template, variables, &mut visiting)
}

fn expand(
    template: &str,
    variables: &HashMap<String, String>,
    visiting: &mut HashSet<String>,
) -> Result<String, ParseSyntaxError> {
    let mut out = String::with_capacity(template.len());
    let bytes = template.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'{' && i + 1 < bytes.len() && bytes[i + 1] == b'{' {
            if let Some(end) = find_close(template, i + 2) {
                let name = &template[i + 2..end];
                if is_variable_name(name) {
                    if !visiting.insert(name.to_owned()) {
                        return Err(ParseSyntaxError::VariableCycle(name.to_owned()));
                    }
                    let raw = variables
                        .get(name)
                        .ok_or_else(|| ParseSyntaxError::UnknownVariable(name.to_owned()))?;
                    let expanded = expand(raw, variables, visiting)?;
                    visiting.remove(name);
                    out.push_str(&expanded);
                    i = end + 2;
                    continue;
                }
            }
        }
        let ch_len = template[i..]
            .chars()
            .next()
            .map(|c| c.len_utf8())
            .unwrap_or(1);
        out.push_str(&template[i..i + ch_len]);
        i += ch_len;
    }
    Ok(out)
}

fn find_close(s: &str, from: usize) -> Option<usize> {
    s[from..].find("}}").map(|p| from + p)
}

fn is_variable_name(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}
