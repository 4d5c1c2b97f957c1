//! Line tokenisation (§4.7): a command line is a space-separated sequence
//! of tokens; empty tokens (runs of spaces) are rejected. `\r` is dropped
//! by the connection reader before a line ever reaches this module.

use wellpapp_error::{Error, Result};

pub fn tokenize(line: &str) -> Result<Vec<&str>> {
    if line.is_empty() {
        return Ok(Vec::new());
    }
    let mut tokens = Vec::new();
    for token in line.split(' ') {
        if token.is_empty() {
            return Err(Error::Syntax("empty token".into()));
        }
        tokens.push(token);
    }
    Ok(tokens)
}

/// Joins tokens `start..` back into their original free-text form (§4.6.2:
/// a trailing free-text field is the last token(s) on the line, since
/// spaces there are never a tokenisation boundary in practice — the field
/// simply consumes the remainder of the line).
#[must_use]
pub fn rest_of_line(tokens: &[&str], start: usize) -> String {
    tokens[start..].join(" ")
}
