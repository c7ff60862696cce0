#![forbid(unsafe_code)]

use miette::Diagnostic;
use rill_ast::Span;
use thiserror::Error;

/// A user-surfaced semantic error: unresolved identifier, redeclaration,
/// signature mismatch, missing return, unused identifier, and friends.
/// Internal-consistency violations (states the completed check phases are
/// supposed to exclude) panic instead of producing one of these.
#[derive(Debug, Error, Diagnostic)]
#[error("semantic error: {message}")]
#[diagnostic(code(rill::sema))]
pub struct SemanticError {
    pub message: String,
    #[label]
    pub span: Span,
}

impl SemanticError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}
