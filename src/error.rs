//! Fatal errors and non-fatal diagnostics.

use std::fmt;

use thiserror::Error;

/// Conditions that abort a single decode, construction or store call.
/// No partial instance is ever returned alongside one of these.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("not a valid `{type_name}` object: missing {} required field(s): {}", missing.len(), missing.join(", "))]
    MissingFields { type_name: String, missing: Vec<String> },

    #[error("incompatible type for field `{field}`: expected `{expected}`, found `{actual}`")]
    TypeMismatch { field: String, expected: String, actual: String },

    #[error("`{type_name}` has no field `{field}`")]
    UnknownField { type_name: String, field: String },

    #[error("field `{field}` of `{type_name}` is required and can't be deleted")]
    RequiredField { type_name: String, field: String },

    #[error("no object type named `{0}` is registered")]
    UnknownType(String),

    #[error("object type `{0}` is already registered")]
    DuplicateType(String),

    #[error("`{type_name}` declares field `{field}` more than once")]
    DuplicateField { type_name: String, field: String },

    #[error("nesting deeper than {limit} levels at `{path}`")]
    DepthLimit { limit: usize, path: String },

    #[error("input has more than {limit} nodes")]
    NodeLimit { limit: usize },

    #[error("expected a JSON object at the top level, found `{0}`")]
    NotAnObject(String),

    #[error("invalid JSON: {0}")]
    Json(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid type expression `{expr}`: {reason}")]
pub struct TyParseError {
    pub expr: String,
    pub reason: String,
}

impl TyParseError {
    pub(crate) fn new(expr: &str, reason: impl Into<String>) -> Self {
        Self { expr: expr.to_string(), reason: reason.into() }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// DIAGNOSTICS
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// Unresolved object reference or a descriptor that can't drive conversion.
    /// The value passed through unconverted.
    UnsupportedShape,
    /// A value was stored for a name the schema does not declare.
    UnknownField,
    /// One union member failed to decode the value; the next one is tried.
    UnionCandidateRejected,
    /// No union member matched; the value passed through unconverted.
    UnionFallback,
}

/// A non-fatal condition hit while decoding. Never aborts the decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// JSON-path-like location, `$` for the root.
    pub path: String,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}
