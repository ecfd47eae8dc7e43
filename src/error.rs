//! Error types for every stage.
//!
//! Validation collects problems into a [`ValidationReport`]; rendering stops
//! at the first [`RenderError`]. None of these are fatal to the process.

use std::fmt;

use thiserror::Error;

use crate::ast::{BinOp, Span};
use crate::data::FieldPath;

/// Why a field path did not resolve.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("no field `{key}` under {parent}")]
    MissingKey { key: String, parent: String },

    #[error("index {index} is out of bounds for {parent} ({len} items)")]
    IndexOutOfBounds { index: usize, len: usize, parent: String },

    #[error("{parent} ({kind}) has no `{segment}`")]
    NotIndexable { segment: String, parent: String, kind: &'static str },

    #[error("empty field path")]
    Empty,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpressionError {
    #[error("unknown identifier `{path}`: {error}")]
    UnknownIdentifier { path: FieldPath, error: PathError },

    #[error("unsupported operator `{op}` at offset {offset}")]
    UnsupportedOperator { op: String, offset: usize },

    #[error("cannot compare {left} {op} {right}")]
    TypeMismatch { op: BinOp, left: &'static str, right: &'static str },

    #[error("syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },
}

/// Block nesting and tag shape problems.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StructuralError {
    #[error("Unmatched closing tag: {tag} at {span}")]
    UnmatchedClose { tag: String, span: Span },

    #[error("Mismatched tags: {open} (at {open_span}) and {close} at {span}")]
    MismatchedClose { open: String, open_span: Span, close: String, span: Span },

    #[error("Unclosed tag: {tag} at {span}")]
    Unclosed { tag: String, span: Span },

    #[error("{tag} without an enclosing <<if>> at {span}")]
    BranchWithoutIf { tag: String, span: Span },

    #[error("{tag} after <<else>> at {span}")]
    BranchAfterElse { tag: String, span: Span },

    #[error("Invalid expression in {tag} at {span}: {error}")]
    InvalidExpression { tag: String, span: Span, error: ExpressionError },

    #[error("Malformed tag `{text}` at {span}")]
    MalformedTag { text: String, span: Span },
}

/// A field that exists but has the wrong shape for where it is used.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("`{path}` at {span} is not a list (found {kind})")]
    NotAList { path: FieldPath, span: Span, kind: &'static str },

    #[error("`{path}` at {span} is not a single value (found {kind})")]
    NotScalar { path: FieldPath, span: Span, kind: &'static str },
}

/// Everything the validation pass found wrong with a template.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub structural_errors: Vec<StructuralError>,
    /// Paths absent from the data tree, first occurrence order, no repeats.
    pub missing_fields: Vec<FieldPath>,
    pub type_errors: Vec<FieldError>,
}

impl ValidationReport {
    pub fn is_empty(&self) -> bool {
        self.structural_errors.is_empty() && self.missing_fields.is_empty() && self.type_errors.is_empty()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.structural_errors.is_empty() {
            writeln!(f, "Syntax errors found:")?;
            for e in &self.structural_errors {
                writeln!(f, "- {e}")?;
            }
        }
        if !self.missing_fields.is_empty() {
            writeln!(f, "Missing fields (not present in the data):")?;
            for p in &self.missing_fields {
                writeln!(f, "- {p}")?;
            }
        }
        if !self.type_errors.is_empty() {
            writeln!(f, "Fields used with the wrong shape:")?;
            for e in &self.type_errors {
                writeln!(f, "- {e}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ValidationReport {}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderError {
    #[error(transparent)]
    Structural(#[from] StructuralError),

    #[error("cannot resolve `{path}` at {span}: {error}")]
    UnknownField { path: FieldPath, span: Span, error: PathError },

    #[error("`{path}` at {span} is not a list (found {kind})")]
    NotAList { path: FieldPath, span: Span, kind: &'static str },

    #[error("`{path}` at {span} is not a single value (found {kind})")]
    NotScalar { path: FieldPath, span: Span, kind: &'static str },

    #[error("cannot evaluate {tag} at {span}: {error}")]
    Expression { tag: String, span: Span, error: ExpressionError },
}

/// Failure of the combined validate-then-render pipeline.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CheckError {
    #[error("template has problems:\n{0}")]
    Invalid(ValidationReport),

    #[error(transparent)]
    Render(#[from] RenderError),
}
