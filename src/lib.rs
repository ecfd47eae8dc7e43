//! tagmerge: validator and renderer for `<<tag>>`-style mail-merge templates.
//!
//! Report authors write templates as literal text with tags, and want to
//! know before handing them to a document engine whether the tags nest
//! properly and whether every field they reference exists in their JSON
//! data. This crate answers that, and can render the template too.
//!
//! Supported tags:
//! - `<<[Path.To.Field]>>` placeholders; numeric segments index arrays.
//! - `<<var [name = expr]>>`.
//! - `<<foreach [item in Path]>> ... <</foreach>>`, nestable.
//! - `<<if [expr]>> ... <<elseif [expr]>> ... <<else>> ... <</if>>`.
//!
//! Conditions use a small closed grammar: field and variable references,
//! literals, `== != < <= > >=`, `and or not` (also `&& || !`) and
//! parentheses. There is no arithmetic and nothing else can be executed.
//!
//! Text semantics:
//! - Text outside tags is copied byte for byte; no whitespace is trimmed
//!   or added around tags.
//! - A `<<` that does not form one of the tags above is literal text,
//!   unless [`Config::strict_tags`] is set.
//!
//! Typical use is [`check_and_render`], or [`tokenize`] followed by
//! [`validate`] and [`render`] when the report matters on its own.

pub mod ast;
pub mod config;
pub mod data;
pub mod error;
pub mod eval;
pub mod lexer;
pub mod parser;
pub mod render;
pub mod validate;

pub use ast::{Span, Token, TokenKind};
pub use config::Config;
pub use data::{DataNode, FieldPath, Scalar, Segment};
pub use error::{
    CheckError, ExpressionError, FieldError, PathError, RenderError, StructuralError, ValidationReport,
};

/// Split template text into tokens. Never fails.
pub fn tokenize(text: &str) -> Vec<Token> {
    lexer::Tokenizer::new(text).collect()
}

/// Check block nesting and field existence with the default [`Config`].
pub fn validate(tokens: &[Token], data: &DataNode) -> Result<(), ValidationReport> {
    validate_with_config(tokens, data, &Config::default())
}

/// Check block nesting and field existence. Every problem is collected.
pub fn validate_with_config(tokens: &[Token], data: &DataNode, config: &Config) -> Result<(), ValidationReport> {
    validate::validate_tokens(tokens, data, config)
}

/// Render with the default [`Config`].
pub fn render(tokens: &[Token], data: &DataNode) -> Result<String, RenderError> {
    render_with_config(tokens, data, &Config::default())
}

/// Render `tokens` against `data`, failing on the first error.
pub fn render_with_config(tokens: &[Token], data: &DataNode, config: &Config) -> Result<String, RenderError> {
    render::render_tokens(tokens, data, config)
}

/// Tokenize, validate, and render only if validation found nothing.
pub fn check_and_render(text: &str, data: &DataNode, config: &Config) -> Result<String, CheckError> {
    let tokens = tokenize(text);
    validate_with_config(&tokens, data, config).map_err(CheckError::Invalid)?;
    Ok(render_with_config(&tokens, data, config)?)
}
