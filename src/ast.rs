use std::fmt;

use crate::data::{FieldPath, Scalar};

/// Location of a token in the template source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// Byte offsets, end exclusive.
    pub start: usize,
    pub end: usize,
    /// 1-based line and column of `start`.
    pub line: usize,
    pub column: usize,
}

impl Span {
    /// Sub-span of `text` (the source this span covers) at byte `offset`.
    pub(crate) fn within(&self, text: &str, offset: usize, len: usize) -> Span {
        let mut line = self.line;
        let mut column = self.column;
        for c in text[..offset].chars() {
            if c == '\n' {
                line += 1;
                column = 1;
            } else {
                column += 1;
            }
        }
        Span { start: self.start + offset, end: self.start + offset + len, line, column }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Text(String),
    FieldRef(FieldPath),                           // <<[A.B]>>
    VarDecl { name: String, expr: String },        // <<var [name = expr]>>
    ForeachOpen { item: String, list: FieldPath }, // <<foreach [item in A.B]>>
    ForeachClose,
    // Conditions are kept as source text and parsed by each pass.
    IfOpen(String), // <<if [expr]>>
    ElseIf(String), // <<elseif [expr]>>
    Else,
    IfClose,
}

impl TokenKind {
    /// The tag as it reads in a template, for error messages.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Text(s) => s.clone(),
            TokenKind::FieldRef(path) => format!("<<[{path}]>>"),
            TokenKind::VarDecl { name, expr } => format!("<<var [{name} = {expr}]>>"),
            TokenKind::ForeachOpen { item, list } => format!("<<foreach [{item} in {list}]>>"),
            TokenKind::ForeachClose => "<</foreach>>".to_string(),
            TokenKind::IfOpen(expr) => format!("<<if [{expr}]>>"),
            TokenKind::ElseIf(expr) => format!("<<elseif [{expr}]>>"),
            TokenKind::Else => "<<else>>".to_string(),
            TokenKind::IfClose => "<</if>>".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "and",
            BinOp::Or => "or",
        })
    }
}

/// Condition and `var` initialiser expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Scalar),
    Path(FieldPath),
    Not(Box<Expr>),
    BinOp(Box<Expr>, BinOp, Box<Expr>),
}

impl Expr {
    /// Every field path the expression reads, in source order.
    pub fn paths(&self) -> Vec<&FieldPath> {
        let mut out = Vec::new();
        self.collect_paths(&mut out);
        out
    }

    fn collect_paths<'e>(&'e self, out: &mut Vec<&'e FieldPath>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Path(p) => out.push(p),
            Expr::Not(inner) => inner.collect_paths(out),
            Expr::BinOp(lhs, _, rhs) => {
                lhs.collect_paths(out);
                rhs.collect_paths(out);
            }
        }
    }
}
