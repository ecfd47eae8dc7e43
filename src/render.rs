//! Second pass: walk the tokens with live data and produce output.
//!
//! The walk is flat. A `foreach` that has more items jumps back to the
//! token after its open tag, and blocks that are not rendering are still
//! walked (once) so nesting stays checked and nothing in them is evaluated.

use std::borrow::Cow;

use tracing::trace;

use crate::ast::{Expr, Token, TokenKind};
use crate::config::Config;
use crate::data::{DataNode, FieldPath, Scalar};
use crate::error::{RenderError, StructuralError};
use crate::eval::{Environment, Evaluator, Value};
use crate::lexer::stray_openers;
use crate::parser::parse_expr;

enum Frame<'t, 'd> {
    If {
        token: usize,
        /// The branch being walked renders.
        live: bool,
        parent_live: bool,
        matched: bool,
        else_seen: bool,
    },
    Foreach {
        token: usize,
        name: &'t str,
        live: bool,
        items: Cow<'d, [DataNode]>,
        next: usize,
    },
}

impl Frame<'_, '_> {
    fn live(&self) -> bool {
        match self {
            Frame::If { live, .. } | Frame::Foreach { live, .. } => *live,
        }
    }

    fn token(&self) -> usize {
        match self {
            Frame::If { token, .. } | Frame::Foreach { token, .. } => *token,
        }
    }
}

fn item_at<'d>(items: &Cow<'d, [DataNode]>, i: usize) -> Option<Value<'d>> {
    match items {
        Cow::Borrowed(slice) => {
            let slice: &'d [DataNode] = *slice;
            slice.get(i).map(Cow::Borrowed)
        }
        Cow::Owned(vec) => vec.get(i).cloned().map(Cow::Owned),
    }
}

/// Render `tokens` against `data`, stopping at the first error.
pub fn render_tokens(tokens: &[Token], data: &DataNode, config: &Config) -> Result<String, RenderError> {
    let _span = tracing::debug_span!("render", tokens = tokens.len()).entered();
    let renderer = Renderer {
        tokens,
        data,
        config,
        env: Environment::new(),
        stack: Vec::new(),
        out: String::new(),
    };
    renderer.run()
}

struct Renderer<'t, 'd> {
    tokens: &'t [Token],
    data: &'d DataNode,
    config: &'t Config,
    env: Environment<'d>,
    stack: Vec<Frame<'t, 'd>>,
    out: String,
}

impl<'t, 'd> Renderer<'t, 'd> {
    fn run(mut self) -> Result<String, RenderError> {
        let mut pc = 0;
        while let Some(token) = self.tokens.get(pc) {
            pc = self.step(pc, token)?;
        }
        if let Some(frame) = self.stack.first() {
            let open = &self.tokens[frame.token()];
            return Err(StructuralError::Unclosed { tag: open.kind.describe(), span: open.span }.into());
        }
        Ok(self.out)
    }

    fn live(&self) -> bool {
        self.stack.last().map_or(true, Frame::live)
    }

    /// Handle one token and return the index of the next one.
    fn step(&mut self, pc: usize, token: &'t Token) -> Result<usize, RenderError> {
        let live = self.live();
        match &token.kind {
            TokenKind::Text(text) => {
                if self.config.strict_tags {
                    if let Some(error) = stray_openers(text, token.span).into_iter().next() {
                        return Err(error.into());
                    }
                }
                if live {
                    self.out.push_str(text);
                }
            }
            TokenKind::FieldRef(path) => {
                if live {
                    self.substitute(path, token)?;
                }
            }
            TokenKind::VarDecl { name, expr } => {
                let expr = self.parse(token, expr)?;
                if live {
                    let value = self.eval(token, &expr)?;
                    self.env.set_local(name.clone(), value);
                }
            }
            TokenKind::ForeachOpen { item, list } => self.open_foreach(pc, token, item, list, live)?,
            TokenKind::ForeachClose => return self.close_foreach(pc, token),
            TokenKind::IfOpen(expr) => {
                let expr = self.parse(token, expr)?;
                let taken = live && self.condition(token, &expr)?;
                trace!(tag = %token.kind.describe(), taken, "if");
                self.env.push_scope();
                self.stack.push(Frame::If {
                    token: pc,
                    live: taken,
                    parent_live: live,
                    matched: taken,
                    else_seen: false,
                });
            }
            TokenKind::ElseIf(expr) => {
                let (parent_live, matched) = self.open_if(token)?;
                self.next_branch_scope();
                let expr = self.parse(token, expr)?;
                let taken = parent_live && !matched && self.condition(token, &expr)?;
                trace!(tag = %token.kind.describe(), taken, "elseif");
                if let Some(Frame::If { live, matched, .. }) = self.stack.last_mut() {
                    *live = taken;
                    *matched |= taken;
                }
            }
            TokenKind::Else => {
                let (parent_live, matched) = self.open_if(token)?;
                self.next_branch_scope();
                if let Some(Frame::If { live, matched: m, else_seen, .. }) = self.stack.last_mut() {
                    *live = parent_live && !matched;
                    *m = true;
                    *else_seen = true;
                }
            }
            TokenKind::IfClose => match self.stack.last() {
                Some(Frame::If { .. }) => {
                    self.stack.pop();
                    self.env.pop_scope();
                }
                _ => return Err(self.bad_close(token)),
            },
        }
        Ok(pc + 1)
    }

    // Each branch of an `if` gets a fresh scope for its `var`s.
    fn next_branch_scope(&mut self) {
        self.env.pop_scope();
        self.env.push_scope();
    }

    /// The innermost `if` that an `elseif`/`else` continues: (parent live, already matched).
    fn open_if(&self, token: &Token) -> Result<(bool, bool), RenderError> {
        let tag = || token.kind.describe();
        match self.stack.last() {
            Some(Frame::If { else_seen: true, .. }) => {
                Err(StructuralError::BranchAfterElse { tag: tag(), span: token.span }.into())
            }
            Some(Frame::If { parent_live, matched, .. }) => Ok((*parent_live, *matched)),
            _ => Err(StructuralError::BranchWithoutIf { tag: tag(), span: token.span }.into()),
        }
    }

    fn open_foreach(
        &mut self,
        pc: usize,
        token: &Token,
        name: &'t str,
        list: &FieldPath,
        live: bool,
    ) -> Result<(), RenderError> {
        if !live {
            self.stack.push(Frame::Foreach { token: pc, name, live: false, items: Cow::Borrowed(&[]), next: 0 });
            return Ok(());
        }
        let value = self.env.resolve(list, self.data).map_err(|error| RenderError::UnknownField {
            path: list.clone(),
            span: token.span,
            error,
        })?;
        let items: Cow<'d, [DataNode]> = match value {
            Cow::Borrowed(DataNode::Array(items)) => Cow::Borrowed(items.as_slice()),
            Cow::Owned(DataNode::Array(items)) => Cow::Owned(items),
            other => {
                return Err(RenderError::NotAList { path: list.clone(), span: token.span, kind: other.kind() });
            }
        };
        trace!(%list, count = items.len(), "foreach");
        let first = item_at(&items, 0);
        let live = first.is_some();
        if let Some(first) = first {
            self.env.push_scope();
            self.env.set_local(name, first);
        }
        self.stack.push(Frame::Foreach { token: pc, name, live, items, next: 1 });
        Ok(())
    }

    fn close_foreach(&mut self, pc: usize, token: &Token) -> Result<usize, RenderError> {
        match self.stack.last_mut() {
            Some(Frame::Foreach { token: open, name, live: true, items, next }) => {
                if let Some(item) = item_at(items, *next) {
                    trace!(item = %name, index = *next, "next iteration");
                    *next += 1;
                    self.env.pop_scope();
                    self.env.push_scope();
                    self.env.set_local(*name, item);
                    return Ok(*open + 1);
                }
                self.env.pop_scope();
            }
            Some(Frame::Foreach { .. }) => {}
            Some(Frame::If { .. }) | None => return Err(self.bad_close(token)),
        }
        self.stack.pop();
        Ok(pc + 1)
    }

    fn bad_close(&mut self, token: &Token) -> RenderError {
        let error = match self.stack.pop() {
            None => StructuralError::UnmatchedClose { tag: token.kind.describe(), span: token.span },
            Some(frame) => {
                let open = &self.tokens[frame.token()];
                StructuralError::MismatchedClose {
                    open: open.kind.describe(),
                    open_span: open.span,
                    close: token.kind.describe(),
                    span: token.span,
                }
            }
        };
        error.into()
    }

    fn substitute(&mut self, path: &FieldPath, token: &Token) -> Result<(), RenderError> {
        let value = self.env.resolve(path, self.data).map_err(|error| RenderError::UnknownField {
            path: path.clone(),
            span: token.span,
            error,
        })?;
        match value.as_scalar() {
            Some(Scalar::Null) => self.out.push_str(&self.config.null_text),
            Some(scalar) => self.out.push_str(&scalar.to_string()),
            None => {
                return Err(RenderError::NotScalar { path: path.clone(), span: token.span, kind: value.kind() });
            }
        }
        Ok(())
    }

    fn parse(&self, token: &Token, src: &str) -> Result<Expr, RenderError> {
        parse_expr(src).map_err(|error| {
            StructuralError::InvalidExpression { tag: token.kind.describe(), span: token.span, error }.into()
        })
    }

    fn eval(&self, token: &Token, expr: &Expr) -> Result<Value<'d>, RenderError> {
        Evaluator::new(self.data, &self.env).eval(expr).map_err(|error| RenderError::Expression {
            tag: token.kind.describe(),
            span: token.span,
            error,
        })
    }

    fn condition(&self, token: &Token, expr: &Expr) -> Result<bool, RenderError> {
        Ok(self.eval(token, expr)?.is_truthy())
    }
}
