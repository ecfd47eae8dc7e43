use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::ast::{BinOp, Expr};
use crate::data::{DataNode, FieldPath, Scalar};
use crate::error::{ExpressionError, PathError};

/// A value during evaluation: either a node of the data tree or an owned
/// literal.
pub type Value<'d> = Cow<'d, DataNode>;

/// Variable bindings, innermost scope last.
///
/// The root scope holds top-level `var` declarations. Every live `foreach`
/// iteration gets its own scope, so an inner loop variable hides an outer
/// one with the same name until that iteration ends. The renderer gives
/// each `if` branch a scope as well, so a `var` declared in a branch ends
/// with it.
#[derive(Debug, Clone)]
pub struct Environment<'d> {
    scopes: Vec<HashMap<String, Value<'d>>>,
}

impl Default for Environment<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'d> Environment<'d> {
    pub fn new() -> Self {
        Self {
            scopes: vec![HashMap::new()],
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value<'d>> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop_scope(&mut self) {
        // The root scope is never popped.
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub fn set_local(&mut self, name: impl Into<String>, value: Value<'d>) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.into(), value);
        }
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Resolve a path: a bound variable root first, the data tree otherwise.
    pub fn resolve(&self, path: &FieldPath, data: &'d DataNode) -> Result<Value<'d>, PathError> {
        let index_of = |name: &str| self.get(name).and_then(|v| v.as_index());
        let bound = path.root_name().and_then(|root| self.get(root));
        match bound {
            None => path.walk(data, 0, &index_of).map(Cow::Borrowed),
            Some(value) if path.segments().len() == 1 => Ok(value.clone()),
            Some(Cow::Borrowed(node)) => {
                let node: &'d DataNode = *node;
                path.walk(node, 1, &index_of).map(Cow::Borrowed)
            }
            Some(Cow::Owned(node)) => path.walk(node, 1, &index_of).map(|n| Cow::Owned(n.clone())),
        }
    }
}

/// Evaluates the closed expression grammar against data and bindings.
/// Nothing outside that grammar can run.
pub struct Evaluator<'e, 'd> {
    data: &'d DataNode,
    env: &'e Environment<'d>,
}

impl<'e, 'd> Evaluator<'e, 'd> {
    pub fn new(data: &'d DataNode, env: &'e Environment<'d>) -> Self {
        Self { data, env }
    }

    pub fn condition(&self, expr: &Expr) -> Result<bool, ExpressionError> {
        Ok(self.eval(expr)?.is_truthy())
    }

    pub fn eval(&self, expr: &Expr) -> Result<Value<'d>, ExpressionError> {
        match expr {
            Expr::Literal(s) => Ok(Cow::Owned(DataNode::Scalar(s.clone()))),
            Expr::Path(path) => self
                .env
                .resolve(path, self.data)
                .map_err(|error| ExpressionError::UnknownIdentifier { path: path.clone(), error }),
            Expr::Not(inner) => Ok(Cow::Owned(DataNode::bool(!self.condition(inner)?))),
            Expr::BinOp(lhs, BinOp::And, rhs) => {
                let result = self.condition(lhs)? && self.condition(rhs)?;
                Ok(Cow::Owned(DataNode::bool(result)))
            }
            Expr::BinOp(lhs, BinOp::Or, rhs) => {
                let result = self.condition(lhs)? || self.condition(rhs)?;
                Ok(Cow::Owned(DataNode::bool(result)))
            }
            Expr::BinOp(lhs, op, rhs) => {
                let l = self.eval(lhs)?;
                let r = self.eval(rhs)?;
                compare(&l, *op, &r).map(|b| Cow::Owned(DataNode::bool(b)))
            }
        }
    }
}

fn compare(l: &DataNode, op: BinOp, r: &DataNode) -> Result<bool, ExpressionError> {
    match op {
        BinOp::Eq => return Ok(equal(l, r)),
        BinOp::Ne => return Ok(!equal(l, r)),
        _ => {}
    }
    let mismatch = || ExpressionError::TypeMismatch { op, left: l.kind(), right: r.kind() };
    let ordering = match (l.as_scalar(), r.as_scalar()) {
        (Some(Scalar::Number(a)), Some(Scalar::Number(b))) => {
            let (a, b) = (a.as_f64().ok_or_else(mismatch)?, b.as_f64().ok_or_else(mismatch)?);
            a.partial_cmp(&b).ok_or_else(mismatch)?
        }
        (Some(Scalar::String(a)), Some(Scalar::String(b))) => a.cmp(b),
        _ => return Err(mismatch()),
    };
    Ok(match op {
        BinOp::Lt => ordering == Ordering::Less,
        BinOp::Le => ordering != Ordering::Greater,
        BinOp::Gt => ordering == Ordering::Greater,
        _ => ordering != Ordering::Less,
    })
}

/// Numbers compare by value (`1 == 1.0`); other kinds must match exactly.
fn equal(l: &DataNode, r: &DataNode) -> bool {
    match (l.as_scalar(), r.as_scalar()) {
        (Some(Scalar::Number(a)), Some(Scalar::Number(b))) => a.as_f64() == b.as_f64(),
        _ => l == r,
    }
}
