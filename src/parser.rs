use crate::ast::{BinOp, Expr};
use crate::data::{FieldPath, Scalar, Segment};
use crate::error::ExpressionError;
use crate::lexer::{lex_expr, ExprToken};

/// Upper bound on `not`, parentheses and binary operators in one expression.
/// Evaluation recurses over the tree, so this keeps the stack bounded.
const MAX_OPERATORS: usize = 256;

/// Parse a condition or `var` initialiser.
pub fn parse_expr(src: &str) -> Result<Expr, ExpressionError> {
    let mut parser = Parser::new(src)?;
    let expr = parser.parse_or()?;
    match parser.peek() {
        None => Ok(expr),
        Some(t) => Err(parser.error(format!("unexpected {t:?} after expression"))),
    }
}

struct Parser {
    tokens: Vec<(ExprToken, usize)>,
    pos: usize,
    src_len: usize,
    operators: usize,
}

impl Parser {
    fn new(src: &str) -> Result<Self, ExpressionError> {
        Ok(Self {
            tokens: lex_expr(src)?,
            pos: 0,
            src_len: src.len(),
            operators: 0,
        })
    }

    fn peek(&self) -> Option<&ExprToken> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn consume(&mut self) -> Option<ExprToken> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.src_len, |(_, o)| *o)
    }

    fn error(&self, message: String) -> ExpressionError {
        ExpressionError::Syntax { offset: self.offset(), message }
    }

    fn expect(&mut self, token: ExprToken) -> Result<(), ExpressionError> {
        match self.peek() {
            Some(t) if *t == token => {
                self.pos += 1;
                Ok(())
            }
            Some(t) => Err(self.error(format!("expected {token:?}, got {t:?}"))),
            None => Err(self.error(format!("expected {token:?}, got end of expression"))),
        }
    }

    fn count_operator(&mut self) -> Result<(), ExpressionError> {
        self.operators += 1;
        if self.operators > MAX_OPERATORS {
            return Err(self.error(format!("expression has more than {MAX_OPERATORS} operators")));
        }
        Ok(())
    }

    fn parse_or(&mut self) -> Result<Expr, ExpressionError> {
        let mut lhs = self.parse_and()?;
        while let Some(ExprToken::Op(BinOp::Or)) = self.peek() {
            self.count_operator()?;
            self.consume();
            let rhs = self.parse_and()?;
            lhs = Expr::BinOp(Box::new(lhs), BinOp::Or, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ExpressionError> {
        let mut lhs = self.parse_not()?;
        while let Some(ExprToken::Op(BinOp::And)) = self.peek() {
            self.count_operator()?;
            self.consume();
            let rhs = self.parse_not()?;
            lhs = Expr::BinOp(Box::new(lhs), BinOp::And, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr, ExpressionError> {
        if let Some(ExprToken::Not) = self.peek() {
            self.count_operator()?;
            self.consume();
            let inner = self.parse_not()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_cmp()
    }

    fn parse_cmp(&mut self) -> Result<Expr, ExpressionError> {
        let lhs = self.parse_primary()?;
        match self.peek() {
            Some(ExprToken::Op(op)) if !matches!(op, BinOp::And | BinOp::Or) => {
                let op = *op;
                self.count_operator()?;
                self.consume();
                let rhs = self.parse_primary()?;
                if let Some(ExprToken::Op(next)) = self.peek() {
                    if !matches!(next, BinOp::And | BinOp::Or) {
                        return Err(self.error("comparisons cannot be chained".to_string()));
                    }
                }
                Ok(Expr::BinOp(Box::new(lhs), op, Box::new(rhs)))
            }
            _ => Ok(lhs),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ExpressionError> {
        let offset = self.offset();
        match self.consume() {
            Some(ExprToken::StringLit(s)) => Ok(Expr::Literal(Scalar::String(s))),
            Some(ExprToken::True) => Ok(Expr::Literal(Scalar::Bool(true))),
            Some(ExprToken::False) => Ok(Expr::Literal(Scalar::Bool(false))),
            Some(ExprToken::Null) => Ok(Expr::Literal(Scalar::Null)),
            Some(ExprToken::Number(n)) => n
                .parse::<serde_json::Number>()
                .map(|n| Expr::Literal(Scalar::Number(n)))
                .map_err(|_| ExpressionError::Syntax { offset, message: format!("invalid number `{n}`") }),
            Some(ExprToken::Ident(name)) => self.parse_path(name),
            Some(ExprToken::LParen) => {
                self.count_operator()?;
                let e = self.parse_or()?;
                self.expect(ExprToken::RParen)?;
                Ok(e)
            }
            Some(t) => Err(ExpressionError::Syntax { offset, message: format!("expected a value, got {t:?}") }),
            None => Err(ExpressionError::Syntax { offset, message: "expected a value".to_string() }),
        }
    }

    // Handle `.name` and `.0` suffixes.
    fn parse_path(&mut self, root: String) -> Result<Expr, ExpressionError> {
        let mut segments = vec![Segment::Name(root)];
        while let Some(ExprToken::Dot) = self.peek() {
            self.consume();
            let offset = self.offset();
            match self.consume() {
                Some(ExprToken::Ident(name)) => segments.push(Segment::Name(name)),
                Some(ExprToken::Number(n)) => match n.parse::<usize>() {
                    Ok(i) => segments.push(Segment::Index(i)),
                    Err(_) => {
                        return Err(ExpressionError::Syntax { offset, message: format!("invalid index `{n}`") })
                    }
                },
                t => {
                    return Err(ExpressionError::Syntax {
                        offset,
                        message: format!("expected a field name after `.`, got {t:?}"),
                    })
                }
            }
        }
        Ok(Expr::Path(FieldPath::from_segments(segments)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn path(s: &str) -> Expr {
        Expr::Path(FieldPath::parse(s).unwrap())
    }

    fn num(s: &str) -> Expr {
        Expr::Literal(Scalar::Number(s.parse().unwrap()))
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let e = parse_expr("a or b and not c").unwrap();
        assert_eq!(
            e,
            Expr::BinOp(
                Box::new(path("a")),
                BinOp::Or,
                Box::new(Expr::BinOp(
                    Box::new(path("b")),
                    BinOp::And,
                    Box::new(Expr::Not(Box::new(path("c")))),
                )),
            )
        );
    }

    #[test]
    fn comparison_with_paths_and_literals() {
        assert_eq!(
            parse_expr("Orders.0.Qty >= 10").unwrap(),
            Expr::BinOp(Box::new(path("Orders.0.Qty")), BinOp::Ge, Box::new(num("10")))
        );
        assert_eq!(
            parse_expr("(x != 'a')").unwrap(),
            Expr::BinOp(Box::new(path("x")), BinOp::Ne, Box::new(Expr::Literal(Scalar::String("a".into()))))
        );
    }

    #[test]
    fn symbolic_aliases_parse_like_words() {
        assert_eq!(parse_expr("!a && b || c").unwrap(), parse_expr("not a and b or c").unwrap());
    }

    #[test]
    fn literals() {
        assert_eq!(parse_expr("true").unwrap(), Expr::Literal(Scalar::Bool(true)));
        assert_eq!(parse_expr("null").unwrap(), Expr::Literal(Scalar::Null));
        assert_eq!(parse_expr("-1.5").unwrap(), num("-1.5"));
    }

    #[test]
    fn syntax_errors_carry_offsets() {
        assert_eq!(
            parse_expr("a ==").unwrap_err(),
            ExpressionError::Syntax { offset: 4, message: "expected a value".into() }
        );
        assert!(matches!(parse_expr(""), Err(ExpressionError::Syntax { offset: 0, .. })));
        assert!(matches!(parse_expr("(a"), Err(ExpressionError::Syntax { .. })));
        assert!(matches!(parse_expr("a b"), Err(ExpressionError::Syntax { offset: 2, .. })));
        assert!(matches!(parse_expr("a < b < c"), Err(ExpressionError::Syntax { .. })));
        assert!(matches!(parse_expr("a."), Err(ExpressionError::Syntax { .. })));
    }

    #[test]
    fn runaway_nesting_is_a_syntax_error() {
        let nots = format!("{}a", "not ".repeat(10_000));
        assert!(matches!(parse_expr(&nots), Err(ExpressionError::Syntax { .. })));
        let parens = format!("{}a{}", "(".repeat(10_000), ")".repeat(10_000));
        assert!(matches!(parse_expr(&parens), Err(ExpressionError::Syntax { .. })));
        let chain = vec!["a"; 1_000].join(" and ");
        assert!(matches!(parse_expr(&chain), Err(ExpressionError::Syntax { .. })));
        // Ordinary conditions stay well under the limit.
        let nested = format!("{}a == 1{}", "(".repeat(20), ")".repeat(20));
        assert!(parse_expr(&nested).is_ok());
    }

    #[test]
    fn paths_are_collected_in_order() {
        let e = parse_expr("A.B == 1 or not (C and D.0)").unwrap();
        let paths: Vec<String> = e.paths().iter().map(ToString::to_string).collect();
        assert_eq!(paths, vec!["A.B", "C", "D.0"]);
    }
}
