use crate::ast::{BinOp, Span, Token, TokenKind};
use crate::data::FieldPath;
use crate::error::{ExpressionError, StructuralError};

/// Splits template text into literal text and tags.
///
/// Never fails: anything starting with `<<` that is not one of the known
/// tag shapes stays in the surrounding text.
#[derive(Clone)]
pub struct Tokenizer<'a> {
    input: &'a str,
    cursor: usize,
    line: usize,
    column: usize,
    // A tag found while scanning text, waiting to be returned next.
    pending: Option<(TokenKind, usize)>,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            cursor: 0,
            line: 1,
            column: 1,
            pending: None,
        }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.cursor..]
    }

    fn advance(&mut self, n: usize) -> Span {
        let start = Span {
            start: self.cursor,
            end: self.cursor + n,
            line: self.line,
            column: self.column,
        };
        for c in self.input[self.cursor..self.cursor + n].chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.cursor += n;
        start
    }

    pub fn next_token(&mut self) -> Option<Token> {
        if let Some((kind, len)) = self.pending.take() {
            let span = self.advance(len);
            return Some(Token { kind, span });
        }

        let rest = self.remaining();
        if rest.is_empty() {
            return None;
        }

        // Find the first `<<` that opens a real tag; everything before it is text.
        let mut scan = 0;
        while let Some(found) = rest[scan..].find("<<") {
            let at = scan + found;
            if let Some((kind, len)) = match_tag(&rest[at..]) {
                if at == 0 {
                    let span = self.advance(len);
                    return Some(Token { kind, span });
                }
                self.pending = Some((kind, len));
                let span = self.advance(at);
                return Some(Token { kind: TokenKind::Text(rest[..at].to_string()), span });
            }
            scan = at + 1;
        }

        let span = self.advance(rest.len());
        Some(Token { kind: TokenKind::Text(rest.to_string()), span })
    }
}

impl Iterator for Tokenizer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        self.next_token()
    }
}

/// Try to read one tag at the start of `rest`, returning it and its byte length.
fn match_tag(rest: &str) -> Option<(TokenKind, usize)> {
    let body = rest.strip_prefix("<<")?;

    for (lit, kind) in [
        ("/foreach>>", TokenKind::ForeachClose),
        ("/if>>", TokenKind::IfClose),
        ("else>>", TokenKind::Else),
    ] {
        if body.starts_with(lit) {
            return Some((kind, 2 + lit.len()));
        }
    }

    if let Some(after) = body.strip_prefix('[') {
        let (payload, used) = bracketed(after)?;
        let path = FieldPath::parse(payload.trim())?;
        return Some((TokenKind::FieldRef(path), 2 + 1 + used));
    }

    for keyword in ["elseif", "foreach", "var", "if"] {
        let Some(after_kw) = body.strip_prefix(keyword) else {
            continue;
        };
        let trimmed = after_kw.trim_start();
        let gap = after_kw.len() - trimmed.len();
        if gap == 0 {
            continue;
        }
        let Some(after) = trimmed.strip_prefix('[') else {
            continue;
        };
        let (payload, used) = bracketed(after)?;
        let kind = match keyword {
            "elseif" => TokenKind::ElseIf(payload.trim().to_string()),
            "if" => TokenKind::IfOpen(payload.trim().to_string()),
            "foreach" => foreach_payload(payload)?,
            _ => var_payload(payload)?,
        };
        return Some((kind, 2 + keyword.len() + gap + 1 + used));
    }

    None
}

/// Payload up to the first `]>>`, and the bytes consumed including it.
fn bracketed(after: &str) -> Option<(&str, usize)> {
    let end = after.find("]>>")?;
    Some((&after[..end], end + 3))
}

fn foreach_payload(payload: &str) -> Option<TokenKind> {
    let mut parts = payload.split_whitespace();
    let item = parts.next()?;
    if parts.next()? != "in" {
        return None;
    }
    let list = FieldPath::parse(parts.next()?)?;
    if parts.next().is_some() || !is_ident(item) {
        return None;
    }
    Some(TokenKind::ForeachOpen { item: item.to_string(), list })
}

fn var_payload(payload: &str) -> Option<TokenKind> {
    let (name, expr) = payload.split_once('=')?;
    let name = name.trim();
    if !is_ident(name) || expr.starts_with('=') {
        return None;
    }
    Some(TokenKind::VarDecl { name: name.to_string(), expr: expr.trim().to_string() })
}

pub(crate) fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Every `<<` left in a text token, reported as a malformed tag.
pub(crate) fn stray_openers(text: &str, span: Span) -> Vec<StructuralError> {
    text.match_indices("<<")
        .map(|(at, _)| {
            let snippet: String = match text[at..].find(">>") {
                Some(end) if end < 64 => text[at..at + end + 2].to_string(),
                _ => text[at..].chars().take(24).collect(),
            };
            StructuralError::MalformedTag { span: span.within(text, at, snippet.len()), text: snippet }
        })
        .collect()
}

// ── Expression lexing ──

#[derive(Debug, Clone, PartialEq)]
pub enum ExprToken {
    Ident(String),
    Number(String),
    StringLit(String),
    Dot,
    LParen,
    RParen,
    Op(BinOp),
    Not,
    True,
    False,
    Null,
}

impl ExprToken {
    fn ends_operand(&self) -> bool {
        matches!(
            self,
            ExprToken::Ident(_)
                | ExprToken::Number(_)
                | ExprToken::StringLit(_)
                | ExprToken::RParen
                | ExprToken::True
                | ExprToken::False
                | ExprToken::Null
        )
    }
}

/// Tokenise a tag payload. Tokens are paired with their byte offset.
pub fn lex_expr(src: &str) -> Result<Vec<(ExprToken, usize)>, ExpressionError> {
    let mut out: Vec<(ExprToken, usize)> = Vec::new();
    let mut cursor = 0;

    while cursor < src.len() {
        let rest = &src[cursor..];
        let Some(first) = rest.chars().next() else {
            break;
        };
        if first.is_whitespace() {
            cursor += first.len_utf8();
            continue;
        }
        let after_dot = matches!(out.last(), Some((ExprToken::Dot, _)));
        let after_operand = out.last().is_some_and(|(t, _)| t.ends_operand());

        // Two-char operators first.
        let two = rest.get(..2);
        let op = match two {
            Some("==") => Some((ExprToken::Op(BinOp::Eq), 2)),
            Some("!=") => Some((ExprToken::Op(BinOp::Ne), 2)),
            Some("<=") => Some((ExprToken::Op(BinOp::Le), 2)),
            Some(">=") => Some((ExprToken::Op(BinOp::Ge), 2)),
            Some("&&") => Some((ExprToken::Op(BinOp::And), 2)),
            Some("||") => Some((ExprToken::Op(BinOp::Or), 2)),
            _ => match first {
                '<' => Some((ExprToken::Op(BinOp::Lt), 1)),
                '>' => Some((ExprToken::Op(BinOp::Gt), 1)),
                '!' => Some((ExprToken::Not, 1)),
                '.' => Some((ExprToken::Dot, 1)),
                '(' => Some((ExprToken::LParen, 1)),
                ')' => Some((ExprToken::RParen, 1)),
                _ => None,
            },
        };
        if let Some((token, len)) = op {
            out.push((token, cursor));
            cursor += len;
            continue;
        }

        if first == '\'' || first == '"' {
            let (s, len) = lex_string(rest, first).ok_or_else(|| ExpressionError::Syntax {
                offset: cursor,
                message: "unterminated string".to_string(),
            })?;
            out.push((ExprToken::StringLit(s), cursor));
            cursor += len;
            continue;
        }

        let negative = first == '-'
            && !after_operand
            && rest[1..].starts_with(|c: char| c.is_ascii_digit());
        if first.is_ascii_digit() || negative {
            let len = lex_number(rest, negative, after_dot);
            out.push((ExprToken::Number(rest[..len].to_string()), cursor));
            cursor += len;
            continue;
        }

        if first.is_ascii_alphabetic() || first == '_' {
            let len = rest
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(rest.len());
            let word = &rest[..len];
            // Keywords are plain names when they follow a dot (`Flags.not`).
            let token = match word {
                _ if after_dot => ExprToken::Ident(word.to_string()),
                "and" => ExprToken::Op(BinOp::And),
                "or" => ExprToken::Op(BinOp::Or),
                "not" => ExprToken::Not,
                "true" => ExprToken::True,
                "false" => ExprToken::False,
                "null" => ExprToken::Null,
                _ => ExprToken::Ident(word.to_string()),
            };
            out.push((token, cursor));
            cursor += len;
            continue;
        }

        if "+-*/%=&|^~?:,[]{}".contains(first) {
            return Err(ExpressionError::UnsupportedOperator { op: first.to_string(), offset: cursor });
        }
        return Err(ExpressionError::Syntax {
            offset: cursor,
            message: format!("unexpected character `{first}`"),
        });
    }

    Ok(out)
}

/// Quoted string starting at `rest[0]`; returns the unescaped text and its byte length.
fn lex_string(rest: &str, quote: char) -> Option<(String, usize)> {
    let mut s = String::new();
    let mut chars = rest.char_indices().skip(1);
    while let Some((i, c)) = chars.next() {
        if c == quote {
            return Some((s, i + 1));
        }
        if c == '\\' {
            let (_, esc) = chars.next()?;
            match esc {
                'n' => s.push('\n'),
                't' => s.push('\t'),
                _ => s.push(esc),
            }
        } else {
            s.push(c);
        }
    }
    None
}

fn lex_number(rest: &str, negative: bool, integer_only: bool) -> usize {
    let bytes = rest.as_bytes();
    let mut len = usize::from(negative);
    while len < bytes.len() && bytes[len].is_ascii_digit() {
        len += 1;
    }
    // `A.0.1` is a path, so after a dot only the integer part is taken.
    if !integer_only && len + 1 < bytes.len() && bytes[len] == b'.' && bytes[len + 1].is_ascii_digit() {
        len += 1;
        while len < bytes.len() && bytes[len].is_ascii_digit() {
            len += 1;
        }
    }
    len
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(text: &str) -> Vec<TokenKind> {
        Tokenizer::new(text).map(|t| t.kind).collect()
    }

    fn path(s: &str) -> FieldPath {
        FieldPath::parse(s).unwrap()
    }

    #[test]
    fn recognises_every_tag_shape() {
        let text = "<<[A.B]>><<var [n = 1]>><<foreach [o in Orders]>><</foreach>>\
<<if [x]>><<elseif [y]>><<else>><</if>>";
        assert_eq!(
            kinds(text),
            vec![
                TokenKind::FieldRef(path("A.B")),
                TokenKind::VarDecl { name: "n".into(), expr: "1".into() },
                TokenKind::ForeachOpen { item: "o".into(), list: path("Orders") },
                TokenKind::ForeachClose,
                TokenKind::IfOpen("x".into()),
                TokenKind::ElseIf("y".into()),
                TokenKind::Else,
                TokenKind::IfClose,
            ]
        );
    }

    #[test]
    fn text_between_tags_is_kept_verbatim() {
        assert_eq!(
            kinds("Dear <<[Name]>>,\n  thanks!\n"),
            vec![
                TokenKind::Text("Dear ".into()),
                TokenKind::FieldRef(path("Name")),
                TokenKind::Text(",\n  thanks!\n".into()),
            ]
        );
    }

    #[test]
    fn malformed_openers_stay_text_and_merge() {
        assert_eq!(
            kinds("a << b <<foo>> <<if>> <<[bad path]>> c"),
            vec![TokenKind::Text("a << b <<foo>> <<if>> <<[bad path]>> c".into())]
        );
    }

    #[test]
    fn triple_angle_yields_text_then_tag() {
        assert_eq!(
            kinds("<<<[A]>>"),
            vec![TokenKind::Text("<".into()), TokenKind::FieldRef(path("A"))]
        );
    }

    #[test]
    fn keyword_needs_whitespace_before_bracket() {
        assert_eq!(kinds("<<if[x]>>"), vec![TokenKind::Text("<<if[x]>>".into())]);
        assert_eq!(kinds("<<if \t[x]>>"), vec![TokenKind::IfOpen("x".into())]);
    }

    #[test]
    fn condition_payload_may_contain_angle_brackets() {
        assert_eq!(kinds("<<if [a > 1 and b <= 2]>>"), vec![TokenKind::IfOpen("a > 1 and b <= 2".into())]);
    }

    #[test]
    fn bad_foreach_and_var_payloads_stay_text() {
        assert_eq!(kinds("<<foreach [o Orders]>>").len(), 1);
        assert!(matches!(kinds("<<foreach [o Orders]>>")[0], TokenKind::Text(_)));
        assert!(matches!(kinds("<<var [a == b]>>")[0], TokenKind::Text(_)));
        assert!(matches!(kinds("<<var [1x = b]>>")[0], TokenKind::Text(_)));
    }

    #[test]
    fn spans_track_lines_and_columns() {
        let tokens: Vec<Token> = Tokenizer::new("ab\ncd <<[X]>>\n<</if>>").collect();
        assert_eq!(tokens[1].span, Span { start: 6, end: 13, line: 2, column: 4 });
        assert_eq!(tokens[3].span.line, 3);
        assert_eq!(tokens[3].span.column, 1);
    }

    #[test]
    fn stray_openers_are_located() {
        let errs = stray_openers("x\n y <<oops>>", Span { start: 10, end: 23, line: 4, column: 2 });
        assert_eq!(
            errs,
            vec![StructuralError::MalformedTag {
                text: "<<oops>>".into(),
                span: Span { start: 15, end: 23, line: 5, column: 4 },
            }]
        );
    }

    #[test]
    fn lexes_expression_tokens() {
        let toks: Vec<ExprToken> = lex_expr("not (a.b >= -2.5) || c == 'x\\'y'")
            .unwrap()
            .into_iter()
            .map(|(t, _)| t)
            .collect();
        assert_eq!(
            toks,
            vec![
                ExprToken::Not,
                ExprToken::LParen,
                ExprToken::Ident("a".into()),
                ExprToken::Dot,
                ExprToken::Ident("b".into()),
                ExprToken::Op(BinOp::Ge),
                ExprToken::Number("-2.5".into()),
                ExprToken::RParen,
                ExprToken::Op(BinOp::Or),
                ExprToken::Ident("c".into()),
                ExprToken::Op(BinOp::Eq),
                ExprToken::StringLit("x'y".into()),
            ]
        );
    }

    #[test]
    fn path_indices_are_not_decimals() {
        let toks: Vec<ExprToken> = lex_expr("A.0.1").unwrap().into_iter().map(|(t, _)| t).collect();
        assert_eq!(
            toks,
            vec![
                ExprToken::Ident("A".into()),
                ExprToken::Dot,
                ExprToken::Number("0".into()),
                ExprToken::Dot,
                ExprToken::Number("1".into()),
            ]
        );
    }

    #[test]
    fn rejects_arithmetic_and_assignment() {
        assert_eq!(
            lex_expr("a + 1"),
            Err(ExpressionError::UnsupportedOperator { op: "+".into(), offset: 2 })
        );
        assert!(matches!(lex_expr("a = 1"), Err(ExpressionError::UnsupportedOperator { .. })));
        assert!(matches!(lex_expr("a - 1"), Err(ExpressionError::UnsupportedOperator { .. })));
        assert!(matches!(lex_expr("'open"), Err(ExpressionError::Syntax { .. })));
    }
}
