//! First pass: block nesting, tag payloads and field existence.

use std::collections::HashSet;

use tracing::debug;

use crate::ast::{Span, Token, TokenKind};
use crate::config::Config;
use crate::data::{DataNode, FieldPath};
use crate::error::{FieldError, PathError, StructuralError, ValidationReport};
use crate::lexer::stray_openers;
use crate::parser::parse_expr;

/// How a path is used, which decides the shape it must have.
#[derive(Clone, Copy)]
enum Usage {
    Scalar,
    List,
    Any,
}

enum Frame<'t> {
    If { token: &'t Token, else_seen: bool },
    Foreach { token: &'t Token },
}

impl Frame<'_> {
    fn token(&self) -> &Token {
        match self {
            Frame::If { token, .. } | Frame::Foreach { token } => token,
        }
    }
}

/// Check `tokens` against `data`, collecting every problem found.
pub fn validate_tokens(tokens: &[Token], data: &DataNode, config: &Config) -> Result<(), ValidationReport> {
    let _span = tracing::debug_span!("validate", tokens = tokens.len()).entered();
    let mut validator = Validator::new(data, config);
    for token in tokens {
        validator.visit(token);
    }
    let report = validator.finish();
    if report.is_empty() {
        Ok(())
    } else {
        debug!(
            structural = report.structural_errors.len(),
            missing = report.missing_fields.len(),
            shape = report.type_errors.len(),
            "validation failed"
        );
        Err(report)
    }
}

struct Validator<'a, 't> {
    data: &'a DataNode,
    config: &'a Config,
    stack: Vec<Frame<'t>>,
    // Names a path may start with instead of a data field. One scope per
    // open frame above the root, so `var` inside an `if` branch or a loop
    // body is gone once that branch or loop ends.
    scopes: Vec<HashSet<String>>,
    seen_missing: HashSet<FieldPath>,
    report: ValidationReport,
}

impl<'a, 't> Validator<'a, 't> {
    fn new(data: &'a DataNode, config: &'a Config) -> Self {
        Self {
            data,
            config,
            stack: Vec::new(),
            scopes: vec![HashSet::new()],
            seen_missing: HashSet::new(),
            report: ValidationReport::default(),
        }
    }

    fn visit(&mut self, token: &'t Token) {
        match &token.kind {
            TokenKind::Text(text) => {
                if self.config.strict_tags {
                    for error in stray_openers(text, token.span) {
                        self.structural(error);
                    }
                }
            }
            TokenKind::FieldRef(path) => self.check_path(path, token.span, Usage::Scalar),
            TokenKind::VarDecl { name, expr } => {
                self.check_expr(token, expr);
                if let Some(scope) = self.scopes.last_mut() {
                    scope.insert(name.clone());
                }
            }
            TokenKind::ForeachOpen { item, list } => {
                self.check_path(list, token.span, Usage::List);
                self.stack.push(Frame::Foreach { token });
                self.scopes.push(HashSet::from([item.clone()]));
            }
            TokenKind::ForeachClose => self.close(token),
            TokenKind::IfOpen(expr) => {
                self.check_expr(token, expr);
                self.stack.push(Frame::If { token, else_seen: false });
                self.scopes.push(HashSet::new());
            }
            TokenKind::ElseIf(expr) => {
                self.branch(token);
                self.check_expr(token, expr);
            }
            TokenKind::Else => self.branch(token),
            TokenKind::IfClose => self.close(token),
        }
    }

    fn structural(&mut self, error: StructuralError) {
        debug!(%error, "structural problem");
        self.report.structural_errors.push(error);
    }

    fn close(&mut self, token: &Token) {
        let closes_foreach = matches!(token.kind, TokenKind::ForeachClose);
        let Some(frame) = self.stack.pop() else {
            self.structural(StructuralError::UnmatchedClose { tag: token.kind.describe(), span: token.span });
            return;
        };
        let is_foreach = matches!(frame, Frame::Foreach { .. });
        self.scopes.pop();
        if is_foreach != closes_foreach {
            let open = frame.token();
            self.structural(StructuralError::MismatchedClose {
                open: open.kind.describe(),
                open_span: open.span,
                close: token.kind.describe(),
                span: token.span,
            });
        }
    }

    fn branch(&mut self, token: &Token) {
        let is_else = matches!(token.kind, TokenKind::Else);
        let error = match self.stack.last_mut() {
            Some(Frame::If { else_seen: true, .. }) => {
                StructuralError::BranchAfterElse { tag: token.kind.describe(), span: token.span }
            }
            Some(Frame::If { else_seen, .. }) => {
                *else_seen = is_else;
                if let Some(scope) = self.scopes.last_mut() {
                    scope.clear();
                }
                return;
            }
            _ => StructuralError::BranchWithoutIf { tag: token.kind.describe(), span: token.span },
        };
        self.structural(error);
    }

    fn check_expr(&mut self, token: &Token, src: &str) {
        match parse_expr(src) {
            Ok(expr) => {
                for path in expr.paths() {
                    self.check_path(path, token.span, Usage::Any);
                }
            }
            Err(error) => self.structural(StructuralError::InvalidExpression {
                tag: token.kind.describe(),
                span: token.span,
                error,
            }),
        }
    }

    fn is_bound(&self, name: &str) -> bool {
        self.scopes.iter().any(|scope| scope.contains(name))
    }

    fn check_path(&mut self, path: &FieldPath, span: Span, usage: Usage) {
        // Variable-rooted paths depend on runtime values; the renderer checks them.
        if path.root_name().is_some_and(|root| self.is_bound(root)) {
            return;
        }
        let node = match path.lookup(self.data) {
            Ok(node) => node,
            Err(PathError::NotIndexable { ref segment, .. }) if self.is_bound(segment) => return,
            Err(error) => {
                debug!(%path, %error, "missing field");
                if self.seen_missing.insert(path.clone()) {
                    self.report.missing_fields.push(path.clone());
                }
                return;
            }
        };
        let error = match usage {
            Usage::Scalar if node.as_scalar().is_none() => {
                FieldError::NotScalar { path: path.clone(), span, kind: node.kind() }
            }
            Usage::List if !matches!(node, DataNode::Array(_)) => {
                FieldError::NotAList { path: path.clone(), span, kind: node.kind() }
            }
            _ => return,
        };
        debug!(%error, "field has the wrong shape");
        self.report.type_errors.push(error);
    }

    fn finish(mut self) -> ValidationReport {
        for frame in std::mem::take(&mut self.stack) {
            let token = frame.token();
            self.structural(StructuralError::Unclosed { tag: token.kind.describe(), span: token.span });
        }
        self.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Tokenizer;
    use pretty_assertions::assert_eq;

    fn run(text: &str, json: &str) -> ValidationReport {
        run_with(text, json, &Config::new())
    }

    fn run_with(text: &str, json: &str, config: &Config) -> ValidationReport {
        let tokens: Vec<Token> = Tokenizer::new(text).collect();
        let data = DataNode::from_json_str(json).unwrap();
        validate_tokens(&tokens, &data, config).err().unwrap_or_default()
    }

    fn messages(report: &ValidationReport) -> Vec<String> {
        report.structural_errors.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn well_formed_template_passes() {
        let report = run(
            "<<foreach [o in Orders]>><<if [o.Qty > 1]>><<[o.Name]>><<else>>-<</if>><</foreach>>",
            r#"{"Orders": [{"Qty": 2, "Name": "pen"}]}"#,
        );
        assert!(report.is_empty(), "{report}");
    }

    #[test]
    fn unmatched_close_names_the_tag() {
        let report = run("text <</if>> more", "{}");
        assert_eq!(messages(&report), vec!["Unmatched closing tag: <</if>> at 1:6"]);
    }

    #[test]
    fn mismatched_close_pops_and_reports_both_tags() {
        let report = run("<<if [true]>><<foreach [x in L]>><</if>><</foreach>>", r#"{"L": []}"#);
        assert_eq!(
            messages(&report),
            vec![
                "Mismatched tags: <<foreach [x in L]>> (at 1:14) and <</if>> at 1:34",
                "Mismatched tags: <<if [true]>> (at 1:1) and <</foreach>> at 1:41",
            ]
        );
    }

    #[test]
    fn unclosed_blocks_are_reported_outermost_first() {
        let report = run("<<if [true]>>\n<<foreach [x in L]>>", r#"{"L": []}"#);
        assert_eq!(
            messages(&report),
            vec!["Unclosed tag: <<if [true]>> at 1:1", "Unclosed tag: <<foreach [x in L]>> at 2:1"]
        );
    }

    #[test]
    fn branches_need_an_if_on_top() {
        let report = run("<<else>><<foreach [x in L]>><<elseif [true]>><</foreach>>", r#"{"L": []}"#);
        assert_eq!(report.structural_errors.len(), 2);
        assert!(matches!(report.structural_errors[0], StructuralError::BranchWithoutIf { .. }));
        assert!(matches!(report.structural_errors[1], StructuralError::BranchWithoutIf { .. }));
    }

    #[test]
    fn nothing_may_follow_else() {
        let report = run("<<if [true]>><<else>><<elseif [true]>><<else>><</if>>", "{}");
        assert_eq!(report.structural_errors.len(), 2);
        assert!(report
            .structural_errors
            .iter()
            .all(|e| matches!(e, StructuralError::BranchAfterElse { .. })));
    }

    #[test]
    fn if_crossing_a_loop_boundary_is_rejected() {
        let report = run("<<foreach [x in L]>><<if [true]>><</foreach>><</if>>", r#"{"L": []}"#);
        assert_eq!(report.structural_errors.len(), 2);
        assert!(report
            .structural_errors
            .iter()
            .all(|e| matches!(e, StructuralError::MismatchedClose { .. })));
    }

    #[test]
    fn missing_fields_are_all_collected_once() {
        let report = run("<<[A]>> <<[B.C]>> <<[A]>> <<if [D == 1]>>x<</if>>", r#"{"B": {}}"#);
        let missing: Vec<String> = report.missing_fields.iter().map(ToString::to_string).collect();
        assert_eq!(missing, vec!["A", "B.C", "D"]);
        assert!(report.structural_errors.is_empty());
    }

    #[test]
    fn loop_and_var_roots_are_left_to_render_time() {
        let report = run(
            "<<var [n = 1]>><<[n]>><<foreach [o in Orders]>><<[o.Anything]>><<[Orders.o]>><</foreach>>",
            r#"{"Orders": []}"#,
        );
        assert!(report.is_empty(), "{report}");
    }

    #[test]
    fn var_in_an_if_branch_is_only_bound_inside_it() {
        assert!(run("<<if [true]>><<var [x = 1]>><<[x]>><</if>>", "{}").is_empty());
        for text in [
            "<<if [false]>><<var [x = 1]>><</if>><<[x]>>",
            "<<if [true]>><<var [x = 1]>><<elseif [x]>><</if>>",
            "<<if [true]>><<var [x = 1]>><<else>><<[x]>><</if>>",
        ] {
            let missing: Vec<String> = run(text, "{}").missing_fields.iter().map(ToString::to_string).collect();
            assert_eq!(missing, vec!["x"], "{text}");
        }
    }

    #[test]
    fn loop_variable_goes_out_of_scope_after_close() {
        let report = run("<<foreach [o in Orders]>><</foreach>><<[o.Name]>>", r#"{"Orders": []}"#);
        let missing: Vec<String> = report.missing_fields.iter().map(ToString::to_string).collect();
        assert_eq!(missing, vec!["o.Name"]);
    }

    #[test]
    fn shapes_are_checked_for_data_rooted_paths() {
        let report = run("<<[Contact]>><<foreach [x in Name]>><</foreach>>", r#"{"Contact": {}, "Name": "Ada"}"#);
        assert_eq!(
            report.type_errors.iter().map(ToString::to_string).collect::<Vec<_>>(),
            vec![
                "`Contact` at 1:1 is not a single value (found object)",
                "`Name` at 1:14 is not a list (found string)",
            ]
        );
    }

    #[test]
    fn bad_expressions_are_structural_errors() {
        let report = run("<<if [a +]>>x<</if>>", r#"{"a": 1}"#);
        assert_eq!(report.structural_errors.len(), 1);
        assert!(matches!(report.structural_errors[0], StructuralError::InvalidExpression { .. }));
    }

    #[test]
    fn strict_mode_flags_stray_openers() {
        let text = "Hi <<Name>> and <<[Name]>>";
        assert!(run(text, r#"{"Name": "x"}"#).is_empty());
        let report = run_with(text, r#"{"Name": "x"}"#, &Config::new().strict_tags(true));
        assert_eq!(messages(&report), vec!["Malformed tag `<<Name>>` at 1:4"]);
    }
}
