//! Printing of expressions.
//!
//! Operands are printed recursively; everything between them (operators,
//! brackets, separators) is re-read from the source so that whitespace and
//! comments survive.

use crate::ast::{ExpressionKind, Node, NodeId, ParamValue, ParameterRole, Sign};
use crate::errors::ConvertError;
use crate::source::scanner::{is_identifier_part, is_identifier_start};
use crate::syntax::expression::unescape_identifier;

use super::builtins::{map_builtin_name, map_builtin_variable_name};
use super::printer::{PrintResult, Printer};

impl<'t> Printer<'t> {
    pub(super) fn print_expression(&mut self, node: &'t Node, kind: &ExpressionKind) -> PrintResult {
        match kind {
            ExpressionKind::Identifier { name } => {
                self.assert_param_count(node, 0)?;
                self.write(&escape_identifier(name));
                Ok(())
            }
            ExpressionKind::NumberLiteral { text } | ExpressionKind::StringLiteral { text } => {
                self.assert_param_count(node, 0)?;
                self.write(text);
                Ok(())
            }
            ExpressionKind::BooleanLiteral { value } => {
                self.assert_param_count(node, 0)?;
                self.write(if *value { "true" } else { "false" });
                Ok(())
            }
            ExpressionKind::ListLiteral => self.print_list_literal(node),
            ExpressionKind::HashLiteral => self.print_hash_literal(node),
            ExpressionKind::Range => self.print_range(node),
            ExpressionKind::AddConcat => {
                self.assert_param_count(node, 2)?;
                self.print_infix(node, "+")
            }
            ExpressionKind::Arithmetic { operator } => {
                self.assert_param_count(node, 3)?;
                let code = self.int_param(node, 2, ParameterRole::AstNodeSubtype)?;
                if code != operator.code() {
                    return Err(self.mismatch(
                        node,
                        format!("Subtype {} doesn't match operator {}.", code, operator.symbol()),
                    ));
                }
                let mut buf = [0u8; 4];
                self.print_infix(node, operator.symbol().encode_utf8(&mut buf))
            }
            ExpressionKind::UnaryPlusMinus { sign } => {
                self.assert_param_count(node, 2)?;
                let code = self.int_param(node, 1, ParameterRole::AstNodeSubtype)?;
                let expected = match sign {
                    Sign::Plus => 0,
                    Sign::Minus => 1,
                };
                if code != expected {
                    return Err(self.mismatch(
                        node,
                        format!("Subtype {} doesn't match sign {}.", code, sign.symbol()),
                    ));
                }
                self.print_prefixed(node, sign.symbol())
            }
            ExpressionKind::Not => {
                self.assert_param_count(node, 1)?;
                self.print_prefixed(node, '!')
            }
            ExpressionKind::Comparison => self.print_logical(node, normalize_comparison),
            ExpressionKind::And => self.print_logical(node, normalize_and),
            ExpressionKind::Or => self.print_logical(node, normalize_or),
            ExpressionKind::Parenthetical => {
                let inner = self.node_param(node, 0, ParameterRole::EnclosedOperand)?;
                self.assert_param_count(node, 1)?;
                let begin = self.begin(node)?;
                self.expect_at(node, begin, "(")?;
                self.write_char('(');
                self.print_enclosed(node, begin + 1, inner, ")")
            }
            ExpressionKind::MethodCall => self.print_method_call(node),
            ExpressionKind::DynamicKeyName => {
                self.assert_param_count(node, 2)?;
                let target = self.node_param(node, 0, ParameterRole::LeftHandOperand)?;
                let key = self.node_param(node, 1, ParameterRole::RightHandOperand)?;
                let after = self.print_operand(target)?;
                self.print_separator(node, after, "[", self.begin(self.node(key))?)?;
                self.print_enclosed(node, self.begin(self.node(key))?, key, "]")
            }
            ExpressionKind::Dot => self.print_dot(node),
            ExpressionKind::BuiltIn => self.print_builtin(node),
            ExpressionKind::BuiltinVariable => self.print_builtin_variable(node),
            ExpressionKind::DefaultTo => self.print_default_to(node),
            ExpressionKind::Exists => {
                self.assert_param_count(node, 1)?;
                let target = self.node_param(node, 0, ParameterRole::LeftHandOperand)?;
                let after = self.print_operand(target)?;
                let operator = self.last(node)? - 1;
                self.print_skipped(node, after, operator)?;
                self.expect_at(node, operator, "??")?;
                self.write("??");
                Ok(())
            }
        }
    }

    /// Prints a sub-expression and returns the offset right after it.
    fn print_operand(&mut self, id: NodeId) -> Result<usize, ConvertError> {
        self.print_node(id)?;
        self.end(self.node(id))
    }

    /// `inner` followed by skipped tokens and the closing bracket, which is
    /// the node's last character. `from` is right after the opening bracket.
    fn print_enclosed(&mut self, node: &'t Node, from: usize, inner: NodeId, close: &str) -> PrintResult {
        let inner_node = self.node(inner);
        self.print_skipped(node, from, self.begin(inner_node)?)?;
        let after = self.print_operand(inner)?;
        self.print_closing(node, after, close)
    }

    fn print_closing(&mut self, node: &'t Node, from: usize, close: &str) -> PrintResult {
        let last = self.last(node)?;
        self.print_skipped(node, from, last)?;
        self.expect_at(node, last, close)?;
        self.write(close);
        Ok(())
    }

    fn print_infix(&mut self, node: &'t Node, operator: &str) -> PrintResult {
        let lho = self.node_param(node, 0, ParameterRole::LeftHandOperand)?;
        let rho = self.node_param(node, 1, ParameterRole::RightHandOperand)?;
        let after = self.print_operand(lho)?;
        self.print_separator(node, after, operator, self.begin(self.node(rho))?)?;
        self.print_node(rho)
    }

    fn print_prefixed(&mut self, node: &'t Node, symbol: char) -> PrintResult {
        let operand = self.node_param(node, 0, ParameterRole::EnclosedOperand)?;
        let begin = self.begin(node)?;
        if self.doc.char_at(begin) != Some(symbol) {
            let mut buf = [0u8; 4];
            return self.expect_at(node, begin, symbol.encode_utf8(&mut buf));
        }
        self.write_char(symbol);
        self.print_skipped(node, begin + symbol.len_utf8(), self.begin(self.node(operand))?)?;
        self.print_node(operand)
    }

    /// Binary operators whose spelling changes between dialects.
    fn print_logical(&mut self, node: &'t Node, normalize: fn(&str) -> Option<&'static str>) -> PrintResult {
        self.assert_param_count(node, 2)?;
        let lho = self.node_param(node, 0, ParameterRole::LeftHandOperand)?;
        let rho = self.node_param(node, 1, ParameterRole::RightHandOperand)?;
        let after = self.print_operand(lho)?;
        let rho_begin = self.begin(self.node(rho))?;
        let operator_start = self
            .doc
            .position_after_ws_and_comments(after)
            .map_err(|e| self.scan_failure(node, e))?;
        self.print_skipped(node, after, operator_start)?;
        let operator = self.doc.read_until_ws_or_comment(operator_start, rho_begin);
        let fm3 = normalize(operator).ok_or_else(|| {
            self.mismatch(node, format!("Unknown operator \"{}\".", operator))
        })?;
        self.write(fm3);
        self.print_skipped(node, operator_start + operator.len(), rho_begin)?;
        self.print_node(rho)
    }

    fn print_list_literal(&mut self, node: &'t Node) -> PrintResult {
        let begin = self.begin(node)?;
        self.expect_at(node, begin, "[")?;
        self.write_char('[');
        let mut pos = begin + 1;
        for index in 0..node.params.len() {
            let item = self.node_param(node, index, ParameterRole::ItemValue)?;
            let item_begin = self.begin(self.node(item))?;
            if index == 0 {
                self.print_skipped(node, pos, item_begin)?;
            } else {
                let next = self
                    .doc
                    .position_after_ws_and_comments(pos)
                    .map_err(|e| self.scan_failure(node, e))?;
                if self.doc.char_at(next) == Some(',') {
                    self.print_separator(node, pos, ",", item_begin)?;
                } else {
                    // FM3 requires the commas FM2 let `[1 2 3]` omit.
                    self.write_char(',');
                    if next == pos {
                        self.write_char(' ');
                    }
                    self.print_skipped(node, pos, item_begin)?;
                }
            }
            pos = self.print_operand(item)?;
        }
        self.print_closing(node, pos, "]")
    }

    /// The operator is copied as written; both dialects have all four.
    fn print_range(&mut self, node: &'t Node) -> PrintResult {
        self.assert_param_count(node, 2)?;
        let lho = self.node_param(node, 0, ParameterRole::LeftHandOperand)?;
        let rho = self.optional_node_param(node, 1, ParameterRole::RightHandOperand)?;
        let after = self.print_operand(lho)?;
        let operator_start = self
            .doc
            .position_after_ws_and_comments(after)
            .map_err(|e| self.scan_failure(node, e))?;
        self.print_skipped(node, after, operator_start)?;
        let operator_end = match rho {
            Some(id) => self.begin(self.node(id))?,
            None => self.end(node)?,
        };
        let operator = self.doc.read_until_ws_or_comment(operator_start, operator_end);
        if !RANGE_OPERATORS.contains(&operator) || (rho.is_none() && operator != "..") {
            return Err(self.mismatch(node, format!("Unknown range operator \"{}\".", operator)));
        }
        self.write(operator);
        match rho {
            Some(id) => {
                self.print_skipped(node, operator_start + operator.len(), operator_end)?;
                self.print_node(id)
            }
            None => Ok(()),
        }
    }

    fn print_hash_literal(&mut self, node: &'t Node) -> PrintResult {
        if node.params.len() % 2 != 0 {
            return Err(self.mismatch(
                node,
                format!("Unexpected parameter count, {}.", node.params.len()),
            ));
        }
        let begin = self.begin(node)?;
        self.expect_at(node, begin, "{")?;
        self.write_char('{');
        let mut pos = begin + 1;
        for index in (0..node.params.len()).step_by(2) {
            let key = self.node_param(node, index, ParameterRole::ItemKey)?;
            let value = self.node_param(node, index + 1, ParameterRole::ItemValue)?;
            let key_begin = self.begin(self.node(key))?;
            if index == 0 {
                self.print_skipped(node, pos, key_begin)?;
            } else {
                self.print_separator(node, pos, ",", key_begin)?;
            }
            let after_key = self.print_operand(key)?;
            self.print_separator(node, after_key, ":", self.begin(self.node(value))?)?;
            pos = self.print_operand(value)?;
        }
        self.print_closing(node, pos, "}")
    }

    fn print_method_call(&mut self, node: &'t Node) -> PrintResult {
        let callee = self.node_param(node, 0, ParameterRole::Callee)?;
        let mut pos = self.print_operand(callee)?;
        for index in 1..node.params.len() {
            let argument = self.node_param(node, index, ParameterRole::ArgumentValue)?;
            let separator = if index == 1 { "(" } else { "," };
            self.print_separator(node, pos, separator, self.begin(self.node(argument))?)?;
            pos = self.print_operand(argument)?;
        }
        if node.params.len() == 1 {
            let open = self
                .doc
                .read_separator(pos, "(", false)
                .map_err(|e| self.scan_failure(node, e))?;
            self.write(open);
            pos += open.len();
        }
        self.print_closing(node, pos, ")")
    }

    fn print_dot(&mut self, node: &'t Node) -> PrintResult {
        self.assert_param_count(node, 2)?;
        let target = self.node_param(node, 0, ParameterRole::LeftHandOperand)?;
        let key = self.str_param(node, 1, ParameterRole::RightHandOperand)?;
        let after = self.print_operand(target)?;
        let separator = self
            .doc
            .read_separator(after, ".", false)
            .map_err(|e| self.scan_failure(node, e))?;
        let key_start = after + separator.len();
        let raw_key = &self.doc.text()[key_start..self.end(node)?];
        if unescape_identifier(raw_key) != key {
            return Err(self.mismatch(
                node,
                format!("Expected key \"{}\", found \"{}\".", key, raw_key),
            ));
        }
        self.write(separator);
        match key {
            "*" | "**" => self.write(key),
            _ => self.write(&escape_identifier(key)),
        }
        Ok(())
    }

    fn print_builtin(&mut self, node: &'t Node) -> PrintResult {
        self.assert_param_count(node, 2)?;
        let target = self.node_param(node, 0, ParameterRole::LeftHandOperand)?;
        let name = self.str_param(node, 1, ParameterRole::RightHandOperand)?;
        let fm3_name = map_builtin_name(name, self.target.builtin_names())
            .map_err(|kind| self.node_error(node, kind))?;
        let after = self.print_operand(target)?;
        let name_start = self.end(node)? - name.len();
        self.print_separator(node, after, "?", name_start)?;
        self.expect_at(node, name_start, name)?;
        self.write(&fm3_name);
        Ok(())
    }

    fn print_builtin_variable(&mut self, node: &'t Node) -> PrintResult {
        let name = match self.get_only_param(node, ParameterRole::Content)? {
            ParamValue::Str(name) => name.as_str(),
            other => {
                return Err(self.mismatch(
                    node,
                    format!("Content should be a string, found {}.", other.type_name()),
                ))
            }
        };
        let fm3_name = map_builtin_variable_name(name, self.target.builtin_variable_names())
            .map_err(|kind| self.node_error(node, kind))?;
        let begin = self.begin(node)?;
        self.expect_at(node, begin, ".")?;
        self.write_char('.');
        let name_start = self.end(node)? - name.len();
        self.print_skipped(node, begin + 1, name_start)?;
        self.expect_at(node, name_start, name)?;
        self.write(&fm3_name);
        Ok(())
    }

    fn print_default_to(&mut self, node: &'t Node) -> PrintResult {
        self.assert_param_count(node, 2)?;
        let target = self.node_param(node, 0, ParameterRole::LeftHandOperand)?;
        let default = self.optional_node_param(node, 1, ParameterRole::RightHandOperand)?;
        let after = self.print_operand(target)?;
        match default {
            Some(id) => {
                self.print_separator(node, after, "!", self.begin(self.node(id))?)?;
                self.print_node(id)
            }
            None => self.print_closing(node, after, "!"),
        }
    }
}

const RANGE_OPERATORS: &[&str] = &["..", "..<", "..!", "..*"];

/// Re-escapes characters an unescaped identifier can't contain, as in
/// `foo\-bar`.
fn escape_identifier(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for (index, c) in name.chars().enumerate() {
        let plain = if index == 0 {
            is_identifier_start(c)
        } else {
            is_identifier_part(c)
        };
        if !plain {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn normalize_comparison(op: &str) -> Option<&'static str> {
    Some(match op {
        "==" | "=" => "==",
        "!=" => "!=",
        "<" => "<",
        "<=" => "<=",
        ">" => ">",
        ">=" => ">=",
        "lt" | "\\lt" | "&lt;" => "lt",
        "le" | "lte" | "\\lte" | "&lt;=" => "le",
        "gt" | "\\gt" | "&gt;" => "gt",
        "ge" | "gte" | "\\gte" | "&gt;=" => "ge",
        _ => return None,
    })
}

fn normalize_and(op: &str) -> Option<&'static str> {
    Some(match op {
        "&&" | "&" | "&amp;&amp;" => "&&",
        "and" | "\\and" => "and",
        _ => return None,
    })
}

fn normalize_or(op: &str) -> Option<&'static str> {
    Some(match op {
        "||" | "|" => "||",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_re_escaped() {
        assert_eq!(escape_identifier("foo-bar"), "foo\\-bar");
        assert_eq!(escape_identifier("a.b:c#d"), "a\\.b\\:c\\#d");
        assert_eq!(escape_identifier("plain_name1"), "plain_name1");
    }

    #[test]
    fn legacy_operators_normalize() {
        assert_eq!(normalize_comparison("="), Some("=="));
        assert_eq!(normalize_comparison("&lt;="), Some("le"));
        assert_eq!(normalize_comparison("\\gte"), Some("ge"));
        assert_eq!(normalize_comparison("lt"), Some("lt"));
        assert_eq!(normalize_and("&amp;&amp;"), Some("&&"));
        assert_eq!(normalize_and("\\and"), Some("and"));
        assert_eq!(normalize_or("|"), Some("||"));
        assert_eq!(normalize_or("or"), None);
    }
}
