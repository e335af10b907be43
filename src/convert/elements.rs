//! Printing of template elements: text, interpolations, comments and
//! directives.

use crate::ast::{ElementKind, ExpressionKind, IteratorStyle, Node, NodeId, ParamValue, ParameterRole};
use crate::errors::ConvertError;
use crate::syntax::MAX_FRACTION_DIGITS;

use super::printer::{PrintResult, Printer};

const IF: &[&str] = &["if"];
const LIST_END: &[&str] = &["list", "foreach", "forEach"];
const NOPARSE: &[&str] = &["noparse", "noParse"];
const ELSE: &[&str] = &["else"];
const ELSE_IF: &[&str] = &["elseif", "elseIf"];

impl<'t> Printer<'t> {
    pub(super) fn print_element(&mut self, node: &'t Node, kind: &ElementKind) -> PrintResult {
        if !matches!(kind, ElementKind::MixedContent | ElementKind::TextBlock) {
            tracing::debug!(element = node.label(), position = %node.begin, "printing");
        }
        match kind {
            ElementKind::MixedContent => {
                self.assert_param_count(node, 0)?;
                self.print_children(node)
            }
            ElementKind::TextBlock => self.print_text_block(node),
            ElementKind::DollarVariable => self.print_dollar_variable(node),
            ElementKind::NumericalOutput => self.print_numerical_output(node),
            ElementKind::Comment => self.print_comment(node),
            ElementKind::IfBlock => {
                self.assert_param_count(node, 0)?;
                self.print_children(node)?;
                self.print_end_tag(node, IF, "if")
            }
            ElementKind::ConditionalBlock => self.print_conditional_block(node),
            ElementKind::Assignment => self.print_assignment(node),
            ElementKind::AssignmentInstruction => self.print_assignment_instruction(node),
            ElementKind::BlockAssignment => self.print_block_assignment(node),
            ElementKind::IteratorBlock(IteratorStyle::List) => self.print_list(node),
            ElementKind::IteratorBlock(IteratorStyle::ForEach) => self.print_foreach(node),
            ElementKind::ListElseContainer => self.print_list_else_container(node),
            ElementKind::ElseOfList => {
                self.assert_param_count(node, 0)?;
                let name_end = self.print_start_tag(node, ELSE, "else")?;
                self.print_tag_end(node, name_end, true)?;
                self.print_children(node)
            }
            ElementKind::Items => self.print_items(node),
            ElementKind::Sep => self.print_sep(node),
            ElementKind::BreakInstruction => self.print_simple_instruction(node, "break"),
            ElementKind::FlushInstruction => self.print_simple_instruction(node, "flush"),
            ElementKind::TrimInstruction => self.print_trim(node),
            ElementKind::StopInstruction => self.print_stop(node),
            ElementKind::AttemptBlock => self.print_attempt(node),
            ElementKind::RecoveryBlock => {
                self.assert_param_count(node, 0)?;
                let name_end = self.print_start_tag(node, &["recover"], "recover")?;
                self.print_tag_end(node, name_end, true)?;
                self.print_children(node)
            }
            ElementKind::CompressedBlock => {
                self.print_plain_block(node, &["compress"], "compress")
            }
            ElementKind::AutoEscBlock => {
                self.print_plain_block(node, &["autoesc", "autoEsc"], "autoEsc")
            }
            ElementKind::NoAutoEscBlock => {
                self.print_plain_block(node, &["noautoesc", "noAutoEsc"], "noAutoEsc")
            }
            ElementKind::SwitchBlock => self.print_switch(node),
            ElementKind::Case => self.print_case(node),
            ElementKind::LibraryLoad => self.print_import(node),
            ElementKind::Macro => self.print_macro(node),
            ElementKind::BodyInstruction => self.print_nested(node),
            ElementKind::ReturnInstruction => self.print_return(node),
            ElementKind::UnifiedCall => self.print_unified_call(node),
            ElementKind::Include => self.print_include(node),
            ElementKind::PropertySetting => self.print_setting(node),
            ElementKind::FtlHeader => self.print_ftl_header(node),
            ElementKind::EscapeBlock => self.print_escape(node),
            ElementKind::NoEscapeBlock => {
                self.print_plain_block(node, &["noescape", "noEscape"], "noEscape")
            }
            ElementKind::OutputFormatBlock => self.print_output_format(node),
            ElementKind::VisitNode => self.print_visit_like(node, "visit"),
            ElementKind::RecurseNode => self.print_visit_like(node, "recurse"),
            ElementKind::FallbackInstruction => self.print_simple_instruction(node, "fallback"),
        }
    }

    fn is_child_of(&self, node: &Node, kind: ElementKind) -> bool {
        self.parent(node)
            .and_then(|parent| parent.element_kind())
            .is_some_and(|parent_kind| *parent_kind == kind)
    }

    // ========================================================================
    // TEXT, INTERPOLATIONS, COMMENTS
    // ========================================================================

    fn print_text_block(&mut self, node: &'t Node) -> PrintResult {
        let content = match self.get_only_param(node, ParameterRole::Content)? {
            ParamValue::Str(content) => content.as_str(),
            other => {
                return Err(self.mismatch(
                    node,
                    format!("Content should be a string, found {}.", other.type_name()),
                ))
            }
        };
        let begin = self.begin(node)?;
        let noparse_start = format!("{}#no", self.doc.open_char());
        if !self.doc.starts_with_at(begin, &noparse_start) {
            self.write(content);
            return Ok(());
        }
        let name_end = self.print_start_tag(node, NOPARSE, "noParse")?;
        self.print_tag_end(node, name_end, true)?;
        self.write(content);
        self.print_end_tag(node, NOPARSE, "noParse")
    }

    fn print_dollar_variable(&mut self, node: &'t Node) -> PrintResult {
        self.assert_param_count(node, 1)?;
        let expr = self.node_param(node, 0, ParameterRole::Content)?;
        let begin = self.begin(node)?;
        self.expect_at(node, begin, "${")?;
        self.write("${");
        self.print_interpolated(node, begin + 2, expr)?;
        self.write_char('}');
        Ok(())
    }

    /// The expression of an interpolation and the skipped tokens around it,
    /// up to the closing `}`.
    fn print_interpolated(&mut self, node: &'t Node, from: usize, expr: NodeId) -> PrintResult {
        let expression = self.node(expr);
        self.print_skipped(node, from, self.begin(expression)?)?;
        self.print_node(expr)?;
        let close = self.last(node)?;
        self.print_skipped(node, self.end(expression)?, close)?;
        self.expect_at(node, close, "}")
    }

    /// `#{x}` → `${x}`; `#{x; m1M3}` → `${x?string('0.0##')}`.
    fn print_numerical_output(&mut self, node: &'t Node) -> PrintResult {
        self.assert_param_count(node, 3)?;
        let expr = self.node_param(node, 0, ParameterRole::Content)?;
        let min = self.get_param(node, 1, ParameterRole::MinimumDecimals)?;
        let max = self.get_param(node, 2, ParameterRole::MaximumDecimals)?;
        let begin = self.begin(node)?;
        self.expect_at(node, begin, "#{")?;
        self.write("${");

        let (min, max) = match (min, max) {
            (ParamValue::Null, ParamValue::Null) => {
                self.print_interpolated(node, begin + 2, expr)?;
                self.write_char('}');
                return Ok(());
            }
            (ParamValue::Int(min), ParamValue::Int(max)) => (*min, *max),
            _ => {
                return Err(self.mismatch(
                    node,
                    "Minimum and maximum decimals must be both set or both omitted.",
                ))
            }
        };
        let pattern = number_format_pattern(min, max)
            .ok_or_else(|| self.mismatch(node, format!("Invalid decimals range {}..{}.", min, max)))?;

        let expression = self.node(expr);
        self.print_skipped(node, begin + 2, self.begin(expression)?)?;
        let parenthesize = !expression
            .expression_kind()
            .is_some_and(is_primary_or_postfix);
        if parenthesize {
            self.write_char('(');
        }
        self.print_node(expr)?;
        if parenthesize {
            self.write_char(')');
        }
        self.write("?string('");
        self.write(&pattern);
        self.write("')");

        // `; m1M3` has no FM3 counterpart; it goes together with the
        // whitespace and comments around it.
        let close = self.last(node)?;
        self.expect_at(node, close, "}")?;
        self.write_char('}');
        Ok(())
    }

    fn print_comment(&mut self, node: &'t Node) -> PrintResult {
        let content = match self.get_only_param(node, ParameterRole::Content)? {
            ParamValue::Str(content) => content.as_str(),
            other => {
                return Err(self.mismatch(
                    node,
                    format!("Content should be a string, found {}.", other.type_name()),
                ))
            }
        };
        if content.contains("-->") || content.contains("--]") {
            return Err(self.unconvertible(
                node,
                "A comment can't contain a comment terminator",
            ));
        }
        self.write_char(self.doc.open_char());
        self.write("#--");
        self.write(content);
        self.write("--");
        self.write_char(self.doc.close_char());
        Ok(())
    }

    // ========================================================================
    // CONDITIONALS
    // ========================================================================

    fn print_conditional_block(&mut self, node: &'t Node) -> PrintResult {
        self.assert_param_count(node, 2)?;
        let condition = self.optional_node_param(node, 0, ParameterRole::Condition)?;
        let subtype = self.int_param(node, 1, ParameterRole::AstNodeSubtype)?;
        let (names, fm3_name): (&[&str], &str) = match (subtype, condition) {
            (0, Some(_)) => (IF, "if"),
            (1, None) => (ELSE, "else"),
            (2, Some(_)) => (ELSE_IF, "elseIf"),
            _ => {
                return Err(self.mismatch(
                    node,
                    format!(
                        "Subtype {} doesn't match a {} condition.",
                        subtype,
                        if condition.is_some() { "present" } else { "missing" }
                    ),
                ))
            }
        };
        let name_end = self.print_start_tag(node, names, fm3_name)?;
        let after = match condition {
            Some(id) => {
                let expression = self.node(id);
                self.print_skipped(node, name_end, self.begin(expression)?)?;
                self.print_node(id)?;
                self.end(expression)?
            }
            None => name_end,
        };
        self.print_tag_end(node, after, true)?;
        self.print_children(node)?;
        // Branches of an #if chain share the chain's end tag.
        if !self.is_child_of(node, ElementKind::IfBlock) {
            self.print_end_tag(node, IF, "if")?;
        }
        Ok(())
    }

    fn print_switch(&mut self, node: &'t Node) -> PrintResult {
        self.assert_param_count(node, 1)?;
        let value = self.node_param(node, 0, ParameterRole::Value)?;
        let name_end = self.print_start_tag(node, &["switch"], "switch")?;
        let expression = self.node(value);
        self.print_skipped(node, name_end, self.begin(expression)?)?;
        self.print_node(value)?;
        self.print_tag_end(node, self.end(expression)?, true)?;

        let mut seen_default = false;
        for &id in &node.children {
            let child = self.node(id);
            match child.element_kind() {
                Some(ElementKind::Case) => {
                    let is_default =
                        self.int_param(child, 1, ParameterRole::AstNodeSubtype)? == 1;
                    if seen_default && !is_default {
                        return Err(self.unconvertible(
                            child,
                            "#case after #default isn't allowed in FM3",
                        ));
                    }
                    seen_default |= is_default;
                }
                Some(ElementKind::TextBlock | ElementKind::Comment) => {}
                _ => return Err(self.unhandled(child, "Case, TextBlock or Comment")),
            }
            self.print_node(id)?;
        }
        self.print_end_tag(node, &["switch"], "switch")
    }

    fn print_case(&mut self, node: &'t Node) -> PrintResult {
        self.assert_param_count(node, 2)?;
        let condition = self.optional_node_param(node, 0, ParameterRole::Condition)?;
        let subtype = self.int_param(node, 1, ParameterRole::AstNodeSubtype)?;
        let after = match (subtype, condition) {
            (0, Some(id)) => {
                let name_end = self.print_start_tag(node, &["case"], "case")?;
                let expression = self.node(id);
                self.print_skipped(node, name_end, self.begin(expression)?)?;
                self.print_node(id)?;
                self.end(expression)?
            }
            (1, None) => self.print_start_tag(node, &["default"], "default")?,
            _ => {
                return Err(self.mismatch(
                    node,
                    format!("Subtype {} doesn't match the case condition.", subtype),
                ))
            }
        };
        self.print_tag_end(node, after, false)?;
        self.print_children(node)
    }

    // ========================================================================
    // ASSIGNMENTS
    // ========================================================================

    fn scope_tag(&self, node: &Node, scope: i64) -> Result<&'static str, ConvertError> {
        match scope {
            0 => Ok("assign"),
            1 => Ok("global"),
            2 => Ok("local"),
            other => Err(self.mismatch(node, format!("Unknown variable scope {}.", other))),
        }
    }

    fn print_assignment(&mut self, node: &'t Node) -> PrintResult {
        self.assert_param_count(node, 5)?;
        let target = self.str_param(node, 0, ParameterRole::AssignmentTarget)?;
        let operator = self.str_param(node, 1, ParameterRole::AssignmentOperator)?;
        let source = self.optional_node_param(node, 2, ParameterRole::AssignmentSource)?;
        let scope = self.int_param(node, 3, ParameterRole::VariableScope)?;
        let namespace = self.optional_node_param(node, 4, ParameterRole::Namespace)?;

        if self.is_child_of(node, ElementKind::AssignmentInstruction) {
            if namespace.is_some() {
                return Err(self.mismatch(
                    node,
                    "An assignment inside a multi-assignment can't have its own namespace.",
                ));
            }
            let after = self.print_assignment_body(node, self.begin(node)?, target, operator, source)?;
            if after != self.end(node)? {
                return Err(self.mismatch(node, "The assignment doesn't end with its value."));
            }
            return Ok(());
        }

        let name = self.scope_tag(node, scope)?;
        let name_end = self.print_start_tag(node, &[name], name)?;
        let target_start = self
            .doc
            .position_after_ws_and_comments(name_end)
            .map_err(|e| self.scan_failure(node, e))?;
        self.print_skipped(node, name_end, target_start)?;
        let after = self.print_assignment_body(node, target_start, target, operator, source)?;
        let after = self.print_namespace(node, after, namespace)?;
        self.print_tag_end(node, after, false)?;
        Ok(())
    }

    /// `target op source`; returns the offset after the last printed token.
    fn print_assignment_body(
        &mut self,
        node: &'t Node,
        target_start: usize,
        target: &str,
        operator: &str,
        source: Option<NodeId>,
    ) -> Result<usize, ConvertError> {
        self.expect_at(node, target_start, target)?;
        self.write(target);
        let target_end = target_start + target.len();
        let operator_start = self
            .doc
            .position_after_ws_and_comments(target_end)
            .map_err(|e| self.scan_failure(node, e))?;
        self.print_skipped(node, target_end, operator_start)?;
        self.expect_at(node, operator_start, operator)?;
        self.write(operator);
        let operator_end = operator_start + operator.len();
        match (operator, source) {
            ("++" | "--", None) => Ok(operator_end),
            (_, Some(id)) if operator != "++" && operator != "--" => {
                let expression = self.node(id);
                self.print_skipped(node, operator_end, self.begin(expression)?)?;
                self.print_node(id)?;
                self.end(expression)
            }
            _ => Err(self.mismatch(
                node,
                format!("Operator {:?} doesn't match the assignment source.", operator),
            )),
        }
    }

    /// ` in ns` after the assignments, if there is a namespace.
    fn print_namespace(
        &mut self,
        node: &'t Node,
        from: usize,
        namespace: Option<NodeId>,
    ) -> Result<usize, ConvertError> {
        let Some(id) = namespace else {
            return Ok(from);
        };
        let expression = self.node(id);
        self.print_separator(node, from, "in", self.begin(expression)?)?;
        self.print_node(id)?;
        self.end(expression)
    }

    fn print_assignment_instruction(&mut self, node: &'t Node) -> PrintResult {
        self.assert_param_count(node, 2)?;
        let scope = self.int_param(node, 0, ParameterRole::VariableScope)?;
        let namespace = self.optional_node_param(node, 1, ParameterRole::Namespace)?;
        if node.children.is_empty() {
            return Err(self.mismatch(node, "A multi-assignment needs at least one assignment."));
        }
        let name = self.scope_tag(node, scope)?;
        let mut pos = self.print_start_tag(node, &[name], name)?;
        for (index, &id) in node.children.iter().enumerate() {
            let child = self.node(id);
            if child.element_kind() != Some(&ElementKind::Assignment) {
                return Err(self.unhandled(child, "Assignment"));
            }
            let child_begin = self.begin(child)?;
            if index == 0 {
                self.print_skipped(node, pos, child_begin)?;
            } else {
                // The comma between assignments is optional.
                let separator = self
                    .doc
                    .read_separator(pos, ",", true)
                    .map_err(|e| self.scan_failure(node, e))?;
                if pos + separator.len() != child_begin {
                    return Err(self.mismatch(
                        child,
                        "Unexpected text before the assignment.",
                    ));
                }
                self.write(separator);
            }
            self.print_node(id)?;
            pos = self.end(child)?;
        }
        let pos = self.print_namespace(node, pos, namespace)?;
        self.print_tag_end(node, pos, false)?;
        Ok(())
    }

    fn print_block_assignment(&mut self, node: &'t Node) -> PrintResult {
        self.assert_param_count(node, 3)?;
        let target = self.str_param(node, 0, ParameterRole::AssignmentTarget)?;
        let scope = self.int_param(node, 1, ParameterRole::VariableScope)?;
        let namespace = self.optional_node_param(node, 2, ParameterRole::Namespace)?;
        let name = self.scope_tag(node, scope)?;
        let name_end = self.print_start_tag(node, &[name], name)?;
        let target_start = self
            .doc
            .position_after_ws_and_comments(name_end)
            .map_err(|e| self.scan_failure(node, e))?;
        self.print_skipped(node, name_end, target_start)?;
        self.expect_at(node, target_start, target)?;
        self.write(target);
        let pos = self.print_namespace(node, target_start + target.len(), namespace)?;
        self.print_tag_end(node, pos, true)?;
        self.print_children(node)?;
        self.print_end_tag(node, &[name], name)
    }

    // ========================================================================
    // LISTING
    // ========================================================================

    /// Prints ` as x` or ` as k, v`, starting right after the list source.
    fn print_loop_variables(
        &mut self,
        node: &'t Node,
        from: usize,
        variables: &[&str],
    ) -> Result<usize, ConvertError> {
        let mut pos = from;
        for (index, variable) in variables.iter().enumerate() {
            let separator = if index == 0 { "as" } else { "," };
            let text = self
                .doc
                .read_separator(pos, separator, false)
                .map_err(|e| self.scan_failure(node, e))?;
            self.write(text);
            pos += text.len();
            self.expect_at(node, pos, variable)?;
            self.write(variable);
            pos += variable.len();
        }
        Ok(pos)
    }

    fn print_list(&mut self, node: &'t Node) -> PrintResult {
        self.assert_param_count_between(node, 1, 3)?;
        let source = self.node_param(node, 0, ParameterRole::ListSource)?;
        let variables = self.trailing_str_params(node, 1, ParameterRole::TargetLoopVariable)?;
        let name_end = self.print_start_tag(node, &["list"], "list")?;
        let expression = self.node(source);
        self.print_skipped(node, name_end, self.begin(expression)?)?;
        self.print_node(source)?;
        let pos = self.print_loop_variables(node, self.end(expression)?, &variables)?;
        self.print_tag_end(node, pos, true)?;
        self.print_children(node)?;
        // With an #else, the container prints the end tag.
        if !self.is_child_of(node, ElementKind::ListElseContainer) {
            self.print_end_tag(node, LIST_END, "list")?;
        }
        Ok(())
    }

    /// `<#foreach x in xs>` → `<#list xs as x>`. Comments inside the tag
    /// move behind the loop variable; the whitespace around them doesn't
    /// survive the reordering.
    fn print_foreach(&mut self, node: &'t Node) -> PrintResult {
        self.assert_param_count(node, 2)?;
        let source = self.node_param(node, 0, ParameterRole::ListSource)?;
        let variable = self.str_param(node, 1, ParameterRole::TargetLoopVariable)?;
        let name_end = self.tag_name_end(node, &["foreach", "forEach"])?;
        let scan = |this: &Self, from: usize| {
            this.doc
                .position_after_ws_and_comments(from)
                .map_err(|e| this.scan_failure(node, e))
        };

        let variable_start = scan(self, name_end)?;
        self.expect_at(node, variable_start, variable)?;
        let variable_end = variable_start + variable.len();
        let in_start = scan(self, variable_end)?;
        self.expect_at(node, in_start, "in")?;
        let expression = self.node(source);
        let source_start = self.begin(expression)?;
        if scan(self, in_start + 2)? != source_start {
            return Err(self.mismatch(node, "Unexpected text between \"in\" and the list source."));
        }
        let text = self.doc.text();
        let comments = [
            &text[name_end..variable_start],
            &text[variable_end..in_start],
            &text[in_start + 2..source_start],
        ];

        self.write_char(self.doc.open_char());
        self.write("#list ");
        self.print_node(source)?;
        self.write(" as ");
        self.write(variable);
        for comment in comments.iter().map(|c| c.trim()).filter(|c| !c.is_empty()) {
            self.write_char(' ');
            self.write(comment);
        }
        self.print_tag_end(node, self.end(expression)?, true)?;
        self.print_children(node)?;
        self.print_end_tag(node, LIST_END, "list")
    }

    fn print_list_else_container(&mut self, node: &'t Node) -> PrintResult {
        self.assert_param_count(node, 0)?;
        let [list, otherwise] = node.children.as_slice() else {
            return Err(self.mismatch(
                node,
                format!("Expected 2 children, found {}.", node.children.len()),
            ));
        };
        let list_node = self.node(*list);
        if list_node.element_kind() != Some(&ElementKind::IteratorBlock(IteratorStyle::List)) {
            return Err(self.unhandled(list_node, "IteratorBlock"));
        }
        let else_node = self.node(*otherwise);
        if else_node.element_kind() != Some(&ElementKind::ElseOfList) {
            return Err(self.unhandled(else_node, "ElseOfList"));
        }
        self.print_node(*list)?;
        self.print_node(*otherwise)?;
        self.print_end_tag(node, LIST_END, "list")
    }

    fn print_items(&mut self, node: &'t Node) -> PrintResult {
        self.assert_param_count_between(node, 1, 2)?;
        let variables = self.trailing_str_params(node, 0, ParameterRole::TargetLoopVariable)?;
        let name_end = self.print_start_tag(node, &["items"], "items")?;
        let pos = self.print_loop_variables(node, name_end, &variables)?;
        self.print_tag_end(node, pos, true)?;
        self.print_children(node)?;
        self.print_end_tag(node, &["items"], "items")
    }

    fn print_sep(&mut self, node: &'t Node) -> PrintResult {
        self.assert_param_count(node, 0)?;
        let name_end = self.print_start_tag(node, &["sep"], "sep")?;
        self.print_tag_end(node, name_end, true)?;
        self.print_children(node)?;
        if self.has_end_tag(node, &["sep"])? {
            self.print_end_tag(node, &["sep"], "sep")?;
        }
        Ok(())
    }

    // ========================================================================
    // OTHER DIRECTIVES
    // ========================================================================

    fn print_simple_instruction(&mut self, node: &'t Node, name: &str) -> PrintResult {
        self.assert_param_count(node, 0)?;
        let name_end = self.print_start_tag(node, &[name], name)?;
        self.print_tag_end(node, name_end, false)?;
        Ok(())
    }

    fn print_trim(&mut self, node: &'t Node) -> PrintResult {
        self.assert_param_count(node, 1)?;
        let name = match self.int_param(node, 0, ParameterRole::AstNodeSubtype)? {
            0 => "t",
            1 => "lt",
            2 => "rt",
            3 => "nt",
            other => return Err(self.mismatch(node, format!("Unknown trim subtype {}.", other))),
        };
        let name_end = self.print_start_tag(node, &[name], name)?;
        self.print_tag_end(node, name_end, false)?;
        Ok(())
    }

    fn print_stop(&mut self, node: &'t Node) -> PrintResult {
        self.assert_param_count(node, 1)?;
        let message = self.optional_node_param(node, 0, ParameterRole::Message)?;
        let mut pos = self.print_start_tag(node, &["stop"], "stop")?;
        if let Some(id) = message {
            let expression = self.node(id);
            self.print_skipped(node, pos, self.begin(expression)?)?;
            self.print_node(id)?;
            pos = self.end(expression)?;
        }
        self.print_tag_end(node, pos, false)?;
        Ok(())
    }

    fn print_attempt(&mut self, node: &'t Node) -> PrintResult {
        self.assert_param_count(node, 1)?;
        let handler = self.node_param(node, 0, ParameterRole::ErrorHandler)?;
        let [attempted, recovery] = node.children.as_slice() else {
            return Err(self.mismatch(
                node,
                format!("Expected 2 children, found {}.", node.children.len()),
            ));
        };
        if *recovery != handler {
            return Err(self.mismatch(node, "The error handler isn't the recovery block."));
        }
        let attempted_node = self.node(*attempted);
        if attempted_node.element_kind() != Some(&ElementKind::MixedContent) {
            return Err(self.unhandled(attempted_node, "MixedContent"));
        }
        let name_end = self.print_start_tag(node, &["attempt"], "attempt")?;
        self.print_tag_end(node, name_end, true)?;
        self.print_node(*attempted)?;
        self.print_node(*recovery)?;
        self.print_end_tag(node, &["attempt", "recover"], "attempt")
    }

    fn print_plain_block(&mut self, node: &'t Node, names: &[&str], fm3_name: &str) -> PrintResult {
        self.assert_param_count(node, 0)?;
        let name_end = self.print_start_tag(node, names, fm3_name)?;
        self.print_tag_end(node, name_end, true)?;
        self.print_children(node)?;
        self.print_end_tag(node, names, fm3_name)
    }

    fn print_import(&mut self, node: &'t Node) -> PrintResult {
        self.assert_param_count(node, 2)?;
        let path = self.node_param(node, 0, ParameterRole::TemplateName)?;
        let namespace = self.str_param(node, 1, ParameterRole::Namespace)?;
        let name_end = self.print_start_tag(node, &["import"], "import")?;
        let expression = self.node(path);
        self.print_skipped(node, name_end, self.begin(expression)?)?;
        self.print_node(path)?;
        let mut pos = self.end(expression)?;
        let separator = self
            .doc
            .read_separator(pos, "as", false)
            .map_err(|e| self.scan_failure(node, e))?;
        self.write(separator);
        pos += separator.len();
        self.expect_at(node, pos, namespace)?;
        self.write(namespace);
        self.print_tag_end(node, pos + namespace.len(), false)?;
        Ok(())
    }
}

/// `0.<min zeros><max-min hashes>`, or `0` when no decimals are allowed.
fn number_format_pattern(min: i64, max: i64) -> Option<String> {
    let min = usize::try_from(min).ok()?;
    let max = usize::try_from(max).ok()?;
    if max < min || max > MAX_FRACTION_DIGITS as usize {
        return None;
    }
    if max == 0 {
        return Some("0".to_string());
    }
    Some(format!("0.{}{}", "0".repeat(min), "#".repeat(max - min)))
}

/// Forms that bind tighter than `?`, so `x?string(...)` needs no parens.
fn is_primary_or_postfix(kind: &ExpressionKind) -> bool {
    matches!(
        kind,
        ExpressionKind::Identifier { .. }
            | ExpressionKind::NumberLiteral { .. }
            | ExpressionKind::BooleanLiteral { .. }
            | ExpressionKind::StringLiteral { .. }
            | ExpressionKind::ListLiteral
            | ExpressionKind::HashLiteral
            | ExpressionKind::Parenthetical
            | ExpressionKind::MethodCall
            | ExpressionKind::DynamicKeyName
            | ExpressionKind::Dot
            | ExpressionKind::BuiltIn
            | ExpressionKind::BuiltinVariable
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_format_patterns() {
        assert_eq!(number_format_pattern(2, 2).as_deref(), Some("0.00"));
        assert_eq!(number_format_pattern(0, 3).as_deref(), Some("0.###"));
        assert_eq!(number_format_pattern(1, 3).as_deref(), Some("0.0##"));
        assert_eq!(number_format_pattern(0, 0).as_deref(), Some("0"));
        assert_eq!(number_format_pattern(3, 1), None);
        assert_eq!(number_format_pattern(0, i64::MAX), None);
    }
}
