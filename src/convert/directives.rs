//! Printing of definitions, calls and template configuration: `#macro`,
//! `#function`, `<@...>` calls, `#include`, `#setting`, `#ftl`, escaping
//! blocks and the node-visiting instructions.

use crate::ast::{Node, ParamValue, ParameterRole};
use crate::errors::ConvertError;

use super::builtins::{convert_ftl_parameter_name, map_setting_name};
use super::printer::{PrintResult, Printer};

const PARSE_REMOVED: &str = "The \"parse\" parameter of #include was removed, as it's not \
    supported anymore. Use the templateConfigurations configuration setting to specify which \
    files are not parsed.";

const ENCODING_REMOVED: &str = "The \"encoding\" parameter of #include was removed, as it's not \
    supported anymore. Use the templateConfigurations configuration setting to specify which \
    files have a different encoding than the configured default.";

impl<'t> Printer<'t> {
    // ========================================================================
    // MACROS AND CALLS
    // ========================================================================

    pub(super) fn print_macro(&mut self, node: &'t Node) -> PrintResult {
        let count = node.params.len();
        if count < 3 {
            return Err(self.mismatch(node, format!("Unexpected parameter count, {}.", count)));
        }
        let name = match self.int_param(node, count - 1, ParameterRole::AstNodeSubtype)? {
            0 => "macro",
            1 => "function",
            other => return Err(self.mismatch(node, format!("Unknown macro subtype {}.", other))),
        };
        let target = self.str_param(node, 0, ParameterRole::AssignmentTarget)?;
        let name_end = self.print_start_tag(node, &[name], name)?;
        let target_start = self.skip_ws(node, name_end)?;
        self.print_skipped(node, name_end, target_start)?;
        self.expect_at(node, target_start, target)?;
        self.write(target);
        let mut pos = self.print_optional_separator(node, target_start + target.len(), "(")?;

        let mut index = 1;
        while node
            .params
            .get(index)
            .is_some_and(|p| p.role == ParameterRole::ParameterName)
        {
            let param = self.str_param(node, index, ParameterRole::ParameterName)?;
            let default =
                self.optional_node_param(node, index + 1, ParameterRole::ParameterDefault)?;
            self.expect_at(node, pos, param)?;
            self.write(param);
            pos += param.len();
            if let Some(id) = default {
                let expression = self.node(id);
                self.print_separator(node, pos, "=", self.begin(expression)?)?;
                self.print_node(id)?;
                pos = self.end(expression)?;
            }
            pos = self.print_optional_separator(node, pos, ",")?;
            index += 2;
        }

        match self.get_param(node, index, ParameterRole::CatchAllParameterName)? {
            ParamValue::Str(catch_all) => {
                self.expect_at(node, pos, catch_all)?;
                self.write(catch_all);
                let dots = self.skip_ws(node, pos + catch_all.len())?;
                self.print_skipped(node, pos + catch_all.len(), dots)?;
                self.expect_at(node, dots, "...")?;
                self.write("...");
                pos = dots + 3;
            }
            ParamValue::Null => {}
            other => {
                return Err(self.mismatch(
                    node,
                    format!(
                        "The catch-all parameter should be a string, found {}.",
                        other.type_name()
                    ),
                ))
            }
        }
        if index + 2 != count {
            return Err(self.mismatch(node, "Unexpected parameters after the catch-all parameter."));
        }

        let pos = self.print_optional_separator(node, pos, ")")?;
        self.print_tag_end(node, pos, true)?;
        self.print_children(node)?;
        self.print_end_tag(node, &[name], name)
    }

    pub(super) fn print_nested(&mut self, node: &'t Node) -> PrintResult {
        let mut pos = self.print_start_tag(node, &["nested"], "nested")?;
        for index in 0..node.params.len() {
            let id = self.node_param(node, index, ParameterRole::PassedValue)?;
            let expression = self.node(id);
            if index > 0 {
                pos = self.print_optional_separator(node, pos, ",")?;
            }
            self.print_skipped(node, pos, self.begin(expression)?)?;
            self.print_node(id)?;
            pos = self.end(expression)?;
        }
        self.print_tag_end(node, pos, false)?;
        Ok(())
    }

    pub(super) fn print_return(&mut self, node: &'t Node) -> PrintResult {
        self.assert_param_count(node, 1)?;
        let value = self.optional_node_param(node, 0, ParameterRole::Value)?;
        let mut pos = self.print_start_tag(node, &["return"], "return")?;
        if let Some(id) = value {
            let expression = self.node(id);
            self.print_skipped(node, pos, self.begin(expression)?)?;
            self.print_node(id)?;
            pos = self.end(expression)?;
        }
        self.print_tag_end(node, pos, false)?;
        Ok(())
    }

    /// `<@callee args; loopVars/>` or `<@callee ...>...</@callee>`. The end
    /// tag's name (or its absence) is copied as written.
    pub(super) fn print_unified_call(&mut self, node: &'t Node) -> PrintResult {
        if node.params.is_empty() {
            return Err(self.mismatch(node, "Unexpected parameter count, 0."));
        }
        let callee = self.node_param(node, 0, ParameterRole::Callee)?;
        let begin = self.begin(node)?;
        self.expect_at(node, begin + 1, "@")?;
        self.write_char(self.doc.open_char());
        self.write_char('@');
        let expression = self.node(callee);
        self.print_skipped(node, begin + 2, self.begin(expression)?)?;
        self.print_node(callee)?;
        let mut pos = self.end(expression)?;

        let role_at = |index: usize| node.params.get(index).map(|p| p.role);
        let mut index = 1;
        while role_at(index) == Some(ParameterRole::ArgumentValue) {
            let id = self.node_param(node, index, ParameterRole::ArgumentValue)?;
            let value = self.node(id);
            if index > 1 {
                pos = self.print_optional_separator(node, pos, ",")?;
            }
            self.print_skipped(node, pos, self.begin(value)?)?;
            self.print_node(id)?;
            pos = self.end(value)?;
            index += 1;
        }
        while role_at(index) == Some(ParameterRole::ArgumentName) {
            let name = self.str_param(node, index, ParameterRole::ArgumentName)?;
            let id = self.node_param(node, index + 1, ParameterRole::ArgumentValue)?;
            pos = self.print_optional_separator(node, pos, ",")?;
            self.expect_at(node, pos, name)?;
            self.write(name);
            let value = self.node(id);
            self.print_separator(node, pos + name.len(), "=", self.begin(value)?)?;
            self.print_node(id)?;
            pos = self.end(value)?;
            index += 2;
        }
        for (offset, variable) in self
            .trailing_str_params(node, index, ParameterRole::TargetLoopVariable)?
            .into_iter()
            .enumerate()
        {
            let separator = if offset == 0 { ";" } else { "," };
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

        let after = self.print_tag_end(node, pos, false)?;
        if after == self.end(node)? {
            if !node.children.is_empty() {
                return Err(self.mismatch(node, "A self-closing call can't have children."));
            }
            return Ok(());
        }

        self.print_children(node)?;
        let close = self.last(node)?;
        let name_start = self.doc.text()[..close]
            .rfind("/@")
            .map(|slash| slash + 2)
            .filter(|&start| start > after)
            .ok_or_else(|| self.mismatch(node, "Can't find the end tag of the call."))?;
        self.write_char(self.doc.open_char());
        self.write("/@");
        self.write(&self.doc.text()[name_start..close]);
        self.write_char(self.doc.close_char());
        Ok(())
    }

    // ========================================================================
    // TEMPLATE CONFIGURATION
    // ========================================================================

    /// `parse` and `encoding` are dropped with a warning; `ignore_missing`
    /// becomes `ignoreMissing`.
    pub(super) fn print_include(&mut self, node: &'t Node) -> PrintResult {
        self.assert_param_count(node, 4)?;
        let path = self.node_param(node, 0, ParameterRole::TemplateName)?;
        let parse = self.optional_node_param(node, 1, ParameterRole::ParseParameter)?;
        let encoding = self.optional_node_param(node, 2, ParameterRole::EncodingParameter)?;
        let ignore_missing =
            self.optional_node_param(node, 3, ParameterRole::IgnoreMissingParameter)?;

        for (id, message) in [(parse, PARSE_REMOVED), (encoding, ENCODING_REMOVED)] {
            if let Some(id) = id {
                self.warn(self.node(id).begin, message);
            }
        }

        let name_end = self.print_start_tag(node, &["include"], "include")?;
        let expression = self.node(path);
        self.print_skipped(node, name_end, self.begin(expression)?)?;
        self.print_node(path)?;

        let mut options = Vec::with_capacity(3);
        for id in [parse, encoding, ignore_missing].into_iter().flatten() {
            options.push((self.begin(self.node(id))?, id));
        }
        options.sort_by_key(|&(begin, _)| begin);

        let dropping = parse.is_some() || encoding.is_some();
        let mut pos = self.print_gap(node, self.end(expression)?, !dropping || ignore_missing.is_some())?;
        for (index, &(value_begin, id)) in options.iter().enumerate() {
            let option_end = self
                .doc
                .position_after_identifier(pos)
                .map_err(|e| self.scan_failure(node, e))?;
            let separator = self
                .doc
                .read_separator(option_end, "=", false)
                .map_err(|e| self.scan_failure(node, e))?;
            if option_end + separator.len() != value_begin {
                return Err(self.mismatch(node, "Unexpected text before an #include parameter value."));
            }
            let kept = Some(id) == ignore_missing;
            if kept {
                self.write("ignoreMissing");
                self.write(separator);
                self.print_node(id)?;
            }
            let last = index + 1 == options.len();
            pos = self.print_gap(node, self.end(self.node(id))?, kept && last)?;
        }
        self.print_tag_end(node, pos, false)?;
        Ok(())
    }

    /// The whitespace and comments after an `#include` parameter. Unless
    /// `keep` is set only the comments stay, without trailing whitespace.
    fn print_gap(&mut self, node: &Node, from: usize, keep: bool) -> Result<usize, ConvertError> {
        let gap = self
            .doc
            .read_ws_and_comments(from)
            .map_err(|e| self.scan_failure(node, e))?;
        if keep {
            self.write(gap);
        } else if !gap.trim().is_empty() {
            self.write(gap.trim_end());
        }
        Ok(from + gap.len())
    }

    pub(super) fn print_setting(&mut self, node: &'t Node) -> PrintResult {
        self.assert_param_count(node, 2)?;
        let key = self.str_param(node, 0, ParameterRole::ItemKey)?;
        let value = self.node_param(node, 1, ParameterRole::ItemValue)?;
        let fm3_key = map_setting_name(key, self.target.setting_names())
            .map_err(|kind| self.node_error(node, kind))?;
        let name_end = self.print_start_tag(node, &["setting"], "setting")?;
        let key_start = self.skip_ws(node, name_end)?;
        self.print_skipped(node, name_end, key_start)?;
        self.expect_at(node, key_start, key)?;
        self.write(&fm3_key);
        let expression = self.node(value);
        self.print_separator(node, key_start + key.len(), "=", self.begin(expression)?)?;
        self.print_node(value)?;
        self.print_tag_end(node, self.end(expression)?, false)?;
        Ok(())
    }

    pub(super) fn print_ftl_header(&mut self, node: &'t Node) -> PrintResult {
        if node.params.len() % 2 != 0 {
            return Err(self.mismatch(
                node,
                format!("Unexpected parameter count, {}.", node.params.len()),
            ));
        }
        let mut pos = self.print_start_tag(node, &["ftl"], "ftl")?;
        for index in (0..node.params.len()).step_by(2) {
            let name = self.str_param(node, index, ParameterRole::ArgumentName)?;
            let value = self.node_param(node, index + 1, ParameterRole::ArgumentValue)?;
            let name_start = self.skip_ws(node, pos)?;
            self.print_skipped(node, pos, name_start)?;
            self.expect_at(node, name_start, name)?;
            self.write(&convert_ftl_parameter_name(name));
            let expression = self.node(value);
            self.print_separator(node, name_start + name.len(), "=", self.begin(expression)?)?;
            self.print_node(value)?;
            pos = self.end(expression)?;
        }
        self.print_tag_end(node, pos, false)?;
        Ok(())
    }

    pub(super) fn print_output_format(&mut self, node: &'t Node) -> PrintResult {
        const NAMES: &[&str] = &["outputformat", "outputFormat"];
        let value = match self.get_only_param(node, ParameterRole::Value)? {
            ParamValue::Node(id) => *id,
            other => {
                return Err(self.mismatch(
                    node,
                    format!("The output format should be a node, found {}.", other.type_name()),
                ))
            }
        };
        let name_end = self.print_start_tag(node, NAMES, "outputFormat")?;
        let expression = self.node(value);
        self.print_skipped(node, name_end, self.begin(expression)?)?;
        self.print_node(value)?;
        self.print_tag_end(node, self.end(expression)?, true)?;
        self.print_children(node)?;
        self.print_end_tag(node, NAMES, "outputFormat")
    }

    // ========================================================================
    // ESCAPING AND NODE VISITING
    // ========================================================================

    pub(super) fn print_escape(&mut self, node: &'t Node) -> PrintResult {
        self.assert_param_count(node, 2)?;
        let variable = self.str_param(node, 0, ParameterRole::PlaceholderVariable)?;
        let template = self.node_param(node, 1, ParameterRole::ExpressionTemplate)?;
        let name_end = self.print_start_tag(node, &["escape"], "escape")?;
        let variable_start = self.skip_ws(node, name_end)?;
        self.print_skipped(node, name_end, variable_start)?;
        self.expect_at(node, variable_start, variable)?;
        self.write(variable);
        let expression = self.node(template);
        self.print_separator(
            node,
            variable_start + variable.len(),
            "as",
            self.begin(expression)?,
        )?;
        self.print_node(template)?;
        self.print_tag_end(node, self.end(expression)?, true)?;
        self.print_children(node)?;
        self.print_end_tag(node, &["escape"], "escape")
    }

    /// `#visit` and `#recurse`: an optional node, then `using` and the
    /// namespaces. Only `#recurse` may leave out the node.
    pub(super) fn print_visit_like(&mut self, node: &'t Node, name: &str) -> PrintResult {
        self.assert_param_count(node, 2)?;
        let target = self.optional_node_param(node, 0, ParameterRole::Node)?;
        let namespace = self.optional_node_param(node, 1, ParameterRole::Namespace)?;
        if target.is_none() && name == "visit" {
            return Err(self.mismatch(node, "#visit needs a node."));
        }
        let mut pos = self.print_start_tag(node, &[name], name)?;
        if let Some(id) = target {
            let expression = self.node(id);
            self.print_skipped(node, pos, self.begin(expression)?)?;
            self.print_node(id)?;
            pos = self.end(expression)?;
        }
        if let Some(id) = namespace {
            let expression = self.node(id);
            self.print_separator(node, pos, "using", self.begin(expression)?)?;
            self.print_node(id)?;
            pos = self.end(expression)?;
        }
        self.print_tag_end(node, pos, false)?;
        Ok(())
    }
}
