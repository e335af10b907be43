// End-to-end FM2 → FM3 conversions through the public API.

use fmconv::convert::convert_source;
use fmconv::syntax::TagSyntaxMode;
use fmconv::{ErrorCategory, ErrorKind};

fn fm3(source: &str) -> String {
    match convert_source("test.ftl", source, TagSyntaxMode::AutoDetect) {
        Ok(output) => output,
        Err(error) => panic!("conversion of {:?} failed: {}", source, error),
    }
}

fn assert_unchanged(source: &str) {
    assert_eq!(fm3(source), source);
}

// ============================================================================
// DIRECTIVES
// ============================================================================

#[test]
fn if_chains_use_camel_case_else_if() {
    assert_eq!(
        fm3("<#if a>1<#elseif b>2<#elseIf c>3<#else>4</#if>"),
        "<#if a>1<#elseIf b>2<#elseIf c>3<#else>4</#if>"
    );
    assert_unchanged("<#if a>\n  nested <#if b>x</#if>\n</#if>");
}

#[test]
fn listing_directives_keep_their_shape() {
    assert_unchanged("<#list users as user>${user.name}<#sep>, </#list>");
    assert_unchanged("<#list users as user>${user}<#else>nobody</#list>");
    assert_unchanged("<#list map as k, v>${k}=${v}<#sep>; </#sep></#list>");
    assert_unchanged("<#list xs><ul><#items as x><li>${x}<#break></#items></ul></#list>");
}

#[test]
fn foreach_becomes_list() {
    assert_eq!(
        fm3("<#foreach x in xs>${x}</#foreach>"),
        "<#list xs as x>${x}</#list>"
    );
    assert_eq!(
        fm3("<#forEach item in items?reverse>${item}</#forEach>"),
        "<#list items?reverse as item>${item}</#list>"
    );
}

#[test]
fn assignments_keep_operators_and_separators() {
    assert_unchanged("<#assign x = 1 y = 2>");
    assert_unchanged("<#assign x = 1, y = \"two\">");
    assert_unchanged("<#global counter += 1>");
    assert_unchanged("<#assign i++>");
    assert_unchanged("<#assign x = 1 in ns>");
    assert_unchanged("<#assign captured>some ${text}</#assign>");
    assert_unchanged("<#local tmp = a * (b - 1) / 2 % 3>");
}

#[test]
fn block_directives_are_renamed() {
    assert_eq!(
        fm3("<#autoesc>${x}</#autoesc><#noautoesc>${y}</#noautoesc>"),
        "<#autoEsc>${x}</#autoEsc><#noAutoEsc>${y}</#noAutoEsc>"
    );
    assert_unchanged("<#compress>  a   b  </#compress>");
}

#[test]
fn noparse_content_is_copied_verbatim() {
    assert_eq!(
        fm3("<#noparse><#if x = 1>${y?upper_case}</#noparse>"),
        "<#noParse><#if x = 1>${y?upper_case}</#noParse>"
    );
}

#[test]
fn attempt_ends_with_attempt() {
    assert_eq!(
        fm3("<#attempt>${risky}<#recover>fallback</#recover>"),
        "<#attempt>${risky}<#recover>fallback</#attempt>"
    );
    assert_unchanged("<#attempt>a<#recover>b</#attempt>");
}

#[test]
fn switch_with_cases() {
    assert_unchanged(
        "<#switch fruit>\n  <#case \"apple\">red<#break>\n  <#case \"kiwi\">green<#break>\n  <#default>unknown\n</#switch>",
    );
}

#[test]
fn simple_instructions() {
    assert_unchanged("a<#t>\nb<#lt/>\nc<#rt>\nd<#nt>\n");
    assert_unchanged("<#flush><#stop><#stop \"bye\">");
    assert_unchanged("<#import \"/lib/utils.ftl\" as utils>");
}

#[test]
fn macros_and_functions_keep_their_signatures() {
    assert_unchanged(
        "<#macro greet name greeting=\"Hi\" rest...>${greeting} ${name}<#nested name, 1><#return></#macro>",
    );
    assert_unchanged("<#macro m(a, b = 2)>${a}<#nested></#macro>");
    assert_unchanged("<#function sum(a, b=0)><#return a + b></#function>");
    assert_unchanged("<#macro box\n  title\n>[${title}]</#macro>");
}

#[test]
fn user_directive_calls() {
    assert_unchanged("<@greet name=\"Ann\" greeting=\"Hello\"/>");
    assert_unchanged("<@my.lib.item 1, 2; x, y>${x}${y}</@my.lib.item>");
    assert_unchanged("<@m a=1, b=2></@>");
    assert_unchanged("<@box title=\"t\">body <@inner/></@box>");
    assert_unchanged("<@m .now/>");
}

#[test]
fn include_options_are_renamed_or_dropped() {
    assert_unchanged("<#include \"/footer.ftl\">");
    assert_eq!(
        fm3("<#include \"/footer.ftl\" ignore_missing=true>"),
        "<#include \"/footer.ftl\" ignoreMissing=true>"
    );
    assert_eq!(
        fm3("<#include \"a.ftl\" parse=false encoding=\"ISO-8859-2\">"),
        "<#include \"a.ftl\">"
    );
    assert_eq!(
        fm3("<#include \"a.ftl\" ignore_missing=true parse=false>"),
        "<#include \"a.ftl\" ignoreMissing=true>"
    );
}

#[test]
fn ftl_header_parameters_are_renamed() {
    assert_eq!(
        fm3("<#ftl encoding=\"UTF-8\" strip_whitespace=true attributes={\"a\": 1}>\nx"),
        "<#ftl encoding=\"UTF-8\" stripWhitespace=true customSettings={\"a\": 1}>\nx"
    );
    assert_unchanged("<#-- header --><#ftl stripText=true>");
}

#[test]
fn settings_are_camel_cased() {
    assert_eq!(
        fm3("<#setting number_format=\"0.##\"><#setting datetime_format=\"iso\">"),
        "<#setting numberFormat=\"0.##\"><#setting dateTimeFormat=\"iso\">"
    );
    assert_unchanged("<#setting locale=\"en_US\">");
}

#[test]
fn escape_blocks() {
    assert_eq!(
        fm3("<#escape x as x?html>${a}<#noescape>${b}</#noescape></#escape>"),
        "<#escape x as x?html>${a}<#noEscape>${b}</#noEscape></#escape>"
    );
    assert_eq!(
        fm3("<#outputformat \"XML\">${x}</#outputformat>"),
        "<#outputFormat \"XML\">${x}</#outputFormat>"
    );
}

#[test]
fn node_visiting_instructions() {
    assert_unchanged("<#visit doc using ns><#recurse><#recurse node using \"lib.ftl\"><#fallback>");
}

// ============================================================================
// INTERPOLATIONS AND EXPRESSIONS
// ============================================================================

#[test]
fn numerical_output_becomes_string_builtin() {
    assert_eq!(fm3("#{n}"), "${n}");
    assert_eq!(fm3("#{n; m1M3}"), "${n?string('0.0##')}");
    assert_eq!(fm3("#{n;m2}"), "${n?string('0.00')}");
    assert_eq!(fm3("#{n; M2}"), "${n?string('0.##')}");
    assert_eq!(fm3("#{n; M0 }"), "${n?string('0')}");
    assert_eq!(fm3("#{n; m1 <#-- c --> }"), "${n?string('0.0')}");
    assert_eq!(fm3("#{a + b; m1}"), "${(a + b)?string('0.0')}");
    assert_eq!(fm3("#{x.y?size; m1}"), "${x.y?size?string('0.0')}");
}

#[test]
fn range_expressions_keep_their_separators() {
    assert_unchanged("${f(1<#--1-->..\t<#--2-->9)}");
    assert_unchanged("<#list 1..<9 as i>${i}</#list>");
    assert_unchanged("${(1..)?size} ${xs[1..!3]} ${xs[0..*2]}");
}

#[test]
fn comma_less_list_literals_get_commas() {
    assert_eq!(fm3("${[1 2 3]?size}"), "${[1, 2, 3]?size}");
    assert_unchanged("${[1, 2, 3]?size}");
}

#[test]
fn builtins_are_camel_cased() {
    assert_eq!(
        fm3("${name?cap_first} ${s?left_pad(5)} ${x?web_safe} ${d?iso_utc_ms_nz}"),
        "${name?capFirst} ${s?leftPad(5)} ${x?html} ${d?isoUtcMsNZ}"
    );
    assert_unchanged("${name?upperCase?length}");
}

#[test]
fn builtin_variables_are_renamed() {
    assert_eq!(
        fm3("${.current_node} ${.template_name} ${.data_model.x} ${.now}"),
        "${.node} ${.currentTemplateName} ${.dataModel.x} ${.now}"
    );
}

#[test]
fn camel_case_builtin_variables_pass_through() {
    assert_unchanged("${.outputFormat} ${.dataModel.x} ${.mainTemplateName}");
    assert_unchanged("${.now} ${.locale} ${.vars['x']} ${.globals.y}");
    assert_eq!(fm3("${.currentNode}"), "${.node}");
}

#[test]
fn legacy_operators_are_normalized() {
    assert_eq!(
        fm3("<#if a &lt; b \\and c | d>x</#if>"),
        "<#if a lt b and c || d>x</#if>"
    );
    assert_eq!(fm3("<#if a gte 1 & b lte 2>x</#if>"), "<#if a ge 1 && b le 2>x</#if>");
    assert_eq!(fm3("${(a = b)?c}"), "${(a == b)?c}");
    assert_eq!(fm3("<#if a &amp;&amp; b>x</#if>"), "<#if a && b>x</#if>");
}

#[test]
fn expressions_survive_untouched() {
    assert_unchanged("${user.name!\"anonymous\"} ${x!} ${m[\"key\"]} ${-x} ${!flag?c}");
    assert_unchanged("<#if x?? && (y > 1 || z)>ok</#if>");
    assert_unchanged("<#assign m = {\"a\": 1, \"b\": [1, 2, 3]}>");
    assert_unchanged("${fn(1, 'two', [3])} ${f()} ${r\"C:\\raw\"}");
    assert_unchanged("${foo\\-bar} ${a.b\\-c}");
}

// ============================================================================
// FORMAT PRESERVATION
// ============================================================================

#[test]
fn whitespace_and_comments_inside_tags_survive() {
    assert_eq!(
        fm3("<#if\n\ta\t<#-- first -->\n=\n1\n>x</#if\n>"),
        "<#if\n\ta\t<#-- first -->\n==\n1\n>x</#if\n>"
    );
    assert_unchanged("${ a <#-- c --> + b }");
    assert_unchanged("<#-- a top-level comment --><#-- another -->");
}

#[test]
fn foreach_comments_move_behind_the_variable() {
    assert_eq!(
        fm3("<#foreach x <#-- c --> in xs>${x}</#foreach>"),
        "<#list xs as x <#-- c -->>${x}</#list>"
    );
}

#[test]
fn square_bracket_templates() {
    assert_eq!(
        fm3("[#if x = 1]a[#elseif y > 2]b[/#if][#list xs as x]${x}[/#list]"),
        "[#if x == 1]a[#elseIf y > 2]b[/#if][#list xs as x]${x}[/#list]"
    );
    assert_eq!(
        convert_source("t.ftl", "[#-- c --]#{n; m1}", TagSyntaxMode::SquareBracket).unwrap(),
        "[#-- c --]${n?string('0.0')}"
    );
}

#[test]
fn line_endings_are_preserved() {
    assert_unchanged("<#if a>\r\n  x\r\n<#else>\r\n  y\r\n</#if>\r\n");
}

#[test]
fn literal_examples() {
    assert_unchanged("${var}");
    assert_unchanged("${  var\n}");
    assert_unchanged("${f<#-- C1 -->(<#-- C2 --> 1, 2 ,<#-- C3 --> 3,<#-- C4 -->4 <#-- C5 -->)}");
    assert_unchanged("${f(<#-- c -->)}");
    assert_eq!(
        fm3("<#if foo>1<#elseif bar/>2<#else/>3</#if>"),
        "<#if foo>1<#elseIf bar>2<#else>3</#if>"
    );
    assert_eq!(
        fm3("<#if foo>1<#elseif bar />2<#else />3</#if>"),
        "<#if foo>1<#elseIf bar>2<#else>3</#if>"
    );
}

#[test]
fn node_and_string_forms_convert_same() {
    assert_unchanged("${m.@key} ${m.*} ${m.@@}");
    assert_unchanged("${\"a${x}b\"}");
    assert_unchanged("${.vars['a'].b} ${.locale}");
}

// ============================================================================
// FAILURES
// ============================================================================

#[test]
fn unmappable_builtins_fail() {
    for source in ["${x?default(1)}", "${x?if_exists}", "<#if x?exists>y</#if>"] {
        let err = convert_source("t.ftl", source, TagSyntaxMode::AutoDetect).unwrap_err();
        assert!(
            matches!(err.kind, ErrorKind::BuiltInMapping { .. }),
            "{}: {:?}",
            source,
            err.kind
        );
        assert_eq!(err.category(), ErrorCategory::Conversion);
    }
}

#[test]
fn unknown_builtin_variable_fails() {
    let err = convert_source("t.ftl", "${.no_such_var}", TagSyntaxMode::AutoDetect).unwrap_err();
    assert_eq!(
        err.kind,
        ErrorKind::BuiltInVariableMapping {
            name: ".no_such_var".into(),
            attempted: ".noSuchVar".into(),
        }
    );
    assert_eq!(err.category(), ErrorCategory::Conversion);
    assert!(err.to_string().contains("built-in variable name"));
}

#[test]
fn case_after_default_is_unconvertible() {
    let err = convert_source(
        "t.ftl",
        "<#switch x><#default>d<#case 1>one</#switch>",
        TagSyntaxMode::AutoDetect,
    )
    .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::UnconvertibleFeature { .. }));
    assert_eq!(err.category(), ErrorCategory::Source);
}

#[test]
fn huge_fraction_digit_counts_are_rejected() {
    let err = convert_source("t.ftl", "#{n; m9000000000000000000}", TagSyntaxMode::AutoDetect)
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Syntax { .. }), "{:?}", err.kind);
}

#[test]
fn classic_compatible_setting_is_unconvertible() {
    let err = convert_source(
        "t.ftl",
        "<#setting classic_compatible=true>",
        TagSyntaxMode::AutoDetect,
    )
    .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::UnconvertibleFeature { .. }), "{:?}", err.kind);
}

#[test]
fn unknown_settings_and_include_options_are_syntax_errors() {
    for source in [
        "<#setting no_such_setting=1>",
        "<#include \"a.ftl\" cache=true>",
        "<#nested>",
        "x<#ftl>",
    ] {
        let err = convert_source("t.ftl", source, TagSyntaxMode::AutoDetect).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Syntax { .. }), "{}: {:?}", source, err.kind);
    }
}
