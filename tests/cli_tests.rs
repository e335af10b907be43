// The fmconv binary: commands, output streams and exit codes.

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

fn fmconv() -> Command {
    Command::cargo_bin("fmconv").unwrap()
}

#[test]
fn print_writes_converted_template_to_stdout() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("t.ftl");
    fs::write(&file, "<#if x = 1>${y?upper_case}</#if>").unwrap();

    fmconv()
        .arg("print")
        .arg(&file)
        .assert()
        .success()
        .stdout("<#if x == 1>${y?upperCase}</#if>");
}

#[test]
fn convert_reports_a_summary() {
    let source = TempDir::new().unwrap();
    let destination = TempDir::new().unwrap();
    fs::write(source.path().join("a.ftl"), "<#foreach x in xs>${x}</#foreach>").unwrap();

    fmconv()
        .arg("convert")
        .arg(source.path())
        .arg("-d")
        .arg(destination.path())
        .assert()
        .success()
        .stderr(contains("Converted 1 file(s)"));
    assert_eq!(
        fs::read_to_string(destination.path().join("a.fm3")).unwrap(),
        "<#list xs as x>${x}</#list>"
    );
}

#[test]
fn convert_with_nothing_to_do() {
    let source = TempDir::new().unwrap();
    let destination = TempDir::new().unwrap();
    fs::write(source.path().join("notes.txt"), "text").unwrap();

    fmconv()
        .args(["convert", "--include", r".*\.ftl"])
        .arg(source.path())
        .arg("--destination")
        .arg(destination.path())
        .assert()
        .success()
        .stderr(contains("No file to convert was found."));
}

#[test]
fn convert_flags_override_config_file() {
    let source = TempDir::new().unwrap();
    let destination = TempDir::new().unwrap();
    let config_dir = TempDir::new().unwrap();
    let config = config_dir.path().join("fmconv.yaml");
    fs::write(&config, "skip-unparsable-files: false\n").unwrap();
    fs::write(source.path().join("bad.ftl"), "<#if x>").unwrap();
    fs::write(source.path().join("page.html"), "${x}").unwrap();

    fmconv()
        .arg("convert")
        .arg(source.path())
        .arg("-d")
        .arg(destination.path())
        .arg("--config")
        .arg(&config)
        .args(["--skip-unparsable-files", "--include", r".*\.(ftl|html)"])
        .args(["-E", "html=fm3h"])
        .assert()
        .success()
        .stderr(contains("[WARN] bad.ftl:1:1:").and(contains("skipped 1")));
    assert!(destination.path().join("page.fm3h").is_file());
    assert!(destination.path().join("__conversion-markers.txt").is_file());
}

#[test]
fn check_accepts_valid_templates() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("t.fm3");
    fs::write(&file, "<#if a == 1>x<#elseIf b>y</#if>").unwrap();

    fmconv()
        .args(["check", "--dialect", "fm3"])
        .arg(&file)
        .assert()
        .success()
        .stdout(contains(": OK"));
}

#[test]
fn ast_prints_json() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("t.ftl");
    fs::write(&file, "${x}").unwrap();

    fmconv()
        .arg("ast")
        .arg(&file)
        .assert()
        .success()
        .stdout(contains("\"DollarVariable\"").and(contains("\"Identifier\"")));
}

#[test]
fn syntax_errors_exit_with_one() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("bad.ftl");
    fs::write(&file, "<#if x>").unwrap();

    fmconv()
        .arg("print")
        .arg(&file)
        .assert()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(contains("fmconv::syntax").and(contains("Unclosed #if")));
}

#[test]
fn usage_errors_exit_with_two() {
    let source = TempDir::new().unwrap();
    fs::write(source.path().join("a.ftl"), "x").unwrap();

    fmconv()
        .arg("convert")
        .arg(source.path())
        .arg("-d")
        .arg(source.path().join("missing"))
        .assert()
        .code(2)
        .stderr(contains("fmconv::config"));

    fmconv()
        .args(["convert", "--bogus-flag"])
        .assert()
        .code(2);
}

#[test]
fn missing_file_is_an_environment_error() {
    fmconv()
        .args(["print", "definitely/not/here.ftl"])
        .assert()
        .code(1)
        .stderr(contains("fmconv::io"));
}
