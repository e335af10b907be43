// Batch conversion over real directory trees.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use fmconv::config::ConversionOptions;
use fmconv::driver::{Driver, CONVERSION_MARKERS_FILE_NAME};
use fmconv::{ErrorCategory, ErrorKind};
use tempfile::TempDir;

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn read(root: &Path, relative: &str) -> String {
    fs::read_to_string(root.join(relative)).unwrap()
}

#[test]
fn converts_a_tree_and_renames_extensions() {
    let source = TempDir::new().unwrap();
    let destination = TempDir::new().unwrap();
    write(source.path(), "a.ftl", "<#if x = 1>y</#if>");
    write(source.path(), "sub/b.FTLH", "${x?upper_case}");
    write(source.path(), "sub/deeper/c.fm", "#{n; m2}");
    write(source.path(), "readme.txt", "not a template");

    let report = Driver::new(&ConversionOptions::default())
        .unwrap()
        .run(source.path(), destination.path())
        .unwrap();

    assert_eq!(report.converted.len(), 3);
    assert!(report.skipped.is_empty());
    assert!(report.markers.is_empty());
    assert_eq!(read(destination.path(), "a.fm3"), "<#if x == 1>y</#if>");
    assert_eq!(read(destination.path(), "sub/b.FM3H"), "${x?upperCase}");
    assert_eq!(read(destination.path(), "sub/deeper/c.fm3"), "${n?string('0.00')}");
    assert!(!destination.path().join("readme.txt").exists());
    assert!(!destination.path().join(CONVERSION_MARKERS_FILE_NAME).exists());
}

#[test]
fn single_file_source() {
    let source = TempDir::new().unwrap();
    let destination = TempDir::new().unwrap();
    write(source.path(), "page.ftlx", "<#list xs as x>${x}</#list>");

    let report = Driver::new(&ConversionOptions::default())
        .unwrap()
        .run(&source.path().join("page.ftlx"), destination.path())
        .unwrap();

    assert_eq!(report.converted, [destination.path().join("page.fm3x")]);
    assert_eq!(
        read(destination.path(), "page.fm3x"),
        "<#list xs as x>${x}</#list>"
    );
}

#[test]
fn unparsable_files_become_markers_when_skipped() {
    let source = TempDir::new().unwrap();
    let destination = TempDir::new().unwrap();
    write(source.path(), "bad.ftl", "<#if x>never closed");
    write(source.path(), "good.ftl", "<#assign x = 1>");

    let options = ConversionOptions {
        skip_unparsable_files: true,
        ..ConversionOptions::default()
    };
    let report = Driver::new(&options)
        .unwrap()
        .run(source.path(), destination.path())
        .unwrap();

    assert_eq!(report.converted.len(), 1);
    assert_eq!(report.skipped, [source.path().join("bad.ftl")]);
    assert!(!destination.path().join("bad.fm3").exists());
    let markers = read(destination.path(), CONVERSION_MARKERS_FILE_NAME);
    assert!(
        markers.starts_with("[WARN] bad.ftl:1:1: Skipped unparsable file: "),
        "{}",
        markers
    );
    assert!(markers.contains("Unclosed #if"));
    assert_eq!(markers.lines().count(), 1);
}

#[test]
fn dropped_include_parameters_become_markers() {
    let source = TempDir::new().unwrap();
    let destination = TempDir::new().unwrap();
    write(
        source.path(),
        "page.ftl",
        "x\n<#include \"h.ftl\" parse=false ignore_missing=true>",
    );

    let report = Driver::new(&ConversionOptions::default())
        .unwrap()
        .run(source.path(), destination.path())
        .unwrap();

    assert_eq!(report.converted.len(), 1);
    assert_eq!(
        read(destination.path(), "page.fm3"),
        "x\n<#include \"h.ftl\" ignoreMissing=true>"
    );
    let markers = read(destination.path(), CONVERSION_MARKERS_FILE_NAME);
    assert!(
        markers.starts_with("[WARN] page.ftl:2:25: The \"parse\" parameter of #include was removed"),
        "{}",
        markers
    );
    assert_eq!(markers.lines().count(), 1);
}

#[test]
fn unparsable_file_stops_the_run_by_default() {
    let source = TempDir::new().unwrap();
    let destination = TempDir::new().unwrap();
    write(source.path(), "bad.ftl", "<#if x>never closed");

    let err = Driver::new(&ConversionOptions::default())
        .unwrap()
        .run(source.path(), destination.path())
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Syntax { .. }));
}

#[test]
fn conversion_failures_are_never_skipped() {
    let source = TempDir::new().unwrap();
    let destination = TempDir::new().unwrap();
    write(source.path(), "a.ftl", "${x?default(1)}");

    let options = ConversionOptions {
        skip_unparsable_files: true,
        ..ConversionOptions::default()
    };
    let err = Driver::new(&options)
        .unwrap()
        .run(source.path(), destination.path())
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::BuiltInMapping { .. }));
}

#[test]
fn stale_markers_are_removed() {
    let source = TempDir::new().unwrap();
    let destination = TempDir::new().unwrap();
    write(source.path(), "a.ftl", "text");
    write(destination.path(), CONVERSION_MARKERS_FILE_NAME, "[WARN] old");

    Driver::new(&ConversionOptions::default())
        .unwrap()
        .run(source.path(), destination.path())
        .unwrap();
    assert!(!destination.path().join(CONVERSION_MARKERS_FILE_NAME).exists());
}

#[test]
fn destination_checks() {
    let source = TempDir::new().unwrap();
    write(source.path(), "a.ftl", "text");
    let driver = Driver::new(&ConversionOptions::default()).unwrap();

    let inside = source.path().join("out");
    fs::create_dir(&inside).unwrap();
    let err = driver.run(source.path(), &inside).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Usage);

    let missing = TempDir::new().unwrap().path().join("not/there");
    let err = driver.run(source.path(), &missing).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Config { .. }));

    let err = driver
        .run(&source.path().join("nope.ftl"), &inside)
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Config { .. }));
}

#[test]
fn destination_can_be_created() {
    let source = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    write(source.path(), "a.ftl", "text");
    let destination = root.path().join("new/dir");

    let options = ConversionOptions {
        create_destination: true,
        ..ConversionOptions::default()
    };
    Driver::new(&options)
        .unwrap()
        .run(source.path(), &destination)
        .unwrap();
    assert_eq!(read(&destination, "a.fm3"), "text");
}

#[test]
fn custom_include_and_substitutions() {
    let source = TempDir::new().unwrap();
    let destination = TempDir::new().unwrap();
    write(source.path(), "page.html", "<#if a>b</#if>");
    write(source.path(), "skip/page.html", "<#if a>b</#if>");
    write(source.path(), "a.ftl", "ignored");

    let options = ConversionOptions {
        include: r".*\.html".into(),
        exclude: Some("skip/.*".into()),
        file_extension_substitutions: BTreeMap::from([("html".into(), "fm3h".into())]),
        no_predefined_file_extension_substitutions: true,
        ..ConversionOptions::default()
    };
    let report = Driver::new(&options)
        .unwrap()
        .run(source.path(), destination.path())
        .unwrap();

    assert_eq!(report.converted, [destination.path().join("page.fm3h")]);
    assert!(!destination.path().join("skip").exists());
    assert!(!destination.path().join("a.ftl").exists());
}

#[test]
fn without_predefined_substitutions_names_are_kept() {
    let source = TempDir::new().unwrap();
    let destination = TempDir::new().unwrap();
    write(source.path(), "a.ftl", "text");

    let options = ConversionOptions {
        no_predefined_file_extension_substitutions: true,
        ..ConversionOptions::default()
    };
    Driver::new(&options)
        .unwrap()
        .run(source.path(), destination.path())
        .unwrap();
    assert_eq!(read(destination.path(), "a.ftl"), "text");
}
