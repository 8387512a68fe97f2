use super::*;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_path(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time should be monotonic")
        .as_nanos();
    std::env::temp_dir().join(format!("tagrun-cli-{}-{}", name, nanos))
}

fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("parent should be created");
    }
    fs::write(path, content).expect("file should be written");
}

fn run_args(script: &Path) -> RunArgs {
    RunArgs {
        script: script.to_path_buf(),
        path: Vec::new(),
        set: Vec::new(),
        grant: Vec::new(),
        max_depth: None,
        log_level: None,
    }
}

#[test]
fn parse_globals_accepts_pairs_and_rejects_reserved_names() {
    let globals = parse_globals(&["name=Ada".to_string(), "expr=a=b".to_string()])
        .expect("pairs should parse");
    assert_eq!(globals.get("name"), Some(&TrValue::from("Ada")));
    assert_eq!(globals.get("expr"), Some(&TrValue::from("a=b")));

    let missing = parse_globals(&["novalue".to_string()]).expect_err("missing = should fail");
    assert_eq!(missing.code, "CLI_SET_INVALID");

    let reserved = parse_globals(&[format!("{}=x", mvars::PROC_PRIVILEGE)])
        .expect_err("reserved name should fail");
    assert_eq!(reserved.code, "CLI_SET_INVALID");
}

#[test]
fn run_script_reports_ok_and_failed() {
    let dir = temp_path("run");
    let ok = dir.join("ok.xml");
    write_file(
        &ok,
        r#"<root><assert key="who" value="Ada"/><assert key="__script_name__" value="ok"/></root>"#,
    );
    let mut args = run_args(&ok);
    args.set = vec!["who=Ada".to_string()];
    assert_eq!(run_script(args).expect("script should load"), 0);

    let failing = dir.join("failing.xml");
    write_file(&failing, r#"<root><assert key="who"/></root>"#);
    assert_eq!(run_script(run_args(&failing)).expect("script should load"), 1);

    let broken = dir.join("broken.xml");
    write_file(&broken, "<root>");
    let error = run_script(run_args(&broken)).expect_err("broken xml should fail to load");
    assert_eq!(error.code, "XML_PARSE_ERROR");

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn run_script_grants_privileges_to_the_top_scope() {
    let dir = temp_path("grant");
    let script = dir.join("grant.xml");
    write_file(
        &script,
        r#"<root>
            <procedure_privilege name="audit"/>
            <procedure name="audit"><set key="done" value="1"/></procedure>
            <set key="!audit" value="1"/>
            <cond_call name="audit"/>
        </root>"#,
    );
    assert_eq!(run_script(run_args(&script)).expect("script should load"), 1);

    let mut args = run_args(&script);
    args.grant = vec!["procedure_privilege".to_string()];
    assert_eq!(run_script(args).expect("script should load"), 0);

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn check_scripts_dir_reports_unknown_tags_and_parse_errors() {
    let dir = temp_path("check");
    write_file(&dir.join("a.xml"), "<root>\n  <set key=\"a\" value=\"1\"/>\n  <mystery/>\n</root>");
    write_file(&dir.join("nested/b.xml"), "<root><sub><get key=\"a\"/></sub></root>");
    write_file(&dir.join("nested/c.xml"), "<root><oops></root>");
    write_file(&dir.join("notes.txt"), "<mystery/>");

    let engine = TagEngine::default();
    let reports: Vec<ScriptReport> = check_scripts_dir(&engine, &dir).expect("dir should scan");
    let paths = reports.iter().map(|report| report.path.as_str()).collect::<Vec<_>>();
    assert_eq!(paths, vec!["a.xml", "nested/b.xml", "nested/c.xml"]);

    assert_eq!(reports[0].unknown_tags, vec![(3, "mystery".to_string())]);
    assert!(reports[1].unknown_tags.is_empty());
    assert!(reports[1].error.is_none());
    assert_eq!(
        reports[2].error.as_ref().map(|error| error.code.as_str()),
        Some("XML_PARSE_ERROR")
    );

    let not_dir = check_scripts_dir(&engine, &dir.join("a.xml")).expect_err("file is not a dir");
    assert_eq!(not_dir.code, "CLI_SOURCE_NOT_DIR");

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn cli_parse_errors_return_non_zero() {
    assert_ne!(run_cli_from_args(["tagrun", "run"]), 0);
    assert_ne!(run_cli_from_args(["tagrun", "unknown"]), 0);
}
