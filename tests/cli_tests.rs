//! CLI integration tests

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::{tempdir, TempDir};

fn corpus(files: &[(&str, &str)]) -> TempDir {
    let dir = tempdir().unwrap();
    for (path, text) in files {
        let path = dir.path().join(path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }
    dir
}

fn dag_migrate() -> Command {
    let mut cmd = Command::cargo_bin("dag-migrate").unwrap();
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_clean_corpus_exits_zero() {
    let dir = corpus(&[("dags/a.py", "import os\n")]);

    dag_migrate()
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"dag-migrate\""))
        .stdout(predicate::str::contains("\"dags/a.py\""));
}

#[test]
fn test_error_finding_exits_one() {
    let dir = corpus(&[(
        "dags/a.py",
        "section = SubDagOperator(task_id='s', subdag=build())\n",
    )]);

    dag_migrate()
        .arg(dir.path())
        .assert()
        .code(1)
        .stdout(predicate::str::contains("AF401"));
}

#[test]
fn test_warnings_alone_exit_zero() {
    let dir = corpus(&[(
        "dags/a.py",
        "from airflow.operators.bash_operator import BashOperator\n",
    )]);

    dag_migrate()
        .arg(dir.path())
        .args(["--format", "text"])
        .assert()
        .success()
        .stdout(predicate::str::contains("warning[AF101]"));
}

#[test]
fn test_parse_failure_exits_one() {
    let dir = corpus(&[("dags/a.py", "import os\n"), ("dags/b.py", "def f(:\n")]);

    dag_migrate()
        .arg(dir.path())
        .assert()
        .code(1)
        .stdout(predicate::str::contains("AF902"));
}

#[test]
fn test_transform_rewrites_in_place() {
    let dir = corpus(&[(
        "dags/a.py",
        "from airflow.operators.bash_operator import BashOperator\n",
    )]);

    dag_migrate()
        .arg(dir.path())
        .args(["--mode", "transform"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"changes\": 1"));

    assert_eq!(
        fs::read_to_string(dir.path().join("dags/a.py")).unwrap(),
        "from airflow.operators.bash import BashOperator\n"
    );
}

#[test]
fn test_output_tree_leaves_sources_alone() {
    let text = "from airflow.operators.bash_operator import BashOperator\n";
    let dir = corpus(&[("dags/a.py", text)]);
    let out = tempdir().unwrap();

    dag_migrate()
        .arg(dir.path())
        .args(["--mode", "transform", "--output-tree"])
        .arg(out.path())
        .assert()
        .success();

    assert_eq!(fs::read_to_string(dir.path().join("dags/a.py")).unwrap(), text);
    assert_eq!(
        fs::read_to_string(out.path().join("dags/a.py")).unwrap(),
        "from airflow.operators.bash import BashOperator\n"
    );
}

#[test]
fn test_output_tree_requires_transform() {
    let dir = corpus(&[("dags/a.py", "import os\n")]);
    let out = tempdir().unwrap();

    dag_migrate()
        .arg(dir.path())
        .arg("--output-tree")
        .arg(out.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--output-tree"));
}

#[test]
fn test_html_report_written_to_file() {
    let dir = corpus(&[("dags/a.py", "start = days_ago(1)\n")]);
    let report = dir.path().join("out").join("report.html");

    dag_migrate()
        .arg(dir.path())
        .args(["--format", "html", "--output"])
        .arg(&report)
        .assert()
        .success()
        .stderr(predicate::str::contains("report written to"));

    let html = fs::read_to_string(&report).unwrap();
    assert!(html.starts_with("<!DOCTYPE html>"));
    assert!(html.contains("AF404"));
}

#[test]
fn test_level_filters_rendering_not_exit_code() {
    let dir = corpus(&[(
        "dags/a.py",
        "start = days_ago(1)\nsection = SubDagOperator(task_id='s')\n",
    )]);

    dag_migrate()
        .arg(dir.path())
        .args(["--level", "ERROR"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("AF401"))
        .stdout(predicate::str::contains("AF404").not());
}

#[test]
fn test_disable_rule() {
    let dir = corpus(&[(
        "dags/a.py",
        "section = SubDagOperator(task_id='s', subdag=build())\n",
    )]);

    dag_migrate()
        .arg(dir.path())
        .args(["--disable", "AF401"])
        .assert()
        .success()
        .stdout(predicate::str::contains("AF401").not());
}

#[test]
fn test_config_file_is_discovered() {
    let dir = corpus(&[
        (
            "dags/a.py",
            "section = SubDagOperator(task_id='s', subdag=build())\n",
        ),
        (
            "dag-migrate.yaml",
            "rules:\n  severity:\n    AF401: warning\noutput:\n  format: text\n",
        ),
    ]);

    dag_migrate()
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("warning[AF401]"));
}

#[test]
fn test_invalid_config_exits_two() {
    let dir = corpus(&[("dags/a.py", "import os\n"), ("settings.toml", "x = 1\n")]);

    dag_migrate()
        .arg(dir.path())
        .arg("--config")
        .arg(dir.path().join("settings.toml"))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("cannot load configuration"));
}

#[test]
fn test_rules_lists_catalog() {
    dag_migrate()
        .arg("rules")
        .assert()
        .success()
        .stdout(predicate::str::contains("AF101"))
        .stdout(predicate::str::contains("AF401"));
}

#[test]
fn test_explain_rule() {
    dag_migrate()
        .args(["explain", "af401"])
        .assert()
        .success()
        .stdout(predicate::str::contains("subdag-operator"));

    dag_migrate()
        .args(["explain", "AF000"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("not found"));
}
