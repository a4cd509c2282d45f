use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn create_tree(root: &Path, files: &[&str]) {
    for f in files {
        let path = root.join(f);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }
}

fn fu() -> Command {
    let mut cmd = Command::cargo_bin("fu").unwrap();
    cmd.env_remove("FU_LOG");
    cmd
}

#[test]
fn prints_ranked_matches() {
    let dir = tempdir().unwrap();
    create_tree(dir.path(), &["a/foo.txt", "a/bar/foo.txt", "b/zzfoo.log"]);

    let output = fu()
        .args(["-f", "foo"])
        .arg(dir.path())
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let stdout = String::from_utf8(output).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].ends_with("a/foo.txt"));
    assert!(lines[1].ends_with("a/bar/foo.txt"));
    assert!(lines[2].ends_with("b/zzfoo.log"));
}

#[test]
fn glob_excludes_other_extensions() {
    let dir = tempdir().unwrap();
    create_tree(dir.path(), &["a/foo.txt", "b/zzfoo.log"]);

    fu().arg("*.txt")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("foo.txt"))
        .stdout(predicate::str::contains("zzfoo.log").not());
}

#[test]
fn no_match_is_success_with_empty_output() {
    let dir = tempdir().unwrap();
    create_tree(dir.path(), &["a.txt"]);

    fu().arg("nothing")
        .arg(dir.path())
        .assert()
        .code(0)
        .stdout(predicate::str::is_empty());
}

#[test]
fn invalid_pattern_exits_with_one() {
    let dir = tempdir().unwrap();

    fu().arg("[abc")
        .arg(dir.path())
        .assert()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("invalid pattern"));
}

#[test]
fn missing_root_exits_with_one() {
    let dir = tempdir().unwrap();

    fu().arg("x")
        .arg(dir.path().join("missing"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn stats_and_scores() {
    let dir = tempdir().unwrap();
    create_tree(dir.path(), &["one.rs", "two.rs", "three.md"]);

    fu().args(["--stats", "--show-score", "*.rs"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("glob:"))
        .stderr(predicate::str::is_match(r"Traversed 3 entries in .*, found 2 matches\.").unwrap());
}

#[test]
fn limit_and_sequential_mode() {
    let dir = tempdir().unwrap();
    create_tree(dir.path(), &["x1.log", "x2.log", "x3.log"]);

    let output = fu()
        .args(["--seq", "-n", "2", "-b", "x"])
        .arg(dir.path())
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert_eq!(String::from_utf8(output).unwrap().lines().count(), 2);
}

#[test]
fn streaming_mode_prints_everything() {
    let dir = tempdir().unwrap();
    create_tree(dir.path(), &["a/x.txt", "b/y.txt", "c/z.txt"]);

    let output = fu()
        .args(["--stream", "--window", "1", "-a", ".txt"])
        .arg(dir.path())
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert_eq!(String::from_utf8(output).unwrap().lines().count(), 3);
}

#[test]
fn conflicting_modes_are_rejected() {
    fu().args(["-f", "-r", "foo"]).assert().code(2);
}

#[cfg(unix)]
#[test]
fn warnings_go_to_stderr_with_exit_three() {
    let dir = tempdir().unwrap();
    create_tree(dir.path(), &["keep.txt"]);
    std::os::unix::fs::symlink(dir.path().join("gone"), dir.path().join("dangling")).unwrap();

    fu().arg("*.txt")
        .arg(dir.path())
        .assert()
        .code(3)
        .stdout(predicate::str::contains("keep.txt"))
        .stderr(predicate::str::contains("broken symlink"));
}

#[test]
fn exclude_prints_matches_that_fail_the_filters() {
    let dir = tempdir().unwrap();
    create_tree(dir.path(), &["logs.txt"]);
    fs::create_dir(dir.path().join("logs")).unwrap();

    let output = fu()
        .args(["-e", "-d", "logs*"])
        .arg(dir.path())
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let stdout = String::from_utf8(output).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].ends_with("logs.txt"));

    fu().args(["-e", "logs*"]).arg(dir.path()).assert().code(2);
}

#[test]
fn ignore_flag_skips_subtrees() {
    let dir = tempdir().unwrap();
    create_tree(dir.path(), &["target/a.rs", "src/b.rs"]);

    fu().args(["-E", "target/", "*.rs"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("b.rs"))
        .stdout(predicate::str::contains("a.rs").not());
}
