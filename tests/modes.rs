//! Extract and diff modes, plus argument validation, through the binary.

use assert_cmd::Command;
use assert_fs::prelude::*;
use predicates::prelude::*;

fn wiggle() -> Command {
    Command::cargo_bin("wiggle").unwrap()
}

const MERGED: &str = "\
head\n<<<<<<< a\nours\n||||||| b\nbase\n=======\ntheirs\n>>>>>>> c\ntail\n";

#[test]
fn extract_selects_each_merge_branch() {
    let tmp = assert_fs::TempDir::new().unwrap();
    tmp.child("m").write_str(MERGED).unwrap();

    for (flag, expect) in [
        ("-1", "head\nours\ntail\n"),
        ("-2", "head\nbase\ntail\n"),
        ("-3", "head\ntheirs\ntail\n"),
    ] {
        wiggle()
            .current_dir(&tmp)
            .args(["--extract", flag, "m"])
            .assert()
            .success()
            .stdout(expect);
    }
}

#[test]
fn extract_patch_branch_keeps_hunk_sentinels() {
    let tmp = assert_fs::TempDir::new().unwrap();
    tmp.child("p").write_str("@@ -1,3 +1,3 @@\n a\n-b\n+B\n c\n").unwrap();

    let out = wiggle()
        .current_dir(&tmp)
        .args(["--extract", "-p", "-1", "p"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert_eq!(out[0], 0, "hunk sentinel expected at start");
    assert!(out.ends_with(b"a\nb\nc\n"));
}

#[test]
fn extract_third_branch_of_patch_is_rejected() {
    let tmp = assert_fs::TempDir::new().unwrap();
    tmp.child("p").write_str("@@ -1,1 +1,1 @@\n-x\n+y\n").unwrap();
    wiggle()
        .current_dir(&tmp)
        .args(["--extract", "-p", "-3", "p"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("cannot extract -3"));
}

#[test]
fn extract_requires_a_selector() {
    let tmp = assert_fs::TempDir::new().unwrap();
    tmp.child("m").write_str(MERGED).unwrap();
    wiggle()
        .current_dir(&tmp)
        .args(["--extract", "m"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("-1, -2 or -3"));
}

#[test]
fn diff_lines_prints_unified_body() {
    let tmp = assert_fs::TempDir::new().unwrap();
    tmp.child("f1").write_str("a\nb\nc\n").unwrap();
    tmp.child("f2").write_str("a\nB\nc\n").unwrap();

    wiggle()
        .current_dir(&tmp)
        .args(["--diff", "--lines", "f1", "f2"])
        .assert()
        .code(1)
        .stdout("@@ -1,3 +1,3 @@\n a\n-b\n+B\n c\n");
}

#[test]
fn diff_of_identical_files_is_quiet_success() {
    let tmp = assert_fs::TempDir::new().unwrap();
    tmp.child("f1").write_str("same\n").unwrap();
    tmp.child("f2").write_str("same\n").unwrap();

    wiggle()
        .current_dir(&tmp)
        .args(["--diff", "--lines", "f1", "f2"])
        .assert()
        .success()
        .stdout("@@ -1,1 +1,1 @@\n same\n");
}

#[test]
fn diff_words_brackets_changed_words() {
    let tmp = assert_fs::TempDir::new().unwrap();
    tmp.child("f1").write_str("keep foo end\n").unwrap();
    tmp.child("f2").write_str("keep bar end\n").unwrap();

    wiggle()
        .current_dir(&tmp)
        .args(["--diff", "f1", "f2"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("<<<--"))
        .stdout(predicate::str::contains("<<<++"));
}

#[test]
fn diff_of_a_single_patch_rediffs_its_sides() {
    let tmp = assert_fs::TempDir::new().unwrap();
    tmp.child("p").write_str("@@ -1,3 +1,3 @@\n a\n-b\n+B\n c\n").unwrap();

    wiggle()
        .current_dir(&tmp)
        .args(["--diff", "p"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("@@ -1,3"));
}

#[test]
fn browse_mode_is_not_built() {
    let tmp = assert_fs::TempDir::new().unwrap();
    tmp.child("f").write_str("x\n").unwrap();
    wiggle()
        .current_dir(&tmp)
        .args(["--browse", "f"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("browse"));
}

#[test]
fn replace_outside_merge_mode_is_rejected() {
    let tmp = assert_fs::TempDir::new().unwrap();
    tmp.child("f").write_str("x\n").unwrap();
    wiggle()
        .current_dir(&tmp)
        .args(["--diff", "--replace", "f", "f"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--replace only allowed"));
}

#[test]
fn missing_file_is_an_io_error() {
    let tmp = assert_fs::TempDir::new().unwrap();
    tmp.child("patch").write_str("@@ -1,1 +1,1 @@\n-x\n+y\n").unwrap();
    wiggle()
        .current_dir(&tmp)
        .args(["nosuch", "patch"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("nosuch"));
}

#[test]
fn completions_are_generated() {
    wiggle()
        .args(["--completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("wiggle"));
}

#[test]
fn config_file_sets_line_granularity_default() {
    // Disjoint word edits on one line merge cleanly word-wise but
    // conflict line-wise; `lines = true` in the config flips the default.
    let patch = "@@ -1,1 +1,1 @@\n-int foo(int x) { return x; }\n+int foo(int y) { return y; }\n";
    let tmp = assert_fs::TempDir::new().unwrap();
    tmp.child("orig").write_str("int bar(int x) { return x; }\n").unwrap();
    tmp.child("patch").write_str(patch).unwrap();
    tmp.child(".wiggle.toml").write_str("lines = true\n").unwrap();

    wiggle().current_dir(&tmp).args(["orig", "patch"]).assert().code(1);

    // An explicit -w on the command line still wins over the config.
    wiggle()
        .current_dir(&tmp)
        .args(["--words", "orig", "patch"])
        .assert()
        .success()
        .stdout("int bar(int y) { return y; }\n");
}
