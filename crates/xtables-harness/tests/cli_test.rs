//! Integration test: `xtables-test` binary surface.
//!
//! Validates that:
//! 1. `-m` prints one missing test file per line on stdout.
//! 2. Usage errors (two positionals, `-m` with a file) run nothing.
//! 3. Fatal errors print their message, not a debug dump, and exit non-zero.
//! 4. Execute mode without root prints the refusal and runs nothing.
//!
//! Run: cargo test -p xtables-harness --test cli_test

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

use xtables_harness::privilege::{NOT_ROOT_MESSAGE, is_root};

fn scratch_dir(tag: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!(
        "xtables_cli_{tag}_{}_{nanos}",
        std::process::id()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn touch(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn xtables_test(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_xtables-test"))
        .args(args)
        .env_remove("XTABLES_TEST_EXTENSIONS")
        // Never reach a real firewall from the test suite.
        .env("XTABLES_TEST_IPV4_BIN", "/nonexistent/iptables")
        .env("XTABLES_TEST_IPV6_BIN", "/nonexistent/ip6tables")
        .output()
        .expect("xtables-test binary should run")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn audit_prints_one_name_per_line() {
    let dir = scratch_dir("audit");
    for name in ["libxt_tcp.c", "libxt_tcp.t", "libipt_ah.c", "libip6t_frag.c"] {
        touch(&dir, name, "");
    }

    let output = xtables_test(&["-m", "--extensions", dir.to_str().unwrap()]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output), "libip6t_frag.t\nlibipt_ah.t\n");

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn audit_of_missing_directory_reports_the_error_text() {
    let dir = scratch_dir("gone").join("nope");
    let output = xtables_test(&["--missing", "--extensions", dir.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.contains(dir.to_str().unwrap()), "stderr: {err}");
    assert!(!err.contains("Io {"), "stderr: {err}");
    assert!(stdout(&output).is_empty());
}

#[test]
fn two_positionals_are_a_usage_error() {
    let dir = scratch_dir("usage");
    let a = touch(&dir, "libxt_a.t", ":INPUT\n-j ACCEPT;=;OK\n");
    let b = touch(&dir, "libxt_b.t", ":INPUT\n-j ACCEPT;=;OK\n");

    let output = xtables_test(&[a.to_str().unwrap(), b.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("Usage:"));
    assert!(stdout(&output).is_empty());

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn missing_flag_conflicts_with_a_file() {
    let output = xtables_test(&["-m", "libxt_tcp.t"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("cannot be used with"));
    assert!(stdout(&output).is_empty());
}

#[test]
fn test_before_chain_prints_the_fatal_message() {
    let dir = scratch_dir("nochain");
    let file = touch(&dir, "libxt_bad.t", "-j ACCEPT;=;OK\n");

    let output = xtables_test(&[file.to_str().unwrap()]);
    if is_root() {
        assert_eq!(output.status.code(), Some(1));
        let err = stderr(&output);
        assert!(
            err.contains("line 1: broken test, missing chain, leaving"),
            "stderr: {err}"
        );
        assert!(!err.contains("MissingChain"), "stderr: {err}");
        assert!(!stdout(&output).contains("unit tests"));
    } else {
        assert!(output.status.success());
        assert_eq!(stdout(&output), format!("{NOT_ROOT_MESSAGE}\n"));
    }

    std::fs::remove_dir_all(&dir).ok();
}
