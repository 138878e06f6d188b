/*
 * cli_tests.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! End-to-end tests for the `wikimark` binary.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn write_config(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("wikimark.toml");
    std::fs::write(&path, "[users]\nalice = \"42\"\n").unwrap();
    path
}

fn wikimark(args: &[&str], stdin: &str) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_wikimark"))
        .args(args)
        .env("RUST_LOG", "off")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(stdin.as_bytes())
        .unwrap();
    child.wait_with_output().unwrap()
}

#[test]
fn test_compile_file() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path());
    let page = temp.path().join("page.md");
    std::fs::write(&page, "Owner: @{alice}\n").unwrap();

    let output = wikimark(
        &[
            "--config",
            config.to_str().unwrap(),
            "-f",
            page.to_str().unwrap(),
        ],
        "",
    );

    assert!(output.status.success());
    assert_eq!(
        String::from_utf8(output.stdout).unwrap(),
        "Owner: <ac:link><ri:user ri:account-id=\"42\"/></ac:link>\n\n"
    );
}

#[test]
fn test_compile_stdin_with_templates_dir() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path());
    std::fs::write(temp.path().join("hr.tpl"), "<hr/>").unwrap();

    let output = wikimark(
        &[
            "--config",
            config.to_str().unwrap(),
            "--templates",
            temp.path().to_str().unwrap(),
        ],
        "<!-- Include: hr.tpl -->",
    );

    assert!(output.status.success());
    assert_eq!(String::from_utf8(output.stdout).unwrap(), "<hr/>\n");
}

#[test]
fn test_compile_error_exits_nonzero() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path());

    let output = wikimark(
        &["--config", config.to_str().unwrap()],
        "<!-- Macro: x\n -->",
    );

    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
}
