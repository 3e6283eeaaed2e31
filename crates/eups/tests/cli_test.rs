//! CLI smoke tests: spawn the real binary against a scratch stack

use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

const FLAVOR: &str = "Linux64";

fn eups(stack: &Path, home: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_eups"))
        .args(args)
        .env("EUPS_PATH", stack)
        .env("EUPS_SHELL", "sh")
        .env("EUPS_USERDATA", home.join(".eups"))
        .env("EUPS_FLAVOR", FLAVOR)
        .env("PATH", "/usr/bin:/bin")
        .output()
        .expect("binary should run")
}

fn scratch() -> (TempDir, std::path::PathBuf, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let stack = dir.path().join("stack");
    let home = dir.path().join("home");
    std::fs::create_dir_all(stack.join("ups_db")).unwrap();
    std::fs::create_dir_all(&home).unwrap();
    (dir, stack, home)
}

fn install(stack: &Path, product: &str, version: &str) {
    let ups = stack.join(product).join(version).join("ups");
    std::fs::create_dir_all(&ups).unwrap();
    std::fs::write(
        ups.join(format!("{product}.table")),
        "envPrepend(PATH, ${PRODUCT_DIR}/bin)\n",
    )
    .unwrap();
}

fn stdout_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

#[test]
fn test_flavor_verb() {
    let (_keep, stack, home) = scratch();
    let out = eups(&stack, &home, &["flavor"]);
    assert!(out.status.success());
    assert_eq!(stdout_of(&out).trim(), FLAVOR);
}

#[test]
fn test_declare_setup_list_unsetup() {
    let (_keep, stack, home) = scratch();
    install(&stack, "foo", "1.0");
    let root = stack.join("foo/1.0");

    let out = eups(
        &stack,
        &home,
        &[
            "declare",
            "foo",
            "1.0",
            "-r",
            root.to_str().unwrap(),
            "-t",
            "current",
        ],
    );
    assert!(out.status.success(), "declare failed: {out:?}");

    let out = eups(&stack, &home, &["list", "foo"]);
    assert!(out.status.success());
    let listing = stdout_of(&out);
    assert!(listing.contains("foo"));
    assert!(listing.contains("1.0"));
    assert!(listing.contains("current"));

    let out = eups(&stack, &home, &["setup", "foo"]);
    assert!(out.status.success(), "setup failed: {out:?}");
    let commands = stdout_of(&out);
    assert!(
        commands.contains("export SETUP_FOO='foo 1.0 -f Linux64"),
        "commands were: {commands}"
    );
    assert!(commands.contains("export PATH="));
    assert!(commands.contains("foo/1.0/bin"));
    assert!(commands.contains("export FOO_DIR="));

    // a session with those markers can be unwound
    let out = Command::new(env!("CARGO_BIN_EXE_eups"))
        .args(["unsetup", "foo"])
        .env("EUPS_PATH", &stack)
        .env("EUPS_SHELL", "sh")
        .env("EUPS_USERDATA", home.join(".eups"))
        .env("EUPS_FLAVOR", FLAVOR)
        .env(
            "PATH",
            format!("{}/foo/1.0/bin:/usr/bin:/bin", stack.display()),
        )
        .env(
            "SETUP_FOO",
            format!("foo 1.0 -f Linux64 -Z {}", stack.display()),
        )
        .env("FOO_DIR", stack.join("foo/1.0"))
        .output()
        .unwrap();
    assert!(out.status.success(), "unsetup failed: {out:?}");
    let commands = stdout_of(&out);
    assert!(commands.contains("unset SETUP_FOO"), "commands were: {commands}");
    assert!(commands.contains("unset FOO_DIR"));
    assert!(
        commands.contains("export PATH=/usr/bin:/bin"),
        "commands were: {commands}"
    );
}

#[test]
fn test_setup_failure_exit_code() {
    let (_keep, stack, home) = scratch();
    let out = eups(&stack, &home, &["setup", "nosuchproduct"]);
    assert_eq!(out.status.code(), Some(3));
    assert!(String::from_utf8_lossy(&out.stderr).contains("FATAL"));
}

#[test]
fn test_path_verb_lists_stacks() {
    let (_keep, stack, home) = scratch();
    let out = eups(&stack, &home, &["path"]);
    assert!(out.status.success());
    assert!(stdout_of(&out).contains(stack.to_str().unwrap()));
}

#[test]
fn test_undeclare_removes_product() {
    let (_keep, stack, home) = scratch();
    install(&stack, "foo", "1.0");
    let root = stack.join("foo/1.0");
    let out = eups(
        &stack,
        &home,
        &["declare", "foo", "1.0", "-r", root.to_str().unwrap()],
    );
    assert!(out.status.success());

    let out = eups(&stack, &home, &["undeclare", "foo", "1.0"]);
    assert!(out.status.success(), "undeclare failed: {out:?}");

    let out = eups(&stack, &home, &["setup", "foo", "1.0"]);
    assert_eq!(out.status.code(), Some(3));
}
