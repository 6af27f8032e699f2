/// End-to-end tests driving the built shell binary over stdin.
use std::path::Path;
use tempfile::tempdir;

/// Runs the shell with `commands` on stdin (plus a trailing EXIT) and
/// returns stdout.
fn run_cli(db: &Path, extra_env: &[(&str, &str)], commands: &str) -> String {
    use std::io::Write;
    use std::process::{Command, Stdio};

    let mut cmd = Command::new(env!("CARGO_BIN_EXE_cli"));
    cmd.env_remove("ATTRSTORE_CONF")
        .env("ATTRSTORE_DB", db)
        .env("ATTRSTORE_SYNC", "false")
        .env("RUST_LOG", "off");
    for (k, v) in extra_env {
        cmd.env(k, v);
    }
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn CLI");

    {
        let stdin = child.stdin.as_mut().expect("Failed to open stdin");
        stdin
            .write_all(commands.as_bytes())
            .expect("Failed to write to stdin");
        stdin.write_all(b"EXIT\n").expect("Failed to write EXIT");
    }

    let output = child.wait_with_output().expect("Failed to read output");
    assert!(output.status.success(), "{:?}", output);
    String::from_utf8_lossy(&output.stdout).to_string()
}

/// Command replies only: banner lines and prompts stripped.
fn replies(output: &str) -> Vec<String> {
    output
        .lines()
        .skip(3)
        .map(|l| l.trim_start_matches("> ").to_string())
        .filter(|l| !l.is_empty())
        .collect()
}

#[test]
fn banner_reflects_configuration() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("attrs.db");
    let out = run_cli(
        &db,
        &[("ATTRSTORE_CACHE_SIZE", "4096"), ("ATTRSTORE_CACHE_WIDTH", "0")],
        "",
    );
    assert!(out.starts_with("attrstore started"));
    assert!(out.contains("cache=4096 bytes, width=200"));
    assert!(out.trim_end().ends_with("bye"));
}

#[test]
fn set_and_get() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("attrs.db");
    let out = run_cli(&db, &[], "SET 1 10 Alice\nGET 1 10\nGET 1 11\n");
    assert_eq!(replies(&out), ["OK", "Alice", "(nil)", "bye"]);
}

#[test]
fn exit_flushes_to_disk() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("attrs.db");
    run_cli(&db, &[], "SET 5 1 first\nSET 5 2 second\nKPUT dbinfo top 6\n");

    let out = run_cli(&db, &[], "GET 5 1\nGET 5 2\nKGET dbinfo top\n");
    assert_eq!(replies(&out), ["first", "second", "6", "bye"]);
}

#[test]
fn tiny_cache_still_reads_its_writes() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("attrs.db");
    let mut script = String::new();
    for i in 0..100 {
        script.push_str(&format!("SET {} 1 value-{}\n", i, i));
    }
    for i in 0..100 {
        script.push_str(&format!("GET {} 1\n", i));
    }
    let out = run_cli(&db, &[("ATTRSTORE_CACHE_SIZE", "32")], &script);
    let replies = replies(&out);
    for i in 0..100 {
        assert_eq!(replies[100 + i], format!("value-{}", i));
    }
}

#[test]
fn deletes_survive_restart() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("attrs.db");
    run_cli(&db, &[], "SET 2 1 x\nSET 2 2 y\nSYNC\nDEL 2 1\n");

    let out = run_cli(&db, &[], "GET 2 1\nGET 2 2\n");
    assert_eq!(replies(&out), ["(nil)", "y", "bye"]);
}

#[test]
fn reset_and_optimize() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("attrs.db");
    let out = run_cli(
        &db,
        &[],
        "SET 1 1 a\nSET 1 1 b\nSET 1 1 c\nRESET\nOPTIMIZE\nGET 1 1\n",
    );
    let replies = replies(&out);
    assert_eq!(replies[3], "OK");
    assert!(replies[4].starts_with("OK (1 records"), "{}", replies[4]);
    assert_eq!(replies[5], "c");
}

#[test]
fn bad_config_file_fails_startup() {
    use std::process::Command;

    let dir = tempdir().unwrap();
    let conf = dir.path().join("bad.conf");
    std::fs::write(&conf, "cache_size 10\nbogus 1\n").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_cli"))
        .env("ATTRSTORE_CONF", &conf)
        .env("ATTRSTORE_DB", dir.path().join("attrs.db"))
        .output()
        .expect("Failed to run CLI");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("line 2"), "{}", stderr);
}

#[test]
fn startup_settings_are_logged_to_stderr() {
    use std::io::Write;
    use std::process::{Command, Stdio};

    let dir = tempdir().unwrap();
    let mut child = Command::new(env!("CARGO_BIN_EXE_cli"))
        .env_remove("ATTRSTORE_CONF")
        .env("ATTRSTORE_DB", dir.path().join("attrs.db"))
        .env("ATTRSTORE_CACHE_SIZE", "4096")
        .env("RUST_LOG", "info")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn CLI");
    child
        .stdin
        .as_mut()
        .expect("Failed to open stdin")
        .write_all(b"EXIT\n")
        .expect("Failed to write EXIT");

    let output = child.wait_with_output().expect("Failed to read output");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("store opened"), "{}", stderr);
    assert!(stderr.contains("cache_size=4096"), "{}", stderr);
    assert!(!String::from_utf8_lossy(&output.stdout).contains("store opened"));
}
