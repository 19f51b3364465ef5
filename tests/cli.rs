use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn readmark(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("readmark").expect("readmark binary");
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join("config"))
        .env("READMARK_STORAGE__PATH", home.join("state.db"))
        .env_remove("RUST_LOG");
    cmd
}

fn write_snapshot(dir: &Path) -> String {
    let path = dir.join("thread.json");
    fs::write(
        &path,
        r#"{
            "url": "https://www.housingbubble.blog/?p=7001",
            "header_height": 50,
            "comments": [
                { "element_id": "comment-7100", "author": "Ann", "offset": 400 },
                { "element_id": "comment-7105", "author": "Spammer2020", "offset": 800 },
                { "element_id": "respond" },
                { "element_id": "comment-7110", "author": "Bob", "offset": 1300 }
            ]
        }"#,
    )
    .expect("write snapshot");
    path.display().to_string()
}

#[test]
fn rejects_unknown_command() {
    let home = TempDir::new().unwrap();
    readmark(home.path())
        .arg("frobnicate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognised command line"));
}

#[test]
fn read_state_survives_between_runs() {
    let home = TempDir::new().unwrap();
    let snapshot = write_snapshot(home.path());

    readmark(home.path())
        .args(["ignore", "spammer2021"])
        .assert()
        .success()
        .stdout("ignoring spammer2021\n");

    readmark(home.path())
        .args(["process", &snapshot])
        .assert()
        .success()
        .stdout(predicate::str::contains("7105\tSpammer2020\tnew,ignored"))
        .stdout(predicate::str::contains(
            "post 7001: 3 comments, 3 unread, 3 remaining",
        ));

    readmark(home.path())
        .args(["process", &snapshot, "--read-all"])
        .assert()
        .success();

    readmark(home.path())
        .args(["status", "7001"])
        .assert()
        .success()
        .stdout("post 7001: 3 read comments\n7100;5;5\n");

    readmark(home.path())
        .args(["summary", "7001", "5"])
        .assert()
        .success()
        .stdout("5 Comments (2 New)\n");

    readmark(home.path())
        .args(["process", &snapshot])
        .assert()
        .success()
        .stdout(predicate::str::contains("7100\tAnn\t\n"))
        .stdout(predicate::str::contains("0 unread"));
}

#[test]
fn clear_keeps_preferences() {
    let home = TempDir::new().unwrap();
    let snapshot = write_snapshot(home.path());

    readmark(home.path())
        .args(["history", "10"])
        .assert()
        .success()
        .stdout("keeping read history for 10 days\n");
    readmark(home.path())
        .args(["process", &snapshot, "--read-all"])
        .assert()
        .success();

    readmark(home.path()).arg("clear").assert().success();

    readmark(home.path())
        .args(["status", "7001"])
        .assert()
        .success()
        .stdout("post 7001: 0 read comments\n");
    readmark(home.path())
        .args(["history", "0"])
        .assert()
        .success()
        .stdout("keeping read history for 10 days\n");
}
