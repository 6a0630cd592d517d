// Drives the compiled binary through the non-interactive subcommands.
// Every run points at a temporary config and database, so nothing touches the
// user's state directory.

use std::path::Path;

use assert_cmd::Command;
use tempfile::tempdir;

fn showspeed(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("showspeed").unwrap();
    cmd.arg("--config")
        .arg(dir.join("config.json"))
        .arg("--db")
        .arg(dir.join("results.db"));
    cmd
}

fn stdout(cmd: &mut Command) -> String {
    let output = cmd.assert().success().get_output().stdout.clone();
    String::from_utf8(output).unwrap()
}

#[test]
fn times_lists_presets() {
    let dir = tempdir().unwrap();
    let out = stdout(showspeed(dir.path()).arg("times"));

    assert_eq!(out.lines().count(), 4);
    assert!(out.lines().next().unwrap().contains("15s"));
}

#[test]
fn account_lifecycle() {
    let dir = tempdir().unwrap();

    stdout(showspeed(dir.path()).args([
        "signup",
        "--name",
        "ada",
        "--email",
        "ada@example.com",
        "--password",
        "secret1",
    ]));

    // duplicate email
    showspeed(dir.path())
        .args([
            "signup",
            "--name",
            "ada",
            "--email",
            "ada@example.com",
            "--password",
            "secret1",
        ])
        .assert()
        .failure();

    showspeed(dir.path())
        .args(["login", "--email", "ada@example.com", "--password", "wrong!"])
        .assert()
        .failure();

    let out = stdout(showspeed(dir.path()).args([
        "login",
        "--email",
        "ada@example.com",
        "--password",
        "secret1",
    ]));
    assert!(out.contains("logged in as ada"));

    let config = std::fs::read_to_string(dir.path().join("config.json")).unwrap();
    assert!(config.contains("\"token\""));

    let out = stdout(showspeed(dir.path()).arg("stats"));
    assert!(out.contains("no tests yet"));

    let out = stdout(showspeed(dir.path()).args(["leaderboard", "--mode", "time"]));
    assert!(out.contains("no results yet"));

    let csv_path = dir.path().join("results.csv");
    stdout(showspeed(dir.path()).arg("export").arg("--output").arg(&csv_path));
    assert!(csv_path.exists());

    stdout(showspeed(dir.path()).arg("logout"));
    showspeed(dir.path()).arg("stats").assert().failure();
}
