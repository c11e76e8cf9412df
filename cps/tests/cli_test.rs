//! Binary-level tests

use std::fs;
use std::process::{Command as StdCommand, Stdio};
use std::time::Duration;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn cps(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("cps").unwrap();
    cmd.current_dir(dir.path()).env("RUST_LOG", "warn");
    cmd
}

#[test]
fn test_missing_joblist_argument() {
    let temp = TempDir::new().unwrap();

    cps(&temp)
        .args(["-n", "3"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage: cps <JOBLIST>"));

    assert!(!temp.path().join("cps.log").exists());
}

#[test]
fn test_unreadable_joblist() {
    let temp = TempDir::new().unwrap();

    cps(&temp)
        .args(["-n", "3", "no-such-file.txt"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Could not open no-such-file.txt"));
}

#[test]
fn test_run_writes_text_report() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("jobs.txt"), "# warmup\ntrue\necho hello\n").unwrap();

    cps(&temp)
        .args(["-n", "3", "jobs.txt"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hello"));

    let report = fs::read_to_string(temp.path().join("cps.log")).unwrap();
    assert!(report.starts_with("Number of tasks : 2\nNumber of processes : 3\n"));
    assert!(report.contains("Task list:\nCommand : Elapsed time\n"));
    assert!(report.contains("\ntrue : "));
    assert!(report.contains("\necho hello : "));
    assert!(!report.contains("warmup"));
}

#[test]
fn test_run_json_report_to_custom_path() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("jobs.txt"), "true\ntrue\ntrue\n").unwrap();

    cps(&temp)
        .args(["-n", "2", "--strategy", "polling", "--format", "json"])
        .args(["--report", "out/report.json", "jobs.txt"])
        .assert()
        .success();

    let content = fs::read_to_string(temp.path().join("out").join("report.json")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&content).unwrap();
    assert_eq!(value["jobs"], 3);
    assert_eq!(value["procs"], 2);
    assert_eq!(value["tasks"].as_array().unwrap().len(), 3);
}

#[test]
fn test_config_file_sets_report_path() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("jobs.txt"), "true\n").unwrap();
    fs::write(temp.path().join("cps.yml"), "procs: 2\nreport:\n  path: from-config.log\n").unwrap();

    cps(&temp)
        .args(["--config", "cps.yml", "jobs.txt"])
        .assert()
        .success();

    let report = fs::read_to_string(temp.path().join("from-config.log")).unwrap();
    assert!(report.contains("Number of processes : 2"));
}

#[test]
fn test_single_process_with_jobs_fails() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("jobs.txt"), "true\n").unwrap();

    cps(&temp)
        .args(["-n", "1", "jobs.txt"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No workers available"));
}

#[test]
fn test_listen_and_connect_processes() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("jobs.txt"), "true\necho one\necho two\ntrue\n").unwrap();
    let bin = assert_cmd::cargo::cargo_bin("cps");

    let coordinator = StdCommand::new(&bin)
        .current_dir(temp.path())
        .args(["-n", "3", "--listen", "cps.sock", "jobs.txt"])
        .stdout(Stdio::null())
        .spawn()
        .unwrap();

    let workers: Vec<_> = (0..2)
        .map(|_| {
            StdCommand::new(&bin)
                .current_dir(temp.path())
                .args(["--connect", "cps.sock"])
                .stdout(Stdio::null())
                .spawn()
                .unwrap()
        })
        .collect();

    let status = wait_with_timeout(coordinator, Duration::from_secs(30));
    assert!(status.success());
    for worker in workers {
        assert!(wait_with_timeout(worker, Duration::from_secs(30)).success());
    }

    let report = fs::read_to_string(temp.path().join("cps.log")).unwrap();
    assert!(report.starts_with("Number of tasks : 4\nNumber of processes : 3\n"));
    assert!(!temp.path().join("cps.sock").exists());
}

#[test]
fn test_listen_without_joblist_fails_every_process() {
    let temp = TempDir::new().unwrap();
    let bin = assert_cmd::cargo::cargo_bin("cps");

    let coordinator = StdCommand::new(&bin)
        .current_dir(temp.path())
        .args(["-n", "3", "--listen", "cps.sock"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    let workers: Vec<_> = (0..2)
        .map(|_| {
            StdCommand::new(&bin)
                .current_dir(temp.path())
                .args(["--connect", "cps.sock"])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()
                .unwrap()
        })
        .collect();

    assert!(!wait_with_timeout(coordinator, Duration::from_secs(30)).success());
    for worker in workers {
        assert!(!wait_with_timeout(worker, Duration::from_secs(30)).success());
    }
    assert!(!temp.path().join("cps.log").exists());
}

fn wait_with_timeout(mut child: std::process::Child, limit: Duration) -> std::process::ExitStatus {
    let deadline = std::time::Instant::now() + limit;
    loop {
        if let Some(status) = child.try_wait().unwrap() {
            return status;
        }
        if std::time::Instant::now() > deadline {
            let _ = child.kill();
            panic!("process did not exit within {:?}", limit);
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}
