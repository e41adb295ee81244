//! CLI integration tests

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn cli() -> Command {
    let mut cmd = Command::cargo_bin("rtt-harvester").unwrap();
    cmd.env_remove("ATLAS_API_KEY").env("RUST_LOG", "off");
    cmd
}

#[test]
fn test_help_lists_commands() {
    cli()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("harvest"))
        .stdout(predicate::str::contains("anchors"))
        .stdout(predicate::str::contains("status"));
}

#[test]
fn test_harvest_help_shows_defaults() {
    cli()
        .args(["harvest", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--target-samples"))
        .stdout(predicate::str::contains("[default: 500]"))
        .stdout(predicate::str::contains("--results-window-hours"));
}

#[test]
fn test_zero_workers_rejected() {
    cli()
        .args(["harvest", "--workers", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("workers must be at least 1"));
}

#[test]
fn test_status_without_cache_fails() {
    let temp_dir = TempDir::new().unwrap();
    cli()
        .arg("status")
        .arg("--anchor-cache")
        .arg(temp_dir.path().join("missing.csv"))
        .arg("--output-dir")
        .arg(temp_dir.path())
        .assert()
        .failure();
}

#[test]
fn test_status_reports_progress() {
    let temp_dir = TempDir::new().unwrap();
    let cache = temp_dir.path().join("anchors.csv");
    std::fs::write(
        &cache,
        "aid,pid,address_v4,asn_v4,latitude,longitude,country_code,city\n\
         1,6001,192.0.2.1,64500,52.37,4.9,NL,Amsterdam\n\
         2,6002,192.0.2.2,64501,50.11,8.68,DE,Frankfurt\n",
    )
    .unwrap();
    std::fs::write(
        temp_dir.path().join("192.0.2.1.csv"),
        "destination_probe_id,source_probe_id,sample_index,rtt\n6001,6002,0,7.5\n6001,6002,1,8.0\n",
    )
    .unwrap();

    cli()
        .arg("--anchor-cache")
        .arg(&cache)
        .arg("--output-dir")
        .arg(temp_dir.path())
        .args(["status", "--target-samples", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1/1 sources complete"))
        .stdout(predicate::str::contains(
            "2 destinations, 1 started, 1 complete, 2 samples",
        ));
}

#[test]
fn test_status_flags_corrupt_log() {
    let temp_dir = TempDir::new().unwrap();
    let cache = temp_dir.path().join("anchors.csv");
    std::fs::write(
        &cache,
        "aid,pid,address_v4,asn_v4,latitude,longitude,country_code,city\n\
         1,6001,192.0.2.1,64500,52.37,4.9,NL,Amsterdam\n",
    )
    .unwrap();
    std::fs::write(
        temp_dir.path().join("192.0.2.1.csv"),
        "when,who,value\n1,2,3\n",
    )
    .unwrap();

    // Log output goes to stdout
    cli()
        .env("RUST_LOG", "rtt_harvester=error")
        .env("LOG_FORMAT", "json")
        .arg("--anchor-cache")
        .arg(&cache)
        .arg("--output-dir")
        .arg(temp_dir.path())
        .arg("status")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("invalid sample log"));
}
