//! Integration tests for core CLI contract behavior.

use {
    predicates::prelude::*,
    std::{fs, path::Path},
    tempfile::{TempDir, tempdir},
};

fn cli_cmd(dir: &Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("bootflash");
    // Keep local config files and profile variables out of the way.
    cmd.current_dir(dir)
        .env("NO_COLOR", "1")
        .env_remove("BOOTFLASH_PAGE_SIZE")
        .env_remove("BOOTFLASH_BASE_ADDRESS")
        .env_remove("BOOTFLASH_FILL_BYTE")
        .env_remove("BOOTFLASH_MAX_RETRIES")
        .env_remove("BOOTFLASH_ADDRESS_SPACE");
    cmd
}

/// Temp dir holding a 10-page image for a 256-byte page profile.
fn firmware_dir() -> TempDir {
    let dir = tempdir().expect("tempdir should be created");
    fs::write(dir.path().join("fw.bin"), vec![0xA5; 256 * 9 + 17]).expect("write fw.bin");
    fs::write(
        dir.path().join("bootflash.toml"),
        "[profile]\npage_size = 256\nmax_retries = 2\n",
    )
    .expect("write bootflash.toml");
    dir
}

#[test]
fn help_exits_zero_and_writes_stdout_only() {
    let dir = tempdir().expect("tempdir should be created");
    cli_cmd(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("bootflash"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn version_exits_zero_and_writes_stdout_only() {
    let dir = tempdir().expect("tempdir should be created");
    cli_cmd(dir.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("bootflash"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn info_json_reports_pages() {
    let dir = firmware_dir();
    let output = cli_cmd(dir.path())
        .args(["info", "fw.bin", "--json"])
        .output()
        .expect("command should execute");

    assert!(output.status.success());
    let parsed: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert_eq!(parsed["ok"], true);
    assert_eq!(parsed["data"]["pages"], 10);
    assert_eq!(parsed["data"]["page_size"], 256);
    assert_eq!(parsed["data"]["first_address"], 0x2000);
    assert_eq!(
        parsed["data"]["addresses"]
            .as_array()
            .map(Vec::len),
        Some(10)
    );
}

#[test]
fn info_json_error_keeps_stdout_clean() {
    let dir = tempdir().expect("tempdir should be created");
    cli_cmd(dir.path())
        .args(["info", "--json", "not_exists.bin"])
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn info_rejects_oversized_image() {
    let dir = tempdir().expect("tempdir should be created");
    fs::write(dir.path().join("big.bin"), vec![0; 4096]).expect("write big.bin");
    cli_cmd(dir.path())
        .args(["--address-space", "800", "info", "big.bin"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid image"));
}

#[test]
fn info_reads_intel_hex() {
    let dir = tempdir().expect("tempdir should be created");
    // 4 bytes at 0x2000, then EOF
    fs::write(
        dir.path().join("fw.hex"),
        ":0420000001020304D2\n:00000001FF\n",
    )
    .expect("write fw.hex");

    let output = cli_cmd(dir.path())
        .args(["info", "fw.hex", "--json"])
        .output()
        .expect("command should execute");
    assert!(output.status.success());
    let parsed: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert_eq!(parsed["data"]["pages"], 1);
    assert_eq!(parsed["data"]["format"], "IntelHex");
}

#[test]
fn simulate_clean_flash_succeeds() {
    let dir = firmware_dir();
    let output = cli_cmd(dir.path())
        .args(["simulate", "fw.bin", "--json"])
        .output()
        .expect("command should execute");

    assert_eq!(output.status.code(), Some(0));
    let parsed: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert_eq!(parsed["ok"], true);
    assert_eq!(parsed["data"]["outcome"], "Completed");
    assert_eq!(parsed["data"]["writes"], 10);
    assert_eq!(parsed["data"]["reset"], true);
}

#[test]
fn simulate_recovers_from_one_page_error() {
    let dir = firmware_dir();
    let output = cli_cmd(dir.path())
        .args(["simulate", "fw.bin", "--json", "--fail-page", "4"])
        .output()
        .expect("command should execute");

    assert_eq!(output.status.code(), Some(0));
    let parsed: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert_eq!(parsed["data"]["writes"], 11);
    assert_eq!(parsed["data"]["retries"], 1);
}

#[test]
fn simulate_persistent_error_exits_with_flash_failure() {
    let dir = firmware_dir();
    cli_cmd(dir.path())
        .args([
            "simulate",
            "fw.bin",
            "--fail-page",
            "0",
            "--fail-times",
            "5",
            "--error-code",
            "9",
        ])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("device error code 9"));
}

#[test]
fn simulate_failure_json_counts_only_resends() {
    let dir = firmware_dir();
    let output = cli_cmd(dir.path())
        .args([
            "simulate",
            "fw.bin",
            "--json",
            "--fail-page",
            "0",
            "--fail-times",
            "10",
        ])
        .output()
        .expect("command should execute");

    assert_eq!(output.status.code(), Some(4));
    let parsed: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert_eq!(parsed["ok"], false);
    // max_retries = 2: one initial write plus two re-sends
    assert_eq!(parsed["data"]["writes"], 3);
    assert_eq!(parsed["data"]["retries"], 2);
}

#[test]
fn simulate_disconnect_exits_with_flash_failure() {
    let dir = firmware_dir();
    cli_cmd(dir.path())
        .args(["-q", "simulate", "fw.bin", "--disconnect-after", "3"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("disconnected"));
}

#[test]
fn profile_prints_effective_toml() {
    let dir = firmware_dir();
    cli_cmd(dir.path())
        .args(["--fill-byte", "0x00", "profile"])
        .assert()
        .success()
        .stdout(predicate::str::contains("page_size = 256"))
        .stdout(predicate::str::contains("max_retries = 2"))
        .stdout(predicate::str::contains("fill_byte = 0"));
}

#[test]
fn profile_environment_overrides_file() {
    let dir = firmware_dir();
    cli_cmd(dir.path())
        .env("BOOTFLASH_MAX_RETRIES", "7")
        .arg("profile")
        .assert()
        .success()
        .stdout(predicate::str::contains("max_retries = 7"));
}

#[test]
fn invalid_profile_is_rejected() {
    let dir = tempdir().expect("tempdir should be created");
    cli_cmd(dir.path())
        .args(["--page-size", "1000", "profile"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Configuration error"));
}

#[test]
fn invalid_config_file_warns_and_continues() {
    let dir = tempdir().expect("tempdir should be created");
    fs::write(dir.path().join("bootflash.toml"), "invalid toml [[[").expect("write config");
    cli_cmd(dir.path())
        .arg("profile")
        .assert()
        .success()
        .stdout(predicate::str::contains("page_size = 2048"))
        .stderr(predicate::str::contains("TOML"));
}

#[test]
fn completions_generate_script() {
    let dir = tempdir().expect("tempdir should be created");
    cli_cmd(dir.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("bootflash"));
}

#[test]
fn missing_subcommand_is_usage_error() {
    let dir = tempdir().expect("tempdir should be created");
    cli_cmd(dir.path()).assert().code(2);
}
