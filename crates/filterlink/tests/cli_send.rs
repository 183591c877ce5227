#![cfg(all(unix, feature = "cli"))]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn unique_temp_file(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/filterlink-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    let path = dir.join("link.bin");
    std::fs::write(&path, b"").expect("link file should be creatable");
    path
}

fn send(device: &Path, link_args: &[&str], packet: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_filterlink"))
        .args(["--log-level", "error", "--format", "json", "send"])
        .arg(device)
        .args(["--settle-ms", "0"])
        .args(link_args)
        .args(packet)
        .output()
        .expect("filterlink should run")
}

fn cleanup(device: &Path) {
    if let Some(dir) = device.parent() {
        let _ = std::fs::remove_dir_all(dir);
    }
}

#[test]
fn command_is_written_as_one_frame() {
    let device = unique_temp_file("send-command");

    let output = send(
        &device,
        &["--no-probe"],
        &["command", "chain", "save", "live"],
    );
    assert!(output.status.success(), "{output:?}");

    let written = std::fs::read(&device).expect("link file should be readable");
    assert_eq!(written, b"MBED\x09\x11\x00\x03chain\0save\0live\0".to_vec());

    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("send should emit json");
    assert_eq!(report["packet_type"], "command");
    assert_eq!(report["payload_size"], 17);

    cleanup(&device);
}

#[test]
fn session_probes_before_sending() {
    let device = unique_temp_file("send-probe");

    let output = send(&device, &[], &["reset"]);
    assert!(output.status.success());

    let written = std::fs::read(&device).expect("link file should be readable");
    assert_eq!(written, b"MBED\x00\x00\x00MBED\x01\x00\x00".to_vec());

    cleanup(&device);
}

#[test]
fn legacy_revision_uses_short_length() {
    let device = unique_temp_file("send-legacy");

    let output = send(
        &device,
        &["--no-probe", "--revision", "legacy"],
        &["delete", "--stage", "1", "--branch", "2"],
    );
    assert!(output.status.success());

    let written = std::fs::read(&device).expect("link file should be readable");
    assert_eq!(written, b"MBED\x05\x02\x01\x02".to_vec());

    cleanup(&device);
}

#[test]
fn mod_writes_value_at_format_width() {
    let device = unique_temp_file("send-mod");

    let output = send(
        &device,
        &["--no-probe"],
        &[
            "mod",
            "--stage",
            "0",
            "--branch",
            "1",
            "--offset",
            "4",
            "--param-format",
            "H",
            "--value",
            "513",
        ],
    );
    assert!(output.status.success());

    let written = std::fs::read(&device).expect("link file should be readable");
    assert_eq!(written, b"MBED\x07\x05\x00\x00\x01\x04\x01\x02".to_vec());

    cleanup(&device);
}

#[test]
fn out_of_range_value_is_rejected_before_opening() {
    let device = unique_temp_file("send-range");

    let output = send(
        &device,
        &["--no-probe"],
        &[
            "mod",
            "--stage",
            "0",
            "--branch",
            "0",
            "--offset",
            "0",
            "--param-format",
            "B",
            "--value",
            "300",
        ],
    );
    assert_eq!(output.status.code(), Some(60));
    assert!(std::fs::read(&device)
        .expect("link file should be readable")
        .is_empty());

    cleanup(&device);
}

#[test]
fn version_reports_crate_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_filterlink"))
        .arg("version")
        .output()
        .expect("version should run");
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        format!("filterlink {}", env!("CARGO_PKG_VERSION"))
    );
}
