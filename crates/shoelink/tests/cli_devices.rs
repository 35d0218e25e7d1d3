#![cfg(all(unix, feature = "cli"))]

use std::io::{Read, Write};
use std::os::unix::net::UnixListener;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::thread::{self, JoinHandle};
use std::time::Duration;

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/shoelink-cli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

/// A fake shoe: accepts one connection, writes `greeting`, then returns
/// everything the host sent until it hung up.
fn fake_device(path: &Path, greeting: &'static [u8]) -> JoinHandle<Vec<u8>> {
    let listener = UnixListener::bind(path).expect("fake device should bind");
    thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("host should connect");
        stream
            .set_read_timeout(Some(Duration::from_secs(10)))
            .expect("read timeout should be settable");
        if !greeting.is_empty() {
            stream.write_all(greeting).expect("greeting should be written");
        }
        let mut received = Vec::new();
        let _ = stream.read_to_end(&mut received);
        received
    })
}

fn shoelink(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_shoelink"))
        .env_remove("SHOELINK_DEVICE")
        .env_remove("SHOELINK_LEFT")
        .env_remove("SHOELINK_RIGHT")
        .env_remove("SHOELINK_CONFIG")
        .env_remove("SHOELINK_LOG")
        .args(["--log-level", "error", "--format", "json"])
        .args(args)
        .output()
        .expect("shoelink should run")
}

fn spec(path: &Path) -> String {
    format!("unix:{}", path.display())
}

#[test]
fn send_writes_trimmed_command() {
    let dir = unique_temp_dir("send");
    let sock = dir.join("shoe.sock");
    let device = fake_device(&sock, b"");

    let output = shoelink(&["--device", &spec(&sock), "send", "  mode:midi  "]);

    assert_eq!(output.status.code(), Some(0), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(device.join().expect("device thread"), b"mode:midi");

    let stdout = String::from_utf8_lossy(&output.stdout);
    let report: serde_json::Value = serde_json::from_str(stdout.trim()).expect("json report");
    assert_eq!(report["operation"], "send");
    assert_eq!(report["ok"], true);
    assert_eq!(report["channels"][0]["channel"], "default");

    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn mode_with_missing_right_shoe_is_partial() {
    let dir = unique_temp_dir("mode");
    let left = dir.join("left.sock");
    let right = dir.join("right.sock");
    let device = fake_device(&left, b"");

    let output = shoelink(&["--left", &spec(&left), "--right", &spec(&right), "mode", "hid"]);

    assert_eq!(output.status.code(), Some(2));
    assert_eq!(device.join().expect("device thread"), b"mode:hid");

    let stdout = String::from_utf8_lossy(&output.stdout);
    let report: serde_json::Value = serde_json::from_str(stdout.trim()).expect("json report");
    assert_eq!(report["channels"][0]["channel"], "left");
    assert_eq!(report["channels"][0]["ok"], true);
    assert_eq!(report["channels"][1]["channel"], "right");
    assert_eq!(report["channels"][1]["kind"], "not_connected");

    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn keymap_sends_set_keymap() {
    let dir = unique_temp_dir("keymap");
    let sock = dir.join("shoe.sock");
    let device = fake_device(&sock, b"");

    let output = shoelink(&["--device", &spec(&sock), "keymap", "2", "30"]);

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(device.join().expect("device thread"), b"setKeymap:2:30");
    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn config_file_enables_newline_terminator() {
    let dir = unique_temp_dir("config");
    let sock = dir.join("shoe.sock");
    let config = dir.join("shoelink.json");
    std::fs::write(&config, r#"{"append_newline": true}"#).expect("config should be writable");
    let device = fake_device(&sock, b"");

    let output = shoelink(&[
        "--device",
        &spec(&sock),
        "--config",
        config.to_str().expect("utf-8 path"),
        "send",
        "mode:midi",
    ]);

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(device.join().expect("device thread"), b"mode:midi\n");
    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn monitor_prints_framed_messages() {
    let dir = unique_temp_dir("monitor");
    let sock = dir.join("shoe.sock");
    let device = fake_device(&sock, b"step:1\nst\xe2\x98\x83p\n\n  step:3  \n");

    let output = shoelink(&["--device", &spec(&sock), "monitor", "--count", "3"]);

    assert_eq!(output.status.code(), Some(0), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let _ = device.join();

    let stdout = String::from_utf8_lossy(&output.stdout);
    let texts: Vec<String> = stdout
        .lines()
        .map(|line| {
            let value: serde_json::Value = serde_json::from_str(line).expect("json line");
            assert_eq!(value["channel"], "default");
            value["text"].as_str().expect("text field").to_string()
        })
        .collect();
    assert_eq!(texts, vec!["step:1", "st\u{2603}p", "step:3"]);
    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn status_reports_connected_channel() {
    let dir = unique_temp_dir("status");
    let sock = dir.join("shoe.sock");
    let device = fake_device(&sock, b"");

    let output = shoelink(&["--device", &spec(&sock), "status"]);

    assert_eq!(output.status.code(), Some(0));
    let _ = device.join();
    let stdout = String::from_utf8_lossy(&output.stdout);
    let status: serde_json::Value = serde_json::from_str(stdout.trim()).expect("json status");
    assert_eq!(status[0]["channel"], "default");
    assert_eq!(status[0]["state"], "connected");
    assert_eq!(status[0]["linked"], true);
    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn missing_device_exits_unavailable() {
    let dir = unique_temp_dir("missing");
    let sock = dir.join("nobody-home.sock");

    let output = shoelink(&["--device", &spec(&sock), "send", "mode:midi"]);

    assert_eq!(output.status.code(), Some(69));
    assert!(String::from_utf8_lossy(&output.stderr).contains("error:"));
    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn no_device_is_usage_error() {
    let output = shoelink(&["status"]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn version_prints_package_version() {
    let output = shoelink(&["version"]);
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        format!("shoelink {}", env!("CARGO_PKG_VERSION"))
    );
}
