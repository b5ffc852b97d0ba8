use assert_cmd::cargo::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use serde_json::{Value, json};
use std::fs;
use std::net::UdpSocket;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use tempfile::tempdir;

// Minimal valid config; all paths inside the test's temp dir.
fn write_config(dir: &Path, port: u16) -> PathBuf {
    let toml = format!(
        r#"
[control]
port = {port}
poll_timeout_ms = 20

[transmitter]
dpd_port = 50056
rc_port = 9400
samplerate = 8192000
samps = 2048
coef_file = "{dir}/dpd.coef"

[paths]
logs_directory = "{dir}/logs"
plot_directory = "{dir}/plots"
"#,
        dir = dir.display()
    );
    let path = dir.join("dpdce.toml");
    fs::write(&path, toml).unwrap();
    path
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["status"], 0, "tx_gain: 70", "stdout")]
#[case(&["status"], 0, "dpd_coefs=poly", "stdout")]
#[case(&["reset"], 0, "Transmitter reset to defaults", "stdout")]
#[case(&["reset"], 0, "digital_gain: 0.01", "stdout")]
#[case(&[], 2, "Usage", "stderr")]
#[case(&["launch"], 2, "unrecognized subcommand", "stderr")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_config(dir.path(), 50055);

    let mut cmd = Command::cargo_bin("dpdce").unwrap();
    // Always include a valid config to avoid relying on default path
    cmd.arg("--config").arg(&cfg).args(args);

    let assert = cmd.assert().code(exit_code);
    match stream {
        "stdout" => {
            assert.stdout(predicate::str::contains(needle));
        }
        "stderr" => {
            assert.stderr(predicate::str::contains(needle));
        }
        other => panic!("unknown stream: {other}"),
    }
}

#[test]
fn status_json_is_machine_readable() {
    let dir = tempdir().unwrap();
    let cfg = write_config(dir.path(), 50055);

    let out = Command::cargo_bin("dpdce")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("--json")
        .arg("status")
        .output()
        .unwrap();
    assert!(out.status.success());
    let v: Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["rx_gain"], json!(30.0));
    assert_eq!(v["predistorter"]["type"], json!("poly"));
}

#[test]
fn invalid_config_is_explained() {
    let dir = tempdir().unwrap();
    let cfg = write_config(dir.path(), 0);

    Command::cargo_bin("dpdce")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("control.port must be > 0"));
}

#[test]
fn missing_config_is_explained() {
    let dir = tempdir().unwrap();

    Command::cargo_bin("dpdce")
        .unwrap()
        .arg("--config")
        .arg(dir.path().join("nope.toml"))
        .arg("status")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("could not be read"));
}

#[test]
fn log_file_lands_under_logs_directory() {
    let dir = tempdir().unwrap();
    let cfg = write_config(dir.path(), 50055);
    let mut text = fs::read_to_string(&cfg).unwrap();
    text.push_str("\n[logging]\nfile = \"engine.log\"\nlevel = \"debug\"\n");
    fs::write(&cfg, text).unwrap();

    Command::cargo_bin("dpdce")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("reset")
        .assert()
        .success();

    let log = fs::read_to_string(dir.path().join("logs/engine.log")).unwrap();
    assert!(log.contains("transmitter reset to defaults"), "{log}");
}

struct KillOnDrop(Child);

impl Drop for KillOnDrop {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

fn free_port() -> u16 {
    UdpSocket::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn call(client: &UdpSocket, port: u16, id: u64, method: &str) -> Option<Value> {
    let req = json!({"id": id, "method": method}).to_string();
    client.send_to(req.as_bytes(), ("127.0.0.1", port)).ok()?;
    let mut buf = vec![0u8; 64 * 1024];
    let (n, _) = client.recv_from(&mut buf).ok()?;
    serde_json::from_slice(&buf[..n]).ok()
}

#[test]
fn serve_answers_protocol_requests() {
    let dir = tempdir().unwrap();
    let port = free_port();
    let cfg = write_config(dir.path(), port);

    let _child = KillOnDrop(
        Command::new(cargo_bin("dpdce"))
            .arg("--config")
            .arg(&cfg)
            .arg("serve")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .unwrap(),
    );

    let client = UdpSocket::bind("127.0.0.1:0").unwrap();
    client
        .set_read_timeout(Some(Duration::from_millis(200)))
        .unwrap();
    let deadline = Instant::now() + Duration::from_secs(10);
    let settings = loop {
        if let Some(reply) = call(&client, port, 1, "get_settings") {
            break reply;
        }
        assert!(Instant::now() < deadline, "server never answered");
    };
    assert_eq!(settings["id"], json!(1));
    assert_eq!(settings["result"]["tx_gain"], json!(70.0));

    let unknown = call(&client, port, 2, "launch").unwrap();
    assert_eq!(unknown["error"], json!("request not understood"));

    let queued = call(&client, port, 3, "calibrate").unwrap();
    assert_eq!(queued["result"], Value::Null);
    assert!(dir.path().join("plots").is_dir());
}
