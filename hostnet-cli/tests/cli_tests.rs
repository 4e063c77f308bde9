use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_help_command() {
    Command::new(env!("CARGO_BIN_EXE_hostnet"))
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Host network device relocation driver"))
        .stdout(predicate::str::contains("Commands:"))
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("attach"))
        .stdout(predicate::str::contains("detach"))
        .stdout(predicate::str::contains("devices"))
        .stdout(predicate::str::contains("health"));
}

#[test]
fn test_version_command() {
    Command::new(env!("CARGO_BIN_EXE_hostnet"))
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("hostnet"));
}

#[test]
fn test_invalid_command() {
    Command::new(env!("CARGO_BIN_EXE_hostnet"))
        .arg("invalid")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

#[test]
fn test_attach_without_netns() {
    Command::new(env!("CARGO_BIN_EXE_hostnet"))
        .args(["attach", "--device", "eth-phys0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
}

#[test]
fn test_detach_without_device() {
    Command::new(env!("CARGO_BIN_EXE_hostnet"))
        .args(["detach", "--netns", "/run/netns/w1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
}

#[test]
fn test_attach_rejects_bad_address() {
    Command::new(env!("CARGO_BIN_EXE_hostnet"))
        .args([
            "attach",
            "--device",
            "eth-phys0",
            "--netns",
            "/run/netns/w1",
            "--address",
            "not-an-address",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn test_attach_rejects_bad_mtu() {
    Command::new(env!("CARGO_BIN_EXE_hostnet"))
        .args([
            "attach",
            "--device",
            "eth-phys0",
            "--netns",
            "/run/netns/w1",
            "--mtu",
            "jumbo",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn test_attach_rejects_bad_device_name() {
    Command::new(env!("CARGO_BIN_EXE_hostnet"))
        .args([
            "attach",
            "--device",
            "this-name-is-far-too-long",
            "--netns",
            "/run/netns/w1",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn test_attach_rejects_bad_hardware_address() {
    Command::new(env!("CARGO_BIN_EXE_hostnet"))
        .args([
            "attach",
            "--device",
            "eth-phys0",
            "--netns",
            "/run/netns/w1",
            "--hardware-address",
            "zz:00",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn test_serve_rejects_zero_interval() {
    Command::new(env!("CARGO_BIN_EXE_hostnet"))
        .args(["serve", "--node-name", "node-a", "--publish-interval", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid configuration"));
}

#[test]
fn test_serve_missing_config_file() {
    Command::new(env!("CARGO_BIN_EXE_hostnet"))
        .args(["serve", "--config", "/nonexistent/hostnet.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config"));
}

#[test]
fn test_health_command() {
    // Either all checks pass or one fails with a diagnostic
    let output = Command::new(env!("CARGO_BIN_EXE_hostnet"))
        .arg("health")
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("Hostnet Health Check"),
        "Expected health check output, got: {stdout}"
    );
}
