mod common;

use common::runcoachd_bin;

#[test]
fn version_prints_package_version() {
    runcoachd_bin()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicates::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn help_lists_every_subcommand() {
    let assert = runcoachd_bin().arg("--help").assert().success();
    let output = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    for command in [
        "supervise",
        "reset-session",
        "stop",
        "check-health",
        "repair-plans",
        "generate-plan",
        "show-plan",
        "webhook-info",
        "setup-webhook",
    ] {
        assert!(output.contains(command), "help is missing '{}'", command);
    }
}

#[test]
fn unknown_command_exits_with_code_2() {
    runcoachd_bin().arg("frobnicate").assert().code(2);
}

#[test]
fn check_health_is_critical_when_no_sentinel_exists() {
    let dir = tempfile::tempdir().unwrap();
    runcoachd_bin()
        .current_dir(dir.path())
        .arg("check-health")
        .assert()
        .code(2)
        .stdout(predicates::str::contains("critical"));
}

#[test]
fn check_health_is_healthy_right_after_a_sentinel_write() {
    let dir = tempfile::tempdir().unwrap();
    let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    std::fs::write(dir.path().join("bot_health.txt"), stamp).unwrap();
    runcoachd_bin()
        .current_dir(dir.path())
        .arg("check-health")
        .assert()
        .code(0)
        .stdout(predicates::str::contains("healthy"));
}

#[test]
fn check_health_warns_on_a_two_minute_old_sentinel() {
    let dir = tempfile::tempdir().unwrap();
    let stamp = (chrono::Local::now() - chrono::Duration::seconds(120))
        .format("%Y-%m-%d %H:%M:%S")
        .to_string();
    std::fs::write(dir.path().join("bot_health.txt"), stamp).unwrap();
    runcoachd_bin()
        .current_dir(dir.path())
        .arg("check-health")
        .assert()
        .code(1)
        .stdout(predicates::str::contains("warning"));
}

#[test]
fn generate_plan_requires_a_numeric_telegram_id() {
    let dir = tempfile::tempdir().unwrap();
    runcoachd_bin()
        .current_dir(dir.path())
        .args(["generate-plan", "not-a-number"])
        .assert()
        .failure();
}
