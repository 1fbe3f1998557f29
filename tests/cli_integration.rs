#![cfg(unix)]

mod common;

use std::{
    fs,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};

use assert_cmd::Command;
use predicates::prelude::*;

use common::{scratch_root, FakeTools};
use encmount::journal::{read_entries, JournalEvent};

struct CliFixture {
    _temp_dir: tempfile::TempDir,
    root: PathBuf,
    tools: FakeTools,
    config_path: PathBuf,
    journal_path: PathBuf,
}

impl CliFixture {
    fn new() -> Self {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = scratch_root(&temp_dir);
        let tools = FakeTools::install(&root);
        let config_path = root.join(".encmount.toml");
        let journal_path = root.join("state/journal.jsonl");
        let binaries = tools.binaries();
        fs::write(
            &config_path,
            format!(
                r#"version = 1

[tools]
encfs = "{}"
encfsctl = "{}"
fusermount = "{}"
timeout_seconds = 10

[mount]
ready_timeout_millis = 100
mount_table = "{}"

[journal]
path = "{}"
"#,
                binaries.encfs,
                binaries.encfsctl,
                binaries.fusermount,
                tools.table.display(),
                journal_path.display(),
            ),
        )
        .unwrap();
        fs::set_permissions(&config_path, fs::Permissions::from_mode(0o600)).unwrap();

        Self {
            _temp_dir: temp_dir,
            root,
            tools,
            config_path,
            journal_path,
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(assert_cmd::cargo::cargo_bin!("encmount"));
        command
            .current_dir(&self.root)
            .env_remove("ENCMOUNT_CONFIG")
            .env_remove("ENCMOUNT_LOG")
            .arg("--config")
            .arg(&self.config_path);
        command
    }

    fn events(&self) -> Vec<JournalEvent> {
        read_entries(&self.journal_path)
            .unwrap()
            .into_iter()
            .map(|entry| entry.event)
            .collect()
    }

    /// Seeds a store the fake encfsctl accepts with `password`.
    fn seed_store(&self, name: &str, password: &str) -> PathBuf {
        let store = self.root.join(name);
        fs::create_dir_all(&store).unwrap();
        fs::write(store.join(".encfs6.xml"), password).unwrap();
        store
    }
}

fn path_arg(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn cli_explain_prints_recovery_steps() {
    Command::new(assert_cmd::cargo::cargo_bin!("encmount"))
        .args(["explain", "e201"])
        .assert()
        .success()
        .stdout(predicate::str::contains("E201 foreign mount"))
        .stdout(predicate::str::contains("[signature]"));
}

#[test]
fn cli_explain_unknown_code_lists_known_codes() {
    Command::new(assert_cmd::cargo::cargo_bin!("encmount"))
        .args(["explain", "E777"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error[E100]"))
        .stderr(predicate::str::contains("E201"));
}

#[test]
fn cli_is_valid_accepts_store_and_rejects_plain_directory() {
    let fixture = CliFixture::new();
    let store = fixture.seed_store("e", "PASSWORD");
    let plain = fixture.root.join("plain");
    fs::create_dir_all(&plain).unwrap();

    fixture
        .command()
        .args(["is-valid", path_arg(&store)])
        .assert()
        .success()
        .stdout(predicate::str::contains("valid encfs store"));

    fixture
        .command()
        .args(["is-valid", path_arg(&plain)])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error[E302]"));
}

#[test]
fn cli_check_password_reads_stdin_and_journals_result() {
    let fixture = CliFixture::new();
    let store = fixture.seed_store("e   ", "PASSWORD");

    fixture
        .command()
        .args(["check-password", path_arg(&store), "--stdin"])
        .write_stdin("PASSWORD\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("password accepted"));

    fixture
        .command()
        .args(["check-password", path_arg(&store), "--stdin"])
        .write_stdin("wrong\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error[E300]"));

    let args = fixture.tools.args_log("encfsctl").unwrap();
    assert!(!args.contains("PASSWORD"));
    assert!(!args.contains("wrong"));

    let events = fixture.events();
    assert_eq!(
        events,
        vec![
            JournalEvent::PasswordChecked {
                store: store.clone(),
                accepted: true,
            },
            JournalEvent::PasswordChecked {
                store,
                accepted: false,
            },
        ]
    );
    let mode = fs::metadata(&fixture.journal_path).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode, 0o600);
}

#[test]
fn cli_passwd_rotates_with_two_stdin_lines() {
    let fixture = CliFixture::new();
    let store = fixture.seed_store("e", "old pass");

    fixture
        .command()
        .args(["passwd", path_arg(&store), "--stdin"])
        .write_stdin("old pass\nnew;pass\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("password changed"));

    assert_eq!(
        fs::read_to_string(store.join(".encfs6.xml")).unwrap(),
        "new;pass"
    );
    assert_eq!(
        fixture.events(),
        vec![JournalEvent::PasswordChanged { store }]
    );
}

#[test]
fn cli_passwd_requires_both_lines() {
    let fixture = CliFixture::new();
    let store = fixture.seed_store("e", "old");

    fixture
        .command()
        .args(["passwd", path_arg(&store), "--stdin"])
        .write_stdin("old\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error[E100]"))
        .stderr(predicate::str::contains("credential 2 of 2"));
    assert!(fixture.tools.args_log("encfsctl").is_none());
}

#[test]
fn cli_unmount_plain_directory_is_refused() {
    let fixture = CliFixture::new();
    let plain = fixture.root.join("d");
    fs::create_dir_all(&plain).unwrap();

    fixture
        .command()
        .args(["unmount", path_arg(&plain)])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error[E200]"));

    assert!(fixture.tools.args_log("fusermount").is_none());
    assert_eq!(
        fixture.events(),
        vec![JournalEvent::UnmountRefused {
            mount: plain,
            code: "E200".to_owned(),
        }]
    );
}

#[cfg(target_os = "linux")]
#[test]
fn cli_foreign_mount_is_reported_and_not_unmounted() {
    if !Path::new("/proc/self").exists() {
        return;
    }
    let fixture = CliFixture::new();

    fixture
        .command()
        .args(["status", "/proc"])
        .assert()
        .success()
        .stdout(predicate::str::diff("mounted-foreign\n"));

    fixture
        .command()
        .args(["umount", "/proc"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error[E201]"));
    assert!(fixture.tools.args_log("fusermount").is_none());
}

#[test]
fn cli_status_reports_unmounted_directory() {
    let fixture = CliFixture::new();
    let plain = fixture.root.join("d");
    fs::create_dir_all(&plain).unwrap();

    fixture
        .command()
        .args(["status", path_arg(&plain)])
        .assert()
        .success()
        .stdout(predicate::str::diff("unmounted\n"));

    let output = fixture
        .command()
        .args(["status", path_arg(&plain), "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["state"], "unmounted");
    assert_eq!(value["path"], path_arg(&plain));
}

#[test]
fn cli_prepare_creates_missing_and_rejects_non_empty() {
    let fixture = CliFixture::new();
    let fresh = fixture.root.join("a/b/c");

    fixture
        .command()
        .args(["prepare", path_arg(&fresh)])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("created"));
    assert!(fresh.is_dir());

    fixture
        .command()
        .args(["prepare", path_arg(&fresh)])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("ready"));

    fs::write(fresh.join("file"), "x").unwrap();
    fixture
        .command()
        .args(["prepare", path_arg(&fresh)])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error[E101]"));
}

#[test]
fn cli_create_onto_regular_file_fails_before_encfs() {
    let fixture = CliFixture::new();
    let store = fixture.root.join("e");
    let mount = fixture.root.join("d");
    fs::write(&mount, "not a directory").unwrap();

    fixture
        .command()
        .args(["create", path_arg(&store), path_arg(&mount), "--stdin"])
        .write_stdin("PASSWORD\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error[E101]"));

    assert!(fixture.tools.args_log("encfs").is_none());
    assert_eq!(
        fixture.events(),
        vec![JournalEvent::OperationFailed {
            operation: "create".to_owned(),
            code: "E101".to_owned(),
        }]
    );
}

#[test]
fn cli_mount_missing_store_reports_store_missing() {
    let fixture = CliFixture::new();

    fixture
        .command()
        .args([
            "mount",
            path_arg(&fixture.root.join("missing")),
            path_arg(&fixture.root.join("d")),
            "--stdin",
        ])
        .write_stdin("PASSWORD\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error[E102]"));
    assert!(fixture.tools.args_log("encfs").is_none());
}

#[test]
fn cli_mount_without_table_entry_fails_verification() {
    let fixture = CliFixture::new();
    let store = fixture.seed_store("e", "PASSWORD");
    let mount = fixture.root.join("d");

    fixture
        .command()
        .args(["mount", path_arg(&store), path_arg(&mount), "--stdin"])
        .write_stdin("PASSWORD\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error[E202]"));

    assert!(fixture.tools.args_log("encfs").is_some());
    assert_eq!(
        fixture.events(),
        vec![JournalEvent::OperationFailed {
            operation: "mount".to_owned(),
            code: "E202".to_owned(),
        }]
    );
}

#[test]
fn cli_json_error_format_emits_single_object() {
    let fixture = CliFixture::new();
    let plain = fixture.root.join("d");
    fs::create_dir_all(&plain).unwrap();

    let output = fixture
        .command()
        .args(["--error-format", "json", "unmount", path_arg(&plain)])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8(output.stderr).unwrap();
    let value: serde_json::Value = serde_json::from_str(stderr.trim()).unwrap();
    assert_eq!(value["error"]["code"], "E200");
    assert_eq!(value["error"]["explain"], "encmount explain E200");
}

#[test]
fn cli_rejects_world_writable_config() {
    let fixture = CliFixture::new();
    fs::set_permissions(&fixture.config_path, fs::Permissions::from_mode(0o666)).unwrap();

    fixture
        .command()
        .args(["status", path_arg(&fixture.root)])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error[E100]"))
        .stderr(predicate::str::contains("group/world writable"));
}

#[test]
fn cli_no_config_ignores_discovered_file() {
    let fixture = CliFixture::new();
    fs::write(&fixture.config_path, "version = 99\n").unwrap();
    fs::set_permissions(&fixture.config_path, fs::Permissions::from_mode(0o600)).unwrap();
    let plain = fixture.root.join("d");
    fs::create_dir_all(&plain).unwrap();

    Command::new(assert_cmd::cargo::cargo_bin!("encmount"))
        .current_dir(&fixture.root)
        .env_remove("ENCMOUNT_CONFIG")
        .args(["status", path_arg(&plain)])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported config version 99"));

    Command::new(assert_cmd::cargo::cargo_bin!("encmount"))
        .current_dir(&fixture.root)
        .env_remove("ENCMOUNT_CONFIG")
        .args(["--no-config", "status", path_arg(&plain)])
        .assert()
        .success()
        .stdout(predicate::str::diff("unmounted\n"));
}

#[test]
fn cli_unopenable_journal_does_not_block_commands() {
    let fixture = CliFixture::new();
    let blocker = fixture.root.join("blocker");
    fs::write(&blocker, "regular file").unwrap();
    let config = fs::read_to_string(&fixture.config_path).unwrap().replace(
        &fixture.journal_path.display().to_string(),
        &blocker.join("journal.jsonl").display().to_string(),
    );
    fs::write(&fixture.config_path, config).unwrap();
    let store = fixture.seed_store("e", "PASSWORD");

    fixture
        .command()
        .args(["check-password", path_arg(&store), "--stdin"])
        .write_stdin("PASSWORD\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("password accepted"))
        .stderr(predicate::str::contains(
            "failed to open operation journal",
        ));
    assert!(fixture.tools.args_log("encfsctl").is_some());
}
