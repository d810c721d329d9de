use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn docchat_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_docchat"))
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();
    fs::write(
        files_dir.join("policy.txt"),
        "Refund policy.\n\nRefunds are accepted within 30 days of purchase.",
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/docchat.sqlite"

[storage]
data_dir = "{root}/data"

[embedding]
provider = "disabled"

[server]
bind = "127.0.0.1:0"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("docchat.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_docchat(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = docchat_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path)
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run docchat binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_init_is_idempotent() {
    let (tmp, config) = setup_test_env();

    let (stdout, stderr, ok) = run_docchat(&config, &["init"]);
    assert!(ok, "init failed: {}", stderr);
    assert!(stdout.contains("Database initialized"));
    assert!(tmp.path().join("data/docchat.sqlite").exists());

    let (_, stderr, ok) = run_docchat(&config, &["init"]);
    assert!(ok, "second init failed: {}", stderr);
}

#[test]
fn test_user_lifecycle() {
    let (_tmp, config) = setup_test_env();
    run_docchat(&config, &["init"]);

    let (stdout, stderr, ok) = run_docchat(
        &config,
        &["user", "add", "ana@example.com", "--password", "secret1"],
    );
    assert!(ok, "user add failed: {}", stderr);
    assert!(stdout.contains("Created user ana@example.com"));

    let (_, stderr, ok) = run_docchat(
        &config,
        &["user", "add", "ana@example.com", "--password", "secret1"],
    );
    assert!(!ok);
    assert!(stderr.contains("already exists"));

    let (stdout, _, ok) = run_docchat(
        &config,
        &["user", "check", "ana@example.com", "--password", "secret1"],
    );
    assert!(ok);
    assert_eq!(stdout.trim(), "ok");

    let (_, _, ok) = run_docchat(
        &config,
        &["user", "check", "ana@example.com", "--password", "wrong!"],
    );
    assert!(!ok);

    let (_, _, ok) = run_docchat(&config, &["user", "remove", "ana@example.com"]);
    assert!(ok);
    let (_, _, ok) = run_docchat(&config, &["user", "remove", "ana@example.com"]);
    assert!(!ok);
}

#[test]
fn test_short_password_is_rejected() {
    let (_tmp, config) = setup_test_env();
    run_docchat(&config, &["init"]);

    let (_, stderr, ok) = run_docchat(
        &config,
        &["user", "add", "bo@example.com", "--password", "abc"],
    );
    assert!(!ok);
    assert!(stderr.contains("at least 6 characters"));
}

#[test]
fn test_upload_requires_embeddings() {
    let (tmp, config) = setup_test_env();
    run_docchat(&config, &["init"]);

    let file = tmp.path().join("files/policy.txt");
    let (_, stderr, ok) = run_docchat(
        &config,
        &["upload", file.to_str().unwrap(), "--user", "ana@example.com"],
    );
    assert!(!ok);
    assert!(stderr.contains("disabled"));

    let (stdout, _, ok) = run_docchat(&config, &["documents", "--user", "ana@example.com"]);
    assert!(ok);
    assert!(stdout.contains("No documents."));
}

#[test]
fn test_clear_and_export_on_empty_user() {
    let (_tmp, config) = setup_test_env();
    run_docchat(&config, &["init"]);

    let (stdout, _, ok) = run_docchat(&config, &["clear", "--user", "ana@example.com"]);
    assert!(ok);
    assert!(stdout.contains("Removed 0 documents"));

    let (_, stderr, ok) = run_docchat(&config, &["export", "General", "--user", "ana@example.com"]);
    assert!(!ok);
    assert!(stderr.contains("No history"));
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, ok) = run_docchat(&tmp.path().join("nope.toml"), &["init"]);
    assert!(!ok);
    assert!(stderr.contains("Failed to read config file"));
}
