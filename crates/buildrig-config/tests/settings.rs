use buildrig_config::*;
use serial_test::serial;

fn clear_env() {
    for key in [
        "BUILDRIG_HARNESS__DEBUG",
        "BUILDRIG_POLL__BACKOFF_MS",
        "BUILDRIG_POLL__MAX_ATTEMPTS",
        "KEEP_ON_FAIL",
    ] {
        std::env::remove_var(key);
    }
}

fn empty_file_manager(dir: &tempfile::TempDir) -> SettingsManager {
    let path = dir.path().join("buildrig.toml");
    std::fs::write(&path, "").unwrap();
    SettingsManager::with_path(path)
}

#[test]
fn test_settings_default() {
    let settings = Settings::default();
    assert!(!settings.harness.debug);
    assert!(settings.harness.mirror_stderr);
    assert_eq!(settings.harness.log_prefix, "EP: ");
    assert_eq!(settings.poll.backoff_ms, 100);
    assert_eq!(settings.poll.max_attempts, None);
}

#[test]
#[serial]
fn test_load_from_file() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("buildrig.toml");
    std::fs::write(
        &path,
        "[harness]\ndebug = true\nlog_prefix = \"SRV: \"\n\n[poll]\nbackoff_ms = 400\n",
    )
    .unwrap();

    let settings = SettingsManager::with_path(&path).load().unwrap();
    assert!(settings.harness.debug);
    assert_eq!(settings.harness.log_prefix, "SRV: ");
    assert_eq!(settings.poll.backoff_ms, 400);
    // untouched keys keep their defaults
    assert_eq!(settings.harness.reap_timeout_ms, 2_000);
}

#[test]
#[serial]
fn test_explicit_file_must_exist() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let result = SettingsManager::with_path(dir.path().join("nope.toml")).load();
    assert!(matches!(result, Err(ConfigError::Load(_))));
}

#[test]
#[serial]
fn test_env_overrides_file() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    std::env::set_var("BUILDRIG_HARNESS__DEBUG", "true");
    std::env::set_var("BUILDRIG_POLL__MAX_ATTEMPTS", "5");

    let settings = empty_file_manager(&dir).load().unwrap();
    clear_env();

    assert!(settings.harness.debug);
    assert_eq!(settings.poll.max_attempts, Some(5));
}

#[test]
#[serial]
fn test_keep_on_fail_env() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    std::env::set_var("KEEP_ON_FAIL", "true");

    let settings = empty_file_manager(&dir).load().unwrap();
    clear_env();

    assert!(settings.harness.keep_on_fail);
}

#[test]
#[serial]
fn test_validation_rejects_zero_backoff() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    std::env::set_var("BUILDRIG_POLL__BACKOFF_MS", "0");

    let result = empty_file_manager(&dir).load();
    clear_env();

    assert!(matches!(result, Err(ConfigError::Validation(_))));
}

#[test]
fn test_save_then_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("buildrig.toml");
    let manager = SettingsManager::with_path(&path);

    let mut settings = Settings::default();
    settings.poll.timeout_ms = Some(5_000);
    manager.save(&settings, &path).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("timeout_ms = 5000"));
}
