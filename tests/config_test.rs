//! Configuration loading tests

use std::io::Write;
use std::path::Path;

use rentwatch::config::Config;
use rentwatch::notifications::build_channel;
use serial_test::serial;
use tempfile::NamedTempFile;

const ENV_KEYS: &[&str] = &[
    "RENTWATCH_SQLITE_PATH",
    "RENTWATCH_PARTITION_PACE_SECS",
    "RENTWATCH_JOURNAL_PATH",
    "RENTWATCH_FEED_URL",
    "RENTWATCH_REQUEST_TIMEOUT",
    "RENTWATCH_HOST",
    "RENTWATCH_PORT",
    "RENTWATCH_LOG_LEVEL",
    "RENTWATCH_LOG_FORMAT",
    "RENTWATCH_DRY_RUN",
    "RENTWATCH_TELEGRAM_CHAT_ID",
    "RENTWATCH_TELEGRAM_TOKEN",
];

fn clear_env() {
    for key in ENV_KEYS {
        std::env::remove_var(key);
    }
}

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

const SAMPLE: &str = r#"
[feed]
page_size = 50
page_delay_secs = 2

[dispatch]
batch_size = 5
batch_pause_secs = 20
currency = "£"

[sweep]
partition_pace_secs = 15

[schedule]
times = ["09:30", "18:00"]

[[partitions]]
key = "donegal"
location_id = "35"
routing_key = "3"

[[partitions]]
key = "sligo"
location_id = "36"
active = false

[[partitions]]
key = "mayo"
location_id = "33"
routing_key = "5"
"#;

#[test]
#[serial]
fn test_load_from_file() {
    clear_env();
    let file = write_config(SAMPLE);

    let config = Config::load(Some(file.path())).unwrap();

    assert_eq!(config.feed.page_size, 50);
    assert_eq!(config.feed.max_pages, 50);
    assert_eq!(config.dispatch.batch_size, 5);
    assert_eq!(config.dispatch.currency, "£");
    assert_eq!(config.dispatch.group_pause_secs, 30);
    assert_eq!(config.sweep.pace().as_secs(), 15);
    assert_eq!(config.schedule.times, vec!["09:30", "18:00"]);

    let partitions = config.partitions();
    let keys: Vec<&str> = partitions.iter().map(|p| p.key.as_str()).collect();
    assert_eq!(keys, vec!["donegal", "sligo", "mayo"]);
    assert!(partitions[0].active);
    assert!(!partitions[1].active);
    assert_eq!(partitions[2].routing_key.as_str(), "5");
}

#[test]
#[serial]
fn test_environment_overrides_file() {
    clear_env();
    let file = write_config(SAMPLE);
    std::env::set_var("RENTWATCH_SQLITE_PATH", "/tmp/override.db");
    std::env::set_var("RENTWATCH_PARTITION_PACE_SECS", "0");
    std::env::set_var("RENTWATCH_PORT", "9191");
    std::env::set_var("RENTWATCH_JOURNAL_PATH", "");
    std::env::set_var("RENTWATCH_DRY_RUN", "true");

    let config = Config::load(Some(file.path())).unwrap();
    clear_env();

    assert_eq!(config.storage.sqlite_path, Path::new("/tmp/override.db"));
    assert!(config.sweep.pace().is_zero());
    assert_eq!(config.server.port, 9191);
    assert!(config.sweep.journal_path.is_none());
    assert!(config.notifier.dry_run);
    assert_eq!(config.dispatch.batch_size, 5);
}

#[test]
#[serial]
fn test_unparseable_env_value_is_ignored() {
    clear_env();
    std::env::set_var("RENTWATCH_PORT", "not-a-port");

    let config = Config::from_env().unwrap();
    clear_env();

    assert_eq!(config.server.port, 8080);
}

#[test]
#[serial]
fn test_telegram_needs_token_and_chat() {
    clear_env();
    std::env::set_var("RENTWATCH_TELEGRAM_TOKEN", "123:abc");

    let config = Config::from_env().unwrap();
    assert!(config.notifier.telegram.is_none());
    assert_eq!(build_channel(&config.notifier).unwrap().name(), "log");

    std::env::set_var("RENTWATCH_TELEGRAM_CHAT_ID", "-100987");
    let config = Config::from_env().unwrap();
    clear_env();

    let telegram = config.notifier.telegram.as_ref().unwrap();
    assert_eq!(telegram.chat_id, "-100987");
    assert_eq!(telegram.bot_token, "123:abc");
    assert_eq!(build_channel(&config.notifier).unwrap().name(), "telegram");
}

#[test]
#[serial]
fn test_dry_run_wins_over_telegram() {
    clear_env();
    std::env::set_var("RENTWATCH_TELEGRAM_TOKEN", "123:abc");
    std::env::set_var("RENTWATCH_TELEGRAM_CHAT_ID", "-100987");
    std::env::set_var("RENTWATCH_DRY_RUN", "true");

    let config = Config::from_env().unwrap();
    clear_env();

    assert!(config.notifier.dry_run);
    assert!(config.notifier.telegram.is_some());
    assert_eq!(build_channel(&config.notifier).unwrap().name(), "log");
}

#[test]
#[serial]
fn test_invalid_files_are_rejected() {
    clear_env();

    let broken = write_config("[feed\npage_size = 1");
    assert!(Config::load(Some(broken.path())).is_err());

    let no_location = write_config(
        r#"
[[partitions]]
key = "donegal"
location_id = ""
"#,
    );
    let err = Config::load(Some(no_location.path())).unwrap_err();
    assert!(err.to_string().contains("location_id"));

    let bad_time = write_config(
        r#"
[schedule]
times = ["25:00"]
"#,
    );
    assert!(Config::load(Some(bad_time.path())).is_err());

    assert!(Config::load(Some(Path::new("/nonexistent/rentwatch.toml"))).is_err());
}

#[test]
#[serial]
fn test_no_file_uses_defaults() {
    clear_env();
    let config = Config::load(None).unwrap();

    assert_eq!(config.partitions().len(), 1);
    assert_eq!(config.schedule.times.len(), 5);
    assert_eq!(config.dispatch.policy().batch_size, 10);
}

#[test]
#[serial]
fn test_lock_file_sits_next_to_database() {
    clear_env();
    std::env::set_var("RENTWATCH_SQLITE_PATH", "/var/lib/rentwatch/offers.db");

    let mut config = Config::from_env().unwrap();
    clear_env();

    assert_eq!(
        config.storage.lock_path().as_deref(),
        Some(Path::new("/var/lib/rentwatch/offers.db.lock"))
    );

    config.storage.in_memory = true;
    assert!(config.storage.lock_path().is_none());
}
