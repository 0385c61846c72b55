use std::env;
use std::sync::Arc;
use std::time::Duration;

use serial_test::serial;
use token_bucket::{BucketConfig, MockClock};

const VARS: &[&str] = &[
    "TEST_BUCKET_CAPACITY",
    "TEST_BUCKET_QUANTUM",
    "TEST_BUCKET_FILL_INTERVAL_MS",
    "TEST_BUCKET_PROHIBIT_OVERFLOW",
];

fn clear_env() {
    for var in VARS {
        env::remove_var(var);
    }
}

#[test]
#[serial]
fn from_env_uses_defaults_when_unset() {
    clear_env();
    let cfg = BucketConfig::from_env("TEST_BUCKET");
    assert_eq!(cfg, BucketConfig::default());
    assert!(cfg.validate().is_ok());
}

#[test]
#[serial]
fn from_env_reads_prefixed_values() {
    clear_env();
    env::set_var("TEST_BUCKET_CAPACITY", "100");
    env::set_var("TEST_BUCKET_QUANTUM", "5");
    env::set_var("TEST_BUCKET_FILL_INTERVAL_MS", "250");
    env::set_var("TEST_BUCKET_PROHIBIT_OVERFLOW", "TRUE");

    let cfg = BucketConfig::from_env("TEST_BUCKET");
    assert_eq!(cfg.capacity, 100);
    assert_eq!(cfg.quantum, 5);
    assert_eq!(cfg.fill_interval(), Duration::from_millis(250));
    assert!(cfg.prohibit_overflow);
    clear_env();
}

#[test]
#[serial]
fn from_env_ignores_unparsable_values() {
    clear_env();
    env::set_var("TEST_BUCKET_CAPACITY", "lots");
    env::set_var("TEST_BUCKET_PROHIBIT_OVERFLOW", "yes");

    let cfg = BucketConfig::from_env("TEST_BUCKET");
    assert_eq!(cfg.capacity, BucketConfig::default().capacity);
    assert!(!cfg.prohibit_overflow);
    clear_env();
}

#[test]
fn from_toml_parses_and_defaults_overflow_flag() {
    let cfg = BucketConfig::from_toml_str(
        r#"
        capacity = 20
        quantum = 2
        fill_interval_ms = 100
        "#,
    )
    .unwrap();
    assert_eq!(
        cfg,
        BucketConfig {
            capacity: 20,
            quantum: 2,
            fill_interval_ms: 100,
            prohibit_overflow: false,
        }
    );
}

#[test]
fn from_toml_rejects_missing_fields() {
    assert!(BucketConfig::from_toml_str("capacity = 1").is_err());
}

#[test]
fn validate_rejects_non_positive_values() {
    let valid = BucketConfig::default();
    for cfg in [
        BucketConfig {
            capacity: 0,
            ..valid.clone()
        },
        BucketConfig {
            quantum: -1,
            ..valid.clone()
        },
        BucketConfig {
            fill_interval_ms: 0,
            ..valid.clone()
        },
    ] {
        assert!(cfg.validate().is_err(), "{cfg:?}");
        assert!(cfg.build().is_err(), "{cfg:?}");
    }
}

#[test]
fn build_with_clock_applies_settings() {
    let clock = Arc::new(MockClock::new());
    let cfg = BucketConfig {
        capacity: 4,
        quantum: 2,
        fill_interval_ms: 500,
        prohibit_overflow: true,
    };
    let bucket = cfg.build_with_clock(clock.clone()).unwrap();
    assert_eq!(bucket.capacity(), 4);
    assert_eq!(bucket.fill_interval(), Duration::from_millis(500));
    assert!(bucket.prohibits_overflow());

    assert_eq!(bucket.take_available(4), 4);
    clock.advance(Duration::from_millis(500));
    assert_eq!(bucket.available(), 2);
}
