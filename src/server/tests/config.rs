use std::time::Duration;

use crate::error::GpsNtpError;
use crate::server::config::{ReplyFields, ServerConfig};

#[test]
fn test_defaults() {
    let config = ServerConfig::default();
    assert_eq!(config.bind_addr.to_string(), "0.0.0.0:123");
    assert_eq!(config.recv_buf_size, 1024);
    assert_eq!(config.read_timeout, Duration::from_secs(1));
    assert_eq!(config.max_edge_age, Duration::from_secs(2));
    assert_eq!(config.sentence_tag, "$GPZDA");
    assert!(config.validate().is_ok());
}

#[test]
fn test_reply_field_defaults() {
    let reply = ReplyFields::default();
    assert_eq!(reply.leap_indicator, 0);
    assert_eq!(reply.status, 28);
    assert_eq!(reply.packet_type, 1);
    assert_eq!(reply.precision, 236);
    assert_eq!(reply.estimated_error, 648);
    assert_eq!(reply.estimated_drift_rate, 440);
    assert_eq!(reply.reference_clock_id, 0x4750_5300);
}

#[test]
fn test_builder() {
    let config = ServerConfig::builder()
        .bind_addr("127.0.0.1:1123".parse().unwrap())
        .recv_buf_size(512)
        .read_timeout(Duration::from_millis(250))
        .max_edge_age(Duration::from_millis(1500))
        .sentence_tag("$GNZDA")
        .build();

    assert_eq!(config.bind_addr.port(), 1123);
    assert_eq!(config.recv_buf_size, 512);
    assert_eq!(config.read_timeout, Duration::from_millis(250));
    assert_eq!(config.max_edge_age, Duration::from_millis(1500));
    assert_eq!(config.sentence_tag, "$GNZDA");
    assert!(config.validate().is_ok());
}

#[test]
fn test_validate_rejects_bad_tag() {
    let config = ServerConfig::builder().sentence_tag("$GPZD").build();
    let err = config.validate().unwrap_err();
    assert!(matches!(
        err,
        GpsNtpError::InvalidConfig { ref name, .. } if name == "sentence_tag"
    ));
}

#[test]
fn test_validate_rejects_zero_values() {
    let cases = [
        (ServerConfig::builder().recv_buf_size(0).build(), "recv_buf_size"),
        (
            ServerConfig::builder().read_timeout(Duration::ZERO).build(),
            "read_timeout",
        ),
        (
            ServerConfig::builder().max_edge_age(Duration::ZERO).build(),
            "max_edge_age",
        ),
    ];
    for (config, expected) in cases {
        match config.validate() {
            Err(GpsNtpError::InvalidConfig { name, .. }) => assert_eq!(name, expected),
            other => panic!("expected InvalidConfig for {expected}, got {other:?}"),
        }
    }
}
