use lc_domain::config::{ConfigSeverity, EngineConfig, SsoFailurePolicy};

#[test]
fn empty_document_uses_defaults() {
    let config = EngineConfig::from_toml_str("").unwrap();
    assert_eq!(config.default_account, "default");
    assert_eq!(config.connection.connect_timeout_ms, 10_000);
    assert_eq!(config.replay.max_age_secs, 1800);
    assert!(config.replay.state_dir.is_none());
    assert_eq!(config.sso.failure_policy, SsoFailurePolicy::Degrade);
}

#[test]
fn default_config_validates_clean() {
    assert!(EngineConfig::default().validate().is_empty());
}

#[test]
fn sections_parse() {
    let toml_str = r#"
app_id = "shop-ios"
default_account = "acme"

[connection]
server_url = "wss://chat.example.com/v1/chat/ws"

[connection.reconnect]
max_attempts = 5

[replay]
state_dir = "/tmp/lc-replay"
max_messages = 50

[sso]
failure_policy = "block"
"#;
    let config = EngineConfig::from_toml_str(toml_str).unwrap();
    assert_eq!(config.app_id, "shop-ios");
    assert_eq!(config.default_account, "acme");
    assert_eq!(config.connection.reconnect.max_attempts, 5);
    assert_eq!(config.connection.reconnect.initial_delay_ms, 1_000);
    assert_eq!(config.replay.max_messages, 50);
    assert_eq!(config.sso.failure_policy, SsoFailurePolicy::Block);
}

#[test]
fn unknown_policy_is_a_config_error() {
    let err = EngineConfig::from_toml_str("[sso]\nfailure_policy = \"maybe\"\n").unwrap_err();
    assert!(err.to_string().starts_with("config:"));
}

#[test]
fn validate_flags_bad_url_and_empty_account() {
    let mut config = EngineConfig::default();
    config.connection.server_url = "http://chat.example.com".into();
    config.default_account = " ".into();

    let issues = config.validate();
    let fields: Vec<&str> = issues.iter().map(|i| i.field.as_str()).collect();
    assert!(fields.contains(&"connection.server_url"));
    assert!(fields.contains(&"default_account"));
    assert!(issues.iter().all(|i| i.severity == ConfigSeverity::Error));
}

#[test]
fn plain_ws_to_remote_host_is_a_warning() {
    let mut config = EngineConfig::default();
    config.connection.server_url = "ws://chat.example.com/ws".into();
    let issues = config.validate();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].severity, ConfigSeverity::Warning);
    assert!(issues[0].to_string().starts_with("[WARN] connection.server_url"));
}
