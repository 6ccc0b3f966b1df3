//! Integration tests for loading configuration from disk.

use std::io::Write;

use promptgate::config::{Config, ConfigError, KeySource, ProviderKind, StreamMode};

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(content.as_bytes()).expect("write config");
    file
}

#[test]
fn test_load_full_config_from_file() {
    let file = write_config(
        r#"
[server]
listen = "0.0.0.0:8080"
allowed_origins = ["https://app.example.com/"]
max_upload_bytes = 2048
stream_mode = "passthrough"

[routing]
default_provider = "local"
default_model = "llama3"

[[providers]]
name = "local"
kind = "generic"
url = "http://localhost:11434/v1"
models = ["llama3"]

[[providers]]
name = "deepseek"
kind = "deepseek"
api_key = "sk-literal"
default_model = "deepseek-chat"
headers = { "X-Title" = "promptgate" }

[logging]
level = "debug"
"#,
    );

    let (config, key_sources) = Config::from_file(file.path()).expect("config loads");

    assert_eq!(config.server.listen, "0.0.0.0:8080");
    assert_eq!(config.server.max_upload_bytes, 2048);
    assert_eq!(config.server.stream_mode, StreamMode::Passthrough);
    assert!(config.server.origin_allowed("https://app.example.com"));
    assert!(!config.server.origin_allowed("https://other.example.com"));
    assert_eq!(config.logging.level, "debug");

    let deepseek = config.provider("deepseek").unwrap();
    assert_eq!(deepseek.kind, ProviderKind::Deepseek);
    assert_eq!(deepseek.url, "https://api.deepseek.com/v1");
    assert_eq!(deepseek.headers["X-Title"], "promptgate");

    assert_eq!(
        key_sources,
        vec![
            ("local".to_string(), KeySource::None),
            ("deepseek".to_string(), KeySource::Literal),
        ]
    );
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Config::from_file(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}

#[test]
fn test_key_never_appears_in_debug_output() {
    let file = write_config(
        r#"
[routing]
default_provider = "openai"
default_model = "gpt-4o-mini"

[[providers]]
name = "openai"
kind = "openai"
api_key = "sk-do-not-print"
"#,
    );

    let (config, _) = Config::from_file(file.path()).unwrap();
    let debug = format!("{:?}", config);
    assert!(!debug.contains("sk-do-not-print"));
}

#[test]
fn test_key_required_for_hosted_provider() {
    let err = Config::parse_str_with(
        r#"
[routing]
default_provider = "gemini"
default_model = "gemini-1.5-flash"

[[providers]]
name = "gemini"
kind = "gemini"
"#,
        |_| None,
    )
    .unwrap_err();
    match err {
        ConfigError::MissingKey { provider, var } => {
            assert_eq!(provider, "gemini");
            assert_eq!(var, "GEMINI_API_KEY");
        }
        other => panic!("expected MissingKey, got {:?}", other),
    }
}
