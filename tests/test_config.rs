use std::io::Write;
use std::path::Path;
use std::time::Duration;

use leadflow::cli::LeadflowConfig;
use leadflow::cli::config::env_secret;
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn load_valid_config_all_fields() {
    let file = write_config(
        r#"
host: 127.0.0.1
port: 8080
data_dir: /var/lib/leadflow
database_url: sqlite://leads.db?mode=rwc
max_body: 2097152
workflow_timeout_s: 45
llm:
  base_url: http://localhost:11434/v1
  model: llama3.1
  assistant_model: llama3.1:70b
  temperature_override: 0.2
  timeout_s: 30
search:
  base_url: http://search.internal
  max_results: 3
scrape:
  base_url: http://scrape.internal
"#,
    );

    let config = LeadflowConfig::load(Some(file.path())).unwrap();
    assert_eq!(config.host.as_deref(), Some("127.0.0.1"));
    assert_eq!(config.port, Some(8080));
    assert_eq!(config.data_dir.as_deref(), Some("/var/lib/leadflow"));
    assert_eq!(
        config.database_url.as_deref(),
        Some("sqlite://leads.db?mode=rwc")
    );
    assert_eq!(config.max_body, Some(2_097_152));
    assert_eq!(config.workflow_timeout(), Duration::from_secs(45));

    assert_eq!(
        config.llm.base_url.as_deref(),
        Some("http://localhost:11434/v1")
    );
    assert_eq!(config.llm.model.as_deref(), Some("llama3.1"));
    assert_eq!(config.llm.assistant_model.as_deref(), Some("llama3.1:70b"));
    assert_eq!(config.llm.temperature_override, Some(0.2));
    assert_eq!(config.llm.timeout_s, Some(30.0));

    assert_eq!(
        config.search.base_url.as_deref(),
        Some("http://search.internal")
    );
    assert_eq!(config.search_results(), 3);
    assert_eq!(
        config.scrape.base_url.as_deref(),
        Some("http://scrape.internal")
    );
}

#[test]
fn load_partial_config() {
    let file = write_config("port: 9090\nllm:\n  model: gpt-4o\n");

    let config = LeadflowConfig::load(Some(file.path())).unwrap();
    assert_eq!(config.port, Some(9090));
    assert!(config.host.is_none());
    assert!(config.database_url.is_none());
    assert_eq!(config.llm.model.as_deref(), Some("gpt-4o"));
    assert!(config.llm.assistant_model.is_none());
    assert!(config.search.base_url.is_none());
    assert_eq!(config.workflow_timeout(), Duration::from_secs(120));
    assert_eq!(config.search_results(), 5);
}

#[test]
fn load_empty_file_returns_defaults() {
    let file = write_config("");

    let config = LeadflowConfig::load(Some(file.path())).unwrap();
    assert!(config.port.is_none());
    assert!(config.llm.model.is_none());
    assert_eq!(config.workflow_timeout(), Duration::from_secs(120));
}

#[test]
fn missing_explicit_path_returns_error() {
    let result = LeadflowConfig::load(Some(Path::new("/nonexistent/leadflow.yaml")));
    let err = result.unwrap_err().to_string();
    assert!(err.contains("Config file not found"), "got: {}", err);
}

#[test]
fn invalid_yaml_returns_parse_error() {
    let file = write_config("port: [not, a, number\n");

    let err = LeadflowConfig::load(Some(file.path())).unwrap_err();
    assert!(
        err.to_string().contains("Failed to parse config file"),
        "got: {:#}",
        err
    );
}

#[test]
fn wrong_field_type_is_rejected() {
    let result = LeadflowConfig::from_yaml("workflow_timeout_s: soon\n");
    assert!(result.is_err());
}

#[test]
fn unknown_fields_are_ignored() {
    let config = LeadflowConfig::from_yaml("port: 3001\nfeature_flags: [beta]\n").unwrap();
    assert_eq!(config.port, Some(3001));
}

#[test]
fn env_secret_picks_first_non_empty() {
    // Variable names are unique to this test so parallel tests don't collide.
    unsafe {
        std::env::set_var("LEADFLOW_TEST_SECRET_A", "   ");
        std::env::set_var("LEADFLOW_TEST_SECRET_B", " sk-test ");
    }

    assert_eq!(
        env_secret(&["LEADFLOW_TEST_SECRET_A", "LEADFLOW_TEST_SECRET_B"]).as_deref(),
        Some("sk-test")
    );
    assert!(env_secret(&["LEADFLOW_TEST_SECRET_UNSET"]).is_none());

    unsafe {
        std::env::remove_var("LEADFLOW_TEST_SECRET_A");
        std::env::remove_var("LEADFLOW_TEST_SECRET_B");
    }
}
