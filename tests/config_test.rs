use std::env;
use std::fs;
use tempfile::TempDir;

/// Test loading configuration from a YAML file
#[test]
fn test_load_yaml_config() {
    let yaml = r#"
bucket: test-bucket
operator: test-operator
password: test-secret
endpoint: cnc
host: https://cdn.example.com
folder: uploads
identifier: "!"
signing: digest
timeout: 120

upload:
  threshold: 20971520
  part_size: 2097152
"#;

    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, yaml).unwrap();

    let config = upyun::config::load_from_yaml(&config_path).unwrap();

    assert_eq!(config.bucket, "test-bucket");
    assert_eq!(config.operator, "test-operator");
    assert_eq!(config.password, "test-secret");
    assert_eq!(config.endpoint, "cnc");
    assert_eq!(config.host, "https://cdn.example.com");
    assert_eq!(config.folder, "uploads");
    assert_eq!(config.timeout, 120);
    assert_eq!(config.upload.threshold, 20 * 1024 * 1024);
    assert_eq!(config.upload.part_size, 2 * 1024 * 1024);
}

#[test]
fn test_load_yaml_missing_file() {
    assert!(upyun::config::load_from_yaml("/nonexistent/config.yaml").is_err());
}

/// Environment loading: missing credentials fail, full set loads.
/// One test so the env mutations stay sequential.
#[test]
fn test_load_env_config() {
    let vars = [
        "UPYUN_BUCKET",
        "UPYUN_OPERATOR",
        "UPYUN_PASSWORD",
        "UPYUN_HOST",
        "UPYUN_FOLDER",
        "UPYUN_ENDPOINT",
        "UPYUN_MULTIPART_THRESHOLD",
    ];
    let saved: Vec<Option<String>> = vars.iter().map(|v| env::var(v).ok()).collect();
    for v in &vars {
        env::remove_var(v);
    }

    // Without credentials, loading must fail fast
    assert!(upyun::config::load_from_env().is_err());

    env::set_var("UPYUN_BUCKET", "env-bucket");
    env::set_var("UPYUN_OPERATOR", "env-operator");
    env::set_var("UPYUN_PASSWORD", "env-secret");
    env::set_var("UPYUN_HOST", "https://cdn.env.example.com");
    env::set_var("UPYUN_FOLDER", "env-folder");
    env::set_var("UPYUN_ENDPOINT", "telecom");
    env::set_var("UPYUN_MULTIPART_THRESHOLD", "52428800");

    let config = upyun::config::load_from_env().unwrap();
    assert_eq!(config.bucket, "env-bucket");
    assert_eq!(config.operator, "env-operator");
    assert_eq!(config.password, "env-secret");
    assert_eq!(config.host, "https://cdn.env.example.com");
    assert_eq!(config.folder, "env-folder");
    assert_eq!(config.endpoint, "telecom");
    assert_eq!(config.upload.threshold, 50 * 1024 * 1024);
    // Untouched settings keep their defaults
    assert_eq!(config.signing, "digest");
    assert_eq!(config.timeout, 60);

    // Restore original environment
    for (var, value) in vars.iter().zip(saved) {
        match value {
            Some(v) => env::set_var(var, v),
            None => env::remove_var(var),
        }
    }
}
