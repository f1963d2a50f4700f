use std::fs;

use assert_matches::assert_matches;

use kira_sra_blast::config::{Config, ConfigLoader, DEFAULT_WEBDRIVER};
use kira_sra_blast::error::KiraError;

#[test]
fn explicit_config_file_is_loaded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kira-sb.json");
    fs::write(
        &path,
        r#"{
            "schema_version": 1,
            "webdriver": "http://127.0.0.1:4444/wd/hub",
            "proxy": "http://127.0.0.1:3128",
            "retry": 2,
            "settle_delay_secs": 1,
            "taxonomy": ["7160:Aedes albopictus (lab strain)"]
        }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(path.to_str()).unwrap();
    assert_eq!(resolved.source.as_deref(), Some(path.as_path()));
    assert_eq!(resolved.webdriver, "http://127.0.0.1:4444/wd/hub");
    assert_eq!(resolved.proxy.as_deref(), Some("http://127.0.0.1:3128"));
    assert_eq!(resolved.retry, 2);
    assert_eq!(resolved.settle_delay.as_secs(), 1);
    assert_eq!(resolved.taxonomy().species(7160), "Aedes albopictus (lab strain)");
}

#[test]
fn explicit_config_must_exist() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.json");
    assert_matches!(
        ConfigLoader::resolve(missing.to_str()),
        Err(KiraError::ConfigRead(_))
    );
}

#[test]
fn invalid_json_is_a_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kira-sb.json");
    fs::write(&path, "{ \"retry\": \"many\" }").unwrap();
    assert_matches!(
        ConfigLoader::resolve(path.to_str()),
        Err(KiraError::ConfigParse(_))
    );
}

#[test]
fn bad_webdriver_url() {
    let config = Config {
        webdriver: Some("not a url".to_string()),
        ..Config::default()
    };
    assert_matches!(
        ConfigLoader::resolve_config(config),
        Err(KiraError::ConfigParse(_))
    );
}

#[test]
fn defaults() {
    let resolved = ConfigLoader::resolve_config(Config::default()).unwrap();
    assert_eq!(resolved.webdriver, DEFAULT_WEBDRIVER);
    assert_eq!(resolved.fastq_dump, None);
    assert_eq!(resolved.taxonomy().species(7160), "Aedes albopictus");
}
