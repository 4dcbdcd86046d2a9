use crate::config::*;
use tempfile::TempDir;

fn sample_document() -> ConfigDocument {
    let mut document = ConfigDocument::default();
    document.custom_fields.insert(
        "os_dependencies".to_string(),
        vec!["docker", "service", "date", "git"].into(),
    );
    document
        .custom_fields
        .insert("config_files_dir".to_string(), "config_files".into());
    document
        .custom_fields
        .insert("image_name".to_string(), "arbitrage-bot".into());
    document
        .custom_fields
        .insert("container_name".to_string(), "bot".into());
    document
        .custom_fields
        .insert("verbose".to_string(), true.into());
    document.default_fields.insert(
        "verbose".to_string(),
        FieldDefault::new("verbose", false),
    );
    document.default_fields.insert(
        "log_file".to_string(),
        FieldDefault::new("logging", "dockhand.log"),
    );
    document
}

fn sample_json() -> String {
    serde_json::to_string(&sample_document()).unwrap()
}

#[test]
fn test_instantiation_methods() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.json");
    std::fs::write(&path, sample_json()).unwrap();

    let from_file = Config::from_file(&path).unwrap();
    let from_json = Config::from_json(&sample_json()).unwrap();
    let from_document = Config::from_document(sample_document());

    assert_eq!(from_file.document(), &sample_document());
    assert_eq!(from_json, from_document);
    assert_eq!(from_file, from_document);
}

#[test]
fn test_from_sources_requires_exactly_one() {
    let none = Config::from_sources(None, None, None);
    assert!(matches!(none, Err(ConfigError::AmbiguousSource(0))));

    let json = sample_json();
    let two = Config::from_sources(None, Some(&json), Some(sample_document()));
    assert!(matches!(two, Err(ConfigError::AmbiguousSource(2))));

    let one = Config::from_sources(None, Some(&json), None).unwrap();
    assert_eq!(one.text("image_name"), Some("arbitrage-bot"));
}

#[test]
fn test_load_config_failure() {
    let missing = Config::from_file("non_existent_config.json");
    let err = missing.unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
    assert!(err.to_string().contains("Error loading configuration from file"));

    let malformed = Config::from_json("{ not json");
    assert!(matches!(malformed, Err(ConfigError::Parse(_))));
}

#[test]
fn test_unknown_top_level_keys_are_ignored() {
    let config = Config::from_json(
        r#"{"custom_fields": {"image_name": "app"}, "comment": "ignored", "version": 3}"#,
    )
    .unwrap();
    assert_eq!(config.text("image_name"), Some("app"));
    assert!(config.document().default_fields.is_empty());
}

#[test]
fn test_get_default_config_value() {
    let config = Config::from_document(sample_document());

    assert_eq!(
        config.get_default_value("verbose"),
        Some(&ConfigValue::Bool(false))
    );
    assert_eq!(config.get_default_value("non_existent_key"), None);
}

#[test]
fn test_get_default_config_name() {
    let config = Config::from_document(sample_document());

    assert_eq!(config.get_default_name("log_file"), Some("logging"));
    assert_eq!(config.get_default_name("non_existent_key"), None);
}

#[test]
fn test_get_custom_config_value() {
    let config = Config::from_document(sample_document());

    assert_eq!(
        config.get_custom_value("config_files_dir", false),
        Some(&ConfigValue::Text("config_files".to_string()))
    );
    assert_eq!(config.get_custom_value("log_file", false), None);
    assert_eq!(
        config.get_custom_value("log_file", true),
        Some(&ConfigValue::Text("dockhand.log".to_string()))
    );
    assert_eq!(config.get_custom_value("non_existent_key", true), None);
}

#[test]
fn test_custom_value_wins_over_default() {
    let config = Config::from_document(sample_document());

    // "verbose" has a default of false but a custom value of true
    assert_eq!(config.flag("verbose"), Some(true));
    assert_eq!(
        config.get_custom_value("verbose", true),
        Some(&ConfigValue::Bool(true))
    );
}

#[test]
fn test_add_config_value() {
    let mut config = Config::from_document(sample_document());

    config.add_custom_value("verbose", false);
    assert_eq!(config.flag("verbose"), Some(false));

    config.add_custom_value("container_name", "new_bot");
    assert_eq!(config.text("container_name"), Some("new_bot"));
}

#[test]
fn test_add_different_custom_values() {
    let mut config = Config::from_document(sample_document());

    config.add_custom_value("new_string_key", "string_value");
    assert_eq!(config.text("new_string_key"), Some("string_value"));

    config.add_custom_value("new_bool_key", true);
    assert_eq!(config.flag("new_bool_key"), Some(true));

    config.add_custom_value("new_list_key", vec!["item1", "item2"]);
    assert_eq!(
        config.list("new_list_key"),
        Some(&["item1".to_string(), "item2".to_string()][..])
    );
}

#[test]
fn test_add_list_is_deduplicating() {
    let mut config = Config::from_document(sample_document());

    config.add_custom_value("os_dependencies", vec!["git", "make"]);
    config.add_custom_value("os_dependencies", vec!["git", "make"]);

    assert_eq!(
        config.list("os_dependencies").unwrap(),
        &["docker", "service", "date", "git", "make"]
    );
}

#[test]
fn test_add_list_to_scalar_replaces() {
    let mut config = Config::from_document(sample_document());

    config.add_custom_value("image_name", vec!["a", "b"]);
    assert_eq!(config.list("image_name").unwrap(), &["a", "b"]);

    config.add_custom_value("image_name", "scalar-again");
    assert_eq!(config.text("image_name"), Some("scalar-again"));
}

#[test]
fn test_typed_helpers_treat_wrong_variant_as_absent() {
    let config = Config::from_document(sample_document());

    assert_eq!(config.flag("image_name"), None);
    assert_eq!(config.list("image_name"), None);
    assert_eq!(config.text("os_dependencies"), None);
}

#[test]
fn test_missing_required_fields() {
    let mut document = sample_document();
    document.default_fields.insert(
        "image_name".to_string(),
        FieldDefault {
            field_name: Some("image_name".to_string()),
            default_value: None,
            required: true,
        },
    );
    document.default_fields.insert(
        "registry".to_string(),
        FieldDefault {
            field_name: Some("registry".to_string()),
            default_value: None,
            required: true,
        },
    );
    document
        .default_fields
        .insert("tag_format".to_string(), FieldDefault::new("tag_format", "%Y").required());

    let config = Config::from_document(document);
    assert_eq!(config.missing_required(), vec!["registry".to_string()]);
}

#[test]
fn test_json_value_shapes() {
    let config = Config::from_json(
        r#"{
            "custom_fields": {"flag": true, "name": "x", "items": ["a", "b"]},
            "default_fields": {
                "tag_format": {"field_name": "tag_format", "default_value": "%Y%m%d", "required": true}
            }
        }"#,
    )
    .unwrap();

    assert_eq!(config.flag("flag"), Some(true));
    assert_eq!(config.text("name"), Some("x"));
    assert_eq!(config.list("items").unwrap(), &["a", "b"]);
    assert_eq!(config.text("tag_format"), Some("%Y%m%d"));
    assert!(config.missing_required().is_empty());
}

#[test]
fn test_new_list_is_deduplicated() {
    let mut config = Config::default();

    config.add_custom_value("os_dependencies", vec!["git", "docker", "git"]);
    config.add_custom_value("os_dependencies", vec!["git"]);
    assert_eq!(config.list("os_dependencies").unwrap(), &["git", "docker"]);

    config.add_custom_value("image_name", "bot");
    config.add_custom_value("image_name", vec!["a", "a", "b"]);
    assert_eq!(config.list("image_name").unwrap(), &["a", "b"]);
}

#[test]
fn test_numeric_and_null_values() {
    let config = Config::from_json(
        r#"{
            "default_fields": {
                "log_level": {"field_name": "log_level", "default_value": 10, "required": false},
                "initializer": {"field_name": "initializer", "default_value": null}
            },
            "custom_fields": {"retries": 3, "ratio": 0.5, "initializer": null}
        }"#,
    )
    .unwrap();

    assert_eq!(
        config.get_default_value("log_level").and_then(ConfigValue::as_i64),
        Some(10)
    );
    assert_eq!(
        config.get_custom_value("retries", false).and_then(ConfigValue::as_i64),
        Some(3)
    );
    assert_eq!(
        config.get_custom_value("ratio", false).map(ToString::to_string),
        Some("0.5".to_string())
    );
    assert_eq!(config.get_custom_value("initializer", true), None);
    assert_eq!(config.get_default_name("initializer"), Some("initializer"));
}
