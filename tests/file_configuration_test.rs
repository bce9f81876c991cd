use std::{
    io::Write,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use appconfiguration::{
    AppConfiguration, AttributeValue, Attributes, Configuration, Error, EvaluationReason,
    HandlerState, LoadOutcome, Value,
};

fn configuration_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/data/configuration.json")
}

fn init() -> AppConfiguration {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut client = AppConfiguration::new();
    client
        .init(AppConfiguration::REGION_US_SOUTH, "guid", "apikey")
        .unwrap();
    client
}

fn file_client() -> AppConfiguration {
    let mut client = init();
    client
        .set_context("collection", "dev", Some(&configuration_path()), false)
        .unwrap();
    client
}

fn attributes(pairs: &[(&str, &str)]) -> Attributes {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), AttributeValue::from(*value)))
        .collect()
}

#[test]
fn evaluates_features_from_file() {
    let client = file_client();
    assert_eq!(client.state(), HandlerState::Loaded);

    let dark_mode = client.get_feature("dark-mode").unwrap();
    assert_eq!(
        dark_mode.get_current_value("user1", &Attributes::new()),
        Some(Value::Boolean(true))
    );

    let theme = client.get_feature("theme-color").unwrap();
    assert_eq!(
        theme.get_current_value("user1", &attributes(&[("city", "NY")])),
        Some(Value::String("red".to_owned()))
    );
    assert_eq!(
        theme.get_current_value("user1", &attributes(&[("city", "LA")])),
        Some(Value::String("blue".to_owned()))
    );
}

#[test]
fn disabled_feature_ignores_targeting() {
    let client = file_client();
    let discount = client.get_feature("discount").unwrap();

    let evaluation = discount
        .evaluate("user1", &attributes(&[("plan", "gold")]))
        .unwrap();
    assert_eq!(evaluation.value, Value::Numeric(0.0));
    assert_eq!(evaluation.reason, EvaluationReason::Disabled);
}

#[test]
fn evaluates_properties_from_file() {
    let client = file_client();
    let limit = client.get_property("request-limit").unwrap();

    let premium_new_yorker = attributes(&[("plan", "gold"), ("city", "NY")]);
    let premium = attributes(&[("plan", "platinum"), ("city", "LA")]);

    let evaluation = limit.evaluate("user1", &premium_new_yorker).unwrap();
    assert_eq!(evaluation.value, Value::Numeric(1000.0));
    assert_eq!(evaluation.matched_rule, Some(0));

    // `$default` rule value resolves to the property value.
    let evaluation = limit.evaluate("user1", &premium).unwrap();
    assert_eq!(evaluation.value, Value::Numeric(100.0));
    assert_eq!(evaluation.matched_rule, Some(1));
    assert_eq!(evaluation.reason, EvaluationReason::TargetingMatch);

    let evaluation = limit.evaluate("user1", &Attributes::new()).unwrap();
    assert_eq!(evaluation.reason, EvaluationReason::Default);

    let banner = client.get_property("banner").unwrap();
    assert_eq!(
        banner
            .get_current_value("user1", &Attributes::new())
            .unwrap()
            .as_json()
            .and_then(|json| json.get("title"))
            .and_then(|title| title.as_str()),
        Some("Welcome")
    );
}

#[test]
fn lists_features_and_properties() {
    let client = file_client();

    let mut feature_ids = client.get_feature_ids().unwrap();
    feature_ids.sort();
    assert_eq!(feature_ids, ["dark-mode", "discount", "theme-color"]);

    let features = client.get_features().unwrap();
    assert_eq!(features.len(), 3);
    assert_eq!(features["theme-color"].name(), "Theme color");

    let properties = client.get_properties().unwrap();
    assert_eq!(properties.len(), 2);
    assert!(properties.contains_key("banner"));

    assert!(client.get_feature("missing").is_none());
    assert!(client.get_property("missing").is_none());
}

#[test]
fn empty_entity_id_returns_none() {
    let client = file_client();
    let dark_mode = client.get_feature("dark-mode").unwrap();

    assert!(dark_mode.get_current_value("", &Attributes::new()).is_none());
    assert!(matches!(
        dark_mode.evaluate("", &Attributes::new()),
        Err(Error::InvalidEntity)
    ));
}

#[test]
fn live_updates_disabled_without_file_loads_nothing() {
    let mut client = init();

    let result = client.set_context("collection", "dev", None, false);

    assert!(matches!(result, Err(Error::Validation(_))));
    assert_eq!(client.state(), HandlerState::Uninitialized);
    assert!(client.get_feature("dark-mode").is_none());
    assert!(client.get_features().is_none());
    assert!(client.get_property("request-limit").is_none());
    assert!(client.get_properties().is_none());
}

#[test]
fn file_with_live_updates_uses_file_only() {
    let mut client = init();

    client
        .set_context("collection", "dev", Some(&configuration_path()), true)
        .unwrap();

    assert_eq!(client.state(), HandlerState::Loaded);
    assert!(client.refresh_handle().is_none());
    assert!(client.get_feature("dark-mode").is_some());
    client.shutdown().unwrap();
}

#[test]
fn lifecycle_errors() {
    let mut client = AppConfiguration::new();

    assert!(matches!(
        client.set_context("collection", "dev", Some(&configuration_path()), false),
        Err(Error::InvalidState(_))
    ));
    assert!(matches!(
        client.fetch_configurations(),
        Err(Error::InvalidState(_))
    ));
    assert!(matches!(
        client.register_configuration_update_listener(|_: &Configuration| {}),
        Err(Error::InvalidState(_))
    ));

    assert!(matches!(
        client.init("", "guid", "apikey"),
        Err(Error::Validation(_))
    ));
    client.init("us-south", "guid", "apikey").unwrap();
    // `init()` may be repeated until the context is set.
    client.init("eu-gb", "guid", "apikey").unwrap();
    assert_eq!(client.get_region(), Some("eu-gb"));

    assert!(matches!(
        client.set_context("", "dev", Some(&configuration_path()), false),
        Err(Error::Validation(_))
    ));
    client
        .set_context("collection", "dev", Some(&configuration_path()), false)
        .unwrap();

    assert!(matches!(
        client.set_context("collection", "dev", Some(&configuration_path()), false),
        Err(Error::InvalidState(_))
    ));
    assert!(matches!(
        client.init("us-south", "guid", "apikey"),
        Err(Error::InvalidState(_))
    ));
}

#[test]
fn fetch_configurations_notifies_listeners() {
    let client = file_client();
    let notifications = Arc::new(AtomicUsize::new(0));
    {
        let notifications = notifications.clone();
        client
            .register_configuration_update_listener(move |configuration: &Configuration| {
                assert_eq!(configuration.features().len(), 3);
                notifications.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    }

    assert_eq!(client.fetch_configurations().unwrap(), LoadOutcome::Loaded);
    assert_eq!(client.fetch_configurations().unwrap(), LoadOutcome::Loaded);

    assert_eq!(notifications.load(Ordering::SeqCst), 2);
}

#[test]
fn snapshots_survive_refreshes() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(
        br#"{"feature_flags": [{"feature_id": "f1", "type": "NUMERIC", "enabled": true,
             "enabled_value": 1, "disabled_value": 0}]}"#,
    )
    .unwrap();

    let mut client = init();
    client
        .set_context("collection", "dev", Some(file.path()), false)
        .unwrap();
    let before = client.get_feature("f1").unwrap();

    std::fs::write(
        file.path(),
        br#"{"feature_flags": [{"feature_id": "f1", "type": "NUMERIC", "enabled": true,
             "enabled_value": 2, "disabled_value": 0}]}"#,
    )
    .unwrap();
    client.fetch_configurations().unwrap();

    let after = client.get_feature("f1").unwrap();
    assert_eq!(
        before.get_current_value("user1", &Attributes::new()),
        Some(Value::Numeric(1.0))
    );
    assert_eq!(
        after.get_current_value("user1", &Attributes::new()),
        Some(Value::Numeric(2.0))
    );
}

#[test]
fn malformed_file_keeps_previous_configuration() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(
        br#"{"feature_flags": [{"feature_id": "f1", "type": "BOOLEAN", "enabled": true,
             "enabled_value": true, "disabled_value": false}]}"#,
    )
    .unwrap();

    let mut client = init();
    client
        .set_context("collection", "dev", Some(file.path()), false)
        .unwrap();
    let notifications = Arc::new(AtomicUsize::new(0));
    {
        let notifications = notifications.clone();
        client
            .register_configuration_update_listener(move |_: &Configuration| {
                notifications.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    }

    std::fs::write(file.path(), b"{\"feature_flags\": [{\"feature_id\": \"f1\"").unwrap();

    assert!(matches!(
        client.fetch_configurations(),
        Err(Error::MalformedConfig(_))
    ));
    assert_eq!(notifications.load(Ordering::SeqCst), 0);
    assert!(client.get_feature("f1").is_some());
}

#[test]
fn missing_file_leaves_context_without_configuration() {
    let mut client = init();

    client
        .set_context("collection", "dev", Some(Path::new("/nonexistent/config.json")), false)
        .unwrap();

    assert_eq!(client.state(), HandlerState::ContextSet);
    assert!(client.get_feature("dark-mode").is_none());
    assert!(matches!(client.wait_for_configuration(), Err(Error::Io(_))));
}
