use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use appconfiguration::{
    AppConfiguration, Attributes, ClientConfig, Configuration, Error, HandlerState, LoadOutcome,
    Value,
};
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const GUID: &str = "test-guid";
const COLLECTION: &str = "car-rentals";
const ENVIRONMENT: &str = "dev";
const CONFIG_PATH: &str = "/apprapp/feature/v1/instances/test-guid/collections/car-rentals/config";

fn configuration_body(enabled_value: bool) -> serde_json::Value {
    serde_json::json!({
        "feature_flags": [{
            "feature_id": "f1",
            "type": "BOOLEAN",
            "enabled": true,
            "enabled_value": enabled_value,
            "disabled_value": false
        }],
        "properties": [],
        "segments": []
    })
}

async fn mock_iam(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/identity/token"))
        .and(body_string_contains("apikey=test-apikey"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "test-token",
            "expiration": chrono::Utc::now().timestamp() + 3600
        })))
        .mount(server)
        .await;
}

/// A session pointed at the mock server. Polling is slow enough not to interfere with tests.
fn remote_client(server_uri: String) -> AppConfiguration {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut client = ClientConfig::new()
        .override_server_host(server_uri)
        .poll_interval(Duration::from_secs(3600))
        .poll_jitter(Duration::ZERO)
        .request_timeout(Duration::from_secs(5))
        .to_client();
    client
        .init(AppConfiguration::REGION_US_SOUTH, GUID, "test-apikey")
        .unwrap();
    client
}

#[tokio::test]
async fn fetches_configuration_from_server() {
    let server = MockServer::start().await;
    mock_iam(&server).await;
    Mock::given(method("GET"))
        .and(path(CONFIG_PATH))
        .and(query_param("environment_id", ENVIRONMENT))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(configuration_body(true)))
        .expect(1..)
        .mount(&server)
        .await;

    let uri = server.uri();
    tokio::task::spawn_blocking(move || {
        let mut client = remote_client(uri);
        client
            .set_context(COLLECTION, ENVIRONMENT, None, true)
            .unwrap();
        client.wait_for_configuration().unwrap();

        assert_eq!(client.state(), HandlerState::Loaded);
        assert!(client.refresh_handle().is_some());
        assert_eq!(
            client
                .get_feature("f1")
                .unwrap()
                .get_current_value("user1", &Attributes::new()),
            Some(Value::Boolean(true))
        );

        client.shutdown().unwrap();
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn failed_refresh_keeps_previous_configuration() {
    let server = MockServer::start().await;
    mock_iam(&server).await;
    Mock::given(method("GET"))
        .and(path(CONFIG_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(configuration_body(true)))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(CONFIG_PATH))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let uri = server.uri();
    tokio::task::spawn_blocking(move || {
        let mut client = remote_client(uri);
        client
            .set_context(COLLECTION, ENVIRONMENT, None, true)
            .unwrap();
        let loaded = client.get_feature("f1").unwrap();

        let notifications = Arc::new(AtomicUsize::new(0));
        {
            let notifications = notifications.clone();
            client
                .register_configuration_update_listener(move |_: &Configuration| {
                    notifications.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }

        assert!(matches!(
            client.fetch_configurations(),
            Err(Error::UnexpectedStatus(500))
        ));

        assert_eq!(notifications.load(Ordering::SeqCst), 0);
        let current = client.get_feature("f1").unwrap();
        assert_eq!(current.is_enabled(), loaded.is_enabled());
        assert_eq!(
            current.get_current_value("user1", &Attributes::new()),
            Some(Value::Boolean(true))
        );

        client.shutdown().unwrap();
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn refresh_replaces_configuration_and_notifies() {
    let server = MockServer::start().await;
    mock_iam(&server).await;
    Mock::given(method("GET"))
        .and(path(CONFIG_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(configuration_body(false)))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(CONFIG_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(configuration_body(true)))
        .mount(&server)
        .await;

    let uri = server.uri();
    tokio::task::spawn_blocking(move || {
        let mut client = remote_client(uri);
        client
            .set_context(COLLECTION, ENVIRONMENT, None, true)
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

        let entity = Attributes::new();
        assert_eq!(
            client.get_feature("f1").unwrap().get_current_value("user1", &entity),
            Some(Value::Boolean(false))
        );

        assert_eq!(client.fetch_configurations().unwrap(), LoadOutcome::Loaded);
        assert_eq!(notifications.load(Ordering::SeqCst), 1);
        assert_eq!(
            client.get_feature("f1").unwrap().get_current_value("user1", &entity),
            Some(Value::Boolean(true))
        );

        client.shutdown().unwrap();
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn unauthorized_is_cached() {
    let server = MockServer::start().await;
    mock_iam(&server).await;
    Mock::given(method("GET"))
        .and(path(CONFIG_PATH))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let uri = server.uri();
    tokio::task::spawn_blocking(move || {
        let mut client = remote_client(uri);
        client
            .set_context(COLLECTION, ENVIRONMENT, None, true)
            .unwrap();

        assert!(matches!(
            client.wait_for_configuration(),
            Err(Error::Unauthorized)
        ));
        // No poller is started, and further fetches do not reach the server.
        assert!(client.refresh_handle().is_none());
        assert!(matches!(
            client.fetch_configurations(),
            Err(Error::Unauthorized)
        ));
        assert!(client.get_feature("f1").is_none());

        client.shutdown().unwrap();
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn rejected_apikey_is_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/identity/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "errorCode": "BXNIM0415E"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let uri = server.uri();
    tokio::task::spawn_blocking(move || {
        let mut client = remote_client(uri);
        client
            .set_context(COLLECTION, ENVIRONMENT, None, true)
            .unwrap();

        assert_eq!(client.state(), HandlerState::ContextSet);
        assert!(matches!(
            client.wait_for_configuration(),
            Err(Error::Unauthorized)
        ));
    })
    .await
    .unwrap();
}
