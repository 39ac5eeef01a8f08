use chrono::{Duration, Utc};
use recap_config::ConnectorSettings;
use recap_data::connectors::{ConnectorError, ConnectorFactory, ConnectorSpecificConfig, TENANT_ID_KEY};
use recap_data::services::InMemoryCredentialStore;
use recap_models::{Credential, CredentialJson, DocumentSource, InputType};
use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn object(value: Value) -> serde_json::Map<String, Value> {
    value.as_object().cloned().expect("test value must be an object")
}

fn factory_with(settings: ConnectorSettings) -> ConnectorFactory {
    ConnectorFactory::new(Arc::new(settings))
}

fn google_credential(expiry: chrono::DateTime<Utc>) -> Credential {
    Credential::new(
        11,
        DocumentSource::GoogleDrive,
        object(json!({
            "google_tokens": {
                "token": "ya29.stale",
                "refresh_token": "1//refresh",
                "client_id": "client-id",
                "client_secret": "client-secret",
                "expiry": expiry.to_rfc3339()
            }
        })),
    )
}

async fn oauth_server(status: u16, body: Value) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(&server)
        .await;
    server
}

fn settings_for_oauth(server: &MockServer) -> ConnectorSettings {
    let mut settings = ConnectorSettings::default();
    settings.endpoints.google_oauth_token = format!("{}/token", server.uri());
    settings
}

#[tokio::test]
async fn test_refreshed_credentials_are_persisted_once() {
    let server = oauth_server(
        200,
        json!({ "access_token": "ya29.fresh", "token_type": "Bearer", "expires_in": 3600 }),
    )
    .await;
    let factory = factory_with(settings_for_oauth(&server));

    let store = InMemoryCredentialStore::new();
    let mut credential = google_credential(Utc::now() - Duration::minutes(5));
    store.insert(credential.clone());

    let connector = factory
        .instantiate_connector(
            &store,
            DocumentSource::GoogleDrive,
            Some(InputType::Poll),
            &ConnectorSpecificConfig::new(),
            &mut credential,
            None,
        )
        .await
        .unwrap();

    assert_eq!(connector.name(), "GoogleDriveConnector");
    assert_eq!(store.write_count(), 1);

    let tokens = &credential.credential_json["google_tokens"];
    assert_eq!(tokens["token"], "ya29.fresh");
    assert_eq!(tokens["refresh_token"], "1//refresh");
    assert_eq!(
        store.get(11).unwrap().credential_json,
        credential.credential_json
    );
}

#[tokio::test]
async fn test_unchanged_credentials_are_never_written() {
    let factory = factory_with(ConnectorSettings::default());
    let store = InMemoryCredentialStore::new();
    let mut credential = Credential::new(3, DocumentSource::Web, CredentialJson::new());
    store.insert(credential.clone());
    let config = object(json!({ "base_url": "https://docs.example.com" }));

    for _ in 0..5 {
        factory
            .instantiate_connector(&store, DocumentSource::Web, None, &config, &mut credential, None)
            .await
            .unwrap();
    }

    assert_eq!(store.write_count(), 0);
    assert_eq!(credential.credential_json, CredentialJson::new());
}

#[tokio::test]
async fn test_valid_google_token_is_not_persisted() {
    let factory = factory_with(ConnectorSettings::default());
    let store = InMemoryCredentialStore::new();
    let mut credential = google_credential(Utc::now() + Duration::hours(1));
    store.insert(credential.clone());
    let before = credential.credential_json.clone();

    factory
        .instantiate_connector(
            &store,
            DocumentSource::GoogleDrive,
            None,
            &ConnectorSpecificConfig::new(),
            &mut credential,
            None,
        )
        .await
        .unwrap();

    assert_eq!(store.write_count(), 0);
    assert_eq!(credential.credential_json, before);
}

#[tokio::test]
async fn test_failed_refresh_writes_nothing() {
    let server = oauth_server(400, json!({ "error": "invalid_grant" })).await;
    let factory = factory_with(settings_for_oauth(&server));

    let store = InMemoryCredentialStore::new();
    let mut credential = google_credential(Utc::now() - Duration::minutes(5));
    store.insert(credential.clone());

    let err = factory
        .instantiate_connector(
            &store,
            DocumentSource::GoogleDrive,
            None,
            &ConnectorSpecificConfig::new(),
            &mut credential,
            None,
        )
        .await
        .err()
        .unwrap();

    assert!(matches!(err, ConnectorError::AuthenticationFailed(_)));
    assert_eq!(store.write_count(), 0);
}

#[tokio::test]
async fn test_persistence_failure_is_reported() {
    let server = oauth_server(
        200,
        json!({ "access_token": "ya29.fresh", "token_type": "Bearer", "expires_in": 3600 }),
    )
    .await;
    let factory = factory_with(settings_for_oauth(&server));

    // credential row was never stored
    let store = InMemoryCredentialStore::new();
    let mut credential = google_credential(Utc::now() - Duration::minutes(5));

    let err = factory
        .instantiate_connector(
            &store,
            DocumentSource::GoogleDrive,
            None,
            &ConnectorSpecificConfig::new(),
            &mut credential,
            None,
        )
        .await
        .err()
        .unwrap();

    assert!(matches!(err, ConnectorError::CredentialNotFound(11)));
}

#[tokio::test]
async fn test_resolution_errors_surface_before_construction() {
    let factory = factory_with(ConnectorSettings::default());
    let store = InMemoryCredentialStore::new();
    let mut credential = Credential::new(1, DocumentSource::Slack, CredentialJson::new());

    let err = factory
        .instantiate_connector(
            &store,
            DocumentSource::Slack,
            Some(InputType::LoadState),
            &ConnectorSpecificConfig::new(),
            &mut credential,
            None,
        )
        .await
        .err()
        .unwrap();
    assert!(err.is_connector_missing());

    let err = factory
        .instantiate_connector(
            &store,
            DocumentSource::Gmail,
            None,
            &ConnectorSpecificConfig::new(),
            &mut credential,
            None,
        )
        .await
        .err()
        .unwrap();
    assert_eq!(err.to_string(), "Connector not found for source=gmail");
}

#[tokio::test]
async fn test_constructor_rejects_unexpected_arguments() {
    let factory = factory_with(ConnectorSettings::default());
    let store = InMemoryCredentialStore::new();
    let mut credential = Credential::new(1, DocumentSource::Web, CredentialJson::new());
    let config = object(json!({ "base_url": "https://a.com", "crawl_depth": 3 }));

    let err = factory
        .instantiate_connector(&store, DocumentSource::Web, None, &config, &mut credential, None)
        .await
        .err()
        .unwrap();

    assert!(matches!(err, ConnectorError::InvalidConfiguration(_)));
}

#[tokio::test]
async fn test_tenant_id_is_only_injected_for_file_source() {
    let factory = factory_with(ConnectorSettings::default());
    let store = InMemoryCredentialStore::new();
    let mut credential = Credential::new(1, DocumentSource::Web, CredentialJson::new());

    // an injected tenant_id would be rejected as an unknown field
    let config = object(json!({ "base_url": "https://a.com" }));
    factory
        .instantiate_connector(
            &store,
            DocumentSource::Web,
            None,
            &config,
            &mut credential,
            Some("tenant_1"),
        )
        .await
        .unwrap();
    assert!(!config.contains_key(TENANT_ID_KEY));
}

#[tokio::test]
async fn test_file_connector_reads_tenant_scoped_store() {
    let root = tempfile::tempdir().unwrap();
    let notes = root.path().join("acme").join("notes");
    std::fs::create_dir_all(&notes).unwrap();
    std::fs::write(notes.join("runbook.md"), "# Restart\nrun the script").unwrap();
    std::fs::write(notes.join("diagram.png"), [0u8, 159, 146, 150]).unwrap();
    std::fs::create_dir_all(root.path().join("other").join("notes")).unwrap();
    std::fs::write(root.path().join("other").join("notes").join("secret.md"), "nope").unwrap();

    let settings = ConnectorSettings {
        file_store_root: root.path().to_path_buf(),
        ..ConnectorSettings::default()
    };
    let factory = factory_with(settings);
    let store = InMemoryCredentialStore::new();
    let mut credential = Credential::new(1, DocumentSource::File, CredentialJson::new());
    let config = object(json!({ "file_locations": ["notes"] }));

    let connector = factory
        .instantiate_connector(
            &store,
            DocumentSource::File,
            Some(InputType::LoadState),
            &config,
            &mut credential,
            Some("acme"),
        )
        .await
        .unwrap();

    let documents = connector
        .as_load_connector()
        .unwrap()
        .load_from_state()
        .await
        .unwrap();

    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].id, "notes/runbook.md");
    assert_eq!(documents[0].semantic_identifier, "runbook.md");
    assert!(documents[0].full_text().contains("run the script"));
    assert_eq!(store.write_count(), 0);
}

#[tokio::test]
async fn test_slim_request_falls_back_to_full_load_connector() {
    let factory = factory_with(ConnectorSettings::default());
    let store = InMemoryCredentialStore::new();
    let mut credential = Credential::new(4, DocumentSource::Web, CredentialJson::new());
    let config = object(json!({ "base_url": "https://docs.example.com" }));

    let connector = factory
        .instantiate_connector(
            &store,
            DocumentSource::Web,
            Some(InputType::SlimRetrieval),
            &config,
            &mut credential,
            None,
        )
        .await
        .unwrap();

    assert_eq!(connector.name(), "WebConnector");
    assert!(connector.as_slim_connector().is_none());
    assert!(connector.as_load_connector().is_some());
}
