mod common;

use axum::http::{header, StatusCode};
use common::{RequestBuilder, TestApp, SUCCESS_URL};
use serde_json::json;
use sso_service::services::Store;
use std::collections::HashMap;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn query_of(location: &str) -> HashMap<String, String> {
    let query = location.split_once('?').map(|(_, q)| q).unwrap_or_default();
    serde_urlencoded::from_str(query).unwrap()
}

async fn start(app: &TestApp, path: &str) -> HashMap<String, String> {
    let response = app.send(RequestBuilder::get(path).build()).await;
    assert_eq!(response.status, StatusCode::TEMPORARY_REDIRECT);
    let location = response.headers[header::LOCATION].to_str().unwrap();
    query_of(location)
}

#[tokio::test]
async fn test_start_redirects_with_fresh_state() {
    let app = TestApp::new();

    let first = start(&app, "/auth/oauth2/google/start").await;
    let second = start(&app, "/auth/oauth2/google/start").await;

    assert_eq!(first["client_id"], "google-client");
    assert_eq!(first["response_type"], "code");
    assert!(!first["state"].is_empty());
    assert_ne!(first["state"], second["state"]);
}

#[tokio::test]
async fn test_oidc_start_carries_nonce() {
    let app = TestApp::new();

    let query = start(&app, "/auth/oidc/google/start").await;

    assert!(query["scope"].contains("openid"));
    assert!(!query["nonce"].is_empty());
}

#[tokio::test]
async fn test_unknown_or_unconfigured_provider_is_not_found() {
    let app = TestApp::new();

    for path in ["/auth/oauth2/nope/start", "/auth/oauth2/github/start"] {
        let response = app.send(RequestBuilder::get(path).build()).await;
        assert_eq!(response.status, StatusCode::NOT_FOUND, "{}", path);
    }
}

#[tokio::test]
async fn test_callback_with_unknown_state_is_not_found() {
    let app = TestApp::new();

    let response = app
        .send(
            RequestBuilder::get("/auth/oauth2/google/callback?code=c&state=never-issued").build(),
        )
        .await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert!(response.set_cookies().is_empty());
}

#[tokio::test]
async fn test_denied_consent_is_unauthorized_and_consumes_state() {
    let app = TestApp::new();
    let state = start(&app, "/auth/oauth2/google/start").await["state"].clone();
    let uri = format!(
        "/auth/oauth2/google/callback?error=access_denied&state={}",
        state
    );

    let denied = app.send(RequestBuilder::get(&uri).build()).await;
    assert_eq!(denied.status, StatusCode::UNAUTHORIZED);
    assert!(denied.set_cookies().is_empty());

    let replay = app.send(RequestBuilder::get(&uri).build()).await;
    assert_eq!(replay.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_state_is_bound_to_its_protocol() {
    let app = TestApp::new();
    let state = start(&app, "/auth/oauth2/google/start").await["state"].clone();

    let response = app
        .send(
            RequestBuilder::get(&format!(
                "/auth/oidc/google/callback?code=c&state={}",
                state
            ))
            .build(),
        )
        .await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_callback_sets_cookies_and_redirects() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "at" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/userinfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "g-123",
            "email": "Ext@Example.com",
            "name": "Ext User",
            "picture": "http://img"
        })))
        .mount(&server)
        .await;
    let app = TestApp::with_google_at(&server.uri());

    let query = start(&app, "/auth/oauth2/google/start").await;
    assert_eq!(query["client_id"], "google-client");
    let uri = format!(
        "/auth/oauth2/google/callback?code=auth-code&state={}",
        query["state"]
    );

    let response = app.send(RequestBuilder::get(&uri).build()).await;

    assert_eq!(response.status, StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(response.headers[header::LOCATION], SUCCESS_URL);
    let session = response.session();

    let user = app
        .store
        .find_user_by_email("ext@example.com")
        .await
        .unwrap()
        .expect("federated user created");
    assert_eq!(user.name, "Ext User");
    let claims = app.state.auth.tokens().parse(&session.access).unwrap();
    assert_eq!(claims.sub, user.id);

    let devices = app.store.list_devices(user.id).await.unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].ip, "1.2.3.4");

    let refreshed = app
        .send(
            RequestBuilder::post("/auth/jwt/refresh")
                .refresh(&session.refresh)
                .build(),
        )
        .await;
    assert_eq!(refreshed.status, StatusCode::OK);

    let replay = app.send(RequestBuilder::get(&uri).build()).await;
    assert_eq!(replay.status, StatusCode::NOT_FOUND);
}
