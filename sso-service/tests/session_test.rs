mod common;

use axum::http::StatusCode;
use common::{test_config, RequestBuilder, TestApp};
use serde_json::json;

#[tokio::test]
async fn test_refresh_then_logout_revokes() {
    let app = TestApp::new();
    app.seed_user("a@b", "p", false).await;
    let session = app.login("a@b", "p").await;

    let refreshed = app
        .send(
            RequestBuilder::post("/auth/jwt/refresh")
                .refresh(&session.refresh)
                .build(),
        )
        .await;
    assert_eq!(refreshed.status, StatusCode::OK);
    let renewed = refreshed.session();

    let logout = app
        .send(
            RequestBuilder::post("/auth/logout")
                .access(&renewed.access)
                .build(),
        )
        .await;
    assert_eq!(logout.status, StatusCode::OK);
    for name in ["access", "refresh"] {
        assert!(logout.set_cookies()[name].contains("Max-Age=0"));
    }

    for token in [&session.refresh, &renewed.refresh] {
        let again = app
            .send(RequestBuilder::post("/auth/jwt/refresh").refresh(token).build())
            .await;
        assert_eq!(again.status, StatusCode::UNAUTHORIZED);
        assert_eq!(again.errors(), vec!["token revoked"]);
    }
}

#[tokio::test]
async fn test_refresh_from_another_device_is_rejected() {
    let app = TestApp::new();
    app.seed_user("a@b", "p", false).await;
    let session = app.login("a@b", "p").await;

    let response = app
        .send(
            RequestBuilder::post("/auth/jwt/refresh")
                .header("user-agent", "Other/2")
                .refresh(&session.refresh)
                .build(),
        )
        .await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_refresh_without_cookie_is_unauthorized() {
    let app = TestApp::new();

    let response = app
        .send(RequestBuilder::post("/auth/jwt/refresh").build())
        .await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.errors(), vec!["token invalid"]);
}

#[tokio::test]
async fn test_access_token_is_not_a_refresh_token() {
    let app = TestApp::new();
    app.seed_user("a@b", "p", false).await;
    let session = app.login("a@b", "p").await;

    let response = app
        .send(
            RequestBuilder::post("/auth/jwt/refresh")
                .refresh(&session.access)
                .build(),
        )
        .await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_parse_returns_claims() {
    let app = TestApp::new();
    let user = app.seed_user("admin@b", "p", true).await;
    let session = app.login("admin@b", "p").await;

    let response = app
        .send(
            RequestBuilder::post("/auth/jwt/parse")
                .json(json!({ "token": session.access }))
                .build(),
        )
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["sub"], json!(user.id.to_string()));
    assert_eq!(response.body["roles"][0]["name"], json!("admin"));

    let garbage = app
        .send(
            RequestBuilder::post("/auth/jwt/parse")
                .json(json!({ "token": "not-a-jwt" }))
                .build(),
        )
        .await;
    assert_eq!(garbage.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_bearer_routes_require_a_valid_token() {
    let app = TestApp::new();
    app.seed_user("a@b", "p", false).await;

    let missing = app.send(RequestBuilder::get("/users/me").build()).await;
    assert_eq!(missing.status, StatusCode::UNAUTHORIZED);
    assert_eq!(missing.errors(), vec!["unauthorized"]);

    let garbage = app
        .send(RequestBuilder::get("/users/me").bearer("garbage").build())
        .await;
    assert_eq!(garbage.status, StatusCode::FORBIDDEN);
    assert_eq!(garbage.errors(), vec!["forbidden"]);

    let session = app.login("a@b", "p").await;
    let me = app
        .send(RequestBuilder::get("/users/me").bearer(&session.access).build())
        .await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.body["email"], json!("a@b"));
    assert!(me.body.get("password").is_none());
}

#[tokio::test]
async fn test_expired_access_token_is_unauthorized() {
    let mut config = test_config();
    config.jwt.access_token_expiry_minutes = -1;
    let app = TestApp::with_config(config);
    app.seed_user("a@b", "p", false).await;
    let session = app.login("a@b", "p").await;

    let response = app
        .send(RequestBuilder::get("/users/me").access(&session.access).build())
        .await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.errors(), vec!["token expired"]);
}
