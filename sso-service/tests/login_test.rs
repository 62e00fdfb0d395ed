mod common;

use axum::http::StatusCode;
use common::{RequestBuilder, TestApp};
use serde_json::json;
use sso_service::services::MockCaptcha;

fn login_body(email: &str, password: &str) -> serde_json::Value {
    json!({ "email": email, "password": password, "captcha": "tok" })
}

#[tokio::test]
async fn test_password_login_sets_session_cookies() {
    let app = TestApp::new();
    let user = app.seed_user("a@b", "p", false).await;

    let response = app
        .send(
            RequestBuilder::post("/auth/jwt")
                .json(login_body("a@b", "p"))
                .build(),
        )
        .await;

    assert_eq!(response.status, StatusCode::OK);
    let cookies = response.set_cookies();
    for name in ["access", "refresh"] {
        let line = &cookies[name];
        assert!(line.contains("HttpOnly"), "{}", line);
        assert!(line.contains("Secure"), "{}", line);
        assert!(line.contains("Path=/"), "{}", line);
        assert!(line.contains("SameSite=Strict"), "{}", line);
    }

    let claims = app
        .state
        .auth
        .tokens()
        .parse(&response.session().access)
        .unwrap();
    assert_eq!(claims.sub, user.id);
    assert!(claims.roles.is_empty());
}

#[tokio::test]
async fn test_unknown_user_is_not_found() {
    let app = TestApp::new();

    let response = app
        .send(
            RequestBuilder::post("/auth/jwt")
                .json(login_body("a@b", "p"))
                .build(),
        )
        .await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body, json!({ "errors": ["not found"] }));
}

#[tokio::test]
async fn test_wrong_password_is_unauthorized() {
    let app = TestApp::new();
    app.seed_user("a@b", "p", false).await;

    let response = app
        .send(
            RequestBuilder::post("/auth/jwt")
                .json(login_body("a@b", "nope"))
                .build(),
        )
        .await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.errors(), vec!["invalid credentials"]);
    assert!(response.set_cookies().is_empty());
}

#[tokio::test]
async fn test_captcha_rejection_and_failure() {
    let rejecting = TestApp::with_captcha(MockCaptcha::rejecting());
    rejecting.seed_user("a@b", "p", false).await;
    let response = rejecting
        .send(
            RequestBuilder::post("/auth/jwt")
                .json(login_body("a@b", "p"))
                .build(),
        )
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.errors(), vec!["CAPTCHA validation failed"]);

    let failing = TestApp::with_captcha(MockCaptcha::failing());
    failing.seed_user("a@b", "p", false).await;
    let response = failing
        .send(
            RequestBuilder::post("/auth/jwt")
                .json(login_body("a@b", "p"))
                .build(),
        )
        .await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.errors(), vec!["internal error"]);
}

#[tokio::test]
async fn test_missing_device_info_is_bad_request() {
    let app = TestApp::new();
    app.seed_user("a@b", "p", false).await;

    let no_agent = app
        .send(
            RequestBuilder::post("/auth/jwt")
                .without_user_agent()
                .json(login_body("a@b", "p"))
                .build(),
        )
        .await;
    assert_eq!(no_agent.status, StatusCode::BAD_REQUEST);
    assert_eq!(no_agent.errors(), vec!["no device info provided"]);

    let ipv6 = app
        .send(
            RequestBuilder::post("/auth/jwt")
                .peer("[2001:db8::1]:443")
                .json(login_body("a@b", "p"))
                .build(),
        )
        .await;
    assert_eq!(ipv6.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_malformed_body_uses_error_envelope() {
    let app = TestApp::new();

    let response = app
        .send(
            RequestBuilder::post("/auth/jwt")
                .json(json!({ "email": "a@b" }))
                .build(),
        )
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.errors().len(), 1);
}
