use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt; // for .oneshot()

use expense_server::config::{AdminSeed, Config};
use expense_server::db;
use expense_server::routes::{create_router, AppState};
use expense_server::services::directory;

const ADMIN_EMAIL: &str = "admin@corp.test";
const ADMIN_PASSWORD: &str = "admin-password";
const STAFF_PASSWORD: &str = "staff-password";

struct TestApp {
    _dir: TempDir,
    router: Router,
}

struct Reply {
    status: StatusCode,
    cookie: Option<String>,
    body: Value,
}

fn test_app() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("api.db");
    let pool = db::create_pool(path.to_str().unwrap()).unwrap();

    let config = Config {
        server_port: 0,
        sqlite_path: path.to_string_lossy().into_owned(),
        session_secret: "integration-secret".into(),
        session_ttl_minutes: 60,
        cors_origins: vec![],
        secure_cookies: false,
        auth_rate_limit: false,
        admin: Some(AdminSeed {
            name: "Admin".into(),
            email: ADMIN_EMAIL.into(),
            password: ADMIN_PASSWORD.into(),
        }),
    };
    if let Some(seed) = &config.admin {
        directory::ensure_admin(&pool, seed).unwrap();
    }

    let router = create_router(AppState { db: pool, config });
    TestApp { _dir: dir, router }
}

impl TestApp {
    async fn send(&self, method: &str, uri: &str, cookie: Option<&str>, body: Option<Value>) -> Reply {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .map(|v| v.to_str().unwrap().split(';').next().unwrap().to_string());
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        Reply { status, cookie, body }
    }

    async fn login(&self, path: &str, email: &str, password: &str) -> Reply {
        self.send("POST", path, None, Some(json!({ "email": email, "password": password })))
            .await
    }

    async fn admin_session(&self) -> String {
        let reply = self.login("/api/login", ADMIN_EMAIL, ADMIN_PASSWORD).await;
        assert_eq!(reply.status, StatusCode::OK, "{:?}", reply.body);
        reply.cookie.unwrap()
    }

    async fn staff_session(&self, email: &str) -> String {
        let reply = self.login("/api/er-login", email, STAFF_PASSWORD).await;
        assert_eq!(reply.status, StatusCode::OK, "{:?}", reply.body);
        reply.cookie.unwrap()
    }

    async fn create_user(&self, admin: &str, name: &str, role: &str, manager_id: Option<&str>) -> Value {
        let reply = self
            .send(
                "POST",
                "/api/admin/create-user",
                Some(admin),
                Some(json!({
                    "name": name,
                    "email": format!("{}@corp.test", name.to_lowercase()),
                    "password": STAFF_PASSWORD,
                    "role": role,
                    "managerId": manager_id,
                })),
            )
            .await;
        assert_eq!(reply.status, StatusCode::CREATED, "{:?}", reply.body);
        reply.body["user"].clone()
    }
}

#[tokio::test]
async fn health_and_root_are_public() {
    let app = test_app();
    let reply = app.send("GET", "/health", None, None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, json!("ok"));

    let reply = app.send("GET", "/", None, None).await;
    assert_eq!(reply.body["message"], "Backend running successfully");
}

#[tokio::test]
async fn protected_routes_require_a_session() {
    let app = test_app();
    for (method, uri) in [
        ("GET", "/api/admin/employees"),
        ("GET", "/api/expenses/user/me"),
        ("GET", "/api/expenses/pending"),
        ("POST", "/api/expenses/some-id/approve"),
    ] {
        let reply = app.send(method, uri, None, None).await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED, "{method} {uri}");
        assert_eq!(reply.body["error"], "unauthenticated");
    }

    let reply = app
        .send("GET", "/api/expenses/pending", Some("expense_session=forged"), None)
        .await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn expense_approval_workflow_end_to_end() {
    let app = test_app();
    let admin = app.admin_session().await;

    let m1 = app.create_user(&admin, "Mgr1", "manager", None).await;
    let _m2 = app.create_user(&admin, "Mgr2", "manager", None).await;
    let e1 = app.create_user(&admin, "Emp1", "employee", m1["id"].as_str()).await;
    assert_eq!(e1["manager_id"], m1["id"]);
    assert!(e1.get("password_hash").is_none());

    let employee = app.staff_session("emp1@corp.test").await;
    let manager1 = app.staff_session("mgr1@corp.test").await;
    let manager2 = app.staff_session("mgr2@corp.test").await;

    let reply = app
        .send(
            "POST",
            "/api/expenses",
            Some(&employee),
            Some(json!({
                "amount": 100,
                "currency": "USD",
                "category": "Travel",
                "description": "Taxi",
                "date": "2025-10-01"
            })),
        )
        .await;
    assert_eq!(reply.status, StatusCode::CREATED, "{:?}", reply.body);
    let expense = reply.body["expense"].clone();
    assert_eq!(expense["status"], "Pending");
    assert_eq!(expense["employee_id"], e1["id"]);
    let expense_id = expense["id"].as_str().unwrap().to_string();

    let mine = app.send("GET", "/api/expenses/user/me", Some(&employee), None).await;
    assert_eq!(mine.body.as_array().unwrap().len(), 1);

    let pending = app.send("GET", "/api/expenses/pending", Some(&manager1), None).await;
    assert_eq!(pending.status, StatusCode::OK);
    assert_eq!(pending.body[0]["id"], expense_id.as_str());
    assert_eq!(pending.body[0]["employee_name"], "Emp1");

    let other = app.send("GET", "/api/expenses/pending", Some(&manager2), None).await;
    assert_eq!(other.body, json!([]));

    let stolen = app
        .send("POST", &format!("/api/expenses/{expense_id}/approve"), Some(&manager2), None)
        .await;
    assert_eq!(stolen.status, StatusCode::FORBIDDEN);

    let reject_uri = format!("/api/expenses/{expense_id}/reject");
    let rejected = app
        .send("POST", &reject_uri, Some(&manager1), Some(json!({ "comment": "Exceeds limit" })))
        .await;
    assert_eq!(rejected.status, StatusCode::OK, "{:?}", rejected.body);
    assert_eq!(rejected.body["message"], "Expense rejected");

    let processed = app.send("GET", "/api/expenses/processed", Some(&manager1), None).await;
    assert_eq!(processed.body[0]["status"], "Rejected");
    assert_eq!(processed.body[0]["comments"], "Exceeds limit");
    let pending = app.send("GET", "/api/expenses/pending", Some(&manager1), None).await;
    assert_eq!(pending.body, json!([]));

    let again = app.send("POST", &reject_uri, Some(&manager1), None).await;
    assert_eq!(again.status, StatusCode::CONFLICT);
    assert_eq!(again.body["error"], "invalid_transition");

    let missing = app
        .send("POST", "/api/expenses/does-not-exist/approve", Some(&manager1), None)
        .await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn roles_are_confined_to_their_surfaces() {
    let app = test_app();
    let admin = app.admin_session().await;
    app.create_user(&admin, "Mgr", "manager", None).await;
    app.create_user(&admin, "Emp", "employee", None).await;
    let employee = app.staff_session("emp@corp.test").await;
    let manager = app.staff_session("mgr@corp.test").await;

    let reply = app.send("GET", "/api/admin/employees", Some(&employee), None).await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    let reply = app.send("GET", "/api/expenses/pending", Some(&employee), None).await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    let reply = app.send("GET", "/api/expenses/user/me", Some(&manager), None).await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    let reply = app.send("GET", "/api/expenses/pending", Some(&admin), None).await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);

    // Admins use their own login; staff cannot use it
    let reply = app.login("/api/er-login", ADMIN_EMAIL, ADMIN_PASSWORD).await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    assert!(reply.cookie.is_none());
    let reply = app.login("/api/login", "emp@corp.test", STAFF_PASSWORD).await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn failed_logins_look_identical() {
    let app = test_app();
    let admin = app.admin_session().await;
    app.create_user(&admin, "Emp", "employee", None).await;

    let wrong_password = app.login("/api/er-login", "emp@corp.test", "not-the-password").await;
    let unknown_email = app.login("/api/er-login", "ghost@corp.test", "not-the-password").await;

    assert_eq!(wrong_password.status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_password.status, unknown_email.status);
    assert_eq!(wrong_password.body, unknown_email.body);
}

#[tokio::test]
async fn staff_login_returns_profile_and_current_user_tracks_session() {
    let app = test_app();
    let reply = app.send("GET", "/api/user", None, None).await;
    assert_eq!(reply.body, json!({ "user": null }));

    let reply = app
        .send(
            "POST",
            "/api/er-register",
            None,
            Some(json!({
                "name": "Nia",
                "email": "nia@corp.test",
                "password": STAFF_PASSWORD,
                "role": "manager",
            })),
        )
        .await;
    assert_eq!(reply.status, StatusCode::CREATED, "{:?}", reply.body);
    assert_eq!(reply.body["user"]["role"], "manager");

    let login = app.login("/api/er-login", "nia@corp.test", STAFF_PASSWORD).await;
    assert_eq!(login.body["name"], "Nia");
    assert_eq!(login.body["role"], "manager");
    let session = login.cookie.unwrap();
    assert!(session.starts_with("expense_session="));

    let me = app.send("GET", "/api/user", Some(&session), None).await;
    assert_eq!(me.body["user"]["email"], "nia@corp.test");

    let out = app.send("GET", "/api/logout", Some(&session), None).await;
    assert_eq!(out.status, StatusCode::OK);
    assert_eq!(out.body, json!({ "success": true }));

    let me = app.send("GET", "/api/user", Some(&session), None).await;
    assert_eq!(me.body, json!({ "user": null }));
    let reply = app.send("GET", "/api/expenses/pending", Some(&session), None).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);

    // Logging out again, or without any session, is harmless
    let out = app.send("GET", "/api/logout", Some(&session), None).await;
    assert_eq!(out.status, StatusCode::OK);
    let out = app.send("GET", "/api/logout", None, None).await;
    assert_eq!(out.status, StatusCode::OK);
}

#[tokio::test]
async fn registration_rejects_duplicates_and_reports_fields() {
    let app = test_app();
    let body = json!({ "name": "Ola", "email": "ola@corp.test", "password": STAFF_PASSWORD });

    let first = app.send("POST", "/api/register", None, Some(body.clone())).await;
    assert_eq!(first.status, StatusCode::CREATED);
    assert_eq!(first.body["message"], "registered_successfully");

    let second = app.send("POST", "/api/register", None, Some(body)).await;
    assert_eq!(second.status, StatusCode::CONFLICT);
    assert_eq!(second.body["error"], "duplicate_email");

    let invalid = app
        .send("POST", "/api/er-register", None, Some(json!({ "email": "x@corp.test", "role": "admin" })))
        .await;
    assert_eq!(invalid.status, StatusCode::BAD_REQUEST);
    assert_eq!(invalid.body["fields"], json!(["name", "password", "role"]));
}

#[tokio::test]
async fn admin_manages_reporting_lines() {
    let app = test_app();
    let admin = app.admin_session().await;
    let manager = app.create_user(&admin, "Boss", "manager", None).await;
    let manager_id = manager["id"].as_str().unwrap();
    let report = app.create_user(&admin, "Rae", "employee", None).await;
    let report_id = report["id"].as_str().unwrap();

    let bad = app
        .send(
            "PUT",
            &format!("/api/admin/update-role/{report_id}"),
            Some(&admin),
            Some(json!({ "role": "employee", "managerId": report_id })),
        )
        .await;
    assert_eq!(bad.status, StatusCode::BAD_REQUEST);
    assert_eq!(bad.body["error"], "invalid_manager");

    let updated = app
        .send(
            "PUT",
            &format!("/api/admin/update-role/{report_id}"),
            Some(&admin),
            Some(json!({ "role": "employee", "managerId": manager_id })),
        )
        .await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.body["user"]["manager_id"], manager_id);

    let employees = app.send("GET", "/api/admin/employees", Some(&admin), None).await;
    assert_eq!(employees.body[0]["manager_name"], "Boss");
    let managers = app.send("GET", "/api/admin/managers", Some(&admin), None).await;
    assert_eq!(managers.body.as_array().unwrap().len(), 1);

    let deleted = app
        .send("DELETE", &format!("/api/admin/delete-user/{manager_id}"), Some(&admin), None)
        .await;
    assert_eq!(deleted.status, StatusCode::OK);
    assert_eq!(deleted.body["user"]["id"], manager_id);

    let employees = app.send("GET", "/api/admin/employees", Some(&admin), None).await;
    assert_eq!(employees.body[0]["id"], report_id);
    assert_eq!(employees.body[0]["manager_id"], Value::Null);
    assert_eq!(employees.body[0]["manager_name"], Value::Null);

    let missing = app
        .send("DELETE", &format!("/api/admin/delete-user/{manager_id}"), Some(&admin), None)
        .await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_account_cannot_be_deleted() {
    let app = test_app();
    let admin = app.admin_session().await;
    let me = app.send("GET", "/api/user", Some(&admin), None).await;
    let admin_id = me.body["user"]["id"].as_str().unwrap().to_string();

    let reply = app
        .send("DELETE", &format!("/api/admin/delete-user/{admin_id}"), Some(&admin), None)
        .await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn invalid_expense_reports_missing_fields() {
    let app = test_app();
    let admin = app.admin_session().await;
    app.create_user(&admin, "Emp", "employee", None).await;
    let employee = app.staff_session("emp@corp.test").await;

    let reply = app
        .send("POST", "/api/expenses", Some(&employee), Some(json!({ "amount": "-3", "currency": "USD" })))
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["error"], "validation_error");
    assert_eq!(reply.body["fields"], json!(["amount", "category", "description", "date"]));
}

#[tokio::test]
async fn malformed_bodies_are_json_validation_errors() {
    let app = test_app();

    // Wrong type for a known field
    let reply = app
        .send("POST", "/api/er-register", None, Some(json!({ "role": 5 })))
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["error"], "validation_error");
    assert_eq!(reply.body["fields"], json!(["role"]));

    // Missing content type
    let request = Request::builder()
        .method("POST")
        .uri("/api/login")
        .body(Body::from(json!({ "email": ADMIN_EMAIL, "password": ADMIN_PASSWORD }).to_string()))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/json"
    );
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"], "validation_error");
    assert_eq!(body["fields"], json!(["body"]));

    // Truncated JSON
    let request = Request::builder()
        .method("POST")
        .uri("/api/register")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"name":"A""#))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"], "validation_error");
    assert_eq!(body["fields"], json!(["body"]));
}

#[tokio::test]
async fn sign_up_country_is_returned_with_the_account() {
    let app = test_app();
    let reply = app
        .send(
            "POST",
            "/api/register",
            None,
            Some(json!({
                "name": "Kofi",
                "email": "kofi@corp.test",
                "password": STAFF_PASSWORD,
                "country": "Ghana",
            })),
        )
        .await;
    assert_eq!(reply.status, StatusCode::CREATED);

    let login = app.login("/api/er-login", "kofi@corp.test", STAFF_PASSWORD).await;
    let session = login.cookie.unwrap();
    let me = app.send("GET", "/api/user", Some(&session), None).await;
    assert_eq!(me.body["user"]["country"], "Ghana");
}
