use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use sqlx::{Pool, Sqlite};
use tower::ServiceExt;

use mindcare_portal::{
    api::{create_router, AppState, RateLimiter},
    config::Config,
    crypto::hash_password,
    db::{self, users::NewUser, Role, UserRepository},
};

const PASSWORD: &str = "correct horse battery";

struct TestApp {
    router: Router,
    pool: Pool<Sqlite>,
    upload_dir: PathBuf,
}

impl TestApp {
    async fn new() -> Self {
        Self::with_auth_limit(1000).await
    }

    async fn with_auth_limit(auth_limit: u32) -> Self {
        let pool = db::connect_in_memory().await.unwrap();
        let upload_dir = std::env::temp_dir().join(format!("mindcare-test-{}", uuid::Uuid::new_v4()));

        let config = Config {
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            database_url: "sqlite::memory:".to_string(),
            db_max_connections: 1,
            db_min_connections: 1,
            jwt_secret: "integration-test-secret-that-is-long-enough".to_string(),
            jwt_expiry_hours: 1,
            upload_dir: upload_dir.to_string_lossy().into_owned(),
            max_upload_bytes: 1024 * 1024,
            request_timeout_secs: 30,
            auth_rate_limit_per_minute: auth_limit,
            bootstrap_admin: None,
        };

        let state = AppState::new(pool.clone(), Arc::new(config));
        let router = create_router(state, Arc::new(RateLimiter::new(auth_limit, 60)));

        Self {
            router,
            pool,
            upload_dir,
        }
    }

    async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }

        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();

        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };

        (status, body)
    }

    /// Self-register a patient and return (user_id, token)
    async fn register_patient(&self, username: &str) -> (i64, String) {
        let (status, body) = self
            .request(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({
                    "username": username,
                    "email": format!("{}@example.com", username),
                    "password": PASSWORD,
                    "full_name": format!("{} Patient", username),
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);

        (
            body["user"]["user_id"].as_i64().unwrap(),
            body["token"].as_str().unwrap().to_string(),
        )
    }

    async fn login(&self, login: &str) -> String {
        let (status, body) = self
            .request(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({ "login": login, "password": PASSWORD })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);

        body["token"].as_str().unwrap().to_string()
    }

    /// Admin accounts are never self-registered; seed one directly
    async fn admin_token(&self) -> String {
        UserRepository::create(
            &self.pool,
            NewUser {
                username: "root".to_string(),
                email: "root@example.com".to_string(),
                password_hash: hash_password(PASSWORD).unwrap(),
                full_name: "Root Admin".to_string(),
                role: Role::Admin,
                phone: None,
            },
            None,
        )
        .await
        .unwrap();

        self.login("root").await
    }

    /// Create a psychiatrist through the admin API and return (user_id, token)
    async fn provider(&self, admin_token: &str, username: &str) -> (i64, String) {
        let (status, body) = self
            .request(
                Method::POST,
                "/api/users",
                Some(admin_token),
                Some(json!({
                    "username": username,
                    "email": format!("{}@clinic.example.com", username),
                    "password": PASSWORD,
                    "full_name": format!("Dr {}", username),
                    "role": "psychiatrist",
                    "profile": { "specialization": "Mood disorders", "years_experience": 12 },
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        assert_eq!(body["profile"]["specialization"], "Mood disorders");

        (body["user_id"].as_i64().unwrap(), self.login(username).await)
    }
}

fn future_date(days: i64) -> String {
    (chrono::Utc::now().date_naive() + chrono::Duration::days(days))
        .format("%Y-%m-%d")
        .to_string()
}

#[tokio::test]
async fn health_reports_database() {
    let app = TestApp::new().await;

    let (status, body) = app.request(Method::GET, "/api/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "up");
}

#[tokio::test]
async fn register_login_and_me() {
    let app = TestApp::new().await;
    let (user_id, token) = app.register_patient("alice").await;

    let (status, me) = app.request(Method::GET, "/api/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["user_id"], user_id);
    assert_eq!(me["role"], "patient");
    assert!(me.get("password_hash").is_none());

    // Email works as the login identifier too
    app.login("alice@example.com").await;

    let (status, _) = app
        .request(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "login": "alice", "password": "wrong password" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.request(Method::GET, "/api/auth/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .request(Method::GET, "/api/auth/me", Some("not-a-jwt"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn registration_rules() {
    let app = TestApp::new().await;
    app.register_patient("alice").await;

    let (status, body) = app
        .request(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({
                "username": "alice",
                "email": "other@example.com",
                "password": PASSWORD,
                "full_name": "Second Alice",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].is_string());

    let (status, _) = app
        .request(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({
                "username": "drwho",
                "email": "drwho@example.com",
                "password": PASSWORD,
                "full_name": "Not A Doctor",
                "role": "psychiatrist",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .request(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({
                "username": "shorty",
                "email": "shorty@example.com",
                "password": "short",
                "full_name": "Short Password",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn admin_routes_require_admin() {
    let app = TestApp::new().await;
    let (_, patient) = app.register_patient("alice").await;

    let (status, _) = app.request(Method::GET, "/api/users", Some(&patient), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .request(Method::GET, "/api/admin/analytics", Some(&patient), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = app.admin_token().await;
    let (provider_id, _) = app.provider(&admin, "house").await;

    let (status, analytics) = app
        .request(Method::GET, "/api/admin/analytics", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(analytics["users"]["total"], 3);
    assert_eq!(analytics["users"]["by_role"]["psychiatrist"], 1);

    let (status, providers) = app
        .request(Method::GET, "/api/providers", Some(&patient), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(providers[0]["user_id"], provider_id);
}

#[tokio::test]
async fn appointment_booking_and_status_workflow() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let (provider_id, provider) = app.provider(&admin, "house").await;
    let (_, alice) = app.register_patient("alice").await;
    let (_, bob) = app.register_patient("bob").await;

    let booking = json!({
        "provider_id": provider_id,
        "appointment_date": future_date(7),
        "appointment_time": "10:00:00",
        "type": "therapy",
    });

    let (status, appointment) = app
        .request(Method::POST, "/api/appointments", Some(&alice), Some(booking.clone()))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", appointment);
    assert_eq!(appointment["status"], "pending");
    assert_eq!(appointment["duration_minutes"], 60);
    let id = appointment["appointment_id"].as_i64().unwrap();

    // Same provider, same slot
    let (status, _) = app
        .request(Method::POST, "/api/appointments", Some(&bob), Some(booking))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let uri = format!("/api/appointments/{}", id);

    let (status, _) = app.request(Method::GET, &uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .request(Method::PATCH, &uri, Some(&alice), Some(json!({ "status": "confirmed" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .request(Method::PATCH, &uri, Some(&provider), Some(json!({ "status": "confirmed" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "confirmed");

    let (status, _) = app
        .request(Method::PATCH, &uri, Some(&provider), Some(json!({ "status": "pending" })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = app
        .request(Method::PATCH, &uri, Some(&provider), Some(json!({ "status": "completed" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");

    let (status, _) = app
        .request(Method::PATCH, &uri, Some(&alice), Some(json!({ "status": "cancelled" })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, list) = app
        .request(Method::GET, "/api/appointments", Some(&provider), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);

    let (status, list) = app
        .request(Method::GET, "/api/appointments", Some(&bob), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(list.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn cancelled_slot_can_be_rebooked() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let (provider_id, _) = app.provider(&admin, "house").await;
    let (_, alice) = app.register_patient("alice").await;
    let (_, bob) = app.register_patient("bob").await;

    let booking = json!({
        "provider_id": provider_id,
        "appointment_date": future_date(3),
        "appointment_time": "14:30:00",
        "type": "consultation",
    });

    let (_, appointment) = app
        .request(Method::POST, "/api/appointments", Some(&alice), Some(booking.clone()))
        .await;
    let uri = format!("/api/appointments/{}", appointment["appointment_id"]);

    let (status, _) = app
        .request(Method::PATCH, &uri, Some(&alice), Some(json!({ "status": "cancelled" })))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .request(Method::POST, "/api/appointments", Some(&bob), Some(booking))
        .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn messaging_and_unread_count() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let (provider_id, provider) = app.provider(&admin, "house").await;
    let (alice_id, alice) = app.register_patient("alice").await;
    let (_, bob) = app.register_patient("bob").await;

    let (status, message) = app
        .request(
            Method::POST,
            "/api/messages",
            Some(&alice),
            Some(json!({ "receiver_id": provider_id, "content": "Can we talk about my sleep?" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", message);
    let conversation_id = message["conversation_id"].as_i64().unwrap();

    // Patients cannot message each other
    let (status, _) = app
        .request(
            Method::POST,
            "/api/messages",
            Some(&bob),
            Some(json!({ "receiver_id": alice_id, "content": "hi" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, unread) = app
        .request(Method::GET, "/api/messages/unread-count", Some(&provider), None)
        .await;
    assert_eq!(unread["unread"], 1);

    let (status, conversations) = app
        .request(Method::GET, "/api/messages/conversations", Some(&provider), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(conversations[0]["other_user_id"], alice_id);
    assert_eq!(conversations[0]["unread_count"], 1);

    let uri = format!("/api/messages/conversations/{}", conversation_id);

    let (status, _) = app.request(Method::GET, &uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, messages) = app.request(Method::GET, &uri, Some(&provider), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(messages.as_array().unwrap().len(), 1);
    assert_eq!(messages[0]["content"], "Can we talk about my sleep?");
    assert_eq!(messages[0]["is_read"], true);

    let (_, unread) = app
        .request(Method::GET, "/api/messages/unread-count", Some(&provider), None)
        .await;
    assert_eq!(unread["unread"], 0);

    // Only the receiver may mark a message read
    let (status, _) = app
        .request(
            Method::PATCH,
            &format!("/api/messages/{}/read", message["message_id"]),
            Some(&alice),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn mood_tracking_respects_care_relationship() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let (provider_id, provider) = app.provider(&admin, "house").await;
    let (alice_id, alice) = app.register_patient("alice").await;

    for score in [4, 6] {
        let (status, body) = app
            .request(
                Method::POST,
                "/api/mood",
                Some(&alice),
                Some(json!({
                    "mood_score": score,
                    "anxiety_level": 5,
                    "sleep_hours": 7.5,
                    "activities": ["walk", "journaling"],
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
    }

    let (status, _) = app
        .request(Method::POST, "/api/mood", Some(&alice), Some(json!({ "mood_score": 11 })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .request(Method::POST, "/api/mood", Some(&provider), Some(json!({ "mood_score": 5 })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, summary) = app
        .request(Method::GET, "/api/mood/summary", Some(&alice), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["entries"], 2);
    assert_eq!(summary["trend"], "insufficient_data");

    let uri = format!("/api/mood?patient_id={}", alice_id);

    let (status, _) = app.request(Method::GET, &uri, Some(&provider), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    app.request(
        Method::POST,
        "/api/appointments",
        Some(&alice),
        Some(json!({
            "provider_id": provider_id,
            "appointment_date": future_date(2),
            "appointment_time": "09:00:00",
            "type": "consultation",
        })),
    )
    .await;

    let (status, entries) = app.request(Method::GET, &uri, Some(&provider), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(entries.as_array().unwrap().len(), 2);
    assert_eq!(entries[0]["activities"][0], "walk");
}

#[tokio::test]
async fn community_hides_anonymous_authors() {
    let app = TestApp::new().await;
    let (alice_id, alice) = app.register_patient("alice").await;
    let (_, bob) = app.register_patient("bob").await;

    let (status, post) = app
        .request(
            Method::POST,
            "/api/community/posts",
            Some(&alice),
            Some(json!({
                "title": "Panic at night",
                "content": "Does anyone else wake up anxious?",
                "category": "Anxiety",
                "is_anonymous": true,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", post);
    assert_eq!(post["is_own"], true);
    assert_eq!(post["category"], "anxiety");
    let uri = format!("/api/community/posts/{}", post["post_id"]);

    let (status, seen) = app.request(Method::GET, &uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(seen["author_name"], "Anonymous");
    assert!(seen["author_id"].is_null());
    assert_ne!(seen["author_id"], alice_id);
    assert_eq!(seen["is_own"], false);

    let (status, _) = app
        .request(Method::PUT, &uri, Some(&bob), Some(json!({ "title": "Hijacked" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, like) = app
        .request(Method::POST, &format!("{}/like", uri), Some(&bob), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(like, json!({ "liked": true, "likes": 1 }));

    let (status, comment) = app
        .request(
            Method::POST,
            &format!("{}/comments", uri),
            Some(&bob),
            Some(json!({ "content": "Yes, breathing exercises help me." })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(comment["author_name"], "bob Patient");

    let (_, detail) = app.request(Method::GET, &uri, Some(&alice), None).await;
    assert_eq!(detail["comments"].as_array().unwrap().len(), 1);
    assert_eq!(detail["like_count"], 1);

    let (status, _) = app.request(Method::DELETE, &uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.request(Method::GET, &uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn resource_upload_and_download() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let (_, provider) = app.provider(&admin, "house").await;
    let (_, alice) = app.register_patient("alice").await;

    let (status, _) = app
        .request(
            Method::POST,
            "/api/resources",
            Some(&alice),
            Some(json!({ "title": "x", "category": "sleep", "resource_type": "article" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .request(
            Method::POST,
            "/api/resources",
            Some(&provider),
            Some(json!({ "title": "Guided video", "category": "sleep", "resource_type": "video" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, resource) = app
        .request(
            Method::POST,
            "/api/resources",
            Some(&provider),
            Some(json!({
                "title": "Thought record",
                "description": "CBT worksheet",
                "category": "CBT",
                "resource_type": "worksheet",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", resource);
    let id = resource["resource_id"].as_i64().unwrap();

    let (status, _) = app
        .request(Method::GET, &format!("/api/resources/{}/download", id), Some(&alice), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let boundary = "mindcare-boundary";
    let multipart = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"record.txt\"\r\nContent-Type: text/plain\r\n\r\nSituation, thought, feeling\r\n--{b}--\r\n",
        b = boundary
    );
    let upload = Request::builder()
        .method(Method::POST)
        .uri(format!("/api/resources/{}/file", id))
        .header(header::AUTHORIZATION, format!("Bearer {}", provider))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", boundary),
        )
        .body(Body::from(multipart))
        .unwrap();

    let (status, uploaded) = app.send(upload).await;
    assert_eq!(status, StatusCode::OK, "{}", uploaded);
    assert_eq!(uploaded["file_name"], "record.txt");
    assert_eq!(uploaded["file_size"], 27);
    assert!(uploaded.get("stored_name").is_none());

    let download = Request::builder()
        .uri(format!("/api/resources/{}/download", id))
        .header(header::AUTHORIZATION, format!("Bearer {}", alice))
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(download).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"record.txt\""
    );
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"Situation, thought, feeling");

    let (status, listed) = app
        .request(Method::GET, "/api/resources?category=cbt", Some(&alice), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn clinical_records_are_provider_only() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let (provider_id, provider) = app.provider(&admin, "house").await;
    let (alice_id, alice) = app.register_patient("alice").await;

    let note = json!({
        "patient_id": alice_id,
        "note_type": "assessment",
        "content": "Reports low mood for two weeks.",
        "diagnosis": "Adjustment disorder",
    });

    // No appointment yet, so no care relationship
    let (status, _) = app
        .request(Method::POST, "/api/clinical-notes", Some(&provider), Some(note.clone()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, appointment) = app
        .request(
            Method::POST,
            "/api/appointments",
            Some(&alice),
            Some(json!({
                "provider_id": provider_id,
                "appointment_date": future_date(1),
                "appointment_time": "11:00:00",
                "type": "consultation",
            })),
        )
        .await;
    assert!(appointment["appointment_id"].is_i64());

    let (status, created) = app
        .request(Method::POST, "/api/clinical-notes", Some(&provider), Some(note))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", created);

    let (status, _) = app
        .request(Method::GET, "/api/clinical-notes", Some(&alice), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .request(
            Method::GET,
            &format!("/api/clinical-notes/{}", created["note_id"]),
            Some(&alice),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, plan) = app
        .request(
            Method::POST,
            "/api/treatment-plans",
            Some(&provider),
            Some(json!({
                "patient_id": alice_id,
                "title": "Behavioural activation",
                "goals": "Two pleasant activities per day",
                "start_date": future_date(1),
                "end_date": future_date(60),
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", plan);
    assert_eq!(plan["status"], "active");

    let (status, plans) = app
        .request(Method::GET, "/api/treatment-plans", Some(&alice), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(plans.as_array().unwrap().len(), 1);

    let (status, _) = app
        .request(
            Method::PUT,
            &format!("/api/treatment-plans/{}", plan["plan_id"]),
            Some(&alice),
            Some(json!({ "status": "completed" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn change_password_requires_current_password() {
    let app = TestApp::new().await;
    let (_, token) = app.register_patient("alice").await;

    let (status, _) = app
        .request(
            Method::POST,
            "/api/auth/change-password",
            Some(&token),
            Some(json!({ "current_password": "not my password", "new_password": "brand new secret" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .request(
            Method::POST,
            "/api/auth/change-password",
            Some(&token),
            Some(json!({ "current_password": PASSWORD, "new_password": "brand new secret" })),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app
        .request(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "login": "alice", "password": PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .request(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "login": "alice", "password": "brand new secret" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["token"].is_string());
}

#[tokio::test]
async fn admin_cannot_demote_or_deactivate_self() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let (_, me) = app.request(Method::GET, "/api/auth/me", Some(&admin), None).await;
    let uri = format!("/api/users/{}", me["user_id"]);

    let (status, _) = app
        .request(Method::PATCH, &uri, Some(&admin), Some(json!({ "role": "counselor" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .request(Method::PATCH, &uri, Some(&admin), Some(json!({ "is_active": false })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .request(Method::PATCH, &uri, Some(&admin), Some(json!({ "full_name": "Head Admin" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "admin");
    assert_eq!(body["is_active"], true);
}

#[tokio::test]
async fn deactivated_account_loses_access() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let (alice_id, alice) = app.register_patient("alice").await;

    let (status, _) = app.request(Method::GET, "/api/auth/me", Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .request(
            Method::PATCH,
            &format!("/api/users/{}", alice_id),
            Some(&admin),
            Some(json!({ "is_active": false })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    // The token is still well-formed and unexpired
    let (status, _) = app.request(Method::GET, "/api/auth/me", Some(&alice), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn auth_endpoints_are_rate_limited() {
    let app = TestApp::with_auth_limit(3).await;
    app.register_patient("alice").await;

    let wrong_login = json!({ "login": "alice", "password": "wrong password" });
    for _ in 0..2 {
        let (status, _) = app
            .request(Method::POST, "/api/auth/login", None, Some(wrong_login.clone()))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    let (status, _) = app
        .request(Method::POST, "/api/auth/login", None, Some(wrong_login))
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    let (status, _) = app
        .request(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({
                "username": "bob",
                "email": "bob@example.com",
                "password": PASSWORD,
                "full_name": "Bob Patient",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    // Only the credential endpoints are limited
    let (status, _) = app.request(Method::GET, "/api/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn reschedule_resets_status_and_respects_slots() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let (provider_id, provider) = app.provider(&admin, "house").await;
    let (_, alice) = app.register_patient("alice").await;
    let (_, bob) = app.register_patient("bob").await;

    let slot = |time: &str| {
        json!({
            "provider_id": provider_id,
            "appointment_date": future_date(5),
            "appointment_time": time,
            "type": "therapy",
        })
    };
    let (_, mine) = app
        .request(Method::POST, "/api/appointments", Some(&alice), Some(slot("10:00:00")))
        .await;
    let (status, _) = app
        .request(Method::POST, "/api/appointments", Some(&bob), Some(slot("11:00:00")))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let uri = format!("/api/appointments/{}", mine["appointment_id"]);

    let (status, _) = app
        .request(Method::PATCH, &uri, Some(&provider), Some(json!({ "status": "confirmed" })))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .request(
            Method::PATCH,
            &uri,
            Some(&alice),
            Some(json!({ "appointment_time": "11:00:00" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, moved) = app
        .request(
            Method::PATCH,
            &uri,
            Some(&alice),
            Some(json!({ "appointment_date": future_date(6), "appointment_time": "15:00:00" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", moved);
    assert_eq!(moved["status"], "pending");
    assert_eq!(moved["appointment_date"], future_date(6));

    let (status, _) = app
        .request(Method::PATCH, &uri, Some(&alice), Some(json!({ "status": "cancelled" })))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .request(
            Method::PATCH,
            &uri,
            Some(&alice),
            Some(json!({ "appointment_date": future_date(8) })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, stored) = app.request(Method::GET, &uri, Some(&alice), None).await;
    assert_eq!(stored["status"], "cancelled");
}

#[tokio::test]
async fn racing_status_changes_keep_a_single_outcome() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let (provider_id, provider) = app.provider(&admin, "house").await;
    let (_, alice) = app.register_patient("alice").await;

    let (_, appointment) = app
        .request(
            Method::POST,
            "/api/appointments",
            Some(&alice),
            Some(json!({
                "provider_id": provider_id,
                "appointment_date": future_date(4),
                "appointment_time": "09:30:00",
                "type": "therapy",
            })),
        )
        .await;
    let uri = format!("/api/appointments/{}", appointment["appointment_id"]);
    app.request(Method::PATCH, &uri, Some(&provider), Some(json!({ "status": "confirmed" })))
        .await;

    let ((completed, _), (cancelled, _)) = tokio::join!(
        app.request(Method::PATCH, &uri, Some(&provider), Some(json!({ "status": "completed" }))),
        app.request(Method::PATCH, &uri, Some(&alice), Some(json!({ "status": "cancelled" }))),
    );

    let outcomes = [completed, cancelled];
    assert_eq!(outcomes.iter().filter(|s| **s == StatusCode::OK).count(), 1);
    assert_eq!(outcomes.iter().filter(|s| **s == StatusCode::CONFLICT).count(), 1);

    let (_, stored) = app.request(Method::GET, &uri, Some(&alice), None).await;
    let expected = if completed == StatusCode::OK { "completed" } else { "cancelled" };
    assert_eq!(stored["status"], expected);
}

#[tokio::test]
async fn oversized_upload_is_rejected_and_removed() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let (_, provider) = app.provider(&admin, "house").await;

    let (_, resource) = app
        .request(
            Method::POST,
            "/api/resources",
            Some(&provider),
            Some(json!({ "title": "Sleep diary", "category": "sleep", "resource_type": "worksheet" })),
        )
        .await;

    let boundary = "mindcare-boundary";
    let mut multipart = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"diary.bin\"\r\nContent-Type: application/octet-stream\r\n\r\n",
        b = boundary
    )
    .into_bytes();
    multipart.extend(std::iter::repeat(b'x').take(1024 * 1024 + 1));
    multipart.extend(format!("\r\n--{}--\r\n", boundary).into_bytes());

    let upload = Request::builder()
        .method(Method::POST)
        .uri(format!("/api/resources/{}/file", resource["resource_id"]))
        .header(header::AUTHORIZATION, format!("Bearer {}", provider))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", boundary),
        )
        .body(Body::from(multipart))
        .unwrap();

    let (status, _) = app.send(upload).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let leftovers = match std::fs::read_dir(&app.upload_dir) {
        Ok(entries) => entries.count(),
        Err(_) => 0,
    };
    assert_eq!(leftovers, 0);

    let (_, stored) = app
        .request(
            Method::GET,
            &format!("/api/resources/{}", resource["resource_id"]),
            Some(&provider),
            None,
        )
        .await;
    assert!(stored["file_name"].is_null());
}

#[tokio::test]
async fn resource_update_can_clear_description_and_url() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let (_, provider) = app.provider(&admin, "house").await;

    let (status, resource) = app
        .request(
            Method::POST,
            "/api/resources",
            Some(&provider),
            Some(json!({
                "title": "Crisis lines",
                "description": "Phone numbers",
                "category": "crisis",
                "resource_type": "article",
                "url": "https://example.org/crisis",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", resource);
    let uri = format!("/api/resources/{}", resource["resource_id"]);

    let (status, updated) = app
        .request(Method::PUT, &uri, Some(&provider), Some(json!({ "title": "Crisis support" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["description"], "Phone numbers");
    assert_eq!(updated["url"], "https://example.org/crisis");

    let (status, cleared) = app
        .request(
            Method::PUT,
            &uri,
            Some(&provider),
            Some(json!({ "description": "", "url": "" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", cleared);
    assert!(cleared["description"].is_null());
    assert!(cleared["url"].is_null());

    // A link must keep its url
    let (status, _) = app
        .request(
            Method::PUT,
            &uri,
            Some(&provider),
            Some(json!({ "resource_type": "link" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
