use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    routing::get,
    Router,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use time::{Duration as TimeDuration, OffsetDateTime};
use tower::ServiceExt;
use uuid::Uuid;

use super::{build_app, with_middleware};
use crate::{
    auth::jwt::Claims,
    config::{AppConfig, Environment},
    movies::repo_types::NewMovie,
    state::AppState,
};

fn test_state() -> AppState {
    AppState::in_memory(AppConfig::for_tests()).expect("state")
}

struct Reply {
    status: StatusCode,
    headers: axum::http::HeaderMap,
    body: Value,
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Reply {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(t) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {t}"));
    }
    let req = match body {
        Some(b) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let headers = res.headers().clone();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    Reply {
        status,
        headers,
        body,
    }
}

async fn register(app: &Router, username: &str, email: &str, role: &str) -> (Value, String) {
    let reply = send(
        app,
        Method::POST,
        "/api/v1/auth/register",
        None,
        Some(json!({
            "username": username,
            "email": email,
            "password": "password123",
            "role": role,
        })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);
    let token = reply.body["data"]["token"].as_str().unwrap().to_string();
    (reply.body["data"]["user"].clone(), token)
}

async fn admin_token(app: &Router) -> String {
    register(app, "admin", "admin@example.com", "admin").await.1
}

async fn user_token(app: &Router) -> String {
    register(app, "viewer", "viewer@example.com", "user").await.1
}

fn inception() -> Value {
    json!({ "title": "Inception", "genre": "Sci-Fi", "year": 2010, "rating": 8.8 })
}

#[tokio::test]
async fn root_health_and_unknown_routes() {
    let app = build_app(test_state());

    let reply = send(&app, Method::GET, "/", None, None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, json!("Movie API is running"));

    let reply = send(&app, Method::GET, "/api/v1/health", None, None).await;
    assert_eq!(reply.status, StatusCode::OK);

    let reply = send(&app, Method::GET, "/api/v1/nothing-here", None, None).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.body["message"], "Route not found");
    assert_eq!(reply.body["success"], false);
}

#[tokio::test]
async fn security_headers_are_set() {
    let app = build_app(test_state());
    let reply = send(&app, Method::GET, "/", None, None).await;
    assert_eq!(reply.headers["x-content-type-options"], "nosniff");
    assert_eq!(reply.headers["x-frame-options"], "DENY");
    assert_eq!(reply.headers["referrer-policy"], "no-referrer");
}

#[tokio::test]
async fn register_returns_token_for_the_created_user() {
    let state = test_state();
    let app = build_app(state.clone());

    let reply = send(
        &app,
        Method::POST,
        "/api/v1/auth/register",
        None,
        Some(json!({
            "username": "ann",
            "email": "Ann@Example.com",
            "password": "password123",
        })),
    )
    .await;

    assert_eq!(reply.status, StatusCode::CREATED);
    assert_eq!(reply.body["success"], true);
    assert_eq!(reply.body["message"], "User registered successfully");
    let user = &reply.body["data"]["user"];
    assert_eq!(user["email"], "ann@example.com");
    assert_eq!(user["role"], "user");
    assert!(user.get("password").is_none());
    assert!(user.get("passwordHash").is_none());

    let token = reply.body["data"]["token"].as_str().unwrap();
    let claims = state.jwt.verify(token).expect("token verifies");
    assert_eq!(claims.sub.to_string(), user["id"].as_str().unwrap());
}

#[tokio::test]
async fn duplicate_email_or_username_is_rejected() {
    let app = build_app(test_state());
    register(&app, "ann", "ann@example.com", "user").await;

    for body in [
        json!({ "username": "other", "email": "ann@example.com", "password": "password123" }),
        json!({ "username": "ann", "email": "other@example.com", "password": "password123" }),
    ] {
        let reply = send(&app, Method::POST, "/api/v1/auth/register", None, Some(body)).await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert!(reply.body["message"]
            .as_str()
            .unwrap()
            .contains("already exists"));
    }
}

#[tokio::test]
async fn register_validates_every_field_at_once() {
    let app = build_app(test_state());
    let reply = send(
        &app,
        Method::POST,
        "/api/v1/auth/register",
        None,
        Some(json!({ "username": "", "email": "nope", "password": "short", "role": "root" })),
    )
    .await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    let message = reply.body["message"].as_str().unwrap();
    assert!(message.starts_with("Invalid input data."));
    assert!(message.contains("\"username\""));
    assert!(message.contains("\"email\""));
    assert!(message.contains("\"password\""));
    assert!(message.contains("\"role\""));
    assert_eq!(reply.body["errors"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn login_never_distinguishes_unknown_email_from_bad_password() {
    let app = build_app(test_state());
    register(&app, "ann", "ann@example.com", "user").await;

    let reply = send(
        &app,
        Method::POST,
        "/api/v1/auth/login",
        None,
        Some(json!({ "email": "ann@example.com", "password": "password123" })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["data"]["user"]["username"], "ann");
    assert!(reply.body["data"]["token"].as_str().is_some());

    let reply = send(
        &app,
        Method::POST,
        "/api/v1/auth/login",
        None,
        Some(json!({ "email": "ann@example.com", "password": "wrong-password" })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.body["message"], "Invalid credentials");

    let reply = send(
        &app,
        Method::POST,
        "/api/v1/auth/login",
        None,
        Some(json!({ "email": "ghost@example.com", "password": "password123" })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.body["message"], "Invalid credentials");

    let reply = send(
        &app,
        Method::POST,
        "/api/v1/auth/login",
        None,
        Some(json!({ "email": "ann@example.com" })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["message"], "Please provide an email and password");
}

#[tokio::test]
async fn protected_routes_require_a_valid_token() {
    let state = test_state();
    let app = build_app(state.clone());
    let id = Uuid::new_v4();

    let expired = {
        let past = OffsetDateTime::now_utc() - TimeDuration::hours(2);
        let claims = Claims {
            sub: Uuid::new_v4(),
            iat: past.unix_timestamp() as usize,
            exp: (past + TimeDuration::minutes(5)).unix_timestamp() as usize,
            iss: state.config.jwt.issuer.clone(),
            aud: state.config.jwt.audience.clone(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(state.config.jwt.secret.as_bytes()),
        )
        .unwrap()
    };
    let orphan = state.jwt.sign(Uuid::new_v4()).unwrap();

    let routes = [
        (Method::GET, "/api/v1/movies".to_string()),
        (Method::POST, "/api/v1/movies".to_string()),
        (Method::GET, format!("/api/v1/movies/{id}")),
        (Method::PUT, format!("/api/v1/movies/{id}")),
        (Method::DELETE, format!("/api/v1/movies/{id}")),
        (Method::GET, "/api/v1/movies/find?q=x".to_string()),
        (Method::GET, "/api/v1/auth/me".to_string()),
    ];

    for (method, uri) in routes {
        for token in [None, Some("garbage"), Some(expired.as_str()), Some(orphan.as_str())] {
            let body = matches!(method, Method::POST | Method::PUT).then(inception);
            let reply = send(&app, method.clone(), &uri, token, body).await;
            assert_eq!(
                reply.status,
                StatusCode::UNAUTHORIZED,
                "{method} {uri} with {token:?}"
            );
        }
    }
}

#[tokio::test]
async fn writes_are_admin_only() {
    let state = test_state();
    let app = build_app(state.clone());
    let user = user_token(&app).await;
    let admin = admin_token(&app).await;
    let existing = state
        .movies
        .create(NewMovie {
            title: "Heat".into(),
            genre: "Crime".into(),
            year: 1995,
            rating: 8.3,
        })
        .await
        .unwrap();
    let uri = format!("/api/v1/movies/{}", existing.id);

    let reply = send(&app, Method::POST, "/api/v1/movies", Some(&user), Some(inception())).await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    assert_eq!(
        reply.body["message"],
        "User role user is not authorized to access this route"
    );
    // The role gate runs before body validation.
    let reply = send(&app, Method::POST, "/api/v1/movies", Some(&user), Some(json!({}))).await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    let reply = send(&app, Method::PUT, &uri, Some(&user), Some(json!({ "rating": 1 }))).await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    let reply = send(&app, Method::DELETE, &uri, Some(&user), None).await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);

    // Reads are open to any authenticated role.
    let reply = send(&app, Method::GET, &uri, Some(&user), None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["data"]["title"], "Heat");

    let reply = send(&app, Method::POST, "/api/v1/movies", Some(&admin), Some(inception())).await;
    assert_eq!(reply.status, StatusCode::CREATED);
    let reply = send(&app, Method::PUT, &uri, Some(&admin), Some(json!({ "rating": 9 }))).await;
    assert_eq!(reply.status, StatusCode::OK);
    let reply = send(&app, Method::DELETE, &uri, Some(&admin), None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["data"], Value::Null);
    assert_eq!(reply.body["message"], "Movie deleted successfully");
}

#[tokio::test]
async fn create_then_find_by_title_substring() {
    let app = build_app(test_state());
    let admin = admin_token(&app).await;

    let reply = send(&app, Method::POST, "/api/v1/movies", Some(&admin), Some(inception())).await;
    assert_eq!(reply.status, StatusCode::CREATED);
    let movie = &reply.body["data"];
    assert_eq!(movie["title"], "Inception");
    assert_eq!(movie["genre"], "Sci-Fi");
    assert_eq!(movie["year"], 2010);
    assert_eq!(movie["rating"], 8.8);
    assert!(Uuid::parse_str(movie["id"].as_str().unwrap()).is_ok());
    assert!(movie["createdAt"].as_str().is_some());
    assert!(movie["updatedAt"].as_str().is_some());
    let id = movie["id"].as_str().unwrap().to_string();

    let reply = send(&app, Method::GET, "/api/v1/movies/find?q=incep", Some(&admin), None).await;
    assert_eq!(reply.status, StatusCode::OK);
    let found = reply.body["data"].as_array().expect("title search yields a list");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["id"], id.as_str());

    let reply = send(
        &app,
        Method::GET,
        &format!("/api/v1/movies/find?q={id}"),
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["data"]["id"], id.as_str());
}

#[tokio::test]
async fn find_reports_missing_and_unmatched_queries() {
    let app = build_app(test_state());
    let admin = admin_token(&app).await;
    send(&app, Method::POST, "/api/v1/movies", Some(&admin), Some(inception())).await;

    let reply = send(&app, Method::GET, "/api/v1/movies/find", Some(&admin), None).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["message"], "Query parameter 'q' is required");

    let reply = send(&app, Method::GET, "/api/v1/movies/find?q=%20%20", Some(&admin), None).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let uri = format!("/api/v1/movies/find?q={}", Uuid::new_v4());
    let reply = send(&app, Method::GET, &uri, Some(&admin), None).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);

    let reply = send(&app, Method::GET, "/api/v1/movies/find?q=zzz", Some(&admin), None).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.body["message"], "No movies found matching your query");
}

#[tokio::test]
async fn create_rejects_out_of_range_fields_by_name() {
    let app = build_app(test_state());
    let admin = admin_token(&app).await;

    let reply = send(
        &app,
        Method::POST,
        "/api/v1/movies",
        Some(&admin),
        Some(json!({ "title": "Old", "genre": "Silent", "year": 1700, "rating": 5 })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert!(reply.body["message"].as_str().unwrap().contains("\"year\""));

    for rating in [-0.5, 10.1] {
        let reply = send(
            &app,
            Method::POST,
            "/api/v1/movies",
            Some(&admin),
            Some(json!({ "title": "X", "genre": "Y", "year": 2000, "rating": rating })),
        )
        .await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert!(reply.body["message"].as_str().unwrap().contains("\"rating\""));
    }

    let reply = send(&app, Method::POST, "/api/v1/movies", Some(&admin), Some(json!({}))).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    let message = reply.body["message"].as_str().unwrap();
    for field in ["title", "genre", "year", "rating"] {
        assert!(message.contains(&format!("\"{field}\" is required")), "{message}");
    }
}

#[tokio::test]
async fn malformed_json_goes_through_the_error_layer() {
    let state = test_state();
    let app = build_app(state.clone());
    let admin = admin_token(&app).await;

    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/movies")
        .header(header::AUTHORIZATION, format!("Bearer {admin}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{ not json"))
        .unwrap();
    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["success"], false);
    assert!(body["message"].as_str().is_some());
}

#[tokio::test]
async fn pagination_uses_ceiling_pages_and_empty_tail() {
    let state = test_state();
    let app = build_app(state.clone());
    let token = user_token(&app).await;
    for i in 0..25 {
        state
            .movies
            .create(NewMovie {
                title: format!("Movie {i}"),
                genre: "Drama".into(),
                year: 2000,
                rating: 5.0,
            })
            .await
            .unwrap();
    }

    let reply = send(&app, Method::GET, "/api/v1/movies?page=3&limit=10", Some(&token), None).await;
    assert_eq!(reply.status, StatusCode::OK);
    let data = &reply.body["data"];
    assert_eq!(data["movies"].as_array().unwrap().len(), 5);
    assert_eq!(data["currentPage"], 3);
    assert_eq!(data["totalPages"], 3);
    assert_eq!(data["totalMovies"], 25);

    let reply = send(&app, Method::GET, "/api/v1/movies?page=9&limit=10", Some(&token), None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body["data"]["movies"].as_array().unwrap().is_empty());
    assert_eq!(reply.body["data"]["totalPages"], 3);

    let reply = send(&app, Method::GET, "/api/v1/movies", Some(&token), None).await;
    assert_eq!(reply.body["data"]["movies"].as_array().unwrap().len(), 10);
    assert_eq!(reply.body["data"]["currentPage"], 1);
}

#[tokio::test]
async fn update_and_delete_unknown_or_malformed_ids() {
    let app = build_app(test_state());
    let admin = admin_token(&app).await;
    let missing = format!("/api/v1/movies/{}", Uuid::new_v4());

    let reply = send(&app, Method::PUT, &missing, Some(&admin), Some(json!({ "rating": 5 }))).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.body["message"], "Movie not found");
    let reply = send(&app, Method::DELETE, &missing, Some(&admin), None).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    let reply = send(&app, Method::GET, &missing, Some(&admin), None).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);

    let reply = send(&app, Method::GET, "/api/v1/movies/not-an-id", Some(&admin), None).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["message"], "Invalid id: not-an-id.");
}

#[tokio::test]
async fn update_checks_only_present_fields() {
    let app = build_app(test_state());
    let admin = admin_token(&app).await;
    let reply = send(&app, Method::POST, "/api/v1/movies", Some(&admin), Some(inception())).await;
    let uri = format!("/api/v1/movies/{}", reply.body["data"]["id"].as_str().unwrap());

    let reply = send(&app, Method::PUT, &uri, Some(&admin), Some(json!({ "rating": 9.1 }))).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["data"]["rating"], 9.1);
    assert_eq!(reply.body["data"]["title"], "Inception");
    assert_eq!(reply.body["message"], "Movie updated successfully");

    let reply = send(
        &app,
        Method::PUT,
        &uri,
        Some(&admin),
        Some(json!({ "rating": 42, "title": "" })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    let message = reply.body["message"].as_str().unwrap();
    assert!(message.contains("\"rating\""));
    assert!(message.contains("\"title\""));
}

#[tokio::test]
async fn me_returns_the_authenticated_user() {
    let app = build_app(test_state());
    let (user, token) = register(&app, "ann", "ann@example.com", "user").await;

    let reply = send(&app, Method::GET, "/api/v1/auth/me", Some(&token), None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["data"]["id"], user["id"]);
}

#[tokio::test]
async fn diagnostics_are_exposed_outside_production_only() {
    let app = build_app(test_state());
    let reply = send(&app, Method::GET, "/api/v1/movies", None, None).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert!(reply.body["stack"].as_str().is_some());

    let mut config = AppConfig::for_tests();
    config.environment = Environment::Production;
    let app = build_app(AppState::in_memory(config).unwrap());
    let reply = send(&app, Method::GET, "/api/v1/movies", None, None).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert!(reply.body.get("stack").is_none());
    assert_eq!(reply.body["message"], "Not authorized to access this route");
}

#[tokio::test]
async fn unsupported_methods_get_the_error_body() {
    let app = build_app(test_state());
    let admin = admin_token(&app).await;
    let uri = format!("/api/v1/movies/{}", Uuid::new_v4());

    let reply = send(&app, Method::PATCH, &uri, Some(&admin), Some(json!({ "rating": 5 }))).await;
    assert_eq!(reply.status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(reply.body["success"], false);
    assert_eq!(reply.body["statusCode"], 405);
    assert_eq!(reply.body["message"], "Method not allowed");
    assert!(reply.headers.contains_key(header::ALLOW));
}

#[tokio::test]
async fn unreadable_paging_parameters_fall_back_to_defaults() {
    let state = test_state();
    let app = build_app(state.clone());
    let token = user_token(&app).await;
    for i in 0..12 {
        state
            .movies
            .create(NewMovie {
                title: format!("Movie {i}"),
                genre: "Drama".into(),
                year: 2000,
                rating: 5.0,
            })
            .await
            .unwrap();
    }

    let reply = send(&app, Method::GET, "/api/v1/movies?page=abc&limit=0", Some(&token), None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["data"]["currentPage"], 1);
    assert_eq!(reply.body["data"]["movies"].as_array().unwrap().len(), 10);
    assert_eq!(reply.body["data"]["totalPages"], 2);

    let reply = send(&app, Method::GET, "/api/v1/movies?page=2&page=1&limit=5", Some(&token), None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["data"]["currentPage"], 1);
    assert_eq!(reply.body["data"]["movies"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn repeated_search_term_keeps_the_last_value() {
    let app = build_app(test_state());
    let admin = admin_token(&app).await;
    send(&app, Method::POST, "/api/v1/movies", Some(&admin), Some(inception())).await;

    let reply = send(&app, Method::GET, "/api/v1/movies/find?q=zzz&q=incep", Some(&admin), None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn whole_number_floats_are_accepted_for_year() {
    let app = build_app(test_state());
    let admin = admin_token(&app).await;

    let reply = send(
        &app,
        Method::POST,
        "/api/v1/movies",
        Some(&admin),
        Some(json!({ "title": "Heat", "genre": "Crime", "year": 1995.0, "rating": 8.3 })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);
    assert_eq!(reply.body["data"]["year"], 1995);

    let reply = send(
        &app,
        Method::POST,
        "/api/v1/movies",
        Some(&admin),
        Some(json!({ "title": "Heat", "genre": "Crime", "year": 1995.5, "rating": 8.3 })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert!(reply.body["message"]
        .as_str()
        .unwrap()
        .contains("\"year\" must be an integer"));
}

#[tokio::test]
async fn clients_over_budget_are_throttled() {
    let mut config = AppConfig::for_tests();
    config.rate_limit.max_requests = 2;
    let app = build_app(AppState::in_memory(config).unwrap());

    let from = |ip: &str| {
        Request::builder()
            .uri("/")
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .unwrap()
    };

    let res = app.clone().oneshot(from("10.0.0.1")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["ratelimit-limit"], "2");
    assert_eq!(res.headers()["ratelimit-remaining"], "1");
    assert!(res.headers().contains_key("ratelimit-reset"));

    app.clone().oneshot(from("10.0.0.1")).await.unwrap();
    let res = app.clone().oneshot(from("10.0.0.1")).await.unwrap();
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(res.headers()["ratelimit-remaining"], "0");
    assert!(res.headers().contains_key(header::RETRY_AFTER));
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["statusCode"], 429);
    assert_eq!(body["message"], "Too many requests, please try again later.");

    let res = app.clone().oneshot(from("10.0.0.2")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn slow_handlers_time_out_through_the_error_layer() {
    let mut config = AppConfig::for_tests();
    config.request_timeout = Duration::from_millis(50);
    let routes = Router::new().route(
        "/slow",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            "done"
        }),
    );
    let app = with_middleware(routes, AppState::in_memory(config).unwrap());

    let reply = send(&app, Method::GET, "/slow", None, None).await;
    assert_eq!(reply.status, StatusCode::REQUEST_TIMEOUT);
    assert_eq!(reply.body["success"], false);
    assert_eq!(reply.body["statusCode"], 408);
    assert_eq!(reply.body["message"], "Request timed out");
}

async fn explode() -> &'static str {
    panic!("handler exploded")
}

#[tokio::test]
async fn handler_panics_become_normalized_500s() {
    let routes = Router::new().route("/explode", get(explode));
    let app = with_middleware(routes, test_state());

    let reply = send(&app, Method::GET, "/explode", None, None).await;
    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(reply.body["success"], false);
    assert_eq!(reply.body["statusCode"], 500);
    assert!(reply.body["stack"]
        .as_str()
        .unwrap()
        .contains("handler exploded"));

    let mut config = AppConfig::for_tests();
    config.environment = Environment::Production;
    let routes = Router::new().route("/explode", get(explode));
    let app = with_middleware(routes, AppState::in_memory(config).unwrap());
    let reply = send(&app, Method::GET, "/explode", None, None).await;
    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(reply.body.get("stack").is_none());
}
