use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use booktracker::config::Config;
use booktracker::db::Database;
use booktracker::server::{self, AppState, CSRF_HEADER};
use serde_json::{Value, json};
use tower::ServiceExt;

const CSRF: &str = "test-csrf-token";

fn setup(config: Config) -> (Router, AppState) {
    let db = Database::open_memory().unwrap();
    let state = AppState::new(config, db);
    (server::create_router(state.clone()), state)
}

fn setup_default() -> (Router, AppState) {
    setup(Config::default())
}

/// Creates a user and returns a session token for it.
fn login(state: &AppState, login: &str) -> String {
    state.auth.create_user(login, "password123").unwrap();
    state.auth.login(login, "password123").unwrap().1
}

struct Call {
    method: Method,
    uri: String,
    token: Option<String>,
    csrf: Option<(&'static str, &'static str)>,
    headers: Vec<(&'static str, &'static str)>,
    body: Option<Value>,
}

impl Call {
    fn new(method: Method, uri: &str) -> Self {
        Self {
            method,
            uri: uri.to_string(),
            token: None,
            csrf: None,
            headers: Vec::new(),
            body: None,
        }
    }

    fn get(uri: &str) -> Self {
        Self::new(Method::GET, uri)
    }

    fn post(uri: &str, body: Value) -> Self {
        Self::new(Method::POST, uri).json(body).csrf()
    }

    fn put(uri: &str) -> Self {
        Self::new(Method::PUT, uri).csrf()
    }

    fn token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    fn csrf(mut self) -> Self {
        self.csrf = Some((CSRF, CSRF));
        self
    }

    fn csrf_pair(mut self, cookie: &'static str, header: &'static str) -> Self {
        self.csrf = Some((cookie, header));
        self
    }

    fn no_csrf(mut self) -> Self {
        self.csrf = None;
        self
    }

    fn header(mut self, name: &'static str, value: &'static str) -> Self {
        self.headers.push((name, value));
        self
    }

    fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    fn build(self) -> Request<Body> {
        let mut builder = Request::builder().method(self.method).uri(self.uri);
        if let Some(token) = &self.token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        if let Some((cookie, value)) = self.csrf {
            builder = builder
                .header(header::COOKIE, format!("csrf_token={}", cookie))
                .header(CSRF_HEADER, value);
        }
        for (name, value) in self.headers {
            builder = builder.header(name, value);
        }
        match self.body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }
}

async fn send(app: &Router, call: Call) -> (StatusCode, HeaderMap, Value) {
    let response = app.clone().oneshot(call.build()).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, headers, body)
}

async fn create_book(app: &Router, token: &str, title: &str, author: &str) -> Value {
    let (status, _, body) = send(
        app,
        Call::post("/books", json!({ "title": title, "author": author })).token(token),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["book"].clone()
}

#[tokio::test]
async fn index_reports_service() {
    let (app, _) = setup_default();
    let (status, _, body) = send(&app, Call::get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "booktracker");
}

#[tokio::test]
async fn authors_filter_and_meta() {
    let (app, state) = setup_default();
    let authors = state.authors();
    authors.create_author("Frank Herbert").unwrap();
    authors.create_author("Brian Herbert").unwrap();
    authors.create_author("Ursula K. Le Guin").unwrap();

    let (status, _, body) = send(&app, Call::get("/authors?name=herbert&limit=1&offset=1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"], json!({ "limit": 1, "offset": 1 }));
    let list = body["authors"].as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["name"], "Brian Herbert");
    assert!(list[0].get("author_id").is_none());

    let (_, _, body) = send(&app, Call::get("/authors")).await;
    assert_eq!(body["meta"], json!({ "limit": 15, "offset": 0 }));
    assert_eq!(body["authors"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn invalid_pagination_is_rejected() {
    let (app, _) = setup_default();

    for uri in [
        "/authors?limit=0",
        "/authors?limit=101",
        "/books?offset=-1",
        "/books/series?limit=abc",
    ] {
        let (status, _, body) = send(&app, Call::get(uri)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert!(body["error"].is_string());
    }
}

#[tokio::test]
async fn malformed_filters_use_error_envelope() {
    let (app, _) = setup_default();

    for uri in [
        "/authors?name=a&name=b",
        "/books?title=a&title=b",
        "/books/series?name=a&name=b",
    ] {
        let (status, headers, body) = send(&app, Call::get(uri)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(
            headers.get(header::CONTENT_TYPE).unwrap(),
            "application/json",
            "{uri}"
        );
        assert!(body["error"].is_string(), "{uri}");
    }
}

#[tokio::test]
async fn books_listing_depends_on_caller() {
    let (app, state) = setup_default();
    let alice = login(&state, "alice");
    let bob = login(&state, "bob");

    create_book(&app, &alice, "Dune", "Frank Herbert").await;
    create_book(&app, &bob, "Dune Messiah", "Frank Herbert").await;
    create_book(&app, &bob, "Earthsea", "Ursula K. Le Guin").await;

    // Anonymous: every book, no per-user fields.
    let (status, _, body) = send(&app, Call::get("/books")).await;
    assert_eq!(status, StatusCode::OK);
    let books = body["books"].as_array().unwrap();
    assert_eq!(books.len(), 3);
    assert!(books.iter().all(|b| b.get("is_loved").is_none()));

    // Authenticated: only the caller's books.
    let (_, _, body) = send(&app, Call::get("/books").token(&alice)).await;
    let books = body["books"].as_array().unwrap();
    assert_eq!(books.len(), 1);
    assert_eq!(books[0]["title"], "Dune");
    assert_eq!(books[0]["user"]["login"], "alice");
    assert_eq!(books[0]["state"], "unread");

    // Title filter searches all books even when authenticated.
    let (_, _, body) = send(&app, Call::get("/books?title=dune").token(&alice)).await;
    assert_eq!(body["books"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn create_book_is_idempotent() {
    let (app, state) = setup_default();
    let alice = login(&state, "alice");

    let first = create_book(&app, &alice, "Dune", "Frank Herbert").await;
    let second = create_book(&app, &alice, "dune", "frank herbert").await;
    assert_eq!(first["eid"], second["eid"]);
    assert_eq!(first["author"]["eid"], second["author"]["eid"]);

    let (_, _, body) = send(&app, Call::get("/books").token(&alice)).await;
    assert_eq!(body["books"].as_array().unwrap().len(), 1);

    let (_, _, body) = send(&app, Call::get("/authors")).await;
    assert_eq!(body["authors"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn create_book_with_series_and_eids() {
    let (app, state) = setup_default();
    let alice = login(&state, "alice");

    let (status, _, body) = send(
        &app,
        Call::post("/books/series", json!({ "name": "Dune Chronicles" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let series_eid = body["series"]["eid"].as_str().unwrap().to_string();

    let (status, _, body) = send(
        &app,
        Call::post("/authors", json!({ "name": "Frank Herbert" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let author_eid = body["author"]["eid"].as_str().unwrap().to_string();

    let (status, _, body) = send(
        &app,
        Call::post(
            "/books",
            json!({
                "title": "Dune",
                "author": author_eid,
                "author_is_eid": true,
                "series": series_eid,
                "series_is_eid": true,
            }),
        )
        .token(&alice),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["book"]["author"]["name"], "Frank Herbert");
    assert_eq!(body["book"]["series"]["name"], "Dune Chronicles");

    let (status, _, _) = send(
        &app,
        Call::post(
            "/books",
            json!({ "title": "Dune", "author": "missing", "author_is_eid": true }),
        )
        .token(&alice),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn create_book_rejects_invalid_body() {
    let (app, state) = setup_default();
    let alice = login(&state, "alice");

    let (status, _, _) = send(
        &app,
        Call::post("/books", json!({ "title": "  ", "author": "Someone" })).token(&alice),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = send(
        &app,
        Call::post("/books", json!({ "author": "Someone" })).token(&alice),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, _, body) = send(&app, Call::get("/authors")).await;
    assert!(body["authors"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn body_is_validated_before_session_and_csrf() {
    let (app, state) = setup_default();
    let alice = login(&state, "alice");
    let invalid = json!({ "title": "", "author": "Someone" });
    let valid = json!({ "title": "Dune", "author": "Frank Herbert" });

    // Invalid body wins over a missing session and a missing CSRF token.
    let (status, _, body) = send(&app, Call::post("/books", invalid.clone()).no_csrf()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    // Valid body: the session is checked next, then CSRF.
    let (status, _, _) = send(&app, Call::post("/books", valid.clone()).no_csrf()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, _) = send(
        &app,
        Call::post("/books", valid).token(&alice).no_csrf(),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _, _) = send(
        &app,
        Call::post("/authors", json!({ "name": " " })).no_csrf(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, _, body) = send(&app, Call::get("/authors")).await;
    assert!(body["authors"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn love_requires_session() {
    let (app, state) = setup_default();
    let alice = login(&state, "alice");
    let book = create_book(&app, &alice, "Dune", "Frank Herbert").await;
    let uri = format!("/books/{}/love", book["eid"].as_str().unwrap());

    let (status, _, _) = send(&app, Call::put(&uri)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Unauthenticated requests fail before the CSRF check.
    let (status, _, _) = send(&app, Call::put(&uri).no_csrf()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, _, body) = send(&app, Call::get("/books").token(&alice)).await;
    assert_eq!(body["books"][0]["is_loved"], false);
}

#[tokio::test]
async fn love_toggles_only_callers_flag() {
    let (app, state) = setup_default();
    let alice = login(&state, "alice");
    let bob = login(&state, "bob");
    let book = create_book(&app, &alice, "Dune", "Frank Herbert").await;
    create_book(&app, &bob, "Dune", "Frank Herbert").await;
    let eid = book["eid"].as_str().unwrap();
    let uri = format!("/books/{}/love", eid);

    let (status, _, body) = send(&app, Call::put(&uri).token(&alice)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "ok": true }));

    let (_, _, body) = send(&app, Call::get(&format!("/books/{}", eid)).token(&alice)).await;
    assert_eq!(body["book"]["is_loved"], true);
    let (_, _, body) = send(&app, Call::get(&format!("/books/{}", eid)).token(&bob)).await;
    assert_eq!(body["book"]["is_loved"], false);

    send(&app, Call::put(&uri).token(&alice)).await;
    let (_, _, body) = send(&app, Call::get(&format!("/books/{}", eid)).token(&alice)).await;
    assert_eq!(body["book"]["is_loved"], false);
}

#[tokio::test]
async fn csrf_mismatch_is_forbidden() {
    let (app, state) = setup_default();
    let alice = login(&state, "alice");
    let book = create_book(&app, &alice, "Dune", "Frank Herbert").await;
    let uri = format!("/books/{}/love", book["eid"].as_str().unwrap());

    let (status, _, _) = send(
        &app,
        Call::put(&uri).token(&alice).csrf_pair("cookie-token", "other-token"),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _, _) = send(&app, Call::put(&uri).token(&alice).no_csrf()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _, _) = send(
        &app,
        Call::post("/authors", json!({ "name": "Someone" })).no_csrf(),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, _, body) = send(&app, Call::get("/books").token(&alice)).await;
    assert_eq!(body["books"][0]["is_loved"], false);
}

#[tokio::test]
async fn update_state() {
    let (app, state) = setup_default();
    let alice = login(&state, "alice");
    let book = create_book(&app, &alice, "Dune", "Frank Herbert").await;
    let eid = book["eid"].as_str().unwrap();
    let uri = format!("/books/{}/state", eid);

    let (status, _, _) = send(
        &app,
        Call::put(&uri).token(&alice).json(json!({ "state": "reading" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, _, body) = send(&app, Call::get(&format!("/books/{}", eid)).token(&alice)).await;
    assert_eq!(body["book"]["state"], "reading");

    let (status, _, _) = send(
        &app,
        Call::put(&uri).token(&alice).json(json!({ "state": "abandoned" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_book_and_route() {
    let (app, state) = setup_default();
    let alice = login(&state, "alice");

    let (status, _, body) = send(&app, Call::get("/books/does-not-exist")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());

    let (status, _, _) = send(&app, Call::put("/books/does-not-exist/love").token(&alice)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, _) = send(&app, Call::get("/nowhere")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn plain_http_is_redirected() {
    let (app, _) = setup_default();

    let (status, headers, _) = send(
        &app,
        Call::get("/books?title=dune&limit=5")
            .header("x-forwarded-proto", "http")
            .header("host", "books.example.com"),
    )
    .await;
    assert_eq!(status, StatusCode::PERMANENT_REDIRECT);
    assert_eq!(
        headers.get(header::LOCATION).unwrap(),
        "https://books.example.com/books?title=dune&limit=5"
    );

    // Mutations are redirected before any guard runs.
    let (status, _, _) = send(
        &app,
        Call::put("/books/x/love")
            .no_csrf()
            .header("x-forwarded-proto", "http")
            .header("host", "books.example.com"),
    )
    .await;
    assert_eq!(status, StatusCode::PERMANENT_REDIRECT);
}

#[tokio::test]
async fn https_and_local_mode_pass_through() {
    let (app, _) = setup_default();
    let (status, _, _) = send(
        &app,
        Call::get("/books")
            .header("x-forwarded-proto", "https")
            .header("host", "books.example.com"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let mut config = Config::default();
    config.server.local = true;
    let (app, _) = setup(config);
    let (status, _, _) = send(
        &app,
        Call::get("/books")
            .header("x-forwarded-proto", "http")
            .header("host", "localhost:8080"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn register_follows_config() {
    let (app, _) = setup_default();
    let credentials = json!({ "login": "newuser", "password": "password123" });

    let (status, _, _) = send(
        &app,
        Call::new(Method::POST, "/auth/register").json(credentials.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let mut config = Config::default();
    config.auth.registration = "open".to_string();
    let (app, _) = setup(config);

    let (status, headers, body) = send(
        &app,
        Call::new(Method::POST, "/auth/register").json(credentials),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["user"]["login"], "newuser");
    assert!(body["user"].get("password_hash").is_none());

    let cookies: Vec<_> = headers
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect();
    assert!(cookies.iter().any(|c| c.starts_with("access_token=") && c.contains("HttpOnly")));
    assert!(cookies.iter().any(|c| c.starts_with("csrf_token=")));
    assert!(cookies.iter().all(|c| c.contains("Secure")));

    let (status, _, body) = send(
        &app,
        Call::new(Method::POST, "/auth/register")
            .json(json!({ "login": "newuser", "password": "password123" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn login_me_logout() {
    let (app, state) = setup_default();
    state.auth.create_user("alice", "password123").unwrap();

    let (status, _, _) = send(
        &app,
        Call::new(Method::POST, "/auth/login")
            .json(json!({ "login": "alice", "password": "wrong-password" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, body) = send(
        &app,
        Call::new(Method::POST, "/auth/login")
            .json(json!({ "login": "alice", "password": "password123" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().unwrap().to_string();
    assert!(body["csrf_token"].is_string());

    let (status, _, body) = send(&app, Call::get("/auth/me").token(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["login"], "alice");

    let (status, _, _) = send(&app, Call::new(Method::POST, "/auth/logout").token(&token)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, _) = send(&app, Call::get("/auth/me").token(&token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn csrf_endpoint_issues_cookie() {
    let (app, _) = setup_default();
    let (status, headers, body) = send(&app, Call::get("/auth/csrf")).await;
    assert_eq!(status, StatusCode::OK);

    let token = body["csrf_token"].as_str().unwrap();
    let cookie = headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(cookie.starts_with(&format!("csrf_token={};", token)));
}
