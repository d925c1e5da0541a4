//! HTTP server and routes.

mod guards;
mod handlers;
mod redirect;
mod state;

pub use guards::{CSRF_COOKIE, CSRF_HEADER, SESSION_COOKIE};
pub use state::AppState;

use axum::{
    Router,
    http::header,
    middleware,
    routing::{get, post, put},
};
use tower_http::{sensitive_headers::SetSensitiveRequestHeadersLayer, trace::TraceLayer};

/// Create the application router.
///
/// The HTTPS redirect wraps every route and the fallback, so it runs before
/// any handler. `Authorization` and `Cookie` are marked sensitive before the
/// trace layer sees the request.
pub fn create_router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/csrf", get(handlers::auth_csrf))
        .route("/login", post(handlers::auth_login))
        .route("/register", post(handlers::auth_register))
        .route("/logout", post(handlers::auth_logout))
        .route("/me", get(handlers::auth_me));

    Router::new()
        .route("/", get(handlers::index))
        .route(
            "/authors",
            get(handlers::list_authors).post(handlers::create_author),
        )
        .route(
            "/books",
            get(handlers::list_books).post(handlers::create_book),
        )
        .route(
            "/books/series",
            get(handlers::list_series).post(handlers::create_series),
        )
        .route("/books/{eid}", get(handlers::get_book))
        .route("/books/{eid}/love", put(handlers::love_book))
        .route("/books/{eid}/state", put(handlers::update_book_state))
        .nest("/auth", auth_routes)
        .fallback(handlers::not_found)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            redirect::https_redirect,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(SetSensitiveRequestHeadersLayer::new([
            header::AUTHORIZATION,
            header::COOKIE,
        ]))
        .with_state(state)
}
