//! HTTP request handlers.

use crate::auth::generate_token;
use crate::db::{Author, Book, BookSeries, BookState, User};
use crate::error::{AppError, Result};
use crate::pagination::Pagination;
use crate::server::AppState;
use crate::server::guards::{
    CSRF_COOKIE, CsrfVerified, CurrentUser, MaybeUser, SESSION_COOKIE, ValidJson, ValidPath,
    ValidQuery, Validate, require_text, session_token,
};
use axum::{
    Json,
    extract::{OriginalUri, State},
    http::{HeaderMap, StatusCode, header},
    response::{AppendHeaders, IntoResponse},
};
use serde::{Deserialize, Serialize};

// ============================================================================
// RESPONSE ENVELOPES
// ============================================================================

/// `{ok: true}` acknowledgement.
#[derive(Serialize)]
pub struct OkResponse {
    ok: bool,
}

impl OkResponse {
    fn new() -> Json<Self> {
        Json(Self { ok: true })
    }
}

/// Author list.
#[derive(Serialize)]
pub struct AuthorsResponse {
    meta: Pagination,
    authors: Vec<Author>,
}

/// Single author.
#[derive(Serialize)]
pub struct AuthorResponse {
    author: Author,
}

/// Book list.
#[derive(Serialize)]
pub struct BooksResponse {
    meta: Pagination,
    books: Vec<Book>,
}

/// Single book.
#[derive(Serialize)]
pub struct BookResponse {
    book: Book,
}

/// Series list.
#[derive(Serialize)]
pub struct SeriesListResponse {
    meta: Pagination,
    series: Vec<BookSeries>,
}

/// Single series.
#[derive(Serialize)]
pub struct SeriesResponse {
    series: BookSeries,
}

/// Service info.
#[derive(Serialize)]
pub struct InfoResponse {
    name: &'static str,
    version: &'static str,
}

/// Service info.
pub async fn index() -> Json<InfoResponse> {
    Json(InfoResponse {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Fallback for unknown routes.
pub async fn not_found(uri: OriginalUri) -> AppError {
    AppError::NotFound(format!("No route for {}", uri.0.path()))
}

// ============================================================================
// AUTHORS
// ============================================================================

/// `?name=` filter.
#[derive(Debug, Default, Deserialize)]
pub struct NameFilter {
    name: Option<String>,
}

impl NameFilter {
    fn name(&self) -> Option<&str> {
        self.name.as_deref().map(str::trim).filter(|n| !n.is_empty())
    }
}

/// Create-author body.
#[derive(Debug, Deserialize)]
pub struct CreateAuthorBody {
    name: String,
}

impl Validate for CreateAuthorBody {
    fn validate(&self) -> Result<()> {
        require_text("name", &self.name)
    }
}

/// Fetch authors, optionally filtered by name.
pub async fn list_authors(
    State(state): State<AppState>,
    pagination: Pagination,
    ValidQuery(filter): ValidQuery<NameFilter>,
) -> Result<Json<AuthorsResponse>> {
    let executor = state.authors();
    let authors = match filter.name() {
        Some(name) => executor.get_authors_by_name(name, &pagination)?,
        None => executor.get_all_authors(&pagination)?,
    };

    Ok(Json(AuthorsResponse {
        meta: pagination,
        authors,
    }))
}

/// Create an author.
pub async fn create_author(
    State(state): State<AppState>,
    csrf: std::result::Result<CsrfVerified, AppError>,
    ValidJson(body): ValidJson<CreateAuthorBody>,
) -> Result<(StatusCode, Json<AuthorResponse>)> {
    csrf?;
    let author = state.authors().create_author(body.name.trim())?;
    Ok((StatusCode::CREATED, Json(AuthorResponse { author })))
}

// ============================================================================
// BOOKS
// ============================================================================

/// `?title=` filter.
#[derive(Debug, Default, Deserialize)]
pub struct TitleFilter {
    title: Option<String>,
}

impl TitleFilter {
    fn title(&self) -> Option<&str> {
        self.title.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }
}

/// Create-book body. Each `*_is_eid` flag says whether the matching field
/// is an external ID to fetch (`true`) or a name to get-or-create.
#[derive(Debug, Deserialize)]
pub struct CreateBookBody {
    title: String,
    #[serde(default)]
    title_is_eid: bool,
    author: String,
    #[serde(default)]
    author_is_eid: bool,
    series: Option<String>,
    #[serde(default)]
    series_is_eid: bool,
}

impl Validate for CreateBookBody {
    fn validate(&self) -> Result<()> {
        require_text("title", &self.title)?;
        require_text("author", &self.author)?;
        if let Some(series) = &self.series {
            require_text("series", series)?;
        }
        Ok(())
    }
}

/// Update-state body.
#[derive(Debug, Deserialize)]
pub struct UpdateBookStateBody {
    state: BookState,
}

impl Validate for UpdateBookStateBody {
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// Fetch books.
///
/// Anonymous callers get every book. Authenticated callers get only the
/// books linked to them, unless `title` is given, which searches all books.
pub async fn list_books(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    pagination: Pagination,
    ValidQuery(filter): ValidQuery<TitleFilter>,
) -> Result<Json<BooksResponse>> {
    let executor = state.books();
    let books = match (filter.title(), &user) {
        (Some(title), _) => {
            executor.get_books_by_title(title, &pagination, user.as_ref().map(|u| u.user_id))?
        }
        (None, Some(user)) => executor.get_all_books_for_user(user.user_id, &pagination)?,
        (None, None) => executor.get_all_books(&pagination)?,
    };

    Ok(Json(BooksResponse {
        meta: pagination,
        books,
    }))
}

/// Create a book and add it to the caller's list.
///
/// Author, series and book are each resolved or created in turn; the first
/// failure aborts the rest. Linking an already-linked book is not an error.
pub async fn create_book(
    State(state): State<AppState>,
    user: std::result::Result<CurrentUser, AppError>,
    csrf: std::result::Result<CsrfVerified, AppError>,
    ValidJson(body): ValidJson<CreateBookBody>,
) -> Result<(StatusCode, Json<BookResponse>)> {
    let CurrentUser(user) = user?;
    csrf?;

    let authors = state.authors();
    let author = if body.author_is_eid {
        authors.get_author_by_eid(body.author.trim())?
    } else {
        authors.create_author(body.author.trim())?
    };

    let series = match body.series.as_deref().map(str::trim) {
        Some(eid) if body.series_is_eid => Some(state.series().get_book_series_by_eid(eid)?),
        Some(name) => Some(state.series().create_book_series(name)?),
        None => None,
    };

    let books = state.books();
    let book = if body.title_is_eid {
        books.get_book_by_eid(body.title.trim())?
    } else {
        books.create_book(
            body.title.trim(),
            author.author_id,
            series.as_ref().map(|s| s.series_id),
        )?
    };

    match books.create_book_to_user(book.book_id, user.user_id) {
        Ok(()) => {}
        Err(AppError::Conflict(_)) => {
            tracing::debug!(book = %book.eid, user = %user.eid, "Book already linked to user");
        }
        Err(e) => return Err(e),
    }

    let book = books.get_book_by_eid_for_user(&book.eid, user.user_id)?;
    Ok((StatusCode::CREATED, Json(BookResponse { book })))
}

/// Fetch a single book, with the caller's flags when authenticated.
pub async fn get_book(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    ValidPath(eid): ValidPath<String>,
) -> Result<Json<BookResponse>> {
    let executor = state.books();
    let book = match user {
        Some(user) => executor.get_book_by_eid_for_user(&eid, user.user_id)?,
        None => executor.get_book_by_eid(&eid)?,
    };
    Ok(Json(BookResponse { book }))
}

/// Toggle the caller's loved flag on a book.
pub async fn love_book(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    _csrf: CsrfVerified,
    ValidPath(eid): ValidPath<String>,
) -> Result<Json<OkResponse>> {
    let is_loved = state.books().update_toggle_book_is_loved(&eid, user.user_id)?;
    tracing::debug!(book = %eid, user = %user.eid, is_loved, "Toggled loved flag");
    Ok(OkResponse::new())
}

/// Set the caller's reading state on a book.
pub async fn update_book_state(
    State(state): State<AppState>,
    user: std::result::Result<CurrentUser, AppError>,
    csrf: std::result::Result<CsrfVerified, AppError>,
    ValidPath(eid): ValidPath<String>,
    ValidJson(body): ValidJson<UpdateBookStateBody>,
) -> Result<Json<OkResponse>> {
    let CurrentUser(user) = user?;
    csrf?;

    state
        .books()
        .update_book_state(&eid, user.user_id, body.state)?;
    tracing::debug!(book = %eid, user = %user.eid, state = %body.state, "Updated reading state");
    Ok(OkResponse::new())
}

// ============================================================================
// SERIES
// ============================================================================

/// Create-series body.
#[derive(Debug, Deserialize)]
pub struct CreateSeriesBody {
    name: String,
}

impl Validate for CreateSeriesBody {
    fn validate(&self) -> Result<()> {
        require_text("name", &self.name)
    }
}

/// Fetch book series, optionally filtered by name.
pub async fn list_series(
    State(state): State<AppState>,
    pagination: Pagination,
    ValidQuery(filter): ValidQuery<NameFilter>,
) -> Result<Json<SeriesListResponse>> {
    let executor = state.series();
    let series = match filter.name() {
        Some(name) => executor.get_series_by_name(name, &pagination)?,
        None => executor.get_all_series(&pagination)?,
    };

    Ok(Json(SeriesListResponse {
        meta: pagination,
        series,
    }))
}

/// Create a book series.
pub async fn create_series(
    State(state): State<AppState>,
    csrf: std::result::Result<CsrfVerified, AppError>,
    ValidJson(body): ValidJson<CreateSeriesBody>,
) -> Result<(StatusCode, Json<SeriesResponse>)> {
    csrf?;
    let series = state.series().create_book_series(body.name.trim())?;
    Ok((StatusCode::CREATED, Json(SeriesResponse { series })))
}

// ============================================================================
// AUTH API
// ============================================================================

/// Login/register request.
#[derive(Debug, Deserialize)]
pub struct CredentialsBody {
    login: String,
    password: String,
}

impl Validate for CredentialsBody {
    fn validate(&self) -> Result<()> {
        if self.login.is_empty() || self.password.is_empty() {
            return Err(AppError::Validation(
                "login and password are required".to_string(),
            ));
        }
        Ok(())
    }
}

/// Login response.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    token: String,
    csrf_token: String,
    user: User,
}

/// CSRF token response.
#[derive(Debug, Serialize)]
pub struct CsrfResponse {
    csrf_token: String,
}

/// `Set-Cookie` value. `Secure` is left off in local mode so plain-HTTP
/// development servers keep the cookie.
fn cookie(state: &AppState, name: &str, value: &str, http_only: bool, max_age: Option<i64>) -> String {
    let mut cookie = format!("{}={}; Path=/; SameSite=Strict", name, value);
    if http_only {
        cookie.push_str("; HttpOnly");
    }
    if let Some(max_age) = max_age {
        cookie.push_str(&format!("; Max-Age={}", max_age));
    }
    if !state.is_local() {
        cookie.push_str("; Secure");
    }
    cookie
}

fn session_cookies(state: &AppState, token: &str, csrf_token: &str) -> [(header::HeaderName, String); 2] {
    let max_age = i64::from(state.config.auth.session_days) * 24 * 60 * 60;
    [
        (
            header::SET_COOKIE,
            cookie(state, SESSION_COOKIE, token, true, Some(max_age)),
        ),
        (
            header::SET_COOKIE,
            cookie(state, CSRF_COOKIE, csrf_token, false, Some(max_age)),
        ),
    ]
}

/// Issue a CSRF token as cookie and body.
pub async fn auth_csrf(State(state): State<AppState>) -> impl IntoResponse {
    let csrf_token = generate_token();
    (
        AppendHeaders([(
            header::SET_COOKIE,
            cookie(&state, CSRF_COOKIE, &csrf_token, false, None),
        )]),
        Json(CsrfResponse { csrf_token }),
    )
}

/// Auth login.
pub async fn auth_login(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<CredentialsBody>,
) -> Result<impl IntoResponse> {
    let (user, token) = state.auth.login(&req.login, &req.password)?;
    let csrf_token = generate_token();

    Ok((
        AppendHeaders(session_cookies(&state, &token, &csrf_token)),
        Json(LoginResponse {
            token,
            csrf_token,
            user,
        }),
    ))
}

/// Auth register.
pub async fn auth_register(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<CredentialsBody>,
) -> Result<impl IntoResponse> {
    let _user = state.auth.register(&req.login, &req.password)?;
    let (user, token) = state.auth.login(&req.login, &req.password)?;
    let csrf_token = generate_token();

    Ok((
        StatusCode::CREATED,
        AppendHeaders(session_cookies(&state, &token, &csrf_token)),
        Json(LoginResponse {
            token,
            csrf_token,
            user,
        }),
    ))
}

/// Auth logout.
pub async fn auth_logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse> {
    if let Some(token) = session_token(&headers) {
        state.auth.logout(&token)?;
    }

    Ok((
        AppendHeaders([
            (
                header::SET_COOKIE,
                cookie(&state, SESSION_COOKIE, "", true, Some(0)),
            ),
            (
                header::SET_COOKIE,
                cookie(&state, CSRF_COOKIE, "", false, Some(0)),
            ),
        ]),
        OkResponse::new(),
    ))
}

/// Current user.
#[derive(Debug, Serialize)]
pub struct MeResponse {
    user: User,
}

/// Get current user info.
pub async fn auth_me(CurrentUser(user): CurrentUser) -> Json<MeResponse> {
    Json(MeResponse { user })
}
