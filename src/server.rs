//! HTTP transport for the catalog and its search.
//!
//! Every response uses the same envelope: `{"success": true, "data": …}` on
//! success and `{"success": false, "error": "…"}` on failure. The caller's
//! identity comes from headers set by the session layer in front of this
//! service.

use std::sync::Arc;

use axum::{
    Json,
    Router,
    extract::{FromRequestParts, Path, Query, State, rejection::JsonRejection},
    http::{
        HeaderMap,
        HeaderName,
        Method,
        StatusCode,
        header::CONTENT_TYPE,
        request::Parts,
    },
    response::{IntoResponse, Response},
    routing::{delete, get},
};
use chrono::Utc;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::json;
use tokio::{
    net::TcpListener,
    signal::{
        ctrl_c,
        unix::{SignalKind, signal},
    },
};
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::{
    catalog_db::{CatalogDb, TitleListQuery},
    config::ServerConfig,
    error::{Error, Result},
    model::{NewChapter, NewTitle, Principal, Role, TitleStatus},
    search::{SearchRequest, execute_search},
};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";
pub const USER_BANNED_HEADER: &str = "x-user-banned";

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<CatalogDb>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(db: CatalogDb, config: ServerConfig) -> Self {
        Self {
            db: Arc::new(db),
            config: Arc::new(config),
        }
    }
}

#[derive(Debug, Serialize)]
struct Envelope<T> {
    success: bool,
    data: T,
}

fn ok<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        success: true,
        data,
    })
}

type ApiResult<T> = Result<Json<Envelope<T>>>;

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Cancelled => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            warn!(error = %self, %status, "request failed");
        }

        let body = Json(json!({ "success": false, "error": self.to_string() }));
        (status, body).into_response()
    }
}

/// Build the caller's identity from session headers.
pub fn principal_from_headers(headers: &HeaderMap) -> Result<Principal> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    let user_id = header(USER_ID_HEADER).ok_or_else(|| {
        Error::Unauthorized(format!("missing {USER_ID_HEADER} header"))
    })?;

    let role = match header(USER_ROLE_HEADER) {
        None => Role::User,
        Some(r) if r.eq_ignore_ascii_case("user") => Role::User,
        Some(r) if r.eq_ignore_ascii_case("admin") => Role::Admin,
        Some(other) => {
            return Err(Error::Unauthorized(format!(
                "unknown role '{other}'"
            )));
        }
    };

    let is_banned = header(USER_BANNED_HEADER)
        .is_some_and(|v| v.eq_ignore_ascii_case("true") || v == "1");

    Ok(Principal {
        user_id: user_id.to_string(),
        role,
        is_banned,
    })
}

impl<S: Send + Sync> FromRequestParts<S> for Principal {
    type Rejection = Error;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Self> {
        principal_from_headers(&parts.headers)
    }
}

/// [`Query`] whose rejections are reported through the response envelope.
pub struct ApiQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        Query::<T>::from_request_parts(parts, state)
            .await
            .map(|Query(value)| Self(value))
            .map_err(|rejection| Error::InvalidRequest(rejection.body_text()))
    }
}

/// [`Path`] whose rejections are reported through the response envelope.
pub struct ApiPath<T>(pub T);

impl<T, S> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        Path::<T>::from_request_parts(parts, state)
            .await
            .map(|Path(value)| Self(value))
            .map_err(|rejection| Error::InvalidRequest(rejection.body_text()))
    }
}

fn require_admin(principal: &Principal) -> Result<()> {
    if principal.is_admin() {
        Ok(())
    } else {
        Err(Error::Forbidden("admin role required".into()))
    }
}

fn json_body<T>(
    payload: std::result::Result<Json<T>, JsonRejection>,
) -> Result<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| Error::InvalidRequest(rejection.body_text()))
}

fn parse_page(raw: Option<&str>) -> Result<Option<i64>> {
    raw.map(|p| {
        p.trim().parse::<i64>().map_err(|_| {
            Error::InvalidRequest(format!(
                "page must be a positive integer, got '{p}'"
            ))
        })
    })
    .transpose()
}

/// Unparseable limits fall back to the default, like out-of-range ones are
/// clamped.
fn parse_limit(raw: Option<&str>) -> Option<i64> {
    raw.and_then(|l| l.trim().parse::<i64>().ok())
}

/// Run a blocking catalog call off the async executor.
async fn with_db<T, F>(state: &AppState, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&CatalogDb) -> Result<T> + Send + 'static,
{
    let db = Arc::clone(&state.db);
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| {
            Error::StoreUnavailable(format!("store task failed: {e}"))
        })?
}

// -- Search --

#[derive(Debug, Deserialize)]
struct SearchParams {
    q: Option<String>,
    page: Option<String>,
    limit: Option<String>,
}

async fn search_titles(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<SearchParams>,
) -> ApiResult<crate::search::SearchPage> {
    let request = SearchRequest::new(
        params.q.as_deref(),
        parse_page(params.page.as_deref())?,
        parse_limit(params.limit.as_deref()),
    )?;

    // Dropping the handler (client gone) cancels the search as well.
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();

    let db = Arc::clone(&state.db);
    let token = cancel.clone();
    let task = tokio::task::spawn_blocking(move || {
        execute_search(db.as_ref(), &request, &token, Utc::now())
    });

    let timeout = state.config.request_timeout;
    let outcome = match tokio::time::timeout(timeout, task).await {
        Ok(joined) => joined.map_err(|e| {
            Error::StoreUnavailable(format!("search task failed: {e}"))
        })?,
        Err(_) => {
            cancel.cancel();
            warn!(?timeout, "search timed out");
            Err(Error::Cancelled)
        }
    };
    guard.disarm();

    Ok(ok(outcome?))
}

// -- Titles --

#[derive(Debug, Deserialize)]
struct ListParams {
    page: Option<String>,
    limit: Option<String>,
    genre: Option<String>,
    status: Option<String>,
}

async fn list_titles(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<ListParams>,
) -> ApiResult<crate::catalog_db::TitleList> {
    let page = parse_page(params.page.as_deref())?.unwrap_or(1);
    if page < 1 {
        return Err(Error::InvalidRequest(format!(
            "page must be a positive integer, got {page}"
        )));
    }
    let limit = parse_limit(params.limit.as_deref())
        .map_or(20, |l| l.clamp(1, 50) as usize);
    let status = params
        .status
        .as_deref()
        .map(str::parse::<TitleStatus>)
        .transpose()
        .map_err(Error::InvalidRequest)?;

    let query = TitleListQuery {
        genre: params.genre.filter(|g| !g.trim().is_empty()),
        status,
        page: page as usize,
        limit,
    };
    Ok(ok(with_db(&state, move |db| db.list_titles(&query)).await?))
}

async fn create_title(
    State(state): State<AppState>,
    principal: Principal,
    payload: std::result::Result<Json<NewTitle>, JsonRejection>,
) -> Result<impl IntoResponse> {
    require_admin(&principal)?;
    let input = json_body(payload)?;
    let record = with_db(&state, move |db| db.create_title(input)).await?;
    Ok((StatusCode::CREATED, ok(record)))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetailParams {
    #[serde(default)]
    skip_view: bool,
}

async fn get_title(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<String>,
    ApiQuery(params): ApiQuery<DetailParams>,
) -> ApiResult<crate::model::TitleRecord> {
    let record =
        with_db(&state, move |db| db.record_view(&id, params.skip_view))
            .await?;
    Ok(ok(record))
}

async fn delete_title(
    State(state): State<AppState>,
    principal: Principal,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<serde_json::Value> {
    require_admin(&principal)?;
    let target = id.clone();
    if !with_db(&state, move |db| db.remove_title(&target)).await? {
        return Err(Error::not_found("title", id));
    }
    Ok(ok(json!({ "id": id })))
}

// -- Chapters --

async fn list_chapters(
    State(state): State<AppState>,
    ApiPath(title_id): ApiPath<String>,
) -> ApiResult<Vec<crate::model::Chapter>> {
    Ok(ok(with_db(&state, move |db| db.list_chapters(&title_id)).await?))
}

async fn add_chapter(
    State(state): State<AppState>,
    principal: Principal,
    ApiPath(title_id): ApiPath<String>,
    payload: std::result::Result<Json<NewChapter>, JsonRejection>,
) -> Result<impl IntoResponse> {
    require_admin(&principal)?;
    let input = json_body(payload)?;
    let chapter =
        with_db(&state, move |db| db.add_chapter(&title_id, input)).await?;
    Ok((StatusCode::CREATED, ok(chapter)))
}

async fn delete_chapter(
    State(state): State<AppState>,
    principal: Principal,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<serde_json::Value> {
    require_admin(&principal)?;
    let target = id.clone();
    if !with_db(&state, move |db| db.remove_chapter(&target)).await? {
        return Err(Error::not_found("chapter", id));
    }
    Ok(ok(json!({ "id": id })))
}

// -- Ratings --

#[derive(Debug, Deserialize)]
struct RatingBody {
    rating: u8,
}

async fn get_rating(
    State(state): State<AppState>,
    principal: Principal,
    ApiPath(title_id): ApiPath<String>,
) -> ApiResult<serde_json::Value> {
    let rating =
        with_db(&state, move |db| db.get_rating(&principal, &title_id))
            .await?;
    Ok(ok(json!({ "rating": rating })))
}

async fn put_rating(
    State(state): State<AppState>,
    principal: Principal,
    ApiPath(title_id): ApiPath<String>,
    payload: std::result::Result<Json<RatingBody>, JsonRejection>,
) -> ApiResult<crate::model::TitleStats> {
    let body = json_body(payload)?;
    let stats = with_db(&state, move |db| {
        db.rate_title(&principal, &title_id, body.rating)
    })
    .await?;
    Ok(ok(stats))
}

async fn delete_rating(
    State(state): State<AppState>,
    principal: Principal,
    ApiPath(title_id): ApiPath<String>,
) -> ApiResult<crate::model::TitleStats> {
    let target = title_id.clone();
    with_db(&state, move |db| db.remove_rating(&principal, &target))
        .await?
        .map(ok)
        .ok_or_else(|| Error::not_found("rating", title_id))
}

// -- Bookmarks --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewBookmarkBody {
    title_id: String,
    #[serde(default)]
    last_read_chapter: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BookmarkPatch {
    #[serde(default)]
    last_read_chapter: Option<String>,
}

async fn list_bookmarks(
    State(state): State<AppState>,
    principal: Principal,
) -> ApiResult<Vec<crate::model::Bookmark>> {
    Ok(ok(with_db(&state, move |db| db.list_bookmarks(&principal)).await?))
}

async fn add_bookmark(
    State(state): State<AppState>,
    principal: Principal,
    payload: std::result::Result<Json<NewBookmarkBody>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let body = json_body(payload)?;
    let bookmark = with_db(&state, move |db| {
        db.add_bookmark(&principal, &body.title_id, body.last_read_chapter)
    })
    .await?;
    Ok((StatusCode::CREATED, ok(bookmark)))
}

async fn update_bookmark(
    State(state): State<AppState>,
    principal: Principal,
    ApiPath(title_id): ApiPath<String>,
    payload: std::result::Result<Json<BookmarkPatch>, JsonRejection>,
) -> ApiResult<crate::model::Bookmark> {
    let body = json_body(payload)?;
    let bookmark = with_db(&state, move |db| {
        db.update_bookmark(&principal, &title_id, body.last_read_chapter)
    })
    .await?;
    Ok(ok(bookmark))
}

async fn delete_bookmark(
    State(state): State<AppState>,
    principal: Principal,
    ApiPath(title_id): ApiPath<String>,
) -> ApiResult<serde_json::Value> {
    let target = title_id.clone();
    if !with_db(&state, move |db| db.remove_bookmark(&principal, &target))
        .await?
    {
        return Err(Error::not_found("bookmark", title_id));
    }
    Ok(ok(json!({ "titleId": title_id })))
}

async fn health() -> Json<Envelope<serde_json::Value>> {
    ok(json!({ "status": "ok" }))
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            CONTENT_TYPE,
            HeaderName::from_static(USER_ID_HEADER),
            HeaderName::from_static(USER_ROLE_HEADER),
            HeaderName::from_static(USER_BANNED_HEADER),
        ])
        .max_age(state.config.cors_max_age);

    Router::new()
        .route("/health", get(health))
        .route("/api/manga/search", get(search_titles))
        .route("/api/manga", get(list_titles).post(create_title))
        .route("/api/manga/{id}", get(get_title).delete(delete_title))
        .route(
            "/api/manga/{id}/chapters",
            get(list_chapters).post(add_chapter),
        )
        .route("/api/chapters/{id}", delete(delete_chapter))
        .route(
            "/api/manga/{id}/rating",
            get(get_rating).put(put_rating).delete(delete_rating),
        )
        .route("/api/bookmarks", get(list_bookmarks).post(add_bookmark))
        .route(
            "/api/bookmarks/{title_id}",
            delete(delete_bookmark).patch(update_bookmark),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve the catalog until Ctrl+C or SIGTERM.
pub async fn serve(db: CatalogDb, config: ServerConfig) -> Result<()> {
    let bind = config.bind;
    let app = router(AppState::new(db, config));

    let listener = TcpListener::bind(bind).await?;
    info!(%bind, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("failed to install Ctrl+C handler");
        info!("received Ctrl+C, shutting down");
    };

    let terminate = async {
        signal(SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
        info!("received SIGTERM, shutting down");
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
