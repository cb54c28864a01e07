use crate::{
    app::{
        errors::{AppError, ErrorEnvelope},
        service::ProgramService,
    },
    auth::TokenTable,
    config::Config,
    programs::{BookmarkSort, CategoryEntry, LikeStatus, Page, ProgramView, Rating, SortMode},
};
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tokio::signal;

#[derive(Clone)]
pub struct SharedState {
    service: Arc<ProgramService>,
    tokens: Arc<TokenTable>,
    default_page_size: u32,
}

impl SharedState {
    pub fn new(service: Arc<ProgramService>, config: &Config) -> Self {
        Self {
            service,
            tokens: Arc::new(TokenTable::new(&config.server.tokens)),
            default_page_size: config.search.default_page_size,
        }
    }

    fn authenticate(&self, headers: &HeaderMap) -> Result<String, HttpError> {
        let header = headers.get(AUTHORIZATION).and_then(|value| value.to_str().ok());
        self.tokens
            .resolve(header)
            .map(str::to_string)
            .ok_or(HttpError(AppError::Unauthenticated))
    }
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/programs", get(list_programs))
        .route("/programs/categories", get(categories))
        .route("/programs/examples", get(examples))
        .route("/programs/examples/:id", get(example))
        .route("/programs/search/latest", get(search_latest))
        .route("/programs/search/rank", get(search_rank))
        .route("/programs/:id", get(get_program))
        .route("/programs/:id/bookmark", post(bookmark).delete(unbookmark))
        .route("/programs/:id/like", post(like).delete(unlike))
        .route("/programs/:id/dislike", post(dislike).delete(undislike))
        .route("/users/me/bookmarks", get(user_bookmarks))
        .route("/users/me/preferences", put(submit_preferences))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO))
                .on_response(tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO)),
        )
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            log::error!("failed to listen for Ctrl+C: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                log::error!("failed to install SIGTERM handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    log::warn!("shutting down");
}

async fn start_app(service: Arc<ProgramService>, config: Config) -> anyhow::Result<()> {
    let state = SharedState::new(service, &config);
    if state.tokens.is_empty() {
        log::warn!("server.tokens is empty, every request will be rejected");
    }

    let listener = tokio::net::TcpListener::bind(&config.server.listen).await?;
    log::info!("listening on {}", config.server.listen);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

pub fn start_daemon(service: Arc<ProgramService>, config: Config) -> anyhow::Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(start_app(service, config))
}

#[derive(Debug)]
pub struct HttpError(AppError);

impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            log::error!("{:?}", self.0);
        }

        let body = ErrorEnvelope {
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl<E> From<E> for HttpError
where
    E: Into<AppError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

fn rejected(err: impl std::fmt::Display) -> HttpError {
    HttpError(AppError::Validation(err.to_string()))
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    pub category: Option<String>,
    pub page: Option<i64>,
    pub size: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub query: String,
    pub category: Option<String>,
    pub page: Option<i64>,
    pub size: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookmarkParams {
    pub sort: Option<String>,
    pub page: Option<i64>,
    pub size: Option<i64>,
}

type PageResult = Result<Json<Page<ProgramView>>, HttpError>;

async fn list_programs(
    State(state): State<SharedState>,
    headers: HeaderMap,
    params: Result<Query<ListParams>, QueryRejection>,
) -> PageResult {
    let user = state.authenticate(&headers)?;
    let Query(params) = params.map_err(rejected)?;
    let size = params.size.unwrap_or(state.default_page_size.into());

    tokio::task::block_in_place(move || {
        let page = state
            .service
            .get_programs(&user, params.category.as_deref(), params.page.unwrap_or(0), size)?;
        Ok(Json(page))
    })
}

async fn get_program(
    State(state): State<SharedState>,
    headers: HeaderMap,
    id: Result<Path<u64>, PathRejection>,
) -> Result<Json<ProgramView>, HttpError> {
    let user = state.authenticate(&headers)?;
    let Path(id) = id.map_err(rejected)?;

    tokio::task::block_in_place(move || Ok(Json(state.service.get_program(&user, id)?)))
}

async fn categories(State(state): State<SharedState>, headers: HeaderMap) -> Result<Json<Vec<CategoryEntry>>, HttpError> {
    state.authenticate(&headers)?;
    Ok(Json(state.service.categories()))
}

async fn examples(State(state): State<SharedState>, headers: HeaderMap) -> Result<Json<Vec<ProgramView>>, HttpError> {
    let user = state.authenticate(&headers)?;

    tokio::task::block_in_place(move || Ok(Json(state.service.examples(&user)?)))
}

async fn example(
    State(state): State<SharedState>,
    headers: HeaderMap,
    id: Result<Path<u64>, PathRejection>,
) -> Result<Json<ProgramView>, HttpError> {
    let user = state.authenticate(&headers)?;
    let Path(id) = id.map_err(rejected)?;

    tokio::task::block_in_place(move || Ok(Json(state.service.example(&user, id)?)))
}

fn search(state: SharedState, headers: &HeaderMap, params: Result<Query<SearchParams>, QueryRejection>, sort: SortMode) -> PageResult {
    let user = state.authenticate(headers)?;
    let Query(params) = params.map_err(rejected)?;
    let size = params.size.unwrap_or(state.default_page_size.into());

    tokio::task::block_in_place(move || {
        let page = state.service.search(
            &user,
            &params.query,
            params.category.as_deref(),
            sort,
            params.page.unwrap_or(0),
            size,
        )?;
        Ok(Json(page))
    })
}

async fn search_latest(
    State(state): State<SharedState>,
    headers: HeaderMap,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> PageResult {
    search(state, &headers, params, SortMode::Latest)
}

async fn search_rank(
    State(state): State<SharedState>,
    headers: HeaderMap,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> PageResult {
    search(state, &headers, params, SortMode::Rank)
}

fn set_bookmark(state: SharedState, headers: &HeaderMap, id: Result<Path<u64>, PathRejection>, on: bool) -> Result<StatusCode, HttpError> {
    let user = state.authenticate(headers)?;
    let Path(id) = id.map_err(rejected)?;

    tokio::task::block_in_place(move || {
        state.service.set_bookmark(&user, id, on)?;
        Ok(StatusCode::OK)
    })
}

async fn bookmark(State(state): State<SharedState>, headers: HeaderMap, id: Result<Path<u64>, PathRejection>) -> Result<StatusCode, HttpError> {
    set_bookmark(state, &headers, id, true)
}

async fn unbookmark(State(state): State<SharedState>, headers: HeaderMap, id: Result<Path<u64>, PathRejection>) -> Result<StatusCode, HttpError> {
    set_bookmark(state, &headers, id, false)
}

fn set_reaction(
    state: SharedState,
    headers: &HeaderMap,
    id: Result<Path<u64>, PathRejection>,
    status: LikeStatus,
    on: bool,
) -> Result<StatusCode, HttpError> {
    let user = state.authenticate(headers)?;
    let Path(id) = id.map_err(rejected)?;

    tokio::task::block_in_place(move || {
        state.service.set_reaction(&user, id, status, on)?;
        Ok(StatusCode::OK)
    })
}

async fn like(State(state): State<SharedState>, headers: HeaderMap, id: Result<Path<u64>, PathRejection>) -> Result<StatusCode, HttpError> {
    set_reaction(state, &headers, id, LikeStatus::Like, true)
}

async fn unlike(State(state): State<SharedState>, headers: HeaderMap, id: Result<Path<u64>, PathRejection>) -> Result<StatusCode, HttpError> {
    set_reaction(state, &headers, id, LikeStatus::Like, false)
}

async fn dislike(State(state): State<SharedState>, headers: HeaderMap, id: Result<Path<u64>, PathRejection>) -> Result<StatusCode, HttpError> {
    set_reaction(state, &headers, id, LikeStatus::Dislike, true)
}

async fn undislike(State(state): State<SharedState>, headers: HeaderMap, id: Result<Path<u64>, PathRejection>) -> Result<StatusCode, HttpError> {
    set_reaction(state, &headers, id, LikeStatus::Dislike, false)
}

async fn user_bookmarks(
    State(state): State<SharedState>,
    headers: HeaderMap,
    params: Result<Query<BookmarkParams>, QueryRejection>,
) -> PageResult {
    let user = state.authenticate(&headers)?;
    let Query(params) = params.map_err(rejected)?;

    let sort = match params.sort.as_deref().map(str::trim) {
        None | Some("") => BookmarkSort::default(),
        Some(code) => code.parse::<BookmarkSort>().map_err(rejected)?,
    };
    let size = params.size.unwrap_or(state.default_page_size.into());

    tokio::task::block_in_place(move || {
        let page = state
            .service
            .user_bookmarks(&user, sort, params.page.unwrap_or(0), size)?;
        Ok(Json(page))
    })
}

async fn submit_preferences(
    State(state): State<SharedState>,
    headers: HeaderMap,
    ratings: Result<Json<Vec<Rating>>, JsonRejection>,
) -> Result<StatusCode, HttpError> {
    let user = state.authenticate(&headers)?;
    let Json(ratings) = ratings.map_err(rejected)?;

    log::debug!("payload: {ratings:?}");

    tokio::task::block_in_place(move || {
        state.service.submit_preferences(&user, &ratings)?;
        Ok(StatusCode::OK)
    })
}
