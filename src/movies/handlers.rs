use std::collections::HashMap;

use axum::{
    extract::State,
    routing::{get, post, put},
    Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    auth::extractors::{AdminUser, AuthUser},
    error::ApiError,
    extract::{parse_id, ApiPath, ApiQuery},
    movies::{
        dto::{total_pages, FindResult, MoviePage, Pagination},
        repo_types::{Movie, MoviePatch, NewMovie},
    },
    response::{ApiResponse, ApiResult},
    state::AppState,
    validation::Valid,
};

const MOVIE_NOT_FOUND: &str = "Movie not found";

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/movies", get(list_movies))
        .route("/movies/find", get(find_movie))
        .route("/movies/:id", get(get_movie))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/movies", post(create_movie))
        .route("/movies/:id", put(update_movie).delete(delete_movie))
}

#[instrument(skip(state, _user))]
pub async fn list_movies(
    State(state): State<AppState>,
    _user: AuthUser,
    ApiQuery(query): ApiQuery<HashMap<String, String>>,
) -> ApiResult<MoviePage> {
    let (page, limit) = Pagination::from_query(&query).resolve(state.config.default_page_size);
    let offset = (page - 1).saturating_mul(limit);

    let movies = state.movies.list(offset, limit).await?;
    let total = state.movies.count().await?;

    Ok(ApiResponse::ok(MoviePage {
        movies,
        current_page: page,
        total_pages: total_pages(total, limit),
        total_movies: total,
    }))
}

#[instrument(skip(state, _user))]
pub async fn get_movie(
    State(state): State<AppState>,
    _user: AuthUser,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<Movie> {
    let id = parse_id(&id)?;
    let movie = state
        .movies
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(MOVIE_NOT_FOUND.into()))?;
    Ok(ApiResponse::ok(movie))
}

/// `q` that parses as an id is looked up directly first; otherwise, or on a
/// miss, it is matched against titles. A repeated `q` keeps its last value.
#[instrument(skip(state, _user))]
pub async fn find_movie(
    State(state): State<AppState>,
    _user: AuthUser,
    ApiQuery(query): ApiQuery<HashMap<String, String>>,
) -> ApiResult<FindResult> {
    let q = query
        .get("q")
        .map(String::as_str)
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Query parameter 'q' is required".into()))?;

    if let Ok(id) = Uuid::parse_str(q) {
        if let Some(movie) = state.movies.find_by_id(id).await? {
            return Ok(ApiResponse::ok(FindResult::One(movie)));
        }
    }

    let results = state.movies.search_title(q).await?;
    if results.is_empty() {
        return Err(ApiError::NotFound(
            "No movies found matching your query".into(),
        ));
    }
    Ok(ApiResponse::ok(FindResult::Many(results)))
}

#[instrument(skip(state, admin, payload), fields(admin_id = %admin.user.id))]
pub async fn create_movie(
    State(state): State<AppState>,
    admin: AdminUser,
    Valid(payload): Valid<NewMovie>,
) -> ApiResult<Movie> {
    let movie = state.movies.create(payload).await?;
    info!(movie_id = %movie.id, title = %movie.title, "movie created");
    Ok(ApiResponse::created(movie).with_message("Movie created successfully"))
}

#[instrument(skip(state, admin, payload), fields(admin_id = %admin.user.id))]
pub async fn update_movie(
    State(state): State<AppState>,
    admin: AdminUser,
    ApiPath(id): ApiPath<String>,
    Valid(payload): Valid<MoviePatch>,
) -> ApiResult<Movie> {
    let id = parse_id(&id)?;
    let movie = state
        .movies
        .update(id, payload)
        .await?
        .ok_or_else(|| ApiError::NotFound(MOVIE_NOT_FOUND.into()))?;
    info!(movie_id = %movie.id, "movie updated");
    Ok(ApiResponse::ok(movie).with_message("Movie updated successfully"))
}

#[instrument(skip(state, admin), fields(admin_id = %admin.user.id))]
pub async fn delete_movie(
    State(state): State<AppState>,
    admin: AdminUser,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<()> {
    let id = parse_id(&id)?;
    if !state.movies.delete(id).await? {
        return Err(ApiError::NotFound(MOVIE_NOT_FOUND.into()));
    }
    info!(movie_id = %id, "movie deleted");
    Ok(ApiResponse::ok(()).with_message("Movie deleted successfully"))
}
