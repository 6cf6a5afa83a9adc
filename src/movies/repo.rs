use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    movies::repo_types::{Movie, MoviePatch, NewMovie},
    store::StoreError,
};

#[async_trait]
pub trait MovieStore: Send + Sync {
    /// Newest first.
    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<Movie>, StoreError>;
    async fn count(&self) -> Result<i64, StoreError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Movie>, StoreError>;
    /// Case-insensitive literal substring match on title.
    async fn search_title(&self, needle: &str) -> Result<Vec<Movie>, StoreError>;
    async fn create(&self, movie: NewMovie) -> Result<Movie, StoreError>;
    async fn update(&self, id: Uuid, patch: MoviePatch) -> Result<Option<Movie>, StoreError>;
    /// Returns whether a record was removed.
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;
}

#[derive(Clone)]
pub struct PgMovieStore {
    db: PgPool,
}

impl PgMovieStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

const MOVIE_COLUMNS: &str = "id, title, genre, year, rating, created_at, updated_at";

/// Escapes LIKE metacharacters so the needle is matched literally.
pub(crate) fn escape_like(needle: &str) -> String {
    let mut out = String::with_capacity(needle.len());
    for c in needle.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[async_trait]
impl MovieStore for PgMovieStore {
    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<Movie>, StoreError> {
        let rows = sqlx::query_as::<_, Movie>(&format!(
            r#"
            SELECT {MOVIE_COLUMNS}
            FROM movies
            ORDER BY created_at DESC, id DESC
            LIMIT $1 OFFSET $2
            "#
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn count(&self) -> Result<i64, StoreError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM movies")
            .fetch_one(&self.db)
            .await?;
        Ok(total)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Movie>, StoreError> {
        let row = sqlx::query_as::<_, Movie>(&format!(
            "SELECT {MOVIE_COLUMNS} FROM movies WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn search_title(&self, needle: &str) -> Result<Vec<Movie>, StoreError> {
        let rows = sqlx::query_as::<_, Movie>(&format!(
            r#"
            SELECT {MOVIE_COLUMNS}
            FROM movies
            WHERE title ILIKE '%' || $1 || '%' ESCAPE '\'
            ORDER BY created_at DESC, id DESC
            "#
        ))
        .bind(escape_like(needle))
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn create(&self, movie: NewMovie) -> Result<Movie, StoreError> {
        let row = sqlx::query_as::<_, Movie>(&format!(
            r#"
            INSERT INTO movies (id, title, genre, year, rating)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {MOVIE_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&movie.title)
        .bind(&movie.genre)
        .bind(movie.year)
        .bind(movie.rating)
        .fetch_one(&self.db)
        .await?;
        Ok(row)
    }

    async fn update(&self, id: Uuid, patch: MoviePatch) -> Result<Option<Movie>, StoreError> {
        let row = sqlx::query_as::<_, Movie>(&format!(
            r#"
            UPDATE movies
               SET title = COALESCE($2, title),
                   genre = COALESCE($3, genre),
                   year = COALESCE($4, year),
                   rating = COALESCE($5, rating),
                   updated_at = now()
             WHERE id = $1
            RETURNING {MOVIE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(patch.title)
        .bind(patch.genre)
        .bind(patch.year)
        .bind(patch.rating)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM movies WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
