use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    auth::{
        repo::UserStore,
        repo_types::{NewUser, User},
    },
    movies::{
        repo::MovieStore,
        repo_types::{Movie, MoviePatch, NewMovie},
    },
    store::StoreError,
};

/// Process-local user table, used for `STORE_BACKEND=memory` and tests.
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<Vec<User>>,
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().await.iter().find(|u| u.id == id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .users
            .read()
            .await
            .iter()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn exists_by_email_or_username(
        &self,
        email: &str,
        username: &str,
    ) -> Result<bool, StoreError> {
        Ok(self
            .users
            .read()
            .await
            .iter()
            .any(|u| u.email == email || u.username == username))
    }

    async fn create(&self, user: NewUser) -> Result<User, StoreError> {
        let mut users = self.users.write().await;
        if users.iter().any(|u| u.email == user.email) {
            return Err(StoreError::Duplicate {
                field: "email".into(),
                value: user.email,
            });
        }
        if users.iter().any(|u| u.username == user.username) {
            return Err(StoreError::Duplicate {
                field: "username".into(),
                value: user.username,
            });
        }
        let now = OffsetDateTime::now_utc();
        let created = User {
            id: Uuid::new_v4(),
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            role: user.role,
            created_at: now,
            updated_at: now,
        };
        users.push(created.clone());
        Ok(created)
    }
}

/// Movies kept in insertion order; listing walks it newest first.
#[derive(Default)]
pub struct MemoryMovieStore {
    movies: RwLock<Vec<Movie>>,
}

#[async_trait]
impl MovieStore for MemoryMovieStore {
    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<Movie>, StoreError> {
        let movies = self.movies.read().await;
        Ok(movies
            .iter()
            .rev()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<i64, StoreError> {
        Ok(self.movies.read().await.len() as i64)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Movie>, StoreError> {
        Ok(self.movies.read().await.iter().find(|m| m.id == id).cloned())
    }

    async fn search_title(&self, needle: &str) -> Result<Vec<Movie>, StoreError> {
        let needle = needle.to_lowercase();
        Ok(self
            .movies
            .read()
            .await
            .iter()
            .rev()
            .filter(|m| m.title.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }

    async fn create(&self, movie: NewMovie) -> Result<Movie, StoreError> {
        let now = OffsetDateTime::now_utc();
        let created = Movie {
            id: Uuid::new_v4(),
            title: movie.title,
            genre: movie.genre,
            year: movie.year,
            rating: movie.rating,
            created_at: now,
            updated_at: now,
        };
        self.movies.write().await.push(created.clone());
        Ok(created)
    }

    async fn update(&self, id: Uuid, patch: MoviePatch) -> Result<Option<Movie>, StoreError> {
        let mut movies = self.movies.write().await;
        let Some(movie) = movies.iter_mut().find(|m| m.id == id) else {
            return Ok(None);
        };
        patch.apply(movie);
        movie.updated_at = OffsetDateTime::now_utc();
        Ok(Some(movie.clone()))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut movies = self.movies.write().await;
        let before = movies.len();
        movies.retain(|m| m.id != id);
        Ok(movies.len() != before)
    }
}
