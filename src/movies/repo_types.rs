use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Movie {
    pub id: Uuid,
    pub title: String,
    pub genre: String,
    pub year: i32,
    pub rating: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewMovie {
    pub title: String,
    pub genre: String,
    pub year: i32,
    pub rating: f64,
}

/// Fields present in an update; absent ones keep their stored value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MoviePatch {
    pub title: Option<String>,
    pub genre: Option<String>,
    pub year: Option<i32>,
    pub rating: Option<f64>,
}

impl MoviePatch {
    pub fn apply(self, movie: &mut Movie) {
        if let Some(title) = self.title {
            movie.title = title;
        }
        if let Some(genre) = self.genre {
            movie.genre = genre;
        }
        if let Some(year) = self.year {
            movie.year = year;
        }
        if let Some(rating) = self.rating {
            movie.rating = rating;
        }
    }
}
