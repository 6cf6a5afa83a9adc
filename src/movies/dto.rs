use std::collections::HashMap;

use lazy_static::lazy_static;
use serde::Serialize;

use crate::{
    movies::repo_types::{Movie, MoviePatch, NewMovie},
    validation::{Bound, Field, Mode, Schema, Validate},
};

/// Year of the first motion picture.
pub const EARLIEST_YEAR: f64 = 1888.0;
/// How far past the current year a release may be scheduled.
pub const FUTURE_YEARS: i32 = 5;
pub const MAX_PAGE_SIZE: i64 = 100;

fn movie_fields() -> Vec<Field> {
    vec![
        Field::string("title").trim().required(),
        Field::string("genre").trim().required(),
        Field::integer("year")
            .min(Bound::Fixed(EARLIEST_YEAR))
            .max(Bound::CurrentYearPlus(FUTURE_YEARS))
            .required(),
        Field::number("rating")
            .min(Bound::Fixed(0.0))
            .max(Bound::Fixed(10.0))
            .required(),
    ]
}

lazy_static! {
    static ref MOVIE_SCHEMA: Schema = Schema::new(movie_fields());
}

impl Validate for NewMovie {
    const MODE: Mode = Mode::Create;

    fn schema() -> &'static Schema {
        &MOVIE_SCHEMA
    }
}

impl Validate for MoviePatch {
    const MODE: Mode = Mode::Patch;

    fn schema() -> &'static Schema {
        &MOVIE_SCHEMA
    }
}

/// Paging parameters as sent. Values that are not numbers, or are zero, fall
/// back to the defaults instead of failing the request.
#[derive(Debug, Default)]
pub struct Pagination {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl Pagination {
    pub fn from_query(query: &HashMap<String, String>) -> Self {
        Self {
            page: query.get("page").and_then(|v| leading_int(v)),
            limit: query.get("limit").and_then(|v| leading_int(v)),
        }
    }

    /// Clamps to a 1-indexed page and a bounded page size.
    pub fn resolve(&self, default_limit: i64) -> (i64, i64) {
        let page = self.page.filter(|p| *p != 0).unwrap_or(1).max(1);
        let limit = self
            .limit
            .filter(|l| *l != 0)
            .unwrap_or(default_limit)
            .clamp(1, MAX_PAGE_SIZE);
        (page, limit)
    }
}

/// Reads an optional sign and the digits that follow it, ignoring anything
/// after them: `"3abc"` is 3, `"abc"` is nothing.
fn leading_int(raw: &str) -> Option<i64> {
    let s = raw.trim_start();
    let sign_len = usize::from(s.starts_with(['+', '-']));
    let digits = s[sign_len..]
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len() - sign_len);
    if digits == 0 {
        return None;
    }
    s[..sign_len + digits].parse().ok()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoviePage {
    pub movies: Vec<Movie>,
    pub current_page: i64,
    pub total_pages: i64,
    pub total_movies: i64,
}

pub fn total_pages(total: i64, limit: i64) -> i64 {
    (total + limit - 1) / limit
}

/// An id hit yields one record; a title search yields a list.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum FindResult {
    One(Movie),
    Many(Vec<Movie>),
}
