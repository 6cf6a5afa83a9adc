//! Persistence seams: store traits live next to their domain (`auth::repo`,
//! `movies::repo`); this module holds the shared error type and the
//! in-memory backend.

use lazy_static::lazy_static;
use regex::Regex;
use sqlx::postgres::PgDatabaseError;

pub mod memory;

const UNIQUE_VIOLATION: &str = "23505";

lazy_static! {
    // Postgres detail text: `Key (email)=(a@b.io) already exists.`
    static ref DUPLICATE_KEY_RE: Regex =
        Regex::new(r"Key \((?P<field>[^)]+)\)=\((?P<value>.*)\) already exists").unwrap();
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("duplicate value for {field}: {value}")]
    Duplicate { field: String, value: String },
    #[error("corrupt record: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.code().as_deref() == Some(UNIQUE_VIOLATION) {
                let detail = db
                    .try_downcast_ref::<PgDatabaseError>()
                    .and_then(|pg| pg.detail())
                    .unwrap_or_default();
                let (field, value) = parse_duplicate_detail(detail)
                    .unwrap_or_else(|| (db.constraint().unwrap_or("unknown").to_string(), String::new()));
                return StoreError::Duplicate { field, value };
            }
        }
        StoreError::Database(err)
    }
}

fn parse_duplicate_detail(detail: &str) -> Option<(String, String)> {
    let caps = DUPLICATE_KEY_RE.captures(detail)?;
    Some((caps["field"].to_string(), caps["value"].to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_detail_yields_field_and_value() {
        let parsed = parse_duplicate_detail("Key (email)=(ann@example.com) already exists.");
        assert_eq!(
            parsed,
            Some(("email".to_string(), "ann@example.com".to_string()))
        );
        assert_eq!(parse_duplicate_detail("something else"), None);
    }

    #[test]
    fn non_database_errors_stay_opaque() {
        let err = StoreError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, StoreError::Database(sqlx::Error::RowNotFound)));
    }
}
