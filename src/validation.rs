//! Declarative payload rules checked before a body reaches a handler.
//!
//! A [`Schema`] is a list of field rules evaluated against the raw JSON
//! object, so every violation is reported at once instead of stopping at the
//! first type mismatch the way plain deserialization would.

use axum::{
    async_trait,
    extract::{FromRequest, Request},
};
use lazy_static::lazy_static;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use time::OffsetDateTime;

use crate::{
    error::{ApiError, FieldError},
    extract::ApiJson,
};

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Required fields must be present.
    Create,
    /// Only fields that are present are checked.
    Patch,
}

/// An upper or lower bound, possibly computed when the check runs.
#[derive(Debug, Clone, Copy)]
pub enum Bound {
    Fixed(f64),
    CurrentYearPlus(i32),
}

impl Bound {
    fn resolve(self) -> f64 {
        match self {
            Bound::Fixed(v) => v,
            Bound::CurrentYearPlus(n) => f64::from(OffsetDateTime::now_utc().year() + n),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Kind {
    String {
        trim: bool,
        min_len: usize,
        email: bool,
        lowercase: bool,
    },
    Integer {
        min: Option<Bound>,
        max: Option<Bound>,
    },
    Number {
        min: Option<Bound>,
        max: Option<Bound>,
    },
    OneOf(&'static [&'static str]),
}

#[derive(Debug, Clone)]
pub struct Field {
    name: &'static str,
    required: bool,
    kind: Kind,
}

impl Field {
    pub fn string(name: &'static str) -> Self {
        Self {
            name,
            required: false,
            kind: Kind::String {
                trim: false,
                min_len: 0,
                email: false,
                lowercase: false,
            },
        }
    }

    pub fn integer(name: &'static str) -> Self {
        Self {
            name,
            required: false,
            kind: Kind::Integer { min: None, max: None },
        }
    }

    pub fn number(name: &'static str) -> Self {
        Self {
            name,
            required: false,
            kind: Kind::Number { min: None, max: None },
        }
    }

    pub fn one_of(name: &'static str, allowed: &'static [&'static str]) -> Self {
        Self {
            name,
            required: false,
            kind: Kind::OneOf(allowed),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn trim(mut self) -> Self {
        if let Kind::String { trim, .. } = &mut self.kind {
            *trim = true;
        }
        self
    }

    pub fn lowercase(mut self) -> Self {
        if let Kind::String { lowercase, .. } = &mut self.kind {
            *lowercase = true;
        }
        self
    }

    pub fn min_len(mut self, n: usize) -> Self {
        if let Kind::String { min_len, .. } = &mut self.kind {
            *min_len = n;
        }
        self
    }

    pub fn email(mut self) -> Self {
        if let Kind::String { email, .. } = &mut self.kind {
            *email = true;
        }
        self
    }

    pub fn min(mut self, bound: Bound) -> Self {
        match &mut self.kind {
            Kind::Integer { min, .. } | Kind::Number { min, .. } => *min = Some(bound),
            _ => {}
        }
        self
    }

    pub fn max(mut self, bound: Bound) -> Self {
        match &mut self.kind {
            Kind::Integer { max, .. } | Kind::Number { max, .. } => *max = Some(bound),
            _ => {}
        }
        self
    }

    fn check(&self, value: &mut Value, out: &mut Vec<FieldError>) {
        let name = self.name;
        let mut fail = |message: String| {
            out.push(FieldError {
                field: name.to_string(),
                message,
            })
        };

        match &self.kind {
            Kind::String {
                trim,
                min_len,
                email,
                lowercase,
            } => {
                let Value::String(s) = value else {
                    fail(format!("\"{name}\" must be a string"));
                    return;
                };
                if *trim {
                    let trimmed = s.trim();
                    if trimmed.len() != s.len() {
                        *s = trimmed.to_string();
                    }
                }
                if *lowercase {
                    *s = s.to_lowercase();
                }
                if s.is_empty() {
                    fail(format!("\"{name}\" is not allowed to be empty"));
                } else if s.chars().count() < *min_len {
                    fail(format!(
                        "\"{name}\" length must be at least {min_len} characters long"
                    ));
                } else if *email && !is_valid_email(s) {
                    fail(format!("\"{name}\" must be a valid email"));
                }
            }
            Kind::Integer { min, max } => {
                let Some(n) = value.as_f64() else {
                    fail(format!("\"{name}\" must be a number"));
                    return;
                };
                if value.as_i64().is_none() {
                    if n.fract() != 0.0 || n.abs() > i64::MAX as f64 {
                        fail(format!("\"{name}\" must be an integer"));
                        return;
                    }
                    // `2010.0` is an integer; store it as one.
                    *value = Value::from(n as i64);
                }
                check_range(name, n, *min, *max, &mut fail);
            }
            Kind::Number { min, max } => {
                let Some(n) = value.as_f64() else {
                    fail(format!("\"{name}\" must be a number"));
                    return;
                };
                check_range(name, n, *min, *max, &mut fail);
            }
            Kind::OneOf(allowed) => match value.as_str() {
                Some(s) if allowed.iter().any(|a| *a == s) => {}
                _ => fail(format!("\"{name}\" must be one of [{}]", allowed.join(", "))),
            },
        }
    }
}

fn check_range(
    name: &str,
    n: f64,
    min: Option<Bound>,
    max: Option<Bound>,
    fail: &mut impl FnMut(String),
) {
    if let Some(min) = min.map(Bound::resolve) {
        if n < min {
            fail(format!("\"{name}\" must be greater than or equal to {min}"));
            return;
        }
    }
    if let Some(max) = max.map(Bound::resolve) {
        if n > max {
            fail(format!("\"{name}\" must be less than or equal to {max}"));
        }
    }
}

#[derive(Debug, Clone)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Checks `body` and returns it with declared normalisations (trimming,
    /// lowercasing) applied. Unknown keys are left alone.
    pub fn validate(&self, body: Value, mode: Mode) -> Result<Value, ApiError> {
        let Value::Object(mut map) = body else {
            return Err(ApiError::BadRequest(
                "Request body must be a JSON object".into(),
            ));
        };

        let mut errors = Vec::new();
        for field in &self.fields {
            match map.get_mut(field.name) {
                Some(value) => field.check(value, &mut errors),
                None if field.required && mode == Mode::Create => errors.push(FieldError {
                    field: field.name.to_string(),
                    message: format!("\"{}\" is required", field.name),
                }),
                None => {}
            }
        }

        if errors.is_empty() {
            Ok(Value::Object(map))
        } else {
            Err(ApiError::Validation(errors))
        }
    }

    pub fn validate_into<T: DeserializeOwned>(&self, body: Value, mode: Mode) -> Result<T, ApiError> {
        let checked = self.validate(body, mode)?;
        serde_json::from_value(checked).map_err(|e| ApiError::BadRequest(e.to_string()))
    }
}

/// A payload type with a declared schema.
pub trait Validate: DeserializeOwned {
    const MODE: Mode;

    fn schema() -> &'static Schema;
}

/// JSON body extractor that runs the payload's schema first.
pub struct Valid<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for Valid<T>
where
    S: Send + Sync,
    T: Validate,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let ApiJson(body) = ApiJson::<Value>::from_request(req, state).await?;
        T::schema().validate_into(body, T::MODE).map(Valid)
    }
}
