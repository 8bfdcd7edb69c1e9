use std::ops::Deref;

use axum::extract::FromRequest;
use axum::extract::FromRequestParts;
use marquee_types::Validator;

use crate::error::ApiError;

pub mod movie;

/// JSON body extractor reporting failures as [`ApiError`].
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

/// Path extractor, any unparsable path parameter is reported as not found.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

impl<T> Deref for ApiJson<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> Deref for ApiQuery<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Parses an optional integer query value, recording a failure for `field`
/// and falling back to `default` when it is not a number.
pub(crate) fn read_int(v: &mut Validator, value: Option<&str>, field: &str, default: i64) -> i64 {
    match value {
        None | Some("") => default,
        Some(s) => s.parse().unwrap_or_else(|_| {
            v.add_error(field, "must be an integer value");
            default
        }),
    }
}

pub(crate) fn read_csv(value: Option<&str>) -> Vec<String> {
    value
        .map(|s| {
            s.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_int() {
        let mut v = Validator::new();
        assert_eq!(read_int(&mut v, None, "page", 1), 1);
        assert_eq!(read_int(&mut v, Some("7"), "page", 1), 7);
        assert!(v.valid());

        assert_eq!(read_int(&mut v, Some("seven"), "page", 1), 1);
        assert_eq!(v.errors()["page"], "must be an integer value");
    }

    #[test]
    fn test_read_csv() {
        assert!(read_csv(None).is_empty());
        assert!(read_csv(Some("")).is_empty());
        assert_eq!(read_csv(Some("drama, war,,")), vec!["drama", "war"]);
    }
}
