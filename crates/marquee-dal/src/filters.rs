use std::fmt::Display;

use marquee_types::{validator::permitted_value, Validator};
use serde::Serialize;

use crate::error::{Error, Result};

pub const MAX_PAGE: i64 = 10_000_000;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl Display for SortDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SortDirection::Asc => write!(f, "ASC"),
            SortDirection::Desc => write!(f, "DESC"),
        }
    }
}

/// Sort values a client may ask for, and the columns they resolve to.
///
/// `values` lists every accepted value, including the `-` prefixed descending
/// forms. `columns` maps the bare field name to the SQL column expression.
#[derive(Debug, Clone, Copy)]
pub struct SortSafelist {
    values: &'static [&'static str],
    columns: &'static [(&'static str, &'static str)],
}

impl SortSafelist {
    pub const fn new(
        values: &'static [&'static str],
        columns: &'static [(&'static str, &'static str)],
    ) -> Self {
        Self { values, columns }
    }

    pub fn permits(&self, sort: &str) -> bool {
        permitted_value(&sort, self.values)
    }

    pub fn values(&self) -> &'static [&'static str] {
        self.values
    }

    fn column(&self, field: &str) -> Option<&'static str> {
        self.columns
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, column)| *column)
    }
}

#[derive(Debug, Clone)]
pub struct Filters {
    pub page: i64,
    pub page_size: i64,
    pub sort: String,
    pub sort_safelist: SortSafelist,
}

impl Filters {
    pub fn new(page: i64, page_size: i64, sort: impl Into<String>, safelist: SortSafelist) -> Self {
        Self {
            page,
            page_size,
            sort: sort.into(),
            sort_safelist: safelist,
        }
    }

    /// Column to order by. Filters must be validated before they get here, so
    /// a value outside of the safelist is a bug in the caller.
    pub fn sort_column(&self) -> Result<&'static str> {
        let field = self.sort.strip_prefix('-').unwrap_or(&self.sort);
        if self.sort_safelist.permits(&self.sort) {
            if let Some(column) = self.sort_safelist.column(field) {
                return Ok(column);
            }
        }
        Err(Error::InvalidOrderByField(self.sort.clone()))
    }

    pub fn sort_direction(&self) -> SortDirection {
        if self.sort.starts_with('-') {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        }
    }

    pub fn limit(&self) -> i64 {
        self.page_size
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.page_size
    }
}

pub fn validate_filters(v: &mut Validator, filters: &Filters) {
    v.check(filters.page > 0, "page", "must be greater than zero");
    v.check(
        filters.page <= MAX_PAGE,
        "page",
        "must be a maximum of 10 million",
    );
    v.check(filters.page_size > 0, "page_size", "must be greater than zero");
    v.check(
        filters.page_size <= MAX_PAGE_SIZE,
        "page_size",
        "must be a maximum of 100",
    );
    v.check(
        filters.sort_safelist.permits(&filters.sort),
        "sort",
        "invalid sort value",
    );
}

fn is_zero(n: &i64) -> bool {
    *n == 0
}

/// Paging information for a listing, all zero when nothing matched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Metadata {
    #[serde(skip_serializing_if = "is_zero")]
    pub current_page: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub page_size: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub first_page: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub last_page: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub total_records: i64,
}

impl Metadata {
    pub fn calculate(total_records: i64, page: i64, page_size: i64) -> Self {
        if total_records == 0 || page_size < 1 {
            return Metadata::default();
        }
        Metadata {
            current_page: page,
            page_size,
            first_page: 1,
            last_page: (total_records + page_size - 1) / page_size,
            total_records,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAFELIST: SortSafelist = SortSafelist::new(
        &["id", "title", "-id", "-title"],
        &[("id", "m.id"), ("title", "m.title")],
    );

    fn filters(page: i64, page_size: i64, sort: &str) -> Filters {
        Filters::new(page, page_size, sort, SAFELIST)
    }

    fn errors(f: &Filters) -> Validator {
        let mut v = Validator::new();
        validate_filters(&mut v, f);
        v
    }

    #[test]
    fn test_valid_filters() {
        assert!(errors(&filters(1, 20, "id")).valid());
        assert!(errors(&filters(MAX_PAGE, MAX_PAGE_SIZE, "-title")).valid());
    }

    #[test]
    fn test_page_bounds() {
        let v = errors(&filters(0, 0, "id"));
        assert_eq!(v.errors()["page"], "must be greater than zero");
        assert_eq!(v.errors()["page_size"], "must be greater than zero");

        let v = errors(&filters(MAX_PAGE + 1, MAX_PAGE_SIZE + 1, "id"));
        assert_eq!(v.errors()["page"], "must be a maximum of 10 million");
        assert_eq!(v.errors()["page_size"], "must be a maximum of 100");
    }

    #[test]
    fn test_sort_outside_safelist() {
        for sort in ["year", "--id", "+id", "", "id; DROP TABLE movie", "m.id"] {
            let f = filters(1, 10, sort);
            assert_eq!(errors(&f).errors()["sort"], "invalid sort value");
            assert!(matches!(
                f.sort_column(),
                Err(Error::InvalidOrderByField(s)) if s == sort
            ));
        }
    }

    #[test]
    fn test_sort_column_and_direction() {
        let f = filters(1, 10, "-title");
        assert_eq!(f.sort_column().unwrap(), "m.title");
        assert_eq!(f.sort_direction(), SortDirection::Desc);
        assert_eq!(f.sort_direction().to_string(), "DESC");

        let f = filters(1, 10, "id");
        assert_eq!(f.sort_column().unwrap(), "m.id");
        assert_eq!(f.sort_direction(), SortDirection::Asc);
    }

    #[test]
    fn test_limit_offset() {
        let f = filters(3, 25, "id");
        assert_eq!(f.limit(), 25);
        assert_eq!(f.offset(), 50);
        assert_eq!(filters(1, 5, "id").offset(), 0);
    }

    #[test]
    fn test_metadata() {
        assert_eq!(Metadata::calculate(0, 3, 20), Metadata::default());

        let m = Metadata::calculate(41, 2, 20);
        assert_eq!(m.current_page, 2);
        assert_eq!(m.first_page, 1);
        assert_eq!(m.last_page, 3);
        assert_eq!(m.total_records, 41);

        assert_eq!(Metadata::calculate(40, 1, 20).last_page, 2);
    }

    #[test]
    fn test_empty_metadata_serializes_empty() {
        let json = serde_json::to_string(&Metadata::default()).unwrap();
        assert_eq!(json, "{}");
    }
}
