use std::{collections::BTreeMap, fmt::Display, hash::Hash};

use serde::Serialize;

pub type FieldErrors = BTreeMap<String, String>;

/// Accumulates validation failures keyed by field name.
///
/// Only the first failure recorded for a field is kept, so the order in which
/// checks are applied decides which message the client sees.
#[derive(Debug, Clone, Default)]
pub struct Validator {
    errors: FieldErrors,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors
            .entry(field.into())
            .or_insert_with(|| message.into());
    }

    pub fn check(&mut self, condition: bool, field: &str, message: &str) {
        if !condition {
            self.add_error(field, message);
        }
    }

    pub fn errors(&self) -> &FieldErrors {
        &self.errors
    }

    pub fn finish(self) -> Result<(), ValidationErrors> {
        if self.valid() {
            Ok(())
        } else {
            Err(ValidationErrors(self.errors))
        }
    }
}

impl From<garde::Report> for Validator {
    fn from(report: garde::Report) -> Self {
        let mut validator = Validator::new();
        for (path, error) in report.iter() {
            validator.add_error(path.to_string(), error.message());
        }
        validator
    }
}

/// True if no value occurs more than once.
pub fn unique<T: Eq + Hash>(values: &[T]) -> bool {
    let mut seen = std::collections::HashSet::with_capacity(values.len());
    values.iter().all(|v| seen.insert(v))
}

pub fn permitted_value<T: PartialEq>(value: &T, permitted: &[T]) -> bool {
    permitted.contains(value)
}

/// Field name to first failure message, as produced by a failed [`Validator`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(FieldErrors);

impl ValidationErrors {
    pub fn fields(&self) -> &FieldErrors {
        &self.0
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }
}

impl Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "validation failed")?;
        for (i, (field, message)) in self.0.iter().enumerate() {
            let sep = if i == 0 { ": " } else { ", " };
            write!(f, "{sep}{field} {message}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

impl From<garde::Report> for ValidationErrors {
    fn from(report: garde::Report) -> Self {
        ValidationErrors(Validator::from(report).errors)
    }
}
