use std::{fmt::Display, str::FromStr, time::Duration};

use futures::TryStreamExt as _;
use marquee_types::{Validator, validator::unique};
use serde::{Deserialize, Serialize};
use sqlx::{Pool, types::Json};

use crate::{
    DEFAULT_QUERY_TIMEOUT, Error,
    error::Result,
    filters::{Filters, Metadata, SortSafelist},
};

pub const MAX_TITLE_LEN: usize = 500;
pub const FIRST_FILM_YEAR: i32 = 1888;
pub const MAX_GENRES: usize = 5;

pub const MOVIE_SORT_SAFELIST: SortSafelist = SortSafelist::new(
    &[
        "id", "title", "year", "runtime", "-id", "-title", "-year", "-runtime",
    ],
    &[
        ("id", "m.id"),
        ("title", "m.title"),
        ("year", "m.year"),
        ("runtime", "m.runtime"),
    ],
);

/// Movie length in minutes, represented in JSON as `"<n> mins"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, sqlx::Type)]
#[sqlx(transparent)]
pub struct Runtime(pub i32);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid runtime format")]
pub struct InvalidRuntimeFormat;

impl Runtime {
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Display for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} mins", self.0)
    }
}

impl FromStr for Runtime {
    type Err = InvalidRuntimeFormat;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.split(' ').collect::<Vec<_>>().as_slice() {
            [minutes, "mins"] => minutes
                .parse::<i32>()
                .map(Runtime)
                .map_err(|_| InvalidRuntimeFormat),
            _ => Err(InvalidRuntimeFormat),
        }
    }
}

impl Serialize for Runtime {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Runtime {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)
            .map_err(|_| serde::de::Error::custom(InvalidRuntimeFormat))?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

fn is_zero(n: &i32) -> bool {
    *n == 0
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::FromRow)]
#[serde(default)]
pub struct Movie {
    pub id: i64,
    #[serde(skip)]
    pub created_at: Option<time::PrimitiveDateTime>,
    pub title: String,
    #[serde(skip_serializing_if = "is_zero")]
    pub year: i32,
    #[serde(skip_serializing_if = "Runtime::is_zero")]
    pub runtime: Runtime,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[sqlx(json)]
    pub genres: Vec<String>,
    pub version: i64,
}

impl Movie {
    pub fn new(title: impl Into<String>, year: i32, runtime: i32, genres: &[&str]) -> Self {
        Movie {
            title: title.into(),
            year,
            runtime: Runtime(runtime),
            genres: genres.iter().map(|g| g.to_string()).collect(),
            ..Default::default()
        }
    }
}

pub fn validate_movie(v: &mut Validator, movie: &Movie) {
    let current_year = time::OffsetDateTime::now_utc().year();

    v.check(!movie.title.is_empty(), "title", "must be provided");
    v.check(
        movie.title.len() <= MAX_TITLE_LEN,
        "title",
        "must not be more than 500 bytes long",
    );
    v.check(movie.year != 0, "year", "must be provided");
    v.check(
        movie.year >= FIRST_FILM_YEAR,
        "year",
        "must be greater than 1888",
    );
    v.check(movie.year <= current_year, "year", "must not be in the future");
    v.check(!movie.runtime.is_zero(), "runtime", "must be provided");
    v.check(movie.runtime.0 > 0, "runtime", "must be a positive integer");
    v.check(
        !movie.genres.is_empty(),
        "genres",
        "must contain at least 1 genre",
    );
    v.check(
        movie.genres.len() <= MAX_GENRES,
        "genres",
        "must not contain more than 5 genres",
    );
    v.check(
        unique(&movie.genres),
        "genres",
        "must not contain duplicate values",
    );
}

#[derive(Debug, sqlx::FromRow)]
struct MovieListRow {
    total_records: i64,
    #[sqlx(flatten)]
    movie: Movie,
}

/// Turns free text into an FTS5 query requiring every word, or `None` if the
/// text has no searchable words.
fn match_expression(search: &str) -> Option<String> {
    let phrases = search
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(|word| format!("\"{word}\""))
        .collect::<Vec<_>>();
    if phrases.is_empty() {
        None
    } else {
        Some(phrases.join(" "))
    }
}

pub type MovieRepository = MovieRepositoryImpl<Pool<crate::ChosenDB>>;

pub struct MovieRepositoryImpl<E> {
    executor: E,
    timeout: Duration,
}

impl<'c, E> MovieRepositoryImpl<E>
where
    for<'a> &'a E: sqlx::Executor<'c, Database = crate::ChosenDB>,
{
    pub fn new(executor: E) -> Self {
        Self {
            executor,
            timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn bounded<T>(
        &self,
        query: impl Future<Output = std::result::Result<T, sqlx::Error>>,
    ) -> Result<T> {
        Ok(tokio::time::timeout(self.timeout, query).await??)
    }

    /// Stores a new movie, filling in its id, creation time and initial version.
    pub async fn insert(&self, movie: &mut Movie) -> Result<()> {
        const SQL: &str = "INSERT INTO movie (title, year, runtime, genres) VALUES (?, ?, ?, ?)
        RETURNING id, created_at, version";
        let (id, created_at, version): (i64, time::PrimitiveDateTime, i64) = self
            .bounded(
                sqlx::query_as(SQL)
                    .bind(&movie.title)
                    .bind(movie.year)
                    .bind(movie.runtime)
                    .bind(Json(&movie.genres))
                    .fetch_one(&self.executor),
            )
            .await?;

        movie.id = id;
        movie.created_at = Some(created_at);
        movie.version = version;
        Ok(())
    }

    pub async fn get(&self, id: i64) -> Result<Movie> {
        if id < 1 {
            return Err(Error::RecordNotFound(format!("Movie {id}")));
        }
        const SQL: &str = "SELECT id, created_at, title, year, runtime, genres, version
        FROM movie WHERE id = ?";
        self.bounded(
            sqlx::query_as::<_, Movie>(SQL)
                .bind(id)
                .fetch_optional(&self.executor),
        )
        .await?
        .ok_or_else(|| Error::RecordNotFound(format!("Movie {id}")))
    }

    /// Lists movies whose title contains all words of `title` and whose genres
    /// include all of `genres`. Empty arguments do not filter.
    pub async fn get_all(
        &self,
        title: &str,
        genres: &[String],
        filters: &Filters,
    ) -> Result<(Vec<Movie>, Metadata)> {
        let search = if title.is_empty() {
            String::new()
        } else {
            match match_expression(title) {
                Some(expression) => expression,
                None => return Ok((Vec::new(), Metadata::default())),
            }
        };

        let sql = format!(
            "SELECT count(*) OVER() AS total_records,
            m.id, m.created_at, m.title, m.year, m.runtime, m.genres, m.version
            FROM movie m
            WHERE (?1 = '' OR m.id IN (SELECT rowid FROM movie_fts WHERE movie_fts MATCH ?1))
            AND (json_array_length(?2) = 0 OR NOT EXISTS (
                SELECT 1 FROM json_each(?2) AS wanted
                WHERE wanted.value NOT IN (SELECT value FROM json_each(m.genres))))
            ORDER BY {} {}, m.id ASC
            LIMIT ?3 OFFSET ?4",
            filters.sort_column()?,
            filters.sort_direction()
        );

        let rows: Vec<MovieListRow> = self
            .bounded(
                sqlx::query_as::<_, MovieListRow>(&sql)
                    .bind(&search)
                    .bind(Json(genres))
                    .bind(filters.limit())
                    .bind(filters.offset())
                    .fetch(&self.executor)
                    .try_collect(),
            )
            .await?;

        let total_records = rows.first().map(|r| r.total_records).unwrap_or(0);
        let metadata = Metadata::calculate(total_records, filters.page, filters.page_size);
        let movies = rows.into_iter().map(|r| r.movie).collect();
        Ok((movies, metadata))
    }

    /// Writes all mutable fields, provided the stored version still matches
    /// `movie.version`. On success the new version is written back to `movie`.
    pub async fn update(&self, movie: &mut Movie) -> Result<()> {
        const SQL: &str = "UPDATE movie
        SET title = ?, year = ?, runtime = ?, genres = ?, version = version + 1
        WHERE id = ? AND version = ?
        RETURNING version";
        let new_version: Option<i64> = self
            .bounded(
                sqlx::query_scalar(SQL)
                    .bind(&movie.title)
                    .bind(movie.year)
                    .bind(movie.runtime)
                    .bind(Json(&movie.genres))
                    .bind(movie.id)
                    .bind(movie.version)
                    .fetch_optional(&self.executor),
            )
            .await?;

        match new_version {
            Some(version) => {
                movie.version = version;
                Ok(())
            }
            None => Err(Error::EditConflict {
                id: movie.id,
                version: movie.version,
            }),
        }
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        if id < 1 {
            return Err(Error::RecordNotFound(format!("Movie {id}")));
        }
        let res = self
            .bounded(
                sqlx::query("DELETE FROM movie WHERE id = ?")
                    .bind(id)
                    .execute(&self.executor),
            )
            .await?;

        if res.rows_affected() == 0 {
            Err(Error::RecordNotFound(format!("Movie {id}")))
        } else {
            Ok(())
        }
    }
}
