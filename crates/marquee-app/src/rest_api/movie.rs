use axum::{
    extract::State,
    response::IntoResponse,
    routing::get,
    Json,
};
use garde::Validate;
use http::{header, HeaderMap, StatusCode};
use marquee_dal::{
    filters::validate_filters,
    movie::{validate_movie, Movie, MovieRepository, Runtime, MOVIE_SORT_SAFELIST},
    Filters, Metadata,
};
use marquee_types::Validator;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::{read_csv, read_int, ApiJson, ApiPath, ApiQuery};
use crate::{
    error::{method_not_allowed, ApiError, ApiResult},
    state::AppState,
    validate::Garde,
};

crate::repository_from_request!(MovieRepository);

pub const EXPECTED_VERSION_HEADER: &str = "x-expected-version";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovieEnvelope {
    pub movie: Movie,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoviesEnvelope {
    pub movies: Vec<Movie>,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CreateMovie {
    pub title: String,
    pub year: i32,
    pub runtime: Runtime,
    pub genres: Option<Vec<String>>,
}

/// Partial update, absent fields keep their stored values.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpdateMovie {
    pub title: Option<String>,
    pub year: Option<i32>,
    pub runtime: Option<Runtime>,
    pub genres: Option<Vec<String>>,
}

impl UpdateMovie {
    fn apply(self, movie: &mut Movie) {
        if let Some(title) = self.title {
            movie.title = title;
        }
        if let Some(year) = self.year {
            movie.year = year;
        }
        if let Some(runtime) = self.runtime {
            movie.runtime = runtime;
        }
        if let Some(genres) = self.genres {
            movie.genres = genres;
        }
    }
}

/// Raw listing parameters, paging values are kept as text so that a bad number
/// is reported as a validation failure rather than a rejected query.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct MovieListQuery {
    #[garde(length(max = 255))]
    pub title: Option<String>,
    #[garde(length(max = 1000))]
    pub genres: Option<String>,
    #[garde(skip)]
    pub page: Option<String>,
    #[garde(skip)]
    pub page_size: Option<String>,
    #[garde(length(max = 100))]
    pub sort: Option<String>,
}

fn expected_version(headers: &HeaderMap) -> ApiResult<Option<i64>> {
    headers
        .get(EXPECTED_VERSION_HEADER)
        .map(|value| {
            value
                .to_str()
                .ok()
                .and_then(|s| s.trim().parse::<i64>().ok())
                .ok_or_else(|| {
                    ApiError::InvalidRequest(format!(
                        "{EXPECTED_VERSION_HEADER} header must be an integer value"
                    ))
                })
        })
        .transpose()
}

pub async fn create(
    repository: MovieRepository,
    ApiJson(input): ApiJson<CreateMovie>,
) -> ApiResult<impl IntoResponse> {
    let mut v = Validator::new();
    if input.genres.is_none() {
        v.add_error("genres", "must be provided");
    }
    let mut movie = Movie {
        title: input.title,
        year: input.year,
        runtime: input.runtime,
        genres: input.genres.unwrap_or_default(),
        ..Default::default()
    };
    validate_movie(&mut v, &movie);
    v.finish()?;

    repository.insert(&mut movie).await?;
    let location = format!("/v1/movies/{}", movie.id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(MovieEnvelope { movie }),
    ))
}

pub async fn show(
    ApiPath(id): ApiPath<i64>,
    repository: MovieRepository,
) -> ApiResult<impl IntoResponse> {
    let movie = repository.get(id).await?;
    Ok(Json(MovieEnvelope { movie }))
}

pub async fn update(
    ApiPath(id): ApiPath<i64>,
    repository: MovieRepository,
    headers: HeaderMap,
    ApiJson(input): ApiJson<UpdateMovie>,
) -> ApiResult<impl IntoResponse> {
    let mut movie = repository.get(id).await?;
    if let Some(expected) = expected_version(&headers)? {
        if expected != movie.version {
            debug!(
                "Movie {id} is at version {}, client expected {expected}",
                movie.version
            );
            return Err(ApiError::EditConflict);
        }
    }

    input.apply(&mut movie);
    let mut v = Validator::new();
    validate_movie(&mut v, &movie);
    v.finish()?;

    repository.update(&mut movie).await?;
    Ok(Json(MovieEnvelope { movie }))
}

pub async fn delete(
    ApiPath(id): ApiPath<i64>,
    repository: MovieRepository,
) -> ApiResult<impl IntoResponse> {
    repository.delete(id).await?;
    Ok(Json(json!({"message": "movie successfully deleted"})))
}

pub async fn list(
    repository: MovieRepository,
    State(state): State<AppState>,
    Garde(ApiQuery(query)): Garde<ApiQuery<MovieListQuery>>,
) -> ApiResult<impl IntoResponse> {
    debug!("Listing movies: {query:?}");
    let mut v = Validator::new();
    let page = read_int(&mut v, query.page.as_deref(), "page", 1);
    let page_size = read_int(
        &mut v,
        query.page_size.as_deref(),
        "page_size",
        state.config().default_page_size,
    );
    let sort = query
        .sort
        .as_deref()
        .filter(|s| !s.is_empty())
        .unwrap_or("id");
    let filters = Filters::new(page, page_size, sort, MOVIE_SORT_SAFELIST);
    validate_filters(&mut v, &filters);
    v.finish()?;

    let title = query.title.as_deref().unwrap_or_default();
    let genres = read_csv(query.genres.as_deref());
    let (movies, metadata) = repository.get_all(title, &genres, &filters).await?;
    Ok(Json(MoviesEnvelope { movies, metadata }))
}

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/", get(list).post(create))
        .route("/{id}", get(show).patch(update).delete(delete))
        .method_not_allowed_fallback(method_not_allowed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_rejects_unknown_fields() {
        let res = serde_json::from_str::<CreateMovie>(r#"{"title": "Heat", "rating": 5}"#);
        assert!(res.is_err());

        let input: CreateMovie = serde_json::from_str(r#"{"title": "Heat"}"#).unwrap();
        assert_eq!(input.title, "Heat");
        assert!(input.genres.is_none());
    }

    #[test]
    fn test_partial_update() {
        let mut movie = Movie::new("Heat", 1995, 170, &["crime"]);
        let input: UpdateMovie =
            serde_json::from_str(r#"{"runtime": "171 mins", "genres": ["crime", "drama"]}"#)
                .unwrap();
        input.apply(&mut movie);
        assert_eq!(movie.title, "Heat");
        assert_eq!(movie.year, 1995);
        assert_eq!(movie.runtime, Runtime(171));
        assert_eq!(movie.genres, vec!["crime", "drama"]);
    }

    #[test]
    fn test_expected_version_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(expected_version(&headers).unwrap(), None);

        headers.insert(EXPECTED_VERSION_HEADER, "3".parse().unwrap());
        assert_eq!(expected_version(&headers).unwrap(), Some(3));

        headers.insert(EXPECTED_VERSION_HEADER, "three".parse().unwrap());
        assert!(matches!(
            expected_version(&headers),
            Err(ApiError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_list_query_limits() {
        let query = MovieListQuery {
            sort: Some("x".repeat(101)),
            ..Default::default()
        };
        assert!(query.validate().is_err());
        assert!(MovieListQuery::default().validate().is_ok());
    }

    mod routes {
        use axum::body::{to_bytes, Body};
        use http::{Method, Request};
        use marquee_dal::PoolConfig;
        use tower::ServiceExt as _;

        use super::*;
        use crate::state::AppConfig;

        async fn app() -> axum::Router {
            let config = PoolConfig {
                max_connections: 1,
                ..Default::default()
            };
            let pool = marquee_dal::new_pool_with_config("sqlite::memory:", &config)
                .await
                .unwrap();
            marquee_dal::migrate(&pool).await.unwrap();
            router().with_state(AppState::new(AppConfig::default(), pool))
        }

        async fn call(
            app: axum::Router,
            method: Method,
            uri: &str,
            body: Option<serde_json::Value>,
        ) -> (StatusCode, serde_json::Value) {
            let mut request = Request::builder().method(method).uri(uri);
            let body = match body {
                Some(json) => {
                    request = request.header(header::CONTENT_TYPE, "application/json");
                    Body::from(json.to_string())
                }
                None => Body::empty(),
            };
            let response = app.oneshot(request.body(body).unwrap()).await.unwrap();
            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            (status, serde_json::from_slice(&bytes).unwrap())
        }

        #[tokio::test]
        async fn test_create_and_show() {
            let app = app().await;
            let payload = json!({
                "title": "Heat",
                "year": 1995,
                "runtime": "170 mins",
                "genres": ["crime"]
            });
            let (status, body) = call(app.clone(), Method::POST, "/", Some(payload)).await;
            assert_eq!(status, StatusCode::CREATED);
            assert_eq!(body["movie"]["id"], 1);

            let (status, body) = call(app, Method::GET, "/1", None).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["movie"]["title"], "Heat");
            assert_eq!(body["movie"]["runtime"], "170 mins");
        }

        #[tokio::test]
        async fn test_list_rejects_bad_paging() {
            let (status, body) = call(app().await, Method::GET, "/?page_size=x", None).await;
            assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
            assert_eq!(body["error"]["page_size"], "must be an integer value");
        }

        #[tokio::test]
        async fn test_list_query_checked_before_handler() {
            let uri = format!("/?sort={}", "x".repeat(101));
            let (status, body) = call(app().await, Method::GET, &uri, None).await;
            assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
            assert!(body["error"]["sort"].is_string());
        }

        #[tokio::test]
        async fn test_wrong_method() {
            let (status, body) = call(app().await, Method::PUT, "/1", None).await;
            assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
            assert_eq!(
                body["error"],
                "the PUT method is not supported for this resource"
            );
        }
    }
}
