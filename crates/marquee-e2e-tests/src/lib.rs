use std::{path::Path, time::Duration};

use anyhow::{Result, anyhow};
use marquee_app::rest_api::movie::MovieEnvelope;
use marquee_dal::movie::Movie;
use marquee_server::config::{Parser, ServerConfig};
use rand::Rng as _;
use reqwest::Url;
use serde_json::json;
use tempfile::TempDir;
use tracing::{debug, info};

fn random_port() -> Result<u16> {
    let mut rng = rand::rng();

    let mut retries = 5;
    while retries > 0 {
        let port: u16 = rng.random_range(40_000..60_000);
        match std::net::TcpListener::bind(("127.0.0.1", port)) {
            Ok(_) => return Ok(port),
            Err(_) => retries -= 1,
        }
    }

    Err(anyhow!("Could not find a free port"))
}

pub struct ConfigGuard {
    #[allow(dead_code)]
    data_dir: TempDir,
}

pub fn test_config(test_name: &str, base_dir: &Path) -> Result<(ServerConfig, ConfigGuard)> {
    let tmp_data_dir = TempDir::with_prefix_in(format!("{}_", test_name), base_dir)?;
    let data_dir = tmp_data_dir.path().to_string_lossy().to_string();
    let port = random_port()?.to_string();
    let args = &[
        "marquee-e2e-tests",
        "--data-dir",
        &data_dir,
        "--port",
        &port,
        "--env",
        "development",
    ];
    let config = ServerConfig::try_parse_from(args)?;
    Ok((
        config,
        ConfigGuard {
            data_dir: tmp_data_dir,
        },
    ))
}

pub async fn prepare_env(test_name: &str) -> Result<(ServerConfig, ConfigGuard)> {
    let base_dir = std::env::temp_dir();
    let (config, guard) = test_config(test_name, &base_dir)?;
    info!("Test {test_name} uses data dir {}", config.data_dir().display());
    Ok((config, guard))
}

pub fn base_url(config: &ServerConfig) -> Result<Url> {
    Ok(Url::parse(&format!(
        "http://{}:{}/",
        config.listen_address, config.port
    ))?)
}

/// Starts the server in background and waits until it accepts connections.
pub async fn spawn_server(config: ServerConfig) -> Result<Url> {
    let url = base_url(&config)?;
    let addr = (config.listen_address.clone(), config.port);
    tokio::spawn(async move {
        if let Err(e) = marquee_server::run::run(config).await {
            panic!("Server failed: {e}");
        }
    });

    for _ in 0..50 {
        if tokio::net::TcpStream::connect(addr.clone()).await.is_ok() {
            debug!("Server is up at {url}");
            return Ok(url);
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    Err(anyhow!("Server did not start in time"))
}

pub async fn create_movie(
    client: &reqwest::Client,
    base_url: &Url,
    title: &str,
    year: i32,
    runtime: i32,
    genres: &[&str],
) -> Result<Movie> {
    let payload = json!({
        "title": title,
        "year": year,
        "runtime": format!("{runtime} mins"),
        "genres": genres,
    });
    let api_url = base_url.join("v1/movies")?;

    let response = client.post(api_url).json(&payload).send().await?;
    if response.status().as_u16() != 201 {
        return Err(anyhow!(
            "Create failed with {}: {}",
            response.status(),
            response.text().await?
        ));
    }

    let envelope: MovieEnvelope = response.json().await?;
    Ok(envelope.movie)
}
