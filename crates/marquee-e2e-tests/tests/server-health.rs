use marquee_e2e_tests::{prepare_env, spawn_server};
use tracing::info;
use tracing_test::traced_test;

#[tokio::test]
#[traced_test]
async fn test_health() {
    let (args, _config_guard) = prepare_env("test_health").await.unwrap();
    let base_url = spawn_server(args).await.unwrap();

    let client = reqwest::Client::new();

    let url = base_url.join("v1/healthcheck").unwrap();
    let response = client.get(url).send().await.unwrap();
    info!("Response: {:#?}", response);
    assert!(response.status().is_success());

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "available");
    assert_eq!(body["system_info"]["environment"], "development");
    assert_eq!(body["system_info"]["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
#[traced_test]
async fn test_unknown_route_and_method() {
    let (args, _config_guard) = prepare_env("test_routes").await.unwrap();
    let base_url = spawn_server(args).await.unwrap();
    let client = reqwest::Client::new();

    let response = client
        .get(base_url.join("v1/nothing").unwrap())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "the requested resource could not be found");

    let response = client
        .post(base_url.join("v1/healthcheck").unwrap())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 405);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(
        body["error"],
        "the POST method is not supported for this resource"
    );

    let response = client
        .put(base_url.join("v1/movies/1").unwrap())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 405);
}
