use blockscout_service_launcher::launcher::MetricsSettings;
use blockscout_service_launcher::test_server;
use blockscout_service_launcher::tracing::{JaegerSettings, TracingSettings};
use flowtrace_logic::settings::{EngineSettings, JobControllerSettings};
use flowtrace_server::{ExplorerSettings, Settings};
use std::time::Duration;
use url::Url;

async fn init_server() -> Url {
    let (server, base) = test_server::get_test_server_settings();
    let settings = Settings {
        server,
        metrics: MetricsSettings {
            enabled: false,
            ..Default::default()
        },
        tracing: TracingSettings {
            enabled: false,
            ..Default::default()
        },
        jaeger: JaegerSettings {
            enabled: false,
            ..Default::default()
        },
        engine: EngineSettings::default(),
        job_controller: JobControllerSettings::default(),
        explorer: ExplorerSettings {
            base_url: Url::parse("http://127.0.0.1:0").unwrap(),
            api_key: "test-key".to_string(),
            timeout: Duration::from_secs(10),
        },
    };

    test_server::init_server(|| flowtrace_server::run(settings), &base).await;
    base
}

#[tokio::test]
async fn health_check_reports_ok() {
    let base = init_server().await;
    let response: serde_json::Value = test_server::send_get_request(&base, "/health").await;
    assert_eq!(response, serde_json::json!({"status": "ok"}));
}

#[tokio::test]
async fn graph_status_for_unknown_incident_is_not_found() {
    let base = init_server().await;
    let client = reqwest::Client::new();
    let response = client
        .get(base.join("/api/v1/incidents/does-not-exist/graph").unwrap())
        .send()
        .await
        .expect("request failed");
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn starting_a_job_for_unknown_incident_is_not_found() {
    let base = init_server().await;
    let client = reqwest::Client::new();
    let response = client
        .post(base.join("/api/v1/incidents/does-not-exist/graph").unwrap())
        .send()
        .await
        .expect("request failed");
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
}
