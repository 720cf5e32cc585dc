//! The job-control HTTP surface (§6). Deliberately thin: three routes over
//! the [`JobController`], no request validation or CORS policy beyond what
//! actix-web and the launcher's [`CorsSettings`] provide out of the box —
//! that plumbing is explicitly out of scope for this service.
//!
//! This service has no gRPC surface, so it does not go through
//! `blockscout_service_launcher::launcher::launch` (which always expects a
//! `tonic` router to serve alongside HTTP). It drives `actix_web::HttpServer`
//! directly instead, reusing the launcher's `ServerSettings`/`MetricsSettings`
//! shapes and `middleware::Condition`-gated CORS the same way `launch` does
//! internally.

use crate::settings::Settings;
use actix_web::middleware::Condition;
use actix_web::{web, App, HttpResponse, HttpServer};
use blockscout_service_launcher::launcher::{MetricsSettings, ServerSettings};
use flowtrace_logic::classifier::AddressClassifier;
use flowtrace_logic::error::FlowTraceError;
use flowtrace_logic::job::JobController;
use flowtrace_logic::repository::Repository;
use flowtrace_logic::source::{CachingTransactionSource, ExplorerClient};
use serde::Serialize;
use std::sync::Arc;

const SERVICE_NAME: &str = "flowtrace";

fn configure(controller: Arc<JobController>, repository: Arc<dyn Repository>) -> impl Fn(&mut web::ServiceConfig) + Clone {
    move |service_config: &mut web::ServiceConfig| {
        service_config
            .app_data(web::Data::new(controller.clone()))
            .app_data(web::Data::new(repository.clone()))
            .route("/health", web::get().to(health))
            .route("/api/v1/incidents/{incident_id}/graph", web::post().to(start_job))
            .route("/api/v1/incidents/{incident_id}/graph", web::get().to(job_status));
    }
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({"status": "ok"}))
}

#[derive(Serialize)]
struct StartResponse {
    status: &'static str,
    job_id: String,
    estimated_completion: chrono::DateTime<chrono::Utc>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error_code: &'static str,
    message: String,
}

async fn start_job(controller: web::Data<Arc<JobController>>, path: web::Path<String>) -> HttpResponse {
    let incident_id = path.into_inner();
    match controller.start(&incident_id).await {
        Ok(accepted) => HttpResponse::Accepted().json(StartResponse {
            status: "accepted",
            job_id: accepted.job_id,
            estimated_completion: accepted.estimated_completion,
        }),
        Err(err @ FlowTraceError::AlreadyProcessing(_)) => HttpResponse::Conflict().json(ErrorResponse {
            error_code: err.code(),
            message: err.to_string(),
        }),
        Err(err @ FlowTraceError::IncidentNotFound(_)) => HttpResponse::NotFound().json(ErrorResponse {
            error_code: err.code(),
            message: err.to_string(),
        }),
        Err(err) => HttpResponse::InternalServerError().json(ErrorResponse {
            error_code: err.code(),
            message: err.to_string(),
        }),
    }
}

async fn job_status(repository: web::Data<Arc<dyn Repository>>, path: web::Path<String>) -> HttpResponse {
    let incident_id = path.into_inner();
    match repository.get_graph_status(&incident_id).await {
        Ok(Some(status)) => HttpResponse::Ok().json(serde_json::json!({
            "status": status.status.as_str(),
            "progress": status.progress,
            "current_step": status.current_step,
            "error_code": status.error_code,
            "error_message": status.error_message,
        })),
        Ok(None) => HttpResponse::NotFound().json(ErrorResponse {
            error_code: "NOT_FOUND",
            message: format!("no job recorded for incident {incident_id}"),
        }),
        Err(err) => HttpResponse::InternalServerError().json(ErrorResponse {
            error_code: "INTERNAL_ERROR",
            message: err.to_string(),
        }),
    }
}

fn build_collaborators(settings: &Settings) -> (Arc<JobController>, Arc<dyn Repository>) {
    let repository: Arc<dyn Repository> = Arc::new(flowtrace_logic::repository::InMemoryRepository::default());

    let fetcher = ExplorerClient::new(
        settings.explorer.base_url.to_string(),
        settings.explorer.api_key.clone(),
        settings.explorer.timeout,
    );
    let source: Arc<dyn flowtrace_logic::source::TransactionSource> = Arc::new(CachingTransactionSource::new(
        fetcher,
        settings.engine.cache_ttl,
        flowtrace_logic::source::default_retry_delays(),
    ));

    let classifier = Arc::new(AddressClassifier::with_known_directory());

    let controller = JobController::new(
        repository.clone(),
        source,
        classifier,
        settings.engine.clone(),
        settings.job_controller.clone(),
    );

    (controller, repository)
}

fn run_http_server(
    server: ServerSettings,
    http_middleware: Option<actix_web_prom::PrometheusMetrics>,
    configure: impl Fn(&mut web::ServiceConfig) + Clone + Send + Sync + 'static,
) -> std::io::Result<actix_web::dev::Server> {
    let http = server.http;
    let json_cfg = web::JsonConfig::default().limit(http.max_body_size);
    let cors_settings = http.cors.clone();
    let cors_enabled = cors_settings.enabled;

    tracing::info!(addr = %http.addr, "starting http server");
    let server = HttpServer::new(move || {
        let cors = cors_settings.clone().build();
        let app = App::new()
            .wrap(Condition::new(cors_enabled, cors))
            .app_data(json_cfg.clone())
            .configure(configure.clone());
        match &http_middleware {
            Some(mw) => app.wrap(mw.clone()).boxed(),
            None => app.boxed(),
        }
    })
    .bind(http.addr)?
    .run();
    Ok(server)
}

fn run_metrics_server(metrics: &MetricsSettings) -> std::io::Result<actix_web::dev::Server> {
    let registry = prometheus::default_registry();
    let const_labels = std::collections::HashMap::from([("service_name".into(), SERVICE_NAME.into())]);
    let metrics_middleware = actix_web_prom::PrometheusMetricsBuilder::new("rust_microservices")
        .registry(registry.clone())
        .endpoint(&metrics.route)
        .const_labels(const_labels)
        .build()
        .expect("invalid prometheus metrics configuration");

    tracing::info!(addr = %metrics.addr, "starting metrics server");
    Ok(HttpServer::new(move || App::new().wrap(metrics_middleware.clone()))
        .bind(metrics.addr)?
        .run())
}

pub async fn run(settings: Settings) -> Result<(), anyhow::Error> {
    blockscout_service_launcher::tracing::init_logs(SERVICE_NAME, &settings.tracing, &settings.jaeger)?;

    if !settings.server.http.enabled {
        anyhow::bail!("http server is disabled in configuration; flowtrace-server has no other transport to serve");
    }

    let (controller, repository) = build_collaborators(&settings);
    let routes = configure(controller, repository);

    let http_middleware = settings.metrics.enabled.then(|| {
        actix_web_prom::PrometheusMetricsBuilder::new(SERVICE_NAME)
            .registry(prometheus::default_registry().clone())
            .build()
            .expect("invalid prometheus metrics configuration")
    });

    let mut futures = vec![tokio::spawn(run_http_server(settings.server, http_middleware, routes)?)];
    if settings.metrics.enabled {
        futures.push(tokio::spawn(run_metrics_server(&settings.metrics)?));
    }

    let (res, _, others) = futures::future::select_all(futures).await;
    for future in others {
        future.abort();
    }
    res??;
    Ok(())
}
