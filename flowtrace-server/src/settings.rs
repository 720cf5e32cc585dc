//! Server configuration: the ambient launcher settings (server/metrics/
//! tracing/jaeger) plus the engine, job-controller, and explorer-client
//! settings the logic crate needs to be constructed.

use blockscout_service_launcher::{
    launcher::{ConfigSettings, MetricsSettings, ServerSettings},
    tracing::{JaegerSettings, TracingSettings},
};
use flowtrace_logic::settings::{EngineSettings, JobControllerSettings};
use serde::Deserialize;
use serde_with::serde_as;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub metrics: MetricsSettings,
    #[serde(default)]
    pub tracing: TracingSettings,
    #[serde(default)]
    pub jaeger: JaegerSettings,

    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub job_controller: JobControllerSettings,
    pub explorer: ExplorerSettings,
}

#[serde_as]
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ExplorerSettings {
    pub base_url: url::Url,
    pub api_key: String,
    #[serde(default = "default_explorer_timeout")]
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub timeout: Duration,
}

fn default_explorer_timeout() -> Duration {
    Duration::from_secs(10)
}

impl ConfigSettings for Settings {
    const SERVICE_NAME: &'static str = "FLOWTRACE";
}
