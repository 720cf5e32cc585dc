//! The externally observable error taxonomy. Every non-success job
//! terminates in one of these, surfaced to the repository as an
//! `error_code` string and to callers as a typed error.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FlowTraceError {
    #[error("incident {0} not found")]
    IncidentNotFound(String),

    #[error("a graph job is already processing incident {0}")]
    AlreadyProcessing(String),

    #[error("etherscan-style API rate limit: {0}")]
    ApiRateLimited(String),

    #[error("etherscan-style API error: {0}")]
    ApiUpstream(String),

    #[error("processing timed out after {0:?}")]
    ProcessingTimeout(std::time::Duration),

    #[error("job cancelled")]
    JobCancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl FlowTraceError {
    /// The stable string code persisted alongside the error, per the
    /// taxonomy in the job-reporting contract.
    pub fn code(&self) -> &'static str {
        match self {
            FlowTraceError::IncidentNotFound(_) => "INCIDENT_NOT_FOUND",
            FlowTraceError::AlreadyProcessing(_) => "ALREADY_PROCESSING",
            FlowTraceError::ApiRateLimited(_) => "ETHERSCAN_API_LIMIT",
            FlowTraceError::ApiUpstream(_) => "ETHERSCAN_API_ERROR",
            FlowTraceError::ProcessingTimeout(_) => "PROCESSING_TIMEOUT",
            FlowTraceError::JobCancelled => "JOB_CANCELLED",
            FlowTraceError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}
