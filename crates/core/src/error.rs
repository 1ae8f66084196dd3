use serde::{Deserialize, Serialize};

/// Failures surfaced by the cluster and archive gateways.
///
/// Gateways never retry; they translate their backend's failure into one of
/// these and let the orchestrator decide what to do with it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum GatewayError {
    /// Backend unreachable, timed out, rejected credentials or answered with
    /// an unexpected server error.
    #[error("transport: {0}")]
    Transport(String),
    /// The object being created is already present.
    #[error("conflict: {0} already exists")]
    Conflict(String),
    #[error("not_found: {0}")]
    NotFound(String),
    /// Local configuration (template, container name, credentials) is missing
    /// or unusable.
    #[error("configuration: {0}")]
    Configuration(String),
}

impl GatewayError {
    /// Only transport failures are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Transport(_))
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors of the read-only paths (status, list). Create never returns an
/// error; it folds everything into a `ProvisioningResult`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum ProvisionError {
    #[error("cluster unavailable: {0}")]
    ClusterUnavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid namespace name {name:?}: {reason}")]
pub struct NameError {
    pub name: String,
    pub reason: &'static str,
}

/// Why a configuration document could not be produced for archival.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("template missing: {0}")]
    Missing(String),
    #[error("template has no {0} placeholder")]
    NoPlaceholder(&'static str),
    #[error("rendered template is not valid YAML: {0}")]
    Malformed(String),
}

impl From<TemplateError> for GatewayError {
    fn from(e: TemplateError) -> Self {
        GatewayError::Configuration(e.to_string())
    }
}
