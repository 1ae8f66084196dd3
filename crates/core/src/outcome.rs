use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::QuotaSnapshot;

/// A provisioning sub-step that can fail without aborting the sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailedStep {
    NamespaceCreate,
    QuotaCreate,
    ArchiveWrite,
}

impl FailedStep {
    pub fn as_str(self) -> &'static str {
        match self {
            FailedStep::NamespaceCreate => "namespace_create",
            FailedStep::QuotaCreate => "quota_create",
            FailedStep::ArchiveWrite => "archive_write",
        }
    }
}

impl fmt::Display for FailedStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate outcome of one create request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProvisioningResult {
    AlreadyExists,
    Created,
    PartiallyFailed { failed: BTreeSet<FailedStep> },
    Failed { reason: String },
}

impl ProvisioningResult {
    /// Terminal outcome once the sequence ran to its end.
    pub fn from_failures(failed: BTreeSet<FailedStep>) -> Self {
        if failed.is_empty() {
            ProvisioningResult::Created
        } else {
            ProvisioningResult::PartiallyFailed { failed }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProvisioningResult::AlreadyExists => "already_exists",
            ProvisioningResult::Created => "created",
            ProvisioningResult::PartiallyFailed { .. } => "partially_failed",
            ProvisioningResult::Failed { .. } => "failed",
        }
    }

    /// Steps that failed; empty for every outcome except `PartiallyFailed`.
    pub fn failed_steps(&self) -> BTreeSet<FailedStep> {
        match self {
            ProvisioningResult::PartiallyFailed { failed } => failed.clone(),
            _ => BTreeSet::new(),
        }
    }
}

impl fmt::Display for ProvisioningResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvisioningResult::AlreadyExists => f.write_str("already exists"),
            ProvisioningResult::Created => f.write_str("created"),
            ProvisioningResult::PartiallyFailed { failed } => {
                let steps: Vec<_> = failed.iter().map(|s| s.as_str()).collect();
                write!(f, "partially failed: {}", steps.join(", "))
            }
            ProvisioningResult::Failed { reason } => write!(f, "failed: {}", reason),
        }
    }
}

/// Quota part of a status report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaView {
    Present(QuotaSnapshot),
    /// Lookup failed or the namespace carries no quota object (left behind by
    /// a partially failed provisioning).
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum NamespaceStatusView {
    NotFound,
    Found { quota: QuotaView },
}
