//! Tenancy provisioning: the create state machine and the status read path.
//!
//! `Provisioner::create` runs, strictly in order:
//!
//! 1. existence check (namespace, then its quota)
//! 2. namespace creation
//! 3. quota creation
//! 4. configuration archival
//!
//! Step 1 either short-circuits (`AlreadyExists`), aborts (`Failed`) or lets
//! the machine run. Steps 2-4 are best effort: a failure is recorded in the
//! failed-step set and the next step still runs. Conflicts at steps 2-3 count
//! as success, so concurrent or repeated creates converge.

#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use tenancy_archive::{object_key_for, render_from, ArchiveGateway, TemplateSource, YAML_CONTENT_TYPE};
use tenancy_core::{
    CreateOutcome, FailedStep, GatewayError, GatewayResult, NamespaceName, ProvisioningResult, QuotaPolicy,
    TemplateError,
};
use tenancy_kubehub::ClusterGateway;
use tracing::{info, warn};

mod retry;
mod status;

pub use retry::{guarded, CallPolicy, RetryPolicy};
pub use status::StatusAggregator;

/// Default archive container for namespace documents.
pub const DEFAULT_CONTAINER: &str = "namespaces";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionerConfig {
    /// Archive container receiving `<namespace>.yaml` documents.
    pub container: String,
    pub calls: CallPolicy,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self { container: DEFAULT_CONTAINER.to_string(), calls: CallPolicy::default() }
    }
}

/// What step 1 learned about the namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Existence {
    Absent,
    /// Namespace present but no quota object: an earlier run failed midway.
    Partial,
    Provisioned,
}

/// Provisioning orchestrator. Stateless between calls; the cluster and the
/// archive are the only stores.
pub struct Provisioner {
    cluster: Arc<dyn ClusterGateway>,
    archive: Arc<dyn ArchiveGateway>,
    template: Arc<dyn TemplateSource>,
    policy: QuotaPolicy,
    config: ProvisionerConfig,
}

impl Provisioner {
    pub fn new(
        cluster: Arc<dyn ClusterGateway>,
        archive: Arc<dyn ArchiveGateway>,
        template: Arc<dyn TemplateSource>,
        policy: QuotaPolicy,
        config: ProvisionerConfig,
    ) -> Self {
        Self { cluster, archive, template, policy, config }
    }

    pub fn policy(&self) -> &QuotaPolicy { &self.policy }

    pub fn config(&self) -> &ProvisionerConfig { &self.config }

    /// Render the document that would be archived for `name`.
    pub fn render(&self, name: &NamespaceName) -> Result<String, TemplateError> {
        render_from(self.template.as_ref(), name, &self.policy)
    }

    /// Provision `name`. Never errors and never panics on backend failure;
    /// every outcome is folded into the returned result.
    pub async fn create(&self, name: &NamespaceName) -> ProvisioningResult {
        let t0 = Instant::now();
        counter!("provision_attempts", 1u64);
        info!(ns = %name, "provision: start");

        let result = self.run(name).await;

        counter!("provision_outcome_total", 1u64, "outcome" => result.label());
        for step in result.failed_steps() {
            counter!("provision_step_failed_total", 1u64, "step" => step.as_str());
        }
        histogram!("provision_latency_ms", t0.elapsed().as_secs_f64() * 1000.0);
        info!(ns = %name, outcome = %result, took_ms = %t0.elapsed().as_millis(), "provision: done");
        result
    }

    async fn run(&self, name: &NamespaceName) -> ProvisioningResult {
        match self.check_existence(name).await {
            Err(reason) => {
                warn!(ns = %name, reason = %reason, "provision: existence unknown; aborting");
                return ProvisioningResult::Failed { reason };
            }
            Ok(Existence::Provisioned) => return ProvisioningResult::AlreadyExists,
            Ok(Existence::Partial) => info!(ns = %name, "provision: namespace exists without quota; resuming"),
            Ok(Existence::Absent) => {}
        }

        let mut failed = BTreeSet::new();
        if let Err(e) = self.create_namespace(name).await {
            warn!(ns = %name, error = %e, "provision: namespace create failed; continuing");
            failed.insert(FailedStep::NamespaceCreate);
        }
        if let Err(e) = self.create_quota(name).await {
            warn!(ns = %name, error = %e, "provision: quota create failed; continuing");
            failed.insert(FailedStep::QuotaCreate);
        }
        if let Err(e) = self.archive_configuration(name).await {
            warn!(ns = %name, error = %e, "provision: archive write failed");
            failed.insert(FailedStep::ArchiveWrite);
        }
        ProvisioningResult::from_failures(failed)
    }

    async fn check_existence(&self, name: &NamespaceName) -> Result<Existence, String> {
        let calls = &self.config.calls;
        let exists = guarded(calls, "exists", || self.cluster.exists(name))
            .await
            .map_err(|e| format!("existence check for {} failed: {}", name, e))?;
        if !exists {
            return Ok(Existence::Absent);
        }
        match guarded(calls, "get_quota", || self.cluster.get_quota(name)).await {
            Ok(Some(_)) => Ok(Existence::Provisioned),
            Ok(None) => Ok(Existence::Partial),
            Err(e) => {
                warn!(ns = %name, error = %e, "provision: quota state unknown; treating as provisioned");
                Ok(Existence::Provisioned)
            }
        }
    }

    async fn create_namespace(&self, name: &NamespaceName) -> GatewayResult<()> {
        let res = guarded(&self.config.calls, "create_namespace", || self.cluster.create_namespace(name)).await;
        absorb_conflict(res, "namespace", name)
    }

    async fn create_quota(&self, name: &NamespaceName) -> GatewayResult<()> {
        let policy = &self.policy;
        let res = guarded(&self.config.calls, "create_quota", || self.cluster.create_quota(name, policy)).await;
        absorb_conflict(res, "quota", name)
    }

    async fn archive_configuration(&self, name: &NamespaceName) -> GatewayResult<()> {
        let doc = self.render(name)?;
        let calls = &self.config.calls;
        let session = guarded(calls, "archive_authenticate", || self.archive.authenticate()).await?;
        let key = object_key_for(name.as_str());
        let container = self.config.container.as_str();
        guarded(calls, "archive_write", || {
            self.archive.write_blob(&session, container, &key, doc.as_bytes(), YAML_CONTENT_TYPE)
        })
        .await
    }
}

/// Creation steps treat "already there" as done.
fn absorb_conflict(res: GatewayResult<CreateOutcome>, what: &str, name: &NamespaceName) -> GatewayResult<()> {
    match res {
        Ok(CreateOutcome::Created) => Ok(()),
        Ok(CreateOutcome::AlreadyExists) | Err(GatewayError::Conflict(_)) => {
            info!(ns = %name, what, "provision: already exists; treating as done");
            Ok(())
        }
        Err(e) => Err(e),
    }
}
