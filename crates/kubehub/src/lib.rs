//! Tenancy kubehub: the cluster gateway (namespaces + resource quotas).
//!
//! Thin by contract: every call goes straight to the control plane, failures
//! are translated into `GatewayError` and returned as-is. Retrying is the
//! orchestrator's business.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::time::Instant;

use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::{Namespace, ResourceQuota, ResourceQuotaSpec};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::{
    api::{Api, ListParams, ObjectMeta, PostParams},
    Client,
};
use metrics::{counter, histogram};
use tenancy_core::{
    CreateOutcome, GatewayError, GatewayResult, NamespaceName, QuotaPolicy, QuotaSnapshot, QUOTA_OBJECT_NAME,
};
use tracing::{debug, info};

mod memory;

pub use memory::{ClusterOp, MemoryCluster};

/// Label put on every namespace and quota this service creates.
pub const MANAGED_BY_LABEL: (&str, &str) = ("app.kubernetes.io/managed-by", "tenancy");

/// Capability set of the orchestration cluster's control plane.
#[async_trait::async_trait]
pub trait ClusterGateway: Send + Sync {
    /// `Ok(false)` only when the cluster positively answers "not found".
    async fn exists(&self, name: &NamespaceName) -> GatewayResult<bool>;

    async fn create_namespace(&self, name: &NamespaceName) -> GatewayResult<CreateOutcome>;

    async fn create_quota(&self, name: &NamespaceName, policy: &QuotaPolicy) -> GatewayResult<CreateOutcome>;

    /// `Ok(None)` when the namespace carries no quota object.
    async fn get_quota(&self, name: &NamespaceName) -> GatewayResult<Option<QuotaSnapshot>>;

    async fn list_all(&self) -> GatewayResult<Vec<NamespaceName>>;
}

/// Map a kube error into the gateway taxonomy. `what` names the object for
/// conflict / not-found messages.
pub fn map_kube_err(e: kube::Error, what: &str) -> GatewayError {
    match &e {
        kube::Error::Api(resp) if resp.code == 409 => GatewayError::Conflict(what.to_string()),
        kube::Error::Api(resp) if resp.code == 404 => GatewayError::NotFound(what.to_string()),
        _ => GatewayError::Transport(e.to_string()),
    }
}

fn conflict_to_outcome(res: GatewayResult<()>) -> GatewayResult<CreateOutcome> {
    match res {
        Ok(()) => Ok(CreateOutcome::Created),
        Err(GatewayError::Conflict(_)) => Ok(CreateOutcome::AlreadyExists),
        Err(e) => Err(e),
    }
}

fn managed_labels() -> BTreeMap<String, String> {
    BTreeMap::from([(MANAGED_BY_LABEL.0.to_string(), MANAGED_BY_LABEL.1.to_string())])
}

/// Build the ResourceQuota object applied to a namespace.
pub fn quota_object(name: &NamespaceName, policy: &QuotaPolicy) -> ResourceQuota {
    let hard: BTreeMap<String, Quantity> = policy.hard_limits().into_iter().map(|(k, v)| (k, Quantity(v))).collect();
    ResourceQuota {
        metadata: ObjectMeta {
            name: Some(QUOTA_OBJECT_NAME.to_string()),
            namespace: Some(name.to_string()),
            labels: Some(managed_labels()),
            ..Default::default()
        },
        spec: Some(ResourceQuotaSpec { hard: Some(hard), ..Default::default() }),
        ..Default::default()
    }
}

fn snapshot_of(rq: &ResourceQuota) -> QuotaSnapshot {
    let hard = rq.spec.as_ref().and_then(|s| s.hard.as_ref());
    match hard {
        Some(map) => QuotaSnapshot::from_hard(map.iter().map(|(k, q)| (k.as_str(), q.0.as_str()))),
        None => QuotaSnapshot::default(),
    }
}

/// Cluster gateway backed by a kube-rs client.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    /// Connect using the ambient kubeconfig / in-cluster service account.
    pub async fn connect() -> Result<Self> {
        let client = Client::try_default().await.context("building kube client from default config")?;
        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    fn namespaces(&self) -> Api<Namespace> {
        Api::all(self.client.clone())
    }

    fn quotas(&self, name: &NamespaceName) -> Api<ResourceQuota> {
        Api::namespaced(self.client.clone(), name.as_str())
    }
}

fn observe(op: &'static str, t0: Instant, ok: bool) {
    histogram!("kube_request_ms", t0.elapsed().as_secs_f64() * 1000.0, "op" => op);
    if !ok {
        counter!("kube_request_err_total", 1u64, "op" => op);
    }
}

#[async_trait::async_trait]
impl ClusterGateway for KubeCluster {
    async fn exists(&self, name: &NamespaceName) -> GatewayResult<bool> {
        let t0 = Instant::now();
        let res = self
            .namespaces()
            .get_opt(name.as_str())
            .await
            .map(|o| o.is_some())
            .map_err(|e| map_kube_err(e, name.as_str()));
        observe("exists", t0, res.is_ok());
        debug!(ns = %name, res = ?res, "kube: namespace exists");
        res
    }

    async fn create_namespace(&self, name: &NamespaceName) -> GatewayResult<CreateOutcome> {
        let t0 = Instant::now();
        let ns = Namespace {
            metadata: ObjectMeta { name: Some(name.to_string()), labels: Some(managed_labels()), ..Default::default() },
            ..Default::default()
        };
        let res = self
            .namespaces()
            .create(&PostParams::default(), &ns)
            .await
            .map(|_| ())
            .map_err(|e| map_kube_err(e, name.as_str()));
        let res = conflict_to_outcome(res);
        observe("create_namespace", t0, res.is_ok());
        info!(ns = %name, res = ?res, took_ms = %t0.elapsed().as_millis(), "kube: create namespace");
        res
    }

    async fn create_quota(&self, name: &NamespaceName, policy: &QuotaPolicy) -> GatewayResult<CreateOutcome> {
        let t0 = Instant::now();
        let what = format!("{}/{}", name, QUOTA_OBJECT_NAME);
        let res = self
            .quotas(name)
            .create(&PostParams::default(), &quota_object(name, policy))
            .await
            .map(|_| ())
            .map_err(|e| map_kube_err(e, &what));
        let res = conflict_to_outcome(res);
        observe("create_quota", t0, res.is_ok());
        info!(ns = %name, res = ?res, took_ms = %t0.elapsed().as_millis(), "kube: create quota");
        res
    }

    async fn get_quota(&self, name: &NamespaceName) -> GatewayResult<Option<QuotaSnapshot>> {
        let t0 = Instant::now();
        let what = format!("{}/{}", name, QUOTA_OBJECT_NAME);
        let res = match self.quotas(name).get_opt(QUOTA_OBJECT_NAME).await {
            Ok(found) => Ok(found.as_ref().map(snapshot_of)),
            // a vanished namespace means no quota either
            Err(e) => match map_kube_err(e, &what) {
                GatewayError::NotFound(_) => Ok(None),
                other => Err(other),
            },
        };
        observe("get_quota", t0, res.is_ok());
        res
    }

    async fn list_all(&self) -> GatewayResult<Vec<NamespaceName>> {
        let t0 = Instant::now();
        let res = self
            .namespaces()
            .list(&ListParams::default())
            .await
            .map_err(|e| map_kube_err(e, "namespaces"));
        observe("list_all", t0, res.is_ok());
        let list = res?;
        let mut names: Vec<NamespaceName> =
            list.items.into_iter().filter_map(|ns| ns.metadata.name).map(NamespaceName::new_unchecked).collect();
        names.sort();
        debug!(count = names.len(), took_ms = %t0.elapsed().as_millis(), "kube: list namespaces");
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_err(code: u16) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".into(),
            message: "boom".into(),
            reason: "Test".into(),
            code,
        })
    }

    #[test]
    fn kube_errors_map_to_taxonomy() {
        assert_eq!(map_kube_err(api_err(409), "team-a"), GatewayError::Conflict("team-a".into()));
        assert_eq!(map_kube_err(api_err(404), "team-a"), GatewayError::NotFound("team-a".into()));
        assert!(matches!(map_kube_err(api_err(500), "team-a"), GatewayError::Transport(_)));
        assert!(matches!(map_kube_err(api_err(403), "team-a"), GatewayError::Transport(_)));
    }

    #[test]
    fn conflict_is_an_outcome_not_an_error() {
        assert_eq!(conflict_to_outcome(Ok(())), Ok(CreateOutcome::Created));
        assert_eq!(conflict_to_outcome(Err(GatewayError::Conflict("x".into()))), Ok(CreateOutcome::AlreadyExists));
        assert!(conflict_to_outcome(Err(GatewayError::Transport("x".into()))).is_err());
    }

    #[test]
    fn quota_object_carries_policy_and_round_trips_to_snapshot() {
        let name = NamespaceName::new_unchecked("team-a");
        let rq = quota_object(&name, &QuotaPolicy::default());
        assert_eq!(rq.metadata.name.as_deref(), Some(QUOTA_OBJECT_NAME));
        assert_eq!(rq.metadata.namespace.as_deref(), Some("team-a"));
        let hard = rq.spec.as_ref().and_then(|s| s.hard.as_ref()).unwrap();
        assert_eq!(hard["pods"].0, "5");
        assert_eq!(hard["limits.memory"].0, "5Gi");
        assert!(snapshot_of(&rq).matches(&QuotaPolicy::default()));
    }
}
