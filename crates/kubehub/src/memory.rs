//! In-memory cluster with fault injection, for tests and local dry runs.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use rustc_hash::{FxHashMap, FxHashSet};
use tenancy_core::{CreateOutcome, GatewayError, GatewayResult, NamespaceName, QuotaPolicy, QuotaSnapshot};

use crate::ClusterGateway;

/// Gateway operations, used to inject failures and count calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClusterOp {
    Exists,
    CreateNamespace,
    CreateQuota,
    GetQuota,
    ListAll,
}

#[derive(Default)]
struct Inner {
    /// namespace -> quota object (if any)
    namespaces: BTreeMap<NamespaceName, Option<QuotaSnapshot>>,
    failing: FxHashSet<ClusterOp>,
    calls: FxHashMap<ClusterOp, usize>,
    quota_creates: FxHashMap<NamespaceName, usize>,
}

/// Cluster gateway that keeps namespaces and quotas in memory.
///
/// Behaves like the API server where it matters: creates answer "already
/// exists" on conflict, a quota can only be created inside an existing
/// namespace, and a failing operation returns a transport error without
/// touching state.
#[derive(Default)]
pub struct MemoryCluster {
    inner: Mutex<Inner>,
}

impl MemoryCluster {
    pub fn new() -> Self { Self::default() }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make `op` fail with a transport error until healed.
    pub fn fail(&self, op: ClusterOp) { self.lock().failing.insert(op); }

    pub fn heal(&self, op: ClusterOp) { self.lock().failing.remove(&op); }

    pub fn heal_all(&self) { self.lock().failing.clear(); }

    /// Seed a namespace as if another actor created it (no quota).
    pub fn insert_namespace(&self, name: &NamespaceName) {
        self.lock().namespaces.entry(name.clone()).or_insert(None);
    }

    /// Number of calls made for `op`, failed ones included.
    pub fn calls(&self, op: ClusterOp) -> usize { self.lock().calls.get(&op).copied().unwrap_or(0) }

    /// Number of quota objects actually written for `name`.
    pub fn quota_creates(&self, name: &NamespaceName) -> usize {
        self.lock().quota_creates.get(name).copied().unwrap_or(0)
    }

    pub fn has_namespace(&self, name: &NamespaceName) -> bool { self.lock().namespaces.contains_key(name) }

    pub fn quota_of(&self, name: &NamespaceName) -> Option<QuotaSnapshot> {
        self.lock().namespaces.get(name).cloned().flatten()
    }

    /// Count the call and fail it if `op` is marked failing.
    fn enter(&self, op: ClusterOp) -> GatewayResult<MutexGuard<'_, Inner>> {
        let mut g = self.lock();
        *g.calls.entry(op).or_default() += 1;
        if g.failing.contains(&op) {
            return Err(GatewayError::Transport(format!("injected failure: {:?}", op)));
        }
        Ok(g)
    }
}

#[async_trait::async_trait]
impl ClusterGateway for MemoryCluster {
    async fn exists(&self, name: &NamespaceName) -> GatewayResult<bool> {
        let g = self.enter(ClusterOp::Exists)?;
        Ok(g.namespaces.contains_key(name))
    }

    async fn create_namespace(&self, name: &NamespaceName) -> GatewayResult<CreateOutcome> {
        let mut g = self.enter(ClusterOp::CreateNamespace)?;
        if g.namespaces.contains_key(name) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        g.namespaces.insert(name.clone(), None);
        Ok(CreateOutcome::Created)
    }

    async fn create_quota(&self, name: &NamespaceName, policy: &QuotaPolicy) -> GatewayResult<CreateOutcome> {
        let mut g = self.enter(ClusterOp::CreateQuota)?;
        let inner = &mut *g;
        match inner.namespaces.get_mut(name) {
            None => Err(GatewayError::NotFound(name.to_string())),
            Some(Some(_)) => Ok(CreateOutcome::AlreadyExists),
            Some(slot) => {
                *slot = Some(QuotaSnapshot::from(policy));
                *inner.quota_creates.entry(name.clone()).or_default() += 1;
                Ok(CreateOutcome::Created)
            }
        }
    }

    async fn get_quota(&self, name: &NamespaceName) -> GatewayResult<Option<QuotaSnapshot>> {
        let g = self.enter(ClusterOp::GetQuota)?;
        Ok(g.namespaces.get(name).cloned().flatten())
    }

    async fn list_all(&self) -> GatewayResult<Vec<NamespaceName>> {
        let g = self.enter(ClusterOp::ListAll)?;
        Ok(g.namespaces.keys().cloned().collect())
    }
}
