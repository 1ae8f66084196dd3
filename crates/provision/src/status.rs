use std::sync::Arc;
use std::time::Instant;

use metrics::counter;
use tenancy_core::{NamespaceName, NamespaceStatusView, ProvisionError, QuotaView};
use tenancy_kubehub::ClusterGateway;
use tracing::{debug, info, warn};

use crate::retry::{guarded, CallPolicy};

/// Read-only view over the cluster. Recomputed on every call, nothing cached.
pub struct StatusAggregator {
    cluster: Arc<dyn ClusterGateway>,
    calls: CallPolicy,
}

impl StatusAggregator {
    pub fn new(cluster: Arc<dyn ClusterGateway>, calls: CallPolicy) -> Self {
        Self { cluster, calls }
    }

    /// `NotFound`, or `Found` with the quota snapshot when it can be read.
    /// Only a failing existence check is an error.
    pub async fn get_status(&self, name: &NamespaceName) -> Result<NamespaceStatusView, ProvisionError> {
        counter!("status_requests_total", 1u64);
        let exists = guarded(&self.calls, "exists", || self.cluster.exists(name))
            .await
            .map_err(|e| ProvisionError::ClusterUnavailable(e.to_string()))?;
        if !exists {
            debug!(ns = %name, "status: not found");
            return Ok(NamespaceStatusView::NotFound);
        }
        let quota = match guarded(&self.calls, "get_quota", || self.cluster.get_quota(name)).await {
            Ok(Some(snapshot)) => QuotaView::Present(snapshot),
            Ok(None) => QuotaView::Unavailable,
            Err(e) => {
                warn!(ns = %name, error = %e, "status: quota lookup failed");
                QuotaView::Unavailable
            }
        };
        Ok(NamespaceStatusView::Found { quota })
    }

    /// Every namespace in the cluster, sorted by name.
    pub async fn list_all(&self) -> Result<Vec<NamespaceName>, ProvisionError> {
        let t0 = Instant::now();
        let mut names = guarded(&self.calls, "list_all", || self.cluster.list_all())
            .await
            .map_err(|e| ProvisionError::ClusterUnavailable(e.to_string()))?;
        names.sort();
        info!(count = names.len(), took_ms = %t0.elapsed().as_millis(), "status: listed namespaces");
        Ok(names)
    }
}
