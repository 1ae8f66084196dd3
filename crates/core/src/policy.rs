use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::quantity::{Cpu, Memory};

/// Name of the quota object created inside every provisioned namespace.
pub const QUOTA_OBJECT_NAME: &str = "compute-resources";

const HARD_PODS: &str = "pods";
const HARD_REQUESTS_CPU: &str = "requests.cpu";
const HARD_REQUESTS_MEMORY: &str = "requests.memory";
const HARD_LIMITS_CPU: &str = "limits.cpu";
const HARD_LIMITS_MEMORY: &str = "limits.memory";

/// Resource ceiling applied to every new namespace.
///
/// Built once at startup and shared read-only (usually behind an `Arc`) by
/// every provisioning call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaPolicy {
    pub max_pods: u32,
    pub requests_cpu: Cpu,
    pub requests_memory: Memory,
    pub limits_cpu: Cpu,
    pub limits_memory: Memory,
}

impl Default for QuotaPolicy {
    /// 5 pods, 1 CPU / 1 GiB requested, 5 CPU / 5 GiB limit.
    fn default() -> Self {
        Self {
            max_pods: 5,
            requests_cpu: Cpu::cores(1),
            requests_memory: Memory::gib(1),
            limits_cpu: Cpu::cores(5),
            limits_memory: Memory::gib(5),
        }
    }
}

impl QuotaPolicy {
    /// `spec.hard` entries of the ResourceQuota object, in quantity notation.
    pub fn hard_limits(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (HARD_PODS.to_string(), self.max_pods.to_string()),
            (HARD_REQUESTS_CPU.to_string(), self.requests_cpu.to_string()),
            (HARD_REQUESTS_MEMORY.to_string(), self.requests_memory.to_string()),
            (HARD_LIMITS_CPU.to_string(), self.limits_cpu.to_string()),
            (HARD_LIMITS_MEMORY.to_string(), self.limits_memory.to_string()),
        ])
    }
}

/// Quota ceilings as read back from the cluster. Fields the quota object does
/// not set (or sets to something unparsable) stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaSnapshot {
    pub max_pods: Option<u32>,
    pub requests_cpu: Option<Cpu>,
    pub requests_memory: Option<Memory>,
    pub limits_cpu: Option<Cpu>,
    pub limits_memory: Option<Memory>,
}

impl QuotaSnapshot {
    /// Build from `spec.hard` key/value pairs.
    pub fn from_hard<'a, I>(hard: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut snap = QuotaSnapshot::default();
        for (key, value) in hard {
            match key {
                HARD_PODS => snap.max_pods = value.trim().parse().ok(),
                HARD_REQUESTS_CPU | "cpu" => snap.requests_cpu = value.parse().ok(),
                HARD_REQUESTS_MEMORY | "memory" => snap.requests_memory = value.parse().ok(),
                HARD_LIMITS_CPU => snap.limits_cpu = value.parse().ok(),
                HARD_LIMITS_MEMORY => snap.limits_memory = value.parse().ok(),
                _ => {}
            }
        }
        snap
    }

    /// True when every ceiling of `policy` is present with the same value.
    pub fn matches(&self, policy: &QuotaPolicy) -> bool {
        *self == QuotaSnapshot::from(policy)
    }
}

impl From<&QuotaPolicy> for QuotaSnapshot {
    fn from(p: &QuotaPolicy) -> Self {
        Self {
            max_pods: Some(p.max_pods),
            requests_cpu: Some(p.requests_cpu),
            requests_memory: Some(p.requests_memory),
            limits_cpu: Some(p.limits_cpu),
            limits_memory: Some(p.limits_memory),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_renders_expected_hard_limits() {
        let hard = QuotaPolicy::default().hard_limits();
        assert_eq!(hard["pods"], "5");
        assert_eq!(hard["requests.cpu"], "1");
        assert_eq!(hard["requests.memory"], "1Gi");
        assert_eq!(hard["limits.cpu"], "5");
        assert_eq!(hard["limits.memory"], "5Gi");
    }

    #[test]
    fn snapshot_reads_back_policy_including_normalized_forms() {
        let policy = QuotaPolicy::default();
        // The API server may echo quantities in another notation.
        let snap = QuotaSnapshot::from_hard([
            ("pods", "5"),
            ("requests.cpu", "1000m"),
            ("requests.memory", "1024Mi"),
            ("limits.cpu", "5"),
            ("limits.memory", "5Gi"),
            ("services", "10"),
        ]);
        assert!(snap.matches(&policy));
    }

    #[test]
    fn snapshot_with_missing_fields_does_not_match() {
        let snap = QuotaSnapshot::from_hard([("pods", "5"), ("limits.cpu", "bogus")]);
        assert_eq!(snap.max_pods, Some(5));
        assert_eq!(snap.limits_cpu, None);
        assert!(!snap.matches(&QuotaPolicy::default()));
    }
}
