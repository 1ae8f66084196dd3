use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::NameError;

static DNS_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("valid DNS label regex"));

const MAX_LEN: usize = 63;

/// Namespace identifier. Opaque to the provisioning core; the cluster decides
/// what exists.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NamespaceName(String);

impl NamespaceName {
    /// Validate a name coming from outside (HTTP path, CLI argument) as an
    /// RFC 1123 DNS label.
    pub fn parse(raw: &str) -> Result<Self, NameError> {
        let reason = if raw.is_empty() {
            Some("must not be empty")
        } else if raw.len() > MAX_LEN {
            Some("must be at most 63 characters")
        } else if !DNS_LABEL.is_match(raw) {
            Some("must consist of lowercase alphanumerics or '-', and start and end with an alphanumeric")
        } else {
            None
        };
        match reason {
            Some(reason) => Err(NameError { name: raw.to_string(), reason }),
            None => Ok(Self(raw.to_string())),
        }
    }

    /// Wrap a name that was already validated upstream or read back from the
    /// cluster.
    pub fn new_unchecked(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NamespaceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NamespaceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_dns_labels() {
        for ok in ["team-a", "a", "ns1", "0abc", "a-b-c-9"] {
            assert!(NamespaceName::parse(ok).is_ok(), "{ok}");
        }
    }

    #[test]
    fn rejects_bad_labels() {
        let long = "a".repeat(64);
        for bad in ["", "Team-A", "-a", "a-", "a_b", "a.b", long.as_str()] {
            let err = NamespaceName::parse(bad).unwrap_err();
            assert_eq!(err.name, bad);
        }
    }

    #[test]
    fn serializes_as_plain_string() {
        let n = NamespaceName::new_unchecked("team-a");
        assert_eq!(serde_json::to_string(&n).unwrap(), "\"team-a\"");
    }
}
