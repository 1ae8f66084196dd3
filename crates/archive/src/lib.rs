//! Tenancy archive: durable copies of each namespace's applied configuration.
//!
//! The gateway contract mirrors an object store (authenticate, then write a
//! named blob into a container). Backends here are local: SQLite for real
//! runs, memory for tests.

#![forbid(unsafe_code)]

use chrono::{DateTime, Duration, Utc};
use tenancy_core::{GatewayError, GatewayResult};
use uuid::Uuid;

mod memory;
mod sqlite;
pub mod template;

pub use memory::MemoryArchive;
pub use sqlite::{StoredBlob, SqliteArchive};
pub use template::{render, render_from, FileTemplate, StaticTemplate, TemplateSource, DEFAULT_TEMPLATE};

/// Content type used for archived configuration documents.
pub const YAML_CONTENT_TYPE: &str = "application/yaml";

/// Sessions are short lived; one is minted per write.
pub const SESSION_TTL_SECS: i64 = 15 * 60;

/// Proof of a successful `authenticate`, required by `write_blob`.
#[derive(Debug, Clone)]
pub struct ArchiveSession {
    pub id: Uuid,
    pub established_at: DateTime<Utc>,
}

impl ArchiveSession {
    pub fn mint() -> Self {
        Self { id: Uuid::new_v4(), established_at: Utc::now() }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now - self.established_at > Duration::seconds(SESSION_TTL_SECS)
    }

    fn check(&self) -> GatewayResult<()> {
        if self.is_expired_at(Utc::now()) {
            return Err(GatewayError::Transport(format!("archive session {} expired", self.id)));
        }
        Ok(())
    }
}

/// Capability set of the external object store.
#[async_trait::async_trait]
pub trait ArchiveGateway: Send + Sync {
    async fn authenticate(&self) -> GatewayResult<ArchiveSession>;

    async fn write_blob(
        &self,
        session: &ArchiveSession,
        container: &str,
        object_key: &str,
        content: &[u8],
        content_type: &str,
    ) -> GatewayResult<()>;
}

/// Object-store container naming: 3-63 lowercase alphanumerics or '-', no
/// leading/trailing/double '-'.
pub fn validate_container(container: &str) -> GatewayResult<()> {
    let ok = (3..=63).contains(&container.len())
        && container.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
        && !container.starts_with('-')
        && !container.ends_with('-')
        && !container.contains("--");
    if ok {
        Ok(())
    } else {
        Err(GatewayError::Configuration(format!("invalid archive container name {:?}", container)))
    }
}

/// Object key for a namespace's configuration document.
pub fn object_key_for(namespace: &str) -> String {
    format!("{}.yaml", namespace)
}

pub fn maybe_compress(content: &[u8]) -> Vec<u8> {
    #[cfg(feature = "zstd")]
    {
        let lvl: i32 = std::env::var("TENANCY_ZSTD_LEVEL").ok().and_then(|s| s.parse().ok()).unwrap_or(3);
        return zstd::encode_all(content, lvl).unwrap_or_else(|_| content.to_vec());
    }
    content.to_vec()
}

pub fn maybe_decompress(blob: &[u8]) -> Vec<u8> {
    #[cfg(feature = "zstd")]
    {
        if let Ok(de) = zstd::decode_all(std::io::Cursor::new(blob)) {
            return de;
        }
    }
    blob.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_names() {
        for ok in ["namespaces", "abc", "tenant-configs-01"] {
            assert!(validate_container(ok).is_ok(), "{ok}");
        }
        for bad in ["", "ab", "Upper", "-lead", "trail-", "dou--ble", "under_score"] {
            assert!(matches!(validate_container(bad), Err(GatewayError::Configuration(_))), "{bad}");
        }
    }

    #[test]
    fn session_expiry() {
        let s = ArchiveSession::mint();
        assert!(!s.is_expired_at(s.established_at + Duration::seconds(SESSION_TTL_SECS)));
        assert!(s.is_expired_at(s.established_at + Duration::seconds(SESSION_TTL_SECS + 1)));
    }

    #[test]
    fn compression_round_trip_is_transparent() {
        let doc = b"kind: Namespace\n";
        assert_eq!(maybe_decompress(&maybe_compress(doc)), doc.to_vec());
    }
}
