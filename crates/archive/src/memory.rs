use std::sync::{Mutex, MutexGuard};

use rustc_hash::FxHashMap;
use tenancy_core::{GatewayError, GatewayResult};

use crate::{validate_container, ArchiveGateway, ArchiveSession};

#[derive(Default)]
struct Inner {
    blobs: FxHashMap<(String, String), (String, Vec<u8>)>,
    fail_auth: bool,
    fail_write: bool,
    auths: usize,
    writes: usize,
}

/// In-memory archive for tests, with switchable failures.
#[derive(Default)]
pub struct MemoryArchive {
    inner: Mutex<Inner>,
}

impl MemoryArchive {
    pub fn new() -> Self { Self::default() }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make `authenticate` and `write_blob` fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        let mut g = self.lock();
        g.fail_auth = failing;
        g.fail_write = failing;
    }

    /// Let authentication pass but reject writes.
    pub fn set_write_failing(&self, failing: bool) { self.lock().fail_write = failing; }

    /// `(content_type, content)` of a stored object.
    pub fn get(&self, container: &str, object_key: &str) -> Option<(String, Vec<u8>)> {
        self.lock().blobs.get(&(container.to_string(), object_key.to_string())).cloned()
    }

    pub fn len(&self) -> usize { self.lock().blobs.len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    pub fn auth_count(&self) -> usize { self.lock().auths }

    pub fn write_count(&self) -> usize { self.lock().writes }
}

#[async_trait::async_trait]
impl ArchiveGateway for MemoryArchive {
    async fn authenticate(&self) -> GatewayResult<ArchiveSession> {
        let mut g = self.lock();
        g.auths += 1;
        if g.fail_auth {
            return Err(GatewayError::Transport("injected failure: authenticate".into()));
        }
        Ok(ArchiveSession::mint())
    }

    async fn write_blob(
        &self,
        session: &ArchiveSession,
        container: &str,
        object_key: &str,
        content: &[u8],
        content_type: &str,
    ) -> GatewayResult<()> {
        session.check()?;
        validate_container(container)?;
        let mut g = self.lock();
        g.writes += 1;
        if g.fail_write {
            return Err(GatewayError::Transport("injected failure: write_blob".into()));
        }
        g.blobs.insert((container.to_string(), object_key.to_string()), (content_type.to_string(), content.to_vec()));
        Ok(())
    }
}
