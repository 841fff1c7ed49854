use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Process-wide holder of the in-flight handshake state.
///
/// The store is not keyed by session: it holds exactly one credential state,
/// so only one authorization flow can be in progress at a time. A second
/// `/do-auth` overwrites the first flow's request token.
#[derive(Clone, Debug, Default)]
pub struct TokenStore {
    inner: Arc<RwLock<BTreeMap<String, String>>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `mapping` into the store, last write wins per key.
    pub async fn update(&self, mapping: BTreeMap<String, String>) {
        let mut guard = self.inner.write().await;
        guard.extend(mapping);
        tracing::debug!(keys = guard.len(), "token store updated");
    }

    /// Snapshot of the full current store.
    pub async fn read(&self) -> BTreeMap<String, String> {
        self.inner.read().await.clone()
    }
}
