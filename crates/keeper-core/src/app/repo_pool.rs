//! RepoPool - one open handle per configured repository.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OnceCell;

use crate::config::RepoConfig;
use crate::error::{ExecError, RepoError};
use crate::ports::{Repository, RepositoryOpener};

type Slot = Arc<OnceCell<Arc<dyn Repository>>>;

#[derive(Default)]
struct PoolState {
    configs: HashMap<String, RepoConfig>,
    open: HashMap<String, Slot>,
}

/// Lazily opens repositories and hands out shared handles.
///
/// Design:
/// - The pool lock only guards the maps and is never held across an open.
/// - Each id has its own [`OnceCell`] slot: concurrent lookups of one id
///   open it once, while a slow open never blocks lookups of another id.
/// - A failed open leaves the slot empty, so the next lookup retries.
/// - `replace_configs` swaps the slot map; an open still in flight lands in
///   a detached slot and is dropped with it.
pub struct RepoPool {
    opener: Arc<dyn RepositoryOpener>,
    state: Mutex<PoolState>,
}

impl RepoPool {
    pub fn new(
        opener: Arc<dyn RepositoryOpener>,
        repos: impl IntoIterator<Item = RepoConfig>,
    ) -> Self {
        Self {
            opener,
            state: Mutex::new(PoolState {
                configs: index(repos),
                open: HashMap::new(),
            }),
        }
    }

    pub async fn get(&self, repo_id: &str) -> Result<Arc<dyn Repository>, RepoError> {
        let (config, slot) = {
            let mut state = self.state.lock();
            let config = state
                .configs
                .get(repo_id)
                .cloned()
                .ok_or_else(|| RepoError::NotFound(repo_id.to_string()))?;
            let slot = Arc::clone(state.open.entry(repo_id.to_string()).or_default());
            (config, slot)
        };

        let repo = slot
            .get_or_try_init(|| async {
                let repo = self.opener.open(&config).await?;
                tracing::info!(repo = %repo_id, uri = %config.uri, "opened repository");
                Ok::<_, ExecError>(repo)
            })
            .await
            .map_err(|source| RepoError::Open {
                repo_id: repo_id.to_string(),
                source,
            })?;
        Ok(Arc::clone(repo))
    }

    pub fn config(&self, repo_id: &str) -> Option<RepoConfig> {
        self.state.lock().configs.get(repo_id).cloned()
    }

    /// Swaps the known repositories and drops every open handle.
    pub fn replace_configs(&self, repos: impl IntoIterator<Item = RepoConfig>) {
        let mut state = self.state.lock();
        state.configs = index(repos);
        state.open.clear();
    }

    pub fn open_count(&self) -> usize {
        self.state
            .lock()
            .open
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }
}

fn index(repos: impl IntoIterator<Item = RepoConfig>) -> HashMap<String, RepoConfig> {
    repos.into_iter().map(|r| (r.id.clone(), r)).collect()
}
