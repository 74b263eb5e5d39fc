pub mod assistant_llm;
pub mod db;
pub mod preferences;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use lumina_core::{MemoryRemote, RemoteStore};
use uuid::Uuid;

pub use assistant_llm::OpenAiAssistantAdapter;
pub use db::DbAdapter;
pub use preferences::FilePreferenceStore;

/// Hands out the remote store that backs one user's workspace.
pub trait RemoteFactory: Send + Sync {
    fn remote_for(&self, user_id: Uuid) -> Arc<dyn RemoteStore>;
}

/// Keeps each user's rows in process memory. Used when no database is
/// configured, and by the router tests.
#[derive(Default)]
pub struct InMemoryRemotes {
    stores: Mutex<HashMap<Uuid, Arc<MemoryRemote>>>,
}

impl InMemoryRemotes {
    pub fn store(&self, user_id: Uuid) -> Arc<MemoryRemote> {
        let mut stores = self.stores.lock().unwrap_or_else(PoisonError::into_inner);
        stores.entry(user_id).or_default().clone()
    }
}

impl RemoteFactory for InMemoryRemotes {
    fn remote_for(&self, user_id: Uuid) -> Arc<dyn RemoteStore> {
        self.store(user_id)
    }
}
