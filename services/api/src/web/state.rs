//! services/api/src/web/state.rs
//!
//! Defines the application's shared state and the per-user workspace state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use lumina_core::{AlertSink, ChatSession, StudyAssistant, StudyStore};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::adapters::{FilePreferenceStore, RemoteFactory};
use crate::config::Config;
use crate::error::ApiError;

/// How often the eviction job looks for idle workspaces.
const EVICTION_INTERVAL: Duration = Duration::from_secs(60);

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// A loaded (or loading) workspace and when its user last touched it.
struct Slot {
    cell: Arc<OnceCell<Arc<Workspace>>>,
    last_seen: Instant,
}

impl Slot {
    /// A slot can go once nothing outside the map holds it and no create is in flight.
    fn is_busy(&self) -> bool {
        match self.cell.get() {
            Some(workspace) => {
                Arc::strong_count(workspace) > 1 || workspace.store.has_pending_writes()
            }
            None => Arc::strong_count(&self.cell) > 1,
        }
    }
}

/// The shared application state, created once at startup and passed to all handlers.
pub struct AppState {
    pub config: Arc<Config>,
    pub remotes: Arc<dyn RemoteFactory>,
    pub assistant: Arc<dyn StudyAssistant>,
    workspaces: Mutex<HashMap<Uuid, Slot>>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        remotes: Arc<dyn RemoteFactory>,
        assistant: Arc<dyn StudyAssistant>,
    ) -> Self {
        Self {
            config,
            remotes,
            assistant,
            workspaces: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the user's workspace, loading it from the remote store on first use.
    ///
    /// Concurrent first requests share one load. A failed load is not cached,
    /// so the next request retries.
    pub async fn workspace(&self, user_id: Uuid) -> Result<Arc<Workspace>, ApiError> {
        let cell = {
            let mut workspaces = self.workspaces.lock().unwrap_or_else(PoisonError::into_inner);
            let slot = workspaces.entry(user_id).or_insert_with(|| Slot {
                cell: Arc::default(),
                last_seen: Instant::now(),
            });
            slot.last_seen = Instant::now();
            slot.cell.clone()
        };

        let workspace = cell
            .get_or_try_init(|| async {
                let alerts = Arc::new(AlertQueue::default());
                let store = StudyStore::new(self.remotes.remote_for(user_id), alerts.clone());
                store.load().await?;
                info!(%user_id, subjects = store.subjects().len(), "workspace loaded");
                Ok::<_, ApiError>(Arc::new(Workspace {
                    store,
                    alerts,
                    chat: tokio::sync::Mutex::new(ChatSession::new()),
                }))
            })
            .await?;
        Ok(workspace.clone())
    }

    /// The user's preference file. Independent of the workspace so reading
    /// settings never waits on a remote load.
    pub fn preferences(&self, user_id: Uuid) -> FilePreferenceStore {
        FilePreferenceStore::new(self.config.preferences_dir.join(user_id.to_string()))
    }

    /// Drops workspaces untouched for at least `idle` that have no request or
    /// create in flight. The next request for that user reloads from the
    /// remote store. Returns how many were dropped.
    pub fn evict_idle(&self, idle: Duration) -> usize {
        let now = Instant::now();
        let mut workspaces = self.workspaces.lock().unwrap_or_else(PoisonError::into_inner);
        let before = workspaces.len();
        workspaces.retain(|user_id, slot| {
            let keep = now.duration_since(slot.last_seen) < idle || slot.is_busy();
            if !keep {
                debug!(%user_id, "evicting idle workspace");
            }
            keep
        });
        before - workspaces.len()
    }

    pub fn loaded_workspaces(&self) -> usize {
        self.workspaces
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Periodically evicts idle workspaces until `cancel` fires.
pub async fn run_workspace_eviction(app: Arc<AppState>, cancel: CancellationToken) {
    let idle = app.config.workspace_idle;
    info!(
        idle_secs = idle.as_secs(),
        interval_secs = EVICTION_INTERVAL.as_secs(),
        "workspace eviction started"
    );

    let mut interval = tokio::time::interval(EVICTION_INTERVAL);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("workspace eviction stopping");
                break;
            }
            _ = interval.tick() => {
                let evicted = app.evict_idle(idle);
                if evicted > 0 {
                    info!(evicted, remaining = app.loaded_workspaces(), "evicted idle workspaces");
                }
            }
        }
    }
}

//=========================================================================================
// Workspace (Specific to One User)
//=========================================================================================

/// Everything the service keeps in memory for one signed-in user.
pub struct Workspace {
    pub store: StudyStore,
    pub alerts: Arc<AlertQueue>,
    /// Held across the assistant call so turns stay in order.
    pub chat: tokio::sync::Mutex<ChatSession>,
}

/// Collects failure alerts until the client polls for them.
#[derive(Debug, Default)]
pub struct AlertQueue {
    pending: Mutex<Vec<String>>,
}

impl AlertQueue {
    /// Removes and returns every pending alert, oldest first.
    pub fn drain(&self) -> Vec<String> {
        std::mem::take(&mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl AlertSink for AlertQueue {
    fn alert(&self, message: &str) {
        warn!(%message, "queued alert");
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.to_string());
    }
}
