use axum::extract::FromRef;
use std::sync::Arc;
use std::time::Instant;

use crate::mirror_store::MirrorStore;
use crate::sync::CatalogSync;

use super::ServerConfig;

pub type GuardedMirrorStore = Arc<dyn MirrorStore>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub store: GuardedMirrorStore,
    pub sync: CatalogSync,
}

impl FromRef<ServerState> for GuardedMirrorStore {
    fn from_ref(input: &ServerState) -> Self {
        input.store.clone()
    }
}

impl FromRef<ServerState> for CatalogSync {
    fn from_ref(input: &ServerState) -> Self {
        input.sync.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
