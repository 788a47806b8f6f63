// src/state.rs

use std::sync::Arc;

use axum::extract::FromRef;

use crate::{
    broadcast::RoomHub, config::Config, engine::SessionEngine, store::QuizStore,
    utils::jwt::JwtCredentials,
};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SessionEngine>,
    pub hub: Arc<RoomHub>,
    pub config: Config,
}

impl AppState {
    /// Wires the engine to the given store, JWT credentials and an in-process room hub.
    pub fn new(store: Arc<dyn QuizStore>, config: Config) -> Self {
        let hub = Arc::new(RoomHub::default());
        let engine = SessionEngine::new(
            store,
            Arc::new(JwtCredentials::from_config(&config)),
            hub.clone(),
            &config,
        );
        Self {
            engine,
            hub,
            config,
        }
    }
}

impl FromRef<AppState> for Arc<SessionEngine> {
    fn from_ref(state: &AppState) -> Self {
        state.engine.clone()
    }
}

impl FromRef<AppState> for Arc<RoomHub> {
    fn from_ref(state: &AppState) -> Self {
        state.hub.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
