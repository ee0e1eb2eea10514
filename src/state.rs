use std::sync::Arc;

use axum::extract::FromRef;

use crate::{config::Config, engine::LiveEngine};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<LiveEngine>,
    pub config: Config,
}

impl FromRef<AppState> for Arc<LiveEngine> {
    fn from_ref(state: &AppState) -> Self {
        state.engine.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
