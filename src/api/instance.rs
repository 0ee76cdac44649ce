use axum::extract::State;
use axum::Json;

use crate::mastodon::{Instance, InstanceV2};

use super::AppState;

pub async fn v1(State(state): State<AppState>) -> Json<Instance> {
    Json(Instance::for_domain(&state.config.hostname))
}

pub async fn v2(State(state): State<AppState>) -> Json<InstanceV2> {
    Json(InstanceV2::for_domain(&state.config.hostname))
}
