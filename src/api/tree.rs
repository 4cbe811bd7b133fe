use axum::extract::State;
use axum::response::Json;
use serde::Serialize;

use crate::roots::TreeNode;
use crate::state::AppState;

#[derive(Serialize)]
pub struct TreeResponse {
    dirs: Vec<TreeNode>,
}

pub async fn tree(State(state): State<AppState>) -> Json<TreeResponse> {
    Json(TreeResponse {
        dirs: state.roots.build_trees(),
    })
}
