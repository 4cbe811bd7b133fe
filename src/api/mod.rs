use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};

use crate::state::AppState;

pub mod file;
pub mod hls;
pub mod list;
pub mod thumb;
pub mod tree;

pub fn router(state: AppState, static_dir: &std::path::Path) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        .route("/tree", get(tree::tree))
        .route("/list-batch", post(list::list_batch))
        .route("/thumb", get(thumb::thumb))
        .route("/file", get(file::file))
        .route("/start_hls", get(hls::start_hls));

    let hls_routes = Router::new()
        .route("/:key/index.m3u8", get(hls::playlist))
        .route("/:key/:segment", get(hls::segment));

    let index_page = ServeFile::new(static_dir.join("media_browser.html"));

    Router::new()
        .route_service("/", index_page)
        .nest_service("/static", ServeDir::new(static_dir))
        .nest("/api", api)
        .nest("/hls", hls_routes)
        .layer(cors)
        .with_state(state)
}
