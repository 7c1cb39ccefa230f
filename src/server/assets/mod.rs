mod handlers;

use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, post, put},
};

use crate::server::AppState;

pub fn assets_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/assets", get(handlers::list_assets))
        .route("/assets", post(handlers::create_asset))
        .route("/assets/{id}", get(handlers::get_asset))
        .route("/assets/{id}", put(handlers::update_asset))
        .route("/assets/{id}", delete(handlers::delete_asset))
        .route("/assets/by_name/{name}", get(handlers::get_asset_by_name))
        .route(
            "/assets/by_name/{name}/{suffix}",
            get(handlers::get_asset_by_suffixed_name),
        )
}
