use std::sync::Arc;

use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
};

use crate::auth::RequireToken;
use crate::error::{Error, Result};
use crate::server::AppState;
use crate::server::dto::{CreateAssetRequest, ListAssetsParams, UpdateAssetRequest};
use crate::server::response::{ApiError, ApiResponse, StoreResultExt};
use crate::server::validation;
use crate::store::AssetRepository;
use crate::types::Asset;

const ENTITY: &str = "Asset";

type AssetResponse = Json<ApiResponse<Asset>>;

/// Reads hand tombstoned assets back as `Gone` rather than as data.
fn require_live(asset: Option<Asset>) -> Result<Asset> {
    match asset {
        None => Err(Error::NotFound),
        Some(asset) if asset.deleted => Err(Error::Gone),
        Some(asset) => Ok(asset),
    }
}

// Extractor rejections use the same envelope and status as other bad input.

fn json_body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> std::result::Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError::unprocessable(rejection.body_text()))
}

fn path_param<T>(
    path: std::result::Result<Path<T>, PathRejection>,
) -> std::result::Result<T, ApiError> {
    path.map(|Path(value)| value)
        .map_err(|rejection| ApiError::unprocessable(rejection.body_text()))
}

fn query_params<T>(
    query: std::result::Result<Query<T>, QueryRejection>,
) -> std::result::Result<T, ApiError> {
    query
        .map(|Query(params)| params)
        .map_err(|rejection| ApiError::unprocessable(rejection.body_text()))
}

pub async fn list_assets(
    _auth: RequireToken,
    State(state): State<Arc<AppState>>,
    params: std::result::Result<Query<ListAssetsParams>, QueryRejection>,
) -> std::result::Result<Json<ApiResponse<Vec<Asset>>>, ApiError> {
    let params = query_params(params)?;
    let mut assets = state
        .store
        .unit_of_work(|uow| uow.assets().get_all(params.include_deleted))
        .api_err(ENTITY)?;

    assets.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(Json(ApiResponse::success(assets)))
}

pub async fn get_asset(
    _auth: RequireToken,
    State(state): State<Arc<AppState>>,
    id: std::result::Result<Path<i64>, PathRejection>,
) -> std::result::Result<AssetResponse, ApiError> {
    let id = path_param(id)?;
    let asset = state
        .store
        .unit_of_work(|uow| require_live(uow.assets().get(id)?))
        .api_err(ENTITY)?;

    Ok(Json(ApiResponse::success(asset)))
}

pub async fn get_asset_by_name(
    _auth: RequireToken,
    State(state): State<Arc<AppState>>,
    name: std::result::Result<Path<String>, PathRejection>,
) -> std::result::Result<AssetResponse, ApiError> {
    let name = path_param(name)?;
    let asset = state
        .store
        .unit_of_work(|uow| require_live(uow.assets().get_by_name(&name)?))
        .api_err(ENTITY)?;

    Ok(Json(ApiResponse::success(asset)))
}

pub async fn get_asset_by_suffixed_name(
    _auth: RequireToken,
    State(state): State<Arc<AppState>>,
    path: std::result::Result<Path<(String, String)>, PathRejection>,
) -> std::result::Result<AssetResponse, ApiError> {
    let (name, suffix) = path_param(path)?;
    let asset = state
        .store
        .unit_of_work(|uow| require_live(uow.assets().get_by_name_or_suffixed(&name, &suffix)?))
        .api_err(ENTITY)?;

    Ok(Json(ApiResponse::success(asset)))
}

pub async fn create_asset(
    _auth: RequireToken,
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<CreateAssetRequest>, JsonRejection>,
) -> std::result::Result<(StatusCode, AssetResponse), ApiError> {
    let new_asset = validation::new_asset(json_body(payload)?).api_err(ENTITY)?;

    let asset = state
        .store
        .unit_of_work(|uow| uow.assets().create(&new_asset))
        .api_err(ENTITY)?;

    tracing::info!(id = asset.id, name = %asset.name, "Created asset");

    Ok((StatusCode::CREATED, Json(ApiResponse::success(asset))))
}

pub async fn update_asset(
    _auth: RequireToken,
    State(state): State<Arc<AppState>>,
    id: std::result::Result<Path<i64>, PathRejection>,
    payload: std::result::Result<Json<UpdateAssetRequest>, JsonRejection>,
) -> std::result::Result<AssetResponse, ApiError> {
    let id = path_param(id)?;
    let changes = validation::asset_changes(json_body(payload)?).api_err(ENTITY)?;

    let asset = state
        .store
        .unit_of_work(|uow| {
            let assets = uow.assets();
            let current = require_live(assets.get(id)?)?;
            assets.update(&current, &changes)
        })
        .api_err(ENTITY)?;

    Ok(Json(ApiResponse::success(asset)))
}

pub async fn delete_asset(
    _auth: RequireToken,
    State(state): State<Arc<AppState>>,
    id: std::result::Result<Path<i64>, PathRejection>,
) -> std::result::Result<StatusCode, ApiError> {
    let id = path_param(id)?;
    let asset = state
        .store
        .unit_of_work(|uow| {
            let assets = uow.assets();
            let current = require_live(assets.get(id)?)?;
            assets.delete(&current)
        })
        .api_err(ENTITY)?;

    tracing::info!(id = asset.id, name = %asset.name, "Deleted asset");

    Ok(StatusCode::NO_CONTENT)
}
