use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderName, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::composite::{Composite, CompositeStructure};
use crate::construct::{AssetPointer, KnowledgeAsset, KnowledgeCarrier, Relationship};
use crate::error::{RepositoryError, Result};
use crate::negotiation::decode_code;
use crate::repository::{ArtifactEntry, Repository};

pub const X_ACCEPT: &str = "x-accept";
pub const X_REPRESENTATION: &str = "x-representation";

#[derive(Deserialize)]
pub struct ListQuery {
    #[serde(rename = "type")]
    pub asset_type: Option<String>,
    pub annotation: Option<String>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct AcceptQuery {
    #[serde(rename = "xAccept")]
    pub x_accept: Option<String>,
}

#[derive(Deserialize)]
pub struct BundleQuery {
    pub rel: Option<String>,
    pub depth: Option<usize>,
}

#[derive(Deserialize)]
pub struct CarrierQuery {
    pub rep: Option<String>,
    pub label: Option<String>,
}

impl RepositoryError {
    pub fn status(&self) -> StatusCode {
        match self {
            RepositoryError::NotFound(_) => StatusCode::NOT_FOUND,
            RepositoryError::NotAcceptable(_) => StatusCode::NOT_ACCEPTABLE,
            RepositoryError::Forbidden(_) => StatusCode::FORBIDDEN,
            RepositoryError::Unsupported(_) => StatusCode::NOT_IMPLEMENTED,
            RepositoryError::Conflict(_) => StatusCode::CONFLICT,
            RepositoryError::PreconditionFailed(_) => StatusCode::PRECONDITION_FAILED,
            RepositoryError::Parse { .. } | RepositoryError::Serialization(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RepositoryError {
    fn into_response(self) -> Response {
        let status = self.status();
        let msg = self.to_string();
        warn!(%msg, code = %status.as_u16(), "request failed");
        (status, Json(serde_json::json!({ "status": "error", "error": msg }))).into_response()
    }
}

// the core is synchronous, so every call runs on the blocking pool
async fn blocking<T, F>(repository: Arc<Repository>, call: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&Repository) -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || call(&repository))
        .await
        .map_err(|e| RepositoryError::Invariant(format!("join error: {}", e)))?
}

fn preferences(headers: &HeaderMap, query: AcceptQuery) -> Option<String> {
    headers
        .get(X_ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or(query.x_accept)
}

fn carrier_response(carrier: KnowledgeCarrier) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (HeaderName::from_static(X_REPRESENTATION), carrier.representation.to_string()),
        ],
        carrier.content,
    )
        .into_response()
}

async fn list_assets(
    State(repository): State<Arc<Repository>>,
    Query(q): Query<ListQuery>,
) -> Result<Response> {
    let assets = blocking(repository, move |r| {
        r.list_assets(q.asset_type.as_deref(), q.annotation.as_deref(), q.offset, q.limit)
    })
    .await?;
    Ok(Json(assets).into_response())
}

async fn clear_all(State(repository): State<Arc<Repository>>) -> Result<StatusCode> {
    blocking(repository, |r| r.clear_all()).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn latest_surrogate(
    State(repository): State<Arc<Repository>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Query(q): Query<AcceptQuery>,
) -> Result<Json<KnowledgeAsset>> {
    let accept = preferences(&headers, q);
    let surrogate = blocking(repository, move |r| r.get_latest_surrogate(&id, accept.as_deref())).await?;
    Ok(Json(surrogate))
}

async fn list_versions(
    State(repository): State<Arc<Repository>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<AssetPointer>>> {
    Ok(Json(blocking(repository, move |r| r.list_asset_versions(&id)).await?))
}

async fn get_surrogate(
    State(repository): State<Arc<Repository>>,
    Path((id, version)): Path<(Uuid, String)>,
    headers: HeaderMap,
    Query(q): Query<AcceptQuery>,
) -> Result<Json<KnowledgeAsset>> {
    let accept = preferences(&headers, q);
    let asset = AssetPointer::new(id, version);
    let surrogate = blocking(repository, move |r| r.get_surrogate(&asset, accept.as_deref())).await?;
    Ok(Json(surrogate))
}

async fn put_surrogate(
    State(repository): State<Arc<Repository>>,
    Path((id, version)): Path<(Uuid, String)>,
    Json(surrogate): Json<KnowledgeAsset>,
) -> Result<StatusCode> {
    let asset = AssetPointer::new(id, version);
    blocking(repository, move |r| r.register_surrogate(&asset, surrogate)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn canonical_carrier(
    State(repository): State<Arc<Repository>>,
    Path((id, version)): Path<(Uuid, String)>,
    headers: HeaderMap,
    Query(q): Query<AcceptQuery>,
) -> Result<Response> {
    let accept = preferences(&headers, q);
    let asset = AssetPointer::new(id, version);
    let carrier = blocking(repository, move |r| r.get_canonical_carrier(&asset, accept.as_deref())).await?;
    Ok(carrier_response(carrier))
}

async fn get_carrier_version(
    State(repository): State<Arc<Repository>>,
    Path((id, version, carrier_id, carrier_version)): Path<(Uuid, String, Uuid, String)>,
) -> Result<Response> {
    let asset = AssetPointer::new(id, version);
    let artifact = AssetPointer::new(carrier_id, carrier_version);
    let carrier = blocking(repository, move |r| r.get_carrier_version(&asset, &artifact)).await?;
    Ok(carrier_response(carrier))
}

async fn put_carrier_version(
    State(repository): State<Arc<Repository>>,
    Path((id, version, carrier_id, carrier_version)): Path<(Uuid, String, Uuid, String)>,
    Query(q): Query<CarrierQuery>,
    body: Bytes,
) -> Result<StatusCode> {
    let representation = match q.rep.as_deref() {
        Some(code) => decode_code(code)
            .map(|w| w.rep)
            .ok_or_else(|| RepositoryError::Parse {
                message: format!("undecodable representation '{}'", code),
            })?,
        None => Default::default(),
    };
    let asset = AssetPointer::new(id, version);
    let artifact = AssetPointer::new(carrier_id, carrier_version);
    blocking(repository, move |r| {
        r.register_carrier(&asset, &artifact, representation, q.label.as_deref(), body.to_vec())
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_asset(State(repository): State<Arc<Repository>>, Path(id): Path<Uuid>) -> Result<StatusCode> {
    blocking(repository, move |r| r.delete_asset(&id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_asset_version(
    State(repository): State<Arc<Repository>>,
    Path((id, version)): Path<(Uuid, String)>,
) -> Result<StatusCode> {
    let asset = AssetPointer::new(id, version);
    blocking(repository, move |r| r.delete_asset_version(&asset)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_carriers(
    State(repository): State<Arc<Repository>>,
    Path((id, version)): Path<(Uuid, String)>,
) -> Result<Json<Vec<ArtifactEntry>>> {
    let asset = AssetPointer::new(id, version);
    Ok(Json(blocking(repository, move |r| r.list_carriers(&asset)).await?))
}

async fn list_surrogates(
    State(repository): State<Arc<Repository>>,
    Path((id, version)): Path<(Uuid, String)>,
) -> Result<Json<Vec<ArtifactEntry>>> {
    let asset = AssetPointer::new(id, version);
    Ok(Json(blocking(repository, move |r| r.list_surrogates(&asset)).await?))
}

async fn composite_structure(
    State(repository): State<Arc<Repository>>,
    Path((id, version)): Path<(Uuid, String)>,
) -> Result<Json<CompositeStructure>> {
    let asset = AssetPointer::new(id, version);
    Ok(Json(blocking(repository, move |r| r.get_composite_structure(&asset)).await?))
}

async fn composite_surrogate(
    State(repository): State<Arc<Repository>>,
    Path((id, version)): Path<(Uuid, String)>,
    headers: HeaderMap,
    Query(q): Query<AcceptQuery>,
) -> Result<Json<Composite<KnowledgeAsset>>> {
    let accept = preferences(&headers, q);
    let asset = AssetPointer::new(id, version);
    Ok(Json(
        blocking(repository, move |r| r.get_composite_surrogate(&asset, accept.as_deref())).await?,
    ))
}

async fn composite_carrier(
    State(repository): State<Arc<Repository>>,
    Path((id, version)): Path<(Uuid, String)>,
    headers: HeaderMap,
    Query(q): Query<AcceptQuery>,
) -> Result<Json<Composite<KnowledgeCarrier>>> {
    let accept = preferences(&headers, q);
    let asset = AssetPointer::new(id, version);
    Ok(Json(
        blocking(repository, move |r| r.get_composite_carrier(&asset, accept.as_deref())).await?,
    ))
}

fn bundle_parameters(q: BundleQuery) -> Result<(Option<Relationship>, Option<usize>)> {
    let rel = q.rel.as_deref().map(str::parse::<Relationship>).transpose()?;
    Ok((rel, q.depth))
}

async fn get_bundle(
    State(repository): State<Arc<Repository>>,
    Path((id, version)): Path<(Uuid, String)>,
    Query(q): Query<BundleQuery>,
) -> Result<Json<Vec<KnowledgeCarrier>>> {
    let (rel, depth) = bundle_parameters(q)?;
    let asset = AssetPointer::new(id, version);
    Ok(Json(blocking(repository, move |r| r.get_bundle(&asset, rel, depth)).await?))
}

async fn get_surrogate_bundle(
    State(repository): State<Arc<Repository>>,
    Path((id, version)): Path<(Uuid, String)>,
    Query(q): Query<BundleQuery>,
) -> Result<Json<Vec<KnowledgeAsset>>> {
    let (rel, depth) = bundle_parameters(q)?;
    let asset = AssetPointer::new(id, version);
    Ok(Json(
        blocking(repository, move |r| r.get_surrogate_bundle(&asset, rel, depth)).await?,
    ))
}

pub fn router(repository: Arc<Repository>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    info!("routing /cat/assets");
    Router::new()
        .route("/cat/assets", get(list_assets).delete(clear_all))
        .route("/cat/assets/:id", get(latest_surrogate).delete(delete_asset))
        .route("/cat/assets/:id/versions", get(list_versions))
        .route(
            "/cat/assets/:id/versions/:version",
            get(get_surrogate).put(put_surrogate).delete(delete_asset_version),
        )
        .route("/cat/assets/:id/versions/:version/surrogate", get(get_surrogate))
        .route("/cat/assets/:id/versions/:version/surrogates", get(list_surrogates))
        .route("/cat/assets/:id/versions/:version/carrier", get(canonical_carrier))
        .route("/cat/assets/:id/versions/:version/carriers", get(list_carriers))
        .route("/cat/assets/:id/versions/:version/composite/structure", get(composite_structure))
        .route("/cat/assets/:id/versions/:version/composite/surrogate", get(composite_surrogate))
        .route("/cat/assets/:id/versions/:version/composite/carrier", get(composite_carrier))
        .route(
            "/cat/assets/:id/versions/:version/carriers/:carrier_id/versions/:carrier_version",
            get(get_carrier_version).put(put_carrier_version),
        )
        .route("/cat/assets/:id/versions/:version/bundle", get(get_bundle))
        .route("/cat/assets/:id/versions/:version/bundle/surrogates", get(get_surrogate_bundle))
        .layer(cors)
        .with_state(repository)
}
