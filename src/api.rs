//! HTTP routes over the inventory data-access layer.

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRequest, FromRequestParts, Path, Query, State,
    },
    http::{header, request::Parts, HeaderValue, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use inventario_core::{
    Cliente, Entrada, Id, Inventory, NewCliente, NewEntrada, NewProducto, NewProveedor, NewSalida,
    Producto, Proveedor, ReportError, Salida,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, CorsLayer},
    trace::TraceLayer,
};

use crate::config::{ApiConfig, CorsConfig};
use crate::sample_data::{self, FillSummary};
use crate::storage::{Page, StorageError};

#[derive(Clone)]
pub struct AppState {
    inventory: Arc<Inventory>,
    default_page_size: u64,
}

impl AppState {
    pub fn new(inventory: Arc<Inventory>, api: &ApiConfig) -> Self {
        Self {
            inventory,
            default_page_size: api.default_page_size,
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Report(#[from] ReportError),
    /// The request body, path or query string could not be extracted.
    #[error("{detail}")]
    Rejected { status: StatusCode, detail: String },
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Rejected {
            status: rejection.status(),
            detail: rejection.body_text(),
        }
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::Rejected {
            status: rejection.status(),
            detail: rejection.body_text(),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Rejected {
            status: rejection.status(),
            detail: rejection.body_text(),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

const INTERNAL_DETAIL: &str = "Error interno del servidor";

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self {
            ApiError::Storage(StorageError::NotFound { entity, .. }) => {
                (StatusCode::NOT_FOUND, entity.not_found_message().to_string())
            }
            ApiError::Storage(StorageError::MissingReference { entity, id }) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                format!("{} {} no existe", entity, id),
            ),
            ApiError::Storage(StorageError::Referenced { entity, id, by }) => (
                StatusCode::CONFLICT,
                format!("{} {} tiene registros de {} asociados", entity, id, by),
            ),
            ApiError::Storage(StorageError::Invalid(e)) => {
                (StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
            }
            ApiError::Storage(e) => {
                tracing::error!(error = %e, "Storage failure");
                (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_DETAIL.to_string())
            }
            ApiError::Report(e @ ReportError::InvalidDate { .. }) => {
                (StatusCode::BAD_REQUEST, e.to_string())
            }
            ApiError::Report(e @ ReportError::Unavailable(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            ApiError::Rejected { status, detail } => (*status, detail.clone()),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Handler failure");
                (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_DETAIL.to_string())
            }
        };
        (status, Json(ErrorBody { detail })).into_response()
    }
}

/// `Json` body extractor whose rejection renders as `{"detail": ...}`.
pub struct Body<T>(pub T);

#[async_trait]
impl<S, B, T> FromRequest<S, B> for Body<T>
where
    Json<T>: FromRequest<S, B, Rejection = JsonRejection>,
    S: Send + Sync,
    B: Send + 'static,
{
    type Rejection = ApiError;

    async fn from_request(req: Request<B>, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Body(value))
    }
}

pub struct PathParam<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for PathParam<T>
where
    Path<T>: FromRequestParts<S, Rejection = PathRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state).await?;
        Ok(PathParam(value))
    }
}

pub struct QueryParams<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for QueryParams<T>
where
    Query<T>: FromRequestParts<S, Rejection = QueryRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(QueryParams(value))
    }
}

/// Runs one data-access call on the blocking pool. Backends are synchronous
/// and the PostgreSQL client must never run on an async worker.
async fn run<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Inventory) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let inventory = state.inventory.clone();
    tokio::task::spawn_blocking(move || f(&inventory))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    skip: Option<u64>,
    limit: Option<u64>,
}

impl ListParams {
    fn page(&self, state: &AppState) -> Page {
        Page::new(
            self.skip.unwrap_or(0),
            self.limit.unwrap_or(state.default_page_size),
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct ReportParams {
    start_date: String,
    end_date: String,
}

#[derive(Debug, Deserialize)]
pub struct FillParams {
    count: Option<usize>,
}

#[derive(Serialize)]
struct Message {
    message: &'static str,
}

#[derive(Serialize)]
struct ReportBody<T> {
    data: Vec<T>,
}

#[derive(Serialize)]
struct FillBody {
    message: &'static str,
    #[serde(flatten)]
    summary: FillSummary,
}

pub fn cors_layer(config: &CorsConfig) -> Result<CorsLayer, header::InvalidHeaderValue> {
    let origin = HeaderValue::from_str(&config.allowed_origin)?;
    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request()))
}

pub fn router(state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/", get(read_root))
        .route("/fill_data/", post(fill_data))
        .route("/productos/", get(list_productos).post(create_producto))
        .route(
            "/productos/:id",
            get(read_producto).put(update_producto).delete(delete_producto),
        )
        .route("/clientes/", get(list_clientes).post(create_cliente))
        .route(
            "/clientes/:id",
            get(read_cliente).put(update_cliente).delete(delete_cliente),
        )
        .route("/entradas/", get(list_entradas).post(create_entrada))
        .route("/entradas/:id", get(read_entrada))
        .route("/salidas/", get(list_salidas).post(create_salida))
        .route("/salidas/:id", get(read_salida))
        .route("/proveedores/", get(list_proveedores).post(create_proveedor))
        .route("/proveedores/:id", get(read_proveedor))
        .route("/reportes/entradas", get(report_entradas))
        .route("/reportes/salidas", get(report_salidas))
        .fallback(unknown_route)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

async fn unknown_route() -> (StatusCode, Json<ErrorBody>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody {
            detail: "Ruta no encontrada".to_string(),
        }),
    )
}

async fn read_root() -> Json<Message> {
    Json(Message {
        message: "API funcionando correctamente",
    })
}

async fn fill_data(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<FillParams>,
) -> Result<(StatusCode, Json<FillBody>), ApiError> {
    let count = params.count.unwrap_or(sample_data::DEFAULT_COUNT);
    let summary = run(&state, move |inv| Ok(sample_data::fill(inv, count)?)).await?;
    tracing::info!(productos = summary.productos, clientes = summary.clientes, "Sample data inserted");
    Ok((
        StatusCode::CREATED,
        Json(FillBody {
            message: "Datos de ejemplo insertados exitosamente",
            summary,
        }),
    ))
}

// Productos

async fn create_producto(
    State(state): State<AppState>,
    Body(input): Body<NewProducto>,
) -> Result<(StatusCode, Json<Producto>), ApiError> {
    let producto = run(&state, move |inv| Ok(inv.create_producto(&input)?)).await?;
    Ok((StatusCode::CREATED, Json(producto)))
}

async fn read_producto(
    State(state): State<AppState>,
    PathParam(id): PathParam<Id>,
) -> Result<Json<Producto>, ApiError> {
    Ok(Json(run(&state, move |inv| Ok(inv.get_producto(id)?)).await?))
}

async fn list_productos(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<ListParams>,
) -> Result<Json<Vec<Producto>>, ApiError> {
    let page = params.page(&state);
    Ok(Json(run(&state, move |inv| Ok(inv.list_productos(page)?)).await?))
}

async fn update_producto(
    State(state): State<AppState>,
    PathParam(id): PathParam<Id>,
    Body(input): Body<NewProducto>,
) -> Result<Json<Producto>, ApiError> {
    Ok(Json(run(&state, move |inv| Ok(inv.update_producto(id, &input)?)).await?))
}

async fn delete_producto(
    State(state): State<AppState>,
    PathParam(id): PathParam<Id>,
) -> Result<StatusCode, ApiError> {
    run(&state, move |inv| Ok(inv.delete_producto(id)?)).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Clientes

async fn create_cliente(
    State(state): State<AppState>,
    Body(input): Body<NewCliente>,
) -> Result<(StatusCode, Json<Cliente>), ApiError> {
    let cliente = run(&state, move |inv| Ok(inv.create_cliente(&input)?)).await?;
    Ok((StatusCode::CREATED, Json(cliente)))
}

async fn read_cliente(
    State(state): State<AppState>,
    PathParam(id): PathParam<Id>,
) -> Result<Json<Cliente>, ApiError> {
    Ok(Json(run(&state, move |inv| Ok(inv.get_cliente(id)?)).await?))
}

async fn list_clientes(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<ListParams>,
) -> Result<Json<Vec<Cliente>>, ApiError> {
    let page = params.page(&state);
    Ok(Json(run(&state, move |inv| Ok(inv.list_clientes(page)?)).await?))
}

async fn update_cliente(
    State(state): State<AppState>,
    PathParam(id): PathParam<Id>,
    Body(input): Body<NewCliente>,
) -> Result<Json<Cliente>, ApiError> {
    Ok(Json(run(&state, move |inv| Ok(inv.update_cliente(id, &input)?)).await?))
}

async fn delete_cliente(
    State(state): State<AppState>,
    PathParam(id): PathParam<Id>,
) -> Result<StatusCode, ApiError> {
    run(&state, move |inv| Ok(inv.delete_cliente(id)?)).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Entradas, salidas and proveedores are insert/read only.

async fn create_entrada(
    State(state): State<AppState>,
    Body(input): Body<NewEntrada>,
) -> Result<(StatusCode, Json<Entrada>), ApiError> {
    let entrada = run(&state, move |inv| Ok(inv.create_entrada(&input)?)).await?;
    Ok((StatusCode::CREATED, Json(entrada)))
}

async fn read_entrada(
    State(state): State<AppState>,
    PathParam(id): PathParam<Id>,
) -> Result<Json<Entrada>, ApiError> {
    Ok(Json(run(&state, move |inv| Ok(inv.get_entrada(id)?)).await?))
}

async fn list_entradas(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<ListParams>,
) -> Result<Json<Vec<Entrada>>, ApiError> {
    let page = params.page(&state);
    Ok(Json(run(&state, move |inv| Ok(inv.list_entradas(page)?)).await?))
}

async fn create_salida(
    State(state): State<AppState>,
    Body(input): Body<NewSalida>,
) -> Result<(StatusCode, Json<Salida>), ApiError> {
    let salida = run(&state, move |inv| Ok(inv.create_salida(&input)?)).await?;
    Ok((StatusCode::CREATED, Json(salida)))
}

async fn read_salida(
    State(state): State<AppState>,
    PathParam(id): PathParam<Id>,
) -> Result<Json<Salida>, ApiError> {
    Ok(Json(run(&state, move |inv| Ok(inv.get_salida(id)?)).await?))
}

async fn list_salidas(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<ListParams>,
) -> Result<Json<Vec<Salida>>, ApiError> {
    let page = params.page(&state);
    Ok(Json(run(&state, move |inv| Ok(inv.list_salidas(page)?)).await?))
}

async fn create_proveedor(
    State(state): State<AppState>,
    Body(input): Body<NewProveedor>,
) -> Result<(StatusCode, Json<Proveedor>), ApiError> {
    let proveedor = run(&state, move |inv| Ok(inv.create_proveedor(&input)?)).await?;
    Ok((StatusCode::CREATED, Json(proveedor)))
}

async fn read_proveedor(
    State(state): State<AppState>,
    PathParam(id): PathParam<Id>,
) -> Result<Json<Proveedor>, ApiError> {
    Ok(Json(run(&state, move |inv| Ok(inv.get_proveedor(id)?)).await?))
}

async fn list_proveedores(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<ListParams>,
) -> Result<Json<Vec<Proveedor>>, ApiError> {
    let page = params.page(&state);
    Ok(Json(run(&state, move |inv| Ok(inv.list_proveedores(page)?)).await?))
}

// Reportes

async fn report_entradas(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<ReportParams>,
) -> Result<Json<ReportBody<Entrada>>, ApiError> {
    let data = run(&state, move |inv| {
        Ok(inv.entradas_between(&params.start_date, &params.end_date)?)
    })
    .await?;
    Ok(Json(ReportBody { data }))
}

async fn report_salidas(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<ReportParams>,
) -> Result<Json<ReportBody<Salida>>, ApiError> {
    let data = run(&state, move |inv| {
        Ok(inv.salidas_between(&params.start_date, &params.end_date)?)
    })
    .await?;
    Ok(Json(ReportBody { data }))
}
