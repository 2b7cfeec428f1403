use crate::config::ServerConfig;
use crate::error::PricerError;
use crate::metrics;
use crate::predictor::ListingFeatures;
use crate::service::PricingService;
use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use hyper::Server;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Error response carrying the classification of a [`PricerError`]
pub struct ApiError(PricerError);

impl From<PricerError> for ApiError {
    fn from(e: PricerError) -> Self {
        ApiError(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            PricerError::Format(_) | PricerError::Schema(_) => StatusCode::BAD_REQUEST,
            PricerError::Normalization(_) | PricerError::Training(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            PricerError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            PricerError::ModelUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.0.kind(),
            "detail": self.0.to_string(),
        }));
        (self.status(), body).into_response()
    }
}

async fn health(State(service): State<Arc<PricingService>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "apartment-pricer",
        "version": env!("CARGO_PKG_VERSION"),
        "model_loaded": service.model().is_loaded(),
    }))
}

async fn model_info(State(service): State<Arc<PricingService>>) -> Result<Response, ApiError> {
    let metadata = service.model_info().ok_or(PricerError::ModelUnavailable)?;
    Ok(Json(metadata).into_response())
}

async fn predict(
    State(service): State<Arc<PricingService>>,
    Json(features): Json<ListingFeatures>,
) -> Result<Response, ApiError> {
    let estimate = service.predict(&features)?;
    Ok(Json(json!({
        "estimated_price": estimate.estimated_price,
        "neighborhood": estimate.neighborhood,
    }))
    .into_response())
}

/// Classify a multipart read failure; hitting the body limit is not a malformed upload
fn upload_error(e: MultipartError, context: &str) -> PricerError {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(&e);
    while let Some(err) = source {
        if err.to_string().contains("length limit exceeded") {
            return PricerError::PayloadTooLarge(
                "request body exceeds the configured upload limit".to_string(),
            );
        }
        source = err.source();
    }
    PricerError::Format(format!("{}: {}", context, e))
}

/// Multipart upload; the first part carrying a file name is the batch
async fn train(
    State(service): State<Arc<PricingService>>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| upload_error(e, "malformed multipart body"))?
    {
        if let Some(name) = field.file_name().map(str::to_string) {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| upload_error(e, "unreadable upload"))?;
            upload = Some((name, bytes));
            break;
        }
    }
    let (filename, bytes) =
        upload.ok_or_else(|| PricerError::Format("no file part in upload".to_string()))?;

    let summary = service.ingest(&filename, &bytes).await?;
    Ok(Json(json!({
        "message": "Model retrained",
        "total_linhas_processadas": summary.rows_in_history,
        "performance_r2": summary.r2,
        "rows_received": summary.rows_received,
        "rows_normalized": summary.rows_normalized,
        "artifact_id": summary.artifact_id,
    }))
    .into_response())
}

async fn metrics_text() -> Response {
    match metrics::render() {
        Some(body) => (StatusCode::OK, body).into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

/// Build the router with every route
pub fn create_server(
    service: Arc<PricingService>,
    expose_metrics: bool,
    max_upload_bytes: usize,
) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    let mut router = Router::new()
        .route("/health", get(health))
        .route("/model", get(model_info))
        .route("/predict", post(predict))
        .route(
            "/train",
            post(train).layer(DefaultBodyLimit::max(max_upload_bytes)),
        );
    if expose_metrics {
        router = router.route("/metrics", get(metrics_text));
    }

    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(service)
}

/// Start the HTTP server on the configured port
pub async fn start_server(
    service: Arc<PricingService>,
    config: &ServerConfig,
    expose_metrics: bool,
) -> Result<(), hyper::Error> {
    let port = config.port;
    let app = create_server(service, expose_metrics, config.max_upload_bytes);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!("HTTP server running on http://localhost:{port}");
    info!("Health check: http://localhost:{port}/health");

    Server::bind(&addr).serve(app.into_make_service()).await
}
