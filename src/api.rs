//! REST API for the container loading service.
//!
//! Provides HTTP endpoints for calculating a load plan, optionally streaming
//! progress as Server-Sent Events. Uses Axum as the web framework and supports
//! CORS.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{
    Router,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::OnceLock;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{Any, CorsLayer};
use utoipa::{OpenApi, ToSchema};

use crate::config::{ApiConfig, OptimizerConfig};
use crate::error::PackingError;
use crate::model::{ConstraintFlags, Container, Group, ItemSpec, expand_catalog};
use crate::optimizer::{Algorithm, CancellationToken, LoadProblem, RunContext, Strategy, pack};
use crate::result::{LoadResult, PlacedItem, UnplacedItem};

#[derive(Clone)]
struct ApiState {
    optimizer_config: OptimizerConfig,
}

static OPENAPI_DOC: OnceLock<utoipa::openapi::OpenApi> = OnceLock::new();

// SRI hashes verified against https://unpkg.com/swagger-ui-dist@5.17.14/ on 2025-10-29.
const SWAGGER_UI_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
    <head>
        <meta charset="utf-8" />
        <title>container-loader API Docs</title>
        <link
            rel="stylesheet"
            href="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui.css"
            integrity="sha384-wxLW6kwyHktdDGr6Pv1zgm/VGJh99lfUbzSn6HNHBENZlCN7W602k9VkGdxuFvPn"
            crossorigin="anonymous"
        />
    </head>
    <body>
        <div id="swagger-ui"></div>
        <script
            src="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui-bundle.js"
            integrity="sha384-wmyclcVGX/WhUkdkATwhaK1X1JtiNrr2EoYJ+diV3vj4v6OC5yCeSu+yW13SYJep"
            crossorigin="anonymous"
        ></script>
        <script
            src="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui-standalone-preset.js"
            integrity="sha384-2YH8WDRaj7V2OqU/trsmzSagmk/E2SutiCsGkdgoQwC9pNUJV1u/141DHB6jgs8t"
            crossorigin="anonymous"
        ></script>
        <script>
            window.onload = function () {
                const ui = SwaggerUIBundle({
                    url: "/docs/openapi.json",
                    dom_id: "#swagger-ui",
                    presets: [SwaggerUIBundle.presets.apis, SwaggerUIStandalonePreset],
                    layout: "StandaloneLayout",
                });
                window.ui = ui;
            };
        </script>
    </body>
    </html>"##;

fn openapi_doc() -> &'static utoipa::openapi::OpenApi {
    OPENAPI_DOC.get_or_init(ApiDoc::openapi)
}

/// Request structure for the calculation endpoints.
///
/// `algorithm` accepts `BLF`, `GREEDY`, `GA` or `HYBRID` (case-insensitive);
/// the server default applies when it is omitted.
#[derive(Deserialize, Clone, ToSchema)]
#[schema(
    example = json!({
        "container": {"length": 591.9, "width": 234.0, "height": 238.0, "maxWeight": 18725.0},
        "items": [
            {"length": 53.0, "width": 53.0, "height": 76.0, "weight": 20.0, "quantity": 35, "group": "Spareparts"}
        ],
        "groups": [{"name": "Spareparts", "color": "#4f9d69"}],
        "algorithm": "BLF",
        "constraints": {"enforceLoadCapacity": true}
    })
)]
pub struct CalculationRequest {
    pub container: Container,
    pub items: Vec<ItemSpec>,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub algorithm: Option<String>,
    #[serde(default)]
    pub constraints: ConstraintFlags,
}

#[derive(Debug)]
struct ValidatedCalculation {
    problem: LoadProblem,
    strategy: Strategy,
    groups: Vec<Group>,
}

impl CalculationRequest {
    fn into_validated(self, config: &OptimizerConfig) -> Result<ValidatedCalculation, PackingError> {
        let algorithm = match self.algorithm.as_deref() {
            Some(name) => name.parse::<Algorithm>()?,
            None => config.default_algorithm(),
        };
        let boxes = expand_catalog(&self.items)?;
        let problem =
            LoadProblem::with_config(self.container, boxes, self.constraints, config.packing_config())?;
        Ok(ValidatedCalculation {
            problem,
            strategy: config.strategy(algorithm),
            groups: self.groups,
        })
    }
}

/// Server-Sent Event payloads of `/calculate_stream`.
#[derive(Clone, Debug, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CalculationEvent {
    /// A coarse progress line from the running strategy.
    Progress { message: String },
    /// The run finished.
    Finished { result: LoadResult },
    /// The run was rejected or failed.
    Failed { error: String, code: String },
    /// The run observed its cancellation token.
    Cancelled,
}

impl CalculationEvent {
    fn name(&self) -> &'static str {
        match self {
            CalculationEvent::Progress { .. } => "progress",
            CalculationEvent::Finished { .. } => "finished",
            CalculationEvent::Failed { .. } => "failed",
            CalculationEvent::Cancelled => "cancelled",
        }
    }

    fn from_outcome(outcome: Result<LoadResult, PackingError>) -> Self {
        match outcome {
            Ok(result) => CalculationEvent::Finished { result },
            Err(PackingError::Cancelled) => CalculationEvent::Cancelled,
            Err(err) => CalculationEvent::Failed {
                error: err.to_string(),
                code: err.code().to_string(),
            },
        }
    }
}

#[derive(Serialize, ToSchema)]
struct ErrorResponse {
    error: String,
    code: String,
    details: String,
}

impl ErrorResponse {
    fn new(error: impl Into<String>, code: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
            details: details.into(),
        }
    }
}

fn error_response(
    status: StatusCode,
    error: impl Into<String>,
    code: impl Into<String>,
    details: impl Into<String>,
) -> Response {
    (status, Json(ErrorResponse::new(error, code, details))).into_response()
}

fn json_deserialize_error(err: JsonRejection) -> Response {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid JSON data",
        "invalid_json",
        err.to_string(),
    )
}

fn packing_error(err: PackingError) -> Response {
    let error = match err {
        PackingError::ConstraintFieldWithoutFlag { .. } => "Invalid constraint configuration",
        PackingError::Cancelled => "Calculation cancelled",
        PackingError::InvalidInput(_) => "Invalid input data",
    };
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        error,
        err.code(),
        err.to_string(),
    )
}

fn parse_calculation_request(
    payload: Result<Json<CalculationRequest>, JsonRejection>,
    config: &OptimizerConfig,
) -> Result<ValidatedCalculation, Response> {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(err) => return Err(json_deserialize_error(err)),
    };
    payload.into_validated(config).map_err(packing_error)
}

#[derive(OpenApi)]
#[openapi(
    paths(handle_calculate, handle_calculate_stream, handle_health),
    components(
        schemas(
            CalculationRequest,
            CalculationEvent,
            Container,
            ItemSpec,
            Group,
            ConstraintFlags,
            LoadResult,
            PlacedItem,
            UnplacedItem,
            ErrorResponse
        )
    ),
    tags((name = "loading", description = "Endpoints for container load planning"))
)]
struct ApiDoc;

fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        .route("/calculate", post(handle_calculate))
        .route("/calculate_stream", post(handle_calculate_stream))
        .route("/health", get(handle_health))
        .route("/docs/openapi.json", get(serve_openapi_json))
        .route("/docs", get(serve_openapi_ui))
        .layer(cors)
        .with_state(state)
}

/// Starts the API server.
///
/// Configures CORS for cross-origin requests from the frontend.
/// Blocks until the server is terminated.
pub async fn start_api_server(config: ApiConfig, optimizer_config: OptimizerConfig) -> std::io::Result<()> {
    let app = router(ApiState { optimizer_config });

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;

    println!(
        "🚀 Server running on http://{}:{}",
        config.display_host(),
        config.port()
    );
    if config.binds_to_all_interfaces() {
        println!("💡 Local access: http://localhost:{}", config.port());
    }
    println!("📦 API Endpoints:");
    println!("   - POST /calculate");
    println!("   - POST /calculate_stream");
    println!("   - GET /health");
    println!("📑 Documentation:");
    println!("   - GET /docs");
    println!("   - GET /docs/openapi.json");

    axum::serve(listener, app).await
}

/// Handler for POST /calculate endpoint.
///
/// Expands the item catalog, runs the requested strategy and returns the load
/// plan.
#[utoipa::path(
    post,
    path = "/calculate",
    request_body = CalculationRequest,
    responses(
        (status = 200, description = "Load plan calculated", body = LoadResult),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid request, input data or constraint configuration",
            body = ErrorResponse
        ),
        (status = INTERNAL_SERVER_ERROR, description = "Calculation aborted", body = ErrorResponse)
    ),
    tag = "loading"
)]
async fn handle_calculate(
    State(state): State<ApiState>,
    payload: Result<Json<CalculationRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request = match parse_calculation_request(payload, &state.optimizer_config) {
        Ok(request) => request,
        Err(response) => return response,
    };

    let algorithm = request.strategy.algorithm();
    println!(
        "📥 New calculation request: {} boxes, algorithm {}",
        request.problem.len(),
        algorithm
    );

    let joined = tokio::task::spawn_blocking(move || {
        pack(
            &request.problem,
            &request.strategy,
            &RunContext::none(),
            &request.groups,
        )
    })
    .await;

    match joined {
        Ok(Ok(result)) => {
            println!(
                "📦 Result: {} placed, {} unplaced, fill rate {:.2}%",
                result.placed_items.len(),
                result.unplaced_items.len(),
                result.fill_rate
            );
            (StatusCode::OK, Json(result)).into_response()
        }
        Ok(Err(err)) => packing_error(err),
        Err(err) => {
            eprintln!("❌ Calculation task failed: {err}");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Calculation aborted",
                "internal",
                err.to_string(),
            )
        }
    }
}

/// Handler for POST /calculate_stream endpoint (SSE).
///
/// Streams progress lines while the strategy runs, followed by exactly one
/// `finished`, `failed` or `cancelled` event. Closing the connection cancels
/// the run.
#[utoipa::path(
    post,
    path = "/calculate_stream",
    request_body = CalculationRequest,
    responses(
        (
            status = 200,
            description = "Streams calculation events in real-time",
            content_type = "text/event-stream",
            body = CalculationEvent
        ),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid request, input data or constraint configuration",
            body = ErrorResponse
        )
    ),
    tag = "loading"
)]
async fn handle_calculate_stream(
    State(state): State<ApiState>,
    payload: Result<Json<CalculationRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request = match parse_calculation_request(payload, &state.optimizer_config) {
        Ok(request) => request,
        Err(response) => return response,
    };

    let (tx, rx) = mpsc::channel::<CalculationEvent>(32);
    spawn_calculation(request, tx);

    let stream = ReceiverStream::new(rx).map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_else(|err| {
            json!({"type": "failed", "error": err.to_string(), "code": "serialization"}).to_string()
        });
        Ok::<_, std::convert::Infallible>(Event::default().event(event.name()).data(data))
    });
    Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(std::time::Duration::from_secs(10))
                .text("keep-alive"),
        )
        .into_response()
}

/// Runs a calculation on the blocking pool and forwards its progress lines and
/// final outcome to `tx`.
///
/// A watcher cancels the run as soon as the receiving side is dropped, so a
/// disconnected client stops the run at its next checkpoint.
fn spawn_calculation(
    request: ValidatedCalculation,
    tx: mpsc::Sender<CalculationEvent>,
) -> tokio::task::JoinHandle<Result<LoadResult, PackingError>> {
    let token = CancellationToken::new();
    let watcher = {
        let tx = tx.clone();
        let token = token.clone();
        tokio::spawn(async move {
            tx.closed().await;
            token.cancel();
        })
    };

    tokio::task::spawn_blocking(move || {
        let forward = |line: &str| {
            let event = CalculationEvent::Progress {
                message: line.to_string(),
            };
            if tx.blocking_send(event).is_err() {
                token.cancel();
            }
        };
        let ctx = RunContext::none()
            .with_cancellation(token.clone())
            .with_progress(&forward);
        let outcome = pack(&request.problem, &request.strategy, &ctx, &request.groups);
        watcher.abort();
        let _ = tx.blocking_send(CalculationEvent::from_outcome(outcome.clone()));
        outcome
    })
}

/// Liveness check.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is running")),
    tag = "loading"
)]
async fn handle_health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

async fn serve_openapi_json(State(_state): State<ApiState>) -> impl IntoResponse {
    Json(openapi_doc())
}

async fn serve_openapi_ui(State(_state): State<ApiState>) -> impl IntoResponse {
    Html(SWAGGER_UI_HTML)
}
