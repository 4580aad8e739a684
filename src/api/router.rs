//! API Router with Swagger UI

use std::sync::Arc;
use std::time::Instant;

use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::dto::*;
use crate::api::handlers::health::HealthResponse;
use crate::api::handlers::metrics::{prometheus_metrics, MetricsState};
use crate::api::handlers::{charge_points, commands, health, status_page};
use crate::application::control::RemoteControl;
use crate::interfaces::ws::SharedSessionRegistry;

/// State shared by every control surface route.
#[derive(Clone)]
pub struct ApiState {
    pub control: Arc<RemoteControl>,
    pub sessions: SharedSessionRegistry,
    pub started_at: Instant,
}

impl ApiState {
    pub fn new(control: Arc<RemoteControl>, sessions: SharedSessionRegistry) -> Self {
        Self {
            control,
            sessions,
            started_at: Instant::now(),
        }
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        charge_points::list_charge_points,
        charge_points::get_charge_point,
        commands::reset_charge_point,
        commands::remote_start,
        commands::remote_stop,
    ),
    components(
        schemas(
            ApiResponse<String>,
            HealthResponse,
            ChargePointDto,
            ConnectorDto,
            ConfigurationKeyDto,
            TransactionDto,
            MeasurementDto,
            RemoteStartRequest,
            RemoteStopRequest,
            CommandResponse,
        )
    ),
    tags(
        (name = "Health", description = "Liveness check."),
        (name = "Charge Points", description = "Live state of connected charge points: identification, status, connectors, transactions and configuration keys. Served from memory, never waits on a device."),
        (name = "Commands", description = "OCPP 1.6 commands sent to a charge point over its WebSocket session. The request blocks until the charge point confirms or the command timeout expires. 404: unknown charge point, connector or transaction; 409: connector busy or transaction already ended; 503: charge point not connected; 502: charge point declined; 504: no response."),
    ),
    info(
        title = "OCPP Central System API",
        version = "1.0.0",
        description = "Control surface of an OCPP 1.6 central system.

All JSON responses are wrapped in a standard envelope:
```json
{\"success\": true, \"data\": {...}}
```

On failure:
```json
{\"success\": false, \"data\": null, \"error\": \"description\"}
```",
        license(
            name = "MIT"
        )
    )
)]
pub struct ApiDoc;

/// Create the router serving the status page, JSON API, Swagger UI and,
/// when a recorder is installed, `/metrics`.
pub fn create_api_router(state: ApiState, metrics: Option<PrometheusHandle>) -> Router {
    let mut router = Router::new()
        // Operator status page; every mutation is a POST
        .route("/", get(status_page::status_page))
        .route("/reset/{charge_point_id}", post(status_page::reset))
        .route("/start/{charge_point_id}/{connector_id}", post(status_page::start))
        .route("/stop/{charge_point_id}/{transaction_id}", post(status_page::stop))
        .route("/health", get(health::health_check))
        // JSON API
        .route("/api/v1/charge-points", get(charge_points::list_charge_points))
        .route("/api/v1/charge-points/{charge_point_id}", get(charge_points::get_charge_point))
        .route("/api/v1/charge-points/{charge_point_id}/reset", post(commands::reset_charge_point))
        .route("/api/v1/charge-points/{charge_point_id}/remote-start", post(commands::remote_start))
        .route("/api/v1/charge-points/{charge_point_id}/remote-stop", post(commands::remote_stop))
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()));

    if let Some(handle) = metrics {
        router = router.merge(
            Router::new()
                .route("/metrics", get(prometheus_metrics))
                .with_state(MetricsState { handle }),
        );
    }

    router.layer(TraceLayer::new_for_http())
}
