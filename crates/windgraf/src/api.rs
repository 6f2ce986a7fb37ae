use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::Path;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::engine::Engine;
use crate::engine::SensorState;

/// Response for the /v1/ping endpoint
#[derive(Serialize)]
struct PingResponse {
    status: String,
}

/// Response for the /v1/info endpoint
#[derive(Serialize)]
struct InfoResponse {
    version: String,
    hostname: String,
}

/// A sensor as listed by the /v1/sensors endpoints
#[derive(Serialize)]
struct SensorResponse {
    entity_id: String,
    #[serde(flatten)]
    state: SensorState,
}

/// Body of every 4xx response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn not_found(message: String) -> Response {
    (StatusCode::NOT_FOUND, Json(ErrorResponse { error: message })).into_response()
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    version: &'static str,
    engine: Arc<Engine>,
}

/// Handler for GET /v1/ping
#[tracing::instrument]
async fn ping() -> impl IntoResponse {
    tracing::debug!("Handling /v1/ping request");
    (
        StatusCode::OK,
        Json(PingResponse {
            status: "ok".to_string(),
        }),
    )
}

/// Handler for GET /v1/info
#[tracing::instrument(skip(state))]
async fn info(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    tracing::debug!("Handling /v1/info request");

    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    (
        StatusCode::OK,
        Json(InfoResponse {
            version: state.version.to_string(),
            hostname,
        }),
    )
}

/// Handler for GET /v1/sensors
#[tracing::instrument(skip(state))]
async fn list_sensors(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.engine.state_snapshot();

    let mut sensors: Vec<SensorResponse> = snapshot
        .sensors
        .iter()
        .map(|(entity_id, sensor)| SensorResponse {
            entity_id: entity_id.clone(),
            state: sensor.clone(),
        })
        .collect();
    sensors.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));

    (StatusCode::OK, Json(sensors))
}

/// Handler for GET /v1/sensors/:entity_id
#[tracing::instrument(skip(state))]
async fn get_sensor(
    State(state): State<Arc<AppState>>,
    Path(entity_id): Path<String>,
) -> Response {
    let snapshot = state.engine.state_snapshot();
    match snapshot.sensors.get(&entity_id) {
        Some(sensor) => (
            StatusCode::OK,
            Json(SensorResponse {
                entity_id,
                state: sensor.clone(),
            }),
        )
            .into_response(),
        None => not_found(format!("Unknown sensor: {}", entity_id)),
    }
}

/// Handler for POST /v1/sensors/:entity_id/refresh
#[tracing::instrument(skip(state))]
async fn refresh_sensor(
    State(state): State<Arc<AppState>>,
    Path(entity_id): Path<String>,
) -> Response {
    match state.engine.refresh_sensor(entity_id) {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(e) => not_found(e.to_string()),
    }
}

/// Create the API router with all endpoints
fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/ping", get(ping))
        .route("/v1/info", get(info))
        .route("/v1/sensors", get(list_sensors))
        .route("/v1/sensors/:entity_id", get(get_sensor))
        .route("/v1/sensors/:entity_id/refresh", post(refresh_sensor))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP API server
///
/// This function will bind to the specified address and serve the API endpoints.
/// It will run until the provided shutdown signal is triggered.
///
/// # Arguments
/// * `listen` - The IP address to listen on (e.g., "127.0.0.1")
/// * `port` - The port to listen on (e.g., 8565)
/// * `engine` - Engine whose state is served
/// * `shutdown_rx` - A oneshot receiver that will trigger graceful shutdown
pub async fn serve(
    listen: String,
    port: u16,
    engine: Arc<Engine>,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let version = env!("CARGO_PKG_VERSION");

    let state = Arc::new(AppState { version, engine });
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", listen, port).parse()?;
    tracing::info!("Starting HTTP API server on {}", addr);

    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            tracing::info!("HTTP API server shutting down gracefully");
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::engine::DeviceInfo;
    use crate::engine::FromIntegrationMessage;
    use crate::engine::SensorValue;

    fn router_with_sensor() -> Router {
        let engine = Arc::new(Engine::new());
        engine.handle_event(FromIntegrationMessage::SensorStateChanged {
            entity_id: "sensor.garden_wind_rotation".to_string(),
            state: SensorState {
                name: "Garden Wind Rotation".to_string(),
                unique_id: "garden_wind_rotation".to_string(),
                friendly_name: "Garden Wind Rotation Wind Rotation".to_string(),
                value: Some(SensorValue::Integer(123)),
                native_value: Some(SensorValue::Integer(123)),
                unit_of_measurement: "°".to_string(),
                icon: "mdi:compass".to_string(),
                device_info: DeviceInfo::new(
                    "windgraf",
                    "garden_wind_rotation",
                    "Garden Wind Rotation",
                ),
            },
        });

        create_router(Arc::new(AppState {
            version: "test",
            engine,
        }))
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_ping() {
        let response = router_with_sensor()
            .oneshot(Request::get("/v1/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, serde_json::json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn test_list_sensors() {
        let response = router_with_sensor()
            .oneshot(Request::get("/v1/sensors").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json[0]["entity_id"], "sensor.garden_wind_rotation");
        assert_eq!(json[0]["value"], 123);
        assert_eq!(json[0]["unit_of_measurement"], "°");
        assert_eq!(json[0]["device_info"]["identifiers"][0][0], "windgraf");
    }

    #[tokio::test]
    async fn test_get_sensor() {
        let response = router_with_sensor()
            .oneshot(
                Request::get("/v1/sensors/sensor.garden_wind_rotation")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["icon"], "mdi:compass");
        assert_eq!(json["name"], "Garden Wind Rotation");
    }

    #[tokio::test]
    async fn test_get_unknown_sensor() {
        let response = router_with_sensor()
            .oneshot(
                Request::get("/v1/sensors/sensor.nowhere")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"error": "Unknown sensor: sensor.nowhere"})
        );
    }

    #[tokio::test]
    async fn test_refresh_unrouted_sensor() {
        let response = router_with_sensor()
            .oneshot(
                Request::post("/v1/sensors/sensor.garden_wind_rotation/refresh")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        // State exists but no integration claimed the entity
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
