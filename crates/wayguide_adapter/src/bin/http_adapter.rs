#![forbid(unsafe_code)]

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use wayguide_adapter::{
    AdapterConfig, AdapterRuntime, ApiReply, LocationRequest, PlaceSearchRequest,
    RoutingModeRequest, StartRequest, ToggleRequest, VisionFrameRequest,
};

type Reply = (StatusCode, Json<Value>);

#[derive(Debug, Default, serde::Deserialize)]
struct SessionQuery {
    sid: Option<String>,
    after: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("WAYGUIDE_LOG").unwrap_or_else(|_| EnvFilter::new("wayguide=info")),
        )
        .init();

    let config = AdapterConfig::from_env();
    let addr: SocketAddr = config.bind.parse()?;
    let runtime = Arc::new(AdapterRuntime::from_config(&config)?);

    let runtime_for_sweep = runtime.clone();
    let sweep_interval_ms = config.cache_sweep_interval_ms;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(sweep_interval_ms));
        loop {
            ticker.tick().await;
            let rt = runtime_for_sweep.clone();
            if let Err(e) = tokio::task::spawn_blocking(move || rt.run_cache_sweep()).await {
                warn!(error = %e, "cache sweep failed");
            }
        }
    });

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/session/location", post(set_location))
        .route("/v1/session/start", post(start))
        .route("/v1/session/stop", post(stop))
        .route("/v1/session/advance", post(advance))
        .route("/v1/session/reroute", post(reroute))
        .route("/v1/session/routing-mode", post(routing_mode))
        .route("/v1/session/simulation", post(simulation))
        .route("/v1/session/status", get(status))
        .route("/v1/session/instruction", get(instruction))
        .route("/v1/session/unified-instruction", get(unified_instruction))
        .route("/v1/session/route", get(route))
        .route("/v1/session/announcements", get(announcements))
        .route("/v1/session/where-am-i", get(where_am_i))
        .route("/v1/session/vision/toggle", post(vision_toggle))
        .route("/v1/session/vision/frame", post(vision_frame))
        .route("/v1/session/vision/status", get(vision_status))
        .route("/v1/places/search", post(search_places))
        .with_state(runtime);

    info!(%addr, "wayguide_adapter_http listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "ctrl-c handler failed");
    }
    info!("shutting down");
}

fn client_id(headers: &HeaderMap, query: &SessionQuery) -> Option<String> {
    headers
        .get("x-client-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| query.sid.clone())
}

/// Session operations block on locks and outbound HTTP, so they run off the async workers.
async fn blocking<F>(runtime: Arc<AdapterRuntime>, op: F) -> Reply
where
    F: FnOnce(&AdapterRuntime) -> ApiReply + Send + 'static,
{
    let reply = match tokio::task::spawn_blocking(move || op(&runtime)).await {
        Ok(reply) => reply,
        Err(e) => {
            error!(error = %e, "session operation panicked");
            ApiReply::error(&wayguide_os::NavigationError::Internal(
                "session operation failed".to_string(),
            ))
        }
    };
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(reply.body))
}

async fn healthz(State(runtime): State<Arc<AdapterRuntime>>) -> Reply {
    blocking(runtime, |rt| rt.health()).await
}

async fn set_location(
    State(runtime): State<Arc<AdapterRuntime>>,
    headers: HeaderMap,
    Query(query): Query<SessionQuery>,
    Json(request): Json<LocationRequest>,
) -> Reply {
    let sid = client_id(&headers, &query);
    blocking(runtime, move |rt| rt.set_location(sid.as_deref(), request)).await
}

async fn start(
    State(runtime): State<Arc<AdapterRuntime>>,
    headers: HeaderMap,
    Query(query): Query<SessionQuery>,
    Json(request): Json<StartRequest>,
) -> Reply {
    let sid = client_id(&headers, &query);
    blocking(runtime, move |rt| rt.start(sid.as_deref(), request)).await
}

async fn stop(
    State(runtime): State<Arc<AdapterRuntime>>,
    headers: HeaderMap,
    Query(query): Query<SessionQuery>,
) -> Reply {
    let sid = client_id(&headers, &query);
    blocking(runtime, move |rt| rt.stop(sid.as_deref())).await
}

async fn advance(
    State(runtime): State<Arc<AdapterRuntime>>,
    headers: HeaderMap,
    Query(query): Query<SessionQuery>,
) -> Reply {
    let sid = client_id(&headers, &query);
    blocking(runtime, move |rt| rt.advance(sid.as_deref())).await
}

async fn reroute(
    State(runtime): State<Arc<AdapterRuntime>>,
    headers: HeaderMap,
    Query(query): Query<SessionQuery>,
) -> Reply {
    let sid = client_id(&headers, &query);
    blocking(runtime, move |rt| rt.reroute(sid.as_deref())).await
}

async fn routing_mode(
    State(runtime): State<Arc<AdapterRuntime>>,
    headers: HeaderMap,
    Query(query): Query<SessionQuery>,
    Json(request): Json<RoutingModeRequest>,
) -> Reply {
    let sid = client_id(&headers, &query);
    blocking(runtime, move |rt| rt.set_routing_mode(sid.as_deref(), request)).await
}

async fn simulation(
    State(runtime): State<Arc<AdapterRuntime>>,
    headers: HeaderMap,
    Query(query): Query<SessionQuery>,
    Json(request): Json<ToggleRequest>,
) -> Reply {
    let sid = client_id(&headers, &query);
    blocking(runtime, move |rt| rt.set_simulation(sid.as_deref(), request)).await
}

async fn status(
    State(runtime): State<Arc<AdapterRuntime>>,
    headers: HeaderMap,
    Query(query): Query<SessionQuery>,
) -> Reply {
    let sid = client_id(&headers, &query);
    blocking(runtime, move |rt| rt.status(sid.as_deref())).await
}

async fn instruction(
    State(runtime): State<Arc<AdapterRuntime>>,
    headers: HeaderMap,
    Query(query): Query<SessionQuery>,
) -> Reply {
    let sid = client_id(&headers, &query);
    blocking(runtime, move |rt| rt.instruction(sid.as_deref())).await
}

async fn unified_instruction(
    State(runtime): State<Arc<AdapterRuntime>>,
    headers: HeaderMap,
    Query(query): Query<SessionQuery>,
) -> Reply {
    let sid = client_id(&headers, &query);
    blocking(runtime, move |rt| rt.unified_instruction(sid.as_deref())).await
}

async fn route(
    State(runtime): State<Arc<AdapterRuntime>>,
    headers: HeaderMap,
    Query(query): Query<SessionQuery>,
) -> Reply {
    let sid = client_id(&headers, &query);
    blocking(runtime, move |rt| rt.route(sid.as_deref())).await
}

async fn announcements(
    State(runtime): State<Arc<AdapterRuntime>>,
    headers: HeaderMap,
    Query(query): Query<SessionQuery>,
) -> Reply {
    let sid = client_id(&headers, &query);
    let after = query.after.unwrap_or(0);
    blocking(runtime, move |rt| rt.announcements(sid.as_deref(), after)).await
}

async fn where_am_i(
    State(runtime): State<Arc<AdapterRuntime>>,
    headers: HeaderMap,
    Query(query): Query<SessionQuery>,
) -> Reply {
    let sid = client_id(&headers, &query);
    blocking(runtime, move |rt| rt.where_am_i(sid.as_deref())).await
}

async fn vision_toggle(
    State(runtime): State<Arc<AdapterRuntime>>,
    headers: HeaderMap,
    Query(query): Query<SessionQuery>,
    Json(request): Json<ToggleRequest>,
) -> Reply {
    let sid = client_id(&headers, &query);
    blocking(runtime, move |rt| rt.toggle_vision(sid.as_deref(), request)).await
}

async fn vision_frame(
    State(runtime): State<Arc<AdapterRuntime>>,
    headers: HeaderMap,
    Query(query): Query<SessionQuery>,
    Json(request): Json<VisionFrameRequest>,
) -> Reply {
    let sid = client_id(&headers, &query);
    blocking(runtime, move |rt| rt.vision_frame(sid.as_deref(), request)).await
}

async fn vision_status(
    State(runtime): State<Arc<AdapterRuntime>>,
    headers: HeaderMap,
    Query(query): Query<SessionQuery>,
) -> Reply {
    let sid = client_id(&headers, &query);
    blocking(runtime, move |rt| rt.vision_status(sid.as_deref())).await
}

async fn search_places(
    State(runtime): State<Arc<AdapterRuntime>>,
    headers: HeaderMap,
    Query(query): Query<SessionQuery>,
    Json(request): Json<PlaceSearchRequest>,
) -> Reply {
    let sid = client_id(&headers, &query);
    blocking(runtime, move |rt| rt.search_places(sid.as_deref(), request)).await
}
