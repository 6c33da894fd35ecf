// HTTP Server Module - Remote control endpoints
use anyhow::Result;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use rand::Rng;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};

use crate::device::{device_is_on, DeviceState};
use crate::engine::EngineHandle;
use crate::midi::{parse_midi_message, to_cmd, to_val, CMD_NOTE_OFF, CMD_NOTE_ON, NOTE_A0, NOTE_C8};

const BRIGHTNESS_DEMO: [u8; 4] = [20, 60, 120, 200];
const DEMO_STEP: Duration = Duration::from_millis(500);

#[derive(Clone)]
pub struct AppState {
    pub engine: EngineHandle,
    pub device: Arc<dyn DeviceState>,
}

fn engine_down(e: anyhow::Error) -> Response {
    warn!("{}", e);
    (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response()
}

async fn power_on(State(app): State<AppState>) -> Response {
    match app.engine.power(true).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => engine_down(e),
    }
}

async fn power_off(State(app): State<AppState>) -> Response {
    match app.engine.power(false).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => engine_down(e),
    }
}

// Read-only, asks the device directly
async fn get_power(State(app): State<AppState>) -> impl IntoResponse {
    Json(device_is_on(app.device.as_ref()).await)
}

async fn brightness_demo(State(app): State<AppState>) -> Response {
    for (i, level) in BRIGHTNESS_DEMO.into_iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(DEMO_STEP).await;
        }
        if let Err(e) = app.engine.set_brightness(level).await {
            return engine_down(e);
        }
    }
    StatusCode::OK.into_response()
}

/// Play a random key for half a second
async fn emit_random_note(State(app): State<AppState>) -> Response {
    let note = rand::thread_rng().gen_range(NOTE_A0..NOTE_C8);
    debug!("emitting random note {}", note);

    let frames = [
        vec![to_cmd(CMD_NOTE_ON), note, to_val(0.5)],
        vec![to_cmd(CMD_NOTE_OFF), note],
    ];
    for (i, frame) in frames.iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(DEMO_STEP).await;
        }
        let Some(event) = parse_midi_message(frame) else {
            continue;
        };
        if let Err(e) = app.engine.midi(event).await {
            return engine_down(e);
        }
    }
    Json(note).into_response()
}

async fn get_state(State(app): State<AppState>) -> Response {
    match app.engine.snapshot().await {
        Ok(state) => Json(state).into_response(),
        Err(e) => engine_down(e),
    }
}

// HTTP access logging middleware
async fn logging_middleware(ConnectInfo(addr): ConnectInfo<SocketAddr>, req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let response = next.run(req).await;
    debug!("{} {} {} -> {}", addr, method, uri, response.status());
    response
}

pub fn router(app: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/wled/on", get(power_on))
        .route("/wled/off", get(power_off))
        .route("/wled/get/on", get(get_power))
        .route("/wled/set/bri", get(brightness_demo))
        .route("/emitrandomnote", get(emit_random_note))
        .route("/api/state", get(get_state))
        .layer(middleware::from_fn(logging_middleware))
        .layer(cors)
        .with_state(app)
}

pub async fn run_http_server(ip: String, port: u16, app: AppState) -> Result<()> {
    let addr = format!("{}:{}", ip, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("HTTP server listening on http://{}", addr);

    axum::serve(
        listener,
        router(app).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
