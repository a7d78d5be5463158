//! Origin heartbeats and viewer-facing stream endpoints
//!
//! - `POST /heartbeat`                 - origin reports a stream and its newest fragment
//! - `GET  /streams`                   - live streams
//! - `GET  /streams/{name}/{fragment}` - playlist passthrough or cached segment

use axum::{
    extract::{ConnectInfo, Path, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use streamedge_core::{FragmentKind, LiveStream};
use tracing::debug;

use super::{ApiResponse, AppError, AppResult, AppState};

const PLAYLIST_CACHE_CONTROL: &str = "no-cache";
const SEGMENT_CACHE_CONTROL: &str = "public, max-age=90";

pub fn create_stream_router() -> Router<AppState> {
    Router::new()
        .route("/heartbeat", post(heartbeat))
        .route("/streams", get(list_streams))
        .route("/streams/{name}/{fragment}", get(get_fragment))
}

#[derive(Debug, Deserialize)]
pub struct HeartbeatRequest {
    pub name: String,
    pub fragment: String,
    /// Base URL the edge should fetch from; defaults to `http://{peer ip}`
    #[serde(default)]
    pub origin_url: Option<String>,
}

pub async fn heartbeat(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Json(req): Json<HeartbeatRequest>,
) -> AppResult<Json<ApiResponse<&'static str>>> {
    if req.name.trim().is_empty() || req.fragment.trim().is_empty() {
        return Err(AppError::bad_request("name and fragment are required"));
    }

    let origin_url = req
        .origin_url
        .filter(|url| !url.trim().is_empty())
        .unwrap_or_else(|| format!("http://{}", peer.ip()));

    debug!(stream = %req.name, origin = %origin_url, fragment = %req.fragment, "Heartbeat");
    state.edge.heartbeat(&req.name, &origin_url, &req.fragment);

    Ok(Json(ApiResponse::ok("Ok")))
}

pub async fn list_streams(State(state): State<AppState>) -> Json<ApiResponse<Vec<LiveStream>>> {
    Json(ApiResponse::ok(state.edge.list_live_streams()))
}

pub async fn get_fragment(
    State(state): State<AppState>,
    Path((name, fragment)): Path<(String, String)>,
) -> AppResult<Response> {
    let kind = FragmentKind::of(&fragment);
    let (bytes, cache_control) = match kind {
        FragmentKind::Playlist => (
            state.edge.fetch_playlist(&name, &fragment).await?,
            PLAYLIST_CACHE_CONTROL,
        ),
        FragmentKind::Segment => (
            state.edge.fetch_segment(&name, &fragment).await?,
            SEGMENT_CACHE_CONTROL,
        ),
        FragmentKind::Unknown => {
            return Err(AppError::bad_request(format!(
                "Unsupported fragment type: {fragment}"
            )));
        }
    };

    Ok((
        [
            (header::CONTENT_TYPE, kind.content_type()),
            (header::CACHE_CONTROL, cache_control),
        ],
        bytes,
    )
        .into_response())
}
