//! The HTTP tile server: one catch-all route that answers tile requests,
//! glyph lookups and static frontend files, with permissive CORS.

use anyhow::Result;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tilery_core::{parse_tile_url, Tile};
use tilery_storage::db::{PackHandle, TileDatabase};
use tilery_storage::render::{get_tile, PerfCounter, RenderCtx};
use tower_http::cors::{Any, CorsLayer};

pub struct ServerState {
	pub db: TileDatabase,
	pub pack: PackHandle,
	pub ctx: RenderCtx,
	pub res_dir: Option<PathBuf>,
}

pub async fn run_server(state: Arc<ServerState>, port: u16) -> Result<()> {
	let cors = CorsLayer::new()
		.allow_origin(Any)
		.allow_methods([
			Method::GET,
			Method::POST,
			Method::PUT,
			Method::DELETE,
			Method::OPTIONS,
			Method::HEAD,
		])
		.allow_headers(Any);

	let app = Router::new()
		.fallback(get(handle_request))
		.layer(cors)
		.with_state(state);

	let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
	log::info!("tilery server up and running on port {port}");
	axum::serve(listener, app).await?;
	Ok(())
}

async fn handle_request(
	State(state): State<Arc<ServerState>>,
	uri: Uri,
	headers: HeaderMap,
) -> Response {
	let path = uri.path().to_string();
	log::debug!("request: {path}");

	match parse_tile_url(&path) {
		Some(tile) => serve_tile(state, tile, &headers).await,
		None => serve_static(&state, &path).await,
	}
}

async fn serve_tile(state: Arc<ServerState>, tile: Tile, headers: &HeaderMap) -> Response {
	let accepts_deflate = headers
		.get(header::ACCEPT_ENCODING)
		.and_then(|value| value.to_str().ok())
		.is_some_and(|value| value.contains("deflate"));
	if !accepts_deflate {
		return (StatusCode::NOT_IMPLEMENTED, "deflate encoding required").into_response();
	}

	let rendered = tokio::task::spawn_blocking(move || {
		let mut pc = PerfCounter::new();
		let result = get_tile(&state.db, &state.pack, &state.ctx, tile, &mut pc);
		pc.report();
		result
	})
	.await;

	match rendered {
		Ok(Ok(Some(blob))) => (
			StatusCode::OK,
			[
				(header::CONTENT_TYPE, "application/vnd.mapbox-vector-tile"),
				(header::CONTENT_ENCODING, "deflate"),
			],
			blob.into_vec(),
		)
			.into_response(),
		Ok(Ok(None)) => StatusCode::NO_CONTENT.into_response(),
		Ok(Err(error)) => {
			log::error!("failed to render {tile}: {error:#}");
			StatusCode::INTERNAL_SERVER_ERROR.into_response()
		}
		Err(error) => {
			log::error!("render task for {tile} died: {error}");
			StatusCode::INTERNAL_SERVER_ERROR.into_response()
		}
	}
}

async fn serve_static(state: &ServerState, path: &str) -> Response {
	let Some(res_dir) = &state.res_dir else {
		return StatusCode::NOT_FOUND.into_response();
	};
	let Some(relative) = sanitize_path(path) else {
		return StatusCode::NOT_FOUND.into_response();
	};

	let mut target = res_dir.join(relative);
	if target.is_dir() {
		target = target.join("index.html");
	}

	match tokio::fs::read(&target).await {
		Ok(content) => {
			let mime = mime_guess::from_path(&target).first_or_octet_stream();
			Response::builder()
				.status(StatusCode::OK)
				.header(header::CONTENT_TYPE, mime.as_ref())
				.body(Body::from(content))
				.unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
		}
		Err(_) => StatusCode::NOT_FOUND.into_response(),
	}
}

/// Strips the leading slash and rejects traversal segments.
fn sanitize_path(path: &str) -> Option<PathBuf> {
	let trimmed = path.trim_start_matches('/');
	if trimmed.is_empty() {
		return Some(PathBuf::from("index.html"));
	}
	let relative = Path::new(trimmed);
	let clean = relative
		.components()
		.all(|part| matches!(part, std::path::Component::Normal(_)));
	clean.then(|| relative.to_path_buf())
}
