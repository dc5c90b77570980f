//! Web server
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/` | Guestbook page |
//! | `GET` | `/static/*path` | Page assets |
//! | `POST` | `/api/visitors` | Sign the guestbook with `{"name": ...}` |
//! | `GET` | `/api/visitors` | JSON array of visitor names |
//!
//! Database calls are blocking and run on tokio's blocking pool.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tracing::{info, warn};

use guestbook_core::{Config, Guestbook, Visitor};

use crate::output::Output;

const INDEX_HTML: &str = include_str!("../../static/index.html");
const APP_JS: &str = include_str!("../../static/app.js");
const STYLE_CSS: &str = include_str!("../../static/style.css");

/// State shared across all handlers
#[derive(Clone, Default)]
pub struct AppState {
    /// `None` when no database is configured
    pub guestbook: Option<Arc<Guestbook>>,
}

/// Error response body
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(status: StatusCode, msg: impl Into<String>) -> Response {
    (status, Json(ErrorResponse { error: msg.into() })).into_response()
}

/// Creates the guestbook router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/static/*path", get(static_asset))
        .route("/api/visitors", get(list_visitors).post(add_visitor))
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn static_asset(Path(path): Path<String>) -> Response {
    let (content_type, body) = match path.as_str() {
        "index.html" => ("text/html; charset=utf-8", INDEX_HTML),
        "app.js" => ("text/javascript; charset=utf-8", APP_JS),
        "style.css" => ("text/css; charset=utf-8", STYLE_CSS),
        _ => return StatusCode::NOT_FOUND.into_response(),
    };
    ([(header::CONTENT_TYPE, content_type)], body).into_response()
}

/// `POST /api/visitors`: store the visitor and greet them
async fn add_visitor(State(state): State<AppState>, body: Bytes) -> Response {
    let visitor: Visitor = match serde_json::from_slice(&body) {
        Ok(visitor) => visitor,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, format!("invalid visitor: {}", e)),
    };
    let Some(guestbook) = state.guestbook else {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "database is not configured",
        );
    };

    let result = tokio::task::spawn_blocking(move || guestbook.record_visitor(&visitor.name)).await;
    match result {
        Ok(Ok(greeting)) => greeting.into_response(),
        Ok(Err(e)) => {
            warn!(error = %e, "failed to record visitor");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "unable to store visitor")
        }
        Err(e) => {
            warn!(error = %e, "visitor task failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "unable to store visitor")
        }
    }
}

/// `GET /api/visitors`: names of all visitors
async fn list_visitors(State(state): State<AppState>) -> Response {
    let Some(guestbook) = state.guestbook else {
        return Json(Vec::<String>::new()).into_response();
    };

    let result = tokio::task::spawn_blocking(move || guestbook.visitors()).await;
    match result {
        Ok(Ok(names)) => Json(names).into_response(),
        Ok(Err(e)) => {
            warn!(error = %e, "failed to fetch visitors");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "unable to fetch docs")
        }
        Err(e) => {
            warn!(error = %e, "visitor task failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "unable to fetch docs")
        }
    }
}

/// Connect to the database, if configured. A database that can't be
/// created is still used; requests against it fail until it's reachable.
fn open_guestbook(config: &Config) -> Result<Option<Arc<Guestbook>>> {
    let Some(client) = config.database_client()? else {
        warn!("no database configured, visitors will not be stored");
        return Ok(None);
    };

    let guestbook = match Guestbook::open(&client, &config.db_name) {
        Ok(guestbook) => guestbook,
        Err(e) => {
            warn!(error = %e, db = %config.db_name, "can't prepare database");
            Guestbook::new(client.db(&config.db_name))
        }
    };
    Ok(Some(Arc::new(guestbook)))
}

/// Run the web server until Ctrl-C
pub fn run(config: &Config, port: Option<u16>, output: &Output) -> Result<()> {
    // Blocking HTTP clients must be created and dropped outside the runtime
    let guestbook = open_guestbook(config)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let addr = SocketAddr::from(([0, 0, 0, 0], port.unwrap_or(config.port)));
    let state = AppState {
        guestbook: guestbook.clone(),
    };
    let result = runtime.block_on(serve(addr, state, output));

    drop(runtime);
    drop(guestbook);
    result
}

async fn serve(addr: SocketAddr, state: AppState, output: &Output) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    let local = listener.local_addr().context("Failed to read bound address")?;

    info!(%local, "guestbook listening");
    output.message(&format!("Listening on http://{}", local));

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("Server error")?;

    info!("guestbook stopped");
    Ok(())
}
