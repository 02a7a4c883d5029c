//! HTTP front that answers app requests through the cache manager.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{StatusCode, Uri, header};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::get;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use crate::cache::{CacheManager, CachedResponse, ShareResponse, SharedFile};
use crate::config::ServerConfig;

#[derive(Clone)]
struct AppState {
    cache: Arc<CacheManager>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    cache: String,
}

async fn api_health(State(state): State<AppState>) -> impl IntoResponse {
    axum::Json(HealthResponse {
        status: "ok".to_string(),
        cache: state.cache.version().to_string(),
    })
}

fn cache_key(uri: &Uri) -> String {
    uri.path_and_query()
        .map_or_else(|| uri.path().to_string(), ToString::to_string)
}

fn into_response(cached: CachedResponse) -> Response {
    let status = StatusCode::from_u16(cached.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut response = (status, cached.body).into_response();
    if let Some(content_type) = cached
        .content_type
        .and_then(|ct| header::HeaderValue::from_str(&ct).ok())
    {
        response.headers_mut().insert(header::CONTENT_TYPE, content_type);
    }
    response
}

async fn serve_get(State(state): State<AppState>, uri: Uri) -> Response {
    let key = cache_key(&uri);
    let cached = if state.cache.is_controlling() {
        state.cache.handle_get(&key).await
    } else {
        state.cache.fetch_uncontrolled(&key).await
    };
    into_response(cached)
}

/// Pulls the `file` field out of a multipart body, if there is one.
///
/// A body that cannot be read, including one over the size limit, is an
/// error rather than a form without a file.
async fn shared_file(mut multipart: Multipart) -> Result<Option<SharedFile>, MultipartError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or("shared").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field.bytes().await?;
        return Ok(Some(SharedFile {
            file_name,
            content_type,
            bytes: bytes.to_vec(),
        }));
    }
    Ok(None)
}

async fn serve_share(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let file = match multipart {
        Ok(multipart) => match shared_file(multipart).await {
            Ok(file) => file,
            Err(e) => {
                log::error!("Failed reading share form: {e}");
                return (e.status(), e.body_text()).into_response();
            }
        },
        Err(e) => {
            log::warn!("Share request is not a form: {e}");
            None
        }
    };

    match state.cache.handle_share(file.as_ref()) {
        ShareResponse::Page(html) => Html(html).into_response(),
        ShareResponse::Redirect(location) => Redirect::to(&location).into_response(),
    }
}

/// Builds the router: health check, GET through the cache, POST as share.
/// Request bodies may be up to `max_share_bytes` long.
pub fn router(cache: Arc<CacheManager>, max_share_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(api_health))
        .route("/", get(serve_get).post(serve_share))
        .route("/{*path}", get(serve_get).post(serve_share))
        .layer(DefaultBodyLimit::max(max_share_bytes))
        .layer(cors)
        .with_state(AppState { cache })
}

/// Starts the HTTP front.
///
/// # Errors
///
/// Returns an error if the server cannot bind to the specified address.
pub async fn run_server(
    cache: Arc<CacheManager>,
    config: &ServerConfig,
) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("Serving on {addr} with cache {}", cache.version());
    axum::serve(listener, router(cache, config.max_share_bytes)).await?;
    Ok(())
}
