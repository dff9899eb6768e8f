//! Route table
//!
//! Built once at startup from the server configuration and shared state.

use super::{handlers, rejection, AppState};
use crate::config::ServerConfig;
use uuid::Uuid;
use warp::multipart::FormData;
use warp::{Filter, Rejection, Reply};

/// Front-end page served at `/`
pub const INDEX_HTML: &str = include_str!("../../templates/index.html");

/// All routes with CORS, error mapping and request tracing applied
pub fn routes(
    state: AppState,
    config: &ServerConfig,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let limit = config.max_body_bytes;

    let index = warp::path::end()
        .and(warp::get())
        .map(|| warp::reply::html(INDEX_HTML));

    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and_then(handlers::health);

    let remove_background = warp::path("remove-background")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::content_length_limit(limit))
        .and(
            // Non-multipart bodies fall through as `None` and get a 400 from the handler
            warp::multipart::form()
                .max_length(limit)
                .map(Some)
                .or(warp::any().map(|| None::<FormData>))
                .unify(),
        )
        .and(with_state(state))
        .and_then(handlers::remove_background);

    let composite_image = warp::path("composite-image")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::content_length_limit(limit))
        .and(warp::body::json())
        .and_then(handlers::composite_image);

    let static_files = warp::path("static").and(warp::fs::dir(config.static_dir.clone()));

    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "POST", "OPTIONS"])
        .allow_headers(vec!["Content-Type"]);

    index
        .or(health)
        .or(remove_background)
        .or(composite_image)
        .or(static_files)
        .recover(rejection::handle_rejection)
        .with(cors)
        .with(warp::trace(|info| {
            tracing::info_span!(
                "http_request",
                method = %info.method(),
                path = %info.path(),
                request_id = %Uuid::new_v4(),
            )
        }))
}

fn with_state(
    state: AppState,
) -> impl Filter<Extract = (AppState,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || state.clone())
}
