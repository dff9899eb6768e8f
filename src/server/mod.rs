//! HTTP server
//!
//! | Route | Method | Body |
//! |---|---|---|
//! | `/` | GET | front-end page |
//! | `/health` | GET | `{"status": "healthy"}` |
//! | `/remove-background` | POST | multipart field `image` |
//! | `/composite-image` | POST | JSON `{"personImage", "backgroundImage"}` |
//! | `/static/*` | GET | files from the static directory |

pub mod api;
pub mod handlers;
pub mod rejection;
pub mod routes;

use crate::config::ServerConfig;
use crate::error::{BgCompositeError, Result};
use crate::removal::BackgroundRemover;
use std::future::Future;
use std::sync::Arc;
use tracing::info;

pub use routes::routes;

/// State shared by every request
#[derive(Clone)]
pub struct AppState {
    pub remover: Arc<dyn BackgroundRemover>,
}

impl AppState {
    #[must_use]
    pub fn new(remover: Arc<dyn BackgroundRemover>) -> Self {
        Self { remover }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("remover", &self.remover.name())
            .finish()
    }
}

/// Bind and serve until `shutdown` resolves
///
/// # Errors
/// - Invalid configuration
/// - The address could not be bound
pub async fn serve<S>(config: ServerConfig, state: AppState, shutdown: S) -> Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    config.validate()?;
    let addr = config.socket_addr()?;
    let remover_name = state.remover.name();

    let (bound, server) = warp::serve(routes(state, &config))
        .try_bind_with_graceful_shutdown(addr, shutdown)
        .map_err(|e| BgCompositeError::network_error(format!("Failed to bind {}", addr), e))?;

    info!(
        address = %bound,
        remover = %remover_name,
        static_dir = %config.static_dir.display(),
        max_body_bytes = config.max_body_bytes,
        "Server listening"
    );
    server.await;
    info!("Server stopped");
    Ok(())
}
