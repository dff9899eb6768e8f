//! Request handlers
//!
//! Handlers only parse and validate the wire format; decoding, inference,
//! compositing and encoding run on the blocking pool.

use super::api::{CompositeImageRequest, HealthResponse, ImageResponse, IMAGE_FIELD};
use super::rejection::reject;
use super::AppState;
use crate::error::{BgCompositeError, Result};
use crate::services::ImageCodec;
use bytes::BufMut;
use futures_util::TryStreamExt;
use tracing::{debug, info};
use warp::multipart::{FormData, Part};
use warp::{Rejection, Reply};

/// `GET /health`
pub async fn health() -> std::result::Result<impl Reply, Rejection> {
    Ok(warp::reply::json(&HealthResponse::healthy()))
}

/// `POST /remove-background`
///
/// `form` is `None` when the request was not multipart at all.
pub async fn remove_background(
    form: Option<FormData>,
    state: AppState,
) -> std::result::Result<impl Reply, Rejection> {
    let upload = match form {
        Some(form) => read_image_field(form).await.map_err(reject)?,
        None => None,
    };
    let upload = upload
        .filter(|bytes| !bytes.is_empty())
        .ok_or_else(|| reject(BgCompositeError::invalid_request("No image provided")))?;

    debug!(bytes = upload.len(), "Received image for background removal");
    let remover = state.remover.clone();

    let data_url = run_blocking(move || {
        let image = ImageCodec::decode_bytes(&upload)?;
        let cut_out = remover.remove(&image)?;
        ImageCodec::rgba_to_data_url(&cut_out)
    })
    .await
    .map_err(reject)?;

    info!("Background removed");
    Ok(warp::reply::json(&ImageResponse::new(data_url)))
}

/// `POST /composite-image`
pub async fn composite_image(
    request: CompositeImageRequest,
) -> std::result::Result<impl Reply, Rejection> {
    let (person, background) = request.into_parts().map_err(reject)?;

    let data_url = run_blocking(move || crate::composite_data_urls(&person, &background))
        .await
        .map_err(reject)?;

    info!("Composite image created");
    Ok(warp::reply::json(&ImageResponse::new(data_url)))
}

/// Collect the bytes of the `image` field, skipping every other part
async fn read_image_field(form: FormData) -> Result<Option<Vec<u8>>> {
    let mut parts = std::pin::pin!(form);
    while let Some(part) = parts
        .try_next()
        .await
        .map_err(|e| BgCompositeError::invalid_request(format!("Malformed multipart body: {e}")))?
    {
        if part.name() == IMAGE_FIELD {
            return read_part(part).await.map(Some);
        }
    }
    Ok(None)
}

async fn read_part(part: Part) -> Result<Vec<u8>> {
    part.stream()
        .try_fold(Vec::new(), |mut data, buf| async move {
            data.put(buf);
            Ok(data)
        })
        .await
        .map_err(|e| BgCompositeError::invalid_request(format!("Failed to read upload: {e}")))
}

/// Run CPU-bound work on the blocking pool
async fn run_blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| BgCompositeError::internal(format!("Worker task failed: {e}")))?
}
