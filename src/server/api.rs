//! Wire types for the HTTP API

use crate::error::{BgCompositeError, Result};
use serde::{Deserialize, Serialize};

/// Multipart field carrying the upload for `/remove-background`
pub const IMAGE_FIELD: &str = "image";

/// Body of `POST /composite-image`
///
/// Both fields are optional at the parsing stage so a missing field is
/// reported as a client error rather than a deserialisation failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeImageRequest {
    /// Cut-out subject as a data URL
    pub person_image: Option<String>,
    /// Background as a data URL
    pub background_image: Option<String>,
}

impl CompositeImageRequest {
    /// Split into `(person, background)` data URLs, rejecting missing or empty fields
    ///
    /// # Errors
    /// `InvalidRequest` naming the first missing field
    pub fn into_parts(self) -> Result<(String, String)> {
        let person = non_empty(self.person_image)
            .ok_or_else(|| BgCompositeError::invalid_request("No person image provided"))?;
        let background = non_empty(self.background_image)
            .ok_or_else(|| BgCompositeError::invalid_request("No background image provided"))?;
        Ok((person, background))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Successful image response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageResponse {
    pub success: bool,
    /// PNG data URL
    pub image: String,
}

impl ImageResponse {
    #[must_use]
    pub fn new(image: String) -> Self {
        Self {
            success: true,
            image,
        }
    }
}

/// Error envelope for every failed request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

impl HealthResponse {
    #[must_use]
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
        }
    }
}
