use base64::{engine::general_purpose, Engine as _};
use mime::Mime;
use uuid::Uuid;

use crate::errors::IngestError;

pub const DEFAULT_MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// An accepted upload. `image_id` correlates the books produced from it and
/// is not a retrieval key: nothing is stored.
#[derive(Debug, Clone)]
pub struct ValidatedImage {
    pub image_id: Uuid,
    pub media_type: String,
    pub bytes: Vec<u8>,
    pub data_url: String,
}

#[derive(Debug, Clone)]
pub struct ImageIntake {
    allowed_media_types: Vec<String>,
    max_bytes: usize,
}

impl Default for ImageIntake {
    fn default() -> Self {
        Self::new(
            ["image/png", "image/jpeg", "image/jpg", "image/gif", "image/webp"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            DEFAULT_MAX_IMAGE_BYTES,
        )
    }
}

impl ImageIntake {
    pub fn new(allowed_media_types: Vec<String>, max_bytes: usize) -> Self {
        Self {
            allowed_media_types,
            max_bytes,
        }
    }

    /// Validates a `data:<media-type>;base64,<payload>` string.
    pub fn validate(&self, data_url: &str) -> Result<ValidatedImage, IngestError> {
        let data_url = data_url.trim();
        let rest = data_url
            .strip_prefix("data:")
            .ok_or_else(|| IngestError::InvalidFormat("missing data: prefix".to_string()))?;

        let (media_type, payload) = rest
            .split_once(";base64,")
            .ok_or_else(|| IngestError::InvalidFormat("not a base64 data URL".to_string()))?;

        let media_type = self.check_media_type(media_type)?;

        if payload.is_empty() {
            return Err(IngestError::InvalidFormat("empty image payload".to_string()));
        }

        // Reject obviously oversized payloads before paying for the decode.
        let estimated = payload.len() / 4 * 3;
        if estimated > self.max_bytes.saturating_add(3) {
            return Err(IngestError::PayloadTooLarge {
                size: estimated,
                limit: self.max_bytes,
            });
        }

        let bytes = general_purpose::STANDARD
            .decode(payload)
            .map_err(|e| IngestError::InvalidFormat(format!("invalid base64 payload: {}", e)))?;

        if bytes.len() >= self.max_bytes {
            return Err(IngestError::PayloadTooLarge {
                size: bytes.len(),
                limit: self.max_bytes,
            });
        }

        Ok(ValidatedImage {
            image_id: Uuid::new_v4(),
            media_type,
            bytes,
            data_url: data_url.to_string(),
        })
    }

    fn check_media_type(&self, raw: &str) -> Result<String, IngestError> {
        let parsed: Mime = raw
            .parse()
            .map_err(|_| IngestError::InvalidFormat(format!("malformed media type: {}", raw)))?;

        if parsed.type_() != mime::IMAGE {
            return Err(IngestError::InvalidFormat(format!("not an image media type: {}", raw)));
        }

        let essence = parsed.essence_str().to_ascii_lowercase();
        if !self.allowed_media_types.iter().any(|allowed| *allowed == essence) {
            return Err(IngestError::InvalidFormat(format!("unsupported media type: {}", essence)));
        }

        Ok(essence)
    }
}
