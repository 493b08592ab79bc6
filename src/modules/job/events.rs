use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};

use crate::modules::video::model::Video;

/// Inbound encode request. Unknown fields are tolerated; missing fields
/// deserialize to empty strings and are caught by `validate` so that a
/// structurally-valid body with missing data reports a validation failure,
/// not a parse failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct EncodeRequest {
    #[serde(default)]
    pub resource_id: String,
    #[serde(default)]
    pub file_path: String,
}

impl EncodeRequest {
    /// Two-step parse: the body must be well-formed JSON, then a JSON object
    /// with the expected shape.
    pub fn parse(body: &[u8]) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_slice(body).map_err(|e| anyhow!("message is not valid JSON: {}", e))?;

        serde_json::from_value(value).map_err(|e| anyhow!("malformed encode request: {}", e))
    }

    pub fn validate(&self) -> Result<()> {
        if self.resource_id.is_empty() {
            bail!("resource_id must not be empty");
        }
        if self.file_path.is_empty() {
            bail!("file_path must not be empty");
        }
        Ok(())
    }

    /// Materialize the request as a fresh Video with a new id.
    pub fn into_video(self) -> Video {
        Video::new(self.resource_id, self.file_path)
    }
}

/// Error notification published when a delivery cannot be processed.
#[derive(Debug, Serialize, Deserialize)]
pub struct JobNotificationError {
    pub message: String,
    pub error: String,
}
