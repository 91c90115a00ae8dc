use serde::{Deserialize, Serialize};

use crate::constants::PENDING_MESSAGE;

/// The JSON body every API route answers with.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ResultEnvelope {
    /// True only when an image was stored.
    pub success: bool,
    /// Public URL of the stored image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Why it failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Informational, used for pending results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ResultEnvelope {
    /// `{success: true, file}`
    pub fn stored(file: impl Into<String>) -> Self {
        Self {
            success: true,
            file: Some(file.into()),
            ..Default::default()
        }
    }

    /// `{success: false, error}`
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// `{success: false, message}` for a result that isn't ready yet.
    pub fn pending() -> Self {
        Self {
            message: Some(PENDING_MESSAGE.to_string()),
            ..Default::default()
        }
    }
}
