pub(crate) use crate::error::GatewayError;
pub(crate) use crate::web::AppState;
pub(crate) use axum::Json;
pub(crate) use serde::Deserialize;
