//! Public configuration page for front-end identification and customization.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::config::{Auth, Configuration};

/// Structured configuration.
#[derive(Debug, Serialize, Deserialize)]
pub struct Status {
    name: String,
    url: String,
    portal_url: String,
    favicon: Option<String>,
    version: String,
    /// Authentication methods accepted.
    auth: Auth,
}

/// Public server status (configuration).
pub async fn status(State(config): State<Arc<Configuration>>) -> Json<Status> {
    Json(Status {
        name: config.name.clone(),
        url: config.url.clone(),
        portal_url: config.portal_url.clone(),
        favicon: config.favicon().map(ToOwned::to_owned),
        version: config.version().to_owned(),
        auth: config.auth.clone(),
    })
}
