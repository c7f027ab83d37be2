//! Request filters and error translation

use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::{debug, error, warn};

use super::AppState;
use crate::Error;
use crate::authentication::RequestAuthenticator;

/// Authentication filter
///
/// Runs the authenticator chain and stores the resulting
/// [`crate::Identity`] in the request extensions. Requests no authenticator
/// claims are rejected with 401.
pub async fn authenticate(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    match state.authenticator.authenticate_request(request.headers()).await {
        Ok(Some(identity)) => {
            debug!(user = %identity.name, path = %request.uri().path(), "Authenticated request");
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Ok(None) => {
            warn!(path = %request.uri().path(), "No authenticator accepted the request");
            unauthorized_response("Unauthorized")
        }
        Err(e) => e.into_response(),
    }
}

fn unauthorized_response(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Bearer")],
        Json(json!({
            "code": StatusCode::UNAUTHORIZED.as_u16(),
            "message": message,
        })),
    )
        .into_response()
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let message = self.to_string();

        if status.is_server_error() {
            error!(status = status.as_u16(), error = %message, "Request failed");
        } else {
            debug!(status = status.as_u16(), error = %message, "Request rejected");
        }

        if status == StatusCode::UNAUTHORIZED {
            return unauthorized_response(&message);
        }

        (
            status,
            Json(json!({
                "code": status.as_u16(),
                "message": message,
            })),
        )
            .into_response()
    }
}
