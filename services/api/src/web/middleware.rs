//! services/api/src/web/middleware.rs
//!
//! Identity middleware for the workspace routes.

use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

/// The header the fronting identity layer sets for every signed-in request.
pub const USER_HEADER: &str = "x-user-id";

/// The caller's id, inserted into request extensions by `require_user`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserId(pub Uuid);

/// Middleware that reads the `x-user-id` header and extracts the user's id.
///
/// If valid, inserts a `UserId` into request extensions for handlers to use.
/// If invalid or missing, returns 401 Unauthorized.
pub async fn require_user(mut req: Request, next: Next) -> Response {
    let user_id = req
        .headers()
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v.trim()).ok());

    let Some(user_id) = user_id else {
        debug!(path = %req.uri().path(), "rejected request without a valid user id");
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": format!("a valid {USER_HEADER} header is required") })),
        )
            .into_response();
    };

    req.extensions_mut().insert(UserId(user_id));
    next.run(req).await
}
