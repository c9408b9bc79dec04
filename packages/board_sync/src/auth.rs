//! Admission checks for board connections.
//!
//! A caller presents a bearer credential, either as `?token=` (browsers
//! cannot set headers on a WebSocket handshake) or as an
//! `Authorization: Bearer` header. Admission resolves the identity, checks
//! the board exists and checks membership, in that order.

use axum::{
    Json,
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use crate::AppState;
use crate::models::Identity;
use crate::store::RoomObjects;

// =============================================================================
// Auth Errors
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing or invalid credential")]
    Unauthorized,

    #[error("board {0} not found")]
    BoardNotFound(String),

    #[error("no access to board {0}")]
    Forbidden(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match &self {
            AuthError::Unauthorized => StatusCode::UNAUTHORIZED,
            AuthError::BoardNotFound(_) => StatusCode::NOT_FOUND,
            AuthError::Forbidden(_) => StatusCode::FORBIDDEN,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

// =============================================================================
// Credential extraction
// =============================================================================

/// Query parameters accepted on board routes.
#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    #[serde(default)]
    pub token: Option<String>,
}

/// Pick the credential from the query string, falling back to the
/// `Authorization: Bearer` header.
pub fn credential_from(query: &TokenQuery, headers: &HeaderMap) -> Option<String> {
    if let Some(token) = query.token.as_deref().filter(|t| !t.is_empty()) {
        return Some(token.to_string());
    }
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if scheme != "Bearer" || token.is_empty() {
        return None;
    }
    Some(token.to_string())
}

// =============================================================================
// Admission
// =============================================================================

/// A caller that passed every check for a board, with the board's store
/// partition ready to use.
#[derive(Debug, Clone)]
pub struct Admission {
    pub identity: Identity,
    pub board_id: String,
    pub objects: Arc<RoomObjects>,
}

/// Resolve the caller and gate entry to `board_id`.
///
/// On success the board's store partition exists, seeded from the
/// directory's snapshot if this is its first reference.
pub async fn admit(
    state: &AppState,
    board_id: &str,
    credential: Option<&str>,
) -> Result<Admission, AuthError> {
    let result = check(state, board_id, credential).await;
    if let Err(ref e) = result {
        state.metrics.connection_rejected();
        debug!(board = %board_id, "Admission refused: {}", e);
    }
    result
}

async fn check(
    state: &AppState,
    board_id: &str,
    credential: Option<&str>,
) -> Result<Admission, AuthError> {
    let credential = credential.ok_or(AuthError::Unauthorized)?;
    let identity = state
        .identity
        .resolve(credential)
        .await
        .ok_or(AuthError::Unauthorized)?;

    // A live partition proves the board existed when it was first seeded
    let live = state.store.partition(board_id).await;
    let snapshot = match live {
        Some(_) => Vec::new(),
        None => state
            .boards
            .snapshot(board_id)
            .await
            .ok_or_else(|| AuthError::BoardNotFound(board_id.to_string()))?,
    };

    if !state.boards.has_access(board_id, identity.user_id).await {
        return Err(AuthError::Forbidden(board_id.to_string()));
    }

    let objects = match live {
        Some(partition) => partition,
        None => state.store.ensure_partition(board_id, snapshot).await,
    };

    Ok(Admission {
        identity,
        board_id: board_id.to_string(),
        objects,
    })
}
