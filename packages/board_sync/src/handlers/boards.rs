use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};

use crate::AppState;
use crate::auth::{self, AuthError, TokenQuery};
use crate::models::SharedObject;

/// Current objects on a board, for clients resynchronizing after a reconnect.
pub async fn board_objects_handler(
    State(state): State<AppState>,
    Path(board_id): Path<String>,
    Query(query): Query<TokenQuery>,
    headers: HeaderMap,
) -> Result<Json<Vec<SharedObject>>, AuthError> {
    let credential = auth::credential_from(&query, &headers);
    let admission = auth::admit(&state, &board_id, credential.as_deref()).await?;
    Ok(Json(admission.objects.list().await))
}

/// One object with its current lock, or 404 when the board has no such id.
pub async fn board_object_handler(
    State(state): State<AppState>,
    Path((board_id, object_id)): Path<(String, String)>,
    Query(query): Query<TokenQuery>,
    headers: HeaderMap,
) -> Result<Response, AuthError> {
    let credential = auth::credential_from(&query, &headers);
    let admission = auth::admit(&state, &board_id, credential.as_deref()).await?;
    Ok(match admission.objects.get(&object_id).await {
        Some(object) => Json(object).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("object {object_id} not found") })),
        )
            .into_response(),
    })
}
