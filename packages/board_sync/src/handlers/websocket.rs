use axum::{
    extract::{Path, Query, State, WebSocketUpgrade},
    http::HeaderMap,
    response::{IntoResponse, Response},
};

use crate::AppState;
use crate::auth::{self, TokenQuery};
use crate::ws;

/// Board WebSocket handler - admits the caller, then hands the socket to a
/// board session. Refused callers get a plain HTTP error and no upgrade.
pub async fn board_websocket_handler(
    State(state): State<AppState>,
    Path(board_id): Path<String>,
    Query(query): Query<TokenQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let credential = auth::credential_from(&query, &headers);
    let admission = match auth::admit(&state, &board_id, credential.as_deref()).await {
        Ok(admission) => admission,
        Err(e) => return e.into_response(),
    };

    let ctx = state.session_context();
    ws.on_upgrade(move |socket| ws::serve_socket(socket, admission, ctx))
}
