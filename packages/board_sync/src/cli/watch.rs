use futures::StreamExt;
use tokio_tungstenite::tungstenite;

use crate::models::SharedObject;
use crate::ws::Envelope;

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("server is unavailable")]
    Unavailable,

    #[error("server refused the request ({status}): {message}")]
    Refused { status: u16, message: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WatchError {
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_connect() {
            Self::Unavailable
        } else {
            Self::Other(err.into())
        }
    }

    pub fn from_tungstenite(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::Io(ref io_err)
                if matches!(
                    io_err.kind(),
                    std::io::ErrorKind::ConnectionRefused
                        | std::io::ErrorKind::ConnectionReset
                        | std::io::ErrorKind::ConnectionAborted
                ) =>
            {
                Self::Unavailable
            }
            tungstenite::Error::Http(response) => {
                let message = response
                    .body()
                    .as_ref()
                    .map(|body| String::from_utf8_lossy(body).into_owned())
                    .unwrap_or_default();
                Self::Refused {
                    status: response.status().as_u16(),
                    message,
                }
            }
            other => Self::Other(other.into()),
        }
    }
}

/// Where a board lives and how to authenticate against it.
#[derive(Debug, Clone)]
pub struct BoardEndpoint {
    /// Server root including any base path, e.g. `http://127.0.0.1:8080/sync`
    pub base_url: String,
    pub board_id: String,
    pub token: String,
}

impl BoardEndpoint {
    pub fn new(base_url: &str, board_id: &str, token: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            board_id: board_id.to_string(),
            token: token.to_string(),
        }
    }

    fn url_with(&self, segments: &[&str]) -> Result<reqwest::Url, WatchError> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| anyhow::anyhow!("invalid server url {}: {}", self.base_url, e))?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("server url {} cannot have a path", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub fn objects_url(&self) -> Result<reqwest::Url, WatchError> {
        self.url_with(&["api", "boards", &self.board_id, "objects"])
    }

    /// Upgrade URL with the token in the query string, since a WebSocket
    /// handshake from a browser cannot carry headers.
    pub fn ws_url(&self) -> Result<reqwest::Url, WatchError> {
        let mut url = self.url_with(&["ws", "board", &self.board_id])?;
        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme)
            .map_err(|_| anyhow::anyhow!("cannot use {} for a websocket", self.base_url))?;
        url.query_pairs_mut().append_pair("token", &self.token);
        Ok(url)
    }
}

/// Fetch the board's current objects.
pub async fn fetch_snapshot(endpoint: &BoardEndpoint) -> Result<Vec<SharedObject>, WatchError> {
    let client = reqwest::Client::new();
    let resp = client
        .get(endpoint.objects_url()?)
        .bearer_auth(&endpoint.token)
        .send()
        .await
        .map_err(WatchError::from_reqwest)?;

    let status = resp.status();
    if !status.is_success() {
        let message = resp.text().await.unwrap_or_default();
        return Err(WatchError::Refused {
            status: status.as_u16(),
            message,
        });
    }
    resp.json().await.map_err(WatchError::from_reqwest)
}

/// Stream the board's broadcasts into `on_event` until the server closes
/// the connection.
pub async fn watch<F>(endpoint: &BoardEndpoint, mut on_event: F) -> Result<(), WatchError>
where
    F: FnMut(Envelope),
{
    let (ws_stream, _) = tokio_tungstenite::connect_async(endpoint.ws_url()?.as_str())
        .await
        .map_err(WatchError::from_tungstenite)?;
    let (_ws_write, mut ws_read) = ws_stream.split();

    while let Some(msg) = ws_read.next().await {
        match msg.map_err(WatchError::from_tungstenite)? {
            tungstenite::Message::Text(text) => {
                match Envelope::decode_broadcast(text.as_str().as_bytes()) {
                    Ok(envelope) => on_event(envelope),
                    Err(e) => tracing::warn!("Ignoring undecodable broadcast: {}", e),
                }
            }
            tungstenite::Message::Close(_) => break,
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_objects_url() {
        let endpoint = BoardEndpoint::new("http://127.0.0.1:8080/sync/", "board 1", "t");
        assert_eq!(
            endpoint.objects_url().unwrap().as_str(),
            "http://127.0.0.1:8080/sync/api/boards/board%201/objects"
        );
    }

    #[test]
    fn test_ws_url_scheme_and_token() {
        let endpoint = BoardEndpoint::new("http://localhost:8080", "b1", "a&b");
        assert_eq!(
            endpoint.ws_url().unwrap().as_str(),
            "ws://localhost:8080/ws/board/b1?token=a%26b"
        );

        let secure = BoardEndpoint::new("https://boards.example.com", "b1", "t");
        assert_eq!(secure.ws_url().unwrap().scheme(), "wss");
    }

    #[test]
    fn test_invalid_base_url() {
        let endpoint = BoardEndpoint::new("not a url", "b1", "t");
        assert!(matches!(endpoint.ws_url(), Err(WatchError::Other(_))));
    }
}
