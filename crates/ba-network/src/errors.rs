use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("request transport error: {0}")]
    Transport(String),

    #[error("websocket handshake failed: {0}")]
    WebSocketHandshake(String),

    #[error("network client is shutting down")]
    ShuttingDown,

    #[error("unknown websocket handle")]
    UnknownSocket,
}
