use thiserror::Error;

/// Convenience alias used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything that can go wrong inside the client.
///
/// Validation and availability errors are raised synchronously at the call
/// site, before any network effect. Transport errors are owned by the node's
/// reconnect machinery and only reach callers of the operation that hit them.
/// Resolution errors never escape `Player::play`; they surface as track-error
/// events instead.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed caller input, rejected before any mutation.
    #[error("invalid input: {0}")]
    Validation(String),

    /// No connected node satisfies the requested capability set.
    #[error("no node is available currently")]
    NoNodeAvailable,

    /// A node burned through its whole reconnect budget and destroyed itself.
    #[error("node '{name}' gave up reconnecting after {attempts} attempts")]
    ReconnectExhausted { name: String, attempts: u32 },

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("websocket failure: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),

    /// An unresolved track could not be matched to a playable one.
    #[error("track resolution failed: {0}")]
    Resolution(String),

    /// Corrupt or truncated binary track data.
    #[error("malformed track data: {0}")]
    Codec(String),

    /// A node sent an operation this client does not know about.
    #[error("unexpected op '{op}' from node: {payload}")]
    UnexpectedOp { op: String, payload: String },
}
