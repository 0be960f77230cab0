#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Status endpoint returned {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("Invalid snapshot: {0}")]
    Decode(#[from] serde_json::Error),
}
