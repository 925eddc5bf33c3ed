use thiserror::Error;

pub type Result<T> = std::result::Result<T, RegistryError>;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Registry request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Registry returned unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("Invalid registry index header: {0}")]
    InvalidIndex(String),

    #[error("Failed to decode registry response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid registry configuration: {0}")]
    InvalidConfiguration(String),
}
