//! Error types for the client crate.

use crate::api_client::ApiClientError;
use crate::config::ConfigLoadError;
use syncwell_core::{DebounceError, RemoteError, TreeError};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigLoadError),
    #[error(transparent)]
    Api(#[from] ApiClientError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error(transparent)]
    Debounce(#[from] DebounceError),
    #[error("Tracing init failed: {0}")]
    Telemetry(String),
}

pub type ClientResult<T> = Result<T, ClientError>;
