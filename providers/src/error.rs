#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("unknown model/provider for {0:?}")]
    UnknownModel(String),
    #[error("missing api key for provider {0}")]
    MissingKey(String),
    #[error("upstream transport: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed upstream response: {0}")]
    Malformed(String),
    #[error("upstream returned {status}: {body}")]
    Upstream { status: u16, body: serde_json::Value },
}

impl ProviderError {
    /// Transport failures and 5xx upstream responses are retryable via failover;
    /// everything else (bad key, malformed model) is not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Transport(_))
    }
}
