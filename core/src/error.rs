/// Errors from the request pipeline that carry their own HTTP status.
///
/// Variants map directly to the status codes named in the proxy's error
/// contract; anything else upstream (MCP, store, provider transport)
/// surfaces through the pipeline as one of these.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("malformed request: {0}")]
    BadRequest(String),
    #[error("firewall blocked request: {0}")]
    FirewallBlock(String),
    #[error("quality gate rejected response: {0}")]
    QualityRejected(String),
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("budget exceeded: {0}")]
    BudgetExceeded(String),
    #[error("upstream transport failure: {0}")]
    UpstreamTransport(#[from] agix_providers::ProviderError),
    #[error("tool loop exceeded max iterations")]
    ToolLoopExhausted,
    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn status_code(&self) -> u16 {
        match self {
            PipelineError::BadRequest(_) => 400,
            PipelineError::FirewallBlock(_) => 403,
            PipelineError::QualityRejected(_) => 422,
            PipelineError::RateLimited { .. } | PipelineError::BudgetExceeded(_) => 429,
            PipelineError::UpstreamTransport(_) => 502,
            PipelineError::ToolLoopExhausted | PipelineError::Internal(_) => 500,
        }
    }
}
