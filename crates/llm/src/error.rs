use markpanel_core::model::Provider;
use thiserror::Error;

/// Error raised by a provider call.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("case text must not be empty")]
    EmptyInput,

    #[error("API key not configured for {0}")]
    MissingApiKey(Provider),

    #[error("{provider} request failed: {message}")]
    Network { provider: Provider, message: String },

    #[error("{0} did not answer in time")]
    Timeout(Provider),

    #[error("{0} call cancelled")]
    Cancelled(Provider),

    #[error("{provider} API error: {status}")]
    Status {
        provider: Provider,
        status: u16,
        body: String,
    },

    #[error("{provider} returned an unreadable body: {message}")]
    InvalidBody { provider: Provider, message: String },

    #[error("no content received from {0}")]
    EmptyContent(Provider),

    #[error("{provider} quota exhausted: {message}")]
    Quota { provider: Provider, message: String },
}

impl ProviderError {
    /// Transport-level failures propagate out of an adapter; the rest are
    /// recorded as a failed analysis.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ProviderError::MissingApiKey(_)
                | ProviderError::Network { .. }
                | ProviderError::Timeout(_)
                | ProviderError::Cancelled(_)
                | ProviderError::Status { .. }
        )
    }

    pub(crate) fn from_reqwest(provider: Provider, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout(provider)
        } else {
            ProviderError::Network {
                provider,
                message: err.to_string(),
            }
        }
    }
}
