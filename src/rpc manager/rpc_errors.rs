use solana_client::client_error::ClientError;
use thiserror::Error;

/// Errors surfaced by a cluster endpoint
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RpcManagerError {
    /// Transport-level errors (network, connection)
    #[error("Transport error: {message} (endpoint: {endpoint})")]
    Transport { endpoint: String, message: String },

    #[error("Timeout (endpoint: {endpoint})")]
    Timeout { endpoint: String },

    /// RPC response errors (from the RPC server)
    #[error("RPC response error: {message} (endpoint: {endpoint}, code: {code:?})")]
    RpcResponse {
        endpoint: String,
        message: String,
        code: Option<i64>,
    },

    #[error("Rate limit exceeded (endpoint: {endpoint})")]
    RateLimitExceeded { endpoint: String },

    /// The recent blockhash or durable nonce value was not accepted
    #[error("Blockhash not found (endpoint: {endpoint})")]
    BlockhashNotFound { endpoint: String },

    #[error("Insufficient funds (endpoint: {endpoint})")]
    InsufficientFunds { endpoint: String },

    /// The cluster refused the transaction during validation or execution
    #[error("Transaction rejected: {reason} (endpoint: {endpoint})")]
    TransactionRejected { endpoint: String, reason: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RpcManagerError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            RpcManagerError::Transport { .. } => true,
            RpcManagerError::Timeout { .. } => true,
            RpcManagerError::RateLimitExceeded { .. } => true,

            // A stale nonce never becomes valid again
            RpcManagerError::BlockhashNotFound { .. } => false,
            RpcManagerError::InsufficientFunds { .. } => false,
            RpcManagerError::TransactionRejected { .. } => false,
            RpcManagerError::Internal(_) => false,

            // Retry on server errors (5xx)
            RpcManagerError::RpcResponse { code, .. } => {
                matches!(code, Some(c) if (500..600).contains(c))
            }
        }
    }

    /// Get the endpoint associated with this error, if any
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            RpcManagerError::Transport { endpoint, .. }
            | RpcManagerError::Timeout { endpoint }
            | RpcManagerError::RpcResponse { endpoint, .. }
            | RpcManagerError::RateLimitExceeded { endpoint }
            | RpcManagerError::BlockhashNotFound { endpoint }
            | RpcManagerError::InsufficientFunds { endpoint }
            | RpcManagerError::TransactionRejected { endpoint, .. } => Some(endpoint),
            RpcManagerError::Internal(_) => None,
        }
    }

    /// Create from ClientError with context
    pub fn from_client_error(err: ClientError, endpoint: &str) -> Self {
        let message = err.to_string();
        let err_str = message.to_lowercase();
        let endpoint = endpoint.to_string();

        if err_str.contains("blockhash not found") {
            RpcManagerError::BlockhashNotFound { endpoint }
        } else if err_str.contains("insufficient funds")
            || err_str.contains("insufficient lamports")
        {
            RpcManagerError::InsufficientFunds { endpoint }
        } else if err_str.contains("rate limit")
            || err_str.contains("too many requests")
            || err_str.contains("429")
        {
            RpcManagerError::RateLimitExceeded { endpoint }
        } else if err_str.contains("timeout") || err_str.contains("timed out") {
            RpcManagerError::Timeout { endpoint }
        } else if err_str.contains("transaction simulation failed")
            || err_str.contains("transaction error")
            || err_str.contains("signature verification")
        {
            RpcManagerError::TransactionRejected {
                endpoint,
                reason: message,
            }
        } else if err_str.contains("error sending request")
            || err_str.contains("connection")
            || err_str.contains("io error")
        {
            RpcManagerError::Transport { endpoint, message }
        } else {
            let code = err_str
                .split("code:")
                .nth(1)
                .and_then(|s| s.split_whitespace().next())
                .and_then(|s| s.trim_matches(|c: char| !c.is_ascii_digit() && c != '-').parse::<i64>().ok());

            RpcManagerError::RpcResponse {
                endpoint,
                message,
                code,
            }
        }
    }
}

pub type RpcResult<T> = Result<T, RpcManagerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use solana_client::client_error::ClientErrorKind;

    #[test]
    fn test_error_is_retryable() {
        assert!(RpcManagerError::Transport {
            endpoint: "test".to_string(),
            message: "connection failed".to_string(),
        }
        .is_retryable());

        assert!(RpcManagerError::Timeout {
            endpoint: "test".to_string(),
        }
        .is_retryable());

        assert!(!RpcManagerError::BlockhashNotFound {
            endpoint: "test".to_string(),
        }
        .is_retryable());

        assert!(!RpcManagerError::TransactionRejected {
            endpoint: "test".to_string(),
            reason: "bad signature".to_string(),
        }
        .is_retryable());
    }

    #[test]
    fn test_rpc_response_retry_by_status() {
        let server = RpcManagerError::RpcResponse {
            endpoint: "test".to_string(),
            message: "oops".to_string(),
            code: Some(503),
        };
        let client = RpcManagerError::RpcResponse {
            endpoint: "test".to_string(),
            message: "bad request".to_string(),
            code: Some(400),
        };
        assert!(server.is_retryable());
        assert!(!client.is_retryable());
    }

    #[test]
    fn test_error_endpoint() {
        let err = RpcManagerError::Timeout {
            endpoint: "https://api.devnet.solana.com".to_string(),
        };
        assert_eq!(err.endpoint(), Some("https://api.devnet.solana.com"));
        assert_eq!(RpcManagerError::Internal("x".to_string()).endpoint(), None);
    }

    #[test]
    fn test_from_client_error_classification() {
        let err = ClientError::from(ClientErrorKind::Custom(
            "Blockhash not found".to_string(),
        ));
        assert!(matches!(
            RpcManagerError::from_client_error(err, "local"),
            RpcManagerError::BlockhashNotFound { .. }
        ));

        let err = ClientError::from(ClientErrorKind::Custom(
            "request timed out".to_string(),
        ));
        assert!(matches!(
            RpcManagerError::from_client_error(err, "local"),
            RpcManagerError::Timeout { .. }
        ));
    }
}
