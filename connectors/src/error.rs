use dca_wallet_commons::error::{CodedError, ErrorCode, ExternalError, format_with_code};
use dca_wallet_core::error::LedgerCallError;
use thiserror::Error;

pub type ConnectorResult<T> = Result<T, ConnectorError>;

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("{source}")]
    Agent {
        #[source]
        source: ExternalError,
    },
    #[error("encode args for {method}: {message}")]
    Encode { method: String, message: String },
    #[error("candid decode error in {method}: {message}")]
    Decode { method: String, message: String },
    #[error("failed to create identity from pem file at {path}: {message}")]
    Identity { path: String, message: String },
}

impl ConnectorError {
    pub fn agent<E>(err: E) -> Self
    where
        E: Into<ExternalError>,
    {
        ConnectorError::Agent { source: err.into() }
    }
}

impl From<ConnectorError> for ExternalError {
    fn from(value: ConnectorError) -> Self {
        ExternalError(value.to_string())
    }
}

impl From<ConnectorError> for String {
    fn from(value: ConnectorError) -> Self {
        format_with_code(&value)
    }
}

impl From<ConnectorError> for LedgerCallError {
    fn from(value: ConnectorError) -> Self {
        LedgerCallError::transport(value)
    }
}

impl CodedError for ConnectorError {
    fn code(&self) -> ErrorCode {
        match self {
            ConnectorError::Agent { .. } => ErrorCode::ConnectorAgent,
            ConnectorError::Encode { .. } | ConnectorError::Decode { .. } => ErrorCode::ConnectorDecode,
            ConnectorError::Identity { .. } => ErrorCode::ConnectorBackend,
        }
    }

    fn retriable(&self) -> bool {
        matches!(self, ConnectorError::Agent { .. })
    }
}
