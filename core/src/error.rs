use dca_wallet_commons::error::{CodedError, ErrorCode, ExternalError, format_with_code};
use thiserror::Error;

use crate::tokens::token::Token;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    #[error(transparent)]
    Ledger(#[from] LedgerCallError),
}

impl CodedError for CoreError {
    fn code(&self) -> ErrorCode {
        match self {
            CoreError::Conversion(err) => err.code(),
            CoreError::Ledger(err) => err.code(),
        }
    }
}

impl From<CoreError> for String {
    fn from(value: CoreError) -> Self {
        format_with_code(&value)
    }
}

/// Domain errors of the decimal to base-unit conversion.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConversionError {
    #[error("amount is empty")]
    Empty,
    #[error("malformed amount `{input}`")]
    Malformed { input: String },
    #[error("amount must not be negative")]
    Negative,
    #[error("amount exceeds the representable range")]
    Overflow,
    #[error("unsupported precision of {decimals} decimals")]
    UnsupportedScale { decimals: u8 },
}

impl CodedError for ConversionError {
    fn code(&self) -> ErrorCode {
        match self {
            ConversionError::Overflow | ConversionError::UnsupportedScale { .. } => ErrorCode::CoreAmountOverflow,
            _ => ErrorCode::CoreInvalidAmount,
        }
    }
}

/// Failure of a call to a ledger actor before any ledger reply was decoded.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerCallError {
    #[error("{source}")]
    Transport {
        #[source]
        source: ExternalError,
    },
    #[error("no ledger actor available for {token}")]
    Unavailable { token: Token },
    #[error("unknown error")]
    Unknown,
}

pub const UNKNOWN_ERROR: &str = "unknown error";

impl LedgerCallError {
    pub fn transport<E>(err: E) -> Self
    where
        E: Into<ExternalError>,
    {
        let source = err.into();
        if source.0.trim().is_empty() {
            return LedgerCallError::Unknown;
        }
        LedgerCallError::Transport { source }
    }

    /// Message shown to the user when a transfer call fails this way.
    pub fn reason(&self) -> String {
        match self {
            LedgerCallError::Transport { source } => source.0.clone(),
            LedgerCallError::Unknown => UNKNOWN_ERROR.to_string(),
            other => other.to_string(),
        }
    }
}

impl CodedError for LedgerCallError {
    fn code(&self) -> ErrorCode {
        match self {
            LedgerCallError::Unavailable { .. } => ErrorCode::CoreLedgerUnavailable,
            _ => ErrorCode::CoreLedgerCall,
        }
    }

    fn retriable(&self) -> bool {
        matches!(self, LedgerCallError::Transport { .. })
    }
}
