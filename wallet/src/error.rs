use dca_wallet_commons::error::{CodedError, ErrorCode};
use dca_wallet_connectors::error::ConnectorError;
use dca_wallet_core::error::CoreError;
use thiserror::Error;

use crate::config::ConfigError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error(transparent)]
    Connector(#[from] ConnectorError),
    #[error("prompt failed: {0}")]
    Prompt(#[from] dialoguer::Error),
    #[error("{message}")]
    Command { message: String },
    #[error("withdraw session ended unexpectedly")]
    SessionClosed,
}

impl AppError {
    pub fn command(message: impl Into<String>) -> Self {
        AppError::Command {
            message: message.into(),
        }
    }
}

impl CodedError for AppError {
    fn code(&self) -> ErrorCode {
        match self {
            AppError::Config(err) => err.code(),
            AppError::Core(err) => err.code(),
            AppError::Connector(err) => err.code(),
            AppError::Prompt(_) | AppError::Command { .. } => ErrorCode::WalletCommand,
            AppError::SessionClosed => ErrorCode::WalletSession,
        }
    }
}
