use std::fmt;

use async_trait::async_trait;
use candid::Nat;
use icrc_ledger_types::icrc1::account::Account;
use icrc_ledger_types::icrc1::transfer::{TransferArg, TransferError};

use crate::error::LedgerCallError;

/// One ledger canister, as seen by the engine.
///
/// The outer `Result` is the transport (the call itself failed). The inner
/// `Result` of `transfer` is the ledger's own verdict.
#[mockall::automock]
#[async_trait]
pub trait LedgerActor: Send + Sync {
    async fn balance_of(&self, account: Account) -> Result<Nat, LedgerCallError>;

    async fn transfer(&self, arg: TransferArg) -> Result<Result<Nat, TransferRejection>, LedgerCallError>;
}

/// A transfer the ledger refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferRejection {
    // structured variant, e.g. `InsufficientFunds { balance }`
    Keyed { key: String, payload: Option<String> },
    Text(String),
}

impl TransferRejection {
    pub fn keyed(key: impl Into<String>) -> Self {
        TransferRejection::Keyed {
            key: key.into(),
            payload: None,
        }
    }

    /// User-facing reason: the variant key, or the literal text.
    pub fn reason(&self) -> String {
        match self {
            TransferRejection::Keyed { key, .. } => key.clone(),
            TransferRejection::Text(text) => text.clone(),
        }
    }
}

impl fmt::Display for TransferRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferRejection::Keyed {
                key,
                payload: Some(payload),
            } => write!(f, "{key} ({payload})"),
            TransferRejection::Keyed { key, payload: None } => f.write_str(key),
            TransferRejection::Text(text) => f.write_str(text),
        }
    }
}

impl From<TransferError> for TransferRejection {
    fn from(err: TransferError) -> Self {
        let (key, payload) = match err {
            TransferError::BadFee { expected_fee } => ("BadFee", Some(format!("expected_fee: {expected_fee}"))),
            TransferError::BadBurn { min_burn_amount } => ("BadBurn", Some(format!("min_burn_amount: {min_burn_amount}"))),
            TransferError::InsufficientFunds { balance } => ("InsufficientFunds", Some(format!("balance: {balance}"))),
            TransferError::TooOld => ("TooOld", None),
            TransferError::CreatedInFuture { ledger_time } => {
                ("CreatedInFuture", Some(format!("ledger_time: {ledger_time}")))
            }
            TransferError::TemporarilyUnavailable => ("TemporarilyUnavailable", None),
            TransferError::Duplicate { duplicate_of } => ("Duplicate", Some(format!("duplicate_of: {duplicate_of}"))),
            TransferError::GenericError { error_code, message } => {
                ("GenericError", Some(format!("error_code: {error_code}, message: {message}")))
            }
        };

        TransferRejection::Keyed {
            key: key.to_string(),
            payload,
        }
    }
}
