use std::any::Any;
use std::panic::AssertUnwindSafe;

use candid::Nat;
use futures::FutureExt;
use icrc_ledger_types::icrc1::account::Account;
use icrc_ledger_types::icrc1::transfer::TransferArg;
use tokio::sync::watch;
use tracing::{info, instrument, warn};

use crate::error::{LedgerCallError, UNKNOWN_ERROR};
use crate::ledger::actor::TransferRejection;
use crate::ledger::session::Session;
use crate::tokens::token::Token;
use crate::tokens::token_amount::TokenAmount;

/// Lifecycle of the form's transfer. At most one is in flight.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TransferOutcome {
    #[default]
    Idle,
    InFlight {
        ticket: u64,
    },
    Succeeded {
        ticket: u64,
        block_index: Nat,
    },
    Failed {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionResult {
    Succeeded { block_index: Nat },
    Failed { reason: String },
}

/// A validated transfer, amounts in smallest units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub ticket: u64,
    pub token: Token,
    pub to: Account,
    pub amount: Nat,
    pub fee: Nat,
}

impl TransferRequest {
    /// Default subaccount, no memo, and the ledger picks the timestamp.
    pub fn to_transfer_arg(&self) -> TransferArg {
        TransferArg {
            from_subaccount: None,
            to: self.to,
            fee: Some(self.fee.clone()),
            created_at_time: None,
            memo: None,
            amount: self.amount.clone(),
        }
    }
}

pub struct TransferSubmitter {
    session: watch::Receiver<Session>,
}

impl TransferSubmitter {
    pub fn new(session: watch::Receiver<Session>) -> Self {
        Self { session }
    }

    /// Issues exactly one transfer call and classifies whatever comes back.
    ///
    /// Never fails and never panics: a panicking ledger call is reported as
    /// an unknown error.
    #[instrument(name = "withdraw.execute", skip_all, fields(ticket = request.ticket, token = %request.token))]
    pub async fn execute(&self, request: &TransferRequest) -> SubmissionResult {
        let ledger = self.session.borrow().ledger(request.token);
        let Some(ledger) = ledger else {
            let err = LedgerCallError::Unavailable { token: request.token };
            warn!("[withdraw] {}", err);
            return SubmissionResult::Failed { reason: err.reason() };
        };

        info!(
            "[withdraw] sending {} to {} (fee {})",
            TokenAmount::from_units(request.token, request.amount.clone()).plain(),
            request.to.owner,
            request.fee
        );

        let arg = request.to_transfer_arg();
        let reply = AssertUnwindSafe(async move { ledger.transfer(arg).await })
            .catch_unwind()
            .await;

        let result = classify_reply(reply);
        match &result {
            SubmissionResult::Succeeded { block_index } => {
                info!("[withdraw] transfer accepted at block {}", block_index)
            }
            SubmissionResult::Failed { reason } => warn!("[withdraw] transfer failed: {}", reason),
        }
        result
    }
}

type LedgerReply = Result<Result<Nat, TransferRejection>, LedgerCallError>;

fn classify_reply(reply: Result<LedgerReply, Box<dyn Any + Send>>) -> SubmissionResult {
    match reply {
        Ok(Ok(Ok(block_index))) => SubmissionResult::Succeeded { block_index },
        Ok(Ok(Err(rejection))) => SubmissionResult::Failed {
            reason: rejection.reason(),
        },
        Ok(Err(err)) => SubmissionResult::Failed { reason: err.reason() },
        Err(_) => SubmissionResult::Failed {
            reason: UNKNOWN_ERROR.to_string(),
        },
    }
}
