use std::sync::Arc;

use async_trait::async_trait;
use candid::{CandidType, Decode, Encode, Nat, Principal};
use dca_wallet_core::error::LedgerCallError;
use dca_wallet_core::ledger::actor::{LedgerActor, TransferRejection};
use dca_wallet_core::tokens::token::Token;
use icrc_ledger_types::icrc1::account::Account;
use icrc_ledger_types::icrc1::transfer::{TransferArg, TransferError};
use serde::de::DeserializeOwned;
use tracing::instrument;

use crate::agent::LedgerAgent;
use crate::error::{ConnectorError, ConnectorResult};

/// `LedgerActor` over an ICRC-1 ledger canister.
pub struct IcrcLedgerActor<A: LedgerAgent> {
    agent: Arc<A>,
    ledger: Principal,
    token: Token,
}

impl<A: LedgerAgent> IcrcLedgerActor<A> {
    pub fn new(agent: Arc<A>, ledger: Principal, token: Token) -> Self {
        Self { agent, ledger, token }
    }

    pub fn ledger(&self) -> Principal {
        self.ledger
    }

    async fn query<R>(&self, method: &str, arg: impl CandidType) -> ConnectorResult<R>
    where
        R: CandidType + DeserializeOwned,
    {
        let arg_blob = encode(method, &arg)?;
        let reply = self.agent.query_raw(&self.ledger, method, arg_blob).await?;
        decode(method, &reply)
    }

    async fn update<R>(&self, method: &str, arg: impl CandidType) -> ConnectorResult<R>
    where
        R: CandidType + DeserializeOwned,
    {
        let arg_blob = encode(method, &arg)?;
        let reply = self.agent.update_raw(&self.ledger, method, arg_blob).await?;
        decode(method, &reply)
    }
}

fn encode(method: &str, arg: &impl CandidType) -> ConnectorResult<Vec<u8>> {
    Encode!(arg).map_err(|e| ConnectorError::Encode {
        method: method.to_string(),
        message: e.to_string(),
    })
}

fn decode<R>(method: &str, reply: &[u8]) -> ConnectorResult<R>
where
    R: CandidType + DeserializeOwned,
{
    Decode!(reply, R).map_err(|e| ConnectorError::Decode {
        method: method.to_string(),
        message: e.to_string(),
    })
}

#[async_trait]
impl<A: LedgerAgent> LedgerActor for IcrcLedgerActor<A> {
    #[instrument(name = "ledger.balance_of", skip_all, err, fields(token = %self.token, owner = %account.owner))]
    async fn balance_of(&self, account: Account) -> Result<Nat, LedgerCallError> {
        Ok(self.query::<Nat>("icrc1_balance_of", account).await?)
    }

    #[instrument(name = "ledger.transfer", skip_all, err, fields(token = %self.token, to = %arg.to.owner, amount = %arg.amount))]
    async fn transfer(&self, arg: TransferArg) -> Result<Result<Nat, TransferRejection>, LedgerCallError> {
        let reply: Result<Nat, TransferError> = self.update("icrc1_transfer", arg).await?;
        Ok(reply.map_err(TransferRejection::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::MockLedgerAgent;

    fn icp_ledger() -> Principal {
        Principal::from_text("ryjl3-tyaaa-aaaaa-aaaba-cai").unwrap()
    }

    fn holder() -> Principal {
        Principal::from_text("2vxsx-fae").unwrap()
    }

    fn destination() -> Principal {
        Principal::from_text("aaaaa-aa").unwrap()
    }

    fn transfer_arg(amount: u64) -> TransferArg {
        TransferArg {
            from_subaccount: None,
            to: Account {
                owner: destination(),
                subaccount: None,
            },
            fee: Some(Nat::from(10_000u64)),
            created_at_time: None,
            memo: None,
            amount: Nat::from(amount),
        }
    }

    #[tokio::test]
    async fn balance_of_queries_icrc1_balance_of() {
        // given
        let mut agent = MockLedgerAgent::new();
        agent
            .expect_query_raw()
            .withf(|canister, method, arg| {
                let account = Decode!(arg, Account).unwrap();
                *canister == icp_ledger()
                    && method == "icrc1_balance_of"
                    && account.owner == holder()
                    && account.subaccount.is_none()
            })
            .times(1)
            .returning(|_, _, _| Ok(Encode!(&Nat::from(150_000_000u64)).unwrap()));
        let actor = IcrcLedgerActor::new(Arc::new(agent), icp_ledger(), Token::Icp);

        // when
        let balance = actor
            .balance_of(Account {
                owner: holder(),
                subaccount: None,
            })
            .await;

        // then
        assert_eq!(balance, Ok(Nat::from(150_000_000u64)));
    }

    #[tokio::test]
    async fn transfer_sends_the_arg_and_returns_the_block_index() {
        let mut agent = MockLedgerAgent::new();
        agent
            .expect_update_raw()
            .withf(|_, method, arg| {
                let sent = Decode!(arg, TransferArg).unwrap();
                method == "icrc1_transfer" && sent == transfer_arg(149_990_000)
            })
            .times(1)
            .returning(|_, _, _| Ok(Encode!(&Ok::<Nat, TransferError>(Nat::from(42u64))).unwrap()));
        let actor = IcrcLedgerActor::new(Arc::new(agent), icp_ledger(), Token::Icp);

        let reply = actor.transfer(transfer_arg(149_990_000)).await;

        assert_eq!(reply, Ok(Ok(Nat::from(42u64))));
    }

    #[tokio::test]
    async fn ledger_rejection_is_mapped_to_a_keyed_variant() {
        let mut agent = MockLedgerAgent::new();
        agent.expect_update_raw().returning(|_, _, _| {
            let reply: Result<Nat, TransferError> = Err(TransferError::InsufficientFunds {
                balance: Nat::from(5u64),
            });
            Ok(Encode!(&reply).unwrap())
        });
        let actor = IcrcLedgerActor::new(Arc::new(agent), icp_ledger(), Token::Icp);

        let reply = actor.transfer(transfer_arg(20_000)).await.unwrap();

        assert_eq!(reply.unwrap_err().reason(), "InsufficientFunds");
    }

    #[tokio::test]
    async fn agent_failure_is_a_transport_error() {
        let mut agent = MockLedgerAgent::new();
        agent
            .expect_update_raw()
            .returning(|_, _, _| Err(ConnectorError::agent("connection refused")));
        let actor = IcrcLedgerActor::new(Arc::new(agent), icp_ledger(), Token::Icp);

        let err = actor.transfer(transfer_arg(20_000)).await.unwrap_err();

        assert_eq!(err.reason(), "connection refused");
    }

    #[tokio::test]
    async fn undecodable_reply_is_a_transport_error() {
        let mut agent = MockLedgerAgent::new();
        agent
            .expect_query_raw()
            .returning(|_, _, _| Ok(Encode!(&"not a nat").unwrap()));
        let actor = IcrcLedgerActor::new(Arc::new(agent), icp_ledger(), Token::Icp);

        let err = actor
            .balance_of(Account {
                owner: holder(),
                subaccount: None,
            })
            .await
            .unwrap_err();

        assert!(err.reason().starts_with("candid decode error in icrc1_balance_of"));
    }
}
