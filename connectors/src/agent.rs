use async_trait::async_trait;
use candid::Principal;
use ic_agent::{Agent, Identity};
use tracing::info;

use crate::error::{ConnectorError, ConnectorResult};

/// Raw canister calls. Candid encoding happens one layer up so this seam
/// stays mockable.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerAgent: Send + Sync {
    async fn query_raw(&self, canister: &Principal, method: &str, arg: Vec<u8>) -> ConnectorResult<Vec<u8>>;

    async fn update_raw(&self, canister: &Principal, method: &str, arg: Vec<u8>) -> ConnectorResult<Vec<u8>>;
}

#[async_trait]
impl LedgerAgent for Agent {
    async fn query_raw(&self, canister: &Principal, method: &str, arg: Vec<u8>) -> ConnectorResult<Vec<u8>> {
        self.query(canister, method)
            .with_arg(arg)
            .call()
            .await
            .map_err(|e| ConnectorError::agent(e.to_string()))
    }

    async fn update_raw(&self, canister: &Principal, method: &str, arg: Vec<u8>) -> ConnectorResult<Vec<u8>> {
        self.update(canister, method)
            .with_arg(arg)
            .call_and_wait()
            .await
            .map_err(|e| ConnectorError::agent(e.to_string()))
    }
}

/// Builds an agent for `url`. Without an identity the agent is anonymous.
pub async fn build_agent(url: &str, identity: Option<Box<dyn Identity>>, fetch_root_key: bool) -> ConnectorResult<Agent> {
    let builder = Agent::builder().with_url(url);
    let builder = match identity {
        Some(identity) => builder.with_boxed_identity(identity),
        None => builder,
    };
    let agent = builder.build().map_err(|e| ConnectorError::agent(e.to_string()))?;

    if fetch_root_key {
        info!("Fetching root key from {}", url);
        agent
            .fetch_root_key()
            .await
            .map_err(|e| ConnectorError::agent(e.to_string()))?;
    }

    Ok(agent)
}
