use std::sync::Arc;

use dca_wallet_connectors::agent::build_agent;
use dca_wallet_connectors::identity::create_identity_from_pem_file;
use dca_wallet_connectors::ledger::IcrcLedgerActor;
use dca_wallet_core::ledger::session::{LedgerHandles, Session};
use dca_wallet_core::tokens::token::Token;
use dca_wallet_commons::error::ExternalError;
use tokio::sync::watch;
use tracing::info;

use crate::config::{Config, ConfigError};
use crate::error::AppResult;

/// Everything a command needs: the config and the live session.
pub struct WalletContext {
    pub config: Arc<Config>,
    session: watch::Sender<Session>,
}

impl WalletContext {
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.session.subscribe()
    }

    pub fn session(&self) -> Session {
        self.session.borrow().clone()
    }
}

pub async fn init_context(config: Config) -> AppResult<WalletContext> {
    let (identity, principal) = match &config.identity_pem {
        Some(path) => {
            let identity = create_identity_from_pem_file(path).map_err(|e| ConfigError::ReadIdentity {
                path: path.clone(),
                source: ExternalError::from(e),
            })?;
            let principal = identity.sender().map_err(|e| ConfigError::ReadIdentity {
                path: path.clone(),
                source: ExternalError::from(e),
            })?;
            (Some(identity), Some(principal))
        }
        None => (None, None),
    };

    let agent = Arc::new(build_agent(&config.ic_url, identity, config.fetch_root_key).await?);

    let ledgers = Token::ALL.into_iter().fold(LedgerHandles::new(), |ledgers, token| {
        ledgers.with(
            token,
            Arc::new(IcrcLedgerActor::new(agent.clone(), config.ledger_id(token), token)),
        )
    });

    let session = match principal {
        Some(principal) => {
            info!("Connected as {}", principal);
            Session::connected(principal, ledgers, Some(config.service_principal))
        }
        None => {
            info!("No IDENTITY_PEM configured; running disconnected");
            Session {
                ledgers,
                ..Session::disconnected(Some(config.service_principal))
            }
        }
    };

    let (session, _) = watch::channel(session);

    Ok(WalletContext {
        config: Arc::new(config),
        session,
    })
}
