use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use candid::Principal;

use crate::ledger::actor::LedgerActor;
use crate::tokens::token::Token;

/// Ledger actors of the connected session, one per token.
#[derive(Clone, Default)]
pub struct LedgerHandles {
    actors: HashMap<Token, Arc<dyn LedgerActor>>,
}

impl LedgerHandles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, token: Token, actor: Arc<dyn LedgerActor>) -> Self {
        self.actors.insert(token, actor);
        self
    }

    pub fn get(&self, token: Token) -> Option<Arc<dyn LedgerActor>> {
        self.actors.get(&token).cloned()
    }

    pub fn tokens(&self) -> Vec<Token> {
        let mut tokens: Vec<Token> = self.actors.keys().copied().collect();
        tokens.sort();
        tokens
    }
}

impl fmt::Debug for LedgerHandles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.tokens()).finish()
    }
}

/// What the authentication layer hands to the engine.
///
/// Any missing piece means "cannot synchronize", never an error.
#[derive(Clone, Debug, Default)]
pub struct Session {
    pub identity: Option<Principal>,
    pub connected: bool,
    pub ledgers: LedgerHandles,
    // the service's own published identity
    pub service_identity: Option<Principal>,
}

impl Session {
    pub fn disconnected(service_identity: Option<Principal>) -> Self {
        Self {
            service_identity,
            ..Self::default()
        }
    }

    pub fn connected(identity: Principal, ledgers: LedgerHandles, service_identity: Option<Principal>) -> Self {
        Self {
            identity: Some(identity),
            connected: true,
            ledgers,
            service_identity,
        }
    }

    /// The balance holder, if the session can act for one.
    pub fn owner(&self) -> Option<Principal> {
        if self.connected { self.identity } else { None }
    }

    pub fn ledger(&self, token: Token) -> Option<Arc<dyn LedgerActor>> {
        self.ledgers.get(token)
    }
}
