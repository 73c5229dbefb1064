pub mod account;
pub mod balance;
pub mod watch;
pub mod withdraw;

use dca_wallet_core::balance::synchronizer::BalanceState;
use dca_wallet_core::tokens::token::Token;

/// `In wallet: 1.5 ICP`, or `-` while the balance is unknown.
pub(crate) fn in_wallet(balance: &BalanceState, token: Token) -> String {
    match balance.amount_for(token) {
        Some(amount) => format!("In wallet: {} {}", amount.plain(), token.symbol()),
        None => "-".to_string(),
    }
}
