use dca_wallet_core::balance::synchronizer::{BalanceState, BalanceSynchronizer};
use dca_wallet_core::tokens::token::Token;
use dca_wallet_core::tokens::token_amount::TokenAmount;
use prettytable::{Cell, Row, Table, format};
use tokio::sync::watch;

use crate::commands::in_wallet;
use crate::context::WalletContext;
use crate::error::AppResult;

/// One balance query per token, printed as a table.
pub async fn balance(ctx: &WalletContext, token: Option<Token>) -> AppResult<()> {
    let tokens = match token {
        Some(token) => vec![token],
        None => Token::ALL.to_vec(),
    };

    let (_selection, selection_rx) = watch::channel(None);
    let synchronizer = BalanceSynchronizer::new(ctx.subscribe(), selection_rx, ctx.config.poll_interval);

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_NO_LINESEP_WITH_TITLE);
    table.set_titles(Row::new(vec![
        Cell::new("Token"),
        Cell::new("Balance"),
        Cell::new("Fee"),
        Cell::new("Minimum withdrawal"),
    ]));

    for token in tokens {
        let shown = match synchronizer.fetch(token).await {
            Ok(Some(snapshot)) => in_wallet(&BalanceState::Known(snapshot), token),
            Ok(None) => in_wallet(&BalanceState::Unknown, token),
            Err(err) => format!("error: {}", err.reason()),
        };

        table.add_row(Row::new(vec![
            Cell::new(token.symbol()),
            Cell::new(&shown),
            Cell::new(&TokenAmount::from_units(token, token.fee()).plain()),
            Cell::new(&TokenAmount::from_units(token, token.min_withdrawal()).plain()),
        ]));
    }

    if ctx.session().owner().is_none() {
        println!("No identity connected; balances are unknown.\n");
    }
    table.printstd();
    Ok(())
}
