use dca_wallet_commons::env::config_dir;
use dca_wallet_core::tokens::token::Token;
use prettytable::{Cell, Row, Table, format};

use crate::context::WalletContext;

pub fn show(ctx: &WalletContext) {
    let session = ctx.session();

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_NO_LINESEP_WITH_TITLE);
    table.set_titles(Row::new(vec![Cell::new("Role"), Cell::new("Principal")]));

    let identity = match session.owner() {
        Some(principal) => principal.to_text(),
        None => "not connected".to_string(),
    };
    table.add_row(Row::new(vec![Cell::new("Connected identity"), Cell::new(&identity)]));
    table.add_row(Row::new(vec![
        Cell::new("Service identity"),
        Cell::new(&ctx.config.service_principal.to_text()),
    ]));
    for token in Token::ALL {
        table.add_row(Row::new(vec![
            Cell::new(&format!("{} ledger", token.symbol())),
            Cell::new(&ctx.config.ledger_id(token).to_text()),
        ]));
    }

    table.printstd();
    println!("\nConfig file: {}", config_dir().join("config.env").display());
}
