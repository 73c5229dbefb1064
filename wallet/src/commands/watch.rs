use dca_wallet_core::balance::synchronizer::BalanceSynchronizer;
use dca_wallet_core::tokens::token::Token;
use tokio::sync::watch;
use tracing::info;

use crate::commands::in_wallet;
use crate::context::WalletContext;
use crate::error::AppResult;

/// Prints every balance the synchronizer publishes until Ctrl-C.
pub async fn watch(ctx: &WalletContext, token: Token) -> AppResult<()> {
    let (_selection, selection_rx) = watch::channel(Some(token));
    let synchronizer = BalanceSynchronizer::new(ctx.subscribe(), selection_rx, ctx.config.poll_interval);
    let mut balances = synchronizer.subscribe();
    let _poller = synchronizer.spawn();

    info!(
        "Watching {} balance every {}s (Ctrl-C to stop)",
        token,
        synchronizer.poll_interval().as_secs()
    );

    loop {
        tokio::select! {
            changed = balances.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = balances.borrow_and_update().clone();
                let observed = state
                    .snapshot()
                    .map(|snapshot| snapshot.observed_at.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!("[{}] {}", observed, in_wallet(&state, token));
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        }
    }

    Ok(())
}
