mod commands;
mod config;
mod context;
mod error;

use clap::{Parser, Subcommand};
use dca_wallet_commons::env::load_env;
use dca_wallet_commons::error::format_with_code;
use dca_wallet_commons::telemetry::init_telemetry_from_env;
use dca_wallet_core::tokens::token::Token;

use crate::commands::withdraw::WithdrawArgs;
use crate::config::Config;
use crate::context::init_context;

#[derive(Parser)]
#[command(name = "dca-wallet")]
#[command(about = "Wallet CLI to check ICP and ckBTC balances and withdraw funds to another principal.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    // Shows wallet token balances
    Balance {
        // Only show this token (ICP or ckBTC)
        #[arg(long)]
        token: Option<Token>,
    },

    // Withdraws funds. Without flags, starts the interactive wizard.
    // With flags, performs a non-interactive withdrawal.
    Withdraw {
        // Token symbol: ICP or ckBTC
        #[arg(long)]
        token: Option<Token>,
        // Destination principal
        #[arg(long)]
        destination: Option<String>,
        // Amount as decimal (respects token decimals)
        #[arg(long, conflicts_with = "max")]
        amount: Option<String>,
        // Withdraw the whole balance minus the ledger fee
        #[arg(long)]
        max: bool,
    },

    // Polls one balance and prints every change until interrupted
    Watch {
        #[arg(long, default_value = "ICP")]
        token: Token,
    },

    // Shows the connected identity, the service identity and the ledgers
    Account,
}

#[tokio::main]
async fn main() {
    load_env();
    let cli = Cli::parse();

    let _telemetry_guard = match init_telemetry_from_env() {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("Failed to initialize telemetry: {err}");
            return;
        }
    };

    let config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Invalid configuration: {}", format_with_code(&err));
            return;
        }
    };

    let ctx = match init_context(config).await {
        Ok(ctx) => ctx,
        Err(err) => {
            eprintln!("Failed to connect: {}", format_with_code(&err));
            return;
        }
    };

    match cli.command {
        Commands::Balance { token } => {
            if let Err(err) = commands::balance::balance(&ctx, token).await {
                eprintln!("Balance check failed: {}", format_with_code(&err));
            }
        }
        Commands::Withdraw {
            token,
            destination,
            amount,
            max,
        } => {
            let args = WithdrawArgs {
                token,
                destination,
                amount,
                max,
            };
            if let Err(err) = commands::withdraw::withdraw(&ctx, args).await {
                eprintln!("Withdraw failed: {}", format_with_code(&err));
            }
        }
        Commands::Watch { token } => {
            if let Err(err) = commands::watch::watch(&ctx, token).await {
                eprintln!("Watch failed: {}", format_with_code(&err));
            }
        }
        Commands::Account => commands::account::show(&ctx),
    }
}
