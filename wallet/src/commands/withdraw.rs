use std::time::Duration;

use dca_wallet_core::tokens::token::Token;
use dca_wallet_core::tokens::token_amount::{TokenAmount, parse_decimal};
use dca_wallet_core::withdraw::form::AmountInput;
use dca_wallet_core::withdraw::session::{FormView, WithdrawHandle, WithdrawSessionConfig, spawn_withdraw_session};
use dca_wallet_core::withdraw::submitter::TransferOutcome;
use dialoguer::{Confirm, Input, Select, theme::ColorfulTheme};
use prettytable::{Cell, Row, Table, format};
use tracing::warn;

use crate::commands::in_wallet;
use crate::context::WalletContext;
use crate::error::{AppError, AppResult};

// how long to wait for the first balance before going on without it
const BALANCE_WAIT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Default)]
pub struct WithdrawArgs {
    pub token: Option<Token>,
    pub destination: Option<String>,
    pub amount: Option<String>,
    pub max: bool,
}

impl WithdrawArgs {
    fn is_interactive(&self) -> bool {
        self.token.is_none() && self.destination.is_none() && self.amount.is_none() && !self.max
    }
}

struct Plan {
    token: Token,
    maximum: bool,
    amount: Option<String>,
    destination: String,
}

pub async fn withdraw(ctx: &WalletContext, args: WithdrawArgs) -> AppResult<()> {
    let handle = spawn_withdraw_session(
        ctx.subscribe(),
        WithdrawSessionConfig {
            poll_interval: ctx.config.poll_interval,
            ..WithdrawSessionConfig::default()
        },
    );
    let connected = ctx.session().owner().is_some();

    if args.is_interactive() {
        wizard(&handle, connected).await
    } else {
        non_interactive(&handle, connected, args).await
    }
}

async fn non_interactive(handle: &WithdrawHandle, connected: bool, args: WithdrawArgs) -> AppResult<()> {
    let token = args.token.ok_or_else(|| AppError::command("--token is required"))?;
    let destination = args
        .destination
        .ok_or_else(|| AppError::command("--destination is required"))?;
    if !args.max && args.amount.is_none() {
        return Err(AppError::command("either --amount or --max is required"));
    }

    load_balance(handle, token, connected).await?;
    let plan = Plan {
        token,
        maximum: args.max,
        amount: args.amount,
        destination,
    };

    let view = apply(handle, &plan).await?;
    print_summary(&view);
    ensure_submittable(&view)?;
    submit_and_wait(handle).await
}

async fn wizard(handle: &WithdrawHandle, connected: bool) -> AppResult<()> {
    let theme = ColorfulTheme::default();
    println!("\n=== Withdraw Wizard ===\n");

    // Step 1: token
    let labels: Vec<&str> = Token::ALL.iter().map(|token| token.symbol()).collect();
    let token_idx = Select::with_theme(&theme)
        .with_prompt("Select token to withdraw")
        .default(0)
        .items(&labels)
        .interact()?;
    let token = Token::ALL[token_idx];

    let view = load_balance(handle, token, connected).await?;
    println!("{}", in_wallet(&view.balance, token));

    // Step 2: maximum or a typed amount
    let fee = TokenAmount::from_units(token, token.fee());
    let maximum = Confirm::with_theme(&theme)
        .with_prompt(format!("Withdraw maximum (balance minus the {} {} fee)?", fee.plain(), token))
        .default(true)
        .interact()?;

    let amount = if maximum {
        None
    } else {
        let typed: String = Input::with_theme(&theme)
            .with_prompt(format!("Enter amount in {}", token))
            .validate_with(|input: &String| -> Result<(), String> {
                parse_decimal(input).map(|_| ()).map_err(|e| e.to_string())
            })
            .interact_text()?;
        Some(typed)
    };

    // Step 3: destination
    let destination: String = Input::with_theme(&theme)
        .with_prompt("Destination principal")
        .interact_text()?;

    let plan = Plan {
        token,
        maximum,
        amount,
        destination: destination.trim().to_string(),
    };
    let view = apply(handle, &plan).await?;
    print_summary(&view);
    ensure_submittable(&view)?;

    // Step 4: confirm
    let confirmed = Confirm::with_theme(&theme)
        .with_prompt("Send this withdrawal?")
        .default(false)
        .interact()?;
    if !confirmed {
        println!("Withdrawal cancelled.");
        return Ok(());
    }

    submit_and_wait(handle).await
}

async fn load_balance(handle: &WithdrawHandle, token: Token, connected: bool) -> AppResult<FormView> {
    handle.select_token(Some(token)).map_err(|_| AppError::SessionClosed)?;

    if !connected {
        warn!("No identity connected; the {} balance stays unknown", token);
        return handle
            .wait_for(|view| view.draft.token == Some(token))
            .await
            .ok_or(AppError::SessionClosed);
    }

    let loaded = tokio::time::timeout(
        BALANCE_WAIT,
        handle.wait_for(|view| view.draft.token == Some(token) && view.balance.amount_for(token).is_some()),
    )
    .await;

    match loaded {
        Ok(Some(view)) => Ok(view),
        Ok(None) => Err(AppError::SessionClosed),
        Err(_) => {
            warn!("{} balance not available after {}s", token, BALANCE_WAIT.as_secs());
            Ok(handle.view())
        }
    }
}

async fn apply(handle: &WithdrawHandle, plan: &Plan) -> AppResult<FormView> {
    let closed = |_| AppError::SessionClosed;

    handle.set_maximum(plan.maximum).map_err(closed)?;
    let expected_amount = match (&plan.amount, plan.maximum) {
        (Some(amount), false) => {
            handle.set_amount(amount.clone()).map_err(closed)?;
            Some(AmountInput::parse(amount))
        }
        _ => None,
    };
    handle.set_destination(plan.destination.clone()).map_err(closed)?;

    handle
        .wait_for(|view| {
            view.draft.token == Some(plan.token)
                && view.draft.maximum == plan.maximum
                && view.draft.destination == plan.destination
                && expected_amount.as_ref().is_none_or(|amount| view.draft.amount == *amount)
        })
        .await
        .ok_or(AppError::SessionClosed)
}

fn ensure_submittable(view: &FormView) -> AppResult<()> {
    if view.validation.may_submit {
        return Ok(());
    }

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_NO_LINESEP_WITH_TITLE);
    table.set_titles(Row::new(vec![Cell::new("Field"), Cell::new("Problem")]));
    for (field, message) in view.validation.blocking() {
        table.add_row(Row::new(vec![Cell::new(&field.to_string()), Cell::new(message)]));
    }
    table.printstd();

    Err(AppError::command("withdrawal is not valid"))
}

async fn submit_and_wait(handle: &WithdrawHandle) -> AppResult<()> {
    handle.submit().map_err(|_| AppError::SessionClosed)?;

    let done = handle
        .wait_for(|view| {
            matches!(
                view.outcome,
                TransferOutcome::Succeeded { .. } | TransferOutcome::Failed { .. }
            )
        })
        .await
        .ok_or(AppError::SessionClosed)?;

    match done.outcome {
        TransferOutcome::Succeeded { block_index, .. } => {
            println!("Withdrawal sent at block {}", block_index);
            Ok(())
        }
        TransferOutcome::Failed { reason } => Err(AppError::command(format!("withdrawal failed: {reason}"))),
        _ => Err(AppError::SessionClosed),
    }
}

fn print_summary(view: &FormView) {
    let Some(token) = view.draft.token else {
        return;
    };

    let amount = view
        .effective_amount
        .as_ref()
        .map(|amount| format!("{} {}", amount.plain(), token))
        .unwrap_or_else(|| "-".to_string());
    let fee = TokenAmount::from_units(token, token.fee());

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_NO_LINESEP_WITH_TITLE);
    table.set_titles(Row::new(vec![Cell::new("Withdrawal"), Cell::new("")]));
    table.add_row(Row::new(vec![Cell::new("Token"), Cell::new(token.symbol())]));
    table.add_row(Row::new(vec![Cell::new("Balance"), Cell::new(&in_wallet(&view.balance, token))]));
    table.add_row(Row::new(vec![Cell::new("Amount"), Cell::new(&amount)]));
    table.add_row(Row::new(vec![
        Cell::new("Network fee"),
        Cell::new(&format!("{} {}", fee.plain(), token)),
    ]));
    table.add_row(Row::new(vec![Cell::new("Destination"), Cell::new(&view.draft.destination)]));
    table.printstd();
}
