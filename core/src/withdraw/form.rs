use candid::{Nat, Principal};
use icrc_ledger_types::icrc1::account::Account;
use rust_decimal::Decimal;
use tracing::debug;

use crate::balance::synchronizer::BalanceState;
use crate::error::ConversionError;
use crate::tokens::token::Token;
use crate::tokens::token_amount::{TokenAmount, parse_decimal, to_base_units};
use crate::withdraw::submitter::{SubmissionResult, TransferOutcome, TransferRequest};
use crate::withdraw::validation::{ValidationResult, validate};

/// The amount field as the user left it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AmountInput {
    #[default]
    Empty,
    Value(Decimal),
    Invalid {
        raw: String,
        error: ConversionError,
    },
}

impl AmountInput {
    pub fn parse(raw: &str) -> Self {
        match parse_decimal(raw) {
            Ok(value) => AmountInput::Value(value),
            Err(ConversionError::Empty) => AmountInput::Empty,
            Err(error) => AmountInput::Invalid {
                raw: raw.to_string(),
                error,
            },
        }
    }

    pub fn zero() -> Self {
        AmountInput::Value(Decimal::ZERO)
    }

    /// Text to put back into an input field.
    pub fn display(&self) -> String {
        match self {
            AmountInput::Empty => String::new(),
            AmountInput::Value(value) => value.normalize().to_string(),
            AmountInput::Invalid { raw, .. } => raw.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalDraft {
    pub token: Option<Token>,
    pub amount: AmountInput,
    // withdraw everything minus the fee
    pub maximum: bool,
    pub destination: String,
}

impl Default for WithdrawalDraft {
    fn default() -> Self {
        Self {
            token: None,
            amount: AmountInput::zero(),
            maximum: true,
            destination: String::new(),
        }
    }
}

/// Amount that would be submitted for `token`, in smallest units.
///
/// With the maximum flag set this is `max(balance - fee, 0)`, or zero while
/// the balance is unknown. Otherwise it is the typed amount truncated to the
/// token's precision.
pub fn effective_units(draft: &WithdrawalDraft, token: Token, balance: &BalanceState) -> Result<Nat, ConversionError> {
    if draft.maximum {
        return Ok(maximum_amount(token, balance).value);
    }

    match &draft.amount {
        AmountInput::Empty => Err(ConversionError::Empty),
        AmountInput::Invalid { error, .. } => Err(error.clone()),
        AmountInput::Value(value) => to_base_units(*value, token.decimals()),
    }
}

fn maximum_amount(token: Token, balance: &BalanceState) -> TokenAmount {
    balance
        .amount_for(token)
        .map(|amount| amount.saturating_sub(&token.fee()))
        .unwrap_or_else(|| TokenAmount::zero(token))
}

/// Draft, latest balance and transfer lifecycle of one withdraw form.
#[derive(Debug, Clone)]
pub struct WithdrawForm {
    draft: WithdrawalDraft,
    balance: BalanceState,
    outcome: TransferOutcome,
    last_failure: Option<String>,
    service_identity: Option<Principal>,
    next_ticket: u64,
}

impl WithdrawForm {
    pub fn new(service_identity: Option<Principal>) -> Self {
        Self {
            draft: WithdrawalDraft::default(),
            balance: BalanceState::Unknown,
            outcome: TransferOutcome::Idle,
            last_failure: None,
            service_identity,
            next_ticket: 1,
        }
    }

    pub fn draft(&self) -> &WithdrawalDraft {
        &self.draft
    }

    pub fn balance(&self) -> &BalanceState {
        &self.balance
    }

    pub fn outcome(&self) -> &TransferOutcome {
        &self.outcome
    }

    pub fn last_failure(&self) -> Option<&str> {
        self.last_failure.as_deref()
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self.outcome, TransferOutcome::InFlight { .. })
    }

    /// Switching tokens drops the stale balance, the amount and the last
    /// result. The destination stays.
    pub fn select_token(&mut self, token: Option<Token>) {
        if self.draft.token == token {
            return;
        }

        self.draft.token = token;
        self.balance = BalanceState::Unknown;
        self.draft.amount = AmountInput::zero();
        self.last_failure = None;
        if !self.is_in_flight() {
            self.outcome = TransferOutcome::Idle;
        }
    }

    /// Ignored while the maximum flag is set.
    pub fn set_amount(&mut self, raw: &str) -> bool {
        if self.draft.maximum {
            debug!("[withdraw] amount input ignored while maximum is set");
            return false;
        }
        self.draft.amount = AmountInput::parse(raw);
        true
    }

    /// On: amount becomes the maximum (zero while the balance is unknown).
    /// Off: amount resets to zero; the previous manual amount is not restored.
    pub fn set_maximum(&mut self, on: bool) {
        self.draft.maximum = on;
        self.draft.amount = if on { self.maximum_input() } else { AmountInput::zero() };
    }

    pub fn set_destination(&mut self, destination: impl Into<String>) {
        self.draft.destination = destination.into();
    }

    pub fn set_service_identity(&mut self, service_identity: Option<Principal>) {
        self.service_identity = service_identity;
    }

    /// Applies a balance publication. A balance of another token is ignored;
    /// with the maximum flag set the amount follows every fresh balance.
    pub fn on_balance(&mut self, balance: BalanceState) {
        let applies = match (&balance, self.draft.token) {
            (BalanceState::Unknown, _) => true,
            (BalanceState::Known(snapshot), Some(token)) => snapshot.amount.token == token,
            (BalanceState::Known(_), None) => false,
        };
        if !applies {
            return;
        }

        self.balance = balance;
        if self.draft.maximum {
            self.draft.amount = self.maximum_input();
        }
    }

    pub fn effective_amount(&self) -> Option<TokenAmount> {
        let token = self.draft.token?;
        effective_units(&self.draft, token, &self.balance)
            .ok()
            .map(|units| TokenAmount::from_units(token, units))
    }

    pub fn validate(&self) -> ValidationResult {
        validate(
            &self.draft,
            &self.balance,
            self.service_identity,
            self.last_failure.as_deref(),
            self.is_in_flight(),
        )
    }

    /// Starts a submission if the form is submittable and idle.
    ///
    /// Returns the request to execute, or `None` (and changes nothing) when
    /// validation fails or a transfer is already in flight.
    pub fn begin_submission(&mut self) -> Option<TransferRequest> {
        if !self.validate().may_submit {
            return None;
        }

        let token = self.draft.token?;
        let amount = effective_units(&self.draft, token, &self.balance).ok()?;
        let owner = Principal::from_text(self.draft.destination.trim()).ok()?;

        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.outcome = TransferOutcome::InFlight { ticket };
        self.last_failure = None;

        Some(TransferRequest {
            ticket,
            token,
            to: Account { owner, subaccount: None },
            amount,
            fee: token.fee(),
        })
    }

    /// Records the result of submission `ticket`. Results of any other ticket
    /// are dropped.
    pub fn complete_submission(&mut self, ticket: u64, result: SubmissionResult) -> bool {
        if self.outcome != (TransferOutcome::InFlight { ticket }) {
            return false;
        }

        self.outcome = match result {
            SubmissionResult::Succeeded { block_index } => TransferOutcome::Succeeded { ticket, block_index },
            SubmissionResult::Failed { reason } => {
                self.last_failure = Some(reason.clone());
                TransferOutcome::Failed { reason }
            }
        };
        true
    }

    /// Ends the success window of `ticket`: back to idle with the amount and
    /// destination reset.
    pub fn clear_success(&mut self, ticket: u64) -> bool {
        if !matches!(self.outcome, TransferOutcome::Succeeded { ticket: done, .. } if done == ticket) {
            return false;
        }

        self.outcome = TransferOutcome::Idle;
        self.draft.amount = if self.draft.maximum { self.maximum_input() } else { AmountInput::zero() };
        self.draft.destination.clear();
        true
    }

    fn maximum_input(&self) -> AmountInput {
        let Some(token) = self.draft.token else {
            return AmountInput::zero();
        };

        match maximum_amount(token, &self.balance).to_decimal() {
            Ok(value) => AmountInput::Value(value),
            Err(error) => AmountInput::Invalid {
                raw: String::new(),
                error,
            },
        }
    }
}
