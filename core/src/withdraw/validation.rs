use std::collections::BTreeMap;
use std::fmt;

use candid::{Nat, Principal};

use crate::balance::synchronizer::BalanceState;
use crate::error::ConversionError;
use crate::tokens::token_amount::TokenAmount;
use crate::withdraw::form::{AmountInput, WithdrawalDraft, effective_units};

pub const NO_TOKEN: &str = "no token selected";
pub const AMOUNT_REQUIRED: &str = "amount is required";
pub const AMOUNT_ZERO: &str = "amount must be greater than zero";
pub const DESTINATION_REQUIRED: &str = "destination identity is required";
pub const DESTINATION_IS_SERVICE: &str = "must differ from the service's own identity";
pub const DESTINATION_MALFORMED: &str = "destination is not a valid principal";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FormField {
    Token,
    Amount,
    Destination,
    // last transfer failure; never blocks submission
    Result,
}

impl fmt::Display for FormField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FormField::Token => "token",
            FormField::Amount => "amount",
            FormField::Destination => "destination",
            FormField::Result => "result",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    pub messages: BTreeMap<FormField, String>,
    pub may_submit: bool,
}

impl ValidationResult {
    pub fn message(&self, field: FormField) -> Option<&str> {
        self.messages.get(&field).map(String::as_str)
    }

    /// Messages of the fields that block submission.
    pub fn blocking(&self) -> impl Iterator<Item = (FormField, &str)> {
        self.messages
            .iter()
            .filter(|(field, _)| **field != FormField::Result)
            .map(|(field, message)| (*field, message.as_str()))
    }
}

/// Evaluates every field independently; one failing field never hides another.
pub fn validate(
    draft: &WithdrawalDraft,
    balance: &BalanceState,
    service_identity: Option<Principal>,
    last_failure: Option<&str>,
    in_flight: bool,
) -> ValidationResult {
    let mut messages = BTreeMap::new();

    if draft.token.is_none() {
        messages.insert(FormField::Token, NO_TOKEN.to_string());
    }
    if let Some(message) = check_amount(draft, balance) {
        messages.insert(FormField::Amount, message);
    }
    if let Some(message) = check_destination(&draft.destination, service_identity) {
        messages.insert(FormField::Destination, message);
    }

    let blocked = !messages.is_empty();
    if let Some(reason) = last_failure {
        messages.insert(FormField::Result, reason.to_string());
    }

    ValidationResult {
        messages,
        may_submit: !blocked && !in_flight,
    }
}

fn check_amount(draft: &WithdrawalDraft, balance: &BalanceState) -> Option<String> {
    let Some(token) = draft.token else {
        // without a token only the shape of the input can be judged
        return match &draft.amount {
            AmountInput::Empty if !draft.maximum => Some(AMOUNT_REQUIRED.to_string()),
            AmountInput::Invalid { error, .. } => Some(invalid_amount(error)),
            AmountInput::Value(value) if value.is_zero() => Some(AMOUNT_ZERO.to_string()),
            _ => None,
        };
    };

    let units = match effective_units(draft, token, balance) {
        Ok(units) => units,
        Err(ConversionError::Empty) => return Some(AMOUNT_REQUIRED.to_string()),
        Err(err) => return Some(invalid_amount(&err)),
    };

    if units == Nat::from(0u8) {
        return Some(AMOUNT_ZERO.to_string());
    }

    let minimum = token.min_withdrawal();
    if units < minimum {
        let minimum = TokenAmount::from_units(token, minimum);
        return Some(format!("amount is below the minimum of {} {}", minimum.plain(), token.symbol()));
    }

    None
}

fn invalid_amount(err: &ConversionError) -> String {
    format!("invalid amount: {err}")
}

fn check_destination(destination: &str, service_identity: Option<Principal>) -> Option<String> {
    let destination = destination.trim();
    if destination.is_empty() {
        return Some(DESTINATION_REQUIRED.to_string());
    }

    // checked before syntax so a pasted service id is always called out
    if let Some(service) = service_identity {
        let parsed = Principal::from_text(destination).ok();
        if destination == service.to_text() || parsed == Some(service) {
            return Some(DESTINATION_IS_SERVICE.to_string());
        }
    }

    if Principal::from_text(destination).is_err() {
        return Some(DESTINATION_MALFORMED.to_string());
    }

    None
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::balance::synchronizer::BalanceSnapshot;
    use crate::test_support::{owner, service, wallet};
    use crate::tokens::token::Token;

    fn draft(token: Option<Token>, amount: AmountInput, destination: &str) -> WithdrawalDraft {
        WithdrawalDraft {
            token,
            amount,
            maximum: false,
            destination: destination.to_string(),
        }
    }

    fn known(token: Token, units: u64) -> BalanceState {
        BalanceState::Known(BalanceSnapshot {
            owner: owner(),
            amount: TokenAmount::from_units(token, units),
            observed_at: Utc::now(),
        })
    }

    #[test]
    fn valid_draft_may_submit() {
        let draft = draft(Some(Token::Icp), AmountInput::Value(dec!(1)), &wallet().to_text());

        let result = validate(&draft, &BalanceState::Unknown, Some(service()), None, false);

        assert!(result.messages.is_empty());
        assert!(result.may_submit);
    }

    #[test]
    fn every_field_is_reported_independently() {
        // given: nothing filled in
        let draft = draft(None, AmountInput::Empty, "");

        // when
        let result = validate(&draft, &BalanceState::Unknown, Some(service()), None, false);

        // then
        assert_eq!(result.message(FormField::Token), Some(NO_TOKEN));
        assert_eq!(result.message(FormField::Amount), Some(AMOUNT_REQUIRED));
        assert_eq!(result.message(FormField::Destination), Some(DESTINATION_REQUIRED));
        assert!(!result.may_submit);
    }

    #[test]
    fn amount_equal_to_minimum_is_accepted() {
        let destination = wallet().to_text();

        let at_minimum = draft(Some(Token::Icp), AmountInput::Value(dec!(0.00010001)), &destination);
        let below = draft(Some(Token::Icp), AmountInput::Value(dec!(0.0001)), &destination);

        let accepted = validate(&at_minimum, &BalanceState::Unknown, None, None, false);
        let rejected = validate(&below, &BalanceState::Unknown, None, None, false);

        assert_eq!(accepted.message(FormField::Amount), None);
        assert_eq!(
            rejected.message(FormField::Amount),
            Some("amount is below the minimum of 0.00010001 ICP")
        );
        assert!(!rejected.may_submit);
    }

    #[test]
    fn ckbtc_minimum_is_eleven_units() {
        let destination = wallet().to_text();

        let at_minimum = draft(Some(Token::CkBtc), AmountInput::Value(dec!(0.00000011)), &destination);
        let below = draft(Some(Token::CkBtc), AmountInput::Value(dec!(0.0000001)), &destination);

        assert!(validate(&at_minimum, &BalanceState::Unknown, None, None, false).may_submit);
        assert!(!validate(&below, &BalanceState::Unknown, None, None, false).may_submit);
    }

    #[test]
    fn digits_beyond_precision_do_not_lift_an_amount_over_the_minimum() {
        // 0.000100009 truncates to 10_000 units, one short of the minimum
        let draft = draft(Some(Token::Icp), AmountInput::Value(dec!(0.000100009)), &wallet().to_text());

        let result = validate(&draft, &BalanceState::Unknown, None, None, false);

        assert!(result.message(FormField::Amount).is_some());
    }

    #[test]
    fn zero_amount_is_rejected() {
        let draft = draft(Some(Token::Icp), AmountInput::Value(dec!(0)), &wallet().to_text());

        let result = validate(&draft, &BalanceState::Unknown, None, None, false);

        assert_eq!(result.message(FormField::Amount), Some(AMOUNT_ZERO));
    }

    #[test]
    fn unparsable_amount_is_reported() {
        let draft = draft(Some(Token::Icp), AmountInput::parse("1.2.3"), &wallet().to_text());

        let result = validate(&draft, &BalanceState::Unknown, None, None, false);

        assert_eq!(result.message(FormField::Amount), Some("invalid amount: malformed amount `1.2.3`"));
    }

    #[test]
    fn maximum_without_balance_cannot_satisfy_the_minimum() {
        let mut draft = draft(Some(Token::Icp), AmountInput::Value(dec!(0)), &wallet().to_text());
        draft.maximum = true;

        let result = validate(&draft, &BalanceState::Unknown, None, None, false);

        assert_eq!(result.message(FormField::Amount), Some(AMOUNT_ZERO));
        assert!(!result.may_submit);
    }

    #[test]
    fn maximum_uses_balance_minus_fee() {
        // balance 20_000 leaves 10_000 after the fee, below the 10_001 minimum
        let mut draft = draft(Some(Token::Icp), AmountInput::Value(dec!(0)), &wallet().to_text());
        draft.maximum = true;

        let short = validate(&draft, &known(Token::Icp, 20_000), None, None, false);
        let enough = validate(&draft, &known(Token::Icp, 20_001), None, None, false);

        assert!(short.message(FormField::Amount).is_some());
        assert!(enough.may_submit);
    }

    #[test]
    fn service_identity_is_rejected_as_destination() {
        // given: the user pasted the service principal
        let draft = draft(Some(Token::Icp), AmountInput::Value(dec!(1)), &service().to_text());

        // when
        let result = validate(&draft, &BalanceState::Unknown, Some(service()), None, false);

        // then
        assert_eq!(result.message(FormField::Destination), Some(DESTINATION_IS_SERVICE));
        assert!(!result.may_submit);
    }

    #[test]
    fn malformed_destination_is_rejected() {
        let draft = draft(Some(Token::Icp), AmountInput::Value(dec!(1)), "not a principal");

        let result = validate(&draft, &BalanceState::Unknown, Some(service()), None, false);

        assert_eq!(result.message(FormField::Destination), Some(DESTINATION_MALFORMED));
    }

    #[test]
    fn last_failure_is_shown_but_does_not_block() {
        let draft = draft(Some(Token::Icp), AmountInput::Value(dec!(1)), &wallet().to_text());

        let result = validate(&draft, &BalanceState::Unknown, None, Some("InsufficientFunds"), false);

        assert_eq!(result.message(FormField::Result), Some("InsufficientFunds"));
        assert!(result.may_submit);
        assert_eq!(result.blocking().count(), 0);
    }

    #[test]
    fn in_flight_blocks_submission() {
        let draft = draft(Some(Token::Icp), AmountInput::Value(dec!(1)), &wallet().to_text());

        let result = validate(&draft, &BalanceState::Unknown, None, None, true);

        assert!(result.messages.is_empty());
        assert!(!result.may_submit);
    }
}
