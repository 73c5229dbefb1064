use std::fmt;
use std::str::FromStr;

use candid::{CandidType, Nat};
use serde::{Deserialize, Serialize};

/// Tokens that can be withdrawn from the service.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, CandidType)]
pub enum Token {
    #[serde(rename = "ICP")]
    Icp,
    #[serde(rename = "ckBTC")]
    CkBtc,
}

/// Withdrawal policy of a token. All amounts are in the token's smallest unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenPolicy {
    pub symbol: &'static str,
    pub decimals: u8,
    // ledger transfer fee (icrc1:fee)
    pub fee: u64,
    // smallest amount that still nets a positive transfer after the fee
    pub min_withdrawal: u64,
}

const ICP_FEE: u64 = 10_000;
const CKBTC_FEE: u64 = 10;

// Indexed by `Token as usize`.
static POLICIES: [TokenPolicy; 2] = [
    TokenPolicy {
        symbol: "ICP",
        decimals: 8,
        fee: ICP_FEE,
        min_withdrawal: ICP_FEE + 1,
    },
    TokenPolicy {
        symbol: "ckBTC",
        decimals: 8,
        fee: CKBTC_FEE,
        min_withdrawal: CKBTC_FEE + 1,
    },
];

impl Token {
    pub const ALL: [Token; 2] = [Token::Icp, Token::CkBtc];

    pub fn policy(self) -> &'static TokenPolicy {
        &POLICIES[self as usize]
    }

    pub fn symbol(self) -> &'static str {
        self.policy().symbol
    }

    pub fn decimals(self) -> u8 {
        self.policy().decimals
    }

    pub fn fee(self) -> Nat {
        Nat::from(self.policy().fee)
    }

    pub fn min_withdrawal(self) -> Nat {
        Nat::from(self.policy().min_withdrawal)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Token {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Token::ALL
            .into_iter()
            .find(|token| token.symbol().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("unknown token `{wanted}` (expected ICP or ckBTC)"))
    }
}
