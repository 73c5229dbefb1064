use std::env;
use std::path::PathBuf;
use std::time::Duration;

use candid::Principal;
use dca_wallet_commons::env::env_flag;
use dca_wallet_commons::error::{CodedError, ErrorCode, ExternalError};
use dca_wallet_core::balance::synchronizer::DEFAULT_POLL_INTERVAL;
use dca_wallet_core::tokens::token::Token;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_ICP_LEDGER: &str = "ryjl3-tyaaa-aaaaa-aaaba-cai";
pub const DEFAULT_CKBTC_LEDGER: &str = "mxzaz-hqaaa-aaaar-qaada-cai";

fn expand_tilde(p: &str) -> PathBuf {
    if let Some(stripped) = p.strip_prefix("~/")
        && let Ok(home) = env::var("HOME")
    {
        return PathBuf::from(home).join(stripped);
    }
    PathBuf::from(p)
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required env var {var}")]
    MissingEnv {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("failed to parse principal in {var}")]
    InvalidPrincipal {
        var: &'static str,
        #[source]
        source: ExternalError,
    },
    #[error("invalid value `{value}` for {var}")]
    InvalidValue { var: &'static str, value: String },
    #[error("failed to read identity at {path:?}")]
    ReadIdentity {
        path: PathBuf,
        #[source]
        source: ExternalError,
    },
}

impl CodedError for ConfigError {
    fn code(&self) -> ErrorCode {
        match self {
            ConfigError::MissingEnv { .. } => ErrorCode::ConfigMissingEnv,
            ConfigError::InvalidPrincipal { .. } => ErrorCode::ConfigInvalidPrincipal,
            ConfigError::InvalidValue { .. } => ErrorCode::ConfigInvalidValue,
            ConfigError::ReadIdentity { .. } => ErrorCode::ConfigReadIdentity,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub ic_url: String,
    // unset means the wallet runs disconnected
    pub identity_pem: Option<PathBuf>,
    pub service_principal: Principal,
    pub icp_ledger: Principal,
    pub ckbtc_ledger: Principal,
    pub poll_interval: Duration,
    pub fetch_root_key: bool,
}

impl Config {
    pub fn load() -> ConfigResult<Self> {
        let ic_url = required("IC_URL")?;

        let identity_pem = env::var("IDENTITY_PEM")
            .ok()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .map(|p| expand_tilde(&p));

        let service_principal = principal("SERVICE_PRINCIPAL", &required("SERVICE_PRINCIPAL")?)?;
        let icp_ledger = principal(
            "ICP_LEDGER_ID",
            &env::var("ICP_LEDGER_ID").unwrap_or(DEFAULT_ICP_LEDGER.to_string()),
        )?;
        let ckbtc_ledger = principal(
            "CKBTC_LEDGER_ID",
            &env::var("CKBTC_LEDGER_ID").unwrap_or(DEFAULT_CKBTC_LEDGER.to_string()),
        )?;

        let poll_interval = match env::var("BALANCE_POLL_SECS") {
            Ok(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::InvalidValue {
                        var: "BALANCE_POLL_SECS",
                        value: raw,
                    });
                }
            },
            Err(_) => DEFAULT_POLL_INTERVAL,
        };

        let fetch_root_key = match env::var("FETCH_ROOT_KEY") {
            Ok(raw) => env_flag("FETCH_ROOT_KEY").ok_or(ConfigError::InvalidValue {
                var: "FETCH_ROOT_KEY",
                value: raw,
            })?,
            Err(_) => false,
        };

        debug!("IC url {}", ic_url);
        debug!("Service principal {}", service_principal);

        Ok(Self {
            ic_url,
            identity_pem,
            service_principal,
            icp_ledger,
            ckbtc_ledger,
            poll_interval,
            fetch_root_key,
        })
    }

    pub fn ledger_id(&self, token: Token) -> Principal {
        match token {
            Token::Icp => self.icp_ledger,
            Token::CkBtc => self.ckbtc_ledger,
        }
    }
}

fn required(var: &'static str) -> ConfigResult<String> {
    env::var(var).map_err(|source| ConfigError::MissingEnv { var, source })
}

fn principal(var: &'static str, text: &str) -> ConfigResult<Principal> {
    Principal::from_text(text.trim()).map_err(|e| ConfigError::InvalidPrincipal {
        var,
        source: ExternalError::from(e.to_string()),
    })
}
