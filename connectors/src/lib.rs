pub mod agent;
pub mod error;
pub mod identity;
pub mod ledger;
