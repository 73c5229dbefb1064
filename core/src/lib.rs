pub mod balance;
pub mod error;
pub mod ledger;
pub mod tokens;
pub mod withdraw;

#[cfg(test)]
pub(crate) mod test_support;
