pub mod actor;
pub mod session;
