//! Quota fetching: the `GetUserStatus` client and its payload parser.

pub mod client;
pub mod parser;
pub mod types;

pub use client::QuotaClient;
pub use parser::parse_user_status;
pub use types::{QuotaEntry, QuotaSnapshot};
