//! SMS gateway - receives forwarded SMS and serves verification codes.
//!
//! A capture agent on a phone posts every incoming SMS here. The gateway
//! extracts the verification code and the receiving phone number, stores
//! the message, and lets clients wait for the latest code sent to a number.

pub mod api;
pub mod config;
pub mod error;
pub mod storage;

pub use config::Config;
pub use error::GatewayError;
pub use storage::{open_store, SqliteRecordStore};
