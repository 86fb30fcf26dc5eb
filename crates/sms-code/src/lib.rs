//! Verification code extraction and latest-code lookup for forwarded SMS.
//!
//! Messages forwarded by a capture agent are stored together with the
//! verification code and phone number extracted from them. Clients then ask
//! for the latest code sent to a phone number and wait a bounded time for
//! one to arrive.

mod clock;
mod error;
mod extract;
mod resolver;
mod service;
mod store;
mod types;
mod wait;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{SmsError, SmsResult};
pub use extract::{extract_code, extract_phone};
pub use resolver::{LatestCodeResolver, LookupPolicy};
pub use service::CodeService;
pub use store::{recency_order, MemoryRecordStore, RecordStore};
pub use types::*;
pub use wait::WaitForCode;
