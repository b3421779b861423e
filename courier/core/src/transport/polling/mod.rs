//! Polling Transport
//!
//! - [`PollingChannel`]: send and fetch against the HTTP API (or the mock)
//! - [`ReplyPoller`]: polls only while a reply is outstanding
//! - [`MockResponder`]: offline reply buffer used in mock mode

pub mod channel;
pub mod mock;
pub mod poller;

pub use channel::{PollingChannel, SendReceipt};
pub use mock::MockResponder;
pub use poller::ReplyPoller;
