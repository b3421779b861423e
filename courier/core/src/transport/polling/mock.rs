//! Offline Responder
//!
//! Stands in for the chat API when the polling channel runs in mock mode.
//! One reply slot moves through three states:
//!
//! ```text
//! Empty --send--> Sending --send delay--> Ready --poll--> Empty
//! ```
//!
//! A poll while `Sending` returns nothing and leaves the slot alone.
//! [`MockResponder::reset`] empties the slot and invalidates any send still
//! sleeping, so a reply can never surface after a reset.

use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;

use crate::messages::{ChatText, MessageId, NormalizedMessage, SenderRole};
use crate::schedule;

/// Replies served in rotation
const CANNED_REPLIES: &[&str] = &[
    "Thank you for reaching out. Can you tell me more about what you're experiencing?",
    "I understand. How long have you been having these symptoms?",
    "On a scale from 1 to 10, how would you rate your discomfort right now?",
    "Thanks for the details. Are you currently taking any medications?",
    "I'm connecting this with your care team. Is there anything else you'd like to add?",
];

#[derive(Debug, Default)]
enum Slot {
    #[default]
    Empty,
    Sending,
    Ready(NormalizedMessage),
}

#[derive(Debug, Default)]
struct MockState {
    slot: Slot,
    generation: u64,
    rotation: usize,
    sent: u64,
}

/// In-memory reply buffer for mock mode
#[derive(Debug)]
pub struct MockResponder {
    state: Mutex<MockState>,
    send_delay: Duration,
    poll_delay: Duration,
}

impl MockResponder {
    /// Create a responder with simulated latencies
    #[must_use]
    pub fn new(send_delay: Duration, poll_delay: Duration) -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            send_delay,
            poll_delay,
        }
    }

    /// Accept a user message and stage the next canned reply
    ///
    /// Returns the id assigned to the user's message.
    pub async fn send(&self, text: &str) -> String {
        let (generation, message_id) = {
            let mut st = self.state.lock();
            st.slot = Slot::Sending;
            st.sent += 1;
            (st.generation, format!("mock-user-{}", st.sent))
        };
        tracing::debug!(len = text.len(), "Mock send");

        schedule::delay(self.send_delay).await;

        let mut st = self.state.lock();
        if st.generation != generation {
            tracing::debug!("Mock reply discarded after reset");
            return message_id;
        }

        let reply = CANNED_REPLIES[st.rotation % CANNED_REPLIES.len()];
        st.rotation += 1;
        st.slot = Slot::Ready(NormalizedMessage::Text(ChatText {
            id: MessageId(format!("mock-reply-{}", st.rotation)),
            text: reply.to_string(),
            sender: SenderRole::Assistant,
            timestamp: Utc::now(),
        }));
        message_id
    }

    /// Hand out the staged reply, if any
    pub async fn poll(&self) -> Vec<NormalizedMessage> {
        schedule::delay(self.poll_delay).await;

        let mut st = self.state.lock();
        match std::mem::take(&mut st.slot) {
            Slot::Ready(message) => vec![message],
            Slot::Sending => {
                st.slot = Slot::Sending;
                Vec::new()
            }
            Slot::Empty => Vec::new(),
        }
    }

    /// Drop any staged or in-flight reply
    pub fn reset(&self) {
        let mut st = self.state.lock();
        st.slot = Slot::Empty;
        st.generation += 1;
    }
}
