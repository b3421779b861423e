//! Reply Poller
//!
//! Drives the [`PollingChannel`] the way a push transport would look from
//! above: a send kicks off one background task that posts the message, polls
//! straight away, then keeps polling on the configured interval until a reply
//! arrives, a request fails, or `max_polls_per_reply` polls came back empty.
//! Nothing polls while no reply is outstanding.
//!
//! Only one reply is awaited at a time. A send while one is outstanding is
//! rejected with `REQUEST_IN_FLIGHT` rather than queued.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::time::{interval, MissedTickBehavior};

use super::channel::PollingChannel;
use crate::error::ChatError;
use crate::events::{ChatEvent, EventBus};
use crate::schedule::{self, TimerHandle};

#[derive(Debug, Default)]
struct WaitState {
    awaiting: AtomicBool,
    generation: AtomicU64,
    task: Mutex<Option<TimerHandle>>,
}

/// Reopens the send gate when a reply task ends, however it ends
///
/// A task superseded by `stop()` leaves the gate to whoever owns it now.
struct ReleaseOnDrop {
    wait: Arc<WaitState>,
    generation: u64,
}

impl Drop for ReleaseOnDrop {
    fn drop(&mut self) {
        if self.wait.generation.load(Ordering::SeqCst) == self.generation {
            self.wait.awaiting.store(false, Ordering::SeqCst);
        }
    }
}

/// Send-then-poll driver over a polling channel
#[derive(Debug)]
pub struct ReplyPoller {
    channel: Arc<PollingChannel>,
    wait: Arc<WaitState>,
}

impl ReplyPoller {
    /// Wrap a channel
    #[must_use]
    pub fn new(channel: Arc<PollingChannel>) -> Self {
        Self {
            channel,
            wait: Arc::new(WaitState::default()),
        }
    }

    /// The underlying channel
    #[must_use]
    pub fn channel(&self) -> &Arc<PollingChannel> {
        &self.channel
    }

    /// Whether a reply is outstanding
    #[must_use]
    pub fn is_awaiting(&self) -> bool {
        self.wait.awaiting.load(Ordering::SeqCst)
    }

    /// Send `text` and poll for the reply in the background
    ///
    /// Returns `false` when the channel has no token or a reply is still
    /// outstanding. Results arrive on the channel's event bus.
    pub fn send(&self, text: &str) -> bool {
        if !self.channel.is_initialized() {
            tracing::warn!("Send rejected: polling channel not initialized");
            return false;
        }

        if self
            .wait
            .awaiting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::warn!("Send rejected: a reply is still outstanding");
            self.channel
                .bus()
                .emit(&ChatEvent::Error(ChatError::RequestInFlight.info()));
            return false;
        }

        let channel = Arc::clone(&self.channel);
        let release = ReleaseOnDrop {
            wait: Arc::clone(&self.wait),
            generation: self.wait.generation.fetch_add(1, Ordering::SeqCst) + 1,
        };
        let text = text.to_string();
        let handle = schedule::spawn(async move {
            let _release = release;
            let bus = channel.bus().clone();
            await_reply(&channel, &bus, &text).await;
        });
        *self.wait.task.lock() = Some(handle);
        true
    }

    /// Abandon the outstanding reply, if any
    pub fn stop(&self) {
        self.wait.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(task) = self.wait.task.lock().take() {
            task.cancel();
        }
        self.wait.awaiting.store(false, Ordering::SeqCst);
    }
}

impl Drop for ReplyPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn await_reply(channel: &PollingChannel, bus: &EventBus, text: &str) {
    match channel.send_message(text).await {
        Ok(receipt) => tracing::debug!(message_id = ?receipt.message_id, "Message posted"),
        Err(e) => {
            bus.emit(&ChatEvent::Error(e.info()));
            return;
        }
    }

    let max_polls = channel.config().max_polls_per_reply.max(1);
    let mut ticker = interval(channel.config().poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    for poll in 1..=max_polls {
        // First tick completes immediately
        ticker.tick().await;

        match channel.poll_messages().await {
            Ok(messages) => {
                let replied = messages.iter().any(|m| m.is_reply());
                tracing::debug!(poll, received = messages.len(), replied, "Polled");
                for message in messages {
                    bus.emit(&ChatEvent::Message(message));
                }
                if replied {
                    return;
                }
            }
            Err(e) => {
                bus.emit(&ChatEvent::Error(e.info()));
                return;
            }
        }
    }

    tracing::warn!(polls = max_polls, "Gave up waiting for a reply");
    bus.emit(&ChatEvent::Error(ChatError::ResponseTimeout(max_polls).info()));
}
