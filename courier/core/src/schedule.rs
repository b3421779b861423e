//! Timer Scheduling
//!
//! Every delayed or recurring action in the core (keep-alive pings, reconnect
//! delays, polling cadence) is a tokio task owned by exactly one [`TimerHandle`].
//! This module is the only place production code is allowed to sleep.
//!
//! - Dropping the handle aborts the task.
//! - [`TimerHandle::cancel`] aborts explicitly.
//! - [`TimerHandle::release`] gives the handle up without aborting. A timer task
//!   uses this to clear its own slot once it has fired, so the owner does not
//!   abort the very task that is running.

use std::future::Future;
use std::time::Duration;

use tokio::task::AbortHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Owning handle to a scheduled task
#[derive(Debug)]
#[must_use = "dropping a TimerHandle cancels the timer"]
pub struct TimerHandle {
    abort: Option<AbortHandle>,
}

impl TimerHandle {
    /// Abort the task now
    pub fn cancel(mut self) {
        if let Some(abort) = self.abort.take() {
            abort.abort();
        }
    }

    /// Give up ownership without aborting
    pub fn release(mut self) {
        self.abort = None;
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        if let Some(abort) = self.abort.take() {
            abort.abort();
        }
    }
}

/// Spawn `task`, owned by the returned handle
///
/// Must be called from within a tokio runtime.
pub fn spawn<F>(task: F) -> TimerHandle
where
    F: Future<Output = ()> + Send + 'static,
{
    let handle = tokio::spawn(task);
    TimerHandle {
        abort: Some(handle.abort_handle()),
    }
}

/// Run `task` once after `delay`
pub fn after<F>(delay: Duration, task: F) -> TimerHandle
where
    F: Future<Output = ()> + Send + 'static,
{
    spawn(async move {
        tokio::time::sleep(delay).await;
        task.await;
    })
}

/// Suspend the current task for `duration`
///
/// For simulated latency only; timers that outlive the caller use [`after`].
pub async fn delay(duration: Duration) {
    tokio::time::sleep(duration).await;
}

/// Call `tick` every `period`, first call one period from now
pub fn every<F>(period: Duration, mut tick: F) -> TimerHandle
where
    F: FnMut() + Send + 'static,
{
    spawn(async move {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            tick();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_after_fires_once() {
        let fired = Arc::new(AtomicU32::new(0));
        let f = Arc::clone(&fired);
        let handle = after(Duration::from_secs(3), async move {
            f.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(2900)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        handle.release();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_firing() {
        let fired = Arc::new(AtomicU32::new(0));
        let f = Arc::clone(&fired);
        let handle = after(Duration::from_secs(1), async move {
            f.fetch_add(1, Ordering::SeqCst);
        });

        handle.cancel();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels() {
        let fired = Arc::new(AtomicU32::new(0));
        let f = Arc::clone(&fired);
        drop(every(Duration::from_secs(1), move || {
            f.fetch_add(1, Ordering::SeqCst);
        }));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_ticks_each_period() {
        let ticks = Arc::new(AtomicU32::new(0));
        let t = Arc::clone(&ticks);
        let _handle = every(Duration::from_secs(30), move || {
            t.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_secs(95)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_keeps_task_running() {
        let fired = Arc::new(AtomicU32::new(0));
        let f = Arc::clone(&fired);
        after(Duration::from_secs(1), async move {
            f.fetch_add(1, Ordering::SeqCst);
        })
        .release();

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
