//! Cancellable timers that post events back into the engine inbox
//!
//! A timer is a spawned task holding a clone of the inbox sender. Dropping
//! its [`TimerHandle`] aborts the task, so replacing or clearing a slot is
//! all it takes to cancel. Events already queued when a timer is cancelled
//! still arrive; the engine checks them against the room state.

use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::engine::Event;

/// Owns a timer task; aborts it on drop
#[derive(Debug)]
pub struct TimerHandle(JoinHandle<()>);

impl TimerHandle {
    /// Cancel now rather than at the end of scope
    pub fn cancel(self) {}
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Post `event` once after `delay`
pub fn once(delay: Duration, tx: UnboundedSender<Event>, event: Event) -> TimerHandle {
    TimerHandle(tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let _ = tx.send(event);
    }))
}

/// Post an event every `period`, first one after a full period. Stops when
/// the inbox closes.
pub fn repeat<F>(period: Duration, tx: UnboundedSender<Event>, mut make: F) -> TimerHandle
where
    F: FnMut() -> Event + Send + 'static,
{
    TimerHandle(tokio::spawn(async move {
        loop {
            tokio::time::sleep(period).await;
            if tx.send(make()).is_err() {
                break;
            }
        }
    }))
}

/// Timer slots of one room. Each slot holds at most one timer; setting a
/// slot cancels whatever was there.
#[derive(Debug, Default)]
pub struct RoomTimers {
    /// Countdown, reveal cadence or the pause between phases
    pub phase: Option<TimerHandle>,
    /// Host reconnect window
    pub grace: Option<TimerHandle>,
    /// Bumped every time a grace window opens
    pub grace_generation: u64,
    /// Delay between announcing a closing room and closing it
    pub close: Option<TimerHandle>,
}

impl RoomTimers {
    /// Open a new grace window; returns its generation
    pub fn arm_grace<F>(&mut self, make: F) -> u64
    where
        F: FnOnce(u64) -> TimerHandle,
    {
        self.grace_generation += 1;
        self.grace = Some(make(self.grace_generation));
        self.grace_generation
    }

    /// Whether `generation` names the grace window still open
    pub fn is_current_grace(&self, generation: u64) -> bool {
        self.grace.is_some() && self.grace_generation == generation
    }

    pub fn cancel_all(&mut self) {
        self.phase = None;
        self.grace = None;
        self.close = None;
    }

    pub fn is_idle(&self) -> bool {
        self.phase.is_none() && self.grace.is_none() && self.close.is_none()
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;

    fn sweep() -> Event {
        Event::Sweep
    }

    #[tokio::test(start_paused = true)]
    async fn test_once_fires_after_delay() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _timer = once(Duration::from_secs(5), tx, sweep());

        tokio::time::sleep(Duration::from_millis(4900)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(matches!(rx.try_recv(), Ok(Event::Sweep)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_cancels() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let timer = once(Duration::from_secs(1), tx, sweep());
        drop(timer);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeat_counts_periods() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let timer = repeat(Duration::from_secs(1), tx, sweep);

        tokio::time::sleep(Duration::from_millis(3500)).await;
        let mut fired = 0;
        while rx.try_recv().is_ok() {
            fired += 1;
        }
        assert_eq!(fired, 3);

        timer.cancel();
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_replacing_slot_cancels_previous() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = RoomTimers::default();
        timers.phase = Some(once(Duration::from_secs(1), tx.clone(), sweep()));
        timers.phase = Some(once(Duration::from_secs(3), tx, Event::Shutdown));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(matches!(rx.try_recv(), Ok(Event::Shutdown)));

        timers.cancel_all();
        assert!(timers.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn test_grace_generations() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut timers = RoomTimers::default();

        let first = timers.arm_grace(|_| once(Duration::from_secs(8), tx.clone(), sweep()));
        timers.grace = None;
        assert!(!timers.is_current_grace(first));

        let second = timers.arm_grace(|_| once(Duration::from_secs(8), tx.clone(), sweep()));
        assert_ne!(first, second);
        assert!(!timers.is_current_grace(first));
        assert!(timers.is_current_grace(second));
    }
}
