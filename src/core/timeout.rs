// src/core/timeout.rs — One-shot extendable deadline for a generation attempt
//
// Running -> Extended -> {Completed | TimedOut}, or Running -> {Completed | TimedOut}.
// The deadline starts at start + base. A first-module notification that
// arrives within the threshold pushes it to start + base + extension, once.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub base_ms: u64,
    pub extension_ms: u64,
    pub extension_threshold_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            base_ms: 30_000,
            extension_ms: 15_000,
            extension_threshold_ms: 10_000,
        }
    }
}

impl TimeoutConfig {
    pub fn base(&self) -> Duration {
        Duration::from_millis(self.base_ms)
    }

    pub fn extension(&self) -> Duration {
        Duration::from_millis(self.extension_ms)
    }

    pub fn extension_threshold(&self) -> Duration {
        Duration::from_millis(self.extension_threshold_ms)
    }

    /// Longest an attempt can run, extension included.
    pub fn max_total(&self) -> Duration {
        self.base() + self.extension()
    }
}

#[derive(Debug)]
struct TimerState {
    deadline: Instant,
    did_extend: bool,
    timed_out: bool,
    disarmed: bool,
}

fn lock(state: &Mutex<TimerState>) -> MutexGuard<'_, TimerState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Deadline timer bound to a cancellation token. Must be created inside a
/// tokio runtime.
pub struct AdaptiveTimeout {
    config: TimeoutConfig,
    start: Instant,
    state: Arc<Mutex<TimerState>>,
    signal: CancellationToken,
    reschedule: Arc<Notify>,
    task: JoinHandle<()>,
}

impl AdaptiveTimeout {
    pub fn start(config: TimeoutConfig) -> Self {
        Self::start_with_signal(config, CancellationToken::new())
    }

    /// Arm the timer so that it cancels a child of `parent`. Cancelling the
    /// parent also fires this timer's signal (without marking a timeout).
    pub fn start_with_parent(config: TimeoutConfig, parent: &CancellationToken) -> Self {
        Self::start_with_signal(config, parent.child_token())
    }

    fn start_with_signal(config: TimeoutConfig, signal: CancellationToken) -> Self {
        let start = Instant::now();
        let state = Arc::new(Mutex::new(TimerState {
            deadline: start + config.base(),
            did_extend: false,
            timed_out: false,
            disarmed: false,
        }));
        let reschedule = Arc::new(Notify::new());

        let task = tokio::spawn(run_timer(
            state.clone(),
            reschedule.clone(),
            signal.clone(),
        ));

        Self {
            config,
            start,
            state,
            signal,
            reschedule,
            task,
        }
    }

    /// Token that fires at the deadline.
    pub fn signal(&self) -> &CancellationToken {
        &self.signal
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn did_extend(&self) -> bool {
        lock(&self.state).did_extend
    }

    pub fn timed_out(&self) -> bool {
        lock(&self.state).timed_out
    }

    /// Grant the one-time extension if it is still allowed. Returns whether
    /// the deadline moved.
    pub fn notify_first_module(&self) -> bool {
        let elapsed = self.elapsed();
        let mut state = lock(&self.state);

        if state.did_extend || state.timed_out || state.disarmed {
            return false;
        }
        // The timer task may not have observed an expired deadline yet.
        if Instant::now() >= state.deadline {
            return false;
        }
        if elapsed > self.config.extension_threshold() {
            return false;
        }

        state.deadline = self.start + self.config.base() + self.config.extension();
        state.did_extend = true;
        drop(state);

        tracing::debug!(
            elapsed_ms = elapsed.as_millis() as u64,
            extension_ms = self.config.extension_ms,
            "First module received, extending generation deadline"
        );
        self.reschedule.notify_one();
        true
    }

    /// Disarm without marking a timeout. Idempotent.
    pub fn cancel(&self) {
        let mut state = lock(&self.state);
        if state.disarmed {
            return;
        }
        state.disarmed = true;
        drop(state);
        self.reschedule.notify_one();
    }
}

impl Drop for AdaptiveTimeout {
    fn drop(&mut self) {
        lock(&self.state).disarmed = true;
        self.task.abort();
    }
}

async fn run_timer(state: Arc<Mutex<TimerState>>, reschedule: Arc<Notify>, signal: CancellationToken) {
    loop {
        let deadline = {
            let s = lock(&state);
            if s.disarmed {
                return;
            }
            s.deadline
        };

        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => {
                let mut s = lock(&state);
                if s.disarmed {
                    return;
                }
                if Instant::now() >= s.deadline {
                    s.timed_out = true;
                    drop(s);
                    signal.cancel();
                    return;
                }
                // deadline moved while sleeping; re-arm
            }
            _ = reschedule.notified() => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> TimeoutConfig {
        TimeoutConfig {
            base_ms: 1_000,
            extension_ms: 500,
            extension_threshold_ms: 300,
        }
    }

    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_at_base_deadline() {
        let timer = AdaptiveTimeout::start(config());
        tokio::time::advance(Duration::from_millis(999)).await;
        settle().await;
        assert!(!timer.signal().is_cancelled());

        tokio::time::advance(Duration::from_millis(1)).await;
        settle().await;
        assert!(timer.signal().is_cancelled());
        assert!(timer.timed_out());
        assert!(!timer.did_extend());
    }

    #[tokio::test(start_paused = true)]
    async fn test_extension_within_threshold() {
        let timer = AdaptiveTimeout::start(config());
        tokio::time::advance(Duration::from_millis(299)).await;
        assert!(timer.notify_first_module());
        assert!(timer.did_extend());

        // second call is a no-op
        assert!(!timer.notify_first_module());

        tokio::time::advance(Duration::from_millis(1_000)).await;
        settle().await;
        assert!(!timer.signal().is_cancelled(), "base deadline must not fire");

        tokio::time::advance(Duration::from_millis(201)).await;
        settle().await;
        assert!(timer.signal().is_cancelled());
        assert!(timer.timed_out());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_extension_after_threshold() {
        let timer = AdaptiveTimeout::start(config());
        tokio::time::advance(Duration::from_millis(301)).await;
        assert!(!timer.notify_first_module());
        assert!(!timer.did_extend());

        tokio::time::advance(Duration::from_millis(700)).await;
        settle().await;
        assert!(timer.timed_out());
    }

    #[tokio::test(start_paused = true)]
    async fn test_notify_after_fire_is_noop() {
        let cfg = TimeoutConfig {
            base_ms: 100,
            extension_ms: 500,
            extension_threshold_ms: 1_000,
        };
        let timer = AdaptiveTimeout::start(cfg);
        tokio::time::advance(Duration::from_millis(150)).await;
        settle().await;
        assert!(timer.timed_out());

        assert!(!timer.notify_first_module());
        assert!(timer.timed_out());
        assert!(!timer.did_extend());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_disarms_without_timeout() {
        let timer = AdaptiveTimeout::start(config());
        tokio::time::advance(Duration::from_millis(100)).await;
        timer.cancel();
        timer.cancel();

        tokio::time::advance(Duration::from_millis(5_000)).await;
        settle().await;
        assert!(!timer.signal().is_cancelled());
        assert!(!timer.timed_out());
        assert!(!timer.notify_first_module());
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_cancellation_propagates_without_timeout() {
        let parent = CancellationToken::new();
        let timer = AdaptiveTimeout::start_with_parent(config(), &parent);
        parent.cancel();
        assert!(timer.signal().is_cancelled());
        assert!(!timer.timed_out());
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_tracks_clock() {
        let timer = AdaptiveTimeout::start(config());
        tokio::time::advance(Duration::from_millis(250)).await;
        assert_eq!(timer.elapsed(), Duration::from_millis(250));
    }

    #[test]
    fn test_default_config() {
        let cfg = TimeoutConfig::default();
        assert_eq!(cfg.base(), Duration::from_secs(30));
        assert_eq!(cfg.extension(), Duration::from_secs(15));
        assert_eq!(cfg.extension_threshold(), Duration::from_secs(10));
        assert_eq!(cfg.max_total(), Duration::from_secs(45));
    }
}
