//! Self-expiring cleanup timer.
//!
//! Arming stores a deadline one window from now. At most one timer task
//! runs at a time: it sleeps until the deadline it last read, re-reads it
//! on waking, and only fires if it is still the same. Re-arming while the
//! task sleeps just moves the deadline, and disarming clears it, so the
//! timer never has to be cancelled and rescheduled.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Callback run when the timer fires.
pub type OnFire = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Default)]
struct TimerState {
    deadline: Option<Instant>,
    task_running: bool,
}

/// Cleanup timer with a fixed window.
pub struct CleanupTimer {
    window: Duration,
    state: Arc<Mutex<TimerState>>,
    on_fire: OnFire,
}

impl std::fmt::Debug for CleanupTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupTimer")
            .field("window", &self.window)
            .field("deadline", &self.deadline())
            .finish_non_exhaustive()
    }
}

impl CleanupTimer {
    /// Create a disarmed timer that runs `on_fire` when it expires.
    pub fn new(window: Duration, on_fire: OnFire) -> Self {
        Self {
            window,
            state: Arc::new(Mutex::new(TimerState::default())),
            on_fire,
        }
    }

    /// Move the deadline to one window from now, starting the timer task
    /// on `handle` if none is running. The task stops early when `token`
    /// is cancelled.
    pub fn arm(&self, handle: &Handle, token: &CancellationToken) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        state.deadline = Some(now.checked_add(self.window).unwrap_or(now));
        if state.task_running {
            return;
        }
        state.task_running = true;
        drop(state);
        handle.spawn(run(
            Arc::clone(&self.state),
            token.clone(),
            Arc::clone(&self.on_fire),
        ));
    }

    /// Clear the deadline. A sleeping task exits when it wakes.
    pub fn disarm(&self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .deadline = None;
    }

    /// The current deadline, if armed.
    pub fn deadline(&self) -> Option<Instant> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .deadline
    }
}

async fn run(state: Arc<Mutex<TimerState>>, token: CancellationToken, on_fire: OnFire) {
    let lock = || state.lock().unwrap_or_else(PoisonError::into_inner);
    loop {
        let target = {
            let mut guard = lock();
            match guard.deadline {
                Some(deadline) => deadline,
                None => {
                    guard.task_running = false;
                    return;
                }
            }
        };
        tokio::select! {
            () = token.cancelled() => {
                lock().task_running = false;
                return;
            }
            () = tokio::time::sleep_until(target) => {}
        }
        let mut guard = lock();
        if guard.deadline == Some(target) {
            guard.deadline = None;
            guard.task_running = false;
            drop(guard);
            on_fire();
            return;
        }
    }
}
