use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// The event-loop disown timer: a one-shot, resettable deadline checked
/// from inside the event loop's own `select!`. Armed by an outgoing
/// heartbeat, disarmed by an incoming one.
pub struct DisownTimer {
    period: Duration,
    deadline: Option<tokio::time::Instant>,
}

impl DisownTimer {
    pub fn new(period: Duration) -> Self {
        Self { period, deadline: None }
    }

    pub fn arm(&mut self) {
        self.deadline = Some(tokio::time::Instant::now() + self.period);
    }

    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Resolves once the armed deadline passes; never resolves while
    /// disarmed, so it is safe to poll unconditionally inside `select!`.
    pub async fn wait(&self) {
        match self.deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }
}

struct WatchdogState {
    deadline: Mutex<Instant>,
    condvar: Condvar,
    stopped: AtomicBool,
}

/// The watchdog disown timer: runs on its own OS thread so it keeps
/// ticking even if the event loop is wedged on CPU-bound handler work.
/// The only shared state with the event loop is this thread-safe "reset"
/// signal; the watchdog never touches the session table.
pub struct Watchdog {
    state: Arc<WatchdogState>,
    handle: Option<JoinHandle<()>>,
}

impl Watchdog {
    pub fn spawn<F>(period: Duration, on_disown: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let state = Arc::new(WatchdogState {
            deadline: Mutex::new(Instant::now() + period),
            condvar: Condvar::new(),
            stopped: AtomicBool::new(false),
        });

        let thread_state = state.clone();
        let handle =
            thread::spawn(move || watchdog_loop(thread_state, on_disown));

        Self { state, handle: Some(handle) }
    }

    /// Thread-safe reset: pushes the deadline `period` out from now. Called
    /// whenever an incoming HEARTBEAT is observed.
    pub fn notify(&self, period: Duration) {
        let mut deadline = self.state.deadline.lock().unwrap();
        *deadline = Instant::now() + period;
        self.state.condvar.notify_one();
    }

    pub fn stop(&self) {
        self.state.stopped.store(true, Ordering::SeqCst);
        self.state.condvar.notify_one();
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn watchdog_loop(state: Arc<WatchdogState>, on_disown: impl FnOnce()) {
    loop {
        let mut guard = state.deadline.lock().unwrap();
        loop {
            if state.stopped.load(Ordering::SeqCst) {
                return;
            }

            let now = Instant::now();
            if *guard <= now {
                break;
            }

            let wait_for = *guard - now;
            let (next_guard, result) =
                state.condvar.wait_timeout(guard, wait_for).unwrap();
            guard = next_guard;

            if state.stopped.load(Ordering::SeqCst) {
                return;
            }
            if result.timed_out() && *guard <= Instant::now() {
                break;
            }
        }

        drop(guard);
        on_disown();
        return;
    }
}
