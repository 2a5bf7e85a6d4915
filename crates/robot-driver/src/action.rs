use crate::Result;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const SETTLE_POLL: Duration = Duration::from_millis(100);
const SETTLE_EPS: f64 = 1e-3;

#[derive(Debug)]
struct ActionState {
    moving: bool,
    status: String,
}

/// Tracks one in-flight action (a chassis step or an arm move).
///
/// `execute` marks the tracker busy before it returns, then waits for completion
/// on a background thread.
#[derive(Clone, Debug)]
pub struct ActionTracker {
    name: &'static str,
    state: Arc<Mutex<ActionState>>,
}

impl ActionTracker {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Arc::new(Mutex::new(ActionState {
                moving: false,
                status: "Ready".to_string(),
            })),
        }
    }

    pub fn is_ready(&self) -> bool {
        !self.state.lock().moving
    }

    pub fn status(&self) -> String {
        self.state.lock().status.clone()
    }

    /// Record a failure that happened before the action could start.
    pub fn fail(&self, reason: impl core::fmt::Display) {
        let mut st = self.state.lock();
        st.moving = false;
        st.status = format!("Error: {reason}");
    }

    /// Try to claim the tracker. Returns false if an action is already running.
    pub fn begin(&self) -> bool {
        let mut st = self.state.lock();
        if st.moving {
            return false;
        }
        st.moving = true;
        st.status = "Moving...".to_string();
        true
    }

    /// Wait for a claimed action on a background thread. `wait` returns whether
    /// the action completed before its timeout.
    pub fn spawn_wait<F>(&self, wait: F)
    where
        F: FnOnce() -> Result<bool> + Send + 'static,
    {
        let state = Arc::clone(&self.state);
        let name = self.name;
        let spawned = thread::Builder::new()
            .name(format!("{name}-action"))
            .spawn(move || {
                let status = match wait() {
                    Ok(true) => "Completed".to_string(),
                    Ok(false) => "Timeout".to_string(),
                    Err(e) => format!("Error: {e}"),
                };
                tracing::debug!(action = name, %status, "action finished");
                let mut st = state.lock();
                st.moving = false;
                st.status = status;
            });
        if let Err(e) = spawned {
            self.fail(e);
        }
    }

    /// Claim the tracker and wait for `wait` in the background.
    pub fn execute<F>(&self, wait: F) -> bool
    where
        F: FnOnce() -> Result<bool> + Send + 'static,
    {
        if !self.begin() {
            return false;
        }
        self.spawn_wait(wait);
        true
    }
}

/// Time source for settle detection.
trait Clock {
    fn elapsed(&self) -> Duration;
    fn sleep(&mut self, d: Duration);
}

struct WallClock(Instant);

impl Clock for WallClock {
    fn elapsed(&self) -> Duration {
        self.0.elapsed()
    }

    fn sleep(&mut self, d: Duration) {
        thread::sleep(d);
    }
}

/// Block for `estimate`, then until two reads taken [`SETTLE_POLL`] apart agree.
/// Returns false if `timeout` (measured from the call) expires first.
pub fn wait_until_settled<F>(read: F, estimate: Duration, timeout: Duration) -> bool
where
    F: FnMut() -> [f64; 3],
{
    settle_with(&mut WallClock(Instant::now()), read, estimate, timeout)
}

fn settle_with<C, F>(clock: &mut C, mut read: F, estimate: Duration, timeout: Duration) -> bool
where
    C: Clock,
    F: FnMut() -> [f64; 3],
{
    clock.sleep(estimate.min(timeout));
    let mut last = read();
    loop {
        if clock.elapsed() >= timeout {
            return false;
        }
        clock.sleep(SETTLE_POLL);
        let now = read();
        if now.iter().zip(last.iter()).all(|(a, b)| (a - b).abs() < SETTLE_EPS) {
            return true;
        }
        last = now;
    }
}
