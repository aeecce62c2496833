#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::NavigationError;
use crate::session::NavigationSession;

const SLEEP_SLICE_MS: u64 = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    /// Navigation ended (stopped, arrived, or the route went missing); the loop exits.
    Finished,
}

/// Background thread driving one session's progress tracker.
#[derive(Debug)]
pub struct MonitorHandle {
    stop: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

impl MonitorHandle {
    pub fn spawn(
        session: Weak<NavigationSession>,
        session_id: &str,
        interval_ms: u64,
    ) -> Result<Self, NavigationError> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let sid = session_id.to_string();
        let join = thread::Builder::new()
            .name(format!("wayguide-monitor-{sid}"))
            .spawn(move || run_loop(session, &sid, interval_ms.max(1), &stop_flag))
            .map_err(|e| NavigationError::Internal(format!("monitor thread spawn failed: {e}")))?;
        Ok(Self { stop, join })
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Raises the stop flag and waits up to `wait_ms` for the thread to exit. A thread stuck in a
    /// blocking collaborator call is left to finish on its own.
    pub fn stop_and_wait(self, wait_ms: u64) -> bool {
        self.stop.store(true, Ordering::SeqCst);
        if thread::current().id() == self.join.thread().id() {
            return false;
        }
        let deadline = Instant::now() + Duration::from_millis(wait_ms);
        while !self.join.is_finished() {
            if Instant::now() >= deadline {
                warn!(
                    thread = self.join.thread().name().unwrap_or("monitor"),
                    wait_ms, "monitor did not exit in time; detaching"
                );
                return false;
            }
            thread::sleep(Duration::from_millis(5));
        }
        if self.join.join().is_err() {
            warn!("monitor thread panicked");
        }
        true
    }
}

fn run_loop(session: Weak<NavigationSession>, session_id: &str, interval_ms: u64, stop: &AtomicBool) {
    debug!(session_id, interval_ms, "monitor started");
    'outer: loop {
        let mut slept = 0;
        while slept < interval_ms {
            if stop.load(Ordering::SeqCst) {
                break 'outer;
            }
            let slice = SLEEP_SLICE_MS.min(interval_ms - slept);
            thread::sleep(Duration::from_millis(slice));
            slept += slice;
        }
        if stop.load(Ordering::SeqCst) {
            break;
        }
        let Some(session) = session.upgrade() else {
            break;
        };
        if session.tick() == TickOutcome::Finished {
            break;
        }
    }
    debug!(session_id, "monitor exited");
}
