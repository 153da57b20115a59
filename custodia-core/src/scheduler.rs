//! Periodic Task — cancellable background scheduler.
//!
//! Retention sweeps and anomaly sweeps run on fixed intervals independent
//! of request traffic. Tests bypass the timer entirely and call the tick
//! closure (or the component's sweep method) directly.

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::info;

/// A named background task ticking a closure at a fixed interval.
/// Stopping is signalled, not polled: `stop()` wakes the thread immediately
/// and joins it before returning.
pub struct PeriodicTask {
    name: String,
    stop: Arc<(Mutex<bool>, Condvar)>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    pub fn spawn<F>(name: &str, interval: Duration, mut tick: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let stop = Arc::new((Mutex::new(false), Condvar::new()));
        let thread_stop = stop.clone();
        let thread_name = name.to_string();

        let handle = std::thread::spawn(move || {
            let (lock, cvar) = &*thread_stop;
            let mut stopped = lock.lock();
            loop {
                let timeout = cvar.wait_for(&mut stopped, interval);
                if *stopped {
                    break;
                }
                if timeout.timed_out() {
                    // Run the tick without holding the stop lock so stop()
                    // never waits on a long sweep to observe the flag.
                    MutexGuard::unlocked(&mut stopped, &mut tick);
                }
            }
            info!(task = %thread_name, "Periodic task stopped");
        });

        Self { name: name.to_string(), stop, handle: Some(handle) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Signal the task to stop and wait for the thread to exit.
    pub fn stop(&mut self) {
        {
            let (lock, cvar) = &*self.stop;
            *lock.lock() = true;
            cvar.notify_all();
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.stop();
    }
}
