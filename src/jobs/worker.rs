use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context, Result};
use tokio_util::sync::CancellationToken;

const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Spawn a named OS thread for one job.
pub fn spawn_worker<F>(name: String, body: F) -> Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.clone())
        .spawn(body)
        .with_context(|| format!("failed to spawn worker thread {name}"))
}

/// Run a worker body, turning a panic into an ordinary error so the caller's
/// failure path (record update, lock release, `*_failed` event) still runs.
pub fn run_guarded<T>(body: impl FnOnce() -> Result<T>) -> Result<T> {
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(result) => result,
        Err(payload) => Err(anyhow!("worker panicked: {}", panic_message(&*payload))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Sleep for `duration` in short slices. Returns `false` as soon as the token
/// is cancelled.
pub fn sleep_unless_cancelled(token: &CancellationToken, duration: Duration) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if token.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(SLEEP_SLICE));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panics_become_errors() {
        let err = run_guarded::<()>(|| panic!("bad frame")).unwrap_err();
        assert_eq!(err.to_string(), "worker panicked: bad frame");

        let err = run_guarded::<()>(|| panic!("{} frames", 3)).unwrap_err();
        assert_eq!(err.to_string(), "worker panicked: 3 frames");

        assert_eq!(run_guarded(|| Ok(5)).unwrap(), 5);
    }

    #[test]
    fn cancelled_sleep_returns_early() {
        let token = CancellationToken::new();
        let canceller = token.clone();
        let started = Instant::now();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            canceller.cancel();
        });

        assert!(!sleep_unless_cancelled(&token, Duration::from_secs(10)));
        assert!(started.elapsed() < Duration::from_secs(2));
        handle.join().unwrap();
    }

    #[test]
    fn uncancelled_sleep_runs_to_completion() {
        let token = CancellationToken::new();
        let started = Instant::now();
        assert!(sleep_unless_cancelled(&token, Duration::from_millis(30)));
        assert!(started.elapsed() >= Duration::from_millis(30));
    }
}
