use std::{
    future::Future,
    sync::{
        mpsc::{self, RecvTimeoutError},
        Arc, Mutex, PoisonError,
    },
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use log::{debug, error};
use tokio::runtime::{Builder, Handle};

pub const DEFAULT_BRIDGE_TIMEOUT: Duration = Duration::from_secs(10);

/// Lets a blocking worker thread call into async collaborators (the store).
///
/// With a runtime handle the future is spawned onto that runtime and the
/// worker waits for its result for at most `timeout`. Without one, the future
/// runs on a throwaway current-thread runtime right on the worker, under the
/// same timeout. Both paths run the identical future. A handle whose runtime
/// has since shut down counts as no runtime: the untouched future is taken
/// back and run inline.
///
/// Must be called from a plain thread, never from inside an async task.
#[derive(Clone)]
pub struct AsyncBridge {
    handle: Option<Handle>,
    timeout: Duration,
}

impl AsyncBridge {
    pub fn new(handle: Option<Handle>, timeout: Duration) -> Self {
        Self { handle, timeout }
    }

    /// Bind to the runtime the caller is running on, if any.
    pub fn from_current(timeout: Duration) -> Self {
        Self::new(Handle::try_current().ok(), timeout)
    }

    pub fn detached(timeout: Duration) -> Self {
        Self::new(None, timeout)
    }

    pub fn has_runtime(&self) -> bool {
        self.handle.is_some()
    }

    pub fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        match &self.handle {
            Some(handle) => self.run_on(handle, fut),
            None => self.run_inline(fut),
        }
    }

    /// Like [`run`](Self::run) but only logs a failure. For finalisation
    /// writes that must not change a job's reported outcome.
    pub fn run_or_log<F, T>(&self, what: &str, fut: F) -> Option<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        match self.run(fut) {
            Ok(value) => Some(value),
            Err(err) => {
                error!("{what} failed: {err:?}");
                None
            }
        }
    }

    fn run_on<F, T>(&self, handle: &Handle, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        // The spawned task claims the future on first poll. A runtime that
        // is already gone drops the task unpolled and the future stays here.
        let slot = Arc::new(Mutex::new(Some(fut)));
        let claim = Arc::clone(&slot);
        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        handle.spawn(async move {
            let fut = take(&claim);
            drop(claim);
            if let Some(fut) = fut {
                if reply_tx.send(fut.await).is_err() {
                    debug!("bridge caller gave up before the result arrived");
                }
            }
        });

        match reply_rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(anyhow!(
                "async call timed out after {}ms",
                self.timeout.as_millis()
            )),
            Err(RecvTimeoutError::Disconnected) => match take(&slot) {
                Some(fut) => {
                    debug!("async runtime is gone, running the call inline");
                    self.run_inline(fut)
                }
                None => Err(anyhow!("async runtime dropped the call mid-flight")),
            },
        }
    }

    fn run_inline<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .context("failed to build fallback runtime")?;
        let timeout = self.timeout;
        runtime.block_on(async move {
            tokio::time::timeout(timeout, fut)
                .await
                .map_err(|_| anyhow!("async call timed out after {}ms", timeout.as_millis()))?
        })
    }
}

fn take<F>(slot: &Mutex<Option<F>>) -> Option<F> {
    slot.lock().unwrap_or_else(PoisonError::into_inner).take()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_inline_without_a_runtime() {
        let bridge = AsyncBridge::from_current(DEFAULT_BRIDGE_TIMEOUT);
        assert!(!bridge.has_runtime());
        let value = bridge
            .run(async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok(41 + 1)
            })
            .unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn inline_path_enforces_the_timeout() {
        let bridge = AsyncBridge::detached(Duration::from_millis(20));
        let err = bridge
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn worker_thread_hands_off_to_the_runtime() {
        let bridge = AsyncBridge::from_current(DEFAULT_BRIDGE_TIMEOUT);
        assert!(bridge.has_runtime());

        let value = tokio::task::spawn_blocking(move || {
            bridge.run(async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok(String::from("saved"))
            })
        })
        .await
        .unwrap()
        .unwrap();
        assert_eq!(value, "saved");
    }

    #[test]
    fn falls_back_inline_once_the_runtime_has_shut_down() {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let bridge = runtime.block_on(async { AsyncBridge::from_current(DEFAULT_BRIDGE_TIMEOUT) });
        assert!(bridge.has_runtime());
        drop(runtime);

        let value = bridge
            .run(async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok("saved late")
            })
            .unwrap();
        assert_eq!(value, "saved late");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn runtime_path_enforces_the_timeout_and_errors_are_swallowed() {
        let bridge = AsyncBridge::from_current(Duration::from_millis(20));
        let outcome = tokio::task::spawn_blocking(move || {
            bridge.run_or_log("slow save", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
        })
        .await
        .unwrap();
        assert!(outcome.is_none());
    }
}
