//! Serial execution context for application-facing callbacks.

use futures::{future::BoxFuture, FutureExt};
use std::{future::Future, panic::AssertUnwindSafe};
use tokio::runtime::{Handle, TryCurrentError};
use tracing::*;

/// FIFO of jobs run one after another on a single tokio task.
///
/// Every connection event, hub dispatch and user callback of a connection is
/// executed here, so application code observes them strictly in order and
/// never concurrently.
#[derive(Clone)]
pub struct CallbackQueue {
    jobs: flume::Sender<BoxFuture<'static, ()>>,
    runtime: Handle,
}

impl CallbackQueue {
    /// Creates a queue on the runtime the caller is running in.
    pub fn new() -> Result<Self, TryCurrentError> {
        Ok(CallbackQueue::with_runtime(Handle::try_current()?))
    }

    pub fn with_runtime(runtime: Handle) -> Self {
        let (jobs, rx) = flume::unbounded::<BoxFuture<'static, ()>>();

        runtime.spawn(
            async move {
                while let Ok(job) = rx.recv_async().await {
                    if AssertUnwindSafe(job).catch_unwind().await.is_err() {
                        event!(Level::ERROR, "callback panicked");
                    }
                }

                event!(Level::TRACE, "callback queue drained");
            }
            .instrument(trace_span!("callbacks")),
        );

        CallbackQueue { jobs, runtime }
    }

    pub fn enqueue<F>(&self, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.jobs.send(job.boxed()).is_err() {
            event!(Level::DEBUG, "callback queue is gone, job dropped");
        }
    }

    pub(crate) fn runtime(&self) -> &Handle {
        &self.runtime
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn runs_jobs_in_order() {
        let queue = CallbackQueue::new().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (done_tx, done_rx) = flume::bounded(1);

        for i in 0..10 {
            let seen = seen.clone();
            queue.enqueue(async move {
                if i % 2 == 0 {
                    tokio::task::yield_now().await;
                }
                seen.lock().unwrap().push(i);
            });
        }
        queue.enqueue(async move {
            done_tx.send(()).unwrap();
        });

        done_rx.recv_async().await.unwrap();

        assert_eq!((0..10).collect::<Vec<_>>(), *seen.lock().unwrap());
    }

    #[tokio::test]
    async fn survives_panicking_job() {
        let queue = CallbackQueue::new().unwrap();
        let (done_tx, done_rx) = flume::bounded(1);

        queue.enqueue(async { panic!("boom") });
        queue.enqueue(async move {
            done_tx.send(()).unwrap();
        });

        done_rx.recv_async().await.unwrap();
    }

    #[test]
    fn requires_runtime() {
        assert!(CallbackQueue::new().is_err());
    }
}
