//! Idle-connection watchdog
//!
//! Each request start records the time of the last call and each successful
//! completion re-arms an idle timer. When the timer fires and nothing has been
//! called for a full idle window, a liveness probe is sent under a hard
//! timeout. A probe that times out ends the session; one that answers, with a
//! result or an error, just re-arms the timer.
//!
//! The timer is disarmed until the first successful request of a session, so
//! a connection nobody uses is never probed.

use linerpc_core::Result;
use serde_json::Value;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Keepalive watchdog shared by every session of a client
#[derive(Debug)]
pub struct Keepalive {
    idle: Duration,
    probe_timeout: Duration,
    last_call: Mutex<Option<Instant>>,
    activity: Notify,
}

impl Keepalive {
    /// Create a watchdog with the given idle window and probe timeout
    pub fn new(idle: Duration, probe_timeout: Duration) -> Self {
        Self {
            idle,
            probe_timeout,
            last_call: Mutex::new(None),
            activity: Notify::new(),
        }
    }

    /// Record the start of a request
    pub fn touch(&self) {
        let mut last_call = self.last_call.lock().unwrap_or_else(|e| e.into_inner());
        *last_call = Some(Instant::now());
    }

    /// Record a successful completion and re-arm the idle timer
    pub fn completed(&self) {
        self.activity.notify_one();
    }

    /// Time since the last request started
    pub fn idle_for(&self) -> Option<Duration> {
        let last_call = self.last_call.lock().unwrap_or_else(|e| e.into_inner());
        last_call.map(|at| at.elapsed())
    }

    /// Run the watchdog until `cancel` fires or a probe times out
    ///
    /// `probe` sends the liveness request; `on_timeout` is called at most once,
    /// right before returning, when a probe got no answer in time.
    pub async fn run<P, Fut, T>(&self, cancel: CancellationToken, probe: P, on_timeout: T)
    where
        P: Fn() -> Fut,
        Fut: Future<Output = Result<Value>>,
        T: FnOnce(),
    {
        let mut deadline: Option<Instant> = None;

        loop {
            let idle_timer = async move {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Keepalive stopped");
                    return;
                }
                _ = self.activity.notified() => {
                    deadline = Some(Instant::now() + self.idle);
                }
                _ = idle_timer => {
                    deadline = Some(Instant::now() + self.idle);

                    let idle = self.idle_for().map_or(false, |elapsed| elapsed >= self.idle);
                    if !idle {
                        continue;
                    }

                    debug!("Connection idle, sending keepalive probe");
                    match tokio::time::timeout(self.probe_timeout, probe()).await {
                        Ok(Ok(_)) => debug!("Keepalive probe answered"),
                        Ok(Err(e)) => warn!(error = %e, "Keepalive probe failed"),
                        Err(_) => {
                            error!(timeout = ?self.probe_timeout, "Keepalive probe timed out");
                            on_timeout();
                            return;
                        }
                    }
                    deadline = Some(Instant::now() + self.idle);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const IDLE: Duration = Duration::from_secs(5);
    const PROBE_TIMEOUT: Duration = Duration::from_secs(9);

    #[tokio::test(start_paused = true)]
    async fn test_no_probe_before_first_completion() {
        let keepalive = Arc::new(Keepalive::new(IDLE, PROBE_TIMEOUT));
        let probes = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();

        let task = {
            let keepalive = Arc::clone(&keepalive);
            let probes = Arc::clone(&probes);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                keepalive
                    .run(
                        cancel,
                        || {
                            probes.fetch_add(1, Ordering::SeqCst);
                            async { Ok(Value::Null) }
                        },
                        || {},
                    )
                    .await
            })
        };

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(probes.load(Ordering::SeqCst), 0);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_probe_per_idle_window() {
        let keepalive = Arc::new(Keepalive::new(IDLE, PROBE_TIMEOUT));
        let probes = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();

        let task = {
            let keepalive = Arc::clone(&keepalive);
            let probes = Arc::clone(&probes);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let probe_keepalive = Arc::clone(&keepalive);
                keepalive
                    .run(
                        cancel,
                        move || {
                            probes.fetch_add(1, Ordering::SeqCst);
                            probe_keepalive.touch();
                            async { Ok(Value::Null) }
                        },
                        || panic!("probe answered"),
                    )
                    .await
            })
        };

        keepalive.touch();
        keepalive.completed();

        tokio::time::sleep(Duration::from_millis(4_900)).await;
        assert_eq!(probes.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(probes.load(Ordering::SeqCst), 1);

        // Re-armed after the probe cycle: the next one comes a window later.
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(probes.load(Ordering::SeqCst), 2);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_recent_call_skips_probe() {
        let keepalive = Arc::new(Keepalive::new(IDLE, PROBE_TIMEOUT));
        let probes = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();

        let task = {
            let keepalive = Arc::clone(&keepalive);
            let probes = Arc::clone(&probes);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                keepalive
                    .run(
                        cancel,
                        move || {
                            probes.fetch_add(1, Ordering::SeqCst);
                            async { Ok(Value::Null) }
                        },
                        || {},
                    )
                    .await
            })
        };

        keepalive.touch();
        keepalive.completed();

        // A call that has not completed yet still counts as activity.
        tokio::time::sleep(Duration::from_secs(3)).await;
        keepalive.touch();

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert_eq!(probes.load(Ordering::SeqCst), 0);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_timeout_fires_once() {
        let keepalive = Arc::new(Keepalive::new(IDLE, PROBE_TIMEOUT));
        let timeouts = Arc::new(AtomicUsize::new(0));

        let task = {
            let keepalive = Arc::clone(&keepalive);
            let timeouts = Arc::clone(&timeouts);
            tokio::spawn(async move {
                keepalive
                    .run(
                        CancellationToken::new(),
                        || std::future::pending::<Result<Value>>(),
                        move || {
                            timeouts.fetch_add(1, Ordering::SeqCst);
                        },
                    )
                    .await
            })
        };

        keepalive.touch();
        keepalive.completed();

        tokio::time::sleep(Duration::from_secs(13)).await;
        assert_eq!(timeouts.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(timeouts.load(Ordering::SeqCst), 1);
        task.await.unwrap();

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(timeouts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_probe_keeps_running() {
        let keepalive = Arc::new(Keepalive::new(IDLE, PROBE_TIMEOUT));
        let probes = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();

        let task = {
            let keepalive = Arc::clone(&keepalive);
            let probes = Arc::clone(&probes);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let probe_keepalive = Arc::clone(&keepalive);
                keepalive
                    .run(
                        cancel,
                        move || {
                            probes.fetch_add(1, Ordering::SeqCst);
                            probe_keepalive.touch();
                            async { Err(linerpc_core::Error::Rpc(Value::from("unknown method"))) }
                        },
                        || panic!("probe answered"),
                    )
                    .await
            })
        };

        keepalive.touch();
        keepalive.completed();

        tokio::time::sleep(Duration::from_millis(10_100)).await;
        assert_eq!(probes.load(Ordering::SeqCst), 2);

        cancel.cancel();
        task.await.unwrap();
    }
}
