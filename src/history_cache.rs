//! Periodically refreshed snapshot of recent shell history.
//!
//! Reading a history file on every connection would put file IO on the
//! suggestion hot path, so the daemon keeps a snapshot and refreshes it in the
//! background. Readers always get the last good snapshot without blocking.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::Notify;

type HistorySource = Box<dyn Fn() -> String + Send + Sync>;

pub struct HistoryCache {
    snapshot: Arc<RwLock<String>>,
    stop: Arc<Notify>,
    stopped: Arc<AtomicBool>,
}

impl HistoryCache {
    /// Start a cache backed by the user's shell history file. The first
    /// refresh runs synchronously so the snapshot is never empty-by-accident.
    pub fn start(shell: &str, interval: Duration) -> Self {
        let shell = shell.to_string();
        Self::with_source(
            Box::new(move || crate::history::shell_history(&shell)),
            interval,
        )
    }

    pub fn with_source(source: HistorySource, interval: Duration) -> Self {
        let snapshot = Arc::new(RwLock::new(source()));
        let stop = Arc::new(Notify::new());
        let stopped = Arc::new(AtomicBool::new(false));

        let task_snapshot = Arc::clone(&snapshot);
        let task_stop = Arc::clone(&stop);
        let task_stopped = Arc::clone(&stopped);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // interval fires immediately; the initial refresh already happened
            ticker.tick().await;
            loop {
                if task_stopped.load(Ordering::SeqCst) {
                    break;
                }
                tokio::select! {
                    _ = task_stop.notified() => break,
                    _ = ticker.tick() => {
                        let fresh = source();
                        if let Ok(mut snap) = task_snapshot.write() {
                            *snap = fresh;
                        }
                    }
                }
            }
        });

        Self {
            snapshot,
            stop,
            stopped,
        }
    }

    pub fn get(&self) -> String {
        self.snapshot
            .read()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Idempotent; safe to call from any task.
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            self.stop.notify_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn first_refresh_is_synchronous() {
        let cache = HistoryCache::with_source(
            Box::new(|| "git status".to_string()),
            Duration::from_secs(3600),
        );
        assert_eq!(cache.get(), "git status");
        cache.stop();
    }

    #[tokio::test]
    async fn background_refresh_updates_snapshot() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        let cache = HistoryCache::with_source(
            Box::new(move || format!("refresh-{}", c.fetch_add(1, Ordering::SeqCst))),
            Duration::from_millis(10),
        );
        assert_eq!(cache.get(), "refresh-0");
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if cache.get() != "refresh-0" {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        cache.stop();
    }

    #[tokio::test]
    async fn stop_halts_refreshes() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        let cache = HistoryCache::with_source(
            Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
                String::new()
            }),
            Duration::from_millis(10),
        );
        cache.stop();
        cache.stop();
        tokio::time::sleep(Duration::from_millis(80)).await;
        let after_stop = counter.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(80)).await;
        // at most one in-flight refresh may land after stop
        assert!(counter.load(Ordering::SeqCst) <= after_stop + 1);
    }
}
