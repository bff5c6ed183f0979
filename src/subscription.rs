//! Tracks active query consumers and drives their refetches.
//!
//! Activating a query registers its key and spawns a watcher task that
//! refetches on mount, on every `refetch_interval` tick, on focus regain, and
//! when the key is invalidated through the client. Deactivating cancels the
//! watcher, tears down its timer and listeners, and cancels any in-flight run.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};
use tracing::debug;

use crate::cancel::CancellationToken;
use crate::executor::QueryExecutor;

/// What makes an active query refetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Triggers {
    pub on_mount: bool,
    pub on_window_focus: bool,
    pub interval: Option<Duration>,
}

/// Registry of active keys plus the invalidation and focus channels.
#[derive(Debug)]
pub struct SubscriptionManager {
    active: DashMap<String, usize>,
    invalidation_tx: broadcast::Sender<String>,
    focus_tx: broadcast::Sender<()>,
}

impl SubscriptionManager {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (invalidation_tx, _) = broadcast::channel(capacity.max(1));
        let (focus_tx, _) = broadcast::channel(capacity.max(1));
        Self {
            active: DashMap::new(),
            invalidation_tx,
            focus_tx,
        }
    }

    /// Returns `true` if at least one consumer of `key` is active.
    pub fn is_active(&self, key: &str) -> bool {
        self.active.contains_key(key)
    }

    /// Keys with at least one active consumer, sorted.
    pub fn active_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.active.iter().map(|entry| entry.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Tells active consumers of `key` to refetch.
    pub fn notify_invalidated(&self, key: &str) {
        // An error only means nobody is listening.
        let _ = self.invalidation_tx.send(key.to_string());
    }

    /// Tells active consumers that opted in that focus was regained.
    pub fn notify_focus(&self) {
        let _ = self.focus_tx.send(());
    }

    /// Activates a consumer and returns the handle that deactivates it.
    pub fn activate<T>(&self, executor: Arc<QueryExecutor<T>>, triggers: Triggers) -> Activation
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let key = executor.key().to_string();
        *self.active.entry(key.clone()).or_insert(0) += 1;
        debug!(key = %key, ?triggers, "query activated");

        let token = CancellationToken::new();
        let in_flight = executor.clone();
        token.on_cancel(move || in_flight.cancel());

        let watcher = Watcher {
            executor,
            triggers,
            token: token.clone(),
            invalidations: self.invalidation_tx.subscribe(),
            focus: self.focus_tx.subscribe(),
        };
        let join = tokio::spawn(watcher.run());

        Activation {
            key,
            token,
            join: Some(join),
        }
    }

    /// Deactivates a consumer previously returned by [`activate`](Self::activate).
    pub fn deactivate(&self, mut activation: Activation) {
        activation.token.cancel();
        if let Some(join) = activation.join.take() {
            join.abort();
        }
        self.active
            .remove_if_mut(&activation.key, |_, count| {
                *count -= 1;
                *count == 0
            });
        debug!(key = %activation.key, "query deactivated");
    }
}

/// A live activation of one query consumer.
#[derive(Debug)]
pub struct Activation {
    key: String,
    token: CancellationToken,
    join: Option<JoinHandle<()>>,
}

impl Activation {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// `false` once the activation has been torn down.
    pub fn is_current(&self) -> bool {
        !self.token.is_cancelled()
    }
}

struct Watcher<T> {
    executor: Arc<QueryExecutor<T>>,
    triggers: Triggers,
    token: CancellationToken,
    invalidations: broadcast::Receiver<String>,
    focus: broadcast::Receiver<()>,
}

impl<T> Watcher<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    async fn run(mut self) {
        if self.triggers.on_mount {
            self.spawn_run(false);
        }

        // Skip the immediate first tick, as the timer subscription does.
        let mut timer = self
            .triggers
            .interval
            .filter(|period| !period.is_zero())
            .map(|period| {
                let mut timer = interval_at(Instant::now() + period, period);
                timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
                timer
            });
        let on_focus = self.triggers.on_window_focus;

        loop {
            tokio::select! {
                biased;
                () = self.token.cancelled() => break,
                received = self.invalidations.recv() => match received {
                    Ok(key) if key == self.executor.key() => self.spawn_run(true),
                    Ok(_) => {}
                    // Missed notifications may have named our key.
                    Err(RecvError::Lagged(_)) => self.spawn_run(true),
                    Err(RecvError::Closed) => break,
                },
                received = self.focus.recv(), if on_focus => match received {
                    Ok(()) | Err(RecvError::Lagged(_)) => {
                        if self.token.is_cancelled() {
                            break;
                        }
                        self.spawn_run(false);
                    }
                    Err(RecvError::Closed) => break,
                },
                () = tick(&mut timer) => self.spawn_run(false),
            }
        }
    }

    fn spawn_run(&self, skip_cache: bool) {
        let executor = self.executor.clone();
        let token = self.token.clone();
        tokio::spawn(async move {
            executor.run_active(skip_cache, &token).await;
        });
    }
}

async fn tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}
