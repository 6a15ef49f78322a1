//! Keyed trailing debounce on a dedicated timer thread.
//!
//! `schedule(key, value, delay)` replaces whatever was pending for `key`; when
//! the delay expires without another schedule, the latest value is delivered
//! exactly once. The worker owns the pending table and is fed through a
//! channel, so callers never block on delivery.
//!
//! Deadlines use `Instant` directly: the worker parks in `recv_timeout`, which
//! a simulated clock cannot wake.
//!
//! Safety: dropping the `Debouncer` stops the worker and joins it; values still
//! pending at that point are discarded.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel as xch;

enum Msg<K, V> {
    Schedule { key: K, value: V, delay: Duration },
    Cancel(K),
    CancelAll,
    Shutdown,
}

pub struct Debouncer<K, V> {
    tx: xch::Sender<Msg<K, V>>,
    join_handle: Option<JoinHandle<()>>,
}

impl<K, V> Debouncer<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + 'static,
    V: Send + 'static,
{
    /// Start the worker. `deliver` runs on the worker thread.
    pub fn spawn<F>(mut deliver: F) -> Self
    where
        F: FnMut(K, V) + Send + 'static,
    {
        let (tx, rx) = xch::unbounded::<Msg<K, V>>();
        let join_handle = std::thread::spawn(move || {
            let mut pending: HashMap<K, (Instant, V)> = HashMap::new();
            loop {
                let next = pending.values().map(|(at, _)| *at).min();
                let msg = match next {
                    Some(at) => rx.recv_timeout(at.saturating_duration_since(Instant::now())),
                    None => rx.recv().map_err(|_| xch::RecvTimeoutError::Disconnected),
                };
                match msg {
                    Ok(Msg::Schedule { key, value, delay }) => {
                        pending.insert(key, (Instant::now() + delay, value));
                    }
                    Ok(Msg::Cancel(key)) => {
                        pending.remove(&key);
                    }
                    Ok(Msg::CancelAll) => pending.clear(),
                    Ok(Msg::Shutdown) | Err(xch::RecvTimeoutError::Disconnected) => break,
                    Err(xch::RecvTimeoutError::Timeout) => {}
                }

                let now = Instant::now();
                let due: Vec<K> = pending
                    .iter()
                    .filter(|(_, (at, _))| *at <= now)
                    .map(|(k, _)| k.clone())
                    .collect();
                for key in due {
                    if let Some((_, value)) = pending.remove(&key) {
                        tracing::trace!(?key, "debounce fired");
                        deliver(key, value);
                    }
                }
            }
            if !pending.is_empty() {
                tracing::debug!(dropped = pending.len(), "debouncer stopped with pending values");
            }
        });
        Self {
            tx,
            join_handle: Some(join_handle),
        }
    }

    pub fn schedule(&self, key: K, value: V, delay: Duration) {
        self.post(Msg::Schedule { key, value, delay });
    }

    pub fn cancel(&self, key: K) {
        self.post(Msg::Cancel(key));
    }

    pub fn cancel_all(&self) {
        self.post(Msg::CancelAll);
    }

    fn post(&self, msg: Msg<K, V>) {
        if self.tx.send(msg).is_err() {
            tracing::warn!("debounce worker gone; update dropped");
        }
    }
}

impl<K, V> Drop for Debouncer<K, V> {
    fn drop(&mut self) {
        let _ = self.tx.send(Msg::Shutdown);
        if let Some(handle) = self.join_handle.take() {
            if handle.join().is_err() {
                tracing::warn!("debounce worker panicked during shutdown");
            }
        }
    }
}
