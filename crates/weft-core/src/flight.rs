use std::collections::HashMap;
use std::hash::Hash;

use parking_lot::Mutex;
use tokio::sync::oneshot;

/// Coalesces concurrent operations on the same key into one driven attempt.
///
/// The first caller for a key becomes the leader and drives the work; callers
/// arriving while the entry is pending become followers and receive a clone
/// of whatever result the leader settles with. The entry is removed when the
/// leader settles or is dropped, so one abandoned attempt can never wedge the
/// key.
pub struct FlightMap<K, R> {
    pending: Mutex<HashMap<K, Vec<oneshot::Sender<R>>>>,
}

/// Outcome of [`FlightMap::begin`].
pub enum Flight<'a, K: Eq + Hash + Clone, R: Clone> {
    /// This caller drives the operation and must settle the guard.
    Leader(FlightGuard<'a, K, R>),
    /// Another caller is already driving; await its settled result.
    Follower(oneshot::Receiver<R>),
}

/// Leader's handle on a pending entry. Settling fans the result out to every
/// follower; dropping without settling removes the entry and wakes followers
/// with a closed channel.
pub struct FlightGuard<'a, K: Eq + Hash + Clone, R: Clone> {
    map: &'a FlightMap<K, R>,
    key: K,
    settled: bool,
}

impl<K: Eq + Hash + Clone, R: Clone> FlightMap<K, R> {
    pub fn new() -> Self {
        Self { pending: Mutex::new(HashMap::new()) }
    }

    pub fn begin(&self, key: K) -> Flight<'_, K, R> {
        let mut pending = self.pending.lock();
        if let Some(waiters) = pending.get_mut(&key) {
            let (tx, rx) = oneshot::channel();
            waiters.push(tx);
            Flight::Follower(rx)
        } else {
            pending.insert(key.clone(), Vec::new());
            Flight::Leader(FlightGuard { map: self, key, settled: false })
        }
    }

    pub fn contains(&self, key: &K) -> bool {
        self.pending.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Snapshot of the currently pending keys.
    pub fn keys(&self) -> Vec<K> {
        self.pending.lock().keys().cloned().collect()
    }
}

impl<K: Eq + Hash + Clone, R: Clone> Default for FlightMap<K, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone, R: Clone> FlightGuard<'_, K, R> {
    /// Remove the entry and hand `result` to every follower.
    pub fn settle(mut self, result: &R) {
        self.settled = true;
        let waiters = self.map.pending.lock().remove(&self.key).unwrap_or_default();
        for tx in waiters {
            let _ = tx.send(result.clone());
        }
    }
}

impl<K: Eq + Hash + Clone, R: Clone> Drop for FlightGuard<'_, K, R> {
    fn drop(&mut self) {
        if !self.settled {
            // dropping the senders wakes every follower with RecvError
            self.map.pending.lock().remove(&self.key);
        }
    }
}
