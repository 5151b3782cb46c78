use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::Mutex as AsyncMutex;

use crate::types::ChatMessage;

pub const MAX_CONVERSATIONS: usize = 256;
pub const CONVERSATION_TTL: Duration = Duration::from_secs(30 * 60);

/// Shared handle to one conversation's history. Locking it serializes
/// concurrent requests for the same conversation id.
pub type SharedHistory = Arc<AsyncMutex<Vec<ChatMessage>>>;

/// Capacity-bounded conversation cache with LRU eviction and an idle TTL.
///
/// The outer lock covers only map bookkeeping and is never held across an
/// await; the per-conversation mutex is what a chat request holds while
/// talking to the model.
///
/// Eviction only forgets the map entry. A request still holding the evicted
/// history keeps appending to it, while the next request for that id seeds a
/// fresh one — for that window the two no longer queue on one mutex. With
/// the default capacity this is accepted behavior, not guarded against.
pub struct ConversationStore {
    capacity: usize,
    ttl: Duration,
    inner: Mutex<Inner>,
}

struct Inner {
    map: HashMap<String, Entry>,
    /// Access order, front = least recently used.
    order: VecDeque<String>,
}

struct Entry {
    history: SharedHistory,
    last_used: Instant,
}

impl ConversationStore {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity,
            ttl,
            inner: Mutex::new(Inner { map: HashMap::new(), order: VecDeque::new() }),
        }
    }

    /// Fetch the history for `id`, seeding a fresh one with `seed` when the
    /// id is unknown or its entry has idled out.
    pub fn get_or_seed(
        &self,
        id: &str,
        seed: impl FnOnce() -> Vec<ChatMessage>,
    ) -> SharedHistory {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        let now = Instant::now();

        if let Some(entry) = inner.map.get_mut(id) {
            if now.duration_since(entry.last_used) < self.ttl {
                entry.last_used = now;
                let history = entry.history.clone();
                touch(&mut inner.order, id);
                return history;
            }
            inner.map.remove(id);
            inner.order.retain(|key| key != id);
        }

        if inner.map.len() >= self.capacity {
            if let Some(evicted) = inner.order.pop_front() {
                inner.map.remove(&evicted);
            }
        }

        let history: SharedHistory = Arc::new(AsyncMutex::new(seed()));
        inner
            .map
            .insert(id.to_string(), Entry { history: history.clone(), last_used: now });
        inner.order.push_back(id.to_string());
        history
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().unwrap().map.len()
    }
}

fn touch(order: &mut VecDeque<String>, id: &str) {
    order.retain(|key| key != id);
    order.push_back(id.to_string());
}
