use std::sync::Arc;

use indexmap::IndexMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::models::{Record, RecordId};

/// Records keyed by identity, in display order.
pub type FeedState<R> = IndexMap<RecordId, R>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeCause {
    Loaded,
    Upserted(RecordId),
    Removed(RecordId),
    Mutated(RecordId),
}

/// Full state published after every mutation, tagged with what caused it.
#[derive(Debug, Clone)]
pub struct FeedChange<R> {
    pub state: Arc<FeedState<R>>,
    pub cause: ChangeCause,
}

impl<R> FeedChange<R> {
    pub fn identities(&self) -> Vec<RecordId> {
        self.state.keys().copied().collect()
    }
}

/// Receiving half of a store subscription. Dropping it detaches.
#[derive(Debug)]
pub struct FeedSubscription<R> {
    rx: mpsc::UnboundedReceiver<FeedChange<R>>,
}

impl<R> FeedSubscription<R> {
    pub async fn recv(&mut self) -> Option<FeedChange<R>> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<FeedChange<R>> {
        self.rx.try_recv().ok()
    }
}

/// Ordered, identity-keyed collection of records for one feed.
///
/// All mutations take `&mut self`, so the owner serializes them; each one that
/// changes the state publishes the resulting state to every subscriber before
/// returning. Subscribers see changes in mutation order and get no replay, use
/// [`FeedStore::current`] to synchronize first.
pub struct FeedStore<R> {
    name: String,
    state: Arc<FeedState<R>>,
    subscribers: Vec<mpsc::UnboundedSender<FeedChange<R>>>,
}

impl<R: Record> FeedStore<R> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(FeedState::new()),
            subscribers: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn current(&self) -> Arc<FeedState<R>> {
        Arc::clone(&self.state)
    }

    pub fn get(&self, id: RecordId) -> Option<&R> {
        self.state.get(&id)
    }

    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    pub fn identities(&self) -> Vec<RecordId> {
        self.state.keys().copied().collect()
    }

    pub fn subscribe(&mut self) -> FeedSubscription<R> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        FeedSubscription { rx }
    }

    /// Replaces the whole collection, keeping the input order. A repeated
    /// identity keeps its first position and takes the last value.
    pub fn load(&mut self, records: impl IntoIterator<Item = R>) {
        let mut state = FeedState::new();
        for record in records {
            state.insert(record.id(), record);
        }
        info!(feed = %self.name, count = state.len(), "loaded feed");
        self.state = Arc::new(state);
        self.publish(ChangeCause::Loaded);
    }

    /// Appends a new record or replaces an existing one in place. Returns
    /// `true` when the identity was new.
    pub fn upsert(&mut self, record: R) -> bool {
        let id = record.id();
        let (_, previous) = Arc::make_mut(&mut self.state).insert_full(id, record);
        self.publish(ChangeCause::Upserted(id));
        previous.is_none()
    }

    /// Removes a record, keeping the order of the others. Unknown identities
    /// are ignored.
    pub fn remove(&mut self, id: RecordId) -> Option<R> {
        if !self.state.contains_key(&id) {
            debug!(feed = %self.name, id, "remove on unknown record ignored");
            return None;
        }
        let removed = Arc::make_mut(&mut self.state).shift_remove(&id);
        self.publish(ChangeCause::Removed(id));
        removed
    }

    /// Applies `update` to the record in place. Unknown identities are
    /// ignored, and an update that changes the identity is rejected.
    pub fn mutate(&mut self, id: RecordId, update: impl FnOnce(&mut R)) -> bool {
        let Some(existing) = self.state.get(&id) else {
            debug!(feed = %self.name, id, "mutate on unknown record ignored");
            return false;
        };

        let mut updated = existing.clone();
        update(&mut updated);
        if updated.id() != id {
            warn!(feed = %self.name, id, new_id = updated.id(), "rejecting mutation that changes record identity");
            return false;
        }

        if let Some(slot) = Arc::make_mut(&mut self.state).get_mut(&id) {
            *slot = updated;
        }
        self.publish(ChangeCause::Mutated(id));
        true
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.iter().filter(|tx| !tx.is_closed()).count()
    }

    fn publish(&mut self, cause: ChangeCause) {
        let change = FeedChange {
            state: Arc::clone(&self.state),
            cause,
        };
        self.subscribers.retain(|tx| tx.send(change.clone()).is_ok());
    }
}
