use std::collections::{HashMap, HashSet};

use bytes::Bytes;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::RemoteObjectCache;
use crate::models::{Favoritable, Record, RecordId, Thumbnailed};
use crate::network::{NetworkClient, Resource};
use crate::reconcile::{fingerprint, Changeset, Snapshot};
use crate::store::{FeedChange, FeedState, FeedStore, FeedSubscription};

pub type SectionId = u32;
pub type RowId = usize;

pub const MAIN_SECTION: SectionId = 0;

/// What the surface must show after an update, plus how it got there.
#[derive(Debug)]
pub struct SurfaceUpdate<'a> {
    pub sections: Vec<(SectionId, &'a [RecordId])>,
    pub changeset: &'a Changeset<RecordId>,
}

/// Whatever draws the list. The controller only hands it finished updates.
pub trait RenderingSurface<R>: Send {
    fn apply(&mut self, update: SurfaceUpdate<'_>, records: &FeedState<R>);

    /// Called once an update has been applied.
    fn settled(&mut self, _item_count: usize) {}
}

#[derive(Debug)]
struct ThumbnailResult {
    id: RecordId,
    url: String,
    image: Option<Bytes>,
}

#[derive(Debug)]
struct PendingThumbnail {
    /// Rows currently showing the record and waiting for the image.
    rows: HashSet<RowId>,
    task: JoinHandle<()>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThumbnailOutcome {
    /// The record was updated and the row reconfigured.
    Applied(Changeset<RecordId>),
    /// Every waiting row was recycled or rebound, or the record was removed,
    /// before the image arrived.
    Discarded,
    /// The image could not be loaded.
    Failed,
}

/// Owns one feed: its store, the rendered snapshot and the surface.
///
/// Everything that touches the store or the snapshot runs on the owner of
/// this value. Thumbnail fetches run as background tasks and only report
/// back through a channel drained by [`FeedController::next_thumbnail`].
pub struct FeedController<R, V> {
    store: FeedStore<R>,
    changes: FeedSubscription<R>,
    snapshot: Snapshot<SectionId, RecordId>,
    section: SectionId,
    cache: RemoteObjectCache,
    surface: V,
    bound_rows: HashMap<RowId, RecordId>,
    pending: HashMap<(RecordId, String), PendingThumbnail>,
    results_tx: mpsc::UnboundedSender<ThumbnailResult>,
    results_rx: mpsc::UnboundedReceiver<ThumbnailResult>,
}

impl<R, V> FeedController<R, V>
where
    R: Record,
    V: RenderingSurface<R>,
{
    pub fn new(name: impl Into<String>, cache: RemoteObjectCache, surface: V) -> Self {
        let mut store = FeedStore::new(name);
        let changes = store.subscribe();
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        Self {
            store,
            changes,
            snapshot: Snapshot::new(),
            section: MAIN_SECTION,
            cache,
            surface,
            bound_rows: HashMap::new(),
            pending: HashMap::new(),
            results_tx,
            results_rx,
        }
    }

    pub fn store(&self) -> &FeedStore<R> {
        &self.store
    }

    pub fn snapshot(&self) -> &Snapshot<SectionId, RecordId> {
        &self.snapshot
    }

    pub fn surface(&self) -> &V {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut V {
        &mut self.surface
    }

    pub fn cache(&self) -> &RemoteObjectCache {
        &self.cache
    }

    pub fn load(&mut self, records: impl IntoIterator<Item = R>) -> Changeset<RecordId> {
        self.store.load(records);
        self.sync()
    }

    pub fn upsert(&mut self, record: R) -> Changeset<RecordId> {
        self.store.upsert(record);
        self.sync()
    }

    pub fn remove(&mut self, id: RecordId) -> Changeset<RecordId> {
        self.store.remove(id);
        self.sync()
    }

    pub fn mutate(&mut self, id: RecordId, update: impl FnOnce(&mut R)) -> Changeset<RecordId> {
        self.store.mutate(id, update);
        self.sync()
    }

    /// Fetches `resource` and loads it. On failure the current state is kept.
    pub async fn refresh(&mut self, client: &NetworkClient, resource: &Resource) -> bool
    where
        R: DeserializeOwned,
    {
        match client.fetch_records::<R>(resource).await {
            Ok(records) => {
                self.load(records);
                true
            }
            Err(err) => {
                warn!(feed = %self.store.name(), resource = ?resource, error = %err, "failed to refresh feed");
                false
            }
        }
    }

    /// Pushes every queued store change through the reconciler. Returns the
    /// changeset of the last one.
    fn sync(&mut self) -> Changeset<RecordId> {
        let mut last = Changeset::default();
        while let Some(change) = self.changes.try_recv() {
            last = self.render(change);
        }
        last
    }

    fn render(&mut self, change: FeedChange<R>) -> Changeset<RecordId> {
        let target: Vec<(RecordId, u64)> = change
            .state
            .iter()
            .map(|(id, record)| (*id, fingerprint(record)))
            .collect();
        let changeset = self.snapshot.apply(self.section, &target);
        if changeset.is_empty() {
            debug!(feed = %self.store.name(), cause = ?change.cause, "store change left snapshot unchanged");
            return changeset;
        }

        info!(
            feed = %self.store.name(),
            cause = ?change.cause,
            deletes = changeset.deletes.len(),
            inserts = changeset.inserts.len(),
            reconfigures = changeset.reconfigures.len(),
            "applying snapshot"
        );
        let sections = self
            .snapshot
            .section_identifiers()
            .map(|section| (*section, self.snapshot.items(section)))
            .collect();
        self.surface.apply(
            SurfaceUpdate {
                sections,
                changeset: &changeset,
            },
            &change.state,
        );
        self.surface.settled(self.snapshot.len());
        changeset
    }
}

impl<R, V> FeedController<R, V>
where
    R: Favoritable,
    V: RenderingSurface<R>,
{
    pub fn set_favorite(&mut self, id: RecordId, favorite: bool) -> Changeset<RecordId> {
        self.mutate(id, |record| record.set_favorite(favorite))
    }
}

impl<R, V> FeedController<R, V>
where
    R: Thumbnailed,
    V: RenderingSurface<R>,
{
    /// Binds `row` to `id` and starts loading the record's thumbnail if it has
    /// none yet. Returns `true` when a fetch was issued.
    pub fn row_visible(&mut self, row: RowId, id: RecordId) -> bool {
        if let Some(previous) = self.bound_rows.insert(row, id) {
            if previous != id {
                self.cancel_row_fetches(row);
            }
        }

        let Some(record) = self.store.get(id) else {
            return false;
        };
        if record.has_thumbnail() {
            return false;
        }
        let Some(url) = record.thumbnail_url().map(str::to_owned) else {
            return false;
        };

        let key = (id, url.clone());
        if let Some(pending) = self.pending.get_mut(&key) {
            pending.rows.insert(row);
            return false;
        }

        let cache = self.cache.clone();
        let results = self.results_tx.clone();
        let task = tokio::spawn(async move {
            let image = cache.get(&url).await;
            let _ = results.send(ThumbnailResult { id, url, image });
        });
        self.pending.insert(
            key,
            PendingThumbnail {
                rows: HashSet::from([row]),
                task,
            },
        );
        true
    }

    /// The row went off screen or was reused. Fetches no other row waits on
    /// stop waiting; the shared cache fetch still completes and stays cached.
    pub fn row_recycled(&mut self, row: RowId) {
        self.bound_rows.remove(&row);
        self.cancel_row_fetches(row);
    }

    pub fn pending_thumbnails(&self) -> usize {
        self.pending.len()
    }

    /// Waits for the next thumbnail fetch and applies it. Returns `None` when
    /// nothing is outstanding.
    pub async fn next_thumbnail(&mut self) -> Option<ThumbnailOutcome> {
        let result = if self.pending.is_empty() {
            self.results_rx.try_recv().ok()?
        } else {
            self.results_rx.recv().await?
        };
        Some(self.apply_thumbnail(result))
    }

    /// Applies every outstanding thumbnail as it arrives.
    pub async fn settle_thumbnails(&mut self) -> Vec<ThumbnailOutcome> {
        let mut outcomes = Vec::new();
        while let Some(outcome) = self.next_thumbnail().await {
            outcomes.push(outcome);
        }
        outcomes
    }

    fn apply_thumbnail(&mut self, result: ThumbnailResult) -> ThumbnailOutcome {
        let ThumbnailResult { id, url, image } = result;
        let Some(pending) = self.pending.remove(&(id, url)) else {
            debug!(id, "discarding thumbnail for abandoned request");
            return ThumbnailOutcome::Discarded;
        };

        let shown = pending
            .rows
            .iter()
            .any(|row| self.bound_rows.get(row) == Some(&id));
        if !shown {
            debug!(id, "discarding thumbnail, no row shows the record");
            return ThumbnailOutcome::Discarded;
        }
        if self.store.get(id).is_none() {
            debug!(id, "discarding thumbnail for removed record");
            return ThumbnailOutcome::Discarded;
        }
        match image {
            Some(image) => {
                let changeset = self.mutate(id, |record| record.attach_thumbnail(image));
                ThumbnailOutcome::Applied(changeset)
            }
            None => ThumbnailOutcome::Failed,
        }
    }

    fn cancel_row_fetches(&mut self, row: RowId) {
        self.pending.retain(|(id, _), pending| {
            if pending.rows.remove(&row) && pending.rows.is_empty() {
                debug!(row, id, "abandoning thumbnail wait");
                pending.task.abort();
                false
            } else {
                true
            }
        });
    }
}
