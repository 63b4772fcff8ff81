use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use shared::{
    domain::{CreatableRow, ResourceRow, RowId},
    error::unwrap_data,
    protocol::{normalize_list_response, ListResult, QueryParams, ResponseShape},
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

pub mod error;
pub mod jobs;
mod reports;
pub mod stats;
pub mod transport;

pub use error::{ControllerError, Operation, TransportError};
pub use jobs::{AutoRefreshHandle, BackendJob};
pub use reports::AuditDecision;
pub use stats::{DeriveStats, DerivedStats, StatValue};
pub use transport::{HttpResourceEndpoint, ResourceEndpoint};

/// Period of the background list refresh most views run.
pub const AUTO_REFRESH_INTERVAL: Duration = Duration::from_secs(30);
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// What to do with a list response that arrives after a newer one was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StalePolicy {
    /// Apply only the response to the newest issued request. Older responses
    /// are dropped even when the newer request fails, so the cache keeps the
    /// last applied page. Local deletions count as applied state.
    #[default]
    DiscardSuperseded,
    /// Apply every response as it completes; the last one to resolve wins.
    CompletionOrder,
}

#[derive(Debug, Clone, Default)]
pub struct ControllerOptions {
    /// Filter seeded by the view that navigated here, e.g. `messageId`.
    pub initial_filter: BTreeMap<String, String>,
    pub page_size: Option<u32>,
    pub stale_policy: StalePolicy,
}

/// The rows on screen together with what was derived from them. Replaced as
/// a whole, never edited in place.
#[derive(Debug, Clone)]
pub struct ListSnapshot<R> {
    pub data: Vec<R>,
    pub total: u64,
    pub stats: DerivedStats,
    pub fetched_at: Option<DateTime<Utc>>,
}

impl<R: DeriveStats> ListSnapshot<R> {
    fn new(data: Vec<R>, total: u64, fetched_at: Option<DateTime<Utc>>) -> Self {
        let stats = R::derive_stats(&data);
        Self {
            data,
            total,
            stats,
            fetched_at,
        }
    }
}

impl<R> Default for ListSnapshot<R> {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            total: 0,
            stats: DerivedStats::default(),
            fetched_at: None,
        }
    }
}

/// Create-or-update, decided by whoever built the row.
#[derive(Debug, Clone)]
pub enum RowEdit<R: CreatableRow> {
    New(R::Draft),
    Existing(R),
}

#[derive(Debug, Clone)]
pub enum ControllerEvent<R> {
    SnapshotUpdated(Arc<ListSnapshot<R>>),
    /// The list payload matched no known shape and was shown as empty.
    MalformedResponse { resource: &'static str },
    OperationFailed { operation: Operation, message: String },
}

struct ControllerState<R> {
    snapshot: Arc<ListSnapshot<R>>,
    last_params: QueryParams,
    issued_seq: u64,
    applied_seq: u64,
}

struct BusyGuard<'a>(&'a AtomicUsize);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Owns one list view: its query state, the cached page of rows and the
/// stats derived from them.
pub struct ResourceListController<R: ResourceRow + DeriveStats> {
    endpoint: Arc<dyn ResourceEndpoint>,
    stale_policy: StalePolicy,
    inner: Mutex<ControllerState<R>>,
    in_flight: AtomicUsize,
    events: broadcast::Sender<ControllerEvent<R>>,
}

impl<R: ResourceRow + DeriveStats> ResourceListController<R> {
    pub fn new(endpoint: Arc<dyn ResourceEndpoint>) -> Arc<Self> {
        Self::new_with_options(endpoint, ControllerOptions::default())
    }

    pub fn new_with_options(
        endpoint: Arc<dyn ResourceEndpoint>,
        options: ControllerOptions,
    ) -> Arc<Self> {
        let mut params = QueryParams {
            filter: options.initial_filter,
            ..QueryParams::default()
        };
        if let Some(page_size) = options.page_size {
            params.page_size = page_size;
        }
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            endpoint,
            stale_policy: options.stale_policy,
            inner: Mutex::new(ControllerState {
                snapshot: Arc::new(ListSnapshot::default()),
                last_params: params,
                issued_seq: 0,
                applied_seq: 0,
            }),
            in_flight: AtomicUsize::new(0),
            events,
        })
    }

    pub fn resource() -> &'static str {
        R::KIND.name()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent<R>> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> Arc<ListSnapshot<R>> {
        Arc::clone(&self.inner.lock().await.snapshot)
    }

    /// Params of the most recent fetch, or the initial ones before any.
    pub async fn last_params(&self) -> QueryParams {
        self.inner.lock().await.last_params.clone()
    }

    /// True while any fetch, mutation or job trigger is outstanding.
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    fn busy(&self) -> BusyGuard<'_> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        BusyGuard(&self.in_flight)
    }

    fn fail(&self, err: ControllerError) -> ControllerError {
        let _ = self.events.send(ControllerEvent::OperationFailed {
            operation: err.operation(),
            message: err.to_string(),
        });
        err
    }

    fn mutation_failed(&self, operation: Operation, source: TransportError) -> ControllerError {
        self.fail(ControllerError::MutationFailed {
            resource: Self::resource(),
            operation,
            source,
        })
    }

    /// Loads a page and, unless a newer state is already showing, makes it
    /// the cached snapshot. The normalized result is returned either way.
    pub async fn fetch(&self, params: QueryParams) -> Result<ListResult<R>, ControllerError> {
        params
            .validate()
            .map_err(|reason| {
                self.fail(ControllerError::InvalidQuery {
                    operation: Operation::Fetch,
                    reason,
                })
            })?;

        let seq = {
            let mut guard = self.inner.lock().await;
            guard.issued_seq += 1;
            guard.last_params = params.clone();
            guard.issued_seq
        };

        let result = {
            let _busy = self.busy();
            self.load(&params).await.map_err(|err| self.fail(err))?
        };
        self.apply(seq, &result).await;
        Ok(result)
    }

    /// Fetches again with the last-used params.
    pub async fn reload(&self) -> Result<ListResult<R>, ControllerError> {
        let params = self.last_params().await;
        self.fetch(params).await
    }

    async fn load(&self, params: &QueryParams) -> Result<ListResult<R>, ControllerError> {
        let fetch_failed = |source: TransportError| ControllerError::FetchFailed {
            resource: Self::resource(),
            source,
        };
        let raw = self.endpoint.list(params).await.map_err(fetch_failed)?;
        let normalized = normalize_list_response(raw);
        if normalized.shape == ResponseShape::Malformed {
            warn!(
                resource = Self::resource(),
                "list response matched no known shape; showing an empty page"
            );
            let _ = self.events.send(ControllerEvent::MalformedResponse {
                resource: Self::resource(),
            });
        }
        let data = normalized
            .rows
            .into_iter()
            .map(serde_json::from_value::<R>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| fetch_failed(TransportError::Json(err)))?;
        Ok(ListResult {
            data,
            total: normalized.total,
        })
    }

    async fn apply(&self, seq: u64, result: &ListResult<R>) -> bool {
        let snapshot = {
            let mut guard = self.inner.lock().await;
            if self.stale_policy == StalePolicy::DiscardSuperseded
                && (seq <= guard.applied_seq || seq < guard.issued_seq)
            {
                debug!(
                    resource = Self::resource(),
                    seq,
                    applied_seq = guard.applied_seq,
                    issued_seq = guard.issued_seq,
                    "discarding superseded list response"
                );
                return false;
            }
            guard.applied_seq = guard.applied_seq.max(seq);
            let snapshot = Arc::new(ListSnapshot::new(
                result.data.clone(),
                result.total,
                Some(Utc::now()),
            ));
            guard.snapshot = Arc::clone(&snapshot);
            snapshot
        };
        info!(
            resource = Self::resource(),
            seq,
            rows = snapshot.data.len(),
            total = snapshot.total,
            "list snapshot applied"
        );
        let _ = self.events.send(ControllerEvent::SnapshotUpdated(snapshot));
        true
    }

    /// Re-fetch after a successful mutation. A failure here does not undo the
    /// mutation; it is logged and already announced by `fetch`.
    async fn resync(&self) {
        if let Err(err) = self.reload().await {
            warn!(resource = Self::resource(), error = %err, "resync after mutation failed");
        }
    }

    fn spawn_resync(self: &Arc<Self>, delay: Option<Duration>) {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            controller.resync().await;
        });
    }

    /// Single-row lookup. Leaves the cached page alone.
    pub async fn get(&self, id: &RowId) -> Result<R, ControllerError> {
        let fetch_failed = |source: TransportError| ControllerError::FetchFailed {
            resource: Self::resource(),
            source,
        };
        let _busy = self.busy();
        let body = self
            .endpoint
            .get(id)
            .await
            .map_err(|source| self.fail(fetch_failed(source)))?;
        serde_json::from_value(unwrap_data(body))
            .map_err(|err| self.fail(fetch_failed(TransportError::Json(err))))
    }

    /// Inserts a row, then re-fetches the current page. The backend assigns
    /// the id, so the new row is only known once it echoes it back.
    pub async fn create(&self, draft: &R::Draft) -> Result<Option<R>, ControllerError>
    where
        R: CreatableRow,
    {
        let body = serde_json::to_value(draft)
            .map_err(|err| self.mutation_failed(Operation::Create, err.into()))?;
        let reply = {
            let _busy = self.busy();
            self.endpoint
                .create(body)
                .await
                .map_err(|source| self.mutation_failed(Operation::Create, source))?
        };
        info!(resource = Self::resource(), "row created");
        self.resync().await;
        Ok(reply.and_then(decode_echo))
    }

    /// Sends the full row. Whether `row.id` exists is for the backend to say.
    pub async fn update(&self, row: &R) -> Result<R, ControllerError> {
        let body = serde_json::to_value(row)
            .map_err(|err| self.mutation_failed(Operation::Update, err.into()))?;
        let reply = {
            let _busy = self.busy();
            self.endpoint
                .update(body)
                .await
                .map_err(|source| self.mutation_failed(Operation::Update, source))?
        };
        info!(resource = Self::resource(), id = %row.row_id(), "row updated");
        self.resync().await;
        Ok(reply.and_then(decode_echo).unwrap_or_else(|| row.clone()))
    }

    pub async fn save(&self, edit: RowEdit<R>) -> Result<Option<R>, ControllerError>
    where
        R: CreatableRow,
    {
        match edit {
            RowEdit::New(draft) => self.create(&draft).await,
            RowEdit::Existing(row) => self.update(&row).await.map(Some),
        }
    }

    pub async fn delete(self: &Arc<Self>, id: &RowId) -> Result<(), ControllerError> {
        self.delete_many(std::slice::from_ref(id)).await
    }

    /// Deletes on the backend, drops the rows from the cached page at once and
    /// re-fetches in the background. Returns before that re-fetch completes.
    pub async fn delete_many(self: &Arc<Self>, ids: &[RowId]) -> Result<(), ControllerError> {
        if ids.is_empty() {
            return Ok(());
        }
        {
            let _busy = self.busy();
            self.endpoint
                .delete(ids)
                .await
                .map_err(|source| self.mutation_failed(Operation::Delete, source))?;
        }
        self.remove_local(ids).await;
        self.spawn_resync(None);
        Ok(())
    }

    async fn remove_local(&self, ids: &[RowId]) {
        let snapshot = {
            let mut guard = self.inner.lock().await;
            let current = Arc::clone(&guard.snapshot);
            let data: Vec<R> = current
                .data
                .iter()
                .filter(|row| !ids.contains(row.row_id()))
                .cloned()
                .collect();
            let removed = (current.data.len() - data.len()) as u64;
            let snapshot = Arc::new(ListSnapshot::new(
                data,
                current.total.saturating_sub(removed),
                current.fetched_at,
            ));
            guard.snapshot = Arc::clone(&snapshot);
            // Every fetch issued so far may still carry the deleted rows.
            guard.applied_seq = guard.issued_seq;
            snapshot
        };
        info!(
            resource = Self::resource(),
            removed = ids.len(),
            rows = snapshot.data.len(),
            "rows removed locally"
        );
        let _ = self.events.send(ControllerEvent::SnapshotUpdated(snapshot));
    }
}

/// Mutation replies are either the row itself, `{ code, msg, data: row }` or
/// a bare status envelope. Only the first two carry a row.
fn decode_echo<R: DeserializeOwned>(body: Value) -> Option<R> {
    serde_json::from_value(unwrap_data(body)).ok()
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
