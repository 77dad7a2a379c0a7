//! Load / optimistic-mutate / reconcile state machine shared by every list page.
//!
//! Network calls never hold the state lock. Each reset-load bumps a generation
//! counter; a resolved request whose generation is no longer current is
//! discarded instead of committed.

use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use serde_json::Value;
use shared::protocol::ListPage;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    debounce::DebouncedAction,
    error::RequestError,
    failure_gate::{FailureGate, FailureGateOptions},
    list_state::{ErrorKind, Filters, ListState},
    network::{AlwaysOnline, NetworkStatus},
    normalize::{absorb, normalize_all, Entity},
    notify::{NotificationSink, Toast},
    resources::{ListResource, Mutation, MutationKind, PageQuery},
};

pub const DEFAULT_PAGE_SIZE: usize = 25;

/// How `has_more` is derived when a page carries no explicit signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HasMorePolicy {
    /// Only a next cursor or `hasMore` flag means there is more.
    CursorOnly,
    /// Additionally treat a page of exactly `page_size` raw records as "more".
    /// Best effort: it over-reports when the last page is exactly full, and
    /// under-reports when the backend caps pages below `page_size`.
    #[default]
    CursorOrFullPage,
}

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub page_size: usize,
    pub has_more_policy: HasMorePolicy,
    pub failure_gate: FailureGateOptions,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            has_more_policy: HasMorePolicy::default(),
            failure_gate: FailureGateOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Committed,
    /// The endpoint answered "not found"; committed as an empty page.
    NotFoundAsEmpty,
    Failed,
    /// A newer reset-load or `dispose` superseded this request.
    Stale,
    /// Preconditions not met (nothing more to load, already loading, disposed).
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    Committed,
    /// Write failed; the edited field was restored in place.
    Reverted,
    /// Write failed; the list was reloaded from the server.
    Reconciled,
    /// A create failed; nothing was applied locally.
    Failed,
    /// The item has no field this mutation could change.
    Unsupported,
    /// Unknown id, list not in an editable state, or controller disposed.
    Skipped,
    /// The result arrived after the controller was disposed.
    Discarded,
}

/// An optimistic edit: what was applied locally and what to restore.
/// `applied` is `None` when the edit removed the item.
#[derive(Debug, Clone, PartialEq)]
pub struct Optimistic<T> {
    pub applied: Option<T>,
    pub revert_to: T,
}

/// Lives only while the write for one optimistic edit is in flight.
#[derive(Debug, Clone)]
pub struct PendingMutation<T> {
    pub target_id: String,
    pub kind: MutationKind,
    pub change: Optimistic<T>,
    generation: u64,
}

struct ControllerInner<T> {
    state: ListState<T>,
    filters: Filters,
    generation: u64,
    disposed: bool,
    load_failures: FailureGate,
}

pub struct AsyncListController<R: ListResource> {
    resource: R,
    notifier: Arc<dyn NotificationSink>,
    network: Arc<dyn NetworkStatus>,
    options: ControllerOptions,
    inner: Mutex<ControllerInner<R::Item>>,
}

fn capitalized(label: &str) -> String {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl<R: ListResource> AsyncListController<R> {
    pub fn new(resource: R, notifier: Arc<dyn NotificationSink>) -> Self {
        Self::new_with_dependencies(
            resource,
            notifier,
            Arc::new(AlwaysOnline),
            ControllerOptions::default(),
        )
    }

    pub fn new_with_dependencies(
        resource: R,
        notifier: Arc<dyn NotificationSink>,
        network: Arc<dyn NetworkStatus>,
        options: ControllerOptions,
    ) -> Self {
        let load_failures = FailureGate::new(options.failure_gate.clone());
        Self {
            resource,
            notifier,
            network,
            options,
            inner: Mutex::new(ControllerInner {
                state: ListState::default(),
                filters: Filters::new(),
                generation: 0,
                disposed: false,
                load_failures,
            }),
        }
    }

    /// Initial filters, applied before the first load.
    pub fn with_filters(mut self, filters: Filters) -> Self {
        self.inner.get_mut().filters = filters;
        self
    }

    pub fn resource(&self) -> &R {
        &self.resource
    }

    pub async fn snapshot(&self) -> ListState<R::Item> {
        self.inner.lock().await.state.clone()
    }

    pub async fn filters(&self) -> Filters {
        self.inner.lock().await.filters.clone()
    }

    /// Page unmount: every in-flight result is discarded and later calls no-op.
    pub async fn dispose(&self) {
        let mut inner = self.inner.lock().await;
        inner.disposed = true;
        inner.generation += 1;
        debug!(resource = self.resource.label(), "list: disposed");
    }

    pub async fn set_filter(&self, key: impl Into<String>, value: impl Into<String>) -> LoadOutcome {
        let (key, value) = (key.into(), value.into());
        self.change_filters(|filters| {
            if filters.get(&key) == Some(&value) {
                return false;
            }
            filters.insert(key, value);
            true
        })
        .await
    }

    pub async fn clear_filter(&self, key: &str) -> LoadOutcome {
        self.change_filters(|filters| filters.remove(key).is_some())
            .await
    }

    pub async fn replace_filters(&self, next: Filters) -> LoadOutcome {
        self.change_filters(|filters| {
            if *filters == next {
                return false;
            }
            *filters = next;
            true
        })
        .await
    }

    async fn change_filters<F>(&self, apply: F) -> LoadOutcome
    where
        F: FnOnce(&mut Filters) -> bool,
    {
        {
            let mut inner = self.inner.lock().await;
            if inner.disposed || !apply(&mut inner.filters) {
                return LoadOutcome::Skipped;
            }
            inner.state.clear_for_new_query();
        }
        self.load(true).await
    }

    pub async fn load_more(&self) -> LoadOutcome {
        self.load(false).await
    }

    /// `reset` starts a fresh query; otherwise the next page is appended.
    pub async fn load(&self, reset: bool) -> LoadOutcome {
        let label = self.resource.label();
        let (generation, query) = {
            let mut inner = self.inner.lock().await;
            if inner.disposed {
                return LoadOutcome::Skipped;
            }
            if !reset && (!inner.state.has_more || inner.state.status.is_loading()) {
                return LoadOutcome::Skipped;
            }
            if reset {
                inner.generation += 1;
            }
            inner.state.begin_load(reset);

            let cursor = if reset {
                None
            } else {
                inner.state.cursor.clone()
            };
            let offset = (!reset && cursor.is_none()).then_some(inner.state.items.len());
            let query = PageQuery {
                filters: inner.filters.clone(),
                limit: self.options.page_size,
                cursor,
                offset,
            };
            (inner.generation, query)
        };

        debug!(resource = label, generation, reset, "list: load started");
        let result = self
            .resource
            .fetch_page(&query)
            .await
            .and_then(|value| ListPage::from_value(value).map_err(RequestError::Decode));

        let mut inner = self.inner.lock().await;
        if inner.disposed || inner.generation != generation {
            debug!(
                resource = label,
                generation,
                current = inner.generation,
                "list: discarding stale load result"
            );
            return LoadOutcome::Stale;
        }

        match result {
            Ok(page) => {
                let has_more = self.derive_has_more(&page);
                let items = normalize_all::<R::Item>(page.items);
                let count = items.len();
                inner.state.commit_page(items, page.next_cursor, has_more, reset);
                inner.load_failures.record_success();
                debug!(resource = label, generation, count, has_more, "list: page committed");
                LoadOutcome::Committed
            }
            Err(err) if err.is_not_found() => {
                inner.state.commit_page(Vec::new(), None, false, reset);
                inner.load_failures.record_success();
                debug!(resource = label, "list: endpoint not found, showing empty list");
                LoadOutcome::NotFoundAsEmpty
            }
            Err(err) => {
                let kind = if err.is_network() || !self.network.is_online() {
                    ErrorKind::Network
                } else {
                    ErrorKind::Other
                };
                let message = err.user_message();
                inner.state.fail(message.clone(), kind, reset);
                let surface = inner.load_failures.should_notify(&message);
                drop(inner);

                warn!(resource = label, ?kind, "list: load failed: {message}");
                if surface {
                    self.notifier
                        .notify(Toast::error(format!("Couldn't load {label}s"), message));
                }
                LoadOutcome::Failed
            }
        }
    }

    fn derive_has_more(&self, page: &ListPage) -> bool {
        if page.has_explicit_signal() {
            return page.has_more.unwrap_or(page.next_cursor.is_some());
        }
        match self.options.has_more_policy {
            HasMorePolicy::CursorOnly => false,
            HasMorePolicy::CursorOrFullPage => {
                self.options.page_size > 0 && page.items.len() >= self.options.page_size
            }
        }
    }

    /// Applies `mutation` locally, then writes it.
    ///
    /// Failed toggles are reverted in place; failed status changes and
    /// deletes reload the list instead.
    pub async fn mutate(&self, id: &str, mutation: Mutation) -> MutationOutcome {
        let label = self.resource.label();
        let pending = {
            let mut inner = self.inner.lock().await;
            if inner.disposed || !inner.state.status.allows_item_edits() {
                return MutationOutcome::Skipped;
            }
            let generation = inner.generation;
            match apply_optimistic(&mut inner.state, id, &mutation, generation) {
                Ok(pending) => pending,
                Err(outcome) => return outcome,
            }
        };

        debug!(resource = label, id, ?mutation, "list: optimistic update applied");
        let result = self.resource.write(id, &mutation).await;

        let mut inner = self.inner.lock().await;
        if inner.disposed {
            return MutationOutcome::Discarded;
        }
        let current = inner.generation == pending.generation;

        match result {
            Ok(response) => {
                if current && pending.kind != MutationKind::Delete {
                    absorb_response(&mut inner.state, id, &response);
                }
                drop(inner);
                info!(resource = label, id, ?mutation, "list: mutation committed");
                self.notifier.notify(Toast::success(format!(
                    "{} {}",
                    capitalized(label),
                    mutation.done_verb()
                )));
                MutationOutcome::Committed
            }
            Err(err) => {
                let title = match pending.kind {
                    MutationKind::Delete => format!("Couldn't delete {label}"),
                    _ => format!("Couldn't update {label}"),
                };
                warn!(resource = label, id, ?mutation, "list: mutation failed: {err}");

                if pending.kind == MutationKind::Toggle {
                    if current {
                        if let (Some(item), Some(previous)) =
                            (inner.state.get_mut(id), pending.change.revert_to.enabled())
                        {
                            item.set_enabled(previous);
                        }
                    }
                    drop(inner);
                    self.notifier.notify(Toast::error(title, err.user_message()));
                    return MutationOutcome::Reverted;
                }

                drop(inner);
                self.notifier.notify(Toast::error(title, err.user_message()));
                self.load(true).await;
                MutationOutcome::Reconciled
            }
        }
    }

    /// Creates (`id == None`) or updates an item.
    ///
    /// Creates reload the list on success. Updates merge `payload` into the
    /// item optimistically and restore the whole prior item on failure.
    pub async fn upsert(&self, id: Option<&str>, payload: Value) -> MutationOutcome {
        let label = self.resource.label();
        let Some(id) = id else {
            if self.inner.lock().await.disposed {
                return MutationOutcome::Skipped;
            }
            return match self.resource.upsert(None, &payload).await {
                Ok(_) => {
                    info!(resource = label, "list: item created");
                    self.notifier
                        .notify(Toast::success(format!("{} created", capitalized(label))));
                    self.load(true).await;
                    MutationOutcome::Committed
                }
                Err(err) => {
                    warn!(resource = label, "list: create failed: {err}");
                    self.notifier.notify(Toast::error(
                        format!("Couldn't save {label}"),
                        err.user_message(),
                    ));
                    MutationOutcome::Failed
                }
            };
        };

        let pending = {
            let mut inner = self.inner.lock().await;
            if inner.disposed || !inner.state.status.allows_item_edits() {
                return MutationOutcome::Skipped;
            }
            let Some(previous) = inner.state.get(id).cloned() else {
                return MutationOutcome::Skipped;
            };
            let Some(applied) = absorb(&previous, &payload) else {
                return MutationOutcome::Unsupported;
            };
            inner.state.replace(applied.clone());
            PendingMutation {
                target_id: id.to_string(),
                kind: MutationKind::Upsert,
                change: Optimistic {
                    applied: Some(applied),
                    revert_to: previous,
                },
                generation: inner.generation,
            }
        };

        let result = self.resource.upsert(Some(id), &payload).await;

        let mut inner = self.inner.lock().await;
        if inner.disposed {
            return MutationOutcome::Discarded;
        }
        let current = inner.generation == pending.generation;
        match result {
            Ok(response) => {
                if current {
                    absorb_response(&mut inner.state, id, &response);
                }
                drop(inner);
                info!(resource = label, id, "list: item saved");
                self.notifier
                    .notify(Toast::success(format!("{} saved", capitalized(label))));
                MutationOutcome::Committed
            }
            Err(err) => {
                if current {
                    inner.state.replace(pending.change.revert_to);
                }
                drop(inner);
                warn!(resource = label, id, "list: save failed: {err}");
                self.notifier
                    .notify(Toast::error(format!("Couldn't save {label}"), err.user_message()));
                MutationOutcome::Reverted
            }
        }
    }
}

impl<R: ListResource + 'static> AsyncListController<R> {
    /// Retry affordance: bursts of calls collapse into one reset-load.
    pub fn debounced_retry(self: &Arc<Self>, quiet: Duration) -> DebouncedAction {
        let controller: Weak<Self> = Arc::downgrade(self);
        DebouncedAction::new(quiet, move || {
            let controller = controller.clone();
            async move {
                if let Some(controller) = controller.upgrade() {
                    controller.load(true).await;
                }
            }
        })
    }
}

fn apply_optimistic<T: Entity>(
    state: &mut ListState<T>,
    id: &str,
    mutation: &Mutation,
    generation: u64,
) -> Result<PendingMutation<T>, MutationOutcome> {
    let kind = mutation.kind();
    let change = match mutation {
        Mutation::Delete => {
            let (_, removed) = state.remove(id).ok_or(MutationOutcome::Skipped)?;
            Optimistic {
                applied: None,
                revert_to: removed,
            }
        }
        Mutation::Enable | Mutation::Disable | Mutation::SetStatus(_) => {
            let item = state.get_mut(id).ok_or(MutationOutcome::Skipped)?;
            let previous = item.clone();
            let supported = match mutation {
                Mutation::Enable => item.set_enabled(true),
                Mutation::Disable => item.set_enabled(false),
                Mutation::SetStatus(status) => item.set_status(status),
                Mutation::Delete => false,
            };
            if !supported {
                *item = previous;
                return Err(MutationOutcome::Unsupported);
            }
            Optimistic {
                applied: Some(item.clone()),
                revert_to: previous,
            }
        }
    };

    Ok(PendingMutation {
        target_id: id.to_string(),
        kind,
        change,
        generation,
    })
}

/// Overwrites the item with the server's representation when the response
/// describes it; acknowledgements and empty bodies leave it untouched.
fn absorb_response<T: Entity>(state: &mut ListState<T>, id: &str, response: &Value) {
    let Some(updated) = state.get(id).and_then(|current| absorb(current, response)) else {
        return;
    };
    state.replace(updated);
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
