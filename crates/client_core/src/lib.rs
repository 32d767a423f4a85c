use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::domain::{Filter, Todo, TodoId, UserId};
use thiserror::Error;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{info, warn};

pub mod http_store;
pub use http_store::HttpTodoStore;

/// How long an error message stays visible before it clears itself.
const ERROR_AUTO_CLEAR: Duration = Duration::from_millis(3000);
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Remote store the controller synchronizes against. Every call is a
/// full round-trip that resolves with the store's canonical view of
/// the touched item.
#[async_trait]
pub trait TodoStore: Send + Sync {
    async fn list(&self) -> Result<Vec<Todo>>;
    async fn create(&self, title: &str) -> Result<Todo>;
    async fn update(&self, todo: &Todo) -> Result<Todo>;
    async fn delete(&self, id: TodoId) -> Result<()>;
}

pub struct MissingTodoStore;

#[async_trait]
impl TodoStore for MissingTodoStore {
    async fn list(&self) -> Result<Vec<Todo>> {
        Err(anyhow!("todo store is unavailable"))
    }

    async fn create(&self, _title: &str) -> Result<Todo> {
        Err(anyhow!("todo store is unavailable"))
    }

    async fn update(&self, todo: &Todo) -> Result<Todo> {
        Err(anyhow!("todo store is unavailable for todo {}", todo.id.0))
    }

    async fn delete(&self, id: TodoId) -> Result<()> {
        Err(anyhow!("todo store is unavailable for todo {}", id.0))
    }
}

/// Failure kinds surfaced by the controller. The `Display` strings are
/// the exact user-facing messages; transport causes stay attached as
/// sources and are never shown directly.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Unable to load todos")]
    Load(#[source] anyhow::Error),
    #[error("Unable to add a todo")]
    Create(#[source] anyhow::Error),
    #[error("Unable to rename a todo")]
    Rename(#[source] anyhow::Error),
    #[error("Unable to update a todo")]
    Toggle(#[source] anyhow::Error),
    #[error("Unable to delete a todo")]
    Delete(#[source] anyhow::Error),
    /// One or more toggles inside `toggle_all` failed.
    #[error("Unable to toggle a todo")]
    ToggleBatch { failures: usize },
    /// One or more deletions inside `clear_completed` failed.
    #[error("Unable to delete a todo")]
    DeleteBatch { failures: usize },
    #[error("Title should not be empty")]
    EmptyTitle,
}

#[derive(Debug, Clone)]
pub enum ControllerEvent {
    TodosChanged,
    FilterChanged(Filter),
    ErrorChanged(Option<String>),
    LoadingFinished,
}

/// Read-only snapshot handed to the presentation layer per render.
#[derive(Debug, Clone)]
pub struct TodoView {
    /// Todos matching the current filter, in insertion order.
    pub todos: Vec<Todo>,
    pub filter: Filter,
    /// Open todos, excluding a pending placeholder.
    pub active_count: usize,
    pub completed_count: usize,
    pub all_completed: bool,
    pub has_items: bool,
    pub error_message: Option<String>,
    pub loading: bool,
}

/// Everything a presentation layer may call on the controller.
#[async_trait]
pub trait ControllerHandle: Send + Sync {
    async fn load(&self) -> Result<(), SyncError>;
    async fn add(&self, title: &str) -> Result<(), SyncError>;
    async fn rename(&self, todo: &Todo, new_title: &str) -> Result<(), SyncError>;
    async fn toggle(&self, todo: &Todo) -> Result<(), SyncError>;
    async fn delete(&self, id: TodoId) -> Result<(), SyncError>;
    async fn toggle_all(&self) -> Result<(), SyncError>;
    async fn clear_completed(&self) -> Result<(), SyncError>;
    async fn set_filter(&self, filter: Filter);
    async fn dismiss_error(&self);
    async fn view(&self) -> TodoView;
    fn subscribe_events(&self) -> broadcast::Receiver<ControllerEvent>;
}

/// Owns the authoritative local collection and reconciles optimistic
/// mutations against the remote store. Single-item failures propagate
/// to the caller after being shown; batch operations swallow per-item
/// failures and surface one aggregated error at the end.
pub struct TodoController {
    store: Arc<dyn TodoStore>,
    owner: UserId,
    inner: Arc<Mutex<ControllerState>>,
    error_timer: Mutex<Option<JoinHandle<()>>>,
    events: broadcast::Sender<ControllerEvent>,
}

#[derive(Debug)]
struct ControllerState {
    todos: Vec<Todo>,
    filter: Filter,
    error_message: Option<String>,
    loading: bool,
}

impl TodoController {
    pub fn new(store: Arc<dyn TodoStore>, owner: UserId) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            store,
            owner,
            inner: Arc::new(Mutex::new(ControllerState {
                todos: Vec::new(),
                filter: Filter::default(),
                error_message: None,
                loading: true,
            })),
            error_timer: Mutex::new(None),
            events,
        })
    }

    /// Fetches the full list and replaces the local collection. The
    /// loading flag clears on both outcomes so the UI never sticks in
    /// a loading state after a failed load.
    pub async fn load(&self) -> Result<(), SyncError> {
        self.hide_error().await;
        match self.store.list().await {
            Ok(todos) => {
                info!(count = todos.len(), "sync: loaded todos from remote store");
                {
                    let mut state = self.inner.lock().await;
                    state.todos = todos;
                    state.loading = false;
                }
                self.emit(ControllerEvent::TodosChanged);
                self.emit(ControllerEvent::LoadingFinished);
                Ok(())
            }
            Err(source) => {
                warn!("sync: load failed: {source:#}");
                self.inner.lock().await.loading = false;
                self.emit(ControllerEvent::LoadingFinished);
                let err = SyncError::Load(source);
                self.show_error(err.to_string()).await;
                Err(err)
            }
        }
    }

    /// Appends a pending placeholder synchronously, then reconciles it
    /// against the remote create: replaced by the confirmed todo on
    /// success, removed without trace on failure.
    pub async fn add(&self, title: &str) -> Result<(), SyncError> {
        self.hide_error().await;
        let trimmed = title.trim();
        if trimmed.is_empty() {
            let err = SyncError::EmptyTitle;
            self.show_error(err.to_string()).await;
            return Err(err);
        }

        {
            let mut state = self.inner.lock().await;
            if state.todos.iter().any(Todo::is_pending) {
                // Reconciliation matches by the sentinel id and cannot
                // tell two pending creates apart.
                drop(state);
                let err = SyncError::Create(anyhow!("another create is awaiting confirmation"));
                self.show_error(err.to_string()).await;
                return Err(err);
            }
            state.todos.push(Todo::pending(self.owner, trimmed));
        }
        self.emit(ControllerEvent::TodosChanged);

        match self.store.create(trimmed).await {
            Ok(confirmed) => {
                info!(id = confirmed.id.0, "sync: create confirmed");
                {
                    let mut state = self.inner.lock().await;
                    state.todos.retain(|todo| !todo.is_pending());
                    state.todos.push(confirmed);
                }
                self.emit(ControllerEvent::TodosChanged);
                Ok(())
            }
            Err(source) => {
                warn!(title = trimmed, "sync: create failed, rolling back: {source:#}");
                {
                    let mut state = self.inner.lock().await;
                    state.todos.retain(|todo| !todo.is_pending());
                }
                self.emit(ControllerEvent::TodosChanged);
                let err = SyncError::Create(source);
                self.show_error(err.to_string()).await;
                Err(err)
            }
        }
    }

    /// No optimistic title change: the collection is only touched once
    /// the store confirms, so the confirmed version (including any
    /// server-side normalization) is what lands locally. An edit that
    /// trims down to nothing is a delete request.
    pub async fn rename(&self, todo: &Todo, new_title: &str) -> Result<(), SyncError> {
        let trimmed = new_title.trim();
        if trimmed.is_empty() {
            return self.delete(todo.id).await;
        }
        self.hide_error().await;

        let mut updated = todo.clone();
        updated.title = trimmed.to_string();
        match self.store.update(&updated).await {
            Ok(confirmed) => {
                self.reconcile_confirmed(confirmed).await;
                Ok(())
            }
            Err(source) => {
                warn!(id = todo.id.0, "sync: rename failed: {source:#}");
                let err = SyncError::Rename(source);
                self.show_error(err.to_string()).await;
                Err(err)
            }
        }
    }

    pub async fn toggle(&self, todo: &Todo) -> Result<(), SyncError> {
        self.hide_error().await;
        let mut updated = todo.clone();
        updated.completed = !todo.completed;
        match self.store.update(&updated).await {
            Ok(confirmed) => {
                self.reconcile_confirmed(confirmed).await;
                Ok(())
            }
            Err(source) => {
                warn!(id = todo.id.0, "sync: toggle failed: {source:#}");
                let err = SyncError::Toggle(source);
                self.show_error(err.to_string()).await;
                Err(err)
            }
        }
    }

    /// Never removes optimistically: the item stays until the store
    /// confirms the deletion.
    pub async fn delete(&self, id: TodoId) -> Result<(), SyncError> {
        self.hide_error().await;
        match self.store.delete(id).await {
            Ok(()) => {
                {
                    let mut state = self.inner.lock().await;
                    state.todos.retain(|todo| todo.id != id);
                }
                self.emit(ControllerEvent::TodosChanged);
                Ok(())
            }
            Err(source) => {
                warn!(id = id.0, "sync: delete failed: {source:#}");
                let err = SyncError::Delete(source);
                self.show_error(err.to_string()).await;
                Err(err)
            }
        }
    }

    /// Drives every todo towards the common target state, one remote
    /// round-trip at a time. Individual failures are counted, not
    /// fatal; a single aggregated error is reported at the end.
    pub async fn toggle_all(&self) -> Result<(), SyncError> {
        self.hide_error().await;
        let snapshot = self.inner.lock().await.todos.clone();
        let target_completed = !snapshot.iter().all(|todo| todo.completed);

        let mut failures = 0usize;
        for todo in snapshot
            .iter()
            .filter(|todo| todo.completed != target_completed)
        {
            if self.toggle(todo).await.is_err() {
                failures += 1;
            }
        }

        if failures > 0 {
            let err = SyncError::ToggleBatch { failures };
            self.show_error(err.to_string()).await;
            return Err(err);
        }
        Ok(())
    }

    /// Deletes every currently completed todo sequentially. Failed
    /// deletions leave their items in place and are reported once,
    /// aggregated, after the whole batch ran.
    pub async fn clear_completed(&self) -> Result<(), SyncError> {
        self.hide_error().await;
        let completed: Vec<Todo> = {
            let state = self.inner.lock().await;
            state
                .todos
                .iter()
                .filter(|todo| todo.completed)
                .cloned()
                .collect()
        };

        let mut failures = 0usize;
        for todo in &completed {
            if self.delete(todo.id).await.is_err() {
                failures += 1;
            }
        }

        if failures > 0 {
            let err = SyncError::DeleteBatch { failures };
            self.show_error(err.to_string()).await;
            return Err(err);
        }
        Ok(())
    }

    pub async fn set_filter(&self, filter: Filter) {
        {
            let mut state = self.inner.lock().await;
            if state.filter == filter {
                return;
            }
            state.filter = filter;
        }
        self.emit(ControllerEvent::FilterChanged(filter));
    }

    pub async fn dismiss_error(&self) {
        self.hide_error().await;
    }

    pub async fn view(&self) -> TodoView {
        let state = self.inner.lock().await;
        let active_count = state
            .todos
            .iter()
            .filter(|todo| !todo.completed && !todo.is_pending())
            .count();
        let completed_count = state.todos.iter().filter(|todo| todo.completed).count();
        TodoView {
            todos: state
                .todos
                .iter()
                .filter(|todo| state.filter.matches(todo))
                .cloned()
                .collect(),
            filter: state.filter,
            active_count,
            completed_count,
            all_completed: !state.todos.is_empty() && active_count == 0,
            has_items: !state.todos.is_empty(),
            error_message: state.error_message.clone(),
            loading: state.loading,
        }
    }

    /// Unfiltered snapshot of the authoritative collection.
    pub async fn todos(&self) -> Vec<Todo> {
        self.inner.lock().await.todos.clone()
    }

    pub async fn error_message(&self) -> Option<String> {
        self.inner.lock().await.error_message.clone()
    }

    pub async fn filter(&self) -> Filter {
        self.inner.lock().await.filter
    }

    pub async fn is_loading(&self) -> bool {
        self.inner.lock().await.loading
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    /// Reconciliation step: the store-confirmed todo replaces any
    /// locally held version with the same id.
    async fn reconcile_confirmed(&self, confirmed: Todo) {
        {
            let mut state = self.inner.lock().await;
            if let Some(slot) = state.todos.iter_mut().find(|todo| todo.id == confirmed.id) {
                *slot = confirmed;
            }
        }
        self.emit(ControllerEvent::TodosChanged);
    }

    /// Shows a message and (re)arms the auto-clear timer. The timer is
    /// an owned task handle; arming cancels any previous one, so at
    /// most one auto-clear is ever scheduled.
    async fn show_error(&self, message: String) {
        self.inner.lock().await.error_message = Some(message.clone());
        self.emit(ControllerEvent::ErrorChanged(Some(message)));

        let mut timer = self.error_timer.lock().await;
        if let Some(previous) = timer.take() {
            previous.abort();
        }
        let inner = Arc::clone(&self.inner);
        let events = self.events.clone();
        // The deadline counts from now, not from when the spawned task
        // is first polled.
        let auto_clear = tokio::time::sleep(ERROR_AUTO_CLEAR);
        *timer = Some(tokio::spawn(async move {
            auto_clear.await;
            let cleared = inner.lock().await.error_message.take().is_some();
            if cleared {
                let _ = events.send(ControllerEvent::ErrorChanged(None));
            }
        }));
    }

    /// Immediate clear plus timer cancellation. Called at the start of
    /// every mutating operation so a new action supersedes a stale
    /// error instead of stacking on it.
    async fn hide_error(&self) {
        if let Some(pending) = self.error_timer.lock().await.take() {
            pending.abort();
        }
        let cleared = self.inner.lock().await.error_message.take().is_some();
        if cleared {
            self.emit(ControllerEvent::ErrorChanged(None));
        }
    }

    fn emit(&self, event: ControllerEvent) {
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl ControllerHandle for TodoController {
    async fn load(&self) -> Result<(), SyncError> {
        TodoController::load(self).await
    }

    async fn add(&self, title: &str) -> Result<(), SyncError> {
        TodoController::add(self, title).await
    }

    async fn rename(&self, todo: &Todo, new_title: &str) -> Result<(), SyncError> {
        TodoController::rename(self, todo, new_title).await
    }

    async fn toggle(&self, todo: &Todo) -> Result<(), SyncError> {
        TodoController::toggle(self, todo).await
    }

    async fn delete(&self, id: TodoId) -> Result<(), SyncError> {
        TodoController::delete(self, id).await
    }

    async fn toggle_all(&self) -> Result<(), SyncError> {
        TodoController::toggle_all(self).await
    }

    async fn clear_completed(&self) -> Result<(), SyncError> {
        TodoController::clear_completed(self).await
    }

    async fn set_filter(&self, filter: Filter) {
        TodoController::set_filter(self, filter).await;
    }

    async fn dismiss_error(&self) {
        TodoController::dismiss_error(self).await;
    }

    async fn view(&self) -> TodoView {
        TodoController::view(self).await
    }

    fn subscribe_events(&self) -> broadcast::Receiver<ControllerEvent> {
        TodoController::subscribe_events(self)
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
