use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use tokio::task::Id as TaskId;

use super::{ContextUpdate, RequestContext};

// Unscoped tokio tasks tracked at once; the oldest are dropped beyond this.
const MAX_UNSCOPED_TASKS: usize = 4096;

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

tokio::task_local! {
    static TASK_CONTEXT: RefCell<ContextCell>;
}

thread_local! {
    static THREAD_CONTEXT: RefCell<ContextCell> = RefCell::new(ContextCell::default());
    // Non-zero while a spawn helper runs a closure on this thread.
    static THREAD_PINNED: Cell<usize> = const { Cell::new(0) };
}

/// The current value of one execution path and the scopes layered on it.
#[derive(Debug, Clone, Default)]
struct ContextCell {
    current: Arc<RequestContext>,
    scopes: Vec<ScopeEntry>,
}

#[derive(Debug, Clone)]
struct ScopeEntry {
    id: u64,
    previous: Arc<RequestContext>,
}

impl ContextCell {
    fn new(current: Arc<RequestContext>) -> Self {
        Self {
            current,
            scopes: Vec::new(),
        }
    }

    fn is_empty(&self) -> bool {
        self.scopes.is_empty() && self.current.is_empty()
    }

    fn push(&mut self, id: u64, context: Arc<RequestContext>) {
        let previous = std::mem::replace(&mut self.current, context);
        self.scopes.push(ScopeEntry { id, previous });
    }

    /// Pops scope `id` and every scope entered after it, restoring the value
    /// seen when `id` was entered.
    fn unwind(&mut self, id: u64) {
        let Some(position) = self.scopes.iter().rposition(|entry| entry.id == id) else {
            // An enclosing scope already exited and took this one with it.
            return;
        };
        let nested = self.scopes.len() - position - 1;
        if nested > 0 {
            tracing::warn!(
                nested,
                "request context scope exited before the scopes inside it; \
                 unwinding them too (use ContextStore::scope across .await)"
            );
        }
        if let Some(entry) = self.scopes.drain(position..).next() {
            self.current = entry.previous;
        }
    }
}

/// Cells of tokio tasks spawned without a spawn helper, keyed by task id.
#[derive(Debug, Default)]
struct UnscopedTasks {
    cells: HashMap<TaskId, ContextCell>,
    order: VecDeque<TaskId>,
}

impl UnscopedTasks {
    fn shared() -> &'static Mutex<UnscopedTasks> {
        static TASKS: OnceLock<Mutex<UnscopedTasks>> = OnceLock::new();
        TASKS.get_or_init(Default::default)
    }

    fn current(&self, id: TaskId) -> Arc<RequestContext> {
        self.cells
            .get(&id)
            .map(|cell| cell.current.clone())
            .unwrap_or_default()
    }

    fn update(&mut self, id: TaskId, f: impl FnOnce(&mut ContextCell)) {
        if !self.cells.contains_key(&id) {
            self.make_room();
            self.order.push_back(id);
        }
        let cell = self.cells.entry(id).or_default();
        f(cell);
        if cell.is_empty() {
            self.cells.remove(&id);
        }
    }

    fn make_room(&mut self) {
        while self.cells.len() >= MAX_UNSCOPED_TASKS {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            if self.cells.remove(&oldest).is_some() {
                tracing::warn!(
                    task = %oldest,
                    "dropping the request context of a tokio task that never cleared it"
                );
            }
        }
        if self.order.len() > 2 * MAX_UNSCOPED_TASKS {
            let cells = &self.cells;
            self.order.retain(|id| cells.contains_key(id));
        }
    }
}

/// Which cell holds the current value for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    /// Inside a future driven by [`ContextStore::scope`], [`ContextStore::propagate`]
    /// or [`ContextStore::spawn`].
    Task,
    /// Inside a tokio task started some other way.
    Unscoped(TaskId),
    /// Outside any tokio task, or in a closure run by a spawn helper.
    Thread,
}

impl Slot {
    fn active() -> Self {
        if TASK_CONTEXT.try_with(|_| ()).is_ok() {
            return Slot::Task;
        }
        if THREAD_PINNED.with(Cell::get) > 0 {
            return Slot::Thread;
        }
        match tokio::task::try_id() {
            Some(id) => Slot::Unscoped(id),
            None => Slot::Thread,
        }
    }

    fn current(self) -> Arc<RequestContext> {
        match self {
            Slot::Task => TASK_CONTEXT
                .try_with(|cell| cell.borrow().current.clone())
                .unwrap_or_default(),
            Slot::Thread => THREAD_CONTEXT
                .try_with(|cell| cell.borrow().current.clone())
                .unwrap_or_default(),
            Slot::Unscoped(id) => UnscopedTasks::shared()
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .current(id),
        }
    }

    fn update(self, f: impl FnOnce(&mut ContextCell)) {
        match self {
            Slot::Task => {
                let _ = TASK_CONTEXT.try_with(|cell| f(&mut cell.borrow_mut()));
            }
            Slot::Thread => {
                let _ = THREAD_CONTEXT.try_with(|cell| f(&mut cell.borrow_mut()));
            }
            Slot::Unscoped(id) => UnscopedTasks::shared()
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .update(id, f),
        }
    }
}

/// Holder of the current [`RequestContext`] for each execution path.
///
/// Every thread and every tokio task has its own value, so concurrent tasks
/// never see each other's context. Futures run through
/// [`scope`](Self::scope), [`propagate`](Self::propagate) or
/// [`spawn`](Self::spawn) carry their value with them. Children started
/// through the spawn helpers begin with a copy of the spawner's context and
/// never write back to it.
///
/// A task started with plain `tokio::spawn` begins with an empty context. Its
/// value is kept until it calls [`clear`](Self::clear); a bounded number of
/// such tasks is tracked and the oldest are dropped with a warning.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextStore;

impl ContextStore {
    /// The current context for the caller.
    pub fn get() -> RequestContext {
        Self::snapshot().as_ref().clone()
    }

    /// The current context as a shared, immutable snapshot.
    ///
    /// Later calls to [`set`](Self::set) never change a snapshot already
    /// taken.
    pub fn snapshot() -> Arc<RequestContext> {
        Slot::active().current()
    }

    /// Overwrites the provided fields of the current context.
    pub fn set(update: ContextUpdate) {
        Slot::active().update(|cell| Arc::make_mut(&mut cell.current).apply(update));
    }

    /// Resets the current context to an empty one.
    pub fn clear() {
        Slot::active().update(|cell| cell.current = Arc::default());
    }

    /// Installs `update` on top of the current context until the returned
    /// guard is dropped.
    ///
    /// Unset fields are inherited and metadata is merged key by key. Dropping
    /// the guard restores exactly the context that was active before, even if
    /// it was changed inside the scope. Guards nest; dropping an outer guard
    /// first also ends every scope entered after it.
    ///
    /// Do not hold the guard across `.await`: futures polled on the same task
    /// would see its value. Use [`scope`](Self::scope) there.
    pub fn scoped(update: ContextUpdate) -> ContextGuard {
        let slot = Slot::active();
        let installed = Arc::new(slot.current().merged(update));
        ContextGuard::install(slot, installed)
    }

    /// Runs `future` with `update` merged on top of the current context.
    ///
    /// The merged context is computed when this is called. The future gets a
    /// cell of its own, so it may hold the context across `.await` points and
    /// move between worker threads.
    pub fn scope<F>(update: ContextUpdate, future: F) -> impl Future<Output = F::Output>
    where
        F: Future,
    {
        let context = Self::snapshot().merged(update);
        TASK_CONTEXT.scope(RefCell::new(ContextCell::new(Arc::new(context))), future)
    }

    /// Runs `future` with its own copy of the current context.
    pub fn propagate<F>(future: F) -> impl Future<Output = F::Output>
    where
        F: Future,
    {
        TASK_CONTEXT.scope(RefCell::new(ContextCell::new(Self::snapshot())), future)
    }

    /// `tokio::spawn` for a task that starts with the caller's context.
    pub fn spawn<F>(future: F) -> tokio::task::JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        tokio::spawn(Self::propagate(future))
    }

    /// `tokio::task::spawn_blocking` for a closure that starts with the
    /// caller's context.
    pub fn spawn_blocking<F, R>(f: F) -> tokio::task::JoinHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let context = Self::snapshot();
        tokio::task::spawn_blocking(move || Self::run_on_thread(context, f))
    }

    /// `std::thread::spawn` for a closure that starts with the caller's
    /// context.
    pub fn spawn_thread<F, R>(f: F) -> std::thread::JoinHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let context = Self::snapshot();
        std::thread::spawn(move || Self::run_on_thread(context, f))
    }

    // Pooled threads outlive the closure, so the previous value is restored.
    fn run_on_thread<F, R>(context: Arc<RequestContext>, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _pin = ThreadPin::enter();
        let _guard = ContextGuard::install(Slot::Thread, context);
        f()
    }
}

// Keeps blocking-pool closures on the thread cell even though they run
// inside a tokio task.
struct ThreadPin;

impl ThreadPin {
    fn enter() -> Self {
        THREAD_PINNED.with(|pinned| pinned.set(pinned.get() + 1));
        ThreadPin
    }
}

impl Drop for ThreadPin {
    fn drop(&mut self) {
        THREAD_PINNED.with(|pinned| pinned.set(pinned.get().saturating_sub(1)));
    }
}

/// Restores the previously active context when dropped.
///
/// Returned by [`ContextStore::scoped`]. Dereferences to the context that was
/// installed on entry. Guards are tied to the thread that created them.
#[must_use = "the scoped context is reverted as soon as the guard is dropped"]
#[derive(Debug)]
pub struct ContextGuard {
    slot: Slot,
    scope_id: u64,
    installed: Arc<RequestContext>,
    _not_send: PhantomData<*const ()>,
}

impl ContextGuard {
    fn install(slot: Slot, installed: Arc<RequestContext>) -> Self {
        let scope_id = NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed);
        let context = installed.clone();
        slot.update(|cell| cell.push(scope_id, context));

        Self {
            slot,
            scope_id,
            installed,
            _not_send: PhantomData,
        }
    }
}

impl Deref for ContextGuard {
    type Target = RequestContext;

    fn deref(&self) -> &RequestContext {
        &self.installed
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let scope_id = self.scope_id;
        self.slot.update(|cell| cell.unwind(scope_id));
    }
}
