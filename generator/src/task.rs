// task.rs — Deferred work unit with a typed result cell
//
// A Task carries a name (for logging), an erased result slot, the upstream
// task handles it depends on, and a completion gate. The pool runs the body
// exactly once; the result is written exactly once and read through
// `await_result` (blocking) or `dependency_result` (non-blocking, from
// inside a downstream task body whose dependencies are all Done).
//
// Failure modes: a panicking body is caught; the payload is stored in the
// result cell and the task still counts as Done for scheduling, so
// dependents observe the failure at the read site.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use parking_lot::{Condvar, Mutex};

/// Erased task result. Concrete types are recovered at the read sites.
pub type TaskPayload = Box<dyn Any + Send>;

/// A task body. The `&Task` argument is the task itself, giving the body
/// access to `dependency_result`.
pub type TaskBody = Box<dyn FnOnce(&Task) -> TaskPayload + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Submitted, at least one dependency still unfinished.
    Pending,
    /// All dependencies Done; queued for a worker.
    Ready,
    /// A worker is executing the body.
    Running,
    /// Body finished (or panicked); result cell is populated.
    Done,
}

struct TaskInner {
    state: TaskState,
    result: Option<thread::Result<TaskPayload>>,
}

pub struct Task {
    name: String,
    deps: Vec<Arc<Task>>,
    inner: Mutex<TaskInner>,
    completed: Condvar,
    body: Mutex<Option<TaskBody>>,
}

impl Task {
    pub(crate) fn new(name: String, body: TaskBody, deps: Vec<Arc<Task>>) -> Arc<Self> {
        Arc::new(Self {
            name,
            deps,
            inner: Mutex::new(TaskInner {
                state: TaskState::Pending,
                result: None,
            }),
            completed: Condvar::new(),
            body: Mutex::new(Some(body)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> TaskState {
        self.inner.lock().state
    }

    pub fn is_done(&self) -> bool {
        self.state() == TaskState::Done
    }

    /// True once every upstream task is Done.
    pub fn is_ready(&self) -> bool {
        self.deps.iter().all(|dep| dep.is_done())
    }

    pub(crate) fn set_state(&self, state: TaskState) {
        self.inner.lock().state = state;
    }

    /// Execute the body once. Called by exactly one worker.
    pub(crate) fn run(&self) {
        let Some(body) = self.body.lock().take() else {
            return;
        };
        self.set_state(TaskState::Running);

        let result = catch_unwind(AssertUnwindSafe(|| body(self)));

        let mut inner = self.inner.lock();
        inner.result = Some(result);
        inner.state = TaskState::Done;
        self.completed.notify_all();
    }

    /// Block until Done, then return a clone of the captured value.
    /// Calling twice returns the same value.
    ///
    /// Panics if the body panicked or produced a different result type; both
    /// are contract violations surfaced at the read site by design.
    pub fn await_result<T: Any + Clone>(&self) -> T {
        let mut inner = self.inner.lock();
        while inner.state != TaskState::Done {
            self.completed.wait(&mut inner);
        }
        Self::cloned_payload(&inner, &self.name)
    }

    /// Fetch dependency `index`'s result without blocking. Only valid from
    /// inside the task body: the pool runs a body strictly after every
    /// upstream task is Done.
    pub fn dependency_result<T: Any + Clone>(&self, index: usize) -> T {
        let dep = &self.deps[index];
        let inner = dep.inner.lock();
        assert!(
            inner.state == TaskState::Done,
            "dependency '{}' of task '{}' read before completion",
            dep.name,
            self.name
        );
        Self::cloned_payload(&inner, &dep.name)
    }

    fn cloned_payload<T: Any + Clone>(inner: &TaskInner, name: &str) -> T {
        match inner.result.as_ref() {
            Some(Ok(payload)) => match payload.downcast_ref::<T>() {
                Some(value) => value.clone(),
                None => panic!("task '{name}' result read with the wrong type"),
            },
            Some(Err(_)) => panic!("task '{name}' panicked"),
            None => unreachable!("task '{name}' marked Done without a result"),
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
