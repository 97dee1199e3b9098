// pool.rs — Fixed-width worker pool with dependency-aware scheduling
//
// A shared ready queue plus a pending list behind one mutex; workers pull
// ready tasks, and every completion rescans the pending list for tasks whose
// dependencies are now satisfied. `set_is_running(false)` gates pickups so a
// burst of submissions does not contend the queue mutex; correctness never
// depends on it. `join_workers` is the phase barrier: it returns once every
// submitted task is Done.
//
// Preconditions: `join_workers` requires the pool to be running, otherwise
//   queued work can never drain.
// Postconditions: after `join_workers`, ready and pending are empty and all
//   workers are idle.
// Failure modes: none at this layer; task bodies capture their own panics.
// Side effects: spawns OS threads named `refgen-worker-N`.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;

use parking_lot::{Condvar, Mutex};

use crate::task::{Task, TaskBody, TaskPayload, TaskState};

struct QueueState {
    ready: VecDeque<Arc<Task>>,
    pending: Vec<Arc<Task>>,
    running: bool,
    active: usize,
    shutdown: bool,
}

struct Shared {
    queue: Mutex<QueueState>,
    work_available: Condvar,
    all_idle: Condvar,
}

pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl ThreadPool {
    /// Spawn `worker_count` workers. The pool starts in the running state.
    pub fn new(worker_count: usize) -> Self {
        let shared = Arc::new(Shared {
            queue: Mutex::new(QueueState {
                ready: VecDeque::new(),
                pending: Vec::new(),
                running: true,
                active: 0,
                shutdown: false,
            }),
            work_available: Condvar::new(),
            all_idle: Condvar::new(),
        });

        let workers = (0..worker_count.max(1))
            .map(|id| {
                let shared = shared.clone();
                thread::Builder::new()
                    .name(format!("refgen-worker-{id}"))
                    .spawn(move || worker_loop(&shared))
                    .expect("failed to spawn worker thread")
            })
            .collect();

        Self { shared, workers }
    }

    /// Pool sized to the machine's logical CPU count.
    pub fn with_default_workers() -> Self {
        Self::new(num_cpus::get())
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Submit a dependency-free task.
    pub fn submit_task<F>(&self, name: impl Into<String>, body: F) -> Arc<Task>
    where
        F: FnOnce(&Task) -> TaskPayload + Send + 'static,
    {
        self.submit_task_with_deps(name, body, Vec::new())
    }

    /// Submit a task that starts only after every task in `deps` is Done.
    pub fn submit_task_with_deps<F>(
        &self,
        name: impl Into<String>,
        body: F,
        deps: Vec<Arc<Task>>,
    ) -> Arc<Task>
    where
        F: FnOnce(&Task) -> TaskPayload + Send + 'static,
    {
        let task = Task::new(name.into(), Box::new(body) as TaskBody, deps);

        let mut queue = self.shared.queue.lock();
        if task.is_ready() {
            task.set_state(TaskState::Ready);
            queue.ready.push_back(task.clone());
            self.shared.work_available.notify_one();
        } else {
            queue.pending.push(task.clone());
        }
        task
    }

    /// Gate worker pickups. Submissions are accepted either way.
    pub fn set_is_running(&self, running: bool) {
        let mut queue = self.shared.queue.lock();
        queue.running = running;
        if running {
            self.shared.work_available.notify_all();
        }
    }

    /// Block until the ready queue and pending list are empty and every
    /// worker is idle. All tasks submitted so far are Done on return.
    pub fn join_workers(&self) {
        let mut queue = self.shared.queue.lock();
        while !(queue.ready.is_empty() && queue.pending.is_empty() && queue.active == 0) {
            self.shared.all_idle.wait(&mut queue);
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        {
            let mut queue = self.shared.queue.lock();
            queue.shutdown = true;
        }
        self.shared.work_available.notify_all();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        let task = {
            let mut queue = shared.queue.lock();
            loop {
                if queue.shutdown {
                    return;
                }
                if queue.running {
                    if let Some(task) = queue.ready.pop_front() {
                        queue.active += 1;
                        break task;
                    }
                }
                shared.work_available.wait(&mut queue);
            }
        };

        task.run();

        let mut queue = shared.queue.lock();
        queue.active -= 1;

        // A completion may unblock parked tasks; rescan the pending list.
        let mut index = 0;
        let mut promoted = false;
        while index < queue.pending.len() {
            if queue.pending[index].is_ready() {
                let task = queue.pending.swap_remove(index);
                task.set_state(TaskState::Ready);
                queue.ready.push_back(task);
                promoted = true;
            } else {
                index += 1;
            }
        }
        if promoted {
            shared.work_available.notify_all();
        }

        if queue.ready.is_empty() && queue.pending.is_empty() && queue.active == 0 {
            shared.all_idle.notify_all();
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
