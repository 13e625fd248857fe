//! keikai-pool: fixed-size worker pool for background launcher work.
//!
//! Workers drain a shared task queue. A task reports whether the worker that
//! ran it should keep running, which lets ordinary work and stop signals share
//! one queue.
//!
//! - `queue_capacity <= 0` selects an unbounded queue
//! - a bounded queue blocks `submit` when full (backpressure)
//! - `shutdown(true, _)` drains queued work, `shutdown(false, _)` discards it

use crossbeam_channel::{Receiver, Sender, bounded, select, unbounded};
use log::{debug, error, info, warn};
use parking_lot::{Mutex, RwLock};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

/// What the worker that ran a task does next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerControl {
    KeepRunning,
    Stop,
}

/// A unit of work run once on a pool thread.
pub trait Task: Send {
    fn execute(self: Box<Self>) -> WorkerControl;
}

/// Adapts a closure into a [`Task`].
pub struct FnTask<F>(pub F);

impl<F> Task for FnTask<F>
where
    F: FnOnce() -> WorkerControl + Send,
{
    fn execute(self: Box<Self>) -> WorkerControl {
        (self.0)()
    }
}

/// Wakes exactly one worker and retires it.
struct StopTask;

impl Task for StopTask {
    fn execute(self: Box<Self>) -> WorkerControl {
        WorkerControl::Stop
    }
}

type BoxedTask = Box<dyn Task>;

/// Pick a worker count for CPU-bound background work: one less than the
/// available cores, clamped to `1..=max`.
pub fn optimal_worker_count(max: usize) -> usize {
    let cores = thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    cores.saturating_sub(1).clamp(1, max.max(1))
}

/// A fixed set of worker threads consuming a shared queue.
pub struct WorkerPool {
    tasks_tx: Sender<BoxedTask>,
    tasks_rx: Receiver<BoxedTask>,
    /// Dropped on hard stop; every waiter on `interrupt_rx` then wakes.
    interrupt_tx: Mutex<Option<Sender<()>>>,
    interrupt_rx: Receiver<()>,
    /// Submitters hold a read guard while enqueueing so closing is atomic
    /// with respect to in-progress submissions.
    accepting: RwLock<bool>,
    stopping: Arc<AtomicBool>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    worker_count: usize,
}

impl WorkerPool {
    /// Start `worker_count` workers immediately.
    pub fn new(worker_count: usize, queue_capacity: i32) -> Self {
        let (tasks_tx, tasks_rx) = if queue_capacity <= 0 {
            unbounded()
        } else {
            bounded(queue_capacity as usize)
        };
        let (interrupt_tx, interrupt_rx) = unbounded::<()>();
        let stopping = Arc::new(AtomicBool::new(false));

        let threads = (0..worker_count)
            .filter_map(|index| {
                let tasks = tasks_rx.clone();
                let interrupt = interrupt_rx.clone();
                let stopping = Arc::clone(&stopping);

                thread::Builder::new()
                    .name(format!("keikai-worker-{index}"))
                    .spawn(move || worker_loop(tasks, interrupt, stopping))
                    .map_err(|e| error!("Failed to spawn worker {}: {}", index, e))
                    .ok()
            })
            .collect::<Vec<_>>();

        info!(
            "Worker pool started with {} workers ({} queue)",
            threads.len(),
            if queue_capacity <= 0 {
                "unbounded".to_string()
            } else {
                format!("capacity {queue_capacity}")
            }
        );

        Self {
            tasks_tx,
            tasks_rx,
            interrupt_tx: Mutex::new(Some(interrupt_tx)),
            interrupt_rx,
            accepting: RwLock::new(true),
            stopping,
            worker_count: threads.len(),
            threads: Mutex::new(threads),
        }
    }

    /// Number of workers that were started.
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Whether `submit` still enqueues.
    pub fn is_accepting(&self) -> bool {
        *self.accepting.read()
    }

    /// Enqueue a task, blocking while a bounded queue is full.
    ///
    /// After shutdown has begun this is a silent no-op. A submitter blocked on
    /// a full queue is released by a hard stop and its task is dropped.
    pub fn submit(&self, task: BoxedTask) {
        let accepting = self.accepting.read();
        if !*accepting {
            debug!("Pool closed, dropping submitted task");
            return;
        }

        select! {
            send(self.tasks_tx, task) -> res => {
                if res.is_err() {
                    warn!("Task queue disconnected, task dropped");
                }
            }
            recv(self.interrupt_rx) -> _ => {
                debug!("Pool stopped while submission was blocked, task dropped");
            }
        }
    }

    /// Close submissions and stop the workers.
    ///
    /// With `drain`, one stop task per worker is queued behind the pending
    /// work. Without it, workers are interrupted and unstarted tasks are
    /// discarded; tasks already running finish. `wait` joins every worker.
    pub fn shutdown(&self, drain: bool, wait: bool) {
        if !self.is_accepting() {
            return;
        }

        if drain {
            {
                let mut accepting = self.accepting.write();
                if !*accepting {
                    return;
                }
                *accepting = false;
            }

            info!("Draining worker pool");
            for _ in 0..self.worker_count {
                if self.tasks_tx.send(Box::new(StopTask)).is_err() {
                    warn!("Task queue disconnected while queueing stop tasks");
                    break;
                }
            }
        } else {
            info!("Stopping worker pool");
            self.stopping.store(true, Ordering::SeqCst);
            // Wakes idle workers and blocked submitters.
            drop(self.interrupt_tx.lock().take());

            *self.accepting.write() = false;

            let discarded = self.tasks_rx.try_iter().count();
            if discarded > 0 {
                debug!("Discarded {} queued tasks", discarded);
            }
        }

        if wait {
            self.join_all();
        }
    }

    fn join_all(&self) {
        let threads = std::mem::take(&mut *self.threads.lock());
        for handle in threads {
            let name = handle.thread().name().unwrap_or("worker").to_string();
            if handle.join().is_err() {
                error!("{} exited abnormally", name);
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown(false, false);
    }
}

fn worker_loop(tasks: Receiver<BoxedTask>, interrupt: Receiver<()>, stopping: Arc<AtomicBool>) {
    loop {
        select! {
            recv(tasks) -> msg => match msg {
                Ok(task) => {
                    // A hard stop may race the dequeue; unstarted work is dropped.
                    if stopping.load(Ordering::SeqCst) {
                        debug!("Pool stopped, dropping dequeued task");
                        break;
                    }
                    if run_task(task) == WorkerControl::Stop {
                        break;
                    }
                }
                Err(_) => break,
            },
            recv(interrupt) -> _ => {
                if stopping.load(Ordering::SeqCst) {
                    break;
                }
                debug!("Worker interrupted while idle, retrying");
            }
        }
    }

    debug!(
        "{} exiting",
        thread::current().name().unwrap_or("worker")
    );
}

fn run_task(task: BoxedTask) -> WorkerControl {
    match panic::catch_unwind(AssertUnwindSafe(|| task.execute())) {
        Ok(control) => control,
        Err(_) => {
            error!("Task panicked, worker continues");
            WorkerControl::KeepRunning
        }
    }
}
