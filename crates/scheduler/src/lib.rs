#![deny(unsafe_code)]

//! # Task Scheduler (C6)
//!
//! A fixed pool of OS threads draining one shared FIFO queue. Tasks are
//! non-suspending and run to completion on whichever worker thread picks
//! them up; there is no cooperative yielding (§5). A running task gets a
//! [`TaskContext`] handle that lets it submit more tasks back onto the same
//! queue — the Metadump Task submitting Process-Metabuf Tasks as it rotates
//! files is the motivating case — which is why the queue's sending half
//! must stay usable for the scheduler's entire lifetime, not just until the
//! last external caller drops its handle.
//!
//! Shutdown is two-phase: [`TaskScheduler::request_shutdown`] sets a
//! cooperative flag that running tasks can observe via
//! [`TaskContext::shutdown_requested`] to stop submitting further work, and
//! [`TaskScheduler::shutdown`] blocks until the queue has fully drained
//! (quiescence) before sending each worker a stop signal and joining its
//! thread.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Receiver, Sender};

/// One unit of work. Implementors must not block indefinitely on anything
/// but I/O specific to their own job (a socket read, a buffer checkout) —
/// the scheduler has no preemption, so a task that never returns starves
/// its worker thread forever.
pub trait Task: Send {
    fn execute(&mut self, ctx: &TaskContext);
}

enum WorkItem {
    Run(Box<dyn Task>),
    Stop,
}

struct Inner {
    sender: Sender<WorkItem>,
    receiver: Receiver<WorkItem>,
    inflight: AtomicI64,
    completed: AtomicU64,
    failures: AtomicU64,
    shutdown_requested: AtomicBool,
    quiescent_lock: Mutex<()>,
    quiescent_cv: Condvar,
}

/// A fixed-size pool of worker threads draining a shared task queue.
pub struct TaskScheduler {
    inner: Arc<Inner>,
    workers: Vec<JoinHandle<()>>,
}

/// Handle passed to a running [`Task`], allowing re-entrant submission and
/// cooperative shutdown checks.
#[derive(Clone)]
pub struct TaskContext {
    inner: Arc<Inner>,
}

impl TaskScheduler {
    pub fn new(num_threads: usize) -> TaskScheduler {
        let (sender, receiver) = unbounded();
        let inner = Arc::new(Inner {
            sender,
            receiver,
            inflight: AtomicI64::new(0),
            completed: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            shutdown_requested: AtomicBool::new(false),
            quiescent_lock: Mutex::new(()),
            quiescent_cv: Condvar::new(),
        });

        let workers = (0..num_threads)
            .map(|id| {
                let inner = inner.clone();
                std::thread::Builder::new()
                    .name(format!("cdump-worker-{id}"))
                    .spawn(move || worker_loop(inner))
                    .expect("failed to spawn scheduler worker thread")
            })
            .collect();

        TaskScheduler { inner, workers }
    }

    /// Submits a task to the shared queue. Safe to call from outside any
    /// task (the coordinator's initial submission) or from within a running
    /// task via its [`TaskContext`].
    pub fn submit(&self, task: Box<dyn Task>) {
        self.context().submit(task);
    }

    /// A context usable for submission from outside a running task.
    pub fn context(&self) -> TaskContext {
        TaskContext { inner: self.inner.clone() }
    }

    /// Number of tasks that have completed `execute()` so far.
    pub fn completed_count(&self) -> u64 {
        self.inner.completed.load(Ordering::SeqCst)
    }

    /// Number of tasks that called [`TaskContext::report_failure`] during
    /// `execute()`. The coordinator maps any nonzero count to
    /// [`cdump_core::ExitCode::PartialFailure`].
    pub fn failure_count(&self) -> u64 {
        self.inner.failures.load(Ordering::SeqCst)
    }

    /// Sets the cooperative shutdown flag. Tasks already queued or running
    /// still complete; this only signals that new work should stop being
    /// submitted.
    pub fn request_shutdown(&self) {
        self.inner.shutdown_requested.store(true, Ordering::SeqCst);
    }

    /// Blocks until the queue is empty and no task is executing.
    pub fn await_quiescence(&self) {
        let mut guard = self.inner.quiescent_lock.lock().expect("scheduler mutex poisoned");
        while self.inner.inflight.load(Ordering::SeqCst) != 0 {
            guard = self.inner.quiescent_cv.wait(guard).expect("scheduler mutex poisoned");
        }
    }

    /// Phase two of shutdown: waits for quiescence, then stops and joins
    /// every worker thread. Consumes the scheduler since no further
    /// submission makes sense afterward.
    pub fn shutdown(mut self) {
        self.await_quiescence();
        for _ in &self.workers {
            let _ = self.inner.sender.send(WorkItem::Stop);
        }
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl TaskContext {
    pub fn submit(&self, task: Box<dyn Task>) {
        self.inner.inflight.fetch_add(1, Ordering::SeqCst);
        if self.inner.sender.send(WorkItem::Run(task)).is_err() {
            // Scheduler already shut down; undo the bookkeeping so
            // await_quiescence never blocks forever on phantom work.
            self.inner.inflight.fetch_sub(1, Ordering::SeqCst);
        }
    }

    pub fn shutdown_requested(&self) -> bool {
        self.inner.shutdown_requested.load(Ordering::SeqCst)
    }

    /// Records that the calling task ended in a task-fatal error. The task
    /// itself decides this (it already logged the error); the scheduler
    /// just counts it for the coordinator's exit status.
    pub fn report_failure(&self) {
        self.inner.failures.fetch_add(1, Ordering::SeqCst);
    }
}

fn worker_loop(inner: Arc<Inner>) {
    let ctx = TaskContext { inner: inner.clone() };
    loop {
        match inner.receiver.recv() {
            Ok(WorkItem::Run(mut task)) => {
                task.execute(&ctx);
                drop(task);
                inner.completed.fetch_add(1, Ordering::SeqCst);
                if inner.inflight.fetch_sub(1, Ordering::SeqCst) == 1 {
                    let _guard = inner.quiescent_lock.lock().expect("scheduler mutex poisoned");
                    inner.quiescent_cv.notify_all();
                }
            }
            Ok(WorkItem::Stop) | Err(_) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingTask {
        counter: Arc<AtomicUsize>,
    }

    impl Task for CountingTask {
        fn execute(&mut self, _ctx: &TaskContext) {
            self.counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct ResubmittingTask {
        counter: Arc<AtomicUsize>,
        depth: usize,
    }

    impl Task for ResubmittingTask {
        fn execute(&mut self, ctx: &TaskContext) {
            self.counter.fetch_add(1, Ordering::SeqCst);
            if self.depth > 0 {
                ctx.submit(Box::new(ResubmittingTask { counter: self.counter.clone(), depth: self.depth - 1 }));
            }
        }
    }

    #[test]
    fn runs_every_submitted_task() {
        let scheduler = TaskScheduler::new(4);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..50 {
            scheduler.submit(Box::new(CountingTask { counter: counter.clone() }));
        }
        scheduler.await_quiescence();
        assert_eq!(counter.load(Ordering::SeqCst), 50);
        assert_eq!(scheduler.completed_count(), 50);
        scheduler.shutdown();
    }

    #[test]
    fn tasks_can_resubmit_reentrantly() {
        let scheduler = TaskScheduler::new(2);
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler.submit(Box::new(ResubmittingTask { counter: counter.clone(), depth: 5 }));
        scheduler.await_quiescence();
        assert_eq!(counter.load(Ordering::SeqCst), 6);
        scheduler.shutdown();
    }

    #[test]
    fn shutdown_requested_is_visible_to_running_tasks() {
        struct FlagCheckTask {
            observed: Arc<AtomicBool>,
        }
        impl Task for FlagCheckTask {
            fn execute(&mut self, ctx: &TaskContext) {
                self.observed.store(ctx.shutdown_requested(), Ordering::SeqCst);
            }
        }

        let scheduler = TaskScheduler::new(1);
        scheduler.request_shutdown();
        let observed = Arc::new(AtomicBool::new(false));
        scheduler.submit(Box::new(FlagCheckTask { observed: observed.clone() }));
        scheduler.await_quiescence();
        assert!(observed.load(Ordering::SeqCst));
        scheduler.shutdown();
    }

    #[test]
    fn reported_failures_are_counted() {
        struct FailingTask;
        impl Task for FailingTask {
            fn execute(&mut self, ctx: &TaskContext) {
                ctx.report_failure();
            }
        }

        let scheduler = TaskScheduler::new(1);
        scheduler.submit(Box::new(FailingTask));
        scheduler.submit(Box::new(FailingTask));
        scheduler.await_quiescence();
        assert_eq!(scheduler.failure_count(), 2);
        scheduler.shutdown();
    }

    #[test]
    fn shutdown_joins_all_worker_threads() {
        let scheduler = TaskScheduler::new(3);
        scheduler.submit(Box::new(CountingTask { counter: Arc::new(AtomicUsize::new(0)) }));
        scheduler.await_quiescence();
        scheduler.shutdown();
    }
}
