//! The serialized transition queue and its completion handles.
//!
//! Each machine owns exactly one worker thread draining one queue, so
//! transition bodies never overlap and run in submission order. Completion is
//! reported through one-shot channels: synchronous callers block on their own
//! channel, asynchronous callers hold it as a [`TransitionHandle`].

use crate::core::state::StateName;
use crate::engine::error::MachineError;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::OnceLock;
use std::task::{Context, Poll};
use std::thread::{self, ThreadId};
use tokio::sync::oneshot;

/// What a finished transition reports: whether the state changed, or why the
/// attempt failed.
pub(crate) type Outcome = Result<bool, MachineError>;

/// One queued transition request.
pub(crate) struct Job {
    pub(crate) target: StateName,
    pub(crate) reply: oneshot::Sender<Outcome>,
}

struct QueueInner {
    jobs: VecDeque<Job>,
    closed: bool,
}

/// The per-machine job queue shared between submitters and the worker.
pub(crate) struct JobQueue {
    inner: Mutex<QueueInner>,
    ready: Condvar,
    worker: OnceLock<ThreadId>,
}

impl JobQueue {
    pub(crate) fn new() -> Self {
        JobQueue {
            inner: Mutex::new(QueueInner {
                jobs: VecDeque::new(),
                closed: false,
            }),
            ready: Condvar::new(),
            worker: OnceLock::new(),
        }
    }

    /// Record which thread drains this queue. Called once, by the worker.
    pub(crate) fn bind_worker(&self) {
        let _ = self.worker.set(thread::current().id());
    }

    /// True when called from the worker thread itself, i.e. from inside a
    /// running transition's handler code.
    pub(crate) fn on_worker_thread(&self) -> bool {
        self.worker.get() == Some(&thread::current().id())
    }

    /// Enqueue a request and hand back the channel its outcome arrives on.
    pub(crate) fn submit(&self, target: StateName) -> oneshot::Receiver<Outcome> {
        let (reply, receiver) = oneshot::channel();
        let mut inner = self.inner.lock();

        if inner.closed {
            let _ = reply.send(Err(MachineError::Cancelled));
        } else {
            inner.jobs.push_back(Job { target, reply });
            self.ready.notify_one();
        }

        receiver
    }

    /// Block until a job is available. Returns `None` once the queue is
    /// closed and drained.
    pub(crate) fn next(&self) -> Option<Job> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(job) = inner.jobs.pop_front() {
                return Some(job);
            }
            if inner.closed {
                return None;
            }
            self.ready.wait(&mut inner);
        }
    }

    /// Discard every queued job, reporting cancellation on each handle.
    /// Returns how many were discarded.
    pub(crate) fn cancel_pending(&self) -> usize {
        let drained: Vec<Job> = self.inner.lock().jobs.drain(..).collect();
        let count = drained.len();

        for job in drained {
            let _ = job.reply.send(Err(MachineError::Cancelled));
        }

        count
    }

    /// Shut the queue down: no further submissions, pending work cancelled,
    /// the worker exits after its current job.
    pub(crate) fn close(&self) {
        self.inner.lock().closed = true;
        self.ready.notify_all();
        self.cancel_pending();
    }
}

/// Handle to an asynchronously submitted transition.
///
/// The outcome can be taken synchronously with [`wait`](Self::wait), polled
/// with [`try_outcome`](Self::try_outcome), or awaited (the handle implements
/// `Future`). If the transition is discarded because an earlier one failed,
/// the outcome is [`MachineError::Cancelled`].
pub struct TransitionHandle {
    receiver: oneshot::Receiver<Outcome>,
}

impl TransitionHandle {
    pub(crate) fn new(receiver: oneshot::Receiver<Outcome>) -> Self {
        TransitionHandle { receiver }
    }

    /// Block the calling thread until the outcome is known.
    pub fn wait(self) -> Outcome {
        self.receiver
            .blocking_recv()
            .unwrap_or(Err(MachineError::Cancelled))
    }

    /// Poll without blocking. Returns `None` while the transition is still
    /// queued or running; the outcome can be taken at most once.
    pub fn try_outcome(&mut self) -> Option<Outcome> {
        match self.receiver.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(MachineError::Cancelled)),
        }
    }
}

impl Future for TransitionHandle {
    type Output = Outcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(MachineError::Cancelled)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jobs_come_out_in_submission_order() {
        let queue = JobQueue::new();
        let _a = queue.submit(StateName::new("A"));
        let _b = queue.submit(StateName::new("B"));

        assert_eq!(queue.next().unwrap().target, StateName::new("A"));
        assert_eq!(queue.next().unwrap().target, StateName::new("B"));
    }

    #[test]
    fn cancel_pending_reports_on_every_handle() {
        let queue = JobQueue::new();
        let a = queue.submit(StateName::new("A"));
        let b = queue.submit(StateName::new("B"));

        assert_eq!(queue.cancel_pending(), 2);

        for receiver in [a, b] {
            let outcome = TransitionHandle::new(receiver).wait();
            assert!(matches!(outcome, Err(MachineError::Cancelled)));
        }
    }

    #[test]
    fn submissions_after_close_are_cancelled_immediately() {
        let queue = JobQueue::new();
        queue.close();

        let mut handle = TransitionHandle::new(queue.submit(StateName::new("A")));
        assert!(matches!(
            handle.try_outcome(),
            Some(Err(MachineError::Cancelled))
        ));
        assert!(queue.next().is_none());
    }

    #[test]
    fn worker_thread_detection() {
        let queue = std::sync::Arc::new(JobQueue::new());
        assert!(!queue.on_worker_thread());

        let cloned = std::sync::Arc::clone(&queue);
        let bound_elsewhere = thread::spawn(move || {
            cloned.bind_worker();
            cloned.on_worker_thread()
        })
        .join()
        .unwrap();

        assert!(bound_elsewhere);
        assert!(!queue.on_worker_thread());
    }

    #[test]
    fn try_outcome_reports_pending_then_delivers() {
        let queue = JobQueue::new();
        let mut handle = TransitionHandle::new(queue.submit(StateName::new("A")));
        assert!(handle.try_outcome().is_none());

        let job = queue.next().unwrap();
        job.reply.send(Ok(true)).ok();
        assert!(matches!(handle.try_outcome(), Some(Ok(true))));
    }
}
