//! Notify queues: bounded FIFO dispatch for deferred subscriber
//! callbacks.
//!
//! A queue handle is cheap to clone; identity (for callback coalescing)
//! is handle identity. The *immediate* queue runs callbacks inline at the
//! publish site. Bounded queues buffer jobs for a worker that calls
//! [`NotifyQueue::process`]; a full queue drops the job with a warning
//! rather than blocking the committing thread.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;

type Job = Box<dyn FnOnce() + Send>;

struct QueueInner {
    name: String,
    channel: Option<(Sender<Job>, Receiver<Job>)>,
    paused: Mutex<Option<Vec<Job>>>,
}

/// Handle to a notify queue.
#[derive(Clone)]
pub struct NotifyQueue {
    inner: Arc<QueueInner>,
}

impl NotifyQueue {
    /// The inline queue: callbacks run at the publish site.
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            inner: Arc::new(QueueInner {
                name: "immediate".to_owned(),
                channel: None,
                paused: Mutex::new(None),
            }),
        }
    }

    /// A bounded FIFO queue holding at most `depth` pending callbacks.
    #[must_use]
    pub fn bounded(name: impl Into<String>, depth: usize) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                name: name.into(),
                channel: Some(bounded(depth)),
                paused: Mutex::new(None),
            }),
        }
    }

    /// Queue name, for diagnostics.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// True for the inline queue.
    #[must_use]
    pub fn is_immediate(&self) -> bool {
        self.inner.channel.is_none()
    }

    /// True when both handles name the same queue.
    #[must_use]
    pub fn same_queue(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of callbacks waiting to be processed.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner
            .channel
            .as_ref()
            .map_or(0, |(_, receiver)| receiver.len())
    }

    /// Buffer notifications instead of dispatching them.
    pub fn pause(&self) {
        let mut paused = self.inner.paused.lock();
        if paused.is_none() {
            *paused = Some(Vec::new());
        }
    }

    /// Replay buffered notifications and resume normal dispatch.
    pub fn play(&self) {
        let buffered = self.inner.paused.lock().take();
        if let Some(jobs) = buffered {
            for job in jobs {
                self.send(job);
            }
        }
    }

    /// Enqueue (or run, for the immediate queue) one callback.
    pub(crate) fn send(&self, job: Job) {
        {
            let mut paused = self.inner.paused.lock();
            if let Some(buffer) = paused.as_mut() {
                buffer.push(job);
                return;
            }
        }
        match &self.inner.channel {
            None => job(),
            Some((sender, _)) => match sender.try_send(job) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(queue = %self.inner.name, "notify queue full, dropping callback");
                }
                Err(TrySendError::Disconnected(_)) => {}
            },
        }
    }

    /// Dequeue and run at most one callback, waiting up to `timeout`.
    /// Returns whether a callback ran.
    pub fn process(&self, timeout: Duration) -> bool {
        let Some((_, receiver)) = &self.inner.channel else {
            return false;
        };
        match receiver.recv_timeout(timeout) {
            Ok(job) => {
                job();
                true
            }
            Err(_) => false,
        }
    }

    /// Run callbacks until the queue is empty.
    pub fn drain(&self) {
        while self.process(Duration::ZERO) {}
    }
}

impl std::fmt::Debug for NotifyQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyQueue")
            .field("name", &self.inner.name)
            .field("immediate", &self.is_immediate())
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn immediate_queue_runs_inline() {
        let queue = NotifyQueue::immediate();
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&counter);
        queue.send(Box::new(move || {
            seen.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(!queue.process(Duration::ZERO));
    }

    #[test]
    fn bounded_queue_is_fifo() {
        let queue = NotifyQueue::bounded("test", 8);
        let order = Arc::new(Mutex::new(Vec::new()));
        for n in 0..3 {
            let order = Arc::clone(&order);
            queue.send(Box::new(move || order.lock().push(n)));
        }
        assert_eq!(queue.pending(), 3);
        assert!(queue.process(Duration::ZERO));
        queue.drain();
        assert_eq!(*order.lock(), [0, 1, 2]);
    }

    #[test]
    fn full_queue_drops_instead_of_blocking() {
        let queue = NotifyQueue::bounded("tiny", 1);
        queue.send(Box::new(|| {}));
        queue.send(Box::new(|| panic!("this callback must have been dropped")));
        assert_eq!(queue.pending(), 1);
        queue.drain();
    }

    #[test]
    fn pause_buffers_until_play() {
        let queue = NotifyQueue::bounded("paused", 8);
        let counter = Arc::new(AtomicUsize::new(0));

        queue.pause();
        for _ in 0..2 {
            let seen = Arc::clone(&counter);
            queue.send(Box::new(move || {
                seen.fetch_add(1, Ordering::SeqCst);
            }));
        }
        assert_eq!(queue.pending(), 0);

        queue.play();
        assert_eq!(queue.pending(), 2);
        queue.drain();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn process_times_out_when_empty() {
        let queue = NotifyQueue::bounded("empty", 4);
        assert!(!queue.process(Duration::from_millis(1)));
    }

    #[test]
    fn queue_identity_is_handle_identity() {
        let a = NotifyQueue::bounded("a", 4);
        let b = NotifyQueue::bounded("a", 4);
        assert!(a.same_queue(&a.clone()));
        assert!(!a.same_queue(&b));
    }
}
