//! Dedicated presenter thread.
//!
//! The presenter is built and used on one OS thread. Everything else talks to
//! it through a [`PresenterHandle`], which queues jobs onto that thread in
//! FIFO order. Jobs never run on the caller's thread, so a writer that is
//! itself running on the presenter thread cannot deadlock by writing.

use std::io;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use teesink_core::ports::{
    Delivery, DeliveryDispatcher, DispatchError, DisposeHook, Presenter, Rejected,
};
use tracing::{debug, warn};

type PresenterJob<P> = Box<dyn FnOnce(&mut P) + Send>;

enum Job<P> {
    Run(PresenterJob<P>),
    Deliver(Delivery),
    Shutdown,
}

impl<P> Job<P> {
    /// Route a delivery that will never run to its fallback.
    fn fall_back(self) {
        if let Self::Deliver(delivery) = self {
            delivery.fall_back();
        }
    }
}

struct Gate {
    accepting: bool,
    hooks: Vec<DisposeHook>,
}

/// State shared between handles and the presenter thread.
struct Shared {
    gate: Mutex<Gate>,
    failed_deliveries: AtomicUsize,
}

impl Shared {
    fn new() -> Self {
        Self {
            gate: Mutex::new(Gate {
                accepting: true,
                hooks: Vec::new(),
            }),
            failed_deliveries: AtomicUsize::new(0),
        }
    }

    fn gate(&self) -> MutexGuard<'_, Gate> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stop accepting jobs and hand back the registered hooks.
    fn close(&self) -> Vec<DisposeHook> {
        let mut gate = self.gate();
        gate.accepting = false;
        std::mem::take(&mut gate.hooks)
    }
}

/// Owner of the presenter thread.
///
/// Dropping it shuts the thread down after the jobs already queued.
pub struct PresenterThread<P: Presenter + 'static> {
    handle: PresenterHandle<P>,
    join: Option<JoinHandle<()>>,
    name: String,
}

impl<P: Presenter + 'static> PresenterThread<P> {
    /// Spawn a named thread and build the presenter on it with `factory`.
    pub fn spawn<F>(name: impl Into<String>, factory: F) -> io::Result<Self>
    where
        F: FnOnce() -> P + Send + 'static,
    {
        let name = name.into();
        let (tx, rx) = mpsc::channel();
        let shared = Arc::new(Shared::new());
        let thread_shared = Arc::clone(&shared);

        let join = thread::Builder::new()
            .name(name.clone())
            .spawn(move || run_presenter(factory, &rx, &thread_shared))?;

        debug!(thread = %name, "Presenter thread started");

        let handle = PresenterHandle {
            tx,
            shared,
            thread_id: join.thread().id(),
        };
        Ok(Self {
            handle,
            join: Some(join),
            name,
        })
    }

    /// A handle for queueing work onto the presenter.
    pub fn handle(&self) -> PresenterHandle<P> {
        self.handle.clone()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shut the thread down after the queued jobs, run dispose hooks and
    /// wait for it to exit.
    pub fn dispose(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let Some(join) = self.join.take() else {
            return;
        };

        let _ = self.handle.enqueue(Job::Shutdown);

        if thread::current().id() == self.handle.thread_id {
            // Dropped from inside a presenter job; the loop exits on its own.
            return;
        }
        if join.join().is_err() {
            warn!(thread = %self.name, "Presenter thread panicked");
        }
        debug!(thread = %self.name, "Presenter thread stopped");
    }
}

impl<P: Presenter + 'static> Drop for PresenterThread<P> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Cloneable, thread-safe access to a presenter living on its own thread.
pub struct PresenterHandle<P> {
    tx: Sender<Job<P>>,
    shared: Arc<Shared>,
    thread_id: ThreadId,
}

impl<P> Clone for PresenterHandle<P> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            shared: Arc::clone(&self.shared),
            thread_id: self.thread_id,
        }
    }
}

impl<P: Presenter + 'static> PresenterHandle<P> {
    /// Queue `f` to run on the presenter thread. Returns immediately.
    pub fn exec_async(&self, f: impl FnOnce(&mut P) + Send + 'static) -> Result<(), DispatchError> {
        self.enqueue(Job::Run(Box::new(f)))
    }

    /// Run `f` on the presenter thread and wait for its result.
    ///
    /// Refused with [`DispatchError::SameThread`] when called from the
    /// presenter thread, where waiting would never finish.
    pub fn exec_sync<R: Send + 'static>(
        &self,
        f: impl FnOnce(&mut P) -> R + Send + 'static,
    ) -> Result<R, DispatchError> {
        if self.is_presenter_thread() {
            return Err(DispatchError::SameThread);
        }

        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        self.exec_async(move |presenter| {
            let _ = reply_tx.send(f(presenter));
        })?;

        // The reply sender is dropped unanswered if the job panics or the
        // thread shuts down before reaching it.
        reply_rx.recv().map_err(|_| DispatchError::Disposed)
    }

    /// Remove all retained content.
    pub fn clear(&self) -> Result<(), DispatchError> {
        self.exec_sync(|presenter| presenter.clear())
    }

    pub fn is_empty(&self) -> Result<bool, DispatchError> {
        self.exec_sync(|presenter| presenter.is_empty())
    }

    pub fn has_selection(&self) -> Result<bool, DispatchError> {
        self.exec_sync(|presenter| presenter.has_selection())
    }

    /// Whether the presenter thread has stopped accepting work.
    pub fn is_disposed(&self) -> bool {
        !self.shared.gate().accepting
    }

    /// Number of deliveries that were routed to their fallback.
    pub fn failed_deliveries(&self) -> usize {
        self.shared.failed_deliveries.load(Ordering::Relaxed)
    }

    pub fn is_presenter_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Queue `job` unless the thread is shutting down. The gate lock is held
    /// across the send so that nothing slips in after the final drain.
    fn enqueue(&self, job: Job<P>) -> Result<(), DispatchError> {
        let gate = self.shared.gate();
        if !gate.accepting {
            return Err(DispatchError::Disposed);
        }
        self.tx.send(job).map_err(|_| DispatchError::Disposed)
    }
}

impl<P: Presenter + 'static> DeliveryDispatcher for PresenterHandle<P> {
    fn dispatch(&self, delivery: Delivery) -> Result<(), Rejected> {
        let gate = self.shared.gate();
        if !gate.accepting {
            return Err(Rejected {
                delivery,
                reason: DispatchError::Disposed,
            });
        }

        // The receiver outlives the open gate, so a failed send means the
        // thread died without draining; the text still reaches its fallback.
        if let Err(mpsc::SendError(job)) = self.tx.send(Job::Deliver(delivery)) {
            drop(gate);
            self.shared.failed_deliveries.fetch_add(1, Ordering::Relaxed);
            job.fall_back();
        }
        Ok(())
    }

    fn on_dispose(&self, hook: DisposeHook) {
        let mut gate = self.shared.gate();
        if gate.accepting {
            gate.hooks.push(hook);
            return;
        }
        drop(gate);
        hook();
    }
}

/// Disposes the shared state when the presenter loop ends, including by
/// panic in the factory or a job.
struct DisposeGuard<'a, P> {
    rx: &'a Receiver<Job<P>>,
    shared: &'a Shared,
}

impl<P> Drop for DisposeGuard<'_, P> {
    fn drop(&mut self) {
        let hooks = self.shared.close();

        // Anything queued before the gate closed never reaches the surface.
        let mut stranded = 0usize;
        while let Ok(job) = self.rx.try_recv() {
            if let Job::Deliver(delivery) = job {
                stranded += 1;
                delivery.fall_back();
            }
        }

        for hook in hooks {
            if catch_unwind(AssertUnwindSafe(hook)).is_err() {
                warn!("Presenter dispose hook panicked");
            }
        }

        debug!(
            stranded,
            failed = self.shared.failed_deliveries.load(Ordering::Relaxed),
            "Presenter disposed"
        );
    }
}

fn run_presenter<P, F>(factory: F, rx: &Receiver<Job<P>>, shared: &Shared)
where
    P: Presenter,
    F: FnOnce() -> P,
{
    let _guard = DisposeGuard { rx, shared };
    let mut presenter = factory();

    while let Ok(job) = rx.recv() {
        match job {
            Job::Run(f) => {
                if catch_unwind(AssertUnwindSafe(|| f(&mut presenter))).is_err() {
                    warn!("Presenter job panicked");
                }
            }
            Job::Deliver(delivery) => deliver(&mut presenter, delivery, shared),
            Job::Shutdown => break,
        }
    }
}

fn deliver<P: Presenter>(presenter: &mut P, delivery: Delivery, shared: &Shared) {
    let appended = catch_unwind(AssertUnwindSafe(|| {
        presenter.append_bounded(&delivery.text, delivery.max_chars)
    }));

    let failure = match appended {
        Ok(Ok(())) => return,
        Ok(Err(e)) => e.to_string(),
        Err(_) => "presenter panicked".to_string(),
    };

    let chars = delivery.text.chars().count();
    delivery.fall_back();

    // Only the first failure is logged: the log writer may itself feed this
    // presenter, and a persistently failing surface would otherwise loop.
    if shared.failed_deliveries.fetch_add(1, Ordering::Relaxed) == 0 {
        warn!(
            error = %failure,
            chars,
            "Cannot append to presenter, text written to original stream; further failures are not logged"
        );
    }
}
