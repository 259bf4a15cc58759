//! Background owners of the booth hardware.
//!
//! Every device lives on its own thread behind a [`ServiceHandle`]. Callers
//! post requests without blocking and poll for completion from the control
//! loop. Each request is tagged with a generation number so a completion from
//! an earlier request can never be mistaken for the latest one.

pub mod capture;
pub mod flash;
pub mod print;

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, unbounded};
use tracing::{debug, error, info, warn};

use crate::error::ServiceError;

pub use capture::{CaptureService, CaptureWorker};
pub use flash::{FlashRequest, FlashService, FlashWorker};
pub use print::{PrintReceipt, PrintService, PrintWorker};

/// The device-specific half of a hardware service, run on the service thread.
pub trait Worker: Send + 'static {
    type Request: Send + 'static;
    /// Product of one unit of work; handed out as clones, so keep it cheap to clone.
    type Output: Clone + Send + 'static;

    /// Name used for the thread and in logs.
    const NAME: &'static str;

    fn perform(&mut self, request: Self::Request) -> anyhow::Result<Self::Output>;

    /// Return the device to a safe idle state. Runs on the service thread on exit.
    fn release(&mut self) {}
}

enum Message<R> {
    Work { generation: u64, request: R },
    Stop,
}

struct Slot<O> {
    generation: u64,
    output: Option<O>,
}

struct Shared<O> {
    requested: AtomicU64,
    finished: AtomicU64,
    changed: AtomicBool,
    stopping: AtomicBool,
    slot: Mutex<Slot<O>>,
}

impl<O> Shared<O> {
    fn slot(&self) -> MutexGuard<'_, Slot<O>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cloneable sending side of a service; used to hand one service to another.
pub struct Requester<W: Worker> {
    tx: Sender<Message<W::Request>>,
    shared: Arc<Shared<W::Output>>,
}

impl<W: Worker> Clone for Requester<W> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<W: Worker> Requester<W> {
    /// Queue one unit of work and forget any earlier completion.
    ///
    /// Returns the generation assigned to the request.
    pub fn request(&self, request: W::Request) -> Result<u64, ServiceError> {
        if self.shared.stopping.load(Ordering::Acquire) {
            return Err(ServiceError::Stopped(W::NAME));
        }
        let generation = {
            let mut slot = self.shared.slot();
            slot.output = None;
            self.shared.requested.fetch_add(1, Ordering::AcqRel) + 1
        };
        self.tx
            .send(Message::Work {
                generation,
                request,
            })
            .map_err(|_| ServiceError::Stopped(W::NAME))?;
        self.shared.changed.store(true, Ordering::Release);
        debug!(service = W::NAME, generation, "request queued");
        Ok(generation)
    }
}

/// Owning handle to a running hardware service. Dropping it stops the service.
pub struct ServiceHandle<W: Worker> {
    requester: Requester<W>,
    thread: Option<JoinHandle<()>>,
}

impl<W: Worker> ServiceHandle<W> {
    /// Spawn the run-loop thread that owns `worker` from now on.
    pub fn start(worker: W) -> Result<Self, ServiceError> {
        let (tx, rx) = unbounded();
        let shared = Arc::new(Shared {
            requested: AtomicU64::new(0),
            finished: AtomicU64::new(0),
            changed: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
            slot: Mutex::new(Slot {
                generation: 0,
                output: None,
            }),
        });

        let loop_shared = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name(format!("{}-service", W::NAME))
            .spawn(move || run_loop(worker, rx, loop_shared))
            .map_err(|source| ServiceError::Spawn {
                name: W::NAME,
                source,
            })?;
        info!(service = W::NAME, "service started");

        Ok(Self {
            requester: Requester { tx, shared },
            thread: Some(thread),
        })
    }

    pub fn requester(&self) -> Requester<W> {
        self.requester.clone()
    }

    pub fn request(&self, request: W::Request) -> Result<u64, ServiceError> {
        self.requester.request(request)
    }

    /// True once the most recent request has completed successfully.
    pub fn is_done(&self) -> bool {
        let shared = &self.requester.shared;
        let slot = shared.slot();
        slot.output.is_some() && slot.generation == shared.requested.load(Ordering::Acquire)
    }

    /// Copy of the latest product, available only while [`is_done`](Self::is_done) holds.
    pub fn result(&self) -> Option<W::Output> {
        let shared = &self.requester.shared;
        let slot = shared.slot();
        if slot.generation != shared.requested.load(Ordering::Acquire) {
            return None;
        }
        slot.output.clone()
    }

    /// Like [`result`](Self::result) but hands the product out only once.
    pub fn take_result(&self) -> Option<W::Output> {
        let shared = &self.requester.shared;
        let mut slot = shared.slot();
        if slot.generation != shared.requested.load(Ordering::Acquire) {
            return None;
        }
        slot.output.take()
    }

    /// Requests accepted but not yet finished, including the one in progress.
    pub fn queue_depth(&self) -> u64 {
        let shared = &self.requester.shared;
        let requested = shared.requested.load(Ordering::Acquire);
        requested.saturating_sub(shared.finished.load(Ordering::Acquire))
    }

    /// Whether the queue moved since the last call. Reading clears the flag.
    pub fn changed(&self) -> bool {
        self.requester.shared.changed.swap(false, Ordering::AcqRel)
    }

    /// Ask the run-loop to exit. Queued work is discarded; does not block.
    pub fn stop(&self) {
        let shared = &self.requester.shared;
        if !shared.stopping.swap(true, Ordering::AcqRel) {
            let _ = self.requester.tx.send(Message::Stop);
            debug!(service = W::NAME, "stop requested");
        }
    }

    /// Stop the service and wait for its thread to release the device.
    pub fn shutdown(mut self) {
        self.stop();
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            error!(service = W::NAME, "service thread panicked during shutdown");
        }
    }
}

impl<W: Worker> Drop for ServiceHandle<W> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop<W: Worker>(
    mut worker: W,
    rx: Receiver<Message<W::Request>>,
    shared: Arc<Shared<W::Output>>,
) {
    while let Ok(message) = rx.recv() {
        if shared.stopping.load(Ordering::Acquire) {
            break;
        }
        let (generation, request) = match message {
            Message::Stop => break,
            Message::Work {
                generation,
                request,
            } => (generation, request),
        };

        match panic::catch_unwind(AssertUnwindSafe(|| worker.perform(request))) {
            Ok(Ok(output)) => {
                let mut slot = shared.slot();
                if generation >= slot.generation {
                    slot.generation = generation;
                    slot.output = Some(output);
                }
            }
            Ok(Err(err)) => {
                warn!(service = W::NAME, generation, error = ?err, "request failed");
            }
            Err(payload) => {
                error!(
                    service = W::NAME,
                    generation,
                    panic = panic_message(payload.as_ref()),
                    "request panicked"
                );
            }
        }
        shared.finished.fetch_add(1, Ordering::AcqRel);
        shared.changed.store(true, Ordering::Release);
    }

    worker.release();
    info!(service = W::NAME, "service stopped");
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    use anyhow::bail;

    use super::*;

    /// Doubles its input; fails on 0 and panics on 13. Waits on a gate when one is supplied.
    struct Doubler {
        gate: Option<crossbeam_channel::Receiver<()>>,
        released: mpsc::Sender<()>,
    }

    impl Worker for Doubler {
        type Request = u32;
        type Output = u32;
        const NAME: &'static str = "doubler";

        fn perform(&mut self, request: u32) -> anyhow::Result<u32> {
            if let Some(gate) = &self.gate {
                let _ = gate.recv();
            }
            match request {
                0 => bail!("zero is not allowed"),
                13 => panic!("unlucky"),
                n => Ok(n * 2),
            }
        }

        fn release(&mut self) {
            let _ = self.released.send(());
        }
    }

    fn start(gate: Option<crossbeam_channel::Receiver<()>>) -> (ServiceHandle<Doubler>, mpsc::Receiver<()>) {
        let (released, on_release) = mpsc::channel();
        let handle = ServiceHandle::start(Doubler { gate, released }).unwrap();
        (handle, on_release)
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn completion_is_observed_once_per_request() {
        let (service, _) = start(None);
        service.request(21).unwrap();
        assert!(wait_until(|| service.is_done()));
        assert_eq!(service.result(), Some(42));
        assert_eq!(service.take_result(), Some(42));
        assert!(!service.is_done());
        assert_eq!(service.take_result(), None);
    }

    #[test]
    fn request_clears_previous_completion() {
        let (gate_tx, gate_rx) = crossbeam_channel::unbounded();
        let (service, _) = start(Some(gate_rx));
        gate_tx.send(()).unwrap();
        service.request(1).unwrap();
        assert!(wait_until(|| service.is_done()));

        service.request(5).unwrap();
        assert!(!service.is_done(), "new request must hide the old result");
        assert_eq!(service.result(), None);
        gate_tx.send(()).unwrap();
        assert!(wait_until(|| service.is_done()));
        assert_eq!(service.result(), Some(10));
    }

    #[test]
    fn stale_completion_never_satisfies_newer_request() {
        let (gate_tx, gate_rx) = crossbeam_channel::unbounded();
        let (service, _) = start(Some(gate_rx));
        service.request(1).unwrap();
        service.request(2).unwrap();
        gate_tx.send(()).unwrap();
        assert!(wait_until(|| service.queue_depth() == 1));
        assert!(!service.is_done());
        gate_tx.send(()).unwrap();
        assert!(wait_until(|| service.is_done()));
        assert_eq!(service.result(), Some(4));
    }

    #[test]
    fn failures_and_panics_keep_the_loop_alive() {
        let (service, _) = start(None);
        service.request(0).unwrap();
        assert!(wait_until(|| service.queue_depth() == 0));
        assert!(!service.is_done());

        service.request(13).unwrap();
        assert!(wait_until(|| service.queue_depth() == 0));
        assert!(!service.is_done());

        service.request(4).unwrap();
        assert!(wait_until(|| service.is_done()));
        assert_eq!(service.take_result(), Some(8));
    }

    #[test]
    fn changed_is_edge_triggered() {
        let (service, _) = start(None);
        assert!(!service.changed());
        service.request(3).unwrap();
        assert!(wait_until(|| service.queue_depth() == 0));
        assert!(service.changed());
        assert!(!service.changed());
    }

    #[test]
    fn stop_releases_on_service_thread_and_rejects_requests() {
        let (service, released) = start(None);
        service.stop();
        assert!(released.recv_timeout(Duration::from_secs(5)).is_ok());
        assert!(matches!(
            service.request(1),
            Err(ServiceError::Stopped("doubler"))
        ));
    }

    #[test]
    fn dropping_the_handle_stops_the_service() {
        let (service, released) = start(None);
        drop(service);
        assert!(released.recv_timeout(Duration::from_secs(5)).is_ok());
    }
}
