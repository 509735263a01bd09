//! Admission control for request concurrency.
//!
//! # Responsibilities
//! - Enforce the ceiling on concurrently executing requests
//! - Hold a bounded FIFO queue of requests waiting for a slot
//! - Reject immediately once slots and queue are both exhausted
//! - Report the committed request count so quit can drain
//!
//! # Design Decisions
//! - Two semaphores: `running` is the execution ceiling, `waiting` the
//!   queue bound. A request first races for a free slot, then for a
//!   queue position, and only then blocks
//! - Queue order is whatever the runtime semaphore hands out, which for
//!   tokio is FIFO
//! - `in_flight` counts queued requests too. A request that made it
//!   past rejection is committed and drain waits for it

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};

use crate::observability::metrics;

/// Outcome of [`AdmissionGate::admit`].
pub enum Admission {
    /// A slot was granted. The permit must be held for the request's
    /// whole chain run.
    Admitted(AdmissionPermit),
    /// Ceiling and wait queue are both full.
    Rejected,
}

/// Tracks one committed request from admission decision to completion.
struct Tracked {
    shared: Arc<GateShared>,
}

impl Tracked {
    fn new(shared: Arc<GateShared>) -> Self {
        shared.in_flight.fetch_add(1, Ordering::AcqRel);
        metrics::record_request_started();
        Self { shared }
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        metrics::record_request_finished();
        if self.shared.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.shared.idle.notify_waiters();
        }
    }
}

/// Concurrency slot. Dropping it frees the slot for the oldest queued
/// request and wakes drain waiters once the gate goes idle.
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
    _tracked: Tracked,
}

struct GateShared {
    in_flight: AtomicUsize,
    idle: Notify,
}

/// Semaphore pair bounding execution and wait-queue occupancy.
pub struct AdmissionGate {
    running: Arc<Semaphore>,
    waiting: Semaphore,
    shared: Arc<GateShared>,
}

impl AdmissionGate {
    pub fn new(max_concurrency: usize, buffer_size: usize) -> Self {
        Self {
            running: Arc::new(Semaphore::new(max_concurrency)),
            waiting: Semaphore::new(buffer_size),
            shared: Arc::new(GateShared {
                in_flight: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
        }
    }

    /// Decide whether a request may run.
    ///
    /// Returns [`Admission::Rejected`] without blocking when the
    /// ceiling is reached and the wait queue is full. Otherwise blocks
    /// until a slot frees up. Cancelling the returned future releases
    /// the queue position again.
    pub async fn admit(&self) -> Admission {
        let (tracked, permit) = match self.running.clone().try_acquire_owned() {
            Ok(permit) => (Tracked::new(self.shared.clone()), permit),
            Err(_) => {
                let Ok(queue_slot) = self.waiting.try_acquire() else {
                    return Admission::Rejected;
                };
                let tracked = Tracked::new(self.shared.clone());
                let permit = self
                    .running
                    .clone()
                    .acquire_owned()
                    .await
                    .expect("Semaphore closed unexpectedly");
                drop(queue_slot);
                (tracked, permit)
            }
        };
        Admission::Admitted(AdmissionPermit {
            _permit: permit,
            _tracked: tracked,
        })
    }

    /// Committed requests: executing plus queued.
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.load(Ordering::Acquire)
    }

    /// Resolve once no committed request remains.
    pub async fn drained(&self) {
        loop {
            let notified = self.shared.idle.notified();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::timeout;

    fn admitted(admission: Admission) -> AdmissionPermit {
        match admission {
            Admission::Admitted(permit) => permit,
            Admission::Rejected => panic!("expected admission"),
        }
    }

    #[tokio::test]
    async fn ceiling_admits_up_to_max() {
        let gate = AdmissionGate::new(2, 0);
        let a = admitted(gate.admit().await);
        let _b = admitted(gate.admit().await);
        assert_eq!(gate.in_flight(), 2);

        assert!(matches!(gate.admit().await, Admission::Rejected));

        drop(a);
        let _c = admitted(gate.admit().await);
        assert_eq!(gate.in_flight(), 2);
    }

    #[tokio::test]
    async fn full_queue_rejects_immediately() {
        let gate = Arc::new(AdmissionGate::new(1, 1));
        let _running = admitted(gate.admit().await);

        // Occupies the single queue slot.
        let mut queued = Box::pin(gate.admit());
        assert!(timeout(Duration::from_millis(20), &mut queued).await.is_err());

        assert!(matches!(gate.admit().await, Admission::Rejected));
    }

    #[tokio::test]
    async fn queued_request_runs_after_release() {
        let gate = Arc::new(AdmissionGate::new(1, 1));
        let running = admitted(gate.admit().await);

        let waiter = tokio::spawn({
            let gate = gate.clone();
            async move { admitted(gate.admit().await) }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(running);
        let _slot = timeout(Duration::from_millis(200), waiter)
            .await
            .expect("queued request should be admitted")
            .unwrap();
    }

    #[tokio::test]
    async fn queue_is_first_come_first_served() {
        let gate = Arc::new(AdmissionGate::new(1, 2));
        let running = admitted(gate.admit().await);
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut waiters = Vec::new();
        for id in [1u8, 2] {
            let gate = gate.clone();
            let order = order.clone();
            waiters.push(tokio::spawn(async move {
                let permit = admitted(gate.admit().await);
                order.lock().unwrap().push(id);
                // Hold briefly so the later waiter cannot overtake.
                tokio::time::sleep(Duration::from_millis(50)).await;
                drop(permit);
            }));
            // Make sure the first waiter queues before the second.
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        drop(running);
        for waiter in waiters {
            waiter.await.unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn cancelled_queue_wait_is_untracked() {
        let gate = Arc::new(AdmissionGate::new(1, 1));
        let running = admitted(gate.admit().await);

        let mut queued = Box::pin(gate.admit());
        assert!(timeout(Duration::from_millis(20), &mut queued).await.is_err());
        assert_eq!(gate.in_flight(), 2);

        drop(queued);
        assert_eq!(gate.in_flight(), 1);
        drop(running);
        assert_eq!(gate.in_flight(), 0);
    }

    #[tokio::test]
    async fn drained_resolves_once_idle() {
        let gate = Arc::new(AdmissionGate::new(2, 0));
        timeout(Duration::from_millis(50), gate.drained())
            .await
            .expect("idle gate drains immediately");

        let permit = admitted(gate.admit().await);
        let drain = tokio::spawn({
            let gate = gate.clone();
            async move { gate.drained().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!drain.is_finished());

        drop(permit);
        timeout(Duration::from_millis(200), drain)
            .await
            .expect("drain should resolve after release")
            .unwrap();
    }
}
