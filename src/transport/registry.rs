//! Registry of in-flight requests, keyed by correlation id.
//!
//! Each pending request holds a single-assignment completion slot backed by a
//! `oneshot` channel: the inbound-message path resolves it with a response,
//! or `close_all` resolves it with a terminal error, whichever fires first.
//! A slot is resolved at most once by construction.

use crate::error::{Result, TransportError};
use crate::messages::ResponseEnvelope;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, trace, warn};

/// One pending request awaiting its response.
struct PendingSlot {
    action: String,
    tx: oneshot::Sender<Result<ResponseEnvelope>>,
    created_at: Instant,
    // Held until the slot is resolved or removed, freeing one admission.
    _permit: Option<OwnedSemaphorePermit>,
}

/// Thread-safe map of correlation id to pending slot, with optional bounded
/// admission and a closed flag. The map lock is never held across an await.
pub struct InFlightRegistry {
    slots: Mutex<HashMap<u64, PendingSlot>>,
    capacity: Option<Arc<Semaphore>>,
    admission_timeout: Duration,
    closed: AtomicBool,
}

impl InFlightRegistry {
    /// Create an unbounded registry.
    pub fn new(admission_timeout: Duration) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            capacity: None,
            admission_timeout,
            closed: AtomicBool::new(false),
        }
    }

    /// Create a registry admitting at most `capacity` concurrent requests;
    /// further admissions wait up to `admission_timeout` for a free slot.
    pub fn bounded(capacity: usize, admission_timeout: Duration) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            capacity: Some(Arc::new(Semaphore::new(capacity))),
            admission_timeout,
            closed: AtomicBool::new(false),
        }
    }

    /// Register a new pending request and return the receiver its response
    /// will arrive on.
    ///
    /// Fails with `ConnectionClosed` once the registry is closed,
    /// `RegistrationTimeout` when the capacity bound stays full past the
    /// admission timeout, and `DuplicateRequestId` if the id is already
    /// pending (an existing slot is never overwritten).
    pub async fn admit(
        &self,
        action: &str,
        req_id: u64,
    ) -> Result<oneshot::Receiver<Result<ResponseEnvelope>>> {
        if self.is_closed() {
            return Err(TransportError::ConnectionClosed);
        }

        let permit = match &self.capacity {
            Some(semaphore) => {
                let acquire = Arc::clone(semaphore).acquire_owned();
                match tokio::time::timeout(self.admission_timeout, acquire).await {
                    Ok(Ok(permit)) => Some(permit),
                    // Semaphore closed by close_all while we waited.
                    Ok(Err(_)) => return Err(TransportError::ConnectionClosed),
                    Err(_) => {
                        warn!(
                            req_id,
                            action,
                            timeout = ?self.admission_timeout,
                            "in-flight registry full, admission timed out"
                        );
                        return Err(TransportError::RegistrationTimeout {
                            timeout: self.admission_timeout,
                        });
                    }
                }
            }
            None => None,
        };

        let (tx, rx) = oneshot::channel();
        let mut slots = self.slots.lock().expect("registry lock poisoned");

        // Re-check under the lock: close_all may have drained the map while
        // this caller was waiting on the semaphore.
        if self.is_closed() {
            return Err(TransportError::ConnectionClosed);
        }

        match slots.entry(req_id) {
            Entry::Occupied(_) => {
                warn!(req_id, action, "refusing to overwrite pending request");
                Err(TransportError::DuplicateRequestId(req_id))
            }
            Entry::Vacant(vacant) => {
                vacant.insert(PendingSlot {
                    action: action.to_string(),
                    tx,
                    created_at: Instant::now(),
                    _permit: permit,
                });
                trace!(req_id, action, "request admitted");
                Ok(rx)
            }
        }
    }

    /// Resolve the slot matching `req_id` with `response` and remove it.
    ///
    /// A response for an unknown id (late, duplicate, or already timed out)
    /// is dropped silently.
    pub fn complete(&self, req_id: u64, response: ResponseEnvelope) {
        let slot = {
            let mut slots = self.slots.lock().expect("registry lock poisoned");
            slots.remove(&req_id)
        };

        match slot {
            Some(slot) => {
                trace!(
                    req_id,
                    action = %slot.action,
                    elapsed = ?slot.created_at.elapsed(),
                    "request completed"
                );
                // Receiver may already be gone if the caller gave up.
                let _ = slot.tx.send(Ok(response));
            }
            None => {
                trace!(req_id, "dropping response for unregistered request");
            }
        }
    }

    /// Remove a slot without resolving it, so a later response for the same
    /// id falls into the silent-drop path of `complete`.
    pub fn remove(&self, req_id: u64) {
        let mut slots = self.slots.lock().expect("registry lock poisoned");
        if slots.remove(&req_id).is_some() {
            trace!(req_id, "pending request deregistered");
        }
    }

    /// Close the registry: fail every pending request with
    /// `ConnectionClosed` and make all subsequent admissions fail fast.
    pub fn close_all(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(semaphore) = &self.capacity {
            semaphore.close();
        }

        let drained: Vec<(u64, PendingSlot)> = {
            let mut slots = self.slots.lock().expect("registry lock poisoned");
            slots.drain().collect()
        };

        if !drained.is_empty() {
            debug!(count = drained.len(), "failing pending requests on close");
        }
        for (req_id, slot) in drained {
            trace!(req_id, action = %slot.action, "pending request failed by close");
            let _ = slot.tx.send(Err(TransportError::ConnectionClosed));
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn has_pending(&self) -> bool {
        !self.slots.lock().expect("registry lock poisoned").is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.slots.lock().expect("registry lock poisoned").len()
    }
}
