//! Request Correlator
//!
//! Matches each response to the call that is waiting for it. Every
//! registered call ends in exactly one terminal event: completion, failure,
//! expiry, or its handle being dropped. Whichever comes first removes the
//! entry; anything arriving later for that call id is logged and discarded.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use lodestar_common::protocol::error::{LodestarError, Result};
use lodestar_common::protocol::{CallId, RpcResponse};
use tokio::sync::oneshot;
use tracing::{debug, warn};

type Slot = oneshot::Sender<Result<RpcResponse>>;

/// A call that has been sent and not yet resolved.
struct PendingCall {
    service: String,
    method: String,
    timeout: Duration,
    slot: Slot,
}

impl PendingCall {
    fn timeout_error(&self) -> LodestarError {
        LodestarError::RpcTimeout {
            service: self.service.clone(),
            method: self.method.clone(),
            timeout_ms: self.timeout.as_millis() as u64,
        }
    }
}

/// Shared table of in-flight calls.
///
/// Backed by a sharded concurrent map: registering, completing and expiring
/// different calls never contend on one global lock, and no lock is held
/// while a caller waits.
#[derive(Default)]
pub struct Correlator {
    pending: DashMap<CallId, PendingCall>,
    discarded: AtomicU64,
}

impl Correlator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Records a new in-flight call.
    ///
    /// # Returns
    /// A handle the caller waits on. Dropping the handle deregisters the
    /// call if it is still pending.
    ///
    /// # Errors
    /// Returns `InvalidState` if `call_id` is already in flight.
    pub fn register(
        self: &Arc<Self>,
        call_id: CallId,
        service: impl Into<String>,
        method: impl Into<String>,
        timeout: Duration,
    ) -> Result<PendingHandle> {
        let (slot, receiver) = oneshot::channel();

        match self.pending.entry(call_id) {
            Entry::Occupied(_) => {
                return Err(LodestarError::InvalidState(format!(
                    "call {} is already in flight",
                    call_id
                )));
            }
            Entry::Vacant(vacant) => {
                vacant.insert(PendingCall {
                    service: service.into(),
                    method: method.into(),
                    timeout,
                    slot,
                });
            }
        }

        Ok(PendingHandle {
            call_id,
            receiver,
            correlator: Arc::clone(self),
        })
    }

    /// Delivers a response to its waiting call.
    ///
    /// # Returns
    /// `false` if no call with that id is pending (it already timed out or
    /// this is a duplicate); the response is dropped.
    pub fn complete(&self, call_id: CallId, response: RpcResponse) -> bool {
        self.resolve(call_id, Ok(response))
    }

    /// Resolves a pending call with a failure.
    pub fn fail(&self, call_id: CallId, error: LodestarError) -> bool {
        self.resolve(call_id, Err(error))
    }

    fn resolve(&self, call_id: CallId, outcome: Result<RpcResponse>) -> bool {
        match self.pending.remove(&call_id) {
            Some((_, pending)) => {
                if pending.slot.send(outcome).is_err() {
                    debug!("Caller of {} went away before its result arrived", call_id);
                }
                true
            }
            None => {
                self.discarded.fetch_add(1, Ordering::Relaxed);
                match outcome {
                    Ok(_) => warn!("Discarding response for unknown or expired call {}", call_id),
                    Err(e) => debug!("Discarding failure for unknown or expired call {}: {}", call_id, e),
                }
                false
            }
        }
    }

    /// Gives up on a call because its deadline passed.
    ///
    /// # Returns
    /// The timeout error to raise, or `None` if the call already completed.
    pub fn expire(&self, call_id: CallId) -> Option<LodestarError> {
        self.pending
            .remove(&call_id)
            .map(|(_, pending)| pending.timeout_error())
    }

    /// Removes a call without resolving it.
    fn discard(&self, call_id: CallId) {
        if self.pending.remove(&call_id).is_some() {
            debug!("Call {} abandoned by its caller", call_id);
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, call_id: CallId) -> bool {
        self.pending.contains_key(&call_id)
    }

    /// Responses or failures that arrived for calls no longer pending.
    pub fn discarded_count(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }
}

/// The waiting side of a pending call.
pub struct PendingHandle {
    call_id: CallId,
    receiver: oneshot::Receiver<Result<RpcResponse>>,
    correlator: Arc<Correlator>,
}

impl PendingHandle {
    pub fn call_id(&self) -> CallId {
        self.call_id
    }

    /// Waits up to `timeout` for the call to resolve.
    ///
    /// # Returns
    /// `None` if the timeout elapsed first
    pub async fn wait_for(&mut self, timeout: Duration) -> Option<Result<RpcResponse>> {
        match tokio::time::timeout(timeout, &mut self.receiver).await {
            Ok(Ok(outcome)) => Some(outcome),
            Ok(Err(_)) => Some(Err(LodestarError::InvalidState(format!(
                "call {} was dropped without a result",
                self.call_id
            )))),
            Err(_) => None,
        }
    }

    /// Takes the outcome if one has already been delivered.
    pub fn try_take(&mut self) -> Option<Result<RpcResponse>> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for PendingHandle {
    fn drop(&mut self) {
        self.correlator.discard(self.call_id);
    }
}
