//! Request tracking for the Bellite client
//!
//! Every call sent to the host gets an id from a per-client counter and a
//! [`Deferred`] registered under that id. The reply router takes the entry
//! out again when the matching reply arrives, so each entry is settled at
//! most once.
//!
//! # Request Lifecycle
//!
//! 1. **Allocate**: take the next id (first id is 100)
//! 2. **Register**: store the deferred with the method name and start time
//! 3. **Send**: hand the encoded frame to the transport
//! 4. **Settle**: the reply router takes the entry and resolves or rejects it
//!
//! If step 3 fails the caller takes the entry back immediately. When the
//! connection closes, everything still registered is rejected at once.

use bellite_core::{Deferred, Error, RequestId};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::time::Instant;

/// Id given to the first call of a client
pub const FIRST_REQUEST_ID: RequestId = 100;

/// A call waiting for its reply
pub(crate) struct PendingRequest {
    pub deferred: Deferred<Value>,
    pub method: String,
    pub started: Instant,
}

/// Id allocator and id to pending request table
pub(crate) struct PendingRequests {
    next_id: Cell<RequestId>,
    pending: RefCell<HashMap<RequestId, PendingRequest>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self {
            next_id: Cell::new(FIRST_REQUEST_ID),
            pending: RefCell::new(HashMap::new()),
        }
    }

    /// Allocate a fresh id; ids are never reused
    pub fn next_id(&self) -> RequestId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

    pub fn register(&self, id: RequestId, method: &str, deferred: Deferred<Value>) {
        self.pending.borrow_mut().insert(
            id,
            PendingRequest {
                deferred,
                method: method.to_string(),
                started: Instant::now(),
            },
        );
    }

    /// Remove and return the entry for `id`
    pub fn take(&self, id: RequestId) -> Option<PendingRequest> {
        self.pending.borrow_mut().remove(&id)
    }

    /// Reject every pending request with `error`, oldest first
    ///
    /// The table is emptied before any continuation runs, so continuations
    /// may register new requests.
    pub fn fail_all(&self, error: Error) -> usize {
        let mut drained: Vec<(RequestId, PendingRequest)> =
            self.pending.borrow_mut().drain().collect();
        drained.sort_by_key(|(id, _)| *id);

        for (_, request) in &drained {
            request.deferred.reject(error.clone());
        }
        drained.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn contains(&self, id: RequestId) -> bool {
        self.pending.borrow().contains_key(&id)
    }
}

impl Default for PendingRequests {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bellite_core::PromiseState;
    use serde_json::json;
    use std::rc::Rc;

    #[test]
    fn test_ids_start_at_100_and_increase() {
        let requests = PendingRequests::new();

        assert_eq!(requests.next_id(), 100);
        assert_eq!(requests.next_id(), 101);
        assert_eq!(requests.next_id(), 102);
    }

    #[test]
    fn test_register_and_take() {
        let requests = PendingRequests::new();
        let id = requests.next_id();
        let deferred = Deferred::new();

        requests.register(id, "ping", deferred.clone());
        assert_eq!(requests.pending_count(), 1);
        assert!(requests.contains(id));

        let entry = requests.take(id).unwrap();
        assert_eq!(entry.method, "ping");
        assert!(requests.take(id).is_none());
        assert_eq!(requests.pending_count(), 0);

        entry.deferred.resolve(json!([null, true, "pong"]));
        assert_eq!(deferred.promise().state(), PromiseState::Resolved);
    }

    #[test]
    fn test_fail_all_rejects_everything() {
        let requests = PendingRequests::new();
        let first = Deferred::new();
        let second = Deferred::new();

        requests.register(requests.next_id(), "ping", first.clone());
        requests.register(requests.next_id(), "version", second.clone());

        assert_eq!(requests.fail_all(Error::ConnectionClosed), 2);
        assert_eq!(requests.pending_count(), 0);
        assert_eq!(first.promise().outcome(), Some(Err(Error::ConnectionClosed)));
        assert_eq!(second.promise().outcome(), Some(Err(Error::ConnectionClosed)));
    }

    #[test]
    fn test_fail_all_allows_reentrant_register() {
        let requests = Rc::new(PendingRequests::new());
        let deferred: Deferred<Value> = Deferred::new();
        requests.register(requests.next_id(), "ping", deferred.clone());

        let table = Rc::clone(&requests);
        deferred.promise().fail(move |error| {
            table.register(table.next_id(), "retry", Deferred::new());
            Err(error)
        });

        assert_eq!(requests.fail_all(Error::ConnectionClosed), 1);
        assert!(requests.contains(101));
    }
}
