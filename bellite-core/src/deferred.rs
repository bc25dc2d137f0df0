//! One-shot deferred values with synchronous continuations
//!
//! A [`Deferred`] is the writable side of a single-resolution value; its
//! [`Promise`] is the read-only side that continuations attach to.
//!
//! # Settlement
//!
//! A deferred starts pending and settles at most once, either resolved with a
//! value or rejected with an error. Later `resolve`/`reject` calls are no-ops
//! and return `false`.
//!
//! # Continuations
//!
//! `then` registers a success and a failure handler and returns a new promise
//! for whatever the handler returns. There is no task queue: continuations
//! attached before settlement run, in attachment order, inside the
//! `resolve`/`reject` call; continuations attached after settlement run
//! immediately, before `then` returns. Either way each one runs exactly once.
//!
//! Links created with `done` have no failure handler and forward errors
//! unchanged; links created with `fail` forward values unchanged.
//!
//! # Unhandled errors
//!
//! When a handler returns an error, the error travels down the chain until a
//! failure handler sees it. If it reaches a promise with nothing attached
//! first, it is passed to the [`ErrorReporter`]. Promises derived through
//! `then` and friends share their parent's reporter.
//!
//! # Examples
//!
//! ```rust
//! use bellite_core::{Deferred, Error};
//!
//! let deferred: Deferred<i32> = Deferred::new();
//! let doubled = deferred.promise().done(|n| Ok(n * 2));
//!
//! assert!(deferred.resolve(21));
//! assert!(!deferred.reject(Error::Timeout));
//! assert_eq!(doubled.outcome(), Some(Ok(42)));
//! ```

use crate::error::Error;
use crate::report::ErrorReporter;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Receives the outcome and whether it carries an error nobody has handled yet
type Listener<T, E> = Box<dyn FnOnce(Result<T, E>, bool)>;

/// Where a link's outcome came from
enum Origin {
    /// Returned by a handler of this link
    Handler,
    /// Passed through unchanged from the source
    Upstream,
}

enum State<T, E> {
    Pending(Vec<Listener<T, E>>),
    Resolved(T),
    Rejected(E),
}

struct Shared<T, E> {
    state: RefCell<State<T, E>>,
    reporter: ErrorReporter,
}

/// Lifecycle of a deferred value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromiseState {
    Pending,
    Resolved,
    Rejected,
}

/// Writable, one-shot completion handle
pub struct Deferred<T, E = Error> {
    shared: Rc<Shared<T, E>>,
}

/// Read-only, chainable view of a [`Deferred`]
pub struct Promise<T, E = Error> {
    shared: Rc<Shared<T, E>>,
}

impl<T, E> Clone for Deferred<T, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<T, E> Shared<T, E>
where
    T: Clone + 'static,
    E: Clone + fmt::Debug + 'static,
{
    fn new(reporter: ErrorReporter) -> Rc<Self> {
        Rc::new(Self {
            state: RefCell::new(State::Pending(Vec::new())),
            reporter,
        })
    }

    fn settle(&self, outcome: Result<T, E>) -> bool {
        self.settle_with(outcome, false)
    }

    fn settle_with(&self, outcome: Result<T, E>, unhandled: bool) -> bool {
        let listeners = {
            let mut state = self.state.borrow_mut();
            let listeners = match &mut *state {
                State::Pending(listeners) => std::mem::take(listeners),
                _ => return false,
            };
            *state = match &outcome {
                Ok(value) => State::Resolved(value.clone()),
                Err(error) => State::Rejected(error.clone()),
            };
            listeners
        };

        // The borrow is released: listeners may attach to this promise again.
        for listener in listeners {
            listener(outcome.clone(), unhandled);
        }
        true
    }

    /// Settle with the result of a continuation
    ///
    /// `unhandled` is true when the error came out of a handler somewhere up
    /// the chain and no failure handler has seen it since. It is reported
    /// once it reaches a link with nothing attached.
    fn settle_link(&self, outcome: Result<T, E>, unhandled: bool) {
        let unhandled = unhandled && outcome.is_err();
        if unhandled && self.listener_count() == 0 {
            if let Err(error) = &outcome {
                self.reporter
                    .report("unhandled error in promise continuation", error);
            }
        }
        self.settle_with(outcome, unhandled);
    }

    fn listener_count(&self) -> usize {
        match &*self.state.borrow() {
            State::Pending(listeners) => listeners.len(),
            _ => 0,
        }
    }

    fn listen(&self, listener: Listener<T, E>) {
        let outcome = {
            let mut state = self.state.borrow_mut();
            match &mut *state {
                State::Pending(listeners) => {
                    listeners.push(listener);
                    return;
                }
                State::Resolved(value) => Ok(value.clone()),
                State::Rejected(error) => Err(error.clone()),
            }
        };
        listener(outcome, false);
    }

    fn state(&self) -> PromiseState {
        match &*self.state.borrow() {
            State::Pending(_) => PromiseState::Pending,
            State::Resolved(_) => PromiseState::Resolved,
            State::Rejected(_) => PromiseState::Rejected,
        }
    }

    fn outcome(&self) -> Option<Result<T, E>> {
        match &*self.state.borrow() {
            State::Pending(_) => None,
            State::Resolved(value) => Some(Ok(value.clone())),
            State::Rejected(error) => Some(Err(error.clone())),
        }
    }
}

impl<T, E> Deferred<T, E>
where
    T: Clone + 'static,
    E: Clone + fmt::Debug + 'static,
{
    /// Create a pending deferred that reports through `tracing`
    pub fn new() -> Self {
        Self::with_reporter(ErrorReporter::default())
    }

    /// Create a pending deferred with a custom unhandled-error reporter
    pub fn with_reporter(reporter: ErrorReporter) -> Self {
        Self {
            shared: Shared::new(reporter),
        }
    }

    /// The read-only facet
    pub fn promise(&self) -> Promise<T, E> {
        Promise {
            shared: Rc::clone(&self.shared),
        }
    }

    /// Resolve if still pending; returns whether this call settled it
    pub fn resolve(&self, value: T) -> bool {
        self.shared.settle(Ok(value))
    }

    /// Reject if still pending; returns whether this call settled it
    pub fn reject(&self, error: E) -> bool {
        self.shared.settle(Err(error))
    }

    /// Settle from a `Result`
    pub fn settle(&self, outcome: Result<T, E>) -> bool {
        self.shared.settle(outcome)
    }

    pub fn is_pending(&self) -> bool {
        self.shared.state() == PromiseState::Pending
    }
}

impl<T, E> Default for Deferred<T, E>
where
    T: Clone + 'static,
    E: Clone + fmt::Debug + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> Promise<T, E>
where
    T: Clone + 'static,
    E: Clone + fmt::Debug + 'static,
{
    /// An already resolved promise
    pub fn resolved(value: T) -> Self {
        let deferred = Deferred::new();
        deferred.resolve(value);
        deferred.promise()
    }

    /// An already rejected promise
    pub fn rejected(error: E) -> Self {
        let deferred = Deferred::new();
        deferred.reject(error);
        deferred.promise()
    }

    fn chain<U, F>(&self, step: F) -> Promise<U, E>
    where
        U: Clone + 'static,
        F: FnOnce(Result<T, E>) -> (Result<U, E>, Origin) + 'static,
    {
        let derived = Shared::new(self.shared.reporter.clone());
        let next = Promise {
            shared: Rc::clone(&derived),
        };
        self.shared.listen(Box::new(move |outcome, unhandled| {
            let (result, origin) = step(outcome);
            let unhandled = match origin {
                Origin::Handler => result.is_err(),
                Origin::Upstream => unhandled,
            };
            derived.settle_link(result, unhandled);
        }));
        next
    }

    /// Attach a success and a failure handler
    pub fn then<U, S, F>(&self, on_success: S, on_failure: F) -> Promise<U, E>
    where
        U: Clone + 'static,
        S: FnOnce(T) -> Result<U, E> + 'static,
        F: FnOnce(E) -> Result<U, E> + 'static,
    {
        self.chain(move |outcome| {
            let result = match outcome {
                Ok(value) => on_success(value),
                Err(error) => on_failure(error),
            };
            (result, Origin::Handler)
        })
    }

    /// Attach a success handler; errors pass through untouched
    pub fn done<U, S>(&self, on_success: S) -> Promise<U, E>
    where
        U: Clone + 'static,
        S: FnOnce(T) -> Result<U, E> + 'static,
    {
        self.chain(move |outcome| match outcome {
            Ok(value) => (on_success(value), Origin::Handler),
            Err(error) => (Err(error), Origin::Upstream),
        })
    }

    /// Attach a failure handler; values pass through untouched
    ///
    /// Returning `Ok` recovers the chain, returning `Err` keeps it rejected.
    pub fn fail<F>(&self, on_failure: F) -> Promise<T, E>
    where
        F: FnOnce(E) -> Result<T, E> + 'static,
    {
        self.chain(move |outcome| match outcome {
            Ok(value) => (Ok(value), Origin::Upstream),
            Err(error) => (on_failure(error), Origin::Handler),
        })
    }

    /// Attach one handler for either outcome
    pub fn always<U, F>(&self, handler: F) -> Promise<U, E>
    where
        U: Clone + 'static,
        F: FnOnce(Result<T, E>) -> Result<U, E> + 'static,
    {
        self.chain(move |outcome| (handler(outcome), Origin::Handler))
    }

    pub fn state(&self) -> PromiseState {
        self.shared.state()
    }

    pub fn is_pending(&self) -> bool {
        self.state() == PromiseState::Pending
    }

    /// The settled outcome, or `None` while pending
    pub fn outcome(&self) -> Option<Result<T, E>> {
        self.shared.outcome()
    }
}

impl<T, E> fmt::Debug for Deferred<T, E>
where
    T: Clone + 'static,
    E: Clone + fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("state", &self.shared.state())
            .finish()
    }
}

impl<T, E> fmt::Debug for Promise<T, E>
where
    T: Clone + 'static,
    E: Clone + fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("state", &self.shared.state())
            .finish()
    }
}
