//! Sink for errors that have nowhere left to go
//!
//! A failing continuation at the end of a promise chain, or a failing event
//! listener, has no caller to return its error to. Those errors are handed to
//! an [`ErrorReporter`], which is injected when a client (or a standalone
//! [`Deferred`](crate::Deferred)) is built. The default reporter records a
//! `tracing` error event.

use std::fmt;
use std::rc::Rc;

type ReportFn = dyn Fn(&str, &dyn fmt::Debug);

/// Injectable handler for unhandled errors
#[derive(Clone)]
pub struct ErrorReporter {
    sink: Rc<ReportFn>,
}

impl ErrorReporter {
    /// Build a reporter from a closure receiving a context string and the error
    pub fn new<F>(sink: F) -> Self
    where
        F: Fn(&str, &dyn fmt::Debug) + 'static,
    {
        Self { sink: Rc::new(sink) }
    }

    /// Reporter that logs through `tracing`
    pub fn tracing() -> Self {
        Self::new(|context, error| {
            tracing::error!(context = context, error = ?error, "Unhandled error");
        })
    }

    /// Reporter that discards everything
    pub fn silent() -> Self {
        Self::new(|_, _| {})
    }

    pub fn report(&self, context: &str, error: &dyn fmt::Debug) {
        (self.sink)(context, error);
    }
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::tracing()
    }
}

impl fmt::Debug for ErrorReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorReporter").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn test_custom_reporter_receives_context() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let reporter = ErrorReporter::new(move |context, error| {
            sink.borrow_mut().push(format!("{context}: {error:?}"));
        });

        reporter.report("listener", &"boom");
        reporter.clone().report("promise", &42);

        assert_eq!(*seen.borrow(), vec!["listener: \"boom\"", "promise: 42"]);
    }

    #[test]
    fn test_default_reporter_does_not_panic() {
        ErrorReporter::default().report("test", &"ignored");
        ErrorReporter::silent().report("test", &"ignored");
    }
}
