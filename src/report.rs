//! The host collaborator that receives uncaught task failures.

/// Sink for failures nobody else handled.
///
/// Called with the error name, its message and a trace whenever a task body fails or
/// `tick_once` fails inside [`Runtime::tick`](crate::Runtime::tick). Any
/// `Fn(&str, &str, &str)` closure is a reporter.
pub trait ErrorReport {
    fn report(&self, name: &str, message: &str, trace: &str);
}

impl<F> ErrorReport for F
where
    F: Fn(&str, &str, &str),
{
    fn report(&self, name: &str, message: &str, trace: &str) {
        self(name, message, trace)
    }
}

/// Default reporter: emits one `tracing` error event per failure.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReport;

impl ErrorReport for TracingReport {
    fn report(&self, name: &str, message: &str, trace: &str) {
        tracing::error!(error = name, trace, "{name}: {message}");
    }
}
